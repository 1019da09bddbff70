//! Little-endian cursor over a byte slice, plus the matching writer used to
//! produce wire layouts for tests and synthetic traffic.

use crate::{RelayError, Result};

/// Bounds-checked little-endian reader.
///
/// Every read names the structure being decoded so a short buffer surfaces as
/// [`RelayError::Truncated`] instead of a panic.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    structure: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], structure: &'static str) -> Self {
        Self { data, pos: 0, structure }
    }

    /// Current cursor position in bytes.
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos.checked_add(N).filter(|end| *end <= self.data.len()).ok_or_else(|| {
            RelayError::truncated(self.structure, self.pos.saturating_add(N), self.data.len())
        })?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(bytes)
    }

    #[inline]
    pub fn u8(&mut self) -> Result<u8> {
        self.take::<1>().map(|[b]| b)
    }

    #[inline]
    pub fn i8(&mut self) -> Result<i8> {
        self.take::<1>().map(i8::from_le_bytes)
    }

    #[inline]
    pub fn u16_le(&mut self) -> Result<u16> {
        self.take::<2>().map(u16::from_le_bytes)
    }

    #[inline]
    pub fn u32_le(&mut self) -> Result<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    #[inline]
    pub fn u64_le(&mut self) -> Result<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    #[inline]
    pub fn f32_le(&mut self) -> Result<f32> {
        self.take::<4>().map(f32::from_le_bytes)
    }

    pub fn u8_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.take::<N>()
    }

    pub fn u16_le_array<const N: usize>(&mut self) -> Result<[u16; N]> {
        let mut out = [0u16; N];
        for slot in &mut out {
            *slot = self.u16_le()?;
        }
        Ok(out)
    }

    pub fn f32_le_array<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut out = [0f32; N];
        for slot in &mut out {
            *slot = self.f32_le()?;
        }
        Ok(out)
    }
}

/// Little-endian writer, the inverse of [`ByteReader`].
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn i8(&mut self, v: i8) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u16_le(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32_le(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64_le(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32_le(&mut self, v: f32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
