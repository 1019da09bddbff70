//! F1 UDP packet header.
//!
//! Every packet the game emits starts with the same 29-byte header:
//!
//! ```text
//! offset  size  field
//!      0     2  packet_format               u16
//!      2     1  game_year                   u8
//!      3     1  game_major_version          u8
//!      4     1  game_minor_version          u8
//!      5     1  packet_version              u8
//!      6     1  packet_id                   u8
//!      7     8  session_uid                 u64
//!     15     4  session_time                f32
//!     19     4  frame_identifier            u32
//!     23     4  overall_frame_identifier    u32
//!     27     1  player_car_index            u8
//!     28     1  secondary_player_car_index  i8
//! ```
//!
//! All multi-byte fields are little-endian and there is no padding.

use super::reader::{ByteReader, ByteWriter};
use crate::{RelayError, Result};
use tracing::trace;

/// Size of the packed header in bytes.
pub const HEADER_SIZE: usize = 29;

/// Packet id of the car telemetry packet, the only kind the relay consumes.
pub const CAR_TELEMETRY_PACKET_ID: u8 = 6;

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketHeader {
    /// Game packet format, e.g. 2024
    pub packet_format: u16,
    pub game_year: u8,
    pub game_major_version: u8,
    pub game_minor_version: u8,
    /// Version of this packet type
    pub packet_version: u8,
    /// Identifies the packet kind
    pub packet_id: u8,
    /// Unique identifier for the session
    pub session_uid: u64,
    /// Session timestamp in seconds
    pub session_time: f32,
    /// Frame the data was retrieved on
    pub frame_identifier: u32,
    /// Overall frame counter, does not go back after flashbacks
    pub overall_frame_identifier: u32,
    /// Index of the player's car in the per-car arrays
    pub player_car_index: u8,
    /// Index of the second player's car, -1 when absent
    pub secondary_player_car_index: i8,
}

impl PacketHeader {
    /// Returns true when this header introduces a car telemetry packet.
    pub fn is_car_telemetry(&self) -> bool {
        self.packet_id == CAR_TELEMETRY_PACKET_ID
    }

    /// Encode into the exact 29-byte wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(HEADER_SIZE);
        w.u16_le(self.packet_format)
            .u8(self.game_year)
            .u8(self.game_major_version)
            .u8(self.game_minor_version)
            .u8(self.packet_version)
            .u8(self.packet_id)
            .u64_le(self.session_uid)
            .f32_le(self.session_time)
            .u32_le(self.frame_identifier)
            .u32_le(self.overall_frame_identifier)
            .u8(self.player_car_index)
            .i8(self.secondary_player_car_index);
        w.into_inner()
    }
}

/// Decode the header from the start of `buf`.
///
/// Fails with [`RelayError::Truncated`] when `buf` is shorter than
/// [`HEADER_SIZE`]. Trailing bytes are ignored.
pub fn decode_header(buf: &[u8]) -> Result<PacketHeader> {
    if buf.len() < HEADER_SIZE {
        return Err(RelayError::truncated("PacketHeader", HEADER_SIZE, buf.len()));
    }

    let mut r = ByteReader::new(&buf[..HEADER_SIZE], "PacketHeader");
    let header = PacketHeader {
        packet_format: r.u16_le()?,
        game_year: r.u8()?,
        game_major_version: r.u8()?,
        game_minor_version: r.u8()?,
        packet_version: r.u8()?,
        packet_id: r.u8()?,
        session_uid: r.u64_le()?,
        session_time: r.f32_le()?,
        frame_identifier: r.u32_le()?,
        overall_frame_identifier: r.u32_le()?,
        player_car_index: r.u8()?,
        secondary_player_car_index: r.i8()?,
    };
    debug_assert_eq!(r.position(), HEADER_SIZE);

    trace!(
        packet_id = header.packet_id,
        overall_frame = header.overall_frame_identifier,
        "Decoded packet header"
    );

    Ok(header)
}
