//! F1 UDP packet decoding.
//!
//! Decoding is a pure function from a byte slice to a fixed-layout structure or
//! a [`RelayError::Truncated`](crate::RelayError::Truncated) failure. Layouts are
//! read field by field in wire order, little-endian, with no padding, so the
//! Rust struct layout never matters.

pub mod header;
pub mod reader;
pub mod telemetry;

pub use header::{CAR_TELEMETRY_PACKET_ID, HEADER_SIZE, PacketHeader, decode_header};
pub use reader::{ByteReader, ByteWriter};
pub use telemetry::{
    CAR_TELEMETRY_SIZE, CarTelemetry, Wheel, car_offset, decode_telemetry, decode_telemetry_at,
};
