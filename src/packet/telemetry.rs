//! Car telemetry record (packet id 6).
//!
//! The packet body is an array of 60-byte blocks, one per car, following the
//! 29-byte header. The relay picks the block at `player_car_index`.
//!
//! ```text
//! offset  size  field
//!      0     2  speed                       u16   km/h
//!      2     4  throttle                    f32   0.0..=1.0
//!      6     4  steer                       f32   -1.0..=1.0
//!     10     4  brake                       f32   0.0..=1.0
//!     14     1  clutch                      u8    0..=100
//!     15     1  gear                        i8    -1 = R, 0 = N
//!     16     2  engine_rpm                  u16
//!     18     1  drs                         u8
//!     19     1  rev_lights_percent          u8
//!     20     2  rev_lights_bit_value        u16
//!     22     8  brakes_temperature          [u16; 4]  °C
//!     30     4  tyres_surface_temperature   [u8; 4]   °C
//!     34     4  tyres_inner_temperature     [u8; 4]   °C
//!     38     2  engine_temperature          u16       °C
//!     40    16  tyres_pressure              [f32; 4]  PSI
//!     56     4  surface_type                [u8; 4]
//! ```
//!
//! Per-wheel arrays are ordered rear-left, rear-right, front-left, front-right.
//! Values are passed through exactly as sent; no range validation happens here.

use serde::{Deserialize, Serialize};

use super::header::HEADER_SIZE;
use super::reader::{ByteReader, ByteWriter};
use crate::{RelayError, Result};

/// Size of one car's telemetry block in bytes.
pub const CAR_TELEMETRY_SIZE: usize = 60;

/// Wheel position used to index the per-wheel arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wheel {
    RearLeft,
    RearRight,
    FrontLeft,
    FrontRight,
}

impl Wheel {
    /// All wheels in wire order.
    pub const ALL: [Wheel; 4] = [Wheel::RearLeft, Wheel::RearRight, Wheel::FrontLeft, Wheel::FrontRight];

    /// Array index of this wheel.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Telemetry for a single car.
///
/// Serializes with the short field names subscribers consume.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CarTelemetry {
    pub speed: u16,
    pub throttle: f32,
    pub steer: f32,
    pub brake: f32,
    pub clutch: u8,
    pub gear: i8,
    #[serde(rename = "rpm")]
    pub engine_rpm: u16,
    pub drs: u8,
    #[serde(rename = "rev_lights")]
    pub rev_lights_percent: u8,
    #[serde(rename = "rev_lights_bit")]
    pub rev_lights_bit_value: u16,
    #[serde(rename = "brakes_temp")]
    pub brakes_temperature: [u16; 4],
    #[serde(rename = "tyres_surface_temp")]
    pub tyres_surface_temperature: [u8; 4],
    #[serde(rename = "tyres_inner_temp")]
    pub tyres_inner_temperature: [u8; 4],
    #[serde(rename = "engine_temp")]
    pub engine_temperature: u16,
    pub tyres_pressure: [f32; 4],
    pub surface_type: [u8; 4],
}

impl CarTelemetry {
    /// Tyre pressure in PSI for one wheel.
    pub fn tyre_pressure(&self, wheel: Wheel) -> f32 {
        self.tyres_pressure[wheel.index()]
    }

    /// Brake temperature in °C for one wheel.
    pub fn brake_temperature(&self, wheel: Wheel) -> u16 {
        self.brakes_temperature[wheel.index()]
    }

    /// Encode into the exact 60-byte wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(CAR_TELEMETRY_SIZE);
        w.u16_le(self.speed)
            .f32_le(self.throttle)
            .f32_le(self.steer)
            .f32_le(self.brake)
            .u8(self.clutch)
            .i8(self.gear)
            .u16_le(self.engine_rpm)
            .u8(self.drs)
            .u8(self.rev_lights_percent)
            .u16_le(self.rev_lights_bit_value);
        for temp in self.brakes_temperature {
            w.u16_le(temp);
        }
        w.bytes(&self.tyres_surface_temperature)
            .bytes(&self.tyres_inner_temperature)
            .u16_le(self.engine_temperature);
        for pressure in self.tyres_pressure {
            w.f32_le(pressure);
        }
        w.bytes(&self.surface_type);
        w.into_inner()
    }
}

/// Decode one car telemetry block from the start of `buf`.
///
/// Fails with [`RelayError::Truncated`] when `buf` is shorter than
/// [`CAR_TELEMETRY_SIZE`].
pub fn decode_telemetry(buf: &[u8]) -> Result<CarTelemetry> {
    if buf.len() < CAR_TELEMETRY_SIZE {
        return Err(RelayError::truncated("CarTelemetry", CAR_TELEMETRY_SIZE, buf.len()));
    }

    let mut r = ByteReader::new(&buf[..CAR_TELEMETRY_SIZE], "CarTelemetry");
    Ok(CarTelemetry {
        speed: r.u16_le()?,
        throttle: r.f32_le()?,
        steer: r.f32_le()?,
        brake: r.f32_le()?,
        clutch: r.u8()?,
        gear: r.i8()?,
        engine_rpm: r.u16_le()?,
        drs: r.u8()?,
        rev_lights_percent: r.u8()?,
        rev_lights_bit_value: r.u16_le()?,
        brakes_temperature: r.u16_le_array()?,
        tyres_surface_temperature: r.u8_array()?,
        tyres_inner_temperature: r.u8_array()?,
        engine_temperature: r.u16_le()?,
        tyres_pressure: r.f32_le_array()?,
        surface_type: r.u8_array()?,
    })
}

/// Byte offset of a car's block inside a car telemetry datagram.
///
/// Returns `None` on arithmetic overflow.
pub fn car_offset(car_index: u8) -> Option<usize> {
    usize::from(car_index).checked_mul(CAR_TELEMETRY_SIZE)?.checked_add(HEADER_SIZE)
}

/// Decode the block for `car_index` out of a whole datagram.
///
/// The block must lie fully inside `datagram`; a corrupt index pointing past
/// the end fails instead of reading out of bounds.
pub fn decode_telemetry_at(datagram: &[u8], car_index: u8) -> Result<CarTelemetry> {
    let end = car_offset(car_index).and_then(|offset| offset.checked_add(CAR_TELEMETRY_SIZE));
    match end {
        Some(end) if end <= datagram.len() => {
            decode_telemetry(&datagram[end - CAR_TELEMETRY_SIZE..end])
        }
        _ => Err(RelayError::truncated(
            "CarTelemetry",
            end.unwrap_or(usize::MAX),
            datagram.len(),
        )),
    }
}
