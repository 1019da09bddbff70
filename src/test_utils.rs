//! Test utilities: synthetic packets and scripted datagram sources
//!
//! Builders here produce byte-exact F1 UDP datagrams so tests and benches can
//! exercise the decoder and ingestion loop without a running game.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::io;

use tokio_util::sync::CancellationToken;

use crate::ingest::DatagramSource;
use crate::packet::{CAR_TELEMETRY_PACKET_ID, CarTelemetry, HEADER_SIZE, PacketHeader};

/// Session id used by [`sample_header`].
pub const SAMPLE_SESSION_UID: u64 = 0x5EED_F1F1_2024_0001;

/// Cars on the grid in a full car telemetry packet.
pub const GRID_SIZE: usize = 22;

/// A car telemetry header for player car 0 at the given overall frame.
pub fn sample_header(overall_frame: u32) -> PacketHeader {
    PacketHeader {
        packet_format: 2024,
        game_year: 24,
        game_major_version: 1,
        game_minor_version: 5,
        packet_version: 1,
        packet_id: CAR_TELEMETRY_PACKET_ID,
        session_uid: SAMPLE_SESSION_UID,
        session_time: overall_frame as f32 / 60.0,
        frame_identifier: overall_frame,
        overall_frame_identifier: overall_frame,
        player_car_index: 0,
        secondary_player_car_index: -1,
    }
}

/// A plausible mid-corner record, distinguishable by `speed`.
pub fn sample_telemetry(speed: u16) -> CarTelemetry {
    CarTelemetry {
        speed,
        throttle: 0.62,
        steer: -0.18,
        brake: 0.0,
        clutch: 0,
        gear: 6,
        engine_rpm: 10_950,
        drs: 0,
        rev_lights_percent: 64,
        rev_lights_bit_value: 0b0000_0011_1111,
        brakes_temperature: [480, 482, 530, 528],
        tyres_surface_temperature: [94, 95, 101, 100],
        tyres_inner_temperature: [99, 99, 104, 103],
        engine_temperature: 108,
        tyres_pressure: [21.8, 21.9, 23.4, 23.3],
        surface_type: [0, 0, 0, 0],
    }
}

/// Header followed by one encoded block per car.
pub fn telemetry_datagram(header: &PacketHeader, cars: &[CarTelemetry]) -> Vec<u8> {
    let mut datagram = header.encode();
    for car in cars {
        datagram.extend_from_slice(&car.encode());
    }
    datagram
}

/// A full-grid datagram with the player at `player_car_index`.
pub fn full_grid_datagram(overall_frame: u32, player_car_index: u8) -> Vec<u8> {
    let header = PacketHeader { player_car_index, ..sample_header(overall_frame) };
    let cars: Vec<CarTelemetry> = (0..GRID_SIZE).map(|i| sample_telemetry(200 + i as u16)).collect();
    telemetry_datagram(&header, &cars)
}

/// A datagram of some other packet kind with a zeroed body.
pub fn other_packet_datagram(packet_id: u8, overall_frame: u32) -> Vec<u8> {
    let header = PacketHeader { packet_id, ..sample_header(overall_frame) };
    let mut datagram = header.encode();
    datagram.resize(HEADER_SIZE + 1000, 0);
    datagram
}

/// Replays a fixed list of reads, then waits forever.
///
/// With [`cancel_when_done`](Self::cancel_when_done) the token fires once the
/// script is exhausted, which ends the ingestion loop deterministically.
pub struct ScriptedSource {
    script: VecDeque<io::Result<Vec<u8>>>,
    done: Option<CancellationToken>,
}

impl ScriptedSource {
    pub fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
        Self { script: script.into(), done: None }
    }

    pub fn cancel_when_done(mut self, token: CancellationToken) -> Self {
        self.done = Some(token);
        self
    }
}

#[async_trait::async_trait]
impl DatagramSource for ScriptedSource {
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.script.pop_front() {
            Some(Ok(datagram)) => {
                // Oversized datagrams are truncated like a real socket does
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(len)
            }
            Some(Err(err)) => Err(err),
            None => {
                if let Some(token) = &self.done {
                    token.cancel();
                }
                std::future::pending().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{CAR_TELEMETRY_SIZE, decode_header};

    #[test]
    fn full_grid_datagram_has_game_size() {
        let datagram = full_grid_datagram(0, 0);
        assert_eq!(datagram.len(), HEADER_SIZE + GRID_SIZE * CAR_TELEMETRY_SIZE);
    }

    #[test]
    fn other_packet_keeps_requested_id() {
        let header = decode_header(&other_packet_datagram(2, 9)).unwrap();
        assert_eq!(header.packet_id, 2);
        assert_eq!(header.overall_frame_identifier, 9);
    }

    #[tokio::test]
    async fn scripted_source_truncates_to_buffer() {
        let mut source = ScriptedSource::new(vec![Ok(vec![7u8; 64])]);
        let mut buf = [0u8; 32];
        assert_eq!(source.recv(&mut buf).await.unwrap(), 32);
    }
}
