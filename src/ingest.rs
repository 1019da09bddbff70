//! Ingestion loop: datagram in, sampled and decoded record out to the hub.
//!
//! Per datagram the [`Ingestor`] rejects short buffers, decodes the header,
//! ignores every packet kind but car telemetry, runs the [`SamplingFilter`],
//! bounds-checks the player car's block and decodes it, then hands the record
//! to [`BroadcastHub::broadcast`]. Nothing a single datagram contains can stop
//! the loop; only cancellation does.

use std::io;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::hub::BroadcastHub;
use crate::packet::{self, CAR_TELEMETRY_SIZE, CarTelemetry, HEADER_SIZE};
use crate::sampling::{SampleDecision, SampleInterval, SamplingFilter};

/// Default receive buffer; car telemetry packets are well under this.
pub const DEFAULT_RECV_BUFFER: usize = 4096;

/// Log a stats line every this many datagrams.
const STATS_LOG_EVERY: u64 = 10_000;

/// Source of raw datagrams.
///
/// Implemented for [`UdpSocket`]; tests substitute scripted sources.
#[async_trait::async_trait]
pub trait DatagramSource: Send {
    /// Receive one datagram into `buf`, returning its length.
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

#[async_trait::async_trait]
impl DatagramSource for UdpSocket {
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_from(buf).await.map(|(len, _peer)| len)
    }
}

/// Why a datagram produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Shorter than the packet header
    TooShort { len: usize },
    /// Any packet kind other than car telemetry
    OtherPacket { packet_id: u8 },
    Duplicate,
    OffCadence,
    /// Player car index points past the end of the datagram
    TruncatedPayload { car_index: u8, len: usize },
}

/// Outcome of processing one datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Broadcast(CarTelemetry),
    Skipped(SkipReason),
}

/// Running totals for the ingestion loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub too_short: u64,
    pub other_packet: u64,
    pub duplicate: u64,
    pub off_cadence: u64,
    pub truncated_payload: u64,
    pub broadcast: u64,
    pub read_errors: u64,
}

impl IngestStats {
    fn record(&mut self, verdict: &Verdict) {
        self.received += 1;
        match verdict {
            Verdict::Broadcast(_) => self.broadcast += 1,
            Verdict::Skipped(SkipReason::TooShort { .. }) => self.too_short += 1,
            Verdict::Skipped(SkipReason::OtherPacket { .. }) => self.other_packet += 1,
            Verdict::Skipped(SkipReason::Duplicate) => self.duplicate += 1,
            Verdict::Skipped(SkipReason::OffCadence) => self.off_cadence += 1,
            Verdict::Skipped(SkipReason::TruncatedPayload { .. }) => self.truncated_payload += 1,
        }
    }
}

/// Handle to a spawned ingestion task.
pub struct IngestHandle {
    /// Cancel to stop the loop after its in-flight broadcast
    pub cancel: CancellationToken,
    /// Resolves to the final stats once the loop exits
    pub task: JoinHandle<IngestStats>,
}

/// Owns the sampling state and drives datagrams into the hub.
pub struct Ingestor {
    hub: BroadcastHub,
    filter: SamplingFilter,
    /// Session the filter state belongs to
    session_uid: Option<u64>,
    recv_buffer: usize,
    stats: IngestStats,
}

impl Ingestor {
    pub fn new(hub: BroadcastHub, interval: SampleInterval) -> Self {
        Self {
            hub,
            filter: SamplingFilter::new(interval),
            session_uid: None,
            recv_buffer: DEFAULT_RECV_BUFFER,
            stats: IngestStats::default(),
        }
    }

    /// Override the receive buffer size (never below one header).
    pub fn with_recv_buffer(mut self, bytes: usize) -> Self {
        self.recv_buffer = bytes.max(HEADER_SIZE);
        self
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Decide what one datagram yields, updating sampling state.
    ///
    /// The filter runs before the payload bounds check, so a sampled frame
    /// with a corrupt car index still counts as the last accepted frame.
    pub fn process(&mut self, datagram: &[u8]) -> Verdict {
        let header = match packet::decode_header(datagram) {
            Ok(header) => header,
            Err(_) => return Verdict::Skipped(SkipReason::TooShort { len: datagram.len() }),
        };

        if !header.is_car_telemetry() {
            return Verdict::Skipped(SkipReason::OtherPacket { packet_id: header.packet_id });
        }

        if self.session_uid != Some(header.session_uid) {
            if let Some(previous) = self.session_uid {
                info!(
                    previous,
                    current = header.session_uid,
                    "Session changed, resetting frame sampling"
                );
            }
            self.filter.reset();
            self.session_uid = Some(header.session_uid);
        }

        match self.filter.evaluate(header.overall_frame_identifier) {
            SampleDecision::Accept => {}
            SampleDecision::Duplicate => return Verdict::Skipped(SkipReason::Duplicate),
            SampleDecision::OffCadence => return Verdict::Skipped(SkipReason::OffCadence),
        }

        match packet::decode_telemetry_at(datagram, header.player_car_index) {
            Ok(record) => {
                trace!(
                    frame = header.overall_frame_identifier,
                    car = header.player_car_index,
                    speed = record.speed,
                    "Decoded car telemetry"
                );
                Verdict::Broadcast(record)
            }
            Err(err) => {
                debug!(
                    car = header.player_car_index,
                    len = datagram.len(),
                    needed = packet::car_offset(header.player_car_index)
                        .map(|offset| offset + CAR_TELEMETRY_SIZE),
                    error = %err,
                    "Datagram too short for player car"
                );
                Verdict::Skipped(SkipReason::TruncatedPayload {
                    car_index: header.player_car_index,
                    len: datagram.len(),
                })
            }
        }
    }

    /// Process a datagram and broadcast the record it yields, if any.
    pub fn handle(&mut self, datagram: &[u8]) -> Verdict {
        let verdict = self.process(datagram);
        self.stats.record(&verdict);
        if let Verdict::Broadcast(record) = &verdict {
            self.hub.broadcast(*record);
        }
        if self.stats.received % STATS_LOG_EVERY == 0 {
            debug!(stats = ?self.stats, hub = ?self.hub.stats(), "Ingestion progress");
        }
        verdict
    }

    /// Read datagrams until `cancel` fires.
    ///
    /// Read errors are logged and the loop carries on with the next read.
    pub async fn run<S: DatagramSource>(
        mut self,
        mut source: S,
        cancel: CancellationToken,
    ) -> IngestStats {
        info!(
            interval = %self.filter.interval(),
            recv_buffer = self.recv_buffer,
            "Ingestion loop started"
        );
        let mut buf = vec![0u8; self.recv_buffer];

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Ingestion loop cancelled");
                    break;
                }
                result = source.recv(&mut buf) => result,
            };

            match result {
                Ok(len) => {
                    self.handle(&buf[..len]);
                }
                Err(err) => {
                    self.stats.read_errors += 1;
                    warn!(error = %err, errors = self.stats.read_errors, "Datagram read failed");
                    tokio::task::yield_now().await;
                }
            }
        }

        info!(stats = ?self.stats, "Ingestion loop ended");
        self.stats
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn<S>(self, source: S) -> IngestHandle
    where
        S: DatagramSource + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { self.run(source, task_cancel).await });
        IngestHandle { cancel, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketHeader;
    use crate::test_utils::{
        ScriptedSource, other_packet_datagram, sample_header, sample_telemetry, telemetry_datagram,
    };

    fn ingestor(n: u32) -> (Ingestor, BroadcastHub) {
        let hub = BroadcastHub::new();
        (Ingestor::new(hub.clone(), SampleInterval::new(n).unwrap()), hub)
    }

    fn player_datagram(frame: u32, speed: u16) -> Vec<u8> {
        let header = PacketHeader { player_car_index: 1, ..sample_header(frame) };
        telemetry_datagram(&header, &[sample_telemetry(0), sample_telemetry(speed)])
    }

    #[test]
    fn player_car_record_is_broadcast() {
        let (mut ingestor, hub) = ingestor(2);
        let mut sub = hub.subscribe(8);

        let verdict = ingestor.handle(&player_datagram(4, 301));
        assert_eq!(verdict, Verdict::Broadcast(sample_telemetry(301)));
        assert_eq!(sub.try_recv().unwrap().speed, 301);
    }

    #[test]
    fn short_datagram_is_skipped() {
        let (mut ingestor, _hub) = ingestor(1);
        assert_eq!(
            ingestor.process(&[0u8; HEADER_SIZE - 1]),
            Verdict::Skipped(SkipReason::TooShort { len: HEADER_SIZE - 1 })
        );
        assert_eq!(ingestor.process(&[]), Verdict::Skipped(SkipReason::TooShort { len: 0 }));
    }

    #[test]
    fn other_packet_kinds_are_ignored_without_touching_sampling() {
        let (mut ingestor, _hub) = ingestor(1);
        assert_eq!(
            ingestor.process(&other_packet_datagram(2, 10)),
            Verdict::Skipped(SkipReason::OtherPacket { packet_id: 2 })
        );
        // Frame 10 was not consumed by the lap-data packet
        assert!(matches!(ingestor.process(&player_datagram(10, 1)), Verdict::Broadcast(_)));
    }

    #[test]
    fn sampling_sequence_yields_expected_frames() {
        let (mut ingestor, hub) = ingestor(2);
        let mut sub = hub.subscribe(16);

        for (i, frame) in [0u32, 1, 2, 2, 3, 4].into_iter().enumerate() {
            ingestor.handle(&player_datagram(frame, i as u16));
        }

        let speeds: Vec<u16> = std::iter::from_fn(|| sub.try_recv()).map(|r| r.speed).collect();
        // Datagram positions of frames 0, 2 and 4
        assert_eq!(speeds, vec![0, 2, 5]);

        let stats = ingestor.stats();
        assert_eq!(stats.received, 6);
        assert_eq!(stats.broadcast, 3);
        assert_eq!(stats.off_cadence, 2);
        assert_eq!(stats.duplicate, 1);
    }

    #[test]
    fn truncated_payload_is_skipped_after_sampling() {
        let (mut ingestor, hub) = ingestor(1);
        let header = PacketHeader { player_car_index: 3, ..sample_header(7) };
        let datagram = telemetry_datagram(&header, &[sample_telemetry(0), sample_telemetry(1)]);

        assert_eq!(
            ingestor.process(&datagram),
            Verdict::Skipped(SkipReason::TruncatedPayload { car_index: 3, len: datagram.len() })
        );
        assert!(hub.is_empty());
        // The sampled frame still counts as accepted
        assert_eq!(
            ingestor.process(&player_datagram(7, 0)),
            Verdict::Skipped(SkipReason::Duplicate)
        );
    }

    #[test]
    fn new_session_resets_duplicate_tracking() {
        let (mut ingestor, _hub) = ingestor(1);
        let first = PacketHeader { session_uid: 1, ..sample_header(100) };
        let second = PacketHeader { session_uid: 2, ..sample_header(100) };
        let cars = [sample_telemetry(0)];

        assert!(matches!(ingestor.process(&telemetry_datagram(&first, &cars)), Verdict::Broadcast(_)));
        assert_eq!(
            ingestor.process(&telemetry_datagram(&first, &cars)),
            Verdict::Skipped(SkipReason::Duplicate)
        );
        assert!(matches!(
            ingestor.process(&telemetry_datagram(&second, &cars)),
            Verdict::Broadcast(_)
        ));
    }

    #[tokio::test]
    async fn run_survives_read_errors_and_garbage() {
        let (ingestor, hub) = ingestor(1);
        let mut sub = hub.subscribe(8);
        let cancel = CancellationToken::new();

        let source = ScriptedSource::new(vec![
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "icmp unreachable")),
            Ok(vec![0xFF; 3]),
            Ok(player_datagram(1, 111)),
            Err(io::Error::other("transient")),
            Ok(vec![0u8; 4000]),
            Ok(player_datagram(2, 222)),
        ])
        .cancel_when_done(cancel.clone());

        let stats = ingestor.run(source, cancel).await;

        assert_eq!(stats.read_errors, 2);
        assert_eq!(stats.received, 4);
        assert_eq!(stats.broadcast, 2);
        assert_eq!(sub.recv().await.unwrap().speed, 111);
        assert_eq!(sub.recv().await.unwrap().speed, 222);
    }

    #[tokio::test]
    async fn spawned_loop_stops_on_cancel() {
        let (ingestor, _hub) = ingestor(1);
        let handle = ingestor.spawn(ScriptedSource::new(Vec::new()));

        handle.cancel.cancel();
        let stats = handle.task.await.expect("ingestion task panicked");
        assert_eq!(stats, IngestStats::default());
    }
}
