//! Real-time F1 car telemetry relay.
//!
//! Paddock listens for the F1 games' UDP telemetry, decodes the player's car
//! telemetry (packet id 6), samples it down to a configurable frame rate, and
//! fans each record out to any number of WebSocket subscribers.
//!
//! # Pipeline
//!
//! ```text
//! UDP datagram ─▶ Ingestor ─▶ SamplingFilter ─▶ packet decoder ─▶ BroadcastHub ─▶ subscribers
//! ```
//!
//! - **Decoding** never panics on short or corrupt datagrams; they are skipped.
//! - **Fan-out** never waits on a subscriber: slow ones miss records, dead
//!   ones are evicted.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use paddock::{Relay, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> paddock::Result<()> {
//!     let relay = Relay::bind(RelayConfig::default()).await?.start().await?;
//!
//!     let mut subscription = relay.hub().subscribe(16);
//!     while let Some(record) = subscription.recv().await {
//!         println!("{} km/h in gear {}", record.speed, record.gear);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Decoding a datagram directly
//!
//! ```rust
//! use paddock::packet::{decode_header, decode_telemetry_at};
//!
//! fn player_speed(datagram: &[u8]) -> Option<u16> {
//!     let header = decode_header(datagram).ok()?;
//!     if !header.is_car_telemetry() {
//!         return None;
//!     }
//!     decode_telemetry_at(datagram, header.player_car_index).ok().map(|t| t.speed)
//! }
//!
//! assert_eq!(player_speed(&[0u8; 10]), None);
//! ```

mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;

pub mod config;
pub mod hub;
pub mod ingest;
pub mod packet;
pub mod relay;
pub mod sampling;
pub mod server;

// Core exports
pub use error::*;

pub use config::RelayConfig;
pub use hub::{BroadcastHub, Delivery, SharedRecord, Subscriber, SubscriberId, Subscription};
pub use ingest::{DatagramSource, IngestStats, Ingestor, SkipReason, Verdict};
pub use packet::{CarTelemetry, PacketHeader, Wheel};
pub use relay::{Relay, RunningRelay};
pub use sampling::{SampleDecision, SampleInterval, SamplingFilter};
