//! Relay configuration from command-line flags and environment variables

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

use crate::ingest::DEFAULT_RECV_BUFFER;
use crate::packet::HEADER_SIZE;
use crate::sampling::SampleInterval;
use crate::{RelayError, Result};

/// Default UDP port the F1 games send telemetry to.
pub const DEFAULT_UDP_PORT: u16 = 20777;

/// Default per-subscriber queue depth, in records.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 16;

#[derive(Parser, Debug, Clone)]
#[command(name = "paddock")]
#[command(about = "Relay F1 car telemetry from UDP to WebSocket subscribers")]
#[command(version)]
pub struct RelayConfig {
    /// Address to receive game telemetry on
    #[arg(long, env = "UDP_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub udp_host: IpAddr,

    /// UDP port configured in the game's telemetry settings
    #[arg(long, env = "UDP_PORT", default_value_t = DEFAULT_UDP_PORT)]
    pub udp_port: u16,

    /// Forward one frame in every N (1 forwards every frame)
    #[arg(long, env = "SAMPLE_EVERY_N_FRAMES", default_value_t = SampleInterval::default())]
    pub sample_every_n_frames: SampleInterval,

    /// Address serving /telemetry (WebSocket) and /healthz
    #[arg(long, env = "WS_ADDR", default_value = "0.0.0.0:8080")]
    pub ws_addr: SocketAddr,

    /// Records buffered per subscriber before it starts missing frames
    #[arg(long, env = "SUBSCRIBER_QUEUE", default_value_t = DEFAULT_SUBSCRIBER_QUEUE)]
    pub subscriber_queue: usize,

    /// UDP receive buffer in bytes
    #[arg(long, env = "RECV_BUFFER", default_value_t = DEFAULT_RECV_BUFFER)]
    pub recv_buffer: usize,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            udp_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            udp_port: DEFAULT_UDP_PORT,
            sample_every_n_frames: SampleInterval::default(),
            ws_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
            recv_buffer: DEFAULT_RECV_BUFFER,
            verbose: 0,
        }
    }
}

impl RelayConfig {
    /// Socket address the ingestion socket binds to.
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.udp_host, self.udp_port)
    }

    /// Default log filter directive for the configured verbosity.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.subscriber_queue == 0 {
            return Err(RelayError::config("subscriber_queue", "must be at least 1"));
        }
        if self.recv_buffer < HEADER_SIZE {
            return Err(RelayError::config(
                "recv_buffer",
                format!("must be at least {HEADER_SIZE} bytes, got {}", self.recv_buffer),
            ));
        }
        Ok(())
    }
}
