//! Wiring of UDP ingestion, the broadcast hub and the subscription server

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::RelayConfig;
use crate::hub::BroadcastHub;
use crate::ingest::{IngestStats, Ingestor};
use crate::{RelayError, Result, server};

/// A relay whose UDP socket is bound but which is not yet running.
pub struct Relay {
    config: RelayConfig,
    socket: UdpSocket,
    hub: BroadcastHub,
}

impl Relay {
    /// Validate `config` and bind the ingestion socket.
    ///
    /// Fails if the configuration is invalid or the UDP address is taken.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        config.validate()?;
        let addr = config.udp_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| RelayError::bind_failed("UDP socket", addr, e))?;
        let local = socket.local_addr()?;
        info!(addr = %local, "Listening for F1 telemetry");

        Ok(Self { config, socket, hub: BroadcastHub::new() })
    }

    /// Address the UDP socket is bound to.
    pub fn udp_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn hub(&self) -> BroadcastHub {
        self.hub.clone()
    }

    /// Bind the subscription server and spawn the ingestion loop.
    pub async fn start(self) -> Result<RunningRelay> {
        let udp_addr = self.socket.local_addr()?;
        let server_cancel = CancellationToken::new();
        let (ws_addr, server) = server::serve(
            self.config.ws_addr,
            self.hub.clone(),
            self.config.subscriber_queue,
            server_cancel.clone(),
        )
        .await?;

        let ingest = Ingestor::new(self.hub.clone(), self.config.sample_every_n_frames)
            .with_recv_buffer(self.config.recv_buffer)
            .spawn(self.socket);

        info!(
            %udp_addr,
            %ws_addr,
            sample_every_n_frames = %self.config.sample_every_n_frames,
            "Relay running"
        );

        Ok(RunningRelay {
            hub: self.hub,
            udp_addr,
            ws_addr,
            ingest_cancel: ingest.cancel,
            ingest: Some(ingest.task),
            server_cancel,
            server: Some(server),
        })
    }
}

/// Handle to a running relay.
///
/// Dropping it cancels both tasks; [`shutdown`](Self::shutdown) additionally
/// waits for them and returns the ingestion stats.
pub struct RunningRelay {
    hub: BroadcastHub,
    udp_addr: SocketAddr,
    ws_addr: SocketAddr,
    ingest_cancel: CancellationToken,
    ingest: Option<JoinHandle<IngestStats>>,
    server_cancel: CancellationToken,
    server: Option<JoinHandle<()>>,
}

impl RunningRelay {
    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Stop ingestion, release subscribers, then stop the server.
    ///
    /// The ingestion loop finishes its in-flight broadcast before the hub
    /// drops its subscribers, so nothing already queued is lost.
    pub async fn shutdown(mut self) -> IngestStats {
        info!("Shutting down relay");
        self.ingest_cancel.cancel();
        let stats = match self.ingest.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                error!("Ingestion task failed: {}", e);
                IngestStats::default()
            }),
            None => IngestStats::default(),
        };

        self.hub.close();

        self.server_cancel.cancel();
        if let Some(server) = self.server.take() {
            if let Err(e) = server.await {
                error!("Subscription server task failed: {}", e);
            }
        }

        info!(?stats, hub = ?self.hub.stats(), "Relay stopped");
        stats
    }
}

impl Drop for RunningRelay {
    fn drop(&mut self) {
        debug!("Dropping running relay");
        self.ingest_cancel.cancel();
        self.server_cancel.cancel();
    }
}
