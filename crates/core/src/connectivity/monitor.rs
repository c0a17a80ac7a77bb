//! Connectivity monitor with explicit lifecycle management

use std::sync::Arc;

use tideline_domain::{ConnectivityConfig, ConnectivityInfo, Result, TidelineError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::ports::ReachabilityProbe;

/// Observes device reachability and publishes classified transitions.
///
/// Subscribers receive the current state immediately and every transition
/// thereafter; dropping the receiver is the (idempotent) unsubscribe. The
/// monitor owns no persisted state.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    config: ConnectivityConfig,
    tx: watch::Sender<ConnectivityInfo>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl ConnectivityMonitor {
    /// Create a monitor over the given probe. Starts out offline/unknown;
    /// the state is never assumed online without a confirmed sample.
    pub fn new(probe: Arc<dyn ReachabilityProbe>, config: ConnectivityConfig) -> Self {
        let (tx, _rx) = watch::channel(ConnectivityInfo::default());
        Self { probe, config, tx, cancellation: CancellationToken::new(), task_handle: None }
    }

    /// Start polling: one immediate sample, then on the configured interval.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(TidelineError::Internal("connectivity monitor already running".into()));
        }

        self.cancellation = CancellationToken::new();

        let initial = self.probe.sample().await;
        publish_if_changed(&self.tx, initial);
        info!(online = initial.is_online, network = %initial.network, "connectivity monitor started");

        let probe = Arc::clone(&self.probe);
        let tx = self.tx.clone();
        let poll_interval = self.config.poll_interval;
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("connectivity poll loop cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        let sample = probe.sample().await;
                        publish_if_changed(&tx, sample);
                    }
                }
            }
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop polling and wait for the task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(TidelineError::Internal("connectivity monitor not running".into()));
        }

        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("connectivity poll task panicked: {}", e);
                    return Err(TidelineError::Internal("connectivity poll task panicked".into()));
                }
                Err(_) => {
                    warn!("connectivity poll task did not stop within timeout");
                    return Err(TidelineError::Internal("connectivity poll task timeout".into()));
                }
            }
        }

        info!("connectivity monitor stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Point-in-time reachability query. Never blocks.
    pub fn current(&self) -> ConnectivityInfo {
        *self.tx.borrow()
    }

    /// Subscribe to connectivity transitions. The receiver observes the
    /// current state immediately; drop it to unsubscribe.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityInfo> {
        self.tx.subscribe()
    }
}

fn publish_if_changed(tx: &watch::Sender<ConnectivityInfo>, sample: ConnectivityInfo) {
    tx.send_if_modified(|current| {
        if *current == sample {
            return false;
        }
        debug!(
            was_online = current.is_online,
            now_online = sample.is_online,
            network = %sample.network,
            "connectivity transition"
        );
        *current = sample;
        true
    });
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("ConnectivityMonitor dropped while running; cancelling poll task");
            self.cancellation.cancel();
        }
    }
}
