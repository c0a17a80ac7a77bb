//! Sync engine: owns the mutation queue and drains it when online.
//!
//! Drains are triggered by connectivity regain, an explicit
//! [`SyncEngine::force_sync`], a foreground nudge, a periodic interval, or an
//! enqueue while online. All triggers funnel into one drain path guarded by a
//! mutex, so a trigger arriving mid-drain observes "drain in progress" and
//! either skips (background triggers) or waits (`force_sync`). Claimed
//! operations are flipped to in-flight before dispatch begins, which makes
//! double dispatch impossible across concurrent triggers and leaves crashed
//! sessions recoverable as pending on the next launch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tideline_domain::{
    ConnectivityInfo, EngineConfig, OperationStatus, Priority, QueuedOperation, Result,
    SyncStatus, TidelineError,
};
use tokio::sync::{watch, Mutex as TokioMutex, Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::ports::{Clock, CredentialRefresher, KeyValueStore, OperationQueue};
use crate::sync::backoff::BackoffPolicy;
use crate::sync::errors::{DispatchError, FailureKind};
use crate::sync::registry::ExecutorRegistry;

/// Key/value slot holding the last observed connectivity (cold-start hint).
pub const LAST_CONNECTIVITY_KEY: &str = "connectivity:last_known";
/// Key/value slot holding the completion time of the last drain pass.
pub const LAST_DRAIN_KEY: &str = "sync:last_drain";

/// Dependencies injected into the engine.
///
/// Everything behind these seams is replaceable in tests: an in-memory
/// queue, a manual clock, scripted executors.
pub struct EngineDeps {
    pub queue: Arc<dyn OperationQueue>,
    pub store: Arc<dyn KeyValueStore>,
    pub registry: Arc<ExecutorRegistry>,
    /// Subscription obtained from the connectivity monitor.
    pub connectivity: watch::Receiver<ConnectivityInfo>,
    pub refresher: Option<Arc<dyn CredentialRefresher>>,
    pub clock: Arc<dyn Clock>,
}

/// Offline-first sync engine with explicit lifecycle management.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

#[derive(Default, Clone)]
struct StatusExtras {
    last_sync_at: Option<i64>,
    last_error: Option<String>,
}

struct EngineInner {
    queue: Arc<dyn OperationQueue>,
    store: Arc<dyn KeyValueStore>,
    registry: Arc<ExecutorRegistry>,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    backoff: BackoffPolicy,
    connectivity: watch::Receiver<ConnectivityInfo>,
    status_tx: watch::Sender<SyncStatus>,
    drain_lock: TokioMutex<()>,
    is_syncing: AtomicBool,
    wakeup: Notify,
    extras: StdMutex<StatusExtras>,
}

impl SyncEngine {
    /// Create a new engine. Call [`SyncEngine::start`] to begin draining.
    pub fn new(deps: EngineDeps, config: EngineConfig) -> Self {
        let backoff = BackoffPolicy::from(&config.retry);
        let (status_tx, _rx) = watch::channel(SyncStatus::default());

        let inner = EngineInner {
            queue: deps.queue,
            store: deps.store,
            registry: deps.registry,
            refresher: deps.refresher,
            clock: deps.clock,
            config,
            backoff,
            connectivity: deps.connectivity,
            status_tx,
            drain_lock: TokioMutex::new(()),
            is_syncing: AtomicBool::new(false),
            wakeup: Notify::new(),
            extras: StdMutex::new(StatusExtras::default()),
        };

        Self {
            inner: Arc::new(inner),
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the engine: recover interrupted work, then spawn the background
    /// loop reacting to connectivity transitions, the periodic interval, and
    /// enqueue nudges.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(TidelineError::Internal("sync engine already running".into()));
        }

        // A crash between claim and completion leaves rows in-flight;
        // release them so delivery stays at-least-once across restarts.
        let released = self.inner.queue.release_in_flight().await?;
        if released > 0 {
            info!(released, "recovered interrupted operations from previous session");
        }

        self.cancellation = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let connectivity_rx = self.inner.connectivity.clone();
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            EngineInner::run_loop(inner, connectivity_rx, cancel).await;
        });
        self.task_handle = Some(handle);

        if let Err(err) = self.inner.publish_status().await {
            warn!(error = %err, "failed to publish initial status");
        }

        // Drain anything left over from the previous session.
        self.inner.wakeup.notify_one();
        info!("sync engine started");
        Ok(())
    }

    /// Stop the engine and wait for the background loop to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(TidelineError::Internal("sync engine not running".into()));
        }

        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.inner.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("engine task panicked: {}", e);
                    return Err(TidelineError::Internal("engine task panicked".into()));
                }
                Err(_) => {
                    warn!("engine task did not stop within timeout");
                    return Err(TidelineError::Internal("engine task timeout".into()));
                }
            }
        }

        info!("sync engine stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Queue a mutation for dispatch. Never performs inline network I/O;
    /// fails only if the local store does.
    #[instrument(skip(self, payload), fields(kind = %kind))]
    pub async fn enqueue(
        &self,
        kind: &str,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<String> {
        let op = QueuedOperation {
            id: Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            payload_json: payload.to_string(),
            priority,
            created_at: self.inner.clock.now(),
            attempts: 0,
            next_attempt_at: None,
            status: OperationStatus::Pending,
            last_error: None,
        };

        self.inner.queue.enqueue(&op).await?;
        debug!(id = %op.id, priority = %op.priority, "operation enqueued");

        if let Err(err) = self.inner.publish_status().await {
            warn!(error = %err, "failed to publish status after enqueue");
        }
        self.inner.wakeup.notify_one();

        Ok(op.id)
    }

    /// Snapshot of queue and connectivity state. Two calls with no
    /// intervening transition return equal values.
    pub async fn status(&self) -> Result<SyncStatus> {
        self.inner.compose_status().await
    }

    /// Subscribe to status transitions. The receiver observes the current
    /// status immediately; drop it to unsubscribe.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Trigger an immediate drain and wait for the pass to complete.
    ///
    /// If a drain is already running this waits for it to release the lock
    /// and then runs its own pass. Individual item failures never surface
    /// here; only inability to read the queue does.
    pub async fn force_sync(&self) -> Result<()> {
        EngineInner::drain(&self.inner, true).await
    }

    /// Nudge the background loop to drain soon (e.g. on app foreground).
    pub fn request_drain(&self) {
        self.inner.wakeup.notify_one();
    }

    /// Discard all pending and dead-lettered operations.
    ///
    /// Already-dispatched in-flight operations are not awaited; their
    /// results land on the now-empty queue and are discarded.
    pub async fn clear_queue(&self) -> Result<()> {
        self.inner.queue.clear().await?;
        info!("sync queue cleared");
        self.inner.publish_status().await
    }

    /// Dead-lettered operations held for manual inspection.
    pub async fn dead_letters(&self) -> Result<Vec<QueuedOperation>> {
        self.inner.queue.dead_letters().await
    }

    /// Move a dead-lettered operation back to pending with a fresh attempt
    /// budget. Returns false if the id does not name a dead operation.
    pub async fn retry_dead(&self, id: &str) -> Result<bool> {
        let reset = self.inner.queue.retry_dead(id).await?;
        if reset {
            if let Err(err) = self.inner.publish_status().await {
                warn!(error = %err, "failed to publish status after dead-letter retry");
            }
            self.inner.wakeup.notify_one();
        }
        Ok(reset)
    }

    /// Discard a single dead-lettered operation.
    pub async fn discard_dead(&self, id: &str) -> Result<bool> {
        let removed = self.inner.queue.remove_dead(id).await?;
        if removed {
            if let Err(err) = self.inner.publish_status().await {
                warn!(error = %err, "failed to publish status after dead-letter discard");
            }
        }
        Ok(removed)
    }
}

impl EngineInner {
    async fn run_loop(
        inner: Arc<Self>,
        mut connectivity_rx: watch::Receiver<ConnectivityInfo>,
        cancel: CancellationToken,
    ) {
        let mut was_usable = connectivity_rx.borrow().is_usable();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("engine loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(inner.config.drain_interval) => {
                    Self::background_drain(&inner).await;
                }
                _ = inner.wakeup.notified() => {
                    Self::background_drain(&inner).await;
                }
                changed = connectivity_rx.changed() => {
                    if changed.is_err() {
                        // Monitor went away; nothing left to react to.
                        debug!("connectivity channel closed; engine loop parked");
                        cancel.cancelled().await;
                        break;
                    }
                    let info = *connectivity_rx.borrow_and_update();
                    inner.checkpoint_connectivity(info).await;
                    if let Err(err) = inner.publish_status().await {
                        warn!(error = %err, "failed to publish status after connectivity change");
                    }

                    let usable = info.is_usable();
                    if usable && !was_usable {
                        info!(network = %info.network, "connectivity regained; draining queue");
                        Self::background_drain(&inner).await;
                    }
                    was_usable = usable;
                }
            }
        }
    }

    async fn background_drain(inner: &Arc<Self>) {
        if let Err(err) = Self::drain(inner, false).await {
            error!(error = %err, "background drain failed");
            inner.record_error(err.to_string());
        }
    }

    /// One drain pass. `wait_for_lock` distinguishes `force_sync` (waits on
    /// a running drain) from background triggers (skip if one is running).
    async fn drain(inner: &Arc<Self>, wait_for_lock: bool) -> Result<()> {
        if !inner.connectivity.borrow().is_usable() {
            debug!("skipping drain: not confirmed online");
            return Ok(());
        }

        let guard = if wait_for_lock {
            inner.drain_lock.lock().await
        } else {
            match inner.drain_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    debug!("drain already in progress");
                    return Ok(());
                }
            }
        };

        // Connectivity may have flapped while waiting on the lock.
        if !inner.connectivity.borrow().is_usable() {
            return Ok(());
        }

        inner.is_syncing.store(true, Ordering::SeqCst);
        if let Err(err) = inner.publish_status().await {
            inner.is_syncing.store(false, Ordering::SeqCst);
            return Err(err);
        }

        let result = Self::drain_claimed(inner).await;

        inner.is_syncing.store(false, Ordering::SeqCst);
        if let Err(err) = inner.publish_status().await {
            warn!(error = %err, "failed to publish status after drain");
        }

        drop(guard);
        result
    }

    async fn drain_claimed(inner: &Arc<Self>) -> Result<()> {
        let now = inner.clock.now();
        let batch = inner.queue.claim_due(now, inner.config.batch_size).await?;
        if batch.is_empty() {
            debug!("no eligible operations to drain");
            return Ok(());
        }

        info!(count = batch.len(), "draining sync queue");

        let semaphore = Arc::new(Semaphore::new(inner.config.worker_count.max(1)));
        // At most one credential refresh per pass; None = not attempted yet.
        let refresh_outcome: Arc<TokioMutex<Option<bool>>> = Arc::new(TokioMutex::new(None));
        let mut tasks: JoinSet<()> = JoinSet::new();

        for op in batch {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let task_inner = Arc::clone(inner);
            let refresh_outcome = Arc::clone(&refresh_outcome);
            tasks.spawn(async move {
                let _permit = permit;
                task_inner.dispatch_one(op, &refresh_outcome).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "dispatch task panicked");
            }
        }

        inner.record_drain_completed().await;
        Ok(())
    }

    async fn dispatch_one(&self, op: QueuedOperation, refresh_outcome: &TokioMutex<Option<bool>>) {
        let Some(executor) = self.registry.get(&op.kind) else {
            warn!(id = %op.id, kind = %op.kind, "no executor registered; dead-lettering");
            let err = DispatchError::Client(format!("no executor registered for kind '{}'", op.kind));
            self.settle_failure(&op, &err, refresh_outcome).await;
            self.publish_after_dispatch().await;
            return;
        };

        let outcome =
            match tokio::time::timeout(self.config.dispatch_timeout, executor.execute(&op)).await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Timeout(self.config.dispatch_timeout)),
            };

        match outcome {
            Ok(()) => {
                debug!(id = %op.id, kind = %op.kind, "operation dispatched");
                if let Err(err) = self.queue.remove(&op.id).await {
                    warn!(id = %op.id, error = %err, "failed to remove dispatched operation");
                    self.record_error(err.to_string());
                }
            }
            Err(err) => {
                warn!(
                    id = %op.id,
                    kind = %op.kind,
                    attempts = op.attempts,
                    error = %err,
                    "dispatch failed"
                );
                self.settle_failure(&op, &err, refresh_outcome).await;
            }
        }

        self.publish_after_dispatch().await;
    }

    /// Apply the failure state machine to one operation.
    async fn settle_failure(
        &self,
        op: &QueuedOperation,
        err: &DispatchError,
        refresh_outcome: &TokioMutex<Option<bool>>,
    ) {
        let reason = truncate_reason(&err.to_string());
        self.record_error(reason.clone());

        let result = match err.kind() {
            FailureKind::Permanent => self.queue.mark_dead(&op.id, &reason).await,
            FailureKind::AuthExpired => {
                // Guaranteed-fail retries should not burn the attempt budget:
                // refresh credentials (once per pass) and keep attempts as-is.
                let refreshed = self.refresh_credentials_once(refresh_outcome).await;
                let next_attempt_at = if refreshed {
                    self.clock.now()
                } else {
                    self.clock.now() + duration_to_secs(self.config.retry.base_delay)
                };
                self.queue.reschedule(&op.id, op.attempts, next_attempt_at, &reason).await
            }
            FailureKind::Transient => {
                let attempts = op.attempts.saturating_add(1);
                if attempts >= self.config.retry.max_attempts {
                    debug!(id = %op.id, attempts, "attempt budget exhausted; dead-lettering");
                    self.queue.mark_dead(&op.id, &reason).await
                } else {
                    let delay = self.backoff.delay(attempts);
                    let next_attempt_at = self.clock.now() + duration_to_secs(delay);
                    self.queue.reschedule(&op.id, attempts, next_attempt_at, &reason).await
                }
            }
        };

        if let Err(err) = result {
            warn!(id = %op.id, error = %err, "failed to record dispatch failure");
            self.record_error(err.to_string());
        }
    }

    async fn refresh_credentials_once(&self, outcome: &TokioMutex<Option<bool>>) -> bool {
        let mut guard = outcome.lock().await;
        if let Some(result) = *guard {
            return result;
        }

        let result = match &self.refresher {
            Some(refresher) => match refresher.refresh().await {
                Ok(()) => {
                    info!("credentials refreshed");
                    true
                }
                Err(err) => {
                    warn!(error = %err, "credential refresh failed");
                    false
                }
            },
            None => false,
        };

        *guard = Some(result);
        result
    }

    async fn publish_after_dispatch(&self) {
        if let Err(err) = self.publish_status().await {
            warn!(error = %err, "failed to publish status after dispatch");
        }
    }

    async fn compose_status(&self) -> Result<SyncStatus> {
        let counts = self.queue.counts().await?;
        let info = *self.connectivity.borrow();
        let extras = self.extras_snapshot();

        Ok(SyncStatus {
            is_online: info.is_online,
            is_syncing: self.is_syncing.load(Ordering::SeqCst),
            // In-flight operations are still unconfirmed work.
            pending_count: counts.pending + counts.in_flight,
            failed_count: counts.dead,
            last_sync_at: extras.last_sync_at,
            last_error: extras.last_error,
        })
    }

    async fn publish_status(&self) -> Result<()> {
        let status = self.compose_status().await?;
        self.status_tx.send_replace(status);
        Ok(())
    }

    async fn record_drain_completed(&self) {
        let finished_at = self.clock.now();
        {
            let mut extras = self.extras_lock();
            extras.last_sync_at = Some(finished_at);
        }
        if let Err(err) = self.store.set(LAST_DRAIN_KEY, &finished_at.to_string()).await {
            warn!(error = %err, "failed to checkpoint last drain time");
        }
    }

    async fn checkpoint_connectivity(&self, info: ConnectivityInfo) {
        // Cold-start display hint only, not a durability guarantee.
        match serde_json::to_string(&info) {
            Ok(json) => {
                if let Err(err) = self.store.set(LAST_CONNECTIVITY_KEY, &json).await {
                    warn!(error = %err, "failed to checkpoint connectivity");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize connectivity"),
        }
    }

    fn record_error(&self, message: String) {
        let mut extras = self.extras_lock();
        extras.last_error = Some(message);
    }

    fn extras_snapshot(&self) -> StatusExtras {
        self.extras_lock().clone()
    }

    fn extras_lock(&self) -> std::sync::MutexGuard<'_, StatusExtras> {
        match self.extras.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn truncate_reason(reason: &str) -> String {
    const MAX_LEN: usize = 256;
    if reason.len() <= MAX_LEN {
        return reason.to_string();
    }

    let mut truncated = reason.chars().take(MAX_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}

fn duration_to_secs(delay: Duration) -> i64 {
    i64::try_from(delay.as_secs()).unwrap_or(i64::MAX)
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncEngine dropped while running; cancelling background loop");
            self.cancellation.cancel();
        }
    }
}
