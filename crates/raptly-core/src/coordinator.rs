// ── Polling/discovery coordinator ──
//
// Drives the refresh cadence against one `RaptClient`, maintains the
// current snapshot, and detects first-appearance of devices. The scheduled
// refresh and the manual discovery trigger are two call sites into the same
// serialized client, so both queue on its rate gate.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use raptly_api::{DeviceRecord, RaptClient, TransportConfig};

use crate::config::MonitorConfig;
use crate::error::CoreError;
use crate::snapshot::DeviceSnapshot;

/// A handler invoked once per discovery event with the newly found records.
pub type DiscoveryCallback =
    Arc<dyn Fn(Vec<DeviceRecord>) -> BoxFuture<'static, ()> + Send + Sync>;

/// The main entry point for hosts.
///
/// Cheaply cloneable via `Arc`. Owns the refresh cadence, the device
/// snapshot, and the known-device set used to classify a device as "new"
/// exactly once, at first appearance.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    client: RaptClient,
    update_interval: Duration,
    snapshot: watch::Sender<Option<Arc<DeviceSnapshot>>>,
    /// Whether the most recent poll succeeded. `false` until the first
    /// successful poll: before that there is nothing a host could serve.
    last_update_success: watch::Sender<bool>,
    /// Identifiers ever seen. Grows monotonically; never pruned.
    known_ids: Mutex<HashSet<String>>,
    callbacks: Mutex<Vec<DiscoveryCallback>>,
    refresh_task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Coordinator {
    /// Create a coordinator for the production cloud endpoints.
    ///
    /// Does NOT poll — call [`start()`](Self::start) to perform the initial
    /// refresh and spawn the background task, or drive
    /// [`refresh()`](Self::refresh) on the host's own schedule.
    pub fn new(config: &MonitorConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: config.request_timeout,
        };
        let client = RaptClient::new(config.username.clone(), config.api_key.clone(), &transport)
            .map_err(CoreError::Setup)?;
        Ok(Self::with_client(client, config.update_interval))
    }

    /// Create a coordinator around an existing client.
    ///
    /// Use this when the host configures the client itself (custom
    /// endpoints, a pooled `reqwest::Client`, a test server).
    pub fn with_client(client: RaptClient, update_interval: Duration) -> Self {
        let (snapshot, _) = watch::channel(None);
        let (last_update_success, _) = watch::channel(false);
        Self {
            inner: Arc::new(CoordinatorInner {
                client,
                update_interval,
                snapshot,
                last_update_success,
                known_ids: Mutex::new(HashSet::new()),
                callbacks: Mutex::new(Vec::new()),
                refresh_task: Mutex::new(None),
            }),
        }
    }

    /// The client this coordinator polls through.
    pub fn client(&self) -> &RaptClient {
        &self.inner.client
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Perform the initial refresh and spawn the background refresh task.
    ///
    /// The initial refresh error propagates so the host can defer setup
    /// (bad credentials vs. cloud unreachable — see
    /// [`CoreError::is_auth_failure`]). A zero update interval skips the
    /// background task.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.refresh().await?;

        if !self.inner.update_interval.is_zero() {
            let mut slot = self.inner.refresh_task.lock().await;
            if slot.is_none() {
                let cancel = CancellationToken::new();
                let handle = tokio::spawn(refresh_task(
                    self.clone(),
                    self.inner.update_interval,
                    cancel.clone(),
                ));
                *slot = Some((cancel, handle));
            }
        }

        info!(
            interval_secs = self.inner.update_interval.as_secs(),
            "coordinator started"
        );
        Ok(())
    }

    /// Cancel the background refresh task and wait for it to finish.
    ///
    /// Idempotent; a later [`start()`](Self::start) spawns a fresh task.
    pub async fn shutdown(&self) {
        let task = self.inner.refresh_task.lock().await.take();
        if let Some((cancel, handle)) = task {
            cancel.cancel();
            let _ = handle.await;
            debug!("coordinator shut down");
        }
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Poll all four categories and replace the snapshot.
    ///
    /// Every identifier seen is recorded in the known-device set, silently:
    /// scheduled refreshes never fire discovery events. On failure the
    /// previous snapshot is retained and the error surfaces as
    /// [`CoreError::UpdateFailed`].
    pub async fn refresh(&self) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let inventory = match self.inner.client.all_devices().await {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!(error = %e, "poll failed; keeping previous snapshot");
                let _ = self.inner.last_update_success.send(false);
                return Err(CoreError::UpdateFailed(e));
            }
        };

        {
            let mut known = self.inner.known_ids.lock().await;
            for record in inventory.iter() {
                if let Some(id) = record.id() {
                    known.insert(id.to_owned());
                }
            }
        }

        let snapshot = Arc::new(DeviceSnapshot::from_inventory(inventory));
        debug!(
            controllers = snapshot.temperature_controllers.len(),
            hydrometers = snapshot.hydrometers.len(),
            chambers = snapshot.fermentation_chambers.len(),
            brewzillas = snapshot.brewzillas.len(),
            "poll complete"
        );
        let _ = self.inner.snapshot.send(Some(Arc::clone(&snapshot)));
        let _ = self.inner.last_update_success.send(true);
        Ok(snapshot)
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Manually trigger device discovery.
    ///
    /// Re-fetches all categories, fires the registered callbacks with any
    /// records whose identifier has never been seen, then performs an
    /// ordinary refresh (so a manual discovery always doubles as a manual
    /// refresh). Best-effort: every failure is logged, none propagate.
    ///
    /// With the background task running, "new" means "appeared since the
    /// last successful poll" — the scheduled refresh records identifiers
    /// without firing events, so this finds exactly the devices plugged in
    /// since then.
    pub async fn discover_devices(&self) {
        let inventory = match self.inner.client.all_devices().await {
            Ok(inventory) => inventory,
            Err(e) => {
                error!(error = %e, "device discovery failed");
                return;
            }
        };

        let new_devices: Vec<DeviceRecord> = {
            let mut known = self.inner.known_ids.lock().await;
            inventory
                .iter()
                .filter(|record| {
                    record
                        .id()
                        .is_some_and(|id| known.insert(id.to_owned()))
                })
                .cloned()
                .collect()
        };

        if new_devices.is_empty() {
            info!("no new devices found");
        } else {
            info!(count = new_devices.len(), "discovered new devices");
            // Snapshot the handler list and release the lock before
            // awaiting: a handler may call back into the coordinator.
            let callbacks: Vec<DiscoveryCallback> =
                self.inner.callbacks.lock().await.clone();
            for callback in &callbacks {
                callback(new_devices.clone()).await;
            }
        }

        if let Err(e) = self.refresh().await {
            warn!(error = %e, "post-discovery refresh failed");
        }
    }

    /// Register a handler invoked once per discovery event.
    ///
    /// Handlers run sequentially in registration order and are awaited to
    /// completion before the trailing refresh proceeds.
    pub async fn register_discovery_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(Vec<DeviceRecord>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: DiscoveryCallback = Arc::new(move |devices| Box::pin(callback(devices)));
        self.inner.callbacks.lock().await.push(handler);
    }

    /// Identifiers ever observed, sorted. Diagnostic accessor.
    pub async fn known_device_ids(&self) -> Vec<String> {
        let known = self.inner.known_ids.lock().await;
        let mut ids: Vec<String> = known.iter().cloned().collect();
        ids.sort();
        ids
    }

    // ── State observation ────────────────────────────────────────────

    /// The current snapshot, or `None` before the first successful poll.
    pub fn snapshot(&self) -> Option<Arc<DeviceSnapshot>> {
        self.inner.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot replacements.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<DeviceSnapshot>>> {
        self.inner.snapshot.subscribe()
    }

    /// Whether the most recent poll succeeded. Hosts drive their
    /// "unavailable" indication from this flag.
    pub fn last_update_success(&self) -> bool {
        *self.inner.last_update_success.borrow()
    }

    /// Subscribe to poll-health changes.
    pub fn subscribe_health(&self) -> watch::Receiver<bool> {
        self.inner.last_update_success.subscribe()
    }

    /// How long ago the last successful poll occurred, or `None` if no
    /// poll has succeeded yet.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.snapshot()
            .map(|snapshot| chrono::Utc::now() - snapshot.observed_at)
    }
}

// ── Background task ──────────────────────────────────────────────────

/// Periodically refresh until cancelled. Failed polls are logged and
/// retried at the next tick.
async fn refresh_task(coordinator: Coordinator, interval: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(interval);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = coordinator.refresh().await {
                    warn!(error = %e, "scheduled refresh failed");
                }
            }
        }
    }
}
