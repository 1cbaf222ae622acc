use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::metrics::record_connectivity;

/// Platform-provided online/offline flag with change notifications.
pub trait ConnectivitySignal: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receiver whose current value is already marked as seen.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Signal driven by the host application.
#[derive(Debug)]
pub struct ManualSignal {
    tx: watch::Sender<bool>,
}

impl ManualSignal {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Returns `true` when the state actually changed. Repeats are not broadcast.
    pub fn set_online(&self, online: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }
}

impl ConnectivitySignal for ManualSignal {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Signal that polls a health URL; any 2xx means online.
pub struct HealthProbeSignal {
    tx: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
}

impl HealthProbeSignal {
    pub fn spawn(health_url: Url, interval: Duration, http_client: Client) -> Self {
        let (tx, _rx) = watch::channel(true);
        let tx = Arc::new(tx);
        let cancel = CancellationToken::new();

        let task_tx = tx.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            tracing::info!(
                url = %health_url,
                interval_ms = interval.as_millis() as u64,
                "Starting connectivity probe"
            );
            loop {
                let online = probe(&http_client, &health_url, interval).await;
                task_tx.send_if_modified(|current| {
                    if *current == online {
                        false
                    } else {
                        *current = online;
                        true
                    }
                });

                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            tracing::debug!("Connectivity probe stopped");
        });

        Self { tx, cancel }
    }
}

async fn probe(http_client: &Client, url: &Url, timeout: Duration) -> bool {
    match http_client.get(url.clone()).timeout(timeout).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!(error = %e, "Connectivity probe failed");
            false
        }
    }
}

impl ConnectivitySignal for HealthProbeSignal {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Drop for HealthProbeSignal {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

type Observer = Arc<dyn Fn(bool) + Send + Sync>;
type Observers = Mutex<BTreeMap<u64, Observer>>;

/// Fans connectivity transitions out to observers through a single
/// subscription to the underlying signal.
pub struct ConnectivityMonitor {
    signal: Arc<dyn ConnectivitySignal>,
    observers: Arc<Observers>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl ConnectivityMonitor {
    pub fn new(signal: Arc<dyn ConnectivitySignal>) -> Self {
        Self::with_cancel(signal, CancellationToken::new())
    }

    /// The monitor stops forwarding once `cancel` fires.
    pub fn with_cancel(signal: Arc<dyn ConnectivitySignal>, cancel: CancellationToken) -> Self {
        let observers: Arc<Observers> = Arc::new(Mutex::new(BTreeMap::new()));

        let mut rx = signal.subscribe();
        let mut last = *rx.borrow_and_update();
        let task_observers = Arc::downgrade(&observers);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let online = *rx.borrow_and_update();
                if online == last {
                    continue;
                }
                last = online;

                record_connectivity(online);
                tracing::info!(online, "Connectivity changed");

                let Some(observers) = task_observers.upgrade() else {
                    break;
                };
                let snapshot: Vec<Observer> = lock(&observers).values().cloned().collect();
                for observer in snapshot {
                    observer(online);
                }
            }
        });

        Self {
            signal,
            observers,
            next_id: AtomicU64::new(0),
            cancel,
        }
    }

    pub fn is_online(&self) -> bool {
        self.signal.is_online()
    }

    /// Registers `on_change` for future transitions. Nothing is invoked now.
    pub fn observe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.observers).insert(id, Arc::new(on_change));
        Subscription {
            id,
            observers: Arc::downgrade(&self.observers),
            active: AtomicBool::new(true),
        }
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
        lock(&self.observers).clear();
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Handle returned by [`ConnectivityMonitor::observe`].
pub struct Subscription {
    id: u64,
    observers: Weak<Observers>,
    active: AtomicBool,
}

impl Subscription {
    /// Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(observers) = self.observers.upgrade() {
            lock(&observers).remove(&self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

fn lock(observers: &Observers) -> std::sync::MutexGuard<'_, BTreeMap<u64, Observer>> {
    observers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
