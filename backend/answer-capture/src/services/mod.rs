use anyhow::Result;
use std::sync::Arc;

use crate::config::CaptureConfig;

pub mod autosave;
pub mod capture_session;
pub mod connectivity;
pub mod draft_store;
pub mod durable_store;
pub mod error_classifier;
pub mod submission_client;

pub use capture_session::{CaptureSession, SessionDeps};
pub use connectivity::{ConnectivityMonitor, ConnectivitySignal, ManualSignal, Subscription};
pub use durable_store::{DurableStore, FileStore, MemoryStore};
pub use submission_client::{HttpSubmissionEndpoint, SubmissionEndpoint, SubmissionFailure};

impl SessionDeps {
    /// Wires the production collaborators from configuration: HTTP endpoint,
    /// file-backed drafts and, when a health URL is set, a polling probe.
    /// Without a health URL the device is assumed online.
    pub fn from_config(config: &CaptureConfig) -> Result<Self> {
        let endpoint = HttpSubmissionEndpoint::from_settings(&config.submission)?;
        tracing::info!(url = %endpoint.url(), "Submission endpoint configured");

        let store = FileStore::from_settings(&config.storage);
        tracing::info!(dir = %store.dir().display(), "Draft storage configured");

        let connectivity: Arc<dyn ConnectivitySignal> = match config.connectivity.health_endpoint()? {
            Some(health_url) => Arc::new(connectivity::HealthProbeSignal::spawn(
                health_url,
                config.connectivity.probe_interval(),
                reqwest::Client::new(),
            )),
            None => Arc::new(ManualSignal::new(true)),
        };

        Ok(Self {
            endpoint: Arc::new(endpoint),
            store: Arc::new(store),
            connectivity,
        })
    }
}
