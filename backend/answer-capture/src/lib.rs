//! Resilient answer capture for quizzes: answers are kept on the device
//! while the respondent works and submitted exactly once, even across
//! reloads, flaky networks and endpoint outages.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod utils;

pub use config::CaptureConfig;
pub use error::{CaptureError, StoreError};
pub use services::{CaptureSession, SessionDeps};
