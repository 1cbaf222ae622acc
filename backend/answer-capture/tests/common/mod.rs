#![allow(dead_code)]

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use trainingground_capture::{
    config::CaptureConfig,
    models::{AnswerShape, AttemptId, QuestionSet, QuestionSpec},
    services::{CaptureSession, HttpSubmissionEndpoint, ManualSignal, MemoryStore, SessionDeps},
};
use url::Url;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// One canned HTTP reply of the stub submission endpoint.
#[derive(Clone)]
pub struct StubReply {
    pub status: StatusCode,
    pub body: Value,
    pub retry_after: Option<&'static str>,
}

impl StubReply {
    pub fn accepted(id: &str) -> Self {
        Self {
            status: StatusCode::CREATED,
            body: json!({ "success": true, "id": id }),
            retry_after: None,
        }
    }

    pub fn status(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, value: &'static str) -> Self {
        self.retry_after = Some(value);
        self
    }
}

struct StubState {
    replies: Mutex<VecDeque<StubReply>>,
    requests: Mutex<Vec<Value>>,
    calls: AtomicUsize,
}

/// Local HTTP server that replays queued replies and records request bodies.
/// Once the queue is drained every call is accepted as `resp-default`.
pub struct StubEndpoint {
    pub url: Url,
    state: Arc<StubState>,
}

impl StubEndpoint {
    pub async fn spawn(replies: Vec<StubReply>) -> Self {
        let state = Arc::new(StubState {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/submissions", post(handle_submission))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: Url::parse(&format!("http://{}/submissions", addr)).unwrap(),
            state,
        }
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn handle_submission(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    state.requests.lock().unwrap().push(body);

    let reply = state
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| StubReply::accepted("resp-default"));

    let mut response = (reply.status, Json(reply.body)).into_response();
    if let Some(retry_after) = reply.retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static(retry_after));
    }
    response
}

/// URL on which nothing listens.
pub async fn refused_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{}/submissions", addr)).unwrap()
}

/// Default configuration with millisecond-scale timings so real-clock tests
/// stay fast.
pub fn fast_config(url: &Url) -> CaptureConfig {
    let mut config = CaptureConfig::default();
    config.submission.url = Some(url.to_string());
    config.submission.timeout_ms = 2000;
    config.retry.base_backoff_ms = 10;
    config.retry.default_retry_delay_ms = 50;
    config.autosave.debounce_ms = 50;
    config.autosave.status_reset_ms = 500;
    config
}

pub fn two_questions() -> QuestionSet {
    QuestionSet::new([
        QuestionSpec {
            id: "Q1".to_string(),
            shape: AnswerShape::Text,
        },
        QuestionSpec {
            id: "Q2".to_string(),
            shape: AnswerShape::Choices,
        },
    ])
}

pub async fn start_session(
    config: CaptureConfig,
    store: MemoryStore,
    signal: Arc<ManualSignal>,
) -> CaptureSession {
    let endpoint = HttpSubmissionEndpoint::from_settings(&config.submission).unwrap();
    let deps = SessionDeps {
        endpoint: Arc::new(endpoint),
        store: Arc::new(store),
        connectivity: signal,
    };
    CaptureSession::start(AttemptId::new("quiz-42"), two_questions(), deps, config).await
}
