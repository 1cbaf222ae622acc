//! Root component of answer capture: owns the in-memory answers for one
//! attempt and drives autosave, restore and the final submission.
//!
//! Submission runs in two tiers. The retry controller handles transport-level
//! retries inside one cycle; when a cycle still fails with a retryable error,
//! the session waits the classifier's delay and runs exactly one more cycle.
//!
//! One idempotency key covers the attempt until the endpoint accepts it: both
//! tiers, later `submit` and `force_retry` calls, and resubmissions after an
//! abandoned call all reuse it. Only a validation rejection, which proves no
//! response was created, retires the key.

use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::metrics::{track_submission_attempt, CAPTURE_SESSIONS_ACTIVE, SUBMISSIONS_TOTAL};
use crate::models::{
    AnswerEntry, AnswerValue, Answers, AttemptContext, AttemptId, AutosaveStatus, DraftSnapshot,
    ErrorInfo, ErrorKind, FinalPayload, ParticipantInfo, QuestionSet, SubmissionOutcome,
    SubmissionPhase, SubmissionRequest,
};
use crate::services::autosave::{AutosaveScheduler, SnapshotSource};
use crate::services::connectivity::{ConnectivityMonitor, ConnectivitySignal, Subscription};
use crate::services::draft_store::DraftStore;
use crate::services::durable_store::DurableStore;
use crate::services::error_classifier::ErrorClassifier;
use crate::services::submission_client::{SubmissionEndpoint, SubmissionFailure};
use crate::utils::retry::{retry_async_when, retry_async_with_config};

/// External collaborators of a session.
#[derive(Clone)]
pub struct SessionDeps {
    pub endpoint: Arc<dyn SubmissionEndpoint>,
    pub store: Arc<dyn DurableStore>,
    pub connectivity: Arc<dyn ConnectivitySignal>,
}

#[derive(Default)]
struct SessionState {
    answers: Answers,
    participant: ParticipantInfo,
    error: Option<ErrorInfo>,
    last_payload: Option<FinalPayload>,
    response_id: Option<String>,
    idempotency_key: Option<String>,
    restore_attempted: bool,
}

pub struct CaptureSession {
    attempt_id: AttemptId,
    questions: QuestionSet,
    config: CaptureConfig,
    state: Arc<Mutex<SessionState>>,
    drafts: DraftStore,
    autosave: AutosaveScheduler,
    monitor: ConnectivityMonitor,
    endpoint: Arc<dyn SubmissionEndpoint>,
    classifier: ErrorClassifier,
    phase_tx: watch::Sender<SubmissionPhase>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl CaptureSession {
    /// Builds the session and restores a saved draft for `attempt_id`, if any.
    pub async fn start(
        attempt_id: AttemptId,
        questions: QuestionSet,
        deps: SessionDeps,
        config: CaptureConfig,
    ) -> Self {
        let session = Self::new(attempt_id, questions, deps, config);
        session.restore_if_present().await;
        session
    }

    fn new(
        attempt_id: AttemptId,
        questions: QuestionSet,
        deps: SessionDeps,
        config: CaptureConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let state = Arc::new(Mutex::new(SessionState::default()));
        let drafts = DraftStore::with_prefix(deps.store, config.storage.key_prefix.clone());

        let source_state = state.clone();
        let source: SnapshotSource = Arc::new(move || {
            let state = lock(&source_state);
            DraftSnapshot::new(state.answers.clone(), state.participant.clone())
        });
        let autosave = AutosaveScheduler::spawn(
            attempt_id.clone(),
            drafts.clone(),
            source,
            &config.autosave,
            cancel.child_token(),
        );
        let monitor = ConnectivityMonitor::with_cancel(deps.connectivity, cancel.child_token());
        let classifier =
            ErrorClassifier::new(Duration::from_millis(config.retry.default_retry_delay_ms));
        let (phase_tx, _phase_rx) = watch::channel(SubmissionPhase::Idle);

        CAPTURE_SESSIONS_ACTIVE.inc();
        tracing::info!(
            attempt_id = %attempt_id,
            questions = questions.len(),
            "Capture session started"
        );

        Self {
            attempt_id,
            questions,
            config,
            state,
            drafts,
            autosave,
            monitor,
            endpoint: deps.endpoint,
            classifier,
            phase_tx,
            cancel,
            closed: AtomicBool::new(false),
        }
    }

    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    /// Records one answer and arms the autosave debounce. Invalid values leave
    /// the state untouched.
    pub fn update_answer(
        &self,
        question_id: &str,
        value: impl Into<AnswerValue>,
    ) -> Result<(), CaptureError> {
        self.ensure_open()?;
        let value = value.into();

        let shape = self
            .questions
            .shape_of(question_id)
            .ok_or_else(|| CaptureError::UnknownQuestion(question_id.to_string()))?;
        if !shape.accepts(&value) {
            return Err(CaptureError::InvalidAnswer {
                question_id: question_id.to_string(),
                expected: shape.label(),
                actual: value.type_name(),
            });
        }

        {
            let mut state = self.state();
            if state.response_id.is_some() {
                return Err(CaptureError::AlreadySubmitted);
            }
            state.answers.insert(
                question_id.to_string(),
                AnswerEntry {
                    question_id: question_id.to_string(),
                    answer: value,
                },
            );
        }

        self.autosave.notify_change();
        Ok(())
    }

    /// Shallow merge. Does not arm the debounce; the next cycle picks it up.
    pub fn update_participant_info(&self, partial: ParticipantInfo) -> Result<(), CaptureError> {
        self.ensure_open()?;
        let mut state = self.state();
        if state.response_id.is_some() {
            return Err(CaptureError::AlreadySubmitted);
        }
        state.participant.merge(partial);
        Ok(())
    }

    /// Replaces the in-memory state with the saved draft. Only the first call
    /// reads the store, and [`CaptureSession::start`] already makes it.
    pub async fn restore_if_present(&self) -> bool {
        {
            let mut state = self.state();
            if state.restore_attempted {
                return false;
            }
            state.restore_attempted = true;
        }

        let Some(draft) = self.drafts.restore(&self.attempt_id).await else {
            return false;
        };
        if self.cancel.is_cancelled() {
            return false;
        }

        let mut state = self.state();
        tracing::info!(
            attempt_id = %self.attempt_id,
            answers = draft.answers.len(),
            saved_at = %draft.saved_at,
            "Restored saved draft"
        );
        state.answers = draft.answers;
        state.participant = draft.participant_info;
        true
    }

    /// Submits the current answers and resolves once the cycle is terminal.
    ///
    /// Offline at call time, nothing is sent: the draft is saved locally and
    /// the phase becomes `OfflineSaved`. Online, the draft is saved before the
    /// first request goes out. A session that already succeeded returns its
    /// stored response id without contacting the endpoint.
    ///
    /// Dropping the returned future mid-cycle settles the phase to `Idle`, or
    /// to `Error` when a retryable error is already recorded.
    pub async fn submit(&self, payload: FinalPayload) -> Result<SubmissionOutcome, CaptureError> {
        self.ensure_open()?;
        {
            let mut state = self.state();
            if let Some(response_id) = &state.response_id {
                return Ok(SubmissionOutcome::Success {
                    response_id: response_id.clone(),
                });
            }
            if self.phase().is_busy() {
                return Err(CaptureError::SubmissionInProgress);
            }
            state.last_payload = Some(payload.clone());
            state.error = None;
            self.phase_tx.send_replace(SubmissionPhase::Submitting);
        }
        let _busy = BusyPhaseGuard { session: self };

        if !self.monitor.is_online() {
            tracing::info!(
                attempt_id = %self.attempt_id,
                "Offline at submit time, keeping answers on this device"
            );
            return self.fall_back_offline().await;
        }

        // the device keeps a copy in case the request never lands
        if !self.cancellable(self.autosave.save_now()).await? {
            tracing::warn!(
                attempt_id = %self.attempt_id,
                "Could not save answers locally before submitting"
            );
        }

        let request = self.build_request(payload);
        tracing::info!(
            attempt_id = %self.attempt_id,
            idempotency_key = %request.attempt_context.idempotency_key,
            answers = request.answers.len(),
            "Submitting answers"
        );

        let mut second_cycle_left = true;
        loop {
            let result = self.cancellable(self.run_cycle(&request)).await?;

            let failure = match result {
                Ok(response_id) => return self.complete(response_id).await,
                Err(failure) => failure,
            };

            // transport errors seen while the device dropped offline are reported as offline
            let failure = if self.monitor.is_online() {
                failure
            } else {
                SubmissionFailure::Offline
            };
            let info = self.classifier.classify(&failure);
            tracing::warn!(
                attempt_id = %self.attempt_id,
                kind = info.kind.as_str(),
                can_retry = info.can_retry,
                error = %failure,
                "Submission cycle failed"
            );

            if info.kind == ErrorKind::Offline {
                return self.fall_back_offline().await;
            }

            if info.can_retry && second_cycle_left {
                second_cycle_left = false;
                let delay = Duration::from_millis(
                    info.retry_delay_ms
                        .unwrap_or(self.config.retry.default_retry_delay_ms),
                );

                self.ensure_open()?;
                self.state().error = Some(info);
                self.phase_tx.send_replace(SubmissionPhase::Retrying);

                self.cancellable(tokio::time::sleep(delay)).await?;
                self.phase_tx.send_replace(SubmissionPhase::Submitting);
                continue;
            }

            return self.fail(info);
        }
    }

    /// Re-runs the last submission. Only allowed while the current error says
    /// it can be retried.
    pub async fn force_retry(&self) -> Result<SubmissionOutcome, CaptureError> {
        self.ensure_open()?;
        let payload = {
            let state = self.state();
            let error = state.error.as_ref().ok_or(CaptureError::NothingToRetry)?;
            if !error.can_retry {
                return Err(CaptureError::RetryNotAllowed);
            }
            state
                .last_payload
                .clone()
                .ok_or(CaptureError::NothingToRetry)?
        };

        tracing::info!(attempt_id = %self.attempt_id, "Retrying submission on request");
        self.submit(payload).await
    }

    /// Runs a manual autosave cycle.
    pub async fn save_now(&self) -> bool {
        self.autosave.save_now().await
    }

    pub fn answers(&self) -> Answers {
        self.state().answers.clone()
    }

    pub fn participant_info(&self) -> ParticipantInfo {
        self.state().participant.clone()
    }

    pub fn error(&self) -> Option<ErrorInfo> {
        self.state().error.clone()
    }

    pub fn clear_error(&self) {
        self.state().error = None;
    }

    pub fn phase(&self) -> SubmissionPhase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SubmissionPhase> {
        self.phase_tx.subscribe()
    }

    pub fn autosave_status(&self) -> AutosaveStatus {
        self.autosave.status()
    }

    pub fn subscribe_autosave(&self) -> watch::Receiver<AutosaveStatus> {
        self.autosave.subscribe_status()
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// Lets the host react to reconnects, e.g. by calling [`Self::force_retry`].
    pub fn on_connectivity_change<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.monitor.observe(on_change)
    }

    /// Cancels timers and pending retries. Results that arrive afterwards are
    /// discarded. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.autosave.shutdown();
        self.monitor.shutdown();
        CAPTURE_SESSIONS_ACTIVE.dec();
        tracing::info!(attempt_id = %self.attempt_id, "Capture session shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn build_request(&self, payload: FinalPayload) -> SubmissionRequest {
        let mut state = self.state();
        let idempotency_key = state
            .idempotency_key
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let mut answers: Vec<AnswerEntry> = state.answers.values().cloned().collect();
        answers.sort_by(|a, b| a.question_id.cmp(&b.question_id));

        SubmissionRequest {
            attempt_context: AttemptContext {
                attempt_id: self.attempt_id.clone(),
                idempotency_key,
                submitted_at: Utc::now(),
                payload,
            },
            answers,
            participant_info: state.participant.clone(),
        }
    }

    /// One transport-level cycle under the retry controller. Retries stop as
    /// soon as the classifier rejects a failure or the device goes offline.
    async fn run_cycle(&self, request: &SubmissionRequest) -> Result<String, SubmissionFailure> {
        retry_async_when(
            self.config.retry.submission_retry(),
            || track_submission_attempt(self.endpoint.submit(request)),
            |failure| self.monitor.is_online() && self.classifier.can_retry(failure),
        )
        .await
    }

    async fn complete(&self, response_id: String) -> Result<SubmissionOutcome, CaptureError> {
        self.ensure_open()?;

        // no autosave may recreate the draft once it is cleared
        self.autosave.stop().await;
        self.drafts.clear(&self.attempt_id).await;
        self.ensure_open()?;

        {
            let mut state = self.state();
            state.response_id = Some(response_id.clone());
            state.error = None;
        }
        self.phase_tx.send_replace(SubmissionPhase::Success);
        SUBMISSIONS_TOTAL.with_label_values(&["success"]).inc();
        tracing::info!(
            attempt_id = %self.attempt_id,
            response_id = %response_id,
            "Submission accepted"
        );

        Ok(SubmissionOutcome::Success { response_id })
    }

    async fn fall_back_offline(&self) -> Result<SubmissionOutcome, CaptureError> {
        let retry = self
            .config
            .retry
            .retry_config(self.config.autosave.max_attempts);
        let saved = self
            .cancellable(retry_async_with_config(retry, || async {
                if self.autosave.save_now().await {
                    Ok(())
                } else {
                    Err(())
                }
            }))
            .await?
            .is_ok();
        self.ensure_open()?;

        if !saved {
            tracing::error!(
                attempt_id = %self.attempt_id,
                "Could not save answers locally while offline"
            );
        }

        let info = self.classifier.classify(&SubmissionFailure::Offline);
        self.state().error = Some(info.clone());
        self.phase_tx.send_replace(SubmissionPhase::OfflineSaved);
        SUBMISSIONS_TOTAL.with_label_values(&["offline_saved"]).inc();

        Ok(SubmissionOutcome::Failure { error: info })
    }

    fn fail(&self, info: ErrorInfo) -> Result<SubmissionOutcome, CaptureError> {
        self.ensure_open()?;
        {
            let mut state = self.state();
            if info.kind == ErrorKind::Validation {
                // rejected outright, so corrected answers go out under a fresh key
                state.idempotency_key = None;
            }
            state.error = Some(info.clone());
        }
        self.phase_tx.send_replace(SubmissionPhase::Error);
        SUBMISSIONS_TOTAL.with_label_values(&["error"]).inc();
        Ok(SubmissionOutcome::Failure { error: info })
    }

    async fn cancellable<F: Future>(&self, future: F) -> Result<F::Output, CaptureError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CaptureError::SessionClosed),
            output = future => Ok(output),
        }
    }

    fn ensure_open(&self) -> Result<(), CaptureError> {
        if self.cancel.is_cancelled() {
            Err(CaptureError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Settles the phase when a `submit` future is dropped before it finished.
/// Terminal paths publish their own phase first, which leaves nothing to do.
struct BusyPhaseGuard<'a> {
    session: &'a CaptureSession,
}

impl Drop for BusyPhaseGuard<'_> {
    fn drop(&mut self) {
        let session = self.session;
        if session.cancel.is_cancelled() {
            return;
        }

        let settled = if session.state().error.is_some() {
            SubmissionPhase::Error
        } else {
            SubmissionPhase::Idle
        };
        let abandoned = session.phase_tx.send_if_modified(|phase| {
            if phase.is_busy() {
                *phase = settled;
                true
            } else {
                false
            }
        });
        if abandoned {
            tracing::warn!(
                attempt_id = %session.attempt_id,
                phase = settled.as_str(),
                "Submission abandoned before completion"
            );
        }
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
