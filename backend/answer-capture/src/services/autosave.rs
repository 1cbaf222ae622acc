//! Decides when the current draft is persisted.
//!
//! A single worker task owns every timer (debounce, periodic interval,
//! status reset) and runs save cycles inline, so at most one cycle is ever in
//! flight. Triggers that arrive during a cycle wait in the command queue; the
//! snapshot is taken when a cycle starts, never when it was scheduled. Manual
//! saves queued behind the same in-flight cycle share one follow-up cycle.

use std::future::pending;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::AutosaveSettings;
use crate::metrics::record_autosave_cycle;
use crate::models::{AttemptId, AutosaveStatus, DraftSnapshot};
use crate::services::draft_store::DraftStore;

/// Produces the latest in-memory state at the moment a cycle starts.
pub type SnapshotSource = Arc<dyn Fn() -> DraftSnapshot + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Change,
    Periodic,
    Manual,
}

impl SaveTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            SaveTrigger::Change => "change",
            SaveTrigger::Periodic => "periodic",
            SaveTrigger::Manual => "manual",
        }
    }
}

enum Command {
    Changed,
    SaveNow(oneshot::Sender<bool>),
}

pub struct AutosaveScheduler {
    commands: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<AutosaveStatus>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AutosaveScheduler {
    /// Starts the worker. It stops when `cancel` fires or the scheduler is dropped.
    pub fn spawn(
        attempt_id: AttemptId,
        drafts: DraftStore,
        source: SnapshotSource,
        settings: &AutosaveSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(AutosaveStatus::Idle);

        let worker = Worker {
            attempt_id,
            drafts,
            source,
            debounce: settings.debounce(),
            interval: settings.interval(),
            status_reset: settings.status_reset(),
            status_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run(commands_rx));

        Self {
            commands,
            status_rx,
            cancel,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// (Re)arms the debounce timer.
    pub fn notify_change(&self) {
        let _ = self.commands.send(Command::Changed);
    }

    /// Runs a manual cycle once any in-flight cycle finishes. `false` when the
    /// save failed or the scheduler is stopped.
    pub async fn save_now(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::SaveNow(reply)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub fn status(&self) -> AutosaveStatus {
        *self.status_rx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AutosaveStatus> {
        self.status_rx.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Cancels the timers and waits for an in-flight cycle to finish, so no
    /// write happens after this returns.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed()
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    attempt_id: AttemptId,
    drafts: DraftStore,
    source: SnapshotSource,
    debounce: Duration,
    interval: Duration,
    status_reset: Duration,
    status_tx: watch::Sender<AutosaveStatus>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut periodic = interval_at(Instant::now() + self.interval, self.interval);
        periodic.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut debounce_at: Option<Instant> = None;
        let mut reset_at: Option<Instant> = None;

        tracing::debug!(
            attempt_id = %self.attempt_id,
            debounce_ms = self.debounce.as_millis() as u64,
            interval_ms = self.interval.as_millis() as u64,
            "Autosave worker started"
        );

        loop {
            let trigger = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = commands.recv() => match command {
                    None => break,
                    Some(Command::Changed) => {
                        debounce_at = Some(Instant::now() + self.debounce);
                        continue;
                    }
                    Some(Command::SaveNow(reply)) => {
                        // every request already queued is served by this one cycle
                        let mut replies = vec![reply];
                        while let Ok(queued) = commands.try_recv() {
                            if let Command::SaveNow(reply) = queued {
                                replies.push(reply);
                            }
                        }
                        let ok = self.cycle(SaveTrigger::Manual).await;
                        for reply in replies {
                            let _ = reply.send(ok);
                        }
                        None
                    }
                },
                _ = wait_until(debounce_at) => Some(SaveTrigger::Change),
                _ = periodic.tick() => Some(SaveTrigger::Periodic),
                _ = wait_until(reset_at) => {
                    reset_at = None;
                    self.status_tx.send_replace(AutosaveStatus::Idle);
                    continue;
                }
            };

            if let Some(trigger) = trigger {
                self.cycle(trigger).await;
            }

            if self.cancel.is_cancelled() {
                break;
            }
            // the cycle persisted the newest state, so a pending debounce is redundant
            debounce_at = None;
            reset_at = Some(Instant::now() + self.status_reset);
        }

        tracing::debug!(attempt_id = %self.attempt_id, "Autosave worker stopped");
    }

    async fn cycle(&self, trigger: SaveTrigger) -> bool {
        self.status_tx.send_replace(AutosaveStatus::Saving);

        let snapshot = (self.source)();
        let ok = self.drafts.save(&self.attempt_id, &snapshot).await;

        if self.cancel.is_cancelled() {
            return ok;
        }

        record_autosave_cycle(trigger.as_str(), ok);
        if ok {
            tracing::debug!(
                attempt_id = %self.attempt_id,
                trigger = trigger.as_str(),
                answers = snapshot.answers.len(),
                "Autosave cycle completed"
            );
            self.status_tx.send_replace(AutosaveStatus::Saved);
        } else {
            tracing::warn!(
                attempt_id = %self.attempt_id,
                trigger = trigger.as_str(),
                "Autosave cycle failed"
            );
            self.status_tx.send_replace(AutosaveStatus::Error);
        }
        ok
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}
