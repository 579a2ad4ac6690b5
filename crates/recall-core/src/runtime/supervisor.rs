//! Structured ownership of background work.
//!
//! Post-turn jobs (access flushes, graph extraction, deferred memory writes)
//! are spawned into one [`JoinSet`] and share a [`CancellationToken`]. Failures
//! and panics are logged when the task is reaped and never propagate to the
//! turn that scheduled them.

use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How often [`TaskSupervisor::settle`] checks for finished tasks.
const SETTLE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskStatus {
    Completed,
    Failed(String),
    Cancelled,
}

/// Counts collected by [`TaskSupervisor::reap`] and [`TaskSupervisor::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl ReapReport {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

/// Owns detached background tasks until they finish or are cancelled.
#[derive(Debug)]
pub struct TaskSupervisor {
    tasks: Mutex<JoinSet<(String, TaskStatus)>>,
    token: CancellationToken,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
            token: CancellationToken::new(),
        }
    }

    /// Token cancelled on shutdown. Long-running tasks may watch it directly.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Tasks spawned and not yet reaped.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn `fut` under `name`. Returns `false` after shutdown has begun.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, E>(&self, name: impl Into<String>, fut: F) -> bool
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let name = name.into();
        if self.token.is_cancelled() {
            tracing::debug!(task = %name, "supervisor shut down; task not started");
            return false;
        }
        let token = self.token.clone();
        let mut tasks = self.lock();
        tasks.spawn(async move {
            let status = tokio::select! {
                _ = token.cancelled() => TaskStatus::Cancelled,
                result = fut => match result {
                    Ok(()) => TaskStatus::Completed,
                    Err(e) => TaskStatus::Failed(e.to_string()),
                },
            };
            (name, status)
        });
        // Collect anything already finished so the set does not grow unbounded.
        drain_finished(&mut tasks);
        true
    }

    /// Collect finished tasks, logging failures and panics.
    pub fn reap(&self) -> ReapReport {
        drain_finished(&mut self.lock())
    }

    /// Wait up to `timeout` for running tasks to finish on their own, without
    /// cancelling them. Returns what was reaped while waiting.
    pub async fn settle(&self, timeout: Duration) -> ReapReport {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut report = ReapReport::default();
        loop {
            let reaped = self.reap();
            report.completed += reaped.completed;
            report.failed += reaped.failed;
            report.cancelled += reaped.cancelled;
            if self.is_empty() || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
        report
    }

    /// Cancel outstanding tasks and wait up to `grace` for them to stop.
    /// Tasks still running after the grace period are aborted.
    #[tracing::instrument(name = "supervisor_shutdown", skip(self))]
    pub async fn shutdown(&self, grace: Duration) -> ReapReport {
        self.token.cancel();
        let mut tasks = std::mem::take(&mut *self.lock());
        let mut report = ReapReport::default();

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                record(&mut report, joined);
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = tasks.len(), "grace period elapsed; aborting tasks");
            tasks.abort_all();
            while let Some(joined) = tasks.join_next().await {
                record(&mut report, joined);
            }
        }

        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            cancelled = report.cancelled,
            "background tasks stopped"
        );
        report
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JoinSet<(String, TaskStatus)>> {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn drain_finished(tasks: &mut JoinSet<(String, TaskStatus)>) -> ReapReport {
    let mut report = ReapReport::default();
    while let Some(joined) = tasks.try_join_next() {
        record(&mut report, joined);
    }
    report
}

fn record(
    report: &mut ReapReport,
    joined: Result<(String, TaskStatus), tokio::task::JoinError>,
) {
    match joined {
        Ok((_, TaskStatus::Completed)) => report.completed += 1,
        Ok((name, TaskStatus::Failed(error))) => {
            tracing::warn!(task = %name, error = %error, "background task failed");
            report.failed += 1;
        }
        Ok((name, TaskStatus::Cancelled)) => {
            tracing::debug!(task = %name, "background task cancelled");
            report.cancelled += 1;
        }
        Err(e) if e.is_cancelled() => report.cancelled += 1,
        Err(e) => {
            tracing::warn!(error = %e, "background task panicked");
            report.failed += 1;
        }
    }
}
