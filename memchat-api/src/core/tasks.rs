//! Supervised background work
//!
//! Maintenance jobs (summary regeneration, memory extraction) run detached
//! from the request that scheduled them. Concurrency is capped by a
//! semaphore. Failures, panics included, are reported on a channel drained by
//! a supervisor loop that logs them and keeps the most recent ones. Failed
//! jobs are never retried and never reach the caller.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, warn};

use crate::core::config::BackgroundConfig;

/// Number of failures kept for inspection
const RECENT_FAILURES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    RollingSummary,
    MemoryExtraction,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    pub kind: TaskKind,
    pub error: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub scheduled: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: usize,
}

#[derive(Clone)]
pub struct BackgroundTasks {
    inner: Arc<TasksInner>,
}

struct TasksInner {
    permits: Arc<Semaphore>,
    failures: mpsc::UnboundedSender<TaskFailure>,
    recent_failures: Arc<Mutex<VecDeque<TaskFailure>>>,
    pending: watch::Sender<usize>,
    scheduled: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl BackgroundTasks {
    pub fn new(config: &BackgroundConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0);
        let recent_failures = Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_FAILURES)));

        tokio::spawn(Self::supervise(rx, recent_failures.clone()));

        Self {
            inner: Arc::new(TasksInner {
                permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
                failures: tx,
                recent_failures,
                pending,
                scheduled: AtomicU64::new(0),
                succeeded: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Failure channel consumer: log and keep, never retry
    async fn supervise(
        mut rx: mpsc::UnboundedReceiver<TaskFailure>,
        recent: Arc<Mutex<VecDeque<TaskFailure>>>,
    ) {
        while let Some(failure) = rx.recv().await {
            warn!("Background {:?} task failed: {}", failure.kind, failure.error);

            let mut recent = recent.lock();
            if recent.len() == RECENT_FAILURES {
                recent.pop_front();
            }
            recent.push_back(failure);
        }
    }

    /// Schedule `task` without waiting for it
    pub fn spawn<F>(&self, kind: TaskKind, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let inner = self.inner.clone();
        inner.scheduled.fetch_add(1, Ordering::Relaxed);
        inner.pending.send_modify(|n| *n += 1);

        tokio::spawn(async move {
            let result = match inner.permits.clone().acquire_owned().await {
                // Inner spawn so a panic comes back as a JoinError
                Ok(_permit) => match tokio::spawn(task).await {
                    Ok(result) => result,
                    Err(e) => Err(anyhow!("task aborted: {e}")),
                },
                Err(_) => Err(anyhow!("background runner closed")),
            };

            match result {
                Ok(()) => {
                    inner.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!("Background {:?} task finished", kind);
                },
                Err(e) => {
                    inner.failed.fetch_add(1, Ordering::Relaxed);
                    let _ = inner.failures.send(TaskFailure {
                        kind,
                        error: format!("{e:#}"),
                        at: Utc::now(),
                    });
                },
            }

            inner.pending.send_modify(|n| *n -= 1);
        });
    }

    pub fn stats(&self) -> TaskStats {
        TaskStats {
            scheduled: self.inner.scheduled.load(Ordering::Relaxed),
            succeeded: self.inner.succeeded.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            in_flight: *self.inner.pending.borrow(),
        }
    }

    /// Failures seen by the supervisor, oldest first
    pub fn recent_failures(&self) -> Vec<TaskFailure> {
        self.inner.recent_failures.lock().iter().cloned().collect()
    }

    /// Resolve once no scheduled task is pending
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.pending.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
