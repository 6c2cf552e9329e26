//! Runs fetch tasks across a bounded worker pool.
//!
//! Keeps up to `parallel_downloads` fetches in flight at once; when one
//! finishes, the next queued task is started until the queue is empty.
//! Outcomes are folded into a [`RunSummary`] as they complete — counting is
//! commutative, so completion order never affects the result. A failing or
//! panicking task becomes a `Failed` outcome and never aborts its siblings.

use crate::fetcher::{self, FetchOutcome, ProgressFn};
use crate::manifest::RunConfig;
use crate::resolver::FetchTask;
use crate::retry::RetryPolicy;
use std::collections::VecDeque;
use std::sync::Arc;

/// Aggregate result of a run. `success` includes skipped tasks; the run as
/// a whole succeeded iff `failed == 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Success => self.success += 1,
            FetchOutcome::Skipped => {
                self.success += 1;
                self.skipped += 1;
            }
            FetchOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Run all tasks and aggregate their outcomes.
///
/// With `parallel` disabled or a pool width of 1, tasks run strictly one
/// after another; otherwise a bounded pool of blocking workers is used.
pub async fn run(
    tasks: Vec<FetchTask>,
    config: &RunConfig,
    policy: RetryPolicy,
    parallel: bool,
    progress: Option<Arc<ProgressFn>>,
) -> RunSummary {
    let width = if parallel { config.parallel_downloads } else { 1 };
    if width <= 1 {
        let total = tasks.len();
        let config = config.clone();
        let progress = progress.clone();
        return tokio::task::spawn_blocking(move || {
            run_sequential(&tasks, &config, &policy, progress.as_deref())
        })
        .await
        .unwrap_or(RunSummary {
            success: 0,
            skipped: 0,
            failed: total,
        });
    }
    tracing::info!("using {} parallel downloads", width);
    run_parallel(tasks, config, policy, width, progress).await
}

/// Sequential fallback: one `fetch` call after another. Blocking.
pub fn run_sequential(
    tasks: &[FetchTask],
    config: &RunConfig,
    policy: &RetryPolicy,
    progress: Option<&ProgressFn>,
) -> RunSummary {
    let mut summary = RunSummary::default();
    for task in tasks {
        let outcome = fetcher::fetch(task, config, policy, progress);
        log_outcome(&task.label(), &outcome);
        summary.record(&outcome);
    }
    summary
}

async fn run_parallel(
    tasks: Vec<FetchTask>,
    config: &RunConfig,
    policy: RetryPolicy,
    width: usize,
    progress: Option<Arc<ProgressFn>>,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let mut queue: VecDeque<FetchTask> = tasks.into();
    let mut join_set = tokio::task::JoinSet::new();

    loop {
        while join_set.len() < width {
            let Some(task) = queue.pop_front() else {
                break;
            };
            let config = config.clone();
            let progress = progress.clone();
            join_set.spawn(async move {
                let label = task.label();
                let outcome = tokio::task::spawn_blocking(move || {
                    fetcher::fetch(&task, &config, &policy, progress.as_deref())
                })
                .await
                .unwrap_or_else(|e| FetchOutcome::Failed {
                    error: format!("worker panicked: {}", e),
                    attempts: 0,
                });
                (label, outcome)
            });
        }

        if join_set.is_empty() {
            break;
        }

        let Some(res) = join_set.join_next().await else {
            break;
        };
        match res {
            Ok((label, outcome)) => {
                log_outcome(&label, &outcome);
                summary.record(&outcome);
            }
            Err(e) => {
                tracing::error!("worker task join failed: {}", e);
                summary.record(&FetchOutcome::Failed {
                    error: format!("worker join: {}", e),
                    attempts: 0,
                });
            }
        }
    }

    summary
}

fn log_outcome(label: &str, outcome: &FetchOutcome) {
    match outcome {
        FetchOutcome::Success => tracing::info!("{}: downloaded", label),
        FetchOutcome::Skipped => tracing::info!("{}: already present", label),
        FetchOutcome::Failed { error, attempts } => {
            tracing::error!("{}: failed after {} attempts: {}", label, attempts, error)
        }
    }
}
