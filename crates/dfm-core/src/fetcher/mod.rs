//! Single-artifact fetch: skip-if-valid, download, verify, retry.
//!
//! The invariant this module maintains: after `fetch` returns, the
//! destination path holds either nothing or a fully transferred,
//! checksum-valid artifact. Partial bodies live in a `.part` file next to
//! the destination and are deleted on any failure; corrupt cached files
//! are deleted and re-downloaded rather than silently kept.

mod transfer;

use crate::checksum::{self, Algorithm};
use crate::manifest::RunConfig;
use crate::resolver::FetchTask;
use crate::retry::{FetchError, RetryPolicy};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Observer for transfer progress: (task label, bytes so far, total bytes
/// when the server reported Content-Length). Purely observational; the
/// return contract of `fetch` does not depend on it.
pub type ProgressFn = dyn Fn(&str, u64, Option<u64>) + Send + Sync;

/// Terminal state of one fetch task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Downloaded (and verified, when configured).
    Success,
    /// Destination already present and valid; no bytes transferred.
    Skipped,
    /// All attempts exhausted; the destination was left absent.
    Failed { error: String, attempts: u32 },
}

/// Fetch one artifact to its destination path.
///
/// Blocking (network I/O plus backoff sleeps); the coordinator drives this
/// from `spawn_blocking`. Errors never escape as panics or results — every
/// ending is a [`FetchOutcome`].
pub fn fetch(
    task: &FetchTask,
    config: &RunConfig,
    policy: &RetryPolicy,
    progress: Option<&ProgressFn>,
) -> FetchOutcome {
    let label = task.label();
    let digest = task.spec.digest();

    // An existing destination is the source of truth: keep it when it
    // verifies (or carries no digest to verify against), replace it when
    // it does not.
    if task.dest.exists() {
        match digest {
            Some((algorithm, expected)) => {
                match checksum::verify(&task.dest, Some(expected), algorithm) {
                    Ok(true) => {
                        tracing::info!("{}: already present and valid, skipping", label);
                        return FetchOutcome::Skipped;
                    }
                    Ok(false) => {
                        tracing::info!(
                            "{}: removing invalid cached file {}",
                            label,
                            task.dest.display()
                        );
                        if let Err(e) = fs::remove_file(&task.dest) {
                            return FetchOutcome::Failed {
                                error: format!("remove invalid file: {}", e),
                                attempts: 0,
                            };
                        }
                    }
                    Err(e) => {
                        return FetchOutcome::Failed {
                            error: format!("verify existing file: {:#}", e),
                            attempts: 0,
                        };
                    }
                }
            }
            None => {
                tracing::info!("{}: already present (no checksum declared), skipping", label);
                return FetchOutcome::Skipped;
            }
        }
    }

    if let Some(parent) = task.dest.parent() {
        // Idempotent and safe under concurrent workers.
        if let Err(e) = fs::create_dir_all(parent) {
            return FetchOutcome::Failed {
                error: format!("create {}: {}", parent.display(), e),
                attempts: 0,
            };
        }
    }

    let part = part_path(&task.dest);
    let attempts = config.retry_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        tracing::info!(
            "{}: downloading {} (attempt {}/{})",
            label,
            task.spec.url,
            attempt,
            attempts
        );
        match attempt_once(task, digest, config, &part, progress) {
            Ok(()) => {
                tracing::info!("{}: downloaded to {}", label, task.dest.display());
                return FetchOutcome::Success;
            }
            Err(err) => {
                tracing::warn!("{}: attempt {}/{} failed: {}", label, attempt, attempts, err);
                // Never leave a partial or invalid file behind.
                let _ = fs::remove_file(&part);
                let _ = fs::remove_file(&task.dest);
                last_error = err.to_string();
                if attempt < attempts {
                    let delay = policy.backoff(attempt);
                    tracing::info!("{}: waiting {:?} before retry", label, delay);
                    std::thread::sleep(delay);
                }
            }
        }
    }

    tracing::error!("{}: giving up after {} attempts", label, attempts);
    FetchOutcome::Failed {
        error: last_error,
        attempts,
    }
}

/// One transfer attempt: stream to `.part`, rename, verify.
fn attempt_once(
    task: &FetchTask,
    digest: Option<(Algorithm, &str)>,
    config: &RunConfig,
    part: &Path,
    progress: Option<&ProgressFn>,
) -> Result<(), FetchError> {
    let label = task.label();
    let timeout = Duration::from_secs(config.download_timeout);
    let observer = progress.map(|cb| {
        move |done: u64, total: Option<u64>| cb(&label, done, total)
    });
    let written = transfer::download(
        &task.spec.url,
        part,
        timeout,
        observer
            .as_ref()
            .map(|f| f as &dyn Fn(u64, Option<u64>)),
    )?;

    // Declared size is advisory only: log disagreement, never block.
    if let Some(declared_mb) = task.spec.size_mb {
        let actual_mb = written as f64 / (1024.0 * 1024.0);
        if (actual_mb - declared_mb).abs() > declared_mb * 0.1 + 1.0 {
            tracing::warn!(
                "{}: size differs from manifest: declared {:.1} MB, got {:.1} MB",
                task.label(),
                declared_mb,
                actual_mb
            );
        }
    }

    fs::rename(part, &task.dest)?;

    if config.verify_checksums {
        match digest {
            Some((algorithm, expected)) => {
                let actual =
                    checksum::digest_path(&task.dest, algorithm).map_err(FetchError::Other)?;
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(FetchError::Integrity {
                        algorithm,
                        expected: expected.to_string(),
                        actual,
                    });
                }
                tracing::debug!("{}: {} checksum verified", task.label(), algorithm);
            }
            None => {
                tracing::warn!(
                    "{}: no checksum declared, skipping verification",
                    task.label()
                );
            }
        }
    }
    Ok(())
}

/// Temp path for an in-flight transfer: `<dest>.part`.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
