//! Integration tests: fetch and coordinate against a local HTTP server.
//!
//! Covers the durable guarantees: skip-if-valid with no extra transfer,
//! corrupt-file self-heal, the retry bound, checksum gating, and summary
//! aggregation across a mixed parallel run.

mod common;

use common::artifact_server::{self, ServerOptions};
use dfm_core::checksum::{self, Algorithm};
use dfm_core::coordinator;
use dfm_core::fetcher::{self, FetchOutcome};
use dfm_core::manifest::{ArtifactSpec, RunConfig};
use dfm_core::probe;
use dfm_core::resolver::FetchTask;
use dfm_core::retry::RetryPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3"; // md5("hello world")
const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

fn task(url: &str, root: &Path, id: &str, md5: Option<&str>) -> FetchTask {
    FetchTask {
        namespace: "Human".to_string(),
        artifact_id: id.to_string(),
        spec: ArtifactSpec {
            url: url.to_string(),
            md5: md5.map(String::from),
            sha256: None,
            size_mb: None,
            description: None,
        },
        dest: root.join("Human").join(format!("{}.h5ad", id)),
    }
}

fn test_config() -> RunConfig {
    RunConfig {
        retry_attempts: 3,
        verify_checksums: true,
        parallel_downloads: 2,
        download_timeout: 30,
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(5),
    }
}

fn part_of(dest: &Path) -> PathBuf {
    PathBuf::from(format!("{}.part", dest.display()))
}

#[test]
fn fetch_downloads_and_verifies() {
    let server = artifact_server::start(b"hello world".to_vec());
    let root = tempdir().unwrap();
    let t = task(&server.url, root.path(), "cohort", Some(HELLO_MD5));

    let outcome = fetcher::fetch(&t, &test_config(), &fast_policy(), None);
    assert_eq!(outcome, FetchOutcome::Success);
    assert_eq!(std::fs::read(&t.dest).unwrap(), b"hello world");
    assert!(!part_of(&t.dest).exists(), "no .part file may remain");
    assert_eq!(server.gets(), 1);
}

#[test]
fn second_fetch_skips_without_refetching() {
    let server = artifact_server::start(b"hello world".to_vec());
    let root = tempdir().unwrap();
    let t = task(&server.url, root.path(), "cohort", Some(HELLO_MD5));

    assert_eq!(
        fetcher::fetch(&t, &test_config(), &fast_policy(), None),
        FetchOutcome::Success
    );
    assert_eq!(
        fetcher::fetch(&t, &test_config(), &fast_policy(), None),
        FetchOutcome::Skipped
    );
    assert_eq!(server.gets(), 1, "skip must not transfer anything");
}

#[test]
fn corrupt_cached_file_is_replaced() {
    let server = artifact_server::start(b"hello world".to_vec());
    let root = tempdir().unwrap();
    let t = task(&server.url, root.path(), "cohort", Some(HELLO_MD5));

    std::fs::create_dir_all(t.dest.parent().unwrap()).unwrap();
    std::fs::write(&t.dest, b"corrupted bytes").unwrap();

    let outcome = fetcher::fetch(&t, &test_config(), &fast_policy(), None);
    assert_eq!(outcome, FetchOutcome::Success);
    assert_eq!(std::fs::read(&t.dest).unwrap(), b"hello world");
    assert_eq!(server.gets(), 1);
}

#[test]
fn persistent_failure_exhausts_all_attempts() {
    let server = artifact_server::start_with_options(
        b"never served".to_vec(),
        ServerOptions {
            fail_first: u32::MAX,
            fail_status: 500,
        },
    );
    let root = tempdir().unwrap();
    let t = task(&server.url, root.path(), "cohort", Some(HELLO_MD5));

    let outcome = fetcher::fetch(&t, &test_config(), &fast_policy(), None);
    match outcome {
        FetchOutcome::Failed { attempts, error } => {
            assert_eq!(attempts, 3, "exactly retry_attempts attempts");
            assert!(error.contains("500"), "last error recorded: {}", error);
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(server.gets(), 3);
    assert!(!t.dest.exists(), "no file may remain after failure");
    assert!(!part_of(&t.dest).exists());
}

#[test]
fn transient_failures_recover_within_the_bound() {
    let server = artifact_server::start_with_options(
        b"hello world".to_vec(),
        ServerOptions {
            fail_first: 2,
            fail_status: 503,
        },
    );
    let root = tempdir().unwrap();
    let t = task(&server.url, root.path(), "cohort", Some(HELLO_MD5));

    let outcome = fetcher::fetch(&t, &test_config(), &fast_policy(), None);
    assert_eq!(outcome, FetchOutcome::Success);
    assert_eq!(server.gets(), 3, "two failures plus the successful attempt");
    assert_eq!(std::fs::read(&t.dest).unwrap(), b"hello world");
}

#[test]
fn empty_body_with_empty_file_digest_succeeds() {
    let server = artifact_server::start(Vec::new());
    let root = tempdir().unwrap();
    let t = task(&server.url, root.path(), "empty", Some(EMPTY_MD5));

    let outcome = fetcher::fetch(&t, &test_config(), &fast_policy(), None);
    assert_eq!(outcome, FetchOutcome::Success);
    assert_eq!(std::fs::metadata(&t.dest).unwrap().len(), 0);
    assert!(checksum::verify(&t.dest, Some(EMPTY_MD5), Algorithm::Md5).unwrap());
}

#[test]
fn checksum_mismatch_consumes_attempts_and_leaves_nothing() {
    let server = artifact_server::start(b"hello world".to_vec());
    let root = tempdir().unwrap();
    let wrong = "0".repeat(32);
    let t = task(&server.url, root.path(), "cohort", Some(&wrong));

    let outcome = fetcher::fetch(&t, &test_config(), &fast_policy(), None);
    match outcome {
        FetchOutcome::Failed { attempts, error } => {
            assert_eq!(attempts, 3, "integrity errors are retryable");
            assert!(error.contains("mismatch"), "last error: {}", error);
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(server.gets(), 3);
    assert!(!t.dest.exists(), "corrupt download must be deleted");
}

#[test]
fn existing_file_without_digest_is_trusted() {
    let server = artifact_server::start(b"hello world".to_vec());
    let root = tempdir().unwrap();
    let t = task(&server.url, root.path(), "cohort", None);

    std::fs::create_dir_all(t.dest.parent().unwrap()).unwrap();
    std::fs::write(&t.dest, b"locally produced").unwrap();

    let outcome = fetcher::fetch(&t, &test_config(), &fast_policy(), None);
    assert_eq!(outcome, FetchOutcome::Skipped);
    assert_eq!(server.gets(), 0);
    // The file must never be deleted just because it cannot be verified.
    assert_eq!(std::fs::read(&t.dest).unwrap(), b"locally produced");
}

#[test]
fn disabled_verification_accepts_any_body() {
    let server = artifact_server::start(b"hello world".to_vec());
    let root = tempdir().unwrap();
    let wrong = "f".repeat(32);
    let t = task(&server.url, root.path(), "cohort", Some(&wrong));

    let mut config = test_config();
    config.verify_checksums = false;
    let outcome = fetcher::fetch(&t, &config, &fast_policy(), None);
    assert_eq!(outcome, FetchOutcome::Success);
    assert_eq!(server.gets(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parallel_run_aggregates_mixed_outcomes() {
    let good = artifact_server::start(b"hello world".to_vec());
    let bad = artifact_server::start_with_options(
        b"never served".to_vec(),
        ServerOptions {
            fail_first: u32::MAX,
            fail_status: 500,
        },
    );
    let root = tempdir().unwrap();
    let tasks = vec![
        task(&good.url, root.path(), "cohort_a", Some(HELLO_MD5)),
        task(&good.url, root.path(), "cohort_b", Some(HELLO_MD5)),
        task(&bad.url, root.path(), "cohort_c", Some(HELLO_MD5)),
    ];

    let summary = coordinator::run(tasks.clone(), &test_config(), fast_policy(), true, None).await;
    assert_eq!(summary.success, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 1);
    assert!(!summary.all_succeeded());

    // A second run skips what already landed and re-fails the bad task;
    // the counts are identical regardless of completion order.
    let summary = coordinator::run(tasks, &test_config(), fast_policy(), true, None).await;
    assert_eq!(summary.success, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sequential_run_matches_parallel_counts() {
    let good = artifact_server::start(b"hello world".to_vec());
    let root = tempdir().unwrap();
    let tasks = vec![
        task(&good.url, root.path(), "cohort_a", Some(HELLO_MD5)),
        task(&good.url, root.path(), "cohort_b", Some(HELLO_MD5)),
    ];

    let summary = coordinator::run(tasks, &test_config(), fast_policy(), false, None).await;
    assert_eq!(summary.success, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.all_succeeded());
}

#[test]
fn probe_reports_status_and_size() {
    let server = artifact_server::start(vec![0u8; 4096]);
    let result = probe::probe(&server.url, Duration::from_secs(5)).unwrap();
    assert_eq!(result.status, 200);
    assert!(result.accessible());
    assert_eq!(result.content_length, Some(4096));
    assert_eq!(
        result.content_type.as_deref(),
        Some("application/octet-stream")
    );
}
