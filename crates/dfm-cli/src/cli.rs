use anyhow::Result;
use clap::{Parser, Subcommand};
use dfm_core::coordinator::{self, RunSummary};
use dfm_core::fetcher::ProgressFn;
use dfm_core::manifest::Manifest;
use dfm_core::probe;
use dfm_core::resolver::{self, FetchTask};
use dfm_core::retry::RetryPolicy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Top-level CLI for the DFM dataset fetch manager.
#[derive(Debug, Parser)]
#[command(name = "dfm")]
#[command(about = "DFM: manifest-driven dataset fetch-and-verify manager", long_about = None)]
pub struct Cli {
    /// Path to the dataset manifest.
    #[arg(long, value_name = "FILE", default_value = "datasets_sources.json")]
    pub manifest: PathBuf,

    /// Root directory for downloaded datasets.
    /// Falls back to $DATASETS_DIR, then to `datasets`.
    #[arg(long, value_name = "DIR")]
    pub datasets_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every configured dataset (or a namespace subset).
    Download {
        /// Restrict to these namespaces (repeatable), e.g. --species Human.
        #[arg(long = "species", value_name = "NAME")]
        species: Vec<String>,

        /// Run transfers one at a time instead of the worker pool.
        #[arg(long)]
        no_parallel: bool,
    },

    /// Show configured datasets and whether they are present on disk.
    List {
        #[arg(long = "species", value_name = "NAME")]
        species: Vec<String>,
    },

    /// Delete downloaded dataset files.
    Clean {
        #[arg(long = "species", value_name = "NAME")]
        species: Vec<String>,
    },

    /// HEAD-probe every dataset URL and report reachability and size.
    Check {
        #[arg(long = "species", value_name = "NAME")]
        species: Vec<String>,
    },
}

impl Cli {
    /// Parse arguments, dispatch, and return the process exit code.
    /// Exit code 0 means every requested task ended in success or skip.
    pub async fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();

        let manifest = Manifest::load(&cli.manifest)?;
        tracing::debug!(
            "loaded manifest {} ({} artifacts)",
            cli.manifest.display(),
            manifest.artifact_count()
        );
        let root = cli.datasets_root();

        match &cli.command {
            CliCommand::Download {
                species,
                no_parallel,
            } => Ok(download(&manifest, &root, species, !no_parallel).await),
            CliCommand::List { species } => {
                let tasks = resolver::resolve(&manifest, &root, species);
                Ok(list(&tasks))
            }
            CliCommand::Clean { species } => {
                let tasks = resolver::resolve(&manifest, &root, species);
                Ok(clean(&tasks))
            }
            CliCommand::Check { species } => {
                let tasks = resolver::resolve(&manifest, &root, species);
                let timeout = Duration::from_secs(manifest.config.download_timeout.min(60));
                check(tasks, timeout).await
            }
        }
    }

    /// Datasets root: `--datasets-dir` flag, then `$DATASETS_DIR`, then
    /// `datasets` (the layout the web application mounts).
    fn datasets_root(&self) -> PathBuf {
        if let Some(dir) = &self.datasets_dir {
            return dir.clone();
        }
        if let Ok(dir) = std::env::var("DATASETS_DIR") {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        PathBuf::from("datasets")
    }
}

async fn download(manifest: &Manifest, root: &Path, species: &[String], parallel: bool) -> i32 {
    let tasks = resolver::resolve(manifest, root, species);
    if tasks.is_empty() {
        println!("no datasets to download");
        return 0;
    }
    println!("{} datasets to download", tasks.len());

    let policy = RetryPolicy {
        attempts: manifest.config.retry_attempts,
        ..RetryPolicy::default()
    };
    let summary = coordinator::run(
        tasks,
        &manifest.config,
        policy,
        parallel,
        Some(progress_observer()),
    )
    .await;

    print_summary(&summary);
    if summary.all_succeeded() {
        0
    } else {
        1
    }
}

fn list(tasks: &[FetchTask]) -> i32 {
    let mut current_ns: Option<&str> = None;
    let mut total_mb = 0.0;
    let mut present = 0;

    for task in tasks {
        if current_ns != Some(task.namespace.as_str()) {
            println!("{}:", task.namespace);
            current_ns = Some(task.namespace.as_str());
        }
        let downloaded = task.dest.exists();
        if downloaded {
            present += 1;
        }
        let size_mb = task.spec.size_mb.unwrap_or(0.0);
        total_mb += size_mb;
        println!(
            "  {}: {:.1} MB - {}",
            task.artifact_id,
            size_mb,
            if downloaded { "downloaded" } else { "to download" }
        );
        if let Some(description) = &task.spec.description {
            println!("    {}", description);
        }
    }

    println!(
        "{} datasets, {} downloaded, {:.1} MB total ({:.1} GB)",
        tasks.len(),
        present,
        total_mb,
        total_mb / 1024.0
    );
    0
}

fn clean(tasks: &[FetchTask]) -> i32 {
    let mut removed = 0;
    for task in tasks {
        if task.dest.exists() {
            match std::fs::remove_file(&task.dest) {
                Ok(()) => {
                    removed += 1;
                    println!("removed {}", task.dest.display());
                }
                Err(e) => tracing::warn!("could not remove {}: {}", task.dest.display(), e),
            }
        }
    }
    println!("removed {} dataset files", removed);
    0
}

async fn check(tasks: Vec<FetchTask>, timeout: Duration) -> Result<i32> {
    let failures = tokio::task::spawn_blocking(move || {
        let mut failures = 0usize;
        for task in &tasks {
            match probe::probe(&task.spec.url, timeout) {
                Ok(r) if r.accessible() => match r.content_length {
                    Some(n) => println!(
                        "ok   {} ({:.1} MB)",
                        task.label(),
                        n as f64 / (1024.0 * 1024.0)
                    ),
                    None => println!("ok   {} (size unknown)", task.label()),
                },
                Ok(r) => {
                    failures += 1;
                    println!("fail {} (HTTP {})", task.label(), r.status);
                }
                Err(e) => {
                    failures += 1;
                    println!("fail {} ({:#})", task.label(), e);
                }
            }
        }
        failures
    })
    .await?;
    Ok(if failures == 0 { 0 } else { 1 })
}

fn print_summary(summary: &RunSummary) {
    println!(
        "download summary: {} ok ({} skipped), {} failed of {}",
        summary.success,
        summary.skipped,
        summary.failed,
        summary.total()
    );
}

/// Progress observer that logs at 25% milestones per task, so parallel
/// transfers stay readable in the log.
fn progress_observer() -> Arc<ProgressFn> {
    let milestones: Mutex<HashMap<String, u64>> = Mutex::new(HashMap::new());
    Arc::new(move |label: &str, done: u64, total: Option<u64>| {
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let pct = done.min(total) * 100 / total;
        let step = pct - pct % 25;
        let mut milestones = milestones.lock().unwrap();
        let last = milestones.entry(label.to_string()).or_insert(0);
        if step > *last {
            *last = step;
            tracing::info!(
                "{}: {}% ({:.1} MB)",
                label,
                pct,
                done as f64 / (1024.0 * 1024.0)
            );
        }
    })
}
