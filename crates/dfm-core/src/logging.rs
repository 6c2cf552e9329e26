//! Logging init: file under the XDG state dir, with stderr fallback.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,dfm=debug";

/// Where log output ended up after [`init`].
#[derive(Debug)]
pub enum LogSink {
    File(PathBuf),
    Stderr,
}

/// Initialize structured logging.
///
/// Prefers a file at `~/.local/state/dfm/dfm.log`; if the state dir is
/// unavailable or unwritable, falls back to stderr instead of failing the
/// whole CLI. `RUST_LOG` overrides the default filter.
pub fn init() -> LogSink {
    match init_file() {
        Ok(path) => {
            tracing::info!("dfm logging initialized at {}", path.display());
            LogSink::File(path)
        }
        Err(_) => {
            init_stderr();
            LogSink::Stderr
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn init_file() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dfm")?;
    let log_dir = xdg_dirs.get_state_home().join("dfm");
    fs::create_dir_all(&log_dir)?;
    let path = log_dir.join("dfm.log");

    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

    // Each subscriber write clones the handle; if that ever fails, the line
    // goes to stderr rather than being dropped.
    struct LogWriter(fs::File);

    enum Sink {
        File(fs::File),
        Stderr,
    }

    impl io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self {
                Sink::File(f) => f.write(buf),
                Sink::Stderr => io::stderr().lock().write(buf),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            match self {
                Sink::File(f) => f.flush(),
                Sink::Stderr => io::stderr().lock().flush(),
            }
        }
    }

    impl<'a> MakeWriter<'a> for LogWriter {
        type Writer = Sink;

        fn make_writer(&'a self) -> Sink {
            self.0.try_clone().map(Sink::File).unwrap_or(Sink::Stderr)
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(LogWriter(file))
        .with_ansi(false)
        .init();

    Ok(path)
}

fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}
