//! Streaming HTTP GET to a temporary file.
//!
//! Single connection, no ranges: dataset mirrors serve large files fine
//! over one stream, and the fetcher retries whole artifacts. Runs in the
//! current thread; call from `spawn_blocking` when used from async code.

use crate::retry::FetchError;
use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str;
use std::time::Duration;

/// Download `url` into `part`, returning the number of bytes written.
///
/// Streams the body in libcurl-sized chunks through a buffered writer.
/// `observer`, when present, is invoked per chunk with (bytes so far,
/// Content-Length total if the server reported one). Any existing file at
/// `part` is truncated first, so a leftover from an interrupted run never
/// survives into a new attempt.
pub(crate) fn download(
    url: &str,
    part: &Path,
    timeout: Duration,
    observer: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<u64, FetchError> {
    let file = File::create(part)?;
    let writer = RefCell::new(BufWriter::new(file));
    let written = Cell::new(0u64);
    let total = Cell::new(None::<u64>);
    let write_error = RefCell::new(None::<io::Error>);

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(30))?;
    easy.timeout(timeout)?;

    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(line) = str::from_utf8(data) {
                if let Some((name, value)) = line.split_once(':') {
                    if name.trim().eq_ignore_ascii_case("content-length") {
                        if let Ok(n) = value.trim().parse::<u64>() {
                            total.set(Some(n));
                        }
                    }
                }
            }
            true
        })?;
        transfer.write_function(|data| {
            if let Err(e) = writer.borrow_mut().write_all(data) {
                *write_error.borrow_mut() = Some(e);
                return Ok(0); // abort the transfer
            }
            written.set(written.get() + data.len() as u64);
            if let Some(cb) = observer {
                cb(written.get(), total.get());
            }
            Ok(data.len())
        })?;
        transfer.perform()
    };

    // A storage failure aborts the transfer through curl; report the real
    // cause, not the resulting curl write error.
    if let Some(e) = write_error.into_inner() {
        return Err(FetchError::Io(e));
    }
    perform_result?;

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }

    writer
        .into_inner()
        .into_inner()
        .map_err(|e| FetchError::Io(e.into_error()))?;

    Ok(written.get())
}
