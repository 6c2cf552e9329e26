//! HTTP HEAD probing of artifact URLs.
//!
//! Used by the `check` action to confirm every manifest URL is reachable
//! and to report the advertised size before committing to multi-GB
//! downloads. Byte-level only; never touches the artifact body.

use anyhow::{Context, Result};
use std::str;
use std::time::Duration;

/// Result of a HEAD request against an artifact URL.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Final HTTP status after redirects.
    pub status: u32,
    /// Size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    /// `Content-Type` value if present.
    pub content_type: Option<String>,
}

impl ProbeResult {
    /// True when the artifact URL answered with a 2xx status.
    pub fn accessible(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Perform a HEAD request and return parsed metadata.
///
/// Follows redirects. Non-2xx statuses are reported in the result rather
/// than returned as errors so the caller can list unreachable artifacts.
/// Runs in the current thread; call from `spawn_blocking` if used from
/// async code.
pub fn probe(url: &str, timeout: Duration) -> Result<ProbeResult> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.nobody(true)?; // HEAD request
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(timeout)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform().context("HEAD request failed")?;
    }

    let status = easy.response_code().context("no response code")?;
    let (content_length, content_type) = parse_headers(&headers);
    Ok(ProbeResult {
        status,
        content_length,
        content_type,
    })
}

/// Parse collected header lines; the last occurrence wins, which matches
/// the final response in a redirect chain.
fn parse_headers(lines: &[String]) -> (Option<u64>, Option<String>) {
    let mut content_length = None;
    let mut content_type = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.parse::<u64>() {
                    content_length = Some(n);
                }
            }
            if name.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.to_string());
            }
        }
    }

    (content_length, content_type)
}
