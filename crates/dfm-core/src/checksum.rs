//! Streaming checksum computation and verification (MD5 / SHA-256).
//!
//! Files are read in fixed-size chunks so multi-GB datasets never have to
//! fit in memory. Digests are compared case-insensitively; a missing
//! expected digest makes verification a warning, not a failure.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Digest algorithm named by the manifest (`md5` / `sha256` keys).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha256,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha256 => "sha256",
        }
    }

    /// Length in hex characters of a digest produced by this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            Algorithm::Md5 => 32,
            Algorithm::Sha256 => 64,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compute the digest of a file and return it as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn digest_path(path: &Path, algorithm: Algorithm) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut buf = [0u8; BUF_SIZE];
    match algorithm {
        Algorithm::Md5 => {
            let mut ctx = md5::Context::new();
            loop {
                let n = f
                    .read(&mut buf)
                    .with_context(|| format!("read {}", path.display()))?;
                if n == 0 {
                    break;
                }
                ctx.consume(&buf[..n]);
            }
            Ok(format!("{:x}", ctx.compute()))
        }
        Algorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = f
                    .read(&mut buf)
                    .with_context(|| format!("read {}", path.display()))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

/// Verify a file against an expected digest.
///
/// `None` (or an empty string) means the manifest carries no checksum for
/// this artifact; that is logged as a warning and treated as a pass.
pub fn verify(path: &Path, expected: Option<&str>, algorithm: Algorithm) -> Result<bool> {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        tracing::warn!(
            "no checksum provided for {}, skipping verification",
            path.display()
        );
        return Ok(true);
    };
    let actual = digest_path(path, algorithm)?;
    if actual.eq_ignore_ascii_case(expected) {
        tracing::debug!("{} checksum verified for {}", algorithm, path.display());
        Ok(true)
    } else {
        tracing::warn!(
            "{} checksum mismatch for {}: expected {}, got {}",
            algorithm,
            path.display(),
            expected,
            actual
        );
        Ok(false)
    }
}
