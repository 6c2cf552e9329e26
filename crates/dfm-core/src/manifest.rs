//! Typed schema for the dataset manifest (`datasets_sources.json`).
//!
//! The manifest has a top-level `datasets` mapping (namespace → artifact-id
//! → artifact spec) and an optional `config` block. It is parsed into a
//! strongly-typed, declaration-ordered structure and validated up front so
//! a bad manifest fails at startup instead of deep inside a download.

use crate::checksum::Algorithm;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Errors produced while loading or validating a manifest. All of these are
/// fatal at startup; no partial run proceeds past a bad manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read manifest {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in manifest")]
    Json(#[from] serde_json::Error),
    #[error("{namespace}/{artifact_id}: invalid url {url:?}: {reason}")]
    InvalidUrl {
        namespace: String,
        artifact_id: String,
        url: String,
        reason: String,
    },
    #[error(
        "{namespace}/{artifact_id}: malformed {algorithm} digest {digest:?} \
         (expected {expected_len} hex characters)"
    )]
    MalformedDigest {
        namespace: String,
        artifact_id: String,
        algorithm: Algorithm,
        digest: String,
        expected_len: usize,
    },
}

/// One downloadable artifact as declared in the manifest.
///
/// `md5`/`sha256` are optional; MD5 wins when both are present. `size_mb`
/// is informational only and never blocks a run. Unknown keys (e.g. an
/// unsupported digest algorithm) are rejected at parse time.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactSpec {
    pub url: String,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size_mb: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ArtifactSpec {
    /// The authoritative digest for this artifact, if any.
    /// MD5 is preferred when both algorithms are declared.
    pub fn digest(&self) -> Option<(Algorithm, &str)> {
        if let Some(md5) = self.md5.as_deref().filter(|s| !s.is_empty()) {
            return Some((Algorithm::Md5, md5));
        }
        self.sha256
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| (Algorithm::Sha256, s))
    }
}

/// Global run parameters from the manifest's `config` block.
/// Missing keys take the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Attempts per artifact, including the first.
    pub retry_attempts: u32,
    /// Verify digests after each completed transfer.
    pub verify_checksums: bool,
    /// Worker pool width. Deliberately low by default so a handful of
    /// multi-GB transfers do not saturate the source mirror.
    pub parallel_downloads: usize,
    /// Per-request timeout in seconds.
    pub download_timeout: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            verify_checksums: true,
            parallel_downloads: 2,
            download_timeout: 3600,
        }
    }
}

/// Artifacts of one namespace, in manifest-declared order.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct NamespaceArtifacts(
    #[serde(deserialize_with = "ordered_entries")] pub Vec<(String, ArtifactSpec)>,
);

/// The whole manifest: namespaces (in declared order) plus run config.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(deserialize_with = "ordered_entries")]
    pub datasets: Vec<(String, NamespaceArtifacts)>,
    #[serde(default)]
    pub config: RunConfig,
}

impl Manifest {
    /// Load and validate a manifest file.
    pub fn load(path: &Path) -> Result<Manifest, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse and validate a manifest from its JSON text.
    pub fn parse(text: &str) -> Result<Manifest, ManifestError> {
        let manifest: Manifest = serde_json::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Total number of declared artifacts across all namespaces.
    pub fn artifact_count(&self) -> usize {
        self.datasets.iter().map(|(_, ns)| ns.0.len()).sum()
    }

    fn validate(&self) -> Result<(), ManifestError> {
        for (namespace, artifacts) in &self.datasets {
            for (artifact_id, spec) in &artifacts.0 {
                match Url::parse(&spec.url) {
                    Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
                    Ok(u) => {
                        return Err(ManifestError::InvalidUrl {
                            namespace: namespace.clone(),
                            artifact_id: artifact_id.clone(),
                            url: spec.url.clone(),
                            reason: format!("unsupported scheme {:?}", u.scheme()),
                        });
                    }
                    Err(e) => {
                        return Err(ManifestError::InvalidUrl {
                            namespace: namespace.clone(),
                            artifact_id: artifact_id.clone(),
                            url: spec.url.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
                for (algorithm, digest) in [
                    (Algorithm::Md5, spec.md5.as_deref()),
                    (Algorithm::Sha256, spec.sha256.as_deref()),
                ] {
                    let Some(digest) = digest.filter(|s| !s.is_empty()) else {
                        continue;
                    };
                    let well_formed = digest.len() == algorithm.hex_len()
                        && digest.chars().all(|c| c.is_ascii_hexdigit());
                    if !well_formed {
                        return Err(ManifestError::MalformedDigest {
                            namespace: namespace.clone(),
                            artifact_id: artifact_id.clone(),
                            algorithm,
                            digest: digest.to_string(),
                            expected_len: algorithm.hex_len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Deserialize a JSON object into a vector of (key, value) pairs,
/// preserving the order keys appear in the document.
fn ordered_entries<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct OrderedVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}
