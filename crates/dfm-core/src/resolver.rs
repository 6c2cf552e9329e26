//! Expands the manifest into a flat, ordered list of fetch tasks.
//!
//! Destination paths are deterministic: `<root>/<namespace>/<artifact-id>.<ext>`.
//! Task order follows the manifest's declared order so logs are reproducible;
//! the coordinator is free to complete tasks in any order.

use crate::manifest::{ArtifactSpec, Manifest};
use std::path::{Path, PathBuf};
use url::Url;

/// File extension used when the source URL does not carry one.
/// Dataset artifacts are AnnData containers by default.
pub const DEFAULT_EXTENSION: &str = "h5ad";

/// One unit of work for the fetcher: a (namespace, artifact) pair with its
/// spec and resolved destination path.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub namespace: String,
    pub artifact_id: String,
    pub spec: ArtifactSpec,
    pub dest: PathBuf,
}

impl FetchTask {
    /// Human-readable task label for logs and summaries.
    pub fn label(&self) -> String {
        format!("{}/{}", self.namespace, self.artifact_id)
    }
}

/// Flatten the manifest into fetch tasks rooted at `root`.
///
/// `filter` restricts output to the named namespaces; an empty filter means
/// all namespaces. Filter names that match nothing simply yield no tasks.
pub fn resolve(manifest: &Manifest, root: &Path, filter: &[String]) -> Vec<FetchTask> {
    let mut tasks = Vec::new();
    for (namespace, artifacts) in &manifest.datasets {
        if !filter.is_empty() && !filter.iter().any(|f| f == namespace) {
            continue;
        }
        for (artifact_id, spec) in &artifacts.0 {
            let filename = format!("{}.{}", artifact_id, artifact_extension(&spec.url));
            tasks.push(FetchTask {
                namespace: namespace.clone(),
                artifact_id: artifact_id.clone(),
                spec: spec.clone(),
                dest: root.join(namespace).join(filename),
            });
        }
    }
    tasks
}

/// Derive the artifact file extension from the URL's last path segment.
/// Query strings (e.g. Zenodo's `?download=1`) are ignored. Falls back to
/// [`DEFAULT_EXTENSION`] when the segment has no usable extension.
fn artifact_extension(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some(segment) = parsed.path_segments().and_then(|s| s.last()) {
            if let Some((stem, ext)) = segment.rsplit_once('.') {
                let usable = !stem.is_empty()
                    && !ext.is_empty()
                    && ext.len() <= 8
                    && ext.chars().all(|c| c.is_ascii_alphanumeric());
                if usable {
                    return ext.to_ascii_lowercase();
                }
            }
        }
    }
    DEFAULT_EXTENSION.to_string()
}
