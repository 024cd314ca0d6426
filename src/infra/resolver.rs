//! Selection of the single delivered artifact from a job's output directory.

use std::path::Path;

use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::domain::job::{ARTIFACT_EXTENSION, RenderArtifact};

const SOURCE: &str = "infra::resolver";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("renderer exited cleanly but produced no video artifact")]
    NoArtifactProduced,
    #[error("failed to read produced artifact: {0}")]
    Read(#[from] std::io::Error),
}

/// Pick exactly one `.mp4` artifact out of the output directory.
///
/// With multiple candidates the lexicographically last name wins. That mirrors
/// "most recent" only as far as the renderer's own naming convention makes
/// name order correlate with recency; it is an assumption inherited from the
/// external contract, deliberately not replaced with an mtime rule.
pub async fn resolve_artifact(output_dir: &Path) -> Result<RenderArtifact, ResolveError> {
    let mut candidates: Vec<String> = Vec::new();
    let mut entries = fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if Path::new(name)
            .extension()
            .is_some_and(|ext| ext == ARTIFACT_EXTENSION)
        {
            candidates.push(name.to_owned());
        }
    }

    candidates.sort();
    let Some(file_name) = candidates.pop() else {
        return Err(ResolveError::NoArtifactProduced);
    };

    let path = output_dir.join(&file_name);
    let bytes = Bytes::from(fs::read(&path).await?);

    debug!(
        target = SOURCE,
        artifact = %file_name,
        bytes = bytes.len(),
        "resolved render artifact"
    );

    Ok(RenderArtifact {
        file_name,
        path,
        bytes,
    })
}
