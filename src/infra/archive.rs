//! Append-only durable archive of delivered artifacts.

use std::path::PathBuf;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::job::{ARTIFACT_EXTENSION, ArchiveEntry};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to format archive timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed archive. Entries are never overwritten or deleted here;
/// accumulation is intentional, and capacity management lives outside this
/// core. Concurrent writers are safe because every entry name is unique.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Persist a verbatim copy of the payload, keyed by generation timestamp.
    /// The archive root is created on first use.
    pub async fn store(
        &self,
        payload: &Bytes,
        generated_at: OffsetDateTime,
    ) -> Result<ArchiveEntry, ArchiveError> {
        fs::create_dir_all(&self.root).await?;

        let path = self.root.join(archive_file_name(generated_at)?);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(payload).await?;
        file.flush().await?;

        let checksum = hex::encode(Sha256::digest(payload));
        Ok(ArchiveEntry { path, checksum })
    }
}

/// `tutorial_<timestamp>.mp4`, with every character of the RFC 3339 timestamp
/// outside `[A-Za-z0-9_-]` replaced by `-` so the name is filesystem-safe.
fn archive_file_name(generated_at: OffsetDateTime) -> Result<String, time::error::Format> {
    let stamp = generated_at.format(&Rfc3339)?;
    let safe: String = stamp
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    Ok(format!("tutorial_{safe}.{ARTIFACT_EXTENSION}"))
}
