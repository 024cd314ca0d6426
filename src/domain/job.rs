//! Core data model for one render job.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use uuid::Uuid;

/// Extension every staged input is written with, regardless of the uploaded
/// filename. The renderer contract only promises to read `input_*.png`.
pub const INPUT_FILE_EXTENSION: &str = "png";

/// Extension the renderer is expected to produce in the output directory.
pub const ARTIFACT_EXTENSION: &str = "mp4";

/// Identifier for a single render job. Embedded in scratch directory names so
/// concurrent jobs can never collide on the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One uploaded image, in caller-supplied order.
#[derive(Debug, Clone)]
pub struct InputImage {
    /// Original filename as submitted. Diagnostics only; staged files are
    /// always named by upload position.
    pub original_name: String,
    pub bytes: Bytes,
}

/// The single output artifact selected from the renderer's output directory.
#[derive(Debug, Clone)]
pub struct RenderArtifact {
    /// File name within the output directory. Doubles as the lexicographic
    /// tie-break key and the suggested download name.
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: Bytes,
}

/// A durable copy of a delivered artifact in the append-only archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub checksum: String,
}
