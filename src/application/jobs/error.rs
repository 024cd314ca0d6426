use thiserror::Error;

use crate::infra::renderer::RenderError;
use crate::infra::resolver::ResolveError;

/// Terminal failure kinds for a render job.
///
/// Every variant ends the job; archive failures never reach this enum because
/// archiving is best-effort. The caller sees one generic message,
/// while the precise kind is preserved here for logs and metrics.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no input images were submitted")]
    InvalidInput,
    #[error("failed to provision job workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("failed to stage input image: {0}")]
    StageWrite(#[source] std::io::Error),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl JobError {
    /// Stable identifier for structured logs and the failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Workspace(_) => "workspace",
            Self::StageWrite(_) => "stage_write",
            Self::Render(RenderError::Spawn(_)) => "render_spawn",
            Self::Render(RenderError::Failed { .. }) => "render_failed",
            Self::Render(RenderError::Timeout(_)) => "render_timeout",
            Self::Render(RenderError::OutputTooLarge { .. }) => "render_output_too_large",
            Self::Render(RenderError::Io(_)) => "render_io",
            Self::Resolve(ResolveError::NoArtifactProduced) => "no_artifact_produced",
            Self::Resolve(ResolveError::Read(_)) => "artifact_read",
        }
    }
}
