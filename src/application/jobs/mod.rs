//! Job orchestration: the strict staging → render → resolve → archive
//! sequence, with unconditional scratch teardown on every exit path.

mod error;

pub use error::JobError;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::domain::job::{InputImage, JobId};
use crate::infra::archive::ArchiveStore;
use crate::infra::renderer::Renderer;
use crate::infra::resolver::resolve_artifact;
use crate::infra::staging::stage_inputs;
use crate::infra::workspace::{JobWorkspace, WorkspaceManager};

const SOURCE: &str = "application::jobs";

/// The successful result of a job, returned verbatim to the caller.
#[derive(Debug, Clone)]
pub struct DeliveredVideo {
    /// Artifact name as the renderer produced it; suggested download name.
    pub file_name: String,
    pub bytes: Bytes,
}

/// Runs one render job end to end. Each job owns a disjoint pair of scratch
/// directories, so any number of jobs may run concurrently without
/// coordination; the append-only archive is the only shared sink and its
/// writes are independent uniquely-named files.
#[derive(Clone)]
pub struct RenderJobService {
    workspace: WorkspaceManager,
    renderer: Arc<dyn Renderer>,
    archive: ArchiveStore,
    render_timeout: Duration,
}

impl RenderJobService {
    pub fn new(
        workspace: WorkspaceManager,
        renderer: Arc<dyn Renderer>,
        archive: ArchiveStore,
        render_timeout: Duration,
    ) -> Self {
        Self {
            workspace,
            renderer,
            archive,
            render_timeout,
        }
    }

    /// Run a job to completion or terminal failure.
    ///
    /// An empty submission fails before any filesystem or process side effect.
    /// Once the workspace is acquired, both scratch directories are released
    /// whatever the outcome; a dropped future (caller disconnect) falls back
    /// to the workspace's own sweep-on-drop and the renderer's kill-on-drop.
    pub async fn run(&self, images: Vec<InputImage>) -> Result<DeliveredVideo, JobError> {
        if images.is_empty() {
            return Err(JobError::InvalidInput);
        }

        let job = JobId::new();
        let started_at = Instant::now();
        counter!("reelpress_jobs_total").increment(1);
        info!(
            target = SOURCE,
            job = %job,
            images = images.len(),
            "job accepted"
        );

        let workspace = self
            .workspace
            .acquire(job)
            .await
            .map_err(JobError::Workspace)?;

        let result = self.run_staged(job, &workspace, &images).await;
        self.workspace.release(&workspace).await;

        match &result {
            Ok(video) => info!(
                target = SOURCE,
                job = %job,
                artifact = %video.file_name,
                bytes = video.bytes.len(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "job delivered"
            ),
            Err(err) => {
                counter!("reelpress_jobs_failed_total", "kind" => err.kind()).increment(1);
                warn!(
                    target = SOURCE,
                    job = %job,
                    kind = err.kind(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "job failed"
                );
            }
        }

        result
    }

    async fn run_staged(
        &self,
        job: JobId,
        workspace: &JobWorkspace,
        images: &[InputImage],
    ) -> Result<DeliveredVideo, JobError> {
        stage_inputs(&workspace.input_dir, images)
            .await
            .map_err(JobError::StageWrite)?;

        let render_started = Instant::now();
        self.renderer
            .invoke(&workspace.input_dir, &workspace.output_dir, self.render_timeout)
            .await?;
        histogram!("reelpress_render_ms").record(render_started.elapsed().as_millis() as f64);

        let artifact = resolve_artifact(&workspace.output_dir).await?;

        // Archiving is a durability nicety, not a delivery requirement: its
        // failure is logged and counted but never surfaced as the job's result.
        match self
            .archive
            .store(&artifact.bytes, OffsetDateTime::now_utc())
            .await
        {
            Ok(entry) => info!(
                target = SOURCE,
                job = %job,
                path = %entry.path.display(),
                checksum = %entry.checksum,
                "artifact archived"
            ),
            Err(err) => {
                counter!("reelpress_archive_failed_total").increment(1);
                warn!(
                    target = SOURCE,
                    job = %job,
                    error = %err,
                    "failed to archive artifact"
                );
            }
        }

        Ok(DeliveredVideo {
            file_name: artifact.file_name,
            bytes: artifact.bytes,
        })
    }
}
