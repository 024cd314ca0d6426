//! Job-scoped scratch directory provisioning and teardown.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

use crate::domain::job::JobId;

const SOURCE: &str = "infra::workspace";

/// Creates and destroys the pair of scratch directories a job owns for its
/// entire lifetime. Directory names embed the job id, so concurrently running
/// jobs can never reference each other's scratch state.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

/// The input and output scratch directories of a single job.
///
/// Dropping the workspace sweeps both trees synchronously as a backstop for
/// cancelled jobs; the orchestrator normally calls
/// [`WorkspaceManager::release`] explicitly before responding. Both removal
/// paths treat a missing directory as success, so the overlap is harmless.
#[derive(Debug)]
pub struct JobWorkspace {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        remove_tree_sync(&self.input_dir);
        remove_tree_sync(&self.output_dir);
    }
}

impl WorkspaceManager {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create both fresh, empty scratch directories for a job.
    pub async fn acquire(&self, job: JobId) -> Result<JobWorkspace, io::Error> {
        let input_dir = self.root.join(format!("{job}-input"));
        let output_dir = self.root.join(format!("{job}-output"));

        fs::create_dir_all(&input_dir).await?;
        if let Err(err) = fs::create_dir_all(&output_dir).await {
            remove_tree(&input_dir).await;
            return Err(err);
        }

        Ok(JobWorkspace {
            input_dir,
            output_dir,
        })
    }

    /// Remove both scratch trees. Best-effort and idempotent: a path that is
    /// already gone counts as success, and removal errors are logged rather
    /// than escalated so they can never mask the failure that ended the job.
    pub async fn release(&self, workspace: &JobWorkspace) {
        remove_tree(&workspace.input_dir).await;
        remove_tree(&workspace.output_dir).await;
    }
}

async fn remove_tree(path: &Path) {
    match fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            target = SOURCE,
            path = %path.display(),
            error = %err,
            "failed to remove scratch directory"
        ),
    }
}

fn remove_tree_sync(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            target = SOURCE,
            path = %path.display(),
            error = %err,
            "failed to remove scratch directory"
        ),
    }
}
