//! Staging of uploaded payloads into a job's input directory.

use std::io;
use std::path::Path;

use tokio::fs;
use tracing::debug;

use crate::domain::job::{INPUT_FILE_EXTENSION, InputImage};

const SOURCE: &str = "infra::staging";

/// Write each payload verbatim to `input_<i>.png`, preserving upload order.
///
/// Filenames are positional: the renderer contract never sees caller-supplied
/// names. No content validation happens here; the
/// renderer is the authority on what it accepts. Partial writes left behind by
/// a failure are swept by workspace release.
pub async fn stage_inputs(input_dir: &Path, images: &[InputImage]) -> Result<(), io::Error> {
    for (index, image) in images.iter().enumerate() {
        let path = input_dir.join(format!("input_{index}.{INPUT_FILE_EXTENSION}"));
        fs::write(&path, &image.bytes).await?;
        debug!(
            target = SOURCE,
            index,
            original = %image.original_name,
            bytes = image.bytes.len(),
            "staged input"
        );
    }

    debug!(
        target = SOURCE,
        count = images.len(),
        input_dir = %input_dir.display(),
        "staged input images"
    );
    Ok(())
}
