//! Recovery helpers for non-fatal training failures.
//!
//! - Checkpoint saves are retried once after a delay, then reported to the
//!   caller, which logs and keeps training.
//! - Checkpoint loads for resume fall back to older checkpoints when the
//!   newest one is corrupt.

use std::path::PathBuf;
use std::time::Duration;

use crate::learning::LearningError;
use crate::learning::checkpoint::{CheckpointManager, CheckpointMeta};
use crate::network::ValueModel;

/// Save checkpoint with retry on failure.
///
/// If the first attempt fails, waits `retry_delay` and retries once. The
/// second error is returned to the caller.
pub fn save_checkpoint_with_retry<T, F>(retry_delay: Duration, mut save_fn: F) -> Result<T, LearningError>
where
    F: FnMut() -> Result<T, LearningError>,
{
    match save_fn() {
        Ok(value) => Ok(value),
        Err(first_error) => {
            log::warn!(
                "Checkpoint save failed, retrying in {} ms: {}",
                retry_delay.as_millis(),
                first_error
            );

            std::thread::sleep(retry_delay);

            match save_fn() {
                Ok(value) => {
                    log::info!("Checkpoint save succeeded on retry");
                    Ok(value)
                }
                Err(second_error) => {
                    log::warn!("Checkpoint save failed after retry: {}", second_error);
                    Err(second_error)
                }
            }
        }
    }
}

/// Load the newest checkpoint that passes verification.
///
/// Corrupt checkpoints are skipped with a warning. Returns `None` when the
/// directory has no loadable checkpoint.
pub fn load_latest_valid<M: ValueModel>(
    manager: &CheckpointManager,
) -> Result<Option<(M, CheckpointMeta, PathBuf)>, LearningError> {
    let mut checkpoints = manager.list_checkpoints()?;
    while let Some((iteration, path)) = checkpoints.pop() {
        match manager.load::<M>(&path) {
            Ok((model, meta)) => return Ok(Some((model, meta, path))),
            Err(e) => {
                log::warn!(
                    "Skipping unreadable checkpoint for iteration {} ({}): {}",
                    iteration,
                    path.display(),
                    e
                );
            }
        }
    }
    Ok(None)
}
