//! Filesystem helpers for moving rendered output out of scratch space.
//!
//! Scratch directories usually live on a different filesystem than the
//! published videos, so a plain rename can fail with EXDEV.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Tries a rename first. On EXDEV it copies to `<dst>.partial` in the
/// destination directory and renames that into place, so readers of `dst`
/// never see a half-written file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename detected, falling back to copy: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV is error code 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let partial = partial_path(dst);

    if let Err(e) = fs::copy(src, &partial).await {
        tracing::error!(
            "Failed to copy {} -> {}: {}",
            src.display(),
            partial.display(),
            e
        );
        remove_file_if_exists(&partial).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&partial, dst).await {
        tracing::error!(
            "Failed to rename {} -> {}: {}",
            partial.display(),
            dst.display(),
            e
        );
        remove_file_if_exists(&partial).await;
        return Err(e.into());
    }

    // Source lives in scratch space; leaving it behind is not fatal
    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!("Failed to remove {} after move: {}", src.display(), e);
    }

    Ok(())
}

fn partial_path(dst: &Path) -> std::path::PathBuf {
    let mut name = dst.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dst.with_file_name(name)
}

/// Delete a file, ignoring "not found". Other failures are logged.
pub async fn remove_file_if_exists(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
