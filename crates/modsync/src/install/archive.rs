//! Zip extraction into a scratch directory

use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::install::error::InstallError;

/// Extract every entry of `archive` below `destination`
///
/// Runs on the blocking pool. Entries whose names would escape `destination`
/// are skipped. Returns the number of files written.
pub async fn extract_zip(archive: &Path, destination: &Path) -> Result<usize, InstallError> {
    let archive = archive.to_path_buf();
    let destination = destination.to_path_buf();
    let archive_for_error = archive.clone();

    tokio::task::spawn_blocking(move || extract_zip_blocking(&archive, &destination))
        .await
        .map_err(|e| InstallError::Extraction {
            archive: archive_for_error,
            reason: format!("extraction task failed: {}", e),
        })?
}

fn extract_zip_blocking(archive_path: &Path, destination: &Path) -> Result<usize, InstallError> {
    let extraction_error = |reason: String| InstallError::Extraction {
        archive: archive_path.to_path_buf(),
        reason,
    };

    let file = File::open(archive_path)
        .map_err(|e| extraction_error(format!("failed to open archive: {}", e)))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| extraction_error(format!("invalid zip archive: {}", e)))?;

    let mut files_written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| extraction_error(format!("failed to read entry {}: {}", i, e)))?;

        let outpath: PathBuf = match entry.enclosed_name() {
            Some(path) => destination.join(path),
            None => {
                debug!("Skipping unsafe zip entry name: {}", entry.name());
                continue;
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)
                .map_err(|e| extraction_error(format!("failed to create {}: {}", outpath.display(), e)))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| extraction_error(format!("failed to create {}: {}", parent.display(), e)))?;
        }

        let mut outfile = File::create(&outpath)
            .map_err(|e| extraction_error(format!("failed to create {}: {}", outpath.display(), e)))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| extraction_error(format!("failed to extract {}: {}", outpath.display(), e)))?;
        files_written += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                if let Err(e) =
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                {
                    debug!("Could not set mode {:o} on {}: {}", mode, outpath.display(), e);
                }
            }
        }
    }

    debug!(
        "Extracted {} files from {} into {}",
        files_written,
        archive_path.display(),
        destination.display()
    );
    Ok(files_written)
}
