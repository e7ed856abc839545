//! On-disk cache layout
//!
//! A cached image lives at `<cache_dir>/<sha256(url + '\n' + spec key)>`. While a
//! download is in flight its bytes go to `<path>_tmp`, which is renamed onto
//! the final path only after the body was read to the end. A final path is
//! therefore either absent or a complete file.

use crate::spec::ImageLoadSpec;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Suffix appended to the final path for in-flight writes
pub const TEMP_SUFFIX: &str = "_tmp";

/// Final cache path for `url` loaded under `spec`
pub fn cache_path(cache_dir: &Path, url: &str, spec: &ImageLoadSpec) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(spec.key().as_bytes());
    let digest = hasher.finalize();

    let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    cache_dir.join(name)
}

/// In-flight sibling of a final cache path
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Remove temp files left behind by a process that died mid-download
///
/// Returns the number of files removed. Failures to remove individual files
/// are logged and skipped.
pub async fn sweep_temp_files(cache_dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(cache_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().ends_with(TEMP_SUFFIX) {
            continue;
        }
        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed orphaned temp file");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove orphaned temp file");
            }
        }
    }

    Ok(removed)
}
