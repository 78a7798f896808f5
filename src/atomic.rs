//! Atomic file writer: the single write primitive of the publishing core.
//!
//! Every component that persists state goes through [`write_atomic`]; no
//! module writes a data file directly. The sequence is write-to-temp,
//! fsync, read back and compare byte-for-byte, then rename onto the
//! target. Rename is atomic at the file-system level, so readers observe
//! either the old content or the new content, never a partial file.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::WriteError;

/// Write `bytes` to `path` atomically with read-back verification.
///
/// On verification mismatch the temp file is removed and the target is
/// untouched. On any I/O failure before the rename the target is
/// guaranteed unmodified.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| WriteError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let tmp_path = tmp_path_for(path);
    let io_err = |source: std::io::Error| WriteError::Io {
        path: tmp_path.clone(),
        source,
    };

    let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    // Read back what actually landed on disk. A mismatch means the bytes
    // were mangled on the way down, and the target must not be replaced.
    let written = fs::read(&tmp_path).map_err(io_err)?;
    if written != bytes {
        let _ = fs::remove_file(&tmp_path);
        return Err(WriteError::VerificationFailed {
            path: path.to_path_buf(),
        });
    }

    fs::rename(&tmp_path, path).map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    // Persist the rename itself. Failure here is not fatal: the data file
    // is already complete, only its directory entry may lag a crash.
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }

    Ok(())
}

/// Temp-file path used by [`write_atomic`]. Lives next to the target so
/// the rename never crosses a file-system boundary.
pub fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    std::path::PathBuf::from(os)
}
