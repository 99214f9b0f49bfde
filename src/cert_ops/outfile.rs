//! Output safety layer
//!
//! Guarantees a conversion never overwrites an existing file and never leaves
//! a partial file at the destination. Small buffers go through an exclusive
//! create; larger outputs are written to a temp file in the destination's own
//! directory and then hard-linked into place. A hard link fails when the
//! destination already exists, which closes the race between the early
//! existence check and the commit.

use crate::error::{EngineError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Bound on the `-1`, `-2`, ... sibling probe.
const MAX_SIBLING_ATTEMPTS: u32 = 100;

/// Fail with `OutputExists` (carrying a sibling suggestion) when the
/// destination is already present.
pub fn ensure_not_exists(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(EngineError::OutputExists {
            path: path.to_path_buf(),
            suggestion: next_available_path(path),
        });
    }
    Ok(())
}

/// Suggest a non-colliding sibling: `<base>-1<ext>`, `<base>-2<ext>`, ...
///
/// Returns the first candidate that does not exist, or the last probed
/// candidate when the attempt bound is exhausted.
pub fn next_available_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut candidate = path.to_path_buf();
    for n in 1..=MAX_SIBLING_ATTEMPTS {
        candidate = path.with_file_name(format!("{}-{}{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
    }
    candidate
}

/// Write a small buffer with create-exclusive semantics. A concurrent creator
/// loses the write and receives `OutputExists` rather than silent corruption.
pub fn write_exclusive(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(EngineError::OutputExists {
                path: path.to_path_buf(),
                suggestion: next_available_path(path),
            });
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(data)?;
    file.flush()?;
    Ok(())
}

/// Commit a temp file to its final destination via hard link.
///
/// The link is the actual overwrite guard: it fails if the destination came
/// into existence after the earlier check. The temp file is removed whether or
/// not the link succeeds.
pub fn commit_temp_file(tmp: &Path, dest: &Path) -> Result<()> {
    let linked = std::fs::hard_link(tmp, dest);
    let _ = std::fs::remove_file(tmp);
    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(EngineError::OutputExists {
                path: dest.to_path_buf(),
                suggestion: next_available_path(dest),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Atomic write-or-fail for buffered output: temp file in the destination's
/// directory, then the hard-link commit.
pub fn write_atomic(dest: &Path, data: &[u8]) -> Result<()> {
    ensure_not_exists(dest)?;

    let dir = dest.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    tmp.write_all(data)?;
    tmp.flush()?;

    let tmp_path = tmp.into_temp_path();
    commit_temp_file(&tmp_path, dest)
}

/// Create an empty temp file in the destination's directory for openssl to
/// write into, returning its path guard. Commit with `commit_temp_file`.
pub fn stage_in_dest_dir(dest: &Path) -> Result<tempfile::TempPath> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".certkit-out-")
        .tempfile_in(dir)?;
    Ok(tmp.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sibling_suggestion_sequence() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pem");

        assert_eq!(next_available_path(&out), dir.path().join("out-1.pem"));

        std::fs::write(&out, b"x").unwrap();
        std::fs::write(dir.path().join("out-1.pem"), b"x").unwrap();
        assert_eq!(next_available_path(&out), dir.path().join("out-2.pem"));
    }

    #[test]
    fn test_sibling_suggestion_without_extension() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("bundle");
        assert_eq!(next_available_path(&out), dir.path().join("bundle-1"));
    }

    #[test]
    fn test_ensure_not_exists() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pem");
        assert!(ensure_not_exists(&out).is_ok());

        std::fs::write(&out, b"x").unwrap();
        let err = ensure_not_exists(&out).unwrap_err();
        assert!(err.is_output_exists());
        assert_eq!(err.suggestion().unwrap(), dir.path().join("out-1.pem"));
    }

    #[test]
    fn test_write_exclusive_refuses_clobber() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pem");
        std::fs::write(&out, b"original").unwrap();

        let err = write_exclusive(&out, b"new").unwrap_err();
        assert!(err.is_output_exists());
        // Original bytes untouched.
        assert_eq!(std::fs::read(&out).unwrap(), b"original");
    }

    #[test]
    fn test_write_atomic_roundtrip_and_guard() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.der");

        write_atomic(&out, b"payload").unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"payload");

        let err = write_atomic(&out, b"other").unwrap_err();
        assert!(err.is_output_exists());
        assert_eq!(std::fs::read(&out).unwrap(), b"payload");
    }

    #[test]
    fn test_commit_guards_against_late_arrival() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pem");
        let tmp = dir.path().join(".staged");
        std::fs::write(&tmp, b"staged").unwrap();

        // Destination appears between the early check and the commit.
        std::fs::write(&out, b"raced").unwrap();
        let err = commit_temp_file(&tmp, &out).unwrap_err();
        assert!(err.is_output_exists());
        assert_eq!(std::fs::read(&out).unwrap(), b"raced");
        // Temp file is removed even on failure.
        assert!(!tmp.exists());
    }

    #[test]
    fn test_commit_moves_temp_into_place() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pem");
        let tmp = dir.path().join(".staged");
        std::fs::write(&tmp, b"staged").unwrap();

        commit_temp_file(&tmp, &out).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"staged");
        assert!(!tmp.exists());
    }
}
