//! Shared project scaffolding: timestamped names and exclusive creation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use super::AdapterError;

/// Timestamp format used in project directory names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `<prefix>project_<YYYYMMDD_HHMMSS>`.
pub fn project_dir_name(prefix: &str, timestamp: NaiveDateTime) -> String {
    format!("{prefix}project_{}", timestamp.format(TIMESTAMP_FORMAT))
}

/// Create `work_dir/name` plus the given subdirectories.
///
/// `work_dir` is created if missing, but the project root itself must not
/// exist yet: an existing root is reported as [`AdapterError::ProjectInit`]
/// and left untouched.
pub fn create_project_root(
    work_dir: &Path,
    name: &str,
    subdirs: &[&str],
) -> Result<PathBuf, AdapterError> {
    let root = work_dir.join(name);
    let init_err = |reason: String| AdapterError::ProjectInit {
        path: root.clone(),
        reason,
    };

    std::fs::create_dir_all(work_dir)
        .map_err(|e| init_err(format!("cannot create work dir {}: {e}", work_dir.display())))?;

    match std::fs::create_dir(&root) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(init_err("project directory already exists".to_string()));
        }
        Err(e) => return Err(init_err(e.to_string())),
    }

    for sub in subdirs {
        std::fs::create_dir(root.join(sub))
            .map_err(|e| init_err(format!("cannot create {sub}/: {e}")))?;
    }

    Ok(root)
}

/// Write a scaffold file, mapping failures to [`AdapterError::ProjectInit`].
pub fn write_scaffold_file(root: &Path, relative: &str, contents: &str) -> Result<(), AdapterError> {
    std::fs::write(root.join(relative), contents).map_err(|e| AdapterError::ProjectInit {
        path: root.to_path_buf(),
        reason: format!("cannot write {relative}: {e}"),
    })
}
