//! paths
//!
//! Centralized naming for staging and backup artifacts.
//!
//! # Architecture
//!
//! Every on-disk artifact the engine creates next to (or on behalf of) a
//! configuration file is named here, so the layout lives in one place:
//!
//! - `config_<pid>_<unixnano>.tmp` - staged copy inside the staging dir
//! - `<temp>.lock` - lock marker next to a staged copy
//! - `<original>.backup` - newest rotated backup
//! - `<original>.backup.<n>` - older rotated generations
//! - `<target>.tmp.<unixnano>` - inline staged write for an Operation
//!
//! **Hard rule:** no module outside this one concatenates these suffixes
//! by hand.

use std::path::{Component, Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

/// Suffix appended to a staged temp copy to form its lock marker.
pub const LOCK_SUFFIX: &str = ".lock";

/// Suffix appended to an original path to form its newest rotated backup.
pub const BACKUP_SUFFIX: &str = ".backup";

/// Nanoseconds since the Unix epoch, used to make staged names unique.
///
/// A clock before the epoch would indicate a badly broken host; zero is
/// still a usable (if non-unique) suffix in that case.
pub fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Name of a staged temp copy inside the staging directory.
///
/// # Example
///
/// ```
/// use confguard::paths::staged_file_name;
///
/// let name = staged_file_name();
/// assert!(name.starts_with("config_"));
/// assert!(name.ends_with(".tmp"));
/// ```
pub fn staged_file_name() -> String {
    format!("config_{}_{}.tmp", process::id(), unix_nanos())
}

/// Lock marker path for a staged temp copy.
pub fn lock_marker_path(temp_path: &Path) -> PathBuf {
    let mut s = temp_path.as_os_str().to_os_string();
    s.push(LOCK_SUFFIX);
    PathBuf::from(s)
}

/// Newest rotated backup path for an original file.
pub fn backup_path(original: &Path) -> PathBuf {
    let mut s = original.as_os_str().to_os_string();
    s.push(BACKUP_SUFFIX);
    PathBuf::from(s)
}

/// Path of rotated backup generation `n` (n >= 1).
///
/// Generation 0 is the bare `.backup` path itself; see [`backup_path`].
pub fn backup_generation_path(backup: &Path, n: usize) -> PathBuf {
    let mut s = backup.as_os_str().to_os_string();
    s.push(format!(".{}", n));
    PathBuf::from(s)
}

/// Uniquely named sibling temp path for an inline staged write.
///
/// The temp file lives in the same directory as the target so the
/// subsequent rename stays on one filesystem and is therefore atomic.
pub fn sibling_temp_path(target: &Path) -> PathBuf {
    let mut s = target.as_os_str().to_os_string();
    s.push(format!(".tmp.{}", unix_nanos()));
    PathBuf::from(s)
}

/// Default process-scoped staging directory under the OS temp dir.
pub fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join(format!("confguard-staging-{}", process::id()))
}

/// Lexically normalize a path so spellings like `a/./b` and `a/b` refer
/// to the same key. Purely textual: nothing touches the filesystem, and
/// symlinked aliases of the same file keep distinct keys.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.as_os_str().is_empty() || out.ends_with("..") {
                    // Leading `..` in a relative path is preserved.
                    out.push(Component::ParentDir);
                } else {
                    // At the filesystem root the pop is a no-op; `..`
                    // above root collapses to root.
                    let _ = out.pop();
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
