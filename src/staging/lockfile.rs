//! staging::lockfile
//!
//! Lock markers for staged edits.
//!
//! # Storage
//!
//! A marker lives next to its staged copy (`<temp>.lock`) and contains a
//! single ASCII line, `pid:os:unixTimestamp`. While the owning process is
//! alive, the staging manager also holds an `fs2` advisory lock on the
//! marker file; the marker outlives a crash, the advisory lock does not.
//!
//! # Staleness
//!
//! A foreign marker is reclaimable when any of these hold:
//! - its content does not parse (foreign-but-invalid owner)
//! - its age exceeds the configured maximum
//! - its advisory lock can be taken, meaning the owner no longer exists
//!
//! A marker written by this process is never reclaimable through
//! [`inspect`]; the in-memory staging table is authoritative for our own
//! edits.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::process;
use std::time::Duration;

use chrono::Utc;
use fs2::FileExt;

/// Parsed contents of a lock marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockMarker {
    /// Process id of the writer.
    pub pid: u32,
    /// Operating system name of the writer (diagnostic only).
    pub os: String,
    /// Unix timestamp (seconds) at write time.
    pub timestamp: i64,
}

impl LockMarker {
    /// Marker describing the current process at the current time.
    pub fn for_current_process() -> Self {
        Self {
            pid: process::id(),
            os: std::env::consts::OS.to_string(),
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Serialize as the on-disk `pid:os:unixTimestamp` line.
    pub fn render(&self) -> String {
        format!("{}:{}:{}", self.pid, self.os, self.timestamp)
    }

    /// Parse the on-disk form. Returns `None` for anything malformed.
    pub fn parse(content: &str) -> Option<Self> {
        let mut parts = content.trim().splitn(3, ':');
        let pid = parts.next()?.parse::<u32>().ok()?;
        let os = parts.next()?.to_string();
        let timestamp = parts.next()?.parse::<i64>().ok()?;
        if pid == 0 {
            return None;
        }
        Some(Self { pid, os, timestamp })
    }

    /// Age of the marker relative to now. Clock skew clamps to zero.
    pub fn age(&self) -> Duration {
        let secs = Utc::now().timestamp().saturating_sub(self.timestamp);
        Duration::from_secs(secs.max(0) as u64)
    }
}

/// Result of inspecting a marker on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// No marker file exists.
    Absent,
    /// The marker belongs to this process.
    OwnedBySelf,
    /// The marker is reclaimable (invalid, aged out, or owner gone).
    Stale,
    /// A live foreign process holds the marker.
    Held,
}

/// Classify the marker at `path` against `max_age`.
pub fn inspect(path: &Path, max_age: Duration) -> MarkerState {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return MarkerState::Absent,
    };

    let marker = match LockMarker::parse(&content) {
        Some(marker) => marker,
        None => return MarkerState::Stale,
    };

    if marker.pid == process::id() {
        return MarkerState::OwnedBySelf;
    }
    if marker.age() > max_age {
        return MarkerState::Stale;
    }

    // Liveness probe: every writer of this crate holds the advisory lock
    // on its marker while alive, so a lock we can take belongs to nobody.
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                MarkerState::Stale
            }
            Err(_) => MarkerState::Held,
        },
        Err(_) => MarkerState::Held,
    }
}

/// Write a marker for the current process and take its advisory lock.
///
/// The returned handle must stay open for the lifetime of the staged
/// edit; dropping it releases the advisory lock.
pub fn write_held(path: &Path) -> io::Result<File> {
    let marker = LockMarker::for_current_process();
    std::fs::write(path, marker.render())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    let file = OpenOptions::new().read(true).write(true).open(path)?;
    // WouldBlock here means another handle in this process beat us to a
    // marker we just wrote; surface it as an error.
    file.try_lock_exclusive()?;
    Ok(file)
}
