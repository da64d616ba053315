/*!
 * Process Enumeration
 * Cold-start scan of currently-running processes
 *
 * Invoked once during initialization so subscribers that care about
 * pre-existing processes see them; subscribers that do not are never
 * charged for the scan.
 */

use crate::core::errors::ScanError;
use crate::core::types::Pid;
use std::fs;
use std::path::PathBuf;

/// Enumerates the processes running right now.
///
/// Liveness is best-effort: a process may exit between enumeration and
/// callback delivery.
pub trait ProcessEnumerator: Send + Sync {
    fn pids(&self) -> Result<Vec<Pid>, ScanError>;
}

/// procfs-backed enumerator: every numeric top-level entry is a PID
#[derive(Debug, Clone)]
pub struct ProcScanner {
    root: PathBuf,
}

impl ProcScanner {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }

    /// Scan an alternate procfs mount
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEnumerator for ProcScanner {
    fn pids(&self) -> Result<Vec<Pid>, ScanError> {
        let mut pids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<Pid>().ok())
            {
                pids.push(pid);
            }
        }
        Ok(pids)
    }
}
