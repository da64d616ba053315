/*!
 * Process Events
 * The two lifecycle event kinds observed from the kernel
 */

use crate::core::types::Pid;
use serde::{Deserialize, Serialize};

/// Kind of process lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EventKind {
    /// A process began executing a new program image
    Exec,
    /// A process terminated
    Exit,
}

impl EventKind {
    /// Stable lowercase name, used in counter names and log lines
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Exec => "exec",
            EventKind::Exit => "exit",
        }
    }
}

/// A single process lifecycle event as produced by an event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub kind: EventKind,
    pub pid: Pid,
}

impl ProcessEvent {
    /// Create an Exec event
    #[inline]
    pub const fn exec(pid: Pid) -> Self {
        Self {
            kind: EventKind::Exec,
            pid,
        }
    }

    /// Create an Exit event
    #[inline]
    pub const fn exit(pid: Pid) -> Self {
        Self {
            kind: EventKind::Exit,
            pid,
        }
    }
}
