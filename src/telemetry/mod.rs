/*!
 * Telemetry
 * Monotonic counters for the monitor, plus rate-limited logging
 *
 * The counters are process-wide and survive acquire/release cycles;
 * only a process restart resets them. An external metrics sink reads
 * them through `snapshot()`.
 */

mod log_limit;

pub use log_limit::LogLimit;

use crate::events::EventKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Single monotonic counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    #[inline]
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counter block for the process monitor:
///  o events counts every event received from the source
///  o exec / exit count per-kind events
///  o restart counts source subscription restarts after transport errors
///  o reinit_failed counts failed reopens after a restart
///  o scan_failed counts failed cold-start process scans
///  o callbacks_executed counts dispatch units actually run
///  o exec_queue_full / exit_queue_full count units dropped because the
///    dispatch queue was full
#[derive(Debug, Default)]
pub struct MonitorTelemetry {
    pub events: Counter,
    pub exec: Counter,
    pub exit: Counter,
    pub restart: Counter,

    pub reinit_failed: Counter,
    pub scan_failed: Counter,
    pub callbacks_executed: Counter,

    pub exec_queue_full: Counter,
    pub exit_queue_full: Counter,
}

impl MonitorTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The drop counter for units shed on a full dispatch queue
    #[inline]
    pub fn queue_full(&self, kind: EventKind) -> &Counter {
        match kind {
            EventKind::Exec => &self.exec_queue_full,
            EventKind::Exit => &self.exit_queue_full,
        }
    }

    /// The per-kind event counter
    #[inline]
    pub fn kind_counter(&self, kind: EventKind) -> &Counter {
        match kind {
            EventKind::Exec => &self.exec,
            EventKind::Exit => &self.exit,
        }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            events: self.events.get(),
            exec: self.exec.get(),
            exit: self.exit.get(),
            restart: self.restart.get(),
            reinit_failed: self.reinit_failed.get(),
            scan_failed: self.scan_failed.get(),
            callbacks_executed: self.callbacks_executed.get(),
            exec_queue_full: self.exec_queue_full.get(),
            exit_queue_full: self.exit_queue_full.get(),
        }
    }

    /// One-line summary for the periodic stats log
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "events={} exec={} exit={} restart={} reinit_failed={} scan_failed={} \
             callbacks_executed={} exec_queue_full={} exit_queue_full={}",
            s.events,
            s.exec,
            s.exit,
            s.restart,
            s.reinit_failed,
            s.scan_failed,
            s.callbacks_executed,
            s.exec_queue_full,
            s.exit_queue_full,
        )
    }
}

/// Serializable counter snapshot for external sinks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub events: u64,
    pub exec: u64,
    pub exit: u64,
    pub restart: u64,
    pub reinit_failed: u64,
    pub scan_failed: u64,
    pub callbacks_executed: u64,
    pub exec_queue_full: u64,
    pub exit_queue_full: u64,
}
