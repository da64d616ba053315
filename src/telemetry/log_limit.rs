/*!
 * Log Rate Limiting
 * Bounds log volume on paths that fire per dropped event
 */

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Allows at most `burst` log lines per `window`.
///
/// Under sustained overload the drop path fires for every shed unit;
/// without a limit that is a log line per event.
pub struct LogLimit {
    burst: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

struct WindowState {
    started: Instant,
    emitted: u32,
}

impl LogLimit {
    pub fn new(burst: u32, window: Duration) -> Self {
        Self {
            burst,
            window,
            state: Mutex::new(WindowState {
                started: Instant::now(),
                emitted: 0,
            }),
        }
    }

    /// True if the caller may emit a log line now
    pub fn should_log(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.emitted = 0;
        }
        if state.emitted < self.burst {
            state.emitted += 1;
            true
        } else {
            false
        }
    }
}
