/*!
 * Monitor Limits and Constants
 *
 * Centralized location for queue sizes, delays, and thresholds.
 * Values include rationale comments explaining WHY they exist.
 */

use std::time::Duration;

// =============================================================================
// QUEUE CAPACITIES
// =============================================================================

/// Kernel event queue capacity (2048 events)
/// Buffers bursts of process churn between source and event loop
/// [PERF] The loop drains this faster than the kernel produces under
/// normal load; the headroom covers fork storms
pub const SOURCE_EVENT_QUEUE_SIZE: usize = 2048;

/// Transport error queue capacity (10 errors)
/// Errors are rare and each one triggers a reconnect; deep buffering
/// would only delay recovery
pub const SOURCE_ERROR_QUEUE_SIZE: usize = 10;

/// Pending callback queue capacity (5000 units)
/// Bounds memory under sustained overload; excess units are dropped,
/// never blocked on
pub const PENDING_CALLBACK_QUEUE_SIZE: usize = 5000;

// =============================================================================
// DISPATCH POOL
// =============================================================================

/// Fallback dispatch worker count
/// Used when available parallelism cannot be determined
pub const DEFAULT_DISPATCH_WORKERS: usize = 4;

// =============================================================================
// TIMING
// =============================================================================

/// Delay before reopening a failed source subscription (50ms)
/// Prevents a tight reconnect loop against a flapping transport
pub const RECONNECT_DELAY: Duration = Duration::from_millis(50);

/// Periodic stats logging interval (2 minutes)
/// Used only for aggregate reporting, never for control decisions
pub const STATS_LOG_INTERVAL: Duration = Duration::from_secs(120);

// =============================================================================
// LOG RATE LIMITING
// =============================================================================

/// Max drop-path log lines per window (10 lines)
/// Keeps sustained overload from turning into a log storm
pub const DROP_LOG_BURST: u32 = 10;

/// Drop-path log window (10 minutes)
pub const DROP_LOG_WINDOW: Duration = Duration::from_secs(600);
