/*!
 * Core Types
 * Common types used across the monitor
 */

/// Process ID type
pub type Pid = u32;

/// Common result type for monitor operations
pub type MonitorResult<T> = Result<T, super::errors::MonitorError>;
