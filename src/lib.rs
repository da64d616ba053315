/*!
 * procwatch
 * Host-wide process lifecycle event monitor
 *
 * Observes Exec and Exit events from a kernel event source and fans them
 * out, in parallel, to independently-registered callbacks. One physical
 * kernel subscription is shared by any number of logical owners through
 * a refcounted acquire/release lifecycle.
 */

pub mod core;
pub mod dispatch;
pub mod events;
pub mod monitor;
pub mod registry;
pub mod source;
pub mod telemetry;

// Re-exports
pub use crate::core::errors::{MonitorError, ScanError, SourceError};
pub use crate::core::types::{MonitorResult, Pid};
pub use dispatch::{DispatchPool, DispatchUnit};
pub use events::{EventKind, ProcessEvent};
pub use monitor::{MonitorConfig, MonitorHandle, ProcessMonitor, Transport};
pub use registry::{CallbackRegistry, ProcessCallback, Subscription, SubscriptionId};
pub use source::{EventSource, ProcessEnumerator, ProcScanner, SourceFeed, SourceHandle};
pub use telemetry::{MonitorTelemetry, TelemetrySnapshot};

#[cfg(target_os = "linux")]
pub use source::NetlinkSource;
