/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced synchronously to the `acquire()` call that triggered
/// initialization. Both variants leave the monitor idle; a later
/// `acquire()` retries from scratch.
#[derive(Error, Debug, Diagnostic)]
pub enum MonitorError {
    #[error("couldn't open process event source: {0}")]
    #[diagnostic(
        code(monitor::source_init),
        help("Opening the kernel subscription usually requires root or CAP_NET_ADMIN.")
    )]
    SourceInit(#[source] SourceError),

    #[error("cold-start process scan failed: {0}")]
    #[diagnostic(
        code(monitor::scan_failed),
        help("Check that the process table (e.g. /proc) is readable.")
    )]
    ScanFailed(#[source] ScanError),
}

/// Transport-level errors reported by an event source.
///
/// Errors arriving on a live subscription's error channel are transient
/// and trigger a reconnect; an error from `EventSource::open` during a
/// reconnect is fatal to the event loop.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SourceError {
    #[error("transport failure: {0}")]
    #[diagnostic(code(source::transport))]
    Transport(String),

    #[error("event source closed")]
    #[diagnostic(code(source::closed))]
    Closed,
}

/// Errors from cold-start process enumeration
#[derive(Error, Debug, Diagnostic)]
pub enum ScanError {
    #[error("failed reading process table: {0}")]
    #[diagnostic(code(scan::io))]
    Io(#[from] std::io::Error),
}
