/*!
 * Event Sources
 * The transport seam: typed events in, transport errors out, a stop
 * signal back to the producer
 *
 * The monitor core never talks to the kernel directly; it consumes
 * whatever implements `EventSource`. A source may be reopened after a
 * transport failure.
 */

#[cfg(target_os = "linux")]
pub mod netlink;
pub mod scan;

#[cfg(target_os = "linux")]
pub use netlink::NetlinkSource;
pub use scan::{ProcScanner, ProcessEnumerator};

use crate::core::errors::SourceError;
use crate::events::ProcessEvent;
use tokio::sync::watch;

/// Producer of process lifecycle events.
///
/// `open` is called once at initialization and again after each
/// transport failure; every call must yield a fresh, independent
/// subscription.
pub trait EventSource: Send + Sync {
    fn open(&self) -> Result<SourceHandle, SourceError>;
}

/// Consumer side of one live source subscription
pub struct SourceHandle {
    /// Typed process events
    pub events: flume::Receiver<ProcessEvent>,
    /// Transport errors; each one triggers a reconnect attempt
    pub errors: flume::Receiver<SourceError>,
    shutdown: watch::Sender<bool>,
}

impl SourceHandle {
    /// Build a handle/feed pair over bounded channels. The handle goes
    /// to the event loop, the feed stays with the producer.
    pub fn channel(event_capacity: usize, error_capacity: usize) -> (SourceHandle, SourceFeed) {
        let (event_tx, event_rx) = flume::bounded(event_capacity);
        let (error_tx, error_rx) = flume::bounded(error_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            SourceHandle {
                events: event_rx,
                errors: error_rx,
                shutdown: shutdown_tx,
            },
            SourceFeed {
                events: event_tx,
                errors: error_tx,
                shutdown: shutdown_rx,
            },
        )
    }

    /// Signal the producing side to stop. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Producer side of one live source subscription
pub struct SourceFeed {
    pub events: flume::Sender<ProcessEvent>,
    pub errors: flume::Sender<SourceError>,
    shutdown: watch::Receiver<bool>,
}

impl SourceFeed {
    /// True once the consumer has asked the producer to stop
    #[inline]
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }
}
