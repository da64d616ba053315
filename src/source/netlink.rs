/*!
 * Netlink Transport
 * Proc-connector backed event source (Linux)
 *
 * Requires root or CAP_NET_ADMIN. Each `open` binds a fresh netlink
 * socket serviced by a dedicated blocking thread that pumps the
 * handle's channels.
 */

use super::{EventSource, SourceFeed, SourceHandle};
use crate::core::errors::SourceError;
use crate::core::limits::{SOURCE_ERROR_QUEUE_SIZE, SOURCE_EVENT_QUEUE_SIZE};
use crate::core::types::Pid;
use crate::events::ProcessEvent;
use cnproc::{PidEvent, PidMonitor};
use log::{debug, warn};

/// Kernel proc-connector event source
#[derive(Debug, Clone, Default)]
pub struct NetlinkSource;

impl NetlinkSource {
    pub fn new() -> Self {
        Self
    }
}

impl EventSource for NetlinkSource {
    fn open(&self) -> Result<SourceHandle, SourceError> {
        let monitor = PidMonitor::new().map_err(|e| SourceError::Transport(e.to_string()))?;
        let (handle, feed) = SourceHandle::channel(SOURCE_EVENT_QUEUE_SIZE, SOURCE_ERROR_QUEUE_SIZE);

        std::thread::Builder::new()
            .name("procwatch-netlink".into())
            .spawn(move || pump(monitor, feed))
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        debug!("netlink proc-connector subscription opened");
        Ok(handle)
    }
}

/// Blocking receive loop translating connector messages into typed
/// events. Exits when the consumer signals stop, drops its channels,
/// or the socket fails.
fn pump(mut monitor: PidMonitor, feed: SourceFeed) {
    loop {
        if feed.is_stopped() {
            debug!("netlink pump stopped");
            return;
        }
        match monitor.recv() {
            Some(PidEvent::Exec(process_pid)) => {
                if feed.events.send(ProcessEvent::exec(process_pid as Pid)).is_err() {
                    return;
                }
            }
            Some(PidEvent::Exit(process_pid)) => {
                if feed.events.send(ProcessEvent::exit(process_pid as Pid)).is_err() {
                    return;
                }
            }
            // Fork and coredump notifications are not monitored.
            Some(_) => {}
            None => {
                warn!("netlink receive failed, reporting transport error");
                let _ = feed
                    .errors
                    .send(SourceError::Transport("netlink receive failed".into()));
                return;
            }
        }
    }
}
