/*!
 * Event Loop
 * Single consumer of the kernel event source
 *
 * Owns transport failure recovery (reconnect with a short delay) and
 * periodic self-reporting. Whatever path the loop exits through, it
 * silences the producer and stops the dispatch workers before
 * returning, so a `release()` waiting on the loop observes a fully
 * quiesced system.
 */

use super::Dispatcher;
use crate::core::errors::SourceError;
use crate::core::limits::{RECONNECT_DELAY, STATS_LOG_INTERVAL};
use crate::dispatch::DispatchPool;
use crate::events::ProcessEvent;
use crate::source::{EventSource, SourceHandle};
use crate::telemetry::MonitorTelemetry;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Outcome of one multiplexed wait
enum Step {
    /// External stop signal; terminal
    Stop,
    /// One event received from the source
    Dispatch(ProcessEvent),
    /// A channel closed on the producer side; terminal
    Closed(&'static str),
    /// Transport error; try to reconnect
    Recover(SourceError),
    /// Stats tick; log aggregates only, never control
    Stats,
}

pub(crate) struct EventLoop {
    source: Arc<dyn EventSource>,
    subscription: SourceHandle,
    dispatcher: Arc<Dispatcher>,
    telemetry: Arc<MonitorTelemetry>,
    pool: Arc<DispatchPool>,
    stop_rx: watch::Receiver<bool>,
}

impl EventLoop {
    pub(crate) fn new(
        source: Arc<dyn EventSource>,
        subscription: SourceHandle,
        dispatcher: Arc<Dispatcher>,
        telemetry: Arc<MonitorTelemetry>,
        pool: Arc<DispatchPool>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            subscription,
            dispatcher,
            telemetry,
            pool,
            stop_rx,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("process monitor event loop starting");
        let mut stats_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + STATS_LOG_INTERVAL,
            STATS_LOG_INTERVAL,
        );
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Highest events-channel depth observed since the last tick.
        let mut max_queue_depth = 0usize;

        loop {
            let step = tokio::select! {
                // The stop watch only ever transitions to true, so any
                // resolution (including a dropped sender) means stop.
                _ = self.stop_rx.changed() => Step::Stop,
                event = self.subscription.events.recv_async() => match event {
                    Ok(event) => Step::Dispatch(event),
                    Err(_) => Step::Closed("events"),
                },
                err = self.subscription.errors.recv_async() => match err {
                    Ok(err) => Step::Recover(err),
                    Err(_) => Step::Closed("errors"),
                },
                _ = stats_tick.tick() => Step::Stats,
            };

            match step {
                Step::Stop => {
                    info!("event loop shutting down, having been marked to stop");
                    break;
                }
                Step::Dispatch(event) => {
                    max_queue_depth = max_queue_depth.max(self.subscription.events.len());
                    self.dispatcher.handle_event(event.kind, event.pid);
                }
                Step::Closed(channel) => {
                    info!("event loop shutting down, source {} channel closed", channel);
                    break;
                }
                Step::Recover(err) => {
                    if !self.reconnect(err).await {
                        break;
                    }
                }
                Step::Stats => {
                    debug!(
                        "process monitor stats - {}; max event queue depth: {} / tick",
                        self.telemetry.summary(),
                        max_queue_depth
                    );
                    max_queue_depth = 0;
                }
            }
        }

        // Cleanup on every exit path: silence the producer, then stop
        // the dispatch workers and wait for them. The dispatch queue
        // itself stays open so racing producers never hit a closed
        // channel.
        self.subscription.stop();
        self.pool.stop_all().await;
        info!("process monitor event loop terminated");
    }

    /// Reopen the source after a transport error. False means the
    /// reopen itself failed, which is fatal to the loop.
    async fn reconnect(&mut self, err: SourceError) -> bool {
        warn!("process event source error: {}, restarting subscription", err);
        self.telemetry.restart.incr();
        self.subscription.stop();

        // Brief pause so a flapping transport can't spin us.
        tokio::time::sleep(RECONNECT_DELAY).await;

        match self.source.open() {
            Ok(subscription) => {
                self.subscription = subscription;
                debug!("source subscription reopened");
                true
            }
            Err(err) => {
                error!("failed re-initializing process event source: {}", err);
                self.telemetry.reinit_failed.incr();
                false
            }
        }
    }
}
