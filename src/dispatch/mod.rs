/*!
 * Dispatch Pool
 * Fixed worker set draining a bounded callback queue
 *
 * Decouples kernel-event consumption from callback execution time: the
 * producer never blocks, and a slow callback occupies exactly one
 * worker.
 */

use crate::telemetry::MonitorTelemetry;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One queued callback invocation, executed exactly once by one worker
pub type DispatchUnit = Box<dyn FnOnce() + Send>;

/// Worker pool behind a bounded multi-producer multi-consumer queue.
///
/// `enqueue` is non-blocking and sheds on a full queue; `stop_all`
/// signals every worker and waits for all of them to exit. The queue
/// itself is never closed, so racing producers can never observe a
/// send-on-closed failure; units enqueued after shutdown are simply
/// abandoned.
pub struct DispatchPool {
    queue_tx: flume::Sender<DispatchUnit>,
    stop_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchPool {
    /// Start `worker_count` workers over a queue of `queue_capacity`
    pub fn start(
        worker_count: usize,
        queue_capacity: usize,
        telemetry: Arc<MonitorTelemetry>,
    ) -> Self {
        let (queue_tx, queue_rx) = flume::bounded(queue_capacity);
        let (stop_tx, _) = watch::channel(false);

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            workers.push(tokio::spawn(run_worker(
                index,
                queue_rx.clone(),
                stop_tx.subscribe(),
                Arc::clone(&telemetry),
            )));
        }
        debug!(
            "dispatch pool started: {} workers, queue capacity {}",
            worker_count, queue_capacity
        );

        Self {
            queue_tx,
            stop_tx,
            workers: Mutex::new(workers),
        }
    }

    /// Non-blocking enqueue. False means the queue was full and the
    /// unit was dropped; the caller owns the accounting for that.
    #[inline]
    pub fn enqueue(&self, unit: DispatchUnit) -> bool {
        self.queue_tx.try_send(unit).is_ok()
    }

    /// Current queue depth
    #[inline]
    pub fn queued(&self) -> usize {
        self.queue_tx.len()
    }

    /// Signal all workers to exit and wait until every one has.
    /// Safe to call more than once.
    pub async fn stop_all(&self) {
        let _ = self.stop_tx.send(true);
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.await;
        }
    }
}

async fn run_worker(
    index: usize,
    queue_rx: flume::Receiver<DispatchUnit>,
    mut stop_rx: watch::Receiver<bool>,
    telemetry: Arc<MonitorTelemetry>,
) {
    loop {
        // Non-blocking stop check before the multi-way wait: a
        // multiplexed wait gives no fairness guarantee between two
        // simultaneously-ready branches, so a saturated queue could
        // otherwise keep winning over the stop signal.
        if *stop_rx.borrow() {
            debug!("dispatch worker {} stopped", index);
            return;
        }

        tokio::select! {
            biased;
            // The stop watch only ever transitions to true, so any
            // resolution here (including a dropped sender) means stop.
            _ = stop_rx.changed() => {
                debug!("dispatch worker {} stopped", index);
                return;
            }
            unit = queue_rx.recv_async() => match unit {
                Ok(unit) => {
                    telemetry.callbacks_executed.incr();
                    unit();
                }
                Err(_) => {
                    // Queue disconnected: the pool itself is gone.
                    debug!("dispatch worker {} stopped, queue disconnected", index);
                    return;
                }
            },
        }
    }
}
