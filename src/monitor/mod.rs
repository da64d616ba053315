/*!
 * Process Monitor
 * Refcounted lifecycle around one physical kernel event subscription
 *
 * Any number of logical owners share the monitor through
 * acquire/release; the first acquire starts the system, the last
 * release tears it down and resets it for clean re-acquisition.
 */

mod event_loop;

use crate::core::errors::{MonitorError, ScanError};
use crate::core::limits::{
    DEFAULT_DISPATCH_WORKERS, DROP_LOG_BURST, DROP_LOG_WINDOW, PENDING_CALLBACK_QUEUE_SIZE,
};
use crate::core::types::{MonitorResult, Pid};
use crate::dispatch::DispatchPool;
use crate::events::EventKind;
use crate::registry::{CallbackRegistry, ProcessCallback, Subscription};
use crate::source::{EventSource, ProcessEnumerator};
use crate::telemetry::{LogLimit, MonitorTelemetry, TelemetrySnapshot};
use arc_swap::ArcSwapOption;
use event_loop::EventLoop;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Transport selection for the monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// In-process event loop over a kernel subscription, with
    /// reconnect-on-error handling
    #[default]
    KernelSocket,
    /// An external event stream drives `notify_exec`/`notify_exit`
    /// directly; no event loop runs and reconnect is owned by the
    /// stream
    ExternalStream,
}

/// Monitor construction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub transport: Transport,
    /// Dispatch worker count; defaults to available parallelism
    pub dispatch_workers: Option<usize>,
    pub dispatch_queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            dispatch_workers: None,
            dispatch_queue_capacity: PENDING_CALLBACK_QUEUE_SIZE,
        }
    }
}

impl MonitorConfig {
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_dispatch_workers(mut self, workers: usize) -> Self {
        self.dispatch_workers = Some(workers);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_dispatch_queue_capacity(mut self, capacity: usize) -> Self {
        self.dispatch_queue_capacity = capacity;
        self
    }
}

/// Fan-out state shared by the event loop and the notify paths
pub(crate) struct Dispatcher {
    registry: Arc<CallbackRegistry>,
    pool: Arc<DispatchPool>,
    telemetry: Arc<MonitorTelemetry>,
    drop_log_limit: LogLimit,
}

impl Dispatcher {
    fn new(
        registry: Arc<CallbackRegistry>,
        pool: Arc<DispatchPool>,
        telemetry: Arc<MonitorTelemetry>,
    ) -> Self {
        Self {
            registry,
            pool,
            telemetry,
            drop_log_limit: LogLimit::new(DROP_LOG_BURST, DROP_LOG_WINDOW),
        }
    }

    /// Enqueue one dispatch unit per current subscriber of `kind`.
    /// Holds the registry read lock for the duration of the fan-out.
    pub(crate) fn fan_out(&self, kind: EventKind, pid: Pid) {
        self.registry.for_each(kind, |callback| {
            let callback = Arc::clone(callback);
            if !self.pool.enqueue(Box::new(move || callback(pid))) {
                self.telemetry.queue_full(kind).incr();
                if self.drop_log_limit.should_log() {
                    debug!(
                        "can't dispatch {} callback for pid {}, queue is full",
                        kind.as_str(),
                        pid
                    );
                }
            }
        });
    }

    /// Count one observed event and fan it out if anyone is listening.
    /// The subscriber check is a single atomic load, so an event kind
    /// with no subscribers never touches the registry lock.
    pub(crate) fn handle_event(&self, kind: EventKind, pid: Pid) {
        self.telemetry.events.incr();
        self.telemetry.kind_counter(kind).incr();
        if self.registry.has_subscribers(kind) {
            self.fan_out(kind, pid);
        }
    }
}

enum LifecycleState {
    Idle,
    Running(RunningState),
}

struct RunningState {
    stop_tx: watch::Sender<bool>,
    /// None with the external-stream transport, which has no loop
    event_loop: Option<JoinHandle<()>>,
    pool: Arc<DispatchPool>,
}

/// The monitor service object.
///
/// Construct exactly one per process at the composition root and share
/// it by `Arc`; one instance means one physical kernel subscription.
/// Subscriptions may be registered before the first `acquire` and are
/// honored by the cold-start scan.
pub struct ProcessMonitor {
    config: MonitorConfig,
    source: Arc<dyn EventSource>,
    enumerator: Arc<dyn ProcessEnumerator>,
    registry: Arc<CallbackRegistry>,
    telemetry: Arc<MonitorTelemetry>,
    refcount: AtomicI32,
    /// Present while running; the lock-free pointer keeps the
    /// notify paths off the state mutex.
    active: ArcSwapOption<Dispatcher>,
    state: Mutex<LifecycleState>,
}

impl ProcessMonitor {
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn EventSource>,
        enumerator: Arc<dyn ProcessEnumerator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            source,
            enumerator,
            registry: Arc::new(CallbackRegistry::new()),
            telemetry: Arc::new(MonitorTelemetry::new()),
            refcount: AtomicI32::new(0),
            active: ArcSwapOption::from(None),
            state: Mutex::new(LifecycleState::Idle),
        })
    }

    /// Monitor over the kernel proc connector with a `/proc` scanner
    #[cfg(target_os = "linux")]
    pub fn with_defaults() -> Arc<Self> {
        Self::new(
            MonitorConfig::default(),
            Arc::new(crate::source::NetlinkSource::new()),
            Arc::new(crate::source::ProcScanner::new()),
        )
    }

    /// Obtain a reference to the monitor, starting it if this is the
    /// first one. Initialization failures are returned to the caller
    /// and leave the monitor idle, so a later acquire retries from
    /// scratch.
    pub async fn acquire(self: &Arc<Self>) -> MonitorResult<MonitorHandle> {
        let mut state = self.state.lock().await;
        self.refcount.fetch_add(1, Ordering::SeqCst);

        if matches!(*state, LifecycleState::Idle) {
            match self.initialize().await {
                Ok(running) => *state = LifecycleState::Running(running),
                Err(err) => {
                    self.refcount.fetch_sub(1, Ordering::SeqCst);
                    return Err(err);
                }
            }
        }

        Ok(MonitorHandle {
            monitor: Arc::clone(self),
            released: AtomicBool::new(false),
        })
    }

    /// Drop one reference. The last reference stops the event loop,
    /// waits for the dispatch workers, and resets the monitor for a
    /// clean re-acquisition. Unbalanced releases are clamped no-ops.
    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        let remaining = self.refcount.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining < 0 {
            warn!("unbalanced process monitor release ignored");
            self.refcount.store(0, Ordering::SeqCst);
            return;
        }
        if remaining > 0 {
            return;
        }

        if let LifecycleState::Running(running) =
            std::mem::replace(&mut *state, LifecycleState::Idle)
        {
            info!("process monitor stopping, refcount reached zero");
            self.active.store(None);
            let _ = running.stop_tx.send(true);
            match running.event_loop {
                // The event loop stops the dispatch pool on its way out.
                Some(handle) => {
                    let _ = handle.await;
                }
                // No loop with the external-stream transport; stop the
                // workers directly.
                None => running.pool.stop_all().await,
            }
            // Fresh maps for the next acquire cycle. Telemetry counters
            // deliberately persist; they reset only on process restart.
            self.registry.clear();
        }
    }

    /// One-time startup, run under the state lock by the acquire that
    /// observed the idle state
    async fn initialize(&self) -> MonitorResult<RunningState> {
        info!(
            "initializing process monitor ({} transport)",
            match self.config.transport {
                Transport::KernelSocket => "kernel-socket",
                Transport::ExternalStream => "external-stream",
            }
        );

        let workers = self
            .config
            .dispatch_workers
            .unwrap_or_else(default_worker_count);
        let pool = Arc::new(DispatchPool::start(
            workers,
            self.config.dispatch_queue_capacity,
            Arc::clone(&self.telemetry),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&pool),
            Arc::clone(&self.telemetry),
        ));
        let (stop_tx, stop_rx) = watch::channel(false);

        let event_loop = match self.config.transport {
            Transport::ExternalStream => None,
            Transport::KernelSocket => {
                let subscription = match self.source.open() {
                    Ok(subscription) => subscription,
                    Err(err) => {
                        pool.stop_all().await;
                        return Err(MonitorError::SourceInit(err));
                    }
                };
                Some(tokio::spawn(
                    EventLoop::new(
                        Arc::clone(&self.source),
                        subscription,
                        Arc::clone(&dispatcher),
                        Arc::clone(&self.telemetry),
                        Arc::clone(&pool),
                        stop_rx,
                    )
                    .run(),
                ))
            }
        };

        // Cold-start scan: only runs when someone already cares about
        // Exec events, so uninterested subscribers never pay for it.
        if self.registry.has_subscribers(EventKind::Exec) {
            if let Err(err) = self.cold_start_scan(&dispatcher) {
                self.telemetry.scan_failed.incr();
                // Tear the half-started system down so a later acquire
                // can retry cleanly.
                let _ = stop_tx.send(true);
                match event_loop {
                    Some(handle) => {
                        let _ = handle.await;
                    }
                    None => pool.stop_all().await,
                }
                return Err(MonitorError::ScanFailed(err));
            }
        }

        self.active.store(Some(Arc::clone(&dispatcher)));
        Ok(RunningState {
            stop_tx,
            event_loop,
            pool,
        })
    }

    fn cold_start_scan(&self, dispatcher: &Dispatcher) -> Result<(), ScanError> {
        info!("process monitor init, scanning running processes");
        let pids = self.enumerator.pids()?;
        debug!("cold-start scan found {} processes", pids.len());
        for pid in pids {
            dispatcher.fan_out(EventKind::Exec, pid);
        }
        Ok(())
    }

    /// Register an Exec callback. Allowed before or after acquire.
    pub fn subscribe_exec<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Pid) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Exec, Arc::new(callback))
    }

    /// Register an Exit callback. Allowed before or after acquire.
    pub fn subscribe_exit<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Pid) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Exit, Arc::new(callback))
    }

    fn subscribe(&self, kind: EventKind, callback: ProcessCallback) -> Subscription {
        let id = self.registry.subscribe(kind, callback);
        Subscription::new(Arc::clone(&self.registry), kind, id)
    }

    /// Feed one Exec event from an external event stream. Shares the
    /// counters, registry, and dispatch pool with the in-process loop;
    /// ignored while the monitor is not running.
    pub fn notify_exec(&self, pid: Pid) {
        self.notify(EventKind::Exec, pid);
    }

    /// Feed one Exit event from an external event stream
    pub fn notify_exit(&self, pid: Pid) {
        self.notify(EventKind::Exit, pid);
    }

    #[inline]
    fn notify(&self, kind: EventKind, pid: Pid) {
        if let Some(dispatcher) = self.active.load_full() {
            dispatcher.handle_event(kind, pid);
        }
    }

    /// True between the first acquire and the last release
    #[inline]
    pub fn is_running(&self) -> bool {
        self.active.load().is_some()
    }

    pub fn telemetry(&self) -> &MonitorTelemetry {
        &self.telemetry
    }

    pub fn refcount(&self) -> i32 {
        self.refcount.load(Ordering::SeqCst)
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(DEFAULT_DISPATCH_WORKERS)
}

/// A caller's reference to the monitor.
///
/// `release` is idempotent per handle; a handle dropped without release
/// keeps its reference alive (release is always explicit because it
/// must be awaited).
pub struct MonitorHandle {
    monitor: Arc<ProcessMonitor>,
    released: AtomicBool,
}

impl MonitorHandle {
    pub fn subscribe_exec<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Pid) + Send + Sync + 'static,
    {
        self.monitor.subscribe_exec(callback)
    }

    pub fn subscribe_exit<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Pid) + Send + Sync + 'static,
    {
        self.monitor.subscribe_exit(callback)
    }

    /// Counter snapshot for external sinks
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.monitor.telemetry().snapshot()
    }

    pub fn monitor(&self) -> &Arc<ProcessMonitor> {
        &self.monitor
    }

    /// Drop this caller's reference. Repeated calls are no-ops.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.monitor.release().await;
    }
}
