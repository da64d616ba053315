/*!
 * Test Support
 * Scripted event sources, enumerator stubs, and wait helpers
 */

use parking_lot::Mutex;
use procwatch::{
    EventSource, Pid, ProcessEnumerator, ProcessEvent, ScanError, SourceError, SourceHandle,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll until `predicate` holds or a 5 second deadline passes
pub async fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}

/// Producer endpoints for one scripted subscription
#[derive(Clone)]
pub struct TestFeed {
    pub events: flume::Sender<ProcessEvent>,
    pub errors: flume::Sender<SourceError>,
}

/// Event source whose `open` outcomes are scripted by the test.
///
/// Each successful open records a `TestFeed` the test can push events
/// and errors through; queued failures are consumed one per open.
pub struct ScriptedSource {
    planned_failures: Mutex<VecDeque<SourceError>>,
    feeds: Mutex<Vec<Option<TestFeed>>>,
    opens: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            planned_failures: Mutex::new(VecDeque::new()),
            feeds: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
        })
    }

    /// Fail the next `open` call with a transport error
    pub fn plan_open_failure(&self) {
        self.planned_failures
            .lock()
            .push_back(SourceError::Transport("scripted open failure".into()));
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Producer endpoints of the `index`-th successful open
    pub fn feed(&self, index: usize) -> TestFeed {
        self.feeds.lock()[index]
            .clone()
            .expect("feed already closed")
    }

    /// Drop the producer side of the `index`-th subscription, closing
    /// its channels
    pub fn close_feed(&self, index: usize) {
        self.feeds.lock()[index] = None;
    }
}

impl EventSource for ScriptedSource {
    fn open(&self) -> Result<SourceHandle, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.planned_failures.lock().pop_front() {
            return Err(err);
        }
        let (handle, feed) = SourceHandle::channel(64, 8);
        self.feeds.lock().push(Some(TestFeed {
            events: feed.events.clone(),
            errors: feed.errors.clone(),
        }));
        Ok(handle)
    }
}

/// Enumerator stub with a call counter and a switchable failure mode
pub struct StubEnumerator {
    pids: Mutex<Vec<Pid>>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl StubEnumerator {
    pub fn new(pids: Vec<Pid>) -> Arc<Self> {
        Arc::new(Self {
            pids: Mutex::new(pids),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ProcessEnumerator for StubEnumerator {
    fn pids(&self) -> Result<Vec<Pid>, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScanError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "scan refused",
            )));
        }
        Ok(self.pids.lock().clone())
    }
}

/// Callback target recording every PID it is invoked with
#[derive(Default)]
pub struct Recorder {
    pids: Mutex<Vec<Pid>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A callback pushing into this recorder
    pub fn callback(self: &Arc<Self>) -> impl Fn(Pid) + Send + Sync + 'static {
        let recorder = Arc::clone(self);
        move |pid| recorder.pids.lock().push(pid)
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.pids.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.pids.lock().len()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.lock().contains(&pid)
    }
}
