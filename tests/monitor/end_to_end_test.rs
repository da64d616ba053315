/*!
 * End-to-End Tests
 * Full event flow from source through dispatch to callbacks
 */

use crate::support::{init_logs, wait_until, Recorder, ScriptedSource, StubEnumerator};
use pretty_assertions::assert_eq;
use procwatch::{MonitorConfig, ProcessEvent, ProcessMonitor, Transport};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> MonitorConfig {
    MonitorConfig::default()
        .with_dispatch_workers(2)
        .with_dispatch_queue_capacity(64)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_event_flood_with_no_subscribers() {
    init_logs();
    let source = ScriptedSource::new();
    let monitor = ProcessMonitor::new(test_config(), source.clone(), StubEnumerator::new(vec![]));

    let handle = monitor.acquire().await.unwrap();
    let feed = source.feed(0);
    for pid in 0..1000u32 {
        feed.events
            .send_async(ProcessEvent::exec(pid))
            .await
            .unwrap();
    }

    assert!(wait_until(|| monitor.telemetry().events.get() == 1000).await);
    let snap = monitor.telemetry().snapshot();
    assert_eq!(snap.exec, 1000);
    assert_eq!(snap.exit, 0);
    assert_eq!(snap.callbacks_executed, 0);
    assert_eq!(snap.exec_queue_full, 0);
    assert_eq!(snap.exit_queue_full, 0);

    handle.release().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_subscriber_observes_kernel_order() {
    init_logs();
    let source = ScriptedSource::new();
    // One worker: per-callback ordering over the FIFO queue is exact.
    let config = test_config().with_dispatch_workers(1);
    let monitor = ProcessMonitor::new(config, source.clone(), StubEnumerator::new(vec![]));

    let handle = monitor.acquire().await.unwrap();
    let recorder = Recorder::new();
    let _sub = handle.subscribe_exec(recorder.callback());

    let feed = source.feed(0);
    for pid in [10u32, 20, 10, 30] {
        feed.events
            .send_async(ProcessEvent::exec(pid))
            .await
            .unwrap();
    }

    assert!(wait_until(|| recorder.len() == 4).await);
    assert_eq!(recorder.pids(), vec![10, 20, 10, 30]);

    handle.release().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unsubscribed_callback_is_routed_away() {
    init_logs();
    let source = ScriptedSource::new();
    let monitor = ProcessMonitor::new(test_config(), source.clone(), StubEnumerator::new(vec![]));

    let handle = monitor.acquire().await.unwrap();
    let recorder = Recorder::new();
    let sub = handle.subscribe_exit(recorder.callback());
    sub.unsubscribe();

    source
        .feed(0)
        .events
        .send_async(ProcessEvent::exit(42))
        .await
        .unwrap();
    assert!(wait_until(|| monitor.telemetry().exit.get() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Routed away, not dropped: the callback never fires and the drop
    // counter stays untouched.
    assert_eq!(recorder.len(), 0);
    assert_eq!(monitor.telemetry().exit_queue_full.get(), 0);

    handle.release().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_delivery_after_unsubscribe_completes() {
    init_logs();
    let source = ScriptedSource::new();
    let config = test_config().with_dispatch_workers(1);
    let monitor = ProcessMonitor::new(config, source.clone(), StubEnumerator::new(vec![]));

    let handle = monitor.acquire().await.unwrap();
    let recorder = Recorder::new();
    let sub = handle.subscribe_exec(recorder.callback());

    let feed = source.feed(0);
    for pid in 0..5u32 {
        feed.events
            .send_async(ProcessEvent::exec(pid))
            .await
            .unwrap();
    }
    // Drain fully so no stale unit can be in flight, then unsubscribe.
    assert!(wait_until(|| monitor.telemetry().callbacks_executed.get() == 5).await);
    sub.unsubscribe();

    for pid in 100..110u32 {
        feed.events
            .send_async(ProcessEvent::exec(pid))
            .await
            .unwrap();
    }
    assert!(wait_until(|| monitor.telemetry().exec.get() == 15).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.len(), 5);

    handle.release().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overload_sheds_and_counts_drops() {
    init_logs();
    let source = ScriptedSource::new();
    let config = MonitorConfig::default()
        .with_dispatch_workers(1)
        .with_dispatch_queue_capacity(4);
    let monitor = ProcessMonitor::new(config, source.clone(), StubEnumerator::new(vec![]));

    let handle = monitor.acquire().await.unwrap();

    let gate = Arc::new(AtomicBool::new(false));
    let entered = Arc::new(AtomicUsize::new(0));
    let _sub = {
        let gate = Arc::clone(&gate);
        let entered = Arc::clone(&entered);
        handle.subscribe_exec(move |_pid| {
            entered.fetch_add(1, Ordering::SeqCst);
            while !gate.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let feed = source.feed(0);
    // First event occupies the only worker.
    feed.events
        .send_async(ProcessEvent::exec(1))
        .await
        .unwrap();
    assert!(wait_until(|| entered.load(Ordering::SeqCst) == 1).await);

    // Seven more follow: four fill the queue, the last three are shed.
    for pid in 2..=8u32 {
        feed.events
            .send_async(ProcessEvent::exec(pid))
            .await
            .unwrap();
    }
    assert!(wait_until(|| monitor.telemetry().exec.get() == 8).await);
    assert_eq!(monitor.telemetry().exec_queue_full.get(), 3);

    // Unblock and drain: worker runs the occupier plus the four queued.
    gate.store(true, Ordering::SeqCst);
    assert!(wait_until(|| monitor.telemetry().callbacks_executed.get() == 5).await);

    handle.release().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_external_stream_transport() {
    init_logs();
    let source = ScriptedSource::new();
    let config = test_config().with_transport(Transport::ExternalStream);
    let monitor = ProcessMonitor::new(config, source.clone(), StubEnumerator::new(vec![]));

    let handle = monitor.acquire().await.unwrap();
    // No event loop and no kernel subscription in this mode.
    assert_eq!(source.opens(), 0);

    let execs = Recorder::new();
    let exits = Recorder::new();
    let _exec_sub = handle.subscribe_exec(execs.callback());
    let _exit_sub = handle.subscribe_exit(exits.callback());

    monitor.notify_exec(11);
    monitor.notify_exit(22);

    assert!(wait_until(|| execs.contains(11) && exits.contains(22)).await);
    let snap = handle.telemetry();
    assert_eq!(snap.events, 2);
    assert_eq!(snap.exec, 1);
    assert_eq!(snap.exit, 1);

    handle.release().await;
    assert!(!monitor.is_running());
}
