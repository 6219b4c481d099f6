// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Lifecycle of DebugMonitor against the in-memory backend.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dbmon::fake::{FakeFault, FakeKind, FakeRelease, FAULT_CODE};
use dbmon::platform::unsupported::UnsupportedBackend;
use dbmon::{
    ChannelNames, DebugMonitor, FakeBackend, InitStep, MonitorConfig, MonitorError, MonitorState,
    Producer, ProducerError,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_names(prefix: &str) -> ChannelNames {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    ChannelNames::with_prefix(&format!("{prefix}_{n}_"))
}

fn setup(prefix: &str) -> (FakeBackend, ChannelNames, DebugMonitor<FakeBackend>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = FakeBackend::new();
    let names = unique_names(prefix);
    let monitor =
        DebugMonitor::with_backend(backend.clone(), MonitorConfig::new().with_names(names.clone()));
    (backend, names, monitor)
}

fn wait_until(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    f()
}

const SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[test]
fn start_twice_is_rejected() {
    let (_b, _n, monitor) = setup("start_twice");
    monitor.start().expect("start");
    assert_eq!(monitor.state(), MonitorState::Running);
    assert!(matches!(monitor.start(), Err(MonitorError::AlreadyStarted)));
    assert!(monitor.is_running());
    monitor.dispose().expect("dispose");
}

#[test]
fn stop_when_not_running_is_rejected() {
    let (_b, _n, monitor) = setup("stop_idle");
    assert!(matches!(monitor.stop(), Err(MonitorError::NotRunning)));
    monitor.start().expect("start");
    monitor.stop().expect("stop");
    assert!(matches!(monitor.stop(), Err(MonitorError::NotRunning)));
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[test]
fn unsupported_backend_refuses_to_start() {
    let (backend, _n, monitor) = setup("unsupported");
    backend.set_unsupported(true);
    assert!(matches!(monitor.start(), Err(MonitorError::UnsupportedPlatform)));
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn second_instance_is_refused() {
    let (backend, names, first) = setup("second_instance");
    let second =
        DebugMonitor::with_backend(backend.clone(), MonitorConfig::new().with_names(names.clone()));

    first.start().expect("first start");
    assert!(matches!(second.start(), Err(MonitorError::AlreadyRunning)));
    assert_eq!(second.state(), MonitorState::Stopped);
    assert!(first.is_running());

    first.dispose().expect("dispose");
    second.start().expect("second start after first disposed");
    second.dispose().expect("dispose");
}

#[test]
fn message_round_trip() {
    let (backend, names, monitor) = setup("round_trip");
    let (tx, rx) = mpsc::channel();
    monitor.subscribe(move |pid, text| tx.send((pid, text.to_string())).unwrap());
    monitor.start().expect("start");

    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send_as(4321, "120", SEND_TIMEOUT).expect("send");

    assert_eq!(rx.recv_timeout(SEND_TIMEOUT).unwrap(), (4321, "120".to_string()));
    // initial ack plus the one re-armed after the dispatch
    assert!(wait_until(|| backend.set_count(&names.ack) == 2));

    monitor.stop().expect("stop");
    assert_eq!(backend.set_count(&names.ack), 2);
    assert!(rx.try_recv().is_err());

    producer.close().expect("close");
    monitor.dispose().expect("dispose");
}

#[test]
fn every_subscriber_sees_each_message_in_order() {
    let (backend, names, monitor) = setup("fan_out");
    let seen = Arc::new(Mutex::new(Vec::new()));
    for tag in ["a", "b"] {
        let seen = Arc::clone(&seen);
        monitor.subscribe(move |pid, text| seen.lock().unwrap().push(format!("{tag}{pid}{text}")));
    }
    assert_eq!(monitor.subscriber_count(), 2);
    monitor.start().expect("start");

    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send_as(1, "x", SEND_TIMEOUT).expect("send x");
    producer.send_as(2, "y", SEND_TIMEOUT).expect("send y");
    assert!(wait_until(|| seen.lock().unwrap().len() == 4));

    assert_eq!(*seen.lock().unwrap(), ["a1x", "b1x", "a2y", "b2y"]);
    monitor.dispose().expect("dispose");
}

#[test]
fn unsubscribed_callback_is_not_invoked() {
    let (backend, names, monitor) = setup("unsubscribe");
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let id = monitor.subscribe(move |_, _| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    let (tx, rx) = mpsc::channel();
    monitor.subscribe(move |_, text| tx.send(text.to_string()).unwrap());
    monitor.start().expect("start");

    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send("one", SEND_TIMEOUT).expect("send");
    rx.recv_timeout(SEND_TIMEOUT).unwrap();
    assert!(monitor.unsubscribe(id));
    producer.send("two", SEND_TIMEOUT).expect("send");
    rx.recv_timeout(SEND_TIMEOUT).unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    monitor.dispose().expect("dispose");
}

#[test]
fn no_callbacks_after_stop() {
    let (backend, names, monitor) = setup("after_stop");
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    monitor.subscribe(move |_, _| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    monitor.start().expect("start");
    monitor.stop().expect("stop");

    // a producer that slips in after stop finds the objects but nobody reads
    let mut producer = Producer::connect(&backend, &names).expect("connect");
    let _ = producer.send("late", Duration::from_millis(50));
    let data_ready = {
        use dbmon::backend::{Backend, NamedEvent};
        let ev = backend.open_named_event(&names.data_ready).unwrap();
        ev.set().unwrap();
        ev
    };
    thread::sleep(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    drop(data_ready);
    producer.close().expect("close");
    monitor.dispose().expect("dispose");
}

#[test]
fn stop_waits_for_in_flight_dispatch() {
    let (backend, names, monitor) = setup("in_flight");
    let (entered_tx, entered_rx) = mpsc::channel();
    let finished = Arc::new(AtomicBool::new(false));
    let f = Arc::clone(&finished);
    monitor.subscribe(move |_, _| {
        entered_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(100));
        f.store(true, Ordering::SeqCst);
    });
    monitor.start().expect("start");

    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send("slow", SEND_TIMEOUT).expect("send");
    entered_rx.recv_timeout(SEND_TIMEOUT).unwrap();

    monitor.stop().expect("stop");
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(monitor.state(), MonitorState::Stopped);
    monitor.dispose().expect("dispose");
}

#[test]
fn producer_waits_while_subscriber_runs() {
    let (backend, names, monitor) = setup("single_slot");
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let (seen_tx, seen_rx) = mpsc::channel();
    monitor.subscribe(move |_, text| {
        seen_tx.send(text.to_string()).unwrap();
        if text == "first" {
            release_rx.lock().unwrap().recv().unwrap();
        }
    });
    monitor.start().expect("start");

    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send("first", SEND_TIMEOUT).expect("send first");
    assert_eq!(seen_rx.recv_timeout(SEND_TIMEOUT).unwrap(), "first");

    // the slot is not re-armed until the subscriber returns
    let err = producer.send("second", Duration::from_millis(50)).unwrap_err();
    assert!(matches!(err, ProducerError::Timeout));

    release_tx.send(()).unwrap();
    producer.send("second", SEND_TIMEOUT).expect("send second");
    assert_eq!(seen_rx.recv_timeout(SEND_TIMEOUT).unwrap(), "second");
    monitor.dispose().expect("dispose");
}

#[test]
fn stop_from_subscriber_is_refused() {
    let (backend, names, monitor) = setup("stop_from_cb");
    let monitor = Arc::new(monitor);
    let weak = Arc::downgrade(&monitor);
    let (tx, rx) = mpsc::channel();
    monitor.subscribe(move |_, _| {
        if let Some(m) = weak.upgrade() {
            tx.send(m.stop()).unwrap();
        }
    });
    monitor.start().expect("start");

    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send("stop please", SEND_TIMEOUT).expect("send");
    let result = rx.recv_timeout(SEND_TIMEOUT).unwrap();
    assert!(matches!(result, Err(MonitorError::StopFromCaptureThread)));

    assert!(monitor.is_running());
    monitor.stop().expect("stop from owner");
    monitor.dispose().expect("dispose");
}

#[test]
fn start_from_subscriber_during_stop_is_refused() {
    let (backend, names, monitor) = setup("start_from_cb");
    let monitor = Arc::new(monitor);
    let weak = Arc::downgrade(&monitor);
    let (entered_tx, entered_rx) = mpsc::channel();
    let (tx, rx) = mpsc::channel();
    monitor.subscribe(move |_, _| {
        entered_tx.send(()).unwrap();
        // Long enough for the owner to be blocked joining this thread.
        thread::sleep(Duration::from_millis(100));
        if let Some(m) = weak.upgrade() {
            tx.send(m.start()).unwrap();
        }
    });
    monitor.start().expect("start");

    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send("restart please", SEND_TIMEOUT).expect("send");
    entered_rx.recv_timeout(SEND_TIMEOUT).unwrap();

    let stopper = Arc::clone(&monitor);
    let (stop_tx, stop_rx) = mpsc::channel();
    thread::spawn(move || stop_tx.send(stopper.stop()).unwrap());

    let stopped = stop_rx.recv_timeout(Duration::from_secs(3)).expect("stop returned");
    assert!(stopped.is_ok());
    let restarted = rx.recv_timeout(SEND_TIMEOUT).unwrap();
    assert!(matches!(restarted, Err(MonitorError::AlreadyStarted)));
    assert_eq!(monitor.state(), MonitorState::Stopped);

    producer.close().expect("close");
    monitor.dispose().expect("dispose");
}

#[test]
fn drop_on_capture_thread_releases_after_dispatch() {
    let (backend, names, monitor) = setup("drop_on_cb");
    let slot: Arc<Mutex<Option<Arc<DebugMonitor<FakeBackend>>>>> = Arc::new(Mutex::new(None));
    let inner = Arc::clone(&slot);
    let (tx, rx) = mpsc::channel();
    monitor.subscribe(move |_, text| {
        let last = inner.lock().unwrap().take();
        drop(last);
        tx.send(text.to_string()).unwrap();
    });
    monitor.start().expect("start");
    *slot.lock().unwrap() = Some(Arc::new(monitor));

    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send("last words", SEND_TIMEOUT).expect("send");
    assert_eq!(rx.recv_timeout(SEND_TIMEOUT).unwrap(), "last words");
    producer.close().expect("close");

    assert!(wait_until(|| backend.releases().len() == 5));
    assert_eq!(backend.release_count(FakeKind::Mutex, &names.instance_mutex), 1);
    assert!(wait_until(|| backend.live_objects() == 0));

    let next =
        DebugMonitor::with_backend(backend.clone(), MonitorConfig::new().with_names(names.clone()));
    next.start().expect("start after detached teardown");
    next.dispose().expect("dispose");
}

#[test]
fn restart_after_stop_reuses_objects() {
    let (backend, names, monitor) = setup("restart");
    let (tx, rx) = mpsc::channel();
    monitor.subscribe(move |_, text| tx.send(text.to_string()).unwrap());

    monitor.start().expect("start");
    monitor.stop().expect("stop");
    monitor.start().expect("restart");
    assert!(backend.releases().is_empty());

    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send("again", SEND_TIMEOUT).expect("send");
    assert_eq!(rx.recv_timeout(SEND_TIMEOUT).unwrap(), "again");
    monitor.dispose().expect("dispose");
}

#[test]
fn dispose_releases_everything_once_in_order() {
    let (backend, names, monitor) = setup("dispose_order");
    monitor.start().expect("start");
    monitor.dispose().expect("dispose");
    assert_eq!(monitor.state(), MonitorState::Stopped);

    let rel = |kind, name: &str| FakeRelease {
        kind,
        name: name.to_string(),
    };
    assert_eq!(
        backend.releases(),
        [
            rel(FakeKind::View, &names.buffer),
            rel(FakeKind::Mapping, &names.buffer),
            rel(FakeKind::Event, &names.data_ready),
            rel(FakeKind::Event, &names.ack),
            rel(FakeKind::Mutex, &names.instance_mutex),
        ]
    );
    assert_eq!(backend.live_objects(), 0);

    monitor.dispose().expect("second dispose");
    assert_eq!(backend.releases().len(), 5);
    assert_eq!(backend.release_count(FakeKind::Mutex, &names.instance_mutex), 1);
}

#[test]
fn dispose_after_subscriber_panic_still_releases() {
    let (backend, names, monitor) = setup("dispose_panic");
    let hit = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&hit);
    monitor.subscribe(move |_, _| {
        flag.store(true, Ordering::Release);
        panic!("subscriber failure");
    });
    monitor.start().expect("start");

    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send("boom", SEND_TIMEOUT).expect("send");
    producer.close().expect("close");
    assert!(wait_until(|| hit.load(Ordering::Acquire)));

    assert!(matches!(monitor.dispose(), Err(MonitorError::CapturePanicked)));
    assert_eq!(monitor.state(), MonitorState::Stopped);

    let rel = |kind, name: &str| FakeRelease {
        kind,
        name: name.to_string(),
    };
    assert_eq!(
        backend.releases(),
        [
            rel(FakeKind::View, &names.buffer),
            rel(FakeKind::Mapping, &names.buffer),
            rel(FakeKind::Event, &names.data_ready),
            rel(FakeKind::Event, &names.ack),
            rel(FakeKind::Mutex, &names.instance_mutex),
        ]
    );
    assert_eq!(backend.live_objects(), 0);
    monitor.dispose().expect("second dispose");
    assert_eq!(backend.releases().len(), 5);
}

#[test]
fn platform_without_kernel_objects_refuses_to_start() {
    let names = unique_names("no_platform");
    let config = MonitorConfig::new().with_names(names.clone());
    let monitor = DebugMonitor::with_backend(UnsupportedBackend, config);
    assert!(matches!(monitor.start(), Err(MonitorError::UnsupportedPlatform)));
    assert_eq!(monitor.state(), MonitorState::Stopped);
    monitor.dispose().expect("dispose");

    match Producer::connect(&UnsupportedBackend, &names) {
        Err(ProducerError::Connect(e)) => assert_eq!(e.kind(), std::io::ErrorKind::Unsupported),
        Err(other) => panic!("unexpected {other:?}"),
        Ok(_) => panic!("connect should fail without kernel objects"),
    }
}

#[test]
fn dispose_without_start_is_a_no_op() {
    let (backend, _n, monitor) = setup("dispose_idle");
    monitor.dispose().expect("dispose");
    assert!(backend.releases().is_empty());
}

#[test]
fn start_after_dispose() {
    let (backend, names, monitor) = setup("start_after_dispose");
    monitor.start().expect("start");
    monitor.dispose().expect("dispose");
    monitor.start().expect("start again");
    assert!(monitor.is_running());

    let (tx, rx) = mpsc::channel();
    monitor.subscribe(move |pid, _| tx.send(pid).unwrap());
    let mut producer = Producer::connect(&backend, &names).expect("connect");
    producer.send_as(9, "hi", SEND_TIMEOUT).expect("send");
    assert_eq!(rx.recv_timeout(SEND_TIMEOUT).unwrap(), 9);
    monitor.dispose().expect("dispose");
}

#[test]
fn teardown_failure_is_reported_and_the_rest_released() {
    let (backend, names, monitor) = setup("teardown_fault");
    monitor.start().expect("start");
    backend.inject(FakeFault::CloseMapping);

    match monitor.dispose() {
        Err(MonitorError::Release(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].code, FAULT_CODE);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(backend.release_count(FakeKind::Event, &names.ack), 1);
    assert_eq!(backend.release_count(FakeKind::Mutex, &names.instance_mutex), 1);
    assert_eq!(backend.release_count(FakeKind::Mapping, &names.buffer), 0);
    assert_eq!(backend.live_objects(), 0);

    monitor.dispose().expect("nothing left to release");
}

#[test]
fn channel_failure_releases_the_guard() {
    let (backend, names, monitor) = setup("channel_fault");
    backend.inject(FakeFault::CreateEvent(names.data_ready.clone()));

    match monitor.start() {
        Err(MonitorError::ChannelInit(e)) => {
            assert_eq!(e.step, InitStep::DataReadyEvent);
            assert_eq!(e.code, FAULT_CODE);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert_eq!(backend.release_count(FakeKind::Event, &names.ack), 1);
    assert_eq!(backend.release_count(FakeKind::Mutex, &names.instance_mutex), 1);
    assert_eq!(backend.live_objects(), 0);

    monitor.start().expect("start after fault cleared");
    monitor.dispose().expect("dispose");
}

#[test]
fn guard_failure_leaves_nothing_behind() {
    let (backend, _n, monitor) = setup("guard_fault");
    backend.inject(FakeFault::CreateMutex);
    assert!(matches!(monitor.start(), Err(MonitorError::Guard(_))));
    assert_eq!(backend.live_objects(), 0);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[test]
fn drop_disposes() {
    let (backend, names, monitor) = setup("drop");
    monitor.start().expect("start");
    drop(monitor);
    assert_eq!(backend.release_count(FakeKind::Mutex, &names.instance_mutex), 1);
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn concurrent_lifecycle_calls_stay_consistent() {
    let (_b, _n, monitor) = setup("concurrent");
    let monitor = Arc::new(monitor);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let m = Arc::clone(&monitor);
            thread::spawn(move || {
                for _ in 0..20 {
                    if i % 2 == 0 {
                        let _ = m.start();
                    } else {
                        let _ = m.stop();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let state = monitor.state();
    assert!(state == MonitorState::Running || state == MonitorState::Stopped);
    monitor.dispose().expect("dispose");
    assert_eq!(monitor.state(), MonitorState::Stopped);
}
