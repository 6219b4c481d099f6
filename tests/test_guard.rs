// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-instance guard against the in-memory backend.

use std::sync::atomic::{AtomicUsize, Ordering};

use dbmon::fake::{FakeFault, FakeKind, FAULT_CODE};
use dbmon::{ChannelResource, FakeBackend, MonitorError, SingleInstanceGuard};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_guard_{n}")
}

#[test]
fn first_acquire_succeeds() {
    let backend = FakeBackend::new();
    let name = unique_name("first");
    let guard = SingleInstanceGuard::acquire(&backend, &name).expect("acquire");
    assert_eq!(guard.name(), name);
    guard.release().expect("release");
    assert_eq!(backend.release_count(FakeKind::Mutex, &name), 1);
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn second_acquire_is_refused_and_closes_its_handle() {
    let backend = FakeBackend::new();
    let name = unique_name("second");
    let held = SingleInstanceGuard::acquire(&backend, &name).expect("acquire");

    let err = SingleInstanceGuard::acquire(&backend, &name).err().unwrap();
    assert!(matches!(err, MonitorError::AlreadyRunning));
    // the losing attempt released the handle it opened
    assert_eq!(backend.release_count(FakeKind::Mutex, &name), 1);
    assert_eq!(backend.live_objects(), 1);

    held.release().expect("release");
    let again = SingleInstanceGuard::acquire(&backend, &name).expect("reacquire");
    again.release().expect("release");
}

#[test]
fn distinct_names_do_not_collide() {
    let backend = FakeBackend::new();
    let a = SingleInstanceGuard::acquire(&backend, &unique_name("a")).expect("a");
    let b = SingleInstanceGuard::acquire(&backend, &unique_name("b")).expect("b");
    a.release().unwrap();
    b.release().unwrap();
}

#[test]
fn create_failure_surfaces_os_error() {
    let backend = FakeBackend::new();
    backend.inject(FakeFault::CreateMutex);
    match SingleInstanceGuard::acquire(&backend, &unique_name("fault")) {
        Err(MonitorError::Guard(e)) => assert_eq!(e.raw_os_error(), Some(FAULT_CODE)),
        Err(other) => panic!("unexpected {other:?}"),
        Ok(_) => panic!("acquire should fail"),
    }
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn release_failure_is_reported() {
    let backend = FakeBackend::new();
    let name = unique_name("close_fault");
    let guard = SingleInstanceGuard::acquire(&backend, &name).expect("acquire");
    backend.inject(FakeFault::CloseMutex);
    let err = guard.release().unwrap_err();
    assert_eq!(err.resource, ChannelResource::InstanceMutex);
    assert_eq!(err.code, FAULT_CODE);
    // the handle is still gone once the value is dropped
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn dropped_guard_frees_the_role() {
    let backend = FakeBackend::new();
    let name = unique_name("drop");
    {
        let _guard = SingleInstanceGuard::acquire(&backend, &name).expect("acquire");
    }
    SingleInstanceGuard::acquire(&backend, &name)
        .expect("reacquire")
        .release()
        .unwrap();
}
