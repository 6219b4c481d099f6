// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// In-memory backend. Objects are shared by name between every clone of one
// FakeBackend, so a monitor and a producer built from clones of the same
// value talk to each other exactly as two processes would through the kernel.
// Supports fault injection and records every explicit release.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backend::{
    Backend, Created, NamedEvent, NamedMutex, SharedMapping, SharedView, ViewAccess,
};

/// Raw OS error code carried by injected faults.
pub const FAULT_CODE: i32 = 5;

// A panicking test thread must not wedge every other handle on the backend.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A one-shot failure armed with [`FakeBackend::inject`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeFault {
    Security,
    CreateMutex,
    CreateEvent(String),
    CreateMapping,
    MapView,
    CloseMutex,
    CloseEvent(String),
    CloseMapping,
    UnmapView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeKind {
    Mutex,
    Event,
    Mapping,
    View,
}

/// One successful explicit release, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeRelease {
    pub kind: FakeKind,
    pub name: String,
}

struct EventCore {
    signaled: Mutex<bool>,
    cond: Condvar,
}

type Memory = Arc<Mutex<Vec<u8>>>;

#[derive(Default)]
struct Registry {
    // name -> open handle count
    mutexes: HashMap<String, usize>,
    events: HashMap<String, (Arc<EventCore>, usize)>,
    mappings: HashMap<String, (Memory, usize)>,
}

#[derive(Default)]
struct Shared {
    registry: Mutex<Registry>,
    unsupported: AtomicBool,
    faults: Mutex<Vec<FakeFault>>,
    releases: Mutex<Vec<FakeRelease>>,
    sets: Mutex<HashMap<String, usize>>,
}

/// Hermetic [`Backend`] living entirely in process memory.
#[derive(Clone, Default)]
pub struct FakeBackend {
    shared: Arc<Shared>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `is_supported` report `false`.
    pub fn set_unsupported(&self, unsupported: bool) {
        self.shared.unsupported.store(unsupported, Ordering::Relaxed);
    }

    /// Arm a fault; the next matching operation fails with [`FAULT_CODE`].
    pub fn inject(&self, fault: FakeFault) {
        lock(&self.shared.faults).push(fault);
    }

    /// Every explicit release so far, oldest first.
    pub fn releases(&self) -> Vec<FakeRelease> {
        lock(&self.shared.releases).clone()
    }

    pub fn release_count(&self, kind: FakeKind, name: &str) -> usize {
        lock(&self.shared.releases)
            .iter()
            .filter(|r| r.kind == kind && r.name == name)
            .count()
    }

    /// How many times the event `name` has been set.
    pub fn set_count(&self, name: &str) -> usize {
        lock(&self.shared.sets).get(name).copied().unwrap_or(0)
    }

    /// Whether the event `name` currently exists and is signaled.
    pub fn is_signaled(&self, name: &str) -> bool {
        let reg = lock(&self.shared.registry);
        reg.events
            .get(name)
            .map(|(core, _)| *lock(&core.signaled))
            .unwrap_or(false)
    }

    /// Number of named objects with at least one open handle.
    pub fn live_objects(&self) -> usize {
        let reg = lock(&self.shared.registry);
        reg.mutexes.len() + reg.events.len() + reg.mappings.len()
    }

    fn take_fault(&self, fault: &FakeFault) -> io::Result<()> {
        let mut faults = lock(&self.shared.faults);
        if let Some(pos) = faults.iter().position(|f| f == fault) {
            faults.remove(pos);
            return Err(io::Error::from_raw_os_error(FAULT_CODE));
        }
        Ok(())
    }

    fn record_release(&self, kind: FakeKind, name: &str) {
        lock(&self.shared.releases).push(FakeRelease {
            kind,
            name: name.to_string(),
        });
    }

    fn drop_mutex_ref(&self, name: &str) {
        let mut reg = lock(&self.shared.registry);
        if let Some(count) = reg.mutexes.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                reg.mutexes.remove(name);
            }
        }
    }

    fn drop_event_ref(&self, name: &str) {
        let mut reg = lock(&self.shared.registry);
        if let Some((_, count)) = reg.events.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                reg.events.remove(name);
            }
        }
    }

    fn drop_mapping_ref(&self, name: &str) {
        let mut reg = lock(&self.shared.registry);
        if let Some((_, count)) = reg.mappings.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                reg.mappings.remove(name);
            }
        }
    }

    fn not_found(name: &str) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("no object named '{name}'"))
    }
}

impl Backend for FakeBackend {
    type Security = ();
    type Mutex = FakeMutex;
    type Event = FakeEvent;
    type View = FakeView;
    type Mapping = FakeMapping;

    fn is_supported(&self) -> bool {
        !self.shared.unsupported.load(Ordering::Relaxed)
    }

    fn create_named_mutex(&self, name: &str) -> io::Result<Created<FakeMutex>> {
        self.take_fault(&FakeFault::CreateMutex)?;
        let mut reg = lock(&self.shared.registry);
        let count = reg.mutexes.entry(name.to_string()).or_insert(0);
        *count += 1;
        Ok(Created {
            handle: FakeMutex {
                backend: self.clone(),
                name: Some(name.to_string()),
            },
            created_new: *count == 1,
        })
    }

    fn permissive_security(&self) -> io::Result<()> {
        self.take_fault(&FakeFault::Security)
    }

    fn create_named_event(&self, name: &str, _security: &()) -> io::Result<FakeEvent> {
        self.take_fault(&FakeFault::CreateEvent(name.to_string()))?;
        let mut reg = lock(&self.shared.registry);
        let entry = reg.events.entry(name.to_string()).or_insert_with(|| {
            let core = EventCore {
                signaled: Mutex::new(false),
                cond: Condvar::new(),
            };
            (Arc::new(core), 0)
        });
        entry.1 += 1;
        Ok(FakeEvent {
            backend: self.clone(),
            core: Arc::clone(&entry.0),
            name: Some(name.to_string()),
        })
    }

    fn open_named_event(&self, name: &str) -> io::Result<FakeEvent> {
        let mut reg = lock(&self.shared.registry);
        let entry = reg.events.get_mut(name).ok_or_else(|| Self::not_found(name))?;
        entry.1 += 1;
        Ok(FakeEvent {
            backend: self.clone(),
            core: Arc::clone(&entry.0),
            name: Some(name.to_string()),
        })
    }

    fn create_shared_mapping(
        &self,
        name: &str,
        capacity: usize,
        _security: &(),
    ) -> io::Result<FakeMapping> {
        self.take_fault(&FakeFault::CreateMapping)?;
        let mut reg = lock(&self.shared.registry);
        let entry = reg
            .mappings
            .entry(name.to_string())
            .or_insert_with(|| (Arc::new(Mutex::new(vec![0u8; capacity])), 0));
        entry.1 += 1;
        Ok(FakeMapping {
            backend: self.clone(),
            mem: Arc::clone(&entry.0),
            name: Some(name.to_string()),
        })
    }

    fn open_shared_mapping(&self, name: &str) -> io::Result<FakeMapping> {
        let mut reg = lock(&self.shared.registry);
        let entry = reg.mappings.get_mut(name).ok_or_else(|| Self::not_found(name))?;
        entry.1 += 1;
        Ok(FakeMapping {
            backend: self.clone(),
            mem: Arc::clone(&entry.0),
            name: Some(name.to_string()),
        })
    }
}

pub struct FakeMutex {
    backend: FakeBackend,
    name: Option<String>,
}

impl NamedMutex for FakeMutex {
    fn close(mut self) -> io::Result<()> {
        self.backend.take_fault(&FakeFault::CloseMutex)?;
        if let Some(name) = self.name.take() {
            self.backend.drop_mutex_ref(&name);
            self.backend.record_release(FakeKind::Mutex, &name);
        }
        Ok(())
    }
}

impl Drop for FakeMutex {
    fn drop(&mut self) {
        if let Some(name) = self.name.take() {
            self.backend.drop_mutex_ref(&name);
        }
    }
}

pub struct FakeEvent {
    backend: FakeBackend,
    core: Arc<EventCore>,
    name: Option<String>,
}

impl NamedEvent for FakeEvent {
    fn set(&self) -> io::Result<()> {
        if let Some(name) = &self.name {
            let mut sets = lock(&self.backend.shared.sets);
            *sets.entry(name.clone()).or_insert(0) += 1;
        }
        *lock(&self.core.signaled) = true;
        self.core.cond.notify_one();
        Ok(())
    }

    fn wait(&self) -> io::Result<()> {
        let mut signaled = lock(&self.core.signaled);
        while !*signaled {
            signaled = self.core.cond.wait(signaled).unwrap_or_else(PoisonError::into_inner);
        }
        *signaled = false;
        Ok(())
    }

    fn wait_timeout(&self, timeout: Duration) -> io::Result<bool> {
        let signaled = lock(&self.core.signaled);
        let (mut signaled, _) = self
            .core
            .cond
            .wait_timeout_while(signaled, timeout, |s| !*s)
            .unwrap_or_else(PoisonError::into_inner);
        if !*signaled {
            return Ok(false);
        }
        *signaled = false;
        Ok(true)
    }

    fn close(mut self) -> io::Result<()> {
        if let Some(name) = &self.name {
            self.backend.take_fault(&FakeFault::CloseEvent(name.clone()))?;
        }
        if let Some(name) = self.name.take() {
            self.backend.drop_event_ref(&name);
            self.backend.record_release(FakeKind::Event, &name);
        }
        Ok(())
    }
}

impl Drop for FakeEvent {
    fn drop(&mut self) {
        if let Some(name) = self.name.take() {
            self.backend.drop_event_ref(&name);
        }
    }
}

pub struct FakeMapping {
    backend: FakeBackend,
    mem: Memory,
    name: Option<String>,
}

impl SharedMapping for FakeMapping {
    type View = FakeView;

    fn map_view(&self, len: usize, access: ViewAccess) -> io::Result<FakeView> {
        self.backend.take_fault(&FakeFault::MapView)?;
        let capacity = lock(&self.mem).len();
        if len == 0 || len > capacity {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("view of {len} bytes does not fit a {capacity} byte segment"),
            ));
        }
        Ok(FakeView {
            backend: self.backend.clone(),
            mem: Arc::clone(&self.mem),
            len,
            access,
            name: self.name.clone().unwrap_or_default(),
        })
    }

    fn close(mut self) -> io::Result<()> {
        self.backend.take_fault(&FakeFault::CloseMapping)?;
        if let Some(name) = self.name.take() {
            self.backend.drop_mapping_ref(&name);
            self.backend.record_release(FakeKind::Mapping, &name);
        }
        Ok(())
    }
}

impl Drop for FakeMapping {
    fn drop(&mut self) {
        if let Some(name) = self.name.take() {
            self.backend.drop_mapping_ref(&name);
        }
    }
}

pub struct FakeView {
    backend: FakeBackend,
    mem: Memory,
    len: usize,
    access: ViewAccess,
    name: String,
}

impl SharedView for FakeView {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        let mem = lock(&self.mem);
        let n = buf.len().min(self.len);
        buf[..n].copy_from_slice(&mem[..n]);
        n
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if self.access != ViewAccess::Write {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "view is mapped read-only",
            ));
        }
        if bytes.len() > self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} bytes do not fit a {} byte view", bytes.len(), self.len),
            ));
        }
        lock(&self.mem)[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn unmap(self) -> io::Result<()> {
        self.backend.take_fault(&FakeFault::UnmapView)?;
        self.backend.record_release(FakeKind::View, &self.name);
        Ok(())
    }
}
