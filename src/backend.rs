// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Capability interface over the named OS objects the handshake needs.
// platform::windows and platform::posix implement it on real kernels,
// fake::FakeBackend in process memory.

use std::io;
use std::time::Duration;

/// Result of creating a named object that may already exist.
#[derive(Debug)]
pub struct Created<T> {
    pub handle: T,
    /// `false` when an existing object of the same name was opened instead.
    pub created_new: bool,
}

/// Access requested for a mapped view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAccess {
    Read,
    Write,
}

/// A named machine-wide mutual-exclusion object.
pub trait NamedMutex: Send + Sync + 'static {
    fn close(self) -> io::Result<()>;
}

/// A named auto-reset event: one `set` wakes at most one waiter and the
/// event returns to unsignaled once that waiter is released.
pub trait NamedEvent: Send + Sync + 'static {
    fn set(&self) -> io::Result<()>;

    /// Block until signaled. No timeout.
    fn wait(&self) -> io::Result<()>;

    /// Block until signaled or `timeout` elapses. `Ok(false)` on timeout.
    fn wait_timeout(&self, timeout: Duration) -> io::Result<bool>;

    fn close(self) -> io::Result<()>;
}

/// A mapped window onto a shared segment.
pub trait SharedView: Send + Sync + 'static {
    /// Mapped length in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the first `buf.len()` bytes (at most `len()`) into `buf`.
    /// Returns the number of bytes copied.
    fn read(&self, buf: &mut [u8]) -> usize;

    /// Copy `bytes` to the start of the view.
    fn write(&self, bytes: &[u8]) -> io::Result<()>;

    fn unmap(self) -> io::Result<()>;
}

/// A named shared memory segment.
pub trait SharedMapping: Send + Sync + 'static {
    type View: SharedView;

    fn map_view(&self, len: usize, access: ViewAccess) -> io::Result<Self::View>;

    fn close(self) -> io::Result<()>;
}

/// Factory for the named objects of one platform.
pub trait Backend: Send + Sync + 'static {
    /// Access-control data that lets unrelated processes use created objects.
    type Security;
    type Mutex: NamedMutex;
    type Event: NamedEvent;
    type View: SharedView;
    type Mapping: SharedMapping<View = Self::View>;

    /// Whether this host provides the debug-output handshake at all.
    fn is_supported(&self) -> bool;

    fn create_named_mutex(&self, name: &str) -> io::Result<Created<Self::Mutex>>;

    fn permissive_security(&self) -> io::Result<Self::Security>;

    /// Create (or open, if it exists) an auto-reset event in the unsignaled state.
    fn create_named_event(&self, name: &str, security: &Self::Security) -> io::Result<Self::Event>;

    /// Open an existing event. Fails with `NotFound` when nobody created it.
    fn open_named_event(&self, name: &str) -> io::Result<Self::Event>;

    /// Create (or open, if it exists) a paging-file backed segment.
    fn create_shared_mapping(
        &self,
        name: &str,
        capacity: usize,
        security: &Self::Security,
    ) -> io::Result<Self::Mapping>;

    /// Open an existing segment. Fails with `NotFound` when nobody created it.
    fn open_shared_mapping(&self, name: &str) -> io::Result<Self::Mapping>;
}
