// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Backend for hosts without named kernel objects. It never creates
// anything, so the monitor refuses to start with UnsupportedPlatform and
// producers fail to connect.

use std::io;
use std::time::Duration;

use crate::backend::{
    Backend, Created, NamedEvent, NamedMutex, SharedMapping, SharedView, ViewAccess,
};

fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "named kernel objects are not available on this platform",
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedBackend;

/// Handle type that can never be constructed.
#[derive(Debug)]
pub enum NoObject {}

impl NamedMutex for NoObject {
    fn close(self) -> io::Result<()> {
        match self {}
    }
}

impl NamedEvent for NoObject {
    fn set(&self) -> io::Result<()> {
        match *self {}
    }

    fn wait(&self) -> io::Result<()> {
        match *self {}
    }

    fn wait_timeout(&self, _timeout: Duration) -> io::Result<bool> {
        match *self {}
    }

    fn close(self) -> io::Result<()> {
        match self {}
    }
}

impl SharedView for NoObject {
    fn len(&self) -> usize {
        match *self {}
    }

    fn read(&self, _buf: &mut [u8]) -> usize {
        match *self {}
    }

    fn write(&self, _bytes: &[u8]) -> io::Result<()> {
        match *self {}
    }

    fn unmap(self) -> io::Result<()> {
        match self {}
    }
}

impl SharedMapping for NoObject {
    type View = NoObject;

    fn map_view(&self, _len: usize, _access: ViewAccess) -> io::Result<NoObject> {
        match *self {}
    }

    fn close(self) -> io::Result<()> {
        match self {}
    }
}

impl Backend for UnsupportedBackend {
    type Security = ();
    type Mutex = NoObject;
    type Event = NoObject;
    type View = NoObject;
    type Mapping = NoObject;

    fn is_supported(&self) -> bool {
        false
    }

    fn create_named_mutex(&self, _name: &str) -> io::Result<Created<NoObject>> {
        Err(unsupported())
    }

    fn permissive_security(&self) -> io::Result<()> {
        Err(unsupported())
    }

    fn create_named_event(&self, _name: &str, _security: &()) -> io::Result<NoObject> {
        Err(unsupported())
    }

    fn open_named_event(&self, _name: &str) -> io::Result<NoObject> {
        Err(unsupported())
    }

    fn create_shared_mapping(
        &self,
        _name: &str,
        _capacity: usize,
        _security: &(),
    ) -> io::Result<NoObject> {
        Err(unsupported())
    }

    fn open_shared_mapping(&self, _name: &str) -> io::Result<NoObject> {
        Err(unsupported())
    }
}
