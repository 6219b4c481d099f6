// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Machine-wide single-instance guard: a named mutex that only the first
// creator gets to keep.

use log::{debug, warn};

use crate::backend::{Backend, NamedMutex};
use crate::error::{ChannelResource, HandleReleaseError, MonitorError};

/// Proof that this process is the only capture service on the machine.
///
/// Held for as long as the value lives; the OS drops the claim if the
/// process dies.
pub struct SingleInstanceGuard<B: Backend> {
    mutex: B::Mutex,
    name: String,
}

impl<B: Backend> SingleInstanceGuard<B> {
    /// Create the named mutex. Succeeds only when the call created a new
    /// object; an existing one means another instance holds the role.
    pub fn acquire(backend: &B, name: &str) -> Result<Self, MonitorError> {
        let created = backend.create_named_mutex(name).map_err(MonitorError::Guard)?;
        if !created.created_new {
            if let Err(e) = created.handle.close() {
                warn!("failed to close the opened instance mutex '{name}': {e}");
            }
            warn!("instance mutex '{name}' is held by another monitor");
            return Err(MonitorError::AlreadyRunning);
        }
        debug!("acquired instance mutex '{name}'");
        Ok(Self {
            mutex: created.handle,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn release(self) -> Result<(), HandleReleaseError> {
        debug!("releasing instance mutex '{}'", self.name);
        self.mutex
            .close()
            .map_err(|e| HandleReleaseError::new(ChannelResource::InstanceMutex, e))
    }
}
