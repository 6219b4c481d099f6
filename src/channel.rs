// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The rendezvous point between producers and the monitor: ack event,
// data-ready event, and the shared buffer with its mapped view.

use log::{debug, warn};

use crate::backend::{Backend, NamedEvent, SharedMapping, SharedView, ViewAccess};
use crate::error::{ChannelInitError, ChannelResource, HandleReleaseError, InitStep};
use crate::names::{ChannelNames, BUFFER_CAPACITY, VIEW_SIZE};

/// The four OS objects of one running monitor.
///
/// Either all four exist or the value does not: `create` rolls back partial
/// state, `destroy` consumes the value.
pub struct SharedChannel<B: Backend> {
    ack: B::Event,
    data_ready: B::Event,
    mapping: B::Mapping,
    view: B::View,
    names: ChannelNames,
}

impl<B: Backend> SharedChannel<B> {
    /// Create the ack event, the data-ready event, the shared buffer, and
    /// map a read-only view of it, in that order.
    pub fn create(backend: &B, names: &ChannelNames) -> Result<Self, ChannelInitError> {
        let security = backend
            .permissive_security()
            .map_err(|e| ChannelInitError::new(InitStep::Security, "permissive DACL", e))?;

        let ack = backend
            .create_named_event(&names.ack, &security)
            .map_err(|e| ChannelInitError::new(InitStep::AckEvent, &names.ack, e))?;

        let data_ready = match backend.create_named_event(&names.data_ready, &security) {
            Ok(ev) => ev,
            Err(e) => {
                rollback::<B>(None, None, None, Some(ack));
                return Err(ChannelInitError::new(InitStep::DataReadyEvent, &names.data_ready, e));
            }
        };

        let mapping = match backend.create_shared_mapping(&names.buffer, BUFFER_CAPACITY, &security)
        {
            Ok(m) => m,
            Err(e) => {
                rollback::<B>(None, None, Some(data_ready), Some(ack));
                return Err(ChannelInitError::new(InitStep::Mapping, &names.buffer, e));
            }
        };

        let view = match mapping.map_view(VIEW_SIZE, ViewAccess::Read) {
            Ok(v) => v,
            Err(e) => {
                rollback::<B>(None, Some(mapping), Some(data_ready), Some(ack));
                return Err(ChannelInitError::new(InitStep::View, &names.buffer, e));
            }
        };

        debug!(
            "created channel '{}' / '{}' / '{}' ({BUFFER_CAPACITY} bytes, {VIEW_SIZE} byte view)",
            names.ack, names.data_ready, names.buffer
        );
        Ok(Self {
            ack,
            data_ready,
            mapping,
            view,
            names: names.clone(),
        })
    }

    pub fn ack(&self) -> &B::Event {
        &self.ack
    }

    pub fn data_ready(&self) -> &B::Event {
        &self.data_ready
    }

    pub fn view(&self) -> &B::View {
        &self.view
    }

    pub fn names(&self) -> &ChannelNames {
        &self.names
    }

    /// Unmap the view, then close the mapping, data-ready, and ack handles.
    /// Every step runs even when an earlier one fails.
    pub fn destroy(self) -> Result<(), Vec<HandleReleaseError>> {
        debug!("destroying channel '{}'", self.names.buffer);
        let errors = release_all::<B>(
            Some(self.view),
            Some(self.mapping),
            Some(self.data_ready),
            Some(self.ack),
        );
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn release_all<B: Backend>(
    view: Option<B::View>,
    mapping: Option<B::Mapping>,
    data_ready: Option<B::Event>,
    ack: Option<B::Event>,
) -> Vec<HandleReleaseError> {
    let mut errors = Vec::new();
    let mut check = |resource, result: std::io::Result<()>| {
        if let Err(e) = result {
            errors.push(HandleReleaseError::new(resource, e));
        }
    };
    if let Some(v) = view {
        check(ChannelResource::View, v.unmap());
    }
    if let Some(m) = mapping {
        check(ChannelResource::Mapping, m.close());
    }
    if let Some(e) = data_ready {
        check(ChannelResource::DataReadyEvent, e.close());
    }
    if let Some(e) = ack {
        check(ChannelResource::AckEvent, e.close());
    }
    errors
}

/// Release what a failed `create` already built. The creation error is the
/// one surfaced, so release failures are only logged.
fn rollback<B: Backend>(
    view: Option<B::View>,
    mapping: Option<B::Mapping>,
    data_ready: Option<B::Event>,
    ack: Option<B::Event>,
) {
    for e in release_all::<B>(view, mapping, data_ready, ack) {
        warn!("channel rollback: {e}");
    }
}
