// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Producer side of the handshake, what a process does to emit one debug
// string: wait for ack, write the buffer, signal data-ready.

use std::io;
use std::time::Duration;

use log::{debug, warn};

use crate::backend::{Backend, NamedEvent, SharedMapping, SharedView, ViewAccess};
use crate::error::ProducerError;
use crate::names::{ChannelNames, VIEW_SIZE};
use crate::payload;

/// How long [`Producer::send`] callers usually wait for the monitor.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection to a running monitor's channel.
pub struct Producer<B: Backend> {
    ack: B::Event,
    data_ready: B::Event,
    mapping: B::Mapping,
    view: B::View,
    pid: i32,
    buf: Vec<u8>,
}

impl<B: Backend> Producer<B> {
    /// Open the channel objects a running monitor created.
    pub fn connect(backend: &B, names: &ChannelNames) -> Result<Self, ProducerError> {
        let ack = backend.open_named_event(&names.ack).map_err(ProducerError::Connect)?;
        let data_ready = backend
            .open_named_event(&names.data_ready)
            .map_err(ProducerError::Connect)?;
        let mapping = backend
            .open_shared_mapping(&names.buffer)
            .map_err(ProducerError::Connect)?;
        let view = mapping
            .map_view(VIEW_SIZE, ViewAccess::Write)
            .map_err(ProducerError::Connect)?;
        debug!("producer connected to '{}'", names.buffer);
        Ok(Self {
            ack,
            data_ready,
            mapping,
            view,
            pid: std::process::id() as i32,
            buf: vec![0u8; VIEW_SIZE],
        })
    }

    /// Process id stamped on messages sent with [`send`](Self::send).
    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn send(&mut self, text: &str, timeout: Duration) -> Result<(), ProducerError> {
        self.send_as(self.pid, text, timeout)
    }

    /// Send `text` stamped with an arbitrary `pid`.
    ///
    /// Fails with `Timeout` when the monitor does not free the buffer within
    /// `timeout`; the buffer is not written in that case.
    pub fn send_as(
        &mut self,
        pid: i32,
        text: &str,
        timeout: Duration,
    ) -> Result<(), ProducerError> {
        let len = payload::encode_into(&mut self.buf, pid, text)?;
        if !self.ack.wait_timeout(timeout)? {
            return Err(ProducerError::Timeout);
        }
        self.view.write(&self.buf[..len])?;
        self.data_ready.set()?;
        Ok(())
    }

    /// Release every handle. All are released; the first failure is returned.
    pub fn close(self) -> io::Result<()> {
        let mut first = None;
        let mut note = |what: &str, r: io::Result<()>| {
            if let Err(e) = r {
                warn!("producer failed to release the {what}: {e}");
                first.get_or_insert(e);
            }
        };
        note("view", self.view.unmap());
        note("mapping", self.mapping.close());
        note("data-ready event", self.data_ready.close());
        note("ack event", self.ack.close());
        first.map_or(Ok(()), Err)
    }
}
