// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The capture thread: one slot, one reader, no timeout.
//
//   set ack -> wait data-ready -> (running?) -> read view -> dispatch -> repeat
//
// Setting ack before every wait is what lets the next producer on the
// machine write. The running flag is the only way to tell a shutdown wake
// from a producer's signal, so it is checked before the view is touched.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use log::{debug, error, trace};

use crate::backend::{Backend, NamedEvent, SharedView};
use crate::broadcaster::EventBroadcaster;
use crate::channel::SharedChannel;
use crate::payload;

/// Running flag and join handle of a spawned capture thread.
pub(crate) struct CaptureHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl CaptureHandle {
    pub(crate) fn spawn<B: Backend>(
        channel: Arc<SharedChannel<B>>,
        broadcaster: Arc<EventBroadcaster>,
        thread_name: &str,
    ) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run(&channel, &flag, &broadcaster))?;
        Ok(Self { running, thread })
    }

    pub(crate) fn thread_id(&self) -> ThreadId {
        self.thread.thread().id()
    }

    /// Clear the running flag. The loop notices on its next wake.
    pub(crate) fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

pub(crate) fn run<B: Backend>(
    channel: &SharedChannel<B>,
    running: &AtomicBool,
    broadcaster: &EventBroadcaster,
) {
    let names = channel.names();
    let mut buf = vec![0u8; channel.view().len()];
    debug!("capture loop started on '{}'", names.buffer);

    loop {
        if let Err(e) = channel.ack().set() {
            error!("failed to signal '{}', capture loop exiting: {e}", names.ack);
            break;
        }
        if let Err(e) = channel.data_ready().wait() {
            error!("failed to wait on '{}', capture loop exiting: {e}", names.data_ready);
            break;
        }
        if !running.load(Ordering::Acquire) {
            break;
        }

        channel.view().read(&mut buf);
        let msg = payload::decode(&buf);
        trace!("[{}] {}", msg.pid, msg.text);
        broadcaster.dispatch(msg.pid, &msg.text);
    }

    debug!("capture loop on '{}' exited", names.buffer);
}
