// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Lifecycle of the capture service. Owns the single-instance guard, the
// shared channel and the capture thread, and orders their acquisition and
// release. All transitions run under one lock.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use log::{debug, info, warn};

use crate::backend::{Backend, NamedEvent};
use crate::broadcaster::{EventBroadcaster, SubscriberId};
use crate::capture::CaptureHandle;
use crate::channel::SharedChannel;
use crate::config::MonitorConfig;
use crate::error::{HandleReleaseError, MonitorError};
use crate::guard::SingleInstanceGuard;
use crate::platform::SystemBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl MonitorState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => MonitorState::Starting,
            2 => MonitorState::Running,
            3 => MonitorState::Stopping,
            _ => MonitorState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            MonitorState::Stopped => 0,
            MonitorState::Starting => 1,
            MonitorState::Running => 2,
            MonitorState::Stopping => 3,
        }
    }
}

struct Lifecycle<B: Backend> {
    guard: Option<SingleInstanceGuard<B>>,
    channel: Option<Arc<SharedChannel<B>>>,
    capture: Option<CaptureHandle>,
}

/// Machine-wide debug output capture service.
///
/// ```no_run
/// let monitor = dbmon::DebugMonitor::new();
/// monitor.subscribe(|pid, text| println!("[{pid}] {text}"));
/// monitor.start()?;
/// // ...
/// monitor.stop()?;
/// monitor.dispose()?;
/// # Ok::<(), dbmon::MonitorError>(())
/// ```
///
/// Subscribers run on the capture thread. Every producer on the machine
/// waits while a subscriber runs, so they should return quickly.
pub struct DebugMonitor<B: Backend = SystemBackend> {
    backend: B,
    config: MonitorConfig,
    broadcaster: Arc<EventBroadcaster>,
    state: AtomicU8,
    // Read without the lifecycle lock so a subscriber calling stop() is
    // refused instead of deadlocking on its own join.
    capture_thread: Mutex<Option<ThreadId>>,
    lifecycle: Mutex<Lifecycle<B>>,
}

impl DebugMonitor<SystemBackend> {
    pub fn new() -> Self {
        Self::with_config(MonitorConfig::default())
    }

    pub fn with_config(config: MonitorConfig) -> Self {
        Self::with_backend(SystemBackend::default(), config)
    }
}

impl Default for DebugMonitor<SystemBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> DebugMonitor<B> {
    pub fn with_backend(backend: B, config: MonitorConfig) -> Self {
        Self {
            backend,
            config,
            broadcaster: Arc::new(EventBroadcaster::new()),
            state: AtomicU8::new(MonitorState::Stopped.as_u8()),
            capture_thread: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle {
                guard: None,
                channel: None,
                capture: None,
            }),
        }
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Register a callback for every captured message.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(i32, &str) + Send + Sync + 'static,
    {
        self.broadcaster.register(callback)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.broadcaster.unregister(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.len()
    }

    /// Claim the capture role and start the capture thread.
    ///
    /// Objects still held from a previous run that was stopped but not
    /// disposed are reused.
    pub fn start(&self) -> Result<(), MonitorError> {
        // A subscriber only runs while the service is up. Locking here could
        // wait on a stop() that is joining this very thread.
        if self.on_capture_thread() {
            return Err(MonitorError::AlreadyStarted);
        }
        let mut lc = self.lock();
        match self.state() {
            MonitorState::Running | MonitorState::Starting => {
                return Err(MonitorError::AlreadyStarted)
            }
            MonitorState::Stopped | MonitorState::Stopping => {}
        }
        if !self.backend.is_supported() {
            return Err(MonitorError::UnsupportedPlatform);
        }

        self.set_state(MonitorState::Starting);
        match self.start_locked(&mut lc) {
            Ok(()) => {
                self.set_state(MonitorState::Running);
                info!("debug monitor started on '{}'", self.config.names.buffer);
                Ok(())
            }
            Err(e) => {
                self.set_state(MonitorState::Stopped);
                Err(e)
            }
        }
    }

    fn start_locked(&self, lc: &mut Lifecycle<B>) -> Result<(), MonitorError> {
        if lc.guard.is_none() {
            let name = &self.config.names.instance_mutex;
            lc.guard = Some(SingleInstanceGuard::acquire(&self.backend, name)?);
        }

        let channel = match &lc.channel {
            Some(channel) => Arc::clone(channel),
            None => match SharedChannel::create(&self.backend, &self.config.names) {
                Ok(channel) => {
                    let channel = Arc::new(channel);
                    lc.channel = Some(Arc::clone(&channel));
                    channel
                }
                Err(e) => {
                    if let Some(guard) = lc.guard.take() {
                        if let Err(re) = guard.release() {
                            warn!("start rollback: {re}");
                        }
                    }
                    return Err(e.into());
                }
            },
        };

        // Held across the spawn so a subscriber running before the id is
        // recorded still gets refused by stop().
        let mut capture_thread = self.capture_slot();
        let broadcaster = Arc::clone(&self.broadcaster);
        match CaptureHandle::spawn(channel, broadcaster, &self.config.thread_name) {
            Ok(capture) => {
                *capture_thread = Some(capture.thread_id());
                lc.capture = Some(capture);
                Ok(())
            }
            Err(e) => {
                drop(capture_thread);
                for re in release_locked(lc) {
                    warn!("start rollback: {re}");
                }
                Err(MonitorError::Spawn(e))
            }
        }
    }

    /// Stop the capture thread and wait for it to exit.
    ///
    /// Waits for an in-flight dispatch to finish. No subscriber is invoked
    /// after this returns.
    pub fn stop(&self) -> Result<(), MonitorError> {
        self.refuse_on_capture_thread()?;
        let mut lc = self.lock();
        self.stop_locked(&mut lc)
    }

    fn stop_locked(&self, lc: &mut Lifecycle<B>) -> Result<(), MonitorError> {
        if self.state() != MonitorState::Running {
            return Err(MonitorError::NotRunning);
        }
        let Some(capture) = lc.capture.take() else {
            self.set_state(MonitorState::Stopped);
            return Err(MonitorError::NotRunning);
        };

        self.set_state(MonitorState::Stopping);
        capture.request_stop();

        // The event carries no tag; the cleared flag marks this wake as a
        // shutdown. set (not pulse) keeps the wake pending if the loop is
        // mid-dispatch rather than waiting.
        if let Some(channel) = &lc.channel {
            if let Err(e) = channel.data_ready().set() {
                lc.capture = Some(capture);
                self.set_state(MonitorState::Running);
                return Err(MonitorError::Wake(e));
            }
        }

        let joined = capture.join();
        *self.capture_slot() = None;
        self.set_state(MonitorState::Stopped);
        info!("debug monitor on '{}' stopped", self.config.names.buffer);
        joined.map_err(|_| MonitorError::CapturePanicked)
    }

    /// Stop if running, then release the channel and the instance guard.
    /// Calling it again is a no-op.
    ///
    /// A capture thread that panicked still gets its objects released; the
    /// panic is reported as `CapturePanicked` once they are.
    pub fn dispose(&self) -> Result<(), MonitorError> {
        self.refuse_on_capture_thread()?;
        let mut lc = self.lock();
        let panicked = match self.stop_locked(&mut lc) {
            Ok(()) | Err(MonitorError::NotRunning) => false,
            Err(MonitorError::CapturePanicked) => true,
            Err(e) => return Err(e),
        };

        let errors = release_locked(&mut lc);
        if panicked {
            for e in &errors {
                warn!("teardown after capture panic: {e}");
            }
            return Err(MonitorError::CapturePanicked);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(MonitorError::Release(errors))
        }
    }

    fn on_capture_thread(&self) -> bool {
        *self.capture_slot() == Some(thread::current().id())
    }

    fn refuse_on_capture_thread(&self) -> Result<(), MonitorError> {
        if self.on_capture_thread() {
            return Err(MonitorError::StopFromCaptureThread);
        }
        Ok(())
    }

    /// Dropped from inside a subscriber. The capture thread cannot join
    /// itself, so it is told to exit after the current dispatch and a
    /// teardown thread joins it and releases everything in the usual order.
    fn detach_capture(&self) {
        let mut lc = self.lock();
        let Some(capture) = lc.capture.take() else {
            return;
        };
        capture.request_stop();
        if let Some(channel) = &lc.channel {
            if let Err(e) = channel.data_ready().set() {
                warn!("failed to wake the detached capture thread: {e}");
            }
        }
        *self.capture_slot() = None;
        self.set_state(MonitorState::Stopped);

        let mut held = Lifecycle {
            guard: lc.guard.take(),
            channel: lc.channel.take(),
            capture: None,
        };
        let buffer = self.config.names.buffer.clone();
        warn!("debug monitor on '{buffer}' dropped on its capture thread");
        let teardown = thread::Builder::new()
            .name(format!("{}-teardown", self.config.thread_name))
            .spawn(move || {
                if capture.join().is_err() {
                    warn!("capture thread of '{buffer}' panicked");
                }
                for e in release_locked(&mut held) {
                    warn!("teardown of '{buffer}' failed: {e}");
                }
                debug!("detached debug monitor on '{buffer}' released");
            });
        if let Err(e) = teardown {
            warn!("could not spawn teardown thread, handles drop without an explicit close: {e}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle<B>> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn capture_slot(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.capture_thread.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: MonitorState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// Release channel then guard. Only called with no capture thread alive.
fn release_locked<B: Backend>(lc: &mut Lifecycle<B>) -> Vec<HandleReleaseError> {
    let mut errors = Vec::new();
    if let Some(channel) = lc.channel.take() {
        match Arc::try_unwrap(channel) {
            Ok(channel) => {
                if let Err(mut e) = channel.destroy() {
                    errors.append(&mut e);
                }
            }
            Err(_) => {
                warn!("channel still referenced, its handles close when the last reference drops")
            }
        }
    }
    if let Some(guard) = lc.guard.take() {
        if let Err(e) = guard.release() {
            errors.push(e);
        }
    }
    errors
}

impl<B: Backend> Drop for DebugMonitor<B> {
    fn drop(&mut self) {
        if self.on_capture_thread() {
            self.detach_capture();
            return;
        }
        if let Err(e) = self.dispose() {
            warn!("debug monitor teardown on drop failed: {e}");
        }
    }
}
