// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Synchronous multicast of captured messages to in-process subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

/// Callback receiving `(process id, text)` for every captured message.
pub type Subscriber = Arc<dyn Fn(i32, &str) + Send + Sync>;

/// Handle returned by [`EventBroadcaster::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Ordered list of subscribers.
///
/// Dispatch runs on the capture thread and iterates a snapshot, so a
/// subscriber may register or unregister (itself included) from inside its
/// callback. Whether a change made mid-dispatch sees the in-flight message is
/// unspecified. Every subscriber delays the next producer on the machine
/// until it returns.
#[derive(Default)]
pub struct EventBroadcaster {
    subscribers: RwLock<Vec<(SubscriberId, Subscriber)>>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(i32, &str) + Send + Sync + 'static,
    {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber: Subscriber = Arc::new(callback);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, subscriber));
        debug!("registered subscriber {}", id.0);
        id
    }

    /// Remove a subscriber. Returns `false` if `id` was not registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        let removed = subs.len() != before;
        if removed {
            debug!("unregistered subscriber {}", id.0);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every subscriber in registration order.
    pub fn dispatch(&self, pid: i32, text: &str) {
        let snapshot: Vec<Subscriber> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in snapshot {
            subscriber(pid, text);
        }
    }
}
