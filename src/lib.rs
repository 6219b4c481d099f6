// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Machine-wide capture of debug-output broadcasts. Producers rendezvous with
// one monitor through the well-known DBWIN objects: an ack event, a
// data-ready event, and a shared buffer holding one message at a time.

pub mod backend;
pub mod fake;
pub mod names;
pub mod payload;
pub mod platform;

mod error;
pub use error::{
    ChannelInitError, ChannelResource, ConfigError, HandleReleaseError, InitStep, MonitorError,
    ProducerError,
};

mod config;
pub use config::{MonitorConfig, Scope, DEFAULT_THREAD_NAME, SCOPE_ENV};

mod guard;
pub use guard::SingleInstanceGuard;

mod channel;
pub use channel::SharedChannel;

mod broadcaster;
pub use broadcaster::{EventBroadcaster, Subscriber, SubscriberId};

mod capture;

mod monitor;
pub use monitor::{DebugMonitor, MonitorState};

mod producer;
pub use producer::{Producer, DEFAULT_SEND_TIMEOUT};

pub use fake::FakeBackend;
pub use names::ChannelNames;
pub use payload::DebugMessage;
pub use platform::SystemBackend;
