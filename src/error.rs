// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for the capture service.
// Backends speak std::io; these types are what the lifecycle surface returns.

use std::fmt;
use std::io;

use thiserror::Error;

/// The step of channel creation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    Security,
    AckEvent,
    DataReadyEvent,
    Mapping,
    View,
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InitStep::Security => "initialise the security descriptor",
            InitStep::AckEvent => "create the ack event",
            InitStep::DataReadyEvent => "create the data-ready event",
            InitStep::Mapping => "create the shared buffer mapping",
            InitStep::View => "map a view of the shared buffer",
        };
        f.write_str(s)
    }
}

/// One of the OS objects owned by a running monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelResource {
    View,
    Mapping,
    DataReadyEvent,
    AckEvent,
    InstanceMutex,
}

impl fmt::Display for ChannelResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelResource::View => "view",
            ChannelResource::Mapping => "mapping",
            ChannelResource::DataReadyEvent => "data-ready event",
            ChannelResource::AckEvent => "ack event",
            ChannelResource::InstanceMutex => "instance mutex",
        };
        f.write_str(s)
    }
}

/// Creation of one of the shared channel objects failed.
#[derive(Error, Debug)]
#[error("failed to {step} '{description}'. Last platform error was {code}")]
pub struct ChannelInitError {
    pub step: InitStep,
    /// Raw platform error code (`GetLastError` / `errno`), 0 when unknown.
    pub code: i32,
    pub description: String,
    #[source]
    pub source: io::Error,
}

impl ChannelInitError {
    pub(crate) fn new(step: InitStep, description: impl Into<String>, source: io::Error) -> Self {
        Self {
            step,
            code: source.raw_os_error().unwrap_or(0),
            description: description.into(),
            source,
        }
    }
}

/// Releasing one OS object failed. Teardown continues past it.
#[derive(Error, Debug)]
#[error("failed to release the {resource}. Last platform error was {code}")]
pub struct HandleReleaseError {
    pub resource: ChannelResource,
    pub code: i32,
    #[source]
    pub source: io::Error,
}

impl HandleReleaseError {
    pub(crate) fn new(resource: ChannelResource, source: io::Error) -> Self {
        Self {
            resource,
            code: source.raw_os_error().unwrap_or(0),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("another debug monitor instance is already running on this machine")]
    AlreadyRunning,
    #[error("debug output capture is not supported on this platform")]
    UnsupportedPlatform,
    #[error("the debug monitor is already started")]
    AlreadyStarted,
    #[error("the debug monitor is not running")]
    NotRunning,
    #[error(transparent)]
    ChannelInit(#[from] ChannelInitError),
    #[error("failed to create the single-instance mutex: {0}")]
    Guard(#[source] io::Error),
    #[error("failed to spawn the capture thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed to wake the capture thread: {0}")]
    Wake(#[source] io::Error),
    #[error("stop cannot be called from a subscriber on the capture thread")]
    StopFromCaptureThread,
    #[error("the capture thread panicked")]
    CapturePanicked,
    #[error("teardown failed for {} resource(s): {}", .0.len(), join_release_errors(.0))]
    Release(Vec<HandleReleaseError>),
}

fn join_release_errors(errors: &[HandleReleaseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown scope '{0}', expected 'local' or 'global'")]
    UnknownScope(String),
}

/// Errors raised on the producer side of the handshake.
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("no debug monitor is listening: {0}")]
    Connect(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("message of {len} bytes does not fit the shared buffer (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("timed out waiting for the monitor to release the shared buffer")]
    Timeout,
}
