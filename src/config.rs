// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Monitor configuration. Buffer sizes are protocol constants; only the
// namespace of the names and the capture thread's name are configurable.

use std::str::FromStr;

use crate::error::ConfigError;
use crate::names::ChannelNames;

/// Environment variable selecting the name scope: `local` or `global`.
pub const SCOPE_ENV: &str = "DBMON_SCOPE";

pub const DEFAULT_THREAD_NAME: &str = "dbmon-capture";

/// Kernel namespace the channel objects are created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// The caller's session.
    #[default]
    Local,
    /// Every session, including services in session 0.
    Global,
}

impl FromStr for Scope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "local" => Ok(Scope::Local),
            "global" => Ok(Scope::Global),
            _ => Err(ConfigError::UnknownScope(s.to_string())),
        }
    }
}

impl Scope {
    pub fn names(self) -> ChannelNames {
        match self {
            Scope::Local => ChannelNames::local(),
            Scope::Global => ChannelNames::global(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub names: ChannelNames,
    pub thread_name: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            names: ChannelNames::local(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_scope(scope: Scope) -> Self {
        Self::default().with_names(scope.names())
    }

    pub fn with_names(mut self, names: ChannelNames) -> Self {
        self.names = names;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Build from `DBMON_SCOPE`; unset means local.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let scope = match lookup(SCOPE_ENV) {
            Some(v) => v.parse()?,
            None => Scope::Local,
        };
        Ok(Self::for_scope(scope))
    }
}
