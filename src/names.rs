// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Well-known object names of the DBWIN handshake, and the mapping of those
// names onto POSIX object names.

/// Auto-reset event the monitor sets when the shared buffer may be written.
pub const ACK_EVENT_NAME: &str = "DBWIN_BUFFER_READY";

/// Auto-reset event a producer sets after writing the shared buffer.
pub const DATA_READY_EVENT_NAME: &str = "DBWIN_DATA_READY";

/// Paging-file backed shared memory segment holding one message.
pub const BUFFER_NAME: &str = "DBWIN_BUFFER";

/// Machine-wide mutex held by the single running monitor.
/// Shared with earlier capture builds so mixed versions still exclude each other.
pub const INSTANCE_MUTEX_NAME: &str = "Speedo.Hook";

/// Prefix selecting the global kernel namespace (service sessions).
pub const GLOBAL_PREFIX: &str = "Global\\";

/// Reserved size of the shared segment.
pub const BUFFER_CAPACITY: usize = 4096;

/// Size of the view the monitor maps. Messages must fit in here.
pub const VIEW_SIZE: usize = 512;

/// The full set of names one monitor instance uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    pub instance_mutex: String,
    pub ack: String,
    pub data_ready: String,
    pub buffer: String,
}

impl ChannelNames {
    /// Names in the caller's session namespace.
    pub fn local() -> Self {
        Self::with_prefix("")
    }

    /// Names in the global namespace, visible to producers in every session.
    pub fn global() -> Self {
        Self::with_prefix(GLOBAL_PREFIX)
    }

    /// Names with an arbitrary prefix. Producers only interoperate with the
    /// empty and `Global\` prefixes; other prefixes isolate test instances.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            instance_mutex: format!("{prefix}{INSTANCE_MUTEX_NAME}"),
            ack: format!("{prefix}{ACK_EVENT_NAME}"),
            data_ready: format!("{prefix}{DATA_READY_EVENT_NAME}"),
            buffer: format!("{prefix}{BUFFER_NAME}"),
        }
    }
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self::local()
    }
}

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Maximum length of a POSIX shm / semaphore name, 0 for no limit.
///
/// macOS caps both at 31 bytes (`PSHMNAMLEN` / `PSEMNAMLEN`).
#[cfg(target_os = "macos")]
pub const POSIX_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const POSIX_NAME_MAX: usize = 0;

/// Turn a kernel object name into a POSIX object name.
///
/// Adds a leading '/', replaces the remaining path separators (including the
/// `Global\` separator) with '_', and when the result exceeds
/// `POSIX_NAME_MAX` shortens it to `/<prefix>_<16-hex FNV-1a>`.
pub fn posix_name(name: &str) -> String {
    posix_name_limited(name, POSIX_NAME_MAX)
}

fn posix_name_limited(name: &str, max: usize) -> String {
    let body: String = name
        .trim_start_matches('/')
        .chars()
        .map(|c| if c == '\\' || c == '/' { '_' } else { c })
        .collect();
    let result = format!("/{body}");

    if max == 0 || result.len() <= max {
        return result;
    }

    // 1 (underscore) + 16 (hex hash)
    const HASH_SUFFIX_LEN: usize = 1 + 16;
    let prefix_len = max.saturating_sub(HASH_SUFFIX_LEN + 1);

    let hash = fnv1a_64(result.as_bytes());
    let mut shortened = String::with_capacity(max);
    shortened.push('/');
    // The limit is in bytes; back off to a char boundary.
    let mut cut = prefix_len.min(body.len());
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    shortened.push_str(&body[..cut]);
    shortened.push('_');
    shortened.push_str(&format!("{hash:016x}"));
    shortened
}
