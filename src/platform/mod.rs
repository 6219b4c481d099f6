// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

pub mod unsupported;

// Re-export the platform-specific backend under a uniform name.

#[cfg(unix)]
pub use posix::PosixBackend as SystemBackend;

#[cfg(windows)]
pub use windows::WinBackend as SystemBackend;

#[cfg(not(any(unix, windows)))]
pub use unsupported::UnsupportedBackend as SystemBackend;
