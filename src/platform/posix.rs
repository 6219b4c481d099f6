// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX emulation of the DBWIN objects.
//   event   -> named semaphore clamped to a count of one
//   mapping -> shm_open segment, views via mmap
//   mutex   -> exclusive flock on a lock file in the temp directory
// Unix kernels have no debug-string facility, so producers here are other
// processes using this crate's Producer over the same names.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::path::PathBuf;
use std::ptr;
use std::time::Duration;

use crate::backend::{
    Backend, Created, NamedEvent, NamedMutex, SharedMapping, SharedView, ViewAccess,
};
use crate::names::posix_name;

/// Permissions granted to every user, so producers running under other
/// accounts can open the objects.
const OPEN_MODE: libc::mode_t = 0o666;

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(posix_name(name).into_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PosixBackend;

/// File mode applied to created objects.
#[derive(Debug, Clone, Copy)]
pub struct PosixSecurity {
    mode: libc::mode_t,
}

impl Backend for PosixBackend {
    type Security = PosixSecurity;
    type Mutex = PosixMutex;
    type Event = PosixEvent;
    type View = PosixView;
    type Mapping = PosixMapping;

    fn is_supported(&self) -> bool {
        true
    }

    fn create_named_mutex(&self, name: &str) -> io::Result<Created<PosixMutex>> {
        PosixMutex::acquire(name)
    }

    fn permissive_security(&self) -> io::Result<PosixSecurity> {
        Ok(PosixSecurity { mode: OPEN_MODE })
    }

    fn create_named_event(&self, name: &str, security: &PosixSecurity) -> io::Result<PosixEvent> {
        PosixEvent::open(name, Some(security.mode))
    }

    fn open_named_event(&self, name: &str) -> io::Result<PosixEvent> {
        PosixEvent::open(name, None)
    }

    fn create_shared_mapping(
        &self,
        name: &str,
        capacity: usize,
        security: &PosixSecurity,
    ) -> io::Result<PosixMapping> {
        PosixMapping::create(name, capacity, security.mode)
    }

    fn open_shared_mapping(&self, name: &str) -> io::Result<PosixMapping> {
        PosixMapping::open(name)
    }
}

// ---------------------------------------------------------------------------
// PosixMutex: flock on <tmp>/<name>.lock
// ---------------------------------------------------------------------------

pub struct PosixMutex {
    file: Option<File>,
}

impl PosixMutex {
    fn lock_path(name: &str) -> PathBuf {
        let file = format!("{}.lock", posix_name(name).trim_start_matches('/'));
        std::env::temp_dir().join(file)
    }

    fn acquire(name: &str) -> io::Result<Created<Self>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(Self::lock_path(name))?;

        // The lock dies with the open file description, so a crashed owner
        // never leaves the name held.
        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        let created_new = if ret == 0 {
            true
        } else {
            let e = io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::EWOULDBLOCK) {
                return Err(e);
            }
            false
        };

        Ok(Created {
            handle: Self { file: Some(file) },
            created_new,
        })
    }
}

impl NamedMutex for PosixMutex {
    fn close(mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            let fd = file.into_raw_fd();
            if unsafe { libc::close(fd) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PosixEvent: named semaphore used as an auto-reset event
// ---------------------------------------------------------------------------

pub struct PosixEvent {
    sem: *mut libc::sem_t,
    name: CString,
    owner: bool,
}

// Safety: sem_t operations are thread-safe; the pointer is only closed once.
unsafe impl Send for PosixEvent {}
unsafe impl Sync for PosixEvent {}

impl PosixEvent {
    /// `mode` present: create if missing and own the name. Absent: open only.
    fn open(name: &str, mode: Option<libc::mode_t>) -> io::Result<Self> {
        let c_name = c_name(name)?;
        let sem = match mode {
            Some(mode) => unsafe {
                libc::sem_open(
                    c_name.as_ptr(),
                    libc::O_CREAT,
                    mode as libc::c_uint,
                    0 as libc::c_uint,
                )
            },
            None => unsafe { libc::sem_open(c_name.as_ptr(), 0) },
        };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }

        let event = Self {
            sem,
            name: c_name,
            owner: mode.is_some(),
        };
        if event.owner {
            // A previous owner may have died with the semaphore still posted.
            while unsafe { libc::sem_trywait(event.sem) } == 0 {}
        }
        Ok(event)
    }

    fn release(&mut self) -> io::Result<()> {
        if self.sem.is_null() {
            return Ok(());
        }
        let ret = unsafe { libc::sem_close(self.sem) };
        self.sem = ptr::null_mut();
        if self.owner {
            unsafe { libc::sem_unlink(self.name.as_ptr()) };
        }
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl NamedEvent for PosixEvent {
    fn set(&self) -> io::Result<()> {
        // Take a pending post first so repeated sets stay at one, like an event.
        unsafe { libc::sem_trywait(self.sem) };
        if unsafe { libc::sem_post(self.sem) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn wait(&self) -> io::Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            let e = io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::EINTR) {
                return Err(e);
            }
        }
    }

    #[cfg(not(target_os = "macos"))]
    fn wait_timeout(&self, timeout: Duration) -> io::Result<bool> {
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
        let ns_total = ts.tv_nsec as u64 + u64::from(timeout.subsec_nanos());
        ts.tv_sec += timeout.as_secs() as libc::time_t + (ns_total / 1_000_000_000) as libc::time_t;
        ts.tv_nsec = (ns_total % 1_000_000_000) as libc::c_long;
        loop {
            if unsafe { libc::sem_timedwait(self.sem, &ts) } == 0 {
                return Ok(true);
            }
            let e = io::Error::last_os_error();
            match e.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Ok(false),
                _ => return Err(e),
            }
        }
    }

    // macOS lacks sem_timedwait, so poll with sem_trywait instead.
    #[cfg(target_os = "macos")]
    fn wait_timeout(&self, timeout: Duration) -> io::Result<bool> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }
            let e = io::Error::last_os_error();
            match e.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EINTR) => {}
                _ => return Err(e),
            }
            if std::time::Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn close(mut self) -> io::Result<()> {
        self.release()
    }
}

impl Drop for PosixEvent {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// ---------------------------------------------------------------------------
// PosixMapping: shm_open segment
// ---------------------------------------------------------------------------

pub struct PosixMapping {
    fd: RawFd,
    name: CString,
    owner: bool,
}

impl PosixMapping {
    fn create(name: &str, capacity: usize, mode: libc::mode_t) -> io::Result<Self> {
        if capacity == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "capacity is 0"));
        }
        let c_name = c_name(name)?;

        // Exclusive create first, so ftruncate only runs on a segment we own.
        // On macOS ftruncate on an already-sized segment fails with EINVAL.
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                mode as libc::c_uint,
            )
        };
        let (fd, fresh) = if fd != -1 {
            (fd, true)
        } else {
            let e = io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::EEXIST) {
                return Err(e);
            }
            let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, mode as libc::c_uint) };
            if fd == -1 {
                return Err(io::Error::last_os_error());
            }
            (fd, false)
        };

        let mapping = Self {
            fd,
            name: c_name,
            owner: true,
        };

        // Umask may have stripped bits from the requested mode.
        unsafe { libc::fchmod(fd, mode) };

        let size = if fresh { 0 } else { mapping.size()? };
        if size < capacity && unsafe { libc::ftruncate(fd, capacity as libc::off_t) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(mapping)
    }

    fn open(name: &str) -> io::Result<Self> {
        let c_name = c_name(name)?;
        let mode = OPEN_MODE as libc::c_uint;
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, mode) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            fd,
            name: c_name,
            owner: false,
        })
    }

    fn size(&self) -> io::Result<usize> {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(self.fd, &mut st) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(st.st_size as usize)
    }

    fn release(&mut self) -> io::Result<()> {
        if self.fd == -1 {
            return Ok(());
        }
        let ret = unsafe { libc::close(self.fd) };
        self.fd = -1;
        if self.owner {
            unsafe { libc::shm_unlink(self.name.as_ptr()) };
        }
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl SharedMapping for PosixMapping {
    type View = PosixView;

    fn map_view(&self, len: usize, access: ViewAccess) -> io::Result<PosixView> {
        if len == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "view length is 0"));
        }
        if self.size()? < len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "view is larger than the shared segment",
            ));
        }
        let prot = match access {
            ViewAccess::Read => libc::PROT_READ,
            ViewAccess::Write => libc::PROT_READ | libc::PROT_WRITE,
        };
        let mem = unsafe { libc::mmap(ptr::null_mut(), len, prot, libc::MAP_SHARED, self.fd, 0) };
        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(PosixView {
            mem: mem as *mut u8,
            len,
            access,
        })
    }

    fn close(mut self) -> io::Result<()> {
        self.release()
    }
}

impl Drop for PosixMapping {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// ---------------------------------------------------------------------------
// PosixView: mmap'd window
// ---------------------------------------------------------------------------

pub struct PosixView {
    mem: *mut u8,
    len: usize,
    access: ViewAccess,
}

// Safety: the region is process-shared by design; writers outside this
// process are governed by the handshake, not by Rust aliasing.
unsafe impl Send for PosixView {}
unsafe impl Sync for PosixView {}

impl PosixView {
    fn release(&mut self) -> io::Result<()> {
        if self.mem.is_null() {
            return Ok(());
        }
        let ret = unsafe { libc::munmap(self.mem as *mut libc::c_void, self.len) };
        self.mem = ptr::null_mut();
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl SharedView for PosixView {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len);
        unsafe { ptr::copy_nonoverlapping(self.mem, buf.as_mut_ptr(), n) };
        n
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if self.access != ViewAccess::Write {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "view is mapped read-only",
            ));
        }
        if bytes.len() > self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} bytes do not fit a {} byte view", bytes.len(), self.len),
            ));
        }
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.mem, bytes.len()) };
        Ok(())
    }

    fn unmap(mut self) -> io::Result<()> {
        self.release()
    }
}

impl Drop for PosixView {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
