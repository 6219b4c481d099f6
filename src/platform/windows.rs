// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Win32 implementation of the DBWIN objects: kernel named mutex, auto-reset
// events, and a paging-file backed file mapping. These are the objects
// OutputDebugString talks to.

use std::ffi::c_void;
use std::io;
use std::ptr;
use std::time::Duration;

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, FALSE, HANDLE, INVALID_HANDLE_VALUE, TRUE,
    WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::Security::{
    InitializeSecurityDescriptor, SetSecurityDescriptorDacl, SECURITY_ATTRIBUTES,
    SECURITY_DESCRIPTOR,
};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_READ,
    FILE_MAP_WRITE, MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
};
use windows_sys::Win32::System::Threading::{
    CreateEventW, CreateMutexW, OpenEventW, SetEvent, WaitForSingleObject, INFINITE,
};

use crate::backend::{
    Backend, Created, NamedEvent, NamedMutex, SharedMapping, SharedView, ViewAccess,
};

const SECURITY_DESCRIPTOR_REVISION: u32 = 1;
const EVENT_MODIFY_STATE: u32 = 0x0002;
const SYNCHRONIZE: u32 = 0x0010_0000;

/// Encode a name as a null-terminated wide string for Win32 APIs.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn close_handle(handle: &mut HANDLE) -> io::Result<()> {
    if handle.is_null() {
        return Ok(());
    }
    let ok = unsafe { CloseHandle(*handle) };
    *handle = ptr::null_mut();
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WinBackend;

/// Security attributes carrying a NULL DACL: every account may open the
/// objects, which producers running as other users need.
pub struct WinSecurity {
    // Boxed so the pointer stored in `attributes` survives moves.
    _descriptor: Box<SECURITY_DESCRIPTOR>,
    attributes: SECURITY_ATTRIBUTES,
}

impl WinSecurity {
    fn as_ptr(&self) -> *const SECURITY_ATTRIBUTES {
        &self.attributes
    }
}

impl Backend for WinBackend {
    type Security = WinSecurity;
    type Mutex = WinMutex;
    type Event = WinEvent;
    type View = WinView;
    type Mapping = WinMapping;

    fn is_supported(&self) -> bool {
        true
    }

    fn create_named_mutex(&self, name: &str) -> io::Result<Created<WinMutex>> {
        let wide_name = to_wide(name);
        let handle = unsafe { CreateMutexW(ptr::null(), FALSE, wide_name.as_ptr()) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        let created_new = unsafe { GetLastError() } != ERROR_ALREADY_EXISTS;
        Ok(Created {
            handle: WinMutex { handle },
            created_new,
        })
    }

    fn permissive_security(&self) -> io::Result<WinSecurity> {
        let mut descriptor: Box<SECURITY_DESCRIPTOR> = Box::new(unsafe { std::mem::zeroed() });
        let psd = &mut *descriptor as *mut SECURITY_DESCRIPTOR as *mut c_void;

        if unsafe { InitializeSecurityDescriptor(psd, SECURITY_DESCRIPTOR_REVISION) } == 0 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { SetSecurityDescriptorDacl(psd, TRUE, ptr::null(), FALSE) } == 0 {
            return Err(io::Error::last_os_error());
        }

        let attributes = SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: psd,
            bInheritHandle: FALSE,
        };
        Ok(WinSecurity {
            _descriptor: descriptor,
            attributes,
        })
    }

    fn create_named_event(&self, name: &str, security: &WinSecurity) -> io::Result<WinEvent> {
        let wide_name = to_wide(name);
        // Auto-reset, initially unsignaled.
        let handle = unsafe { CreateEventW(security.as_ptr(), FALSE, FALSE, wide_name.as_ptr()) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(WinEvent { handle })
    }

    fn open_named_event(&self, name: &str) -> io::Result<WinEvent> {
        let wide_name = to_wide(name);
        let handle =
            unsafe { OpenEventW(EVENT_MODIFY_STATE | SYNCHRONIZE, FALSE, wide_name.as_ptr()) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(WinEvent { handle })
    }

    fn create_shared_mapping(
        &self,
        name: &str,
        capacity: usize,
        security: &WinSecurity,
    ) -> io::Result<WinMapping> {
        if capacity == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "capacity is 0"));
        }
        let wide_name = to_wide(name);
        let handle = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                security.as_ptr(),
                PAGE_READWRITE,
                0,
                capacity as u32,
                wide_name.as_ptr(),
            )
        };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(WinMapping { handle })
    }

    fn open_shared_mapping(&self, name: &str) -> io::Result<WinMapping> {
        let wide_name = to_wide(name);
        let handle =
            unsafe { OpenFileMappingW(FILE_MAP_READ | FILE_MAP_WRITE, FALSE, wide_name.as_ptr()) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(WinMapping { handle })
    }
}

// ---------------------------------------------------------------------------
// WinMutex
// ---------------------------------------------------------------------------

pub struct WinMutex {
    handle: HANDLE,
}

unsafe impl Send for WinMutex {}
unsafe impl Sync for WinMutex {}

impl NamedMutex for WinMutex {
    fn close(mut self) -> io::Result<()> {
        close_handle(&mut self.handle)
    }
}

impl Drop for WinMutex {
    fn drop(&mut self) {
        let _ = close_handle(&mut self.handle);
    }
}

// ---------------------------------------------------------------------------
// WinEvent
// ---------------------------------------------------------------------------

pub struct WinEvent {
    handle: HANDLE,
}

unsafe impl Send for WinEvent {}
unsafe impl Sync for WinEvent {}

impl WinEvent {
    fn wait_ms(&self, ms: u32) -> io::Result<bool> {
        match unsafe { WaitForSingleObject(self.handle, ms) } {
            WAIT_OBJECT_0 => Ok(true),
            WAIT_TIMEOUT => Ok(false),
            WAIT_FAILED => Err(io::Error::last_os_error()),
            other => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("unexpected wait result {other:#x}"),
            )),
        }
    }
}

impl NamedEvent for WinEvent {
    fn set(&self) -> io::Result<()> {
        if unsafe { SetEvent(self.handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn wait(&self) -> io::Result<()> {
        self.wait_ms(INFINITE).map(|_| ())
    }

    fn wait_timeout(&self, timeout: Duration) -> io::Result<bool> {
        // INFINITE is u32::MAX; stay just below it.
        let ms = timeout.as_millis().min(u128::from(INFINITE - 1)) as u32;
        self.wait_ms(ms)
    }

    fn close(mut self) -> io::Result<()> {
        close_handle(&mut self.handle)
    }
}

impl Drop for WinEvent {
    fn drop(&mut self) {
        let _ = close_handle(&mut self.handle);
    }
}

// ---------------------------------------------------------------------------
// WinMapping / WinView
// ---------------------------------------------------------------------------

pub struct WinMapping {
    handle: HANDLE,
}

unsafe impl Send for WinMapping {}
unsafe impl Sync for WinMapping {}

impl SharedMapping for WinMapping {
    type View = WinView;

    fn map_view(&self, len: usize, access: ViewAccess) -> io::Result<WinView> {
        let desired = match access {
            ViewAccess::Read => FILE_MAP_READ,
            ViewAccess::Write => FILE_MAP_WRITE,
        };
        let addr = unsafe { MapViewOfFile(self.handle, desired, 0, 0, len) };
        if addr.Value.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(WinView {
            mem: addr.Value as *mut u8,
            len,
            access,
        })
    }

    fn close(mut self) -> io::Result<()> {
        close_handle(&mut self.handle)
    }
}

impl Drop for WinMapping {
    fn drop(&mut self) {
        let _ = close_handle(&mut self.handle);
    }
}

pub struct WinView {
    mem: *mut u8,
    len: usize,
    access: ViewAccess,
}

unsafe impl Send for WinView {}
unsafe impl Sync for WinView {}

impl WinView {
    fn release(&mut self) -> io::Result<()> {
        if self.mem.is_null() {
            return Ok(());
        }
        let addr = MEMORY_MAPPED_VIEW_ADDRESS {
            Value: self.mem as *mut c_void,
        };
        self.mem = ptr::null_mut();
        if unsafe { UnmapViewOfFile(addr) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl SharedView for WinView {
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

impl Drop for WinView {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
