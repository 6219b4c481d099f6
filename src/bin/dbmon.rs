// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   dbmon
//
// Claims the machine-wide capture role and prints every debug string as
// "[pid] text" until interrupted. Set DBMON_SCOPE=global to capture from
// service sessions (needs the right privilege on Windows).

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use dbmon::{DebugMonitor, MonitorConfig};

static QUIT: AtomicBool = AtomicBool::new(false);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match MonitorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("dbmon: {e}");
            std::process::exit(2);
        }
    };

    let monitor = DebugMonitor::with_config(config);
    monitor.subscribe(|pid, text| println!("[{pid}] {text}"));

    if let Err(e) = monitor.start() {
        eprintln!("dbmon: {e}");
        std::process::exit(1);
    }

    install_quit_handler();
    while !QUIT.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(100));
    }

    if let Err(e) = monitor.stop() {
        eprintln!("dbmon: {e}");
    }
    if let Err(e) = monitor.dispose() {
        eprintln!("dbmon: {e}");
        std::process::exit(1);
    }
}

// Sets QUIT on SIGINT / SIGTERM / SIGHUP, or on console control events.
fn install_quit_handler() {
    #[cfg(unix)]
    {
        extern "C" fn handler(_: libc::c_int) {
            QUIT.store(true, Ordering::Release);
        }
        unsafe {
            libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGHUP, handler as *const () as libc::sighandler_t);
        }
    }
    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::{BOOL, TRUE};
        use windows_sys::Win32::System::Console::SetConsoleCtrlHandler;

        unsafe extern "system" fn handler(_: u32) -> BOOL {
            QUIT.store(true, Ordering::Release);
            TRUE
        }
        unsafe {
            SetConsoleCtrlHandler(Some(handler), TRUE);
        }
    }
}
