// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   dbmon_send <text> [timeout_ms]
//
// Emits one debug string to the running monitor, the same way a process
// calling OutputDebugString does.

use std::time::Duration;

use dbmon::{MonitorConfig, Producer, SystemBackend, DEFAULT_SEND_TIMEOUT};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: dbmon_send <text> [timeout_ms]");
        std::process::exit(1);
    }
    let timeout = match args.get(2) {
        Some(ms) => match ms.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                eprintln!("dbmon_send: invalid timeout '{ms}'");
                std::process::exit(1);
            }
        },
        None => DEFAULT_SEND_TIMEOUT,
    };

    if let Err(e) = run(&args[1], timeout) {
        eprintln!("dbmon_send: {e}");
        std::process::exit(1);
    }
}

fn run(text: &str, timeout: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let config = MonitorConfig::from_env()?;
    let mut producer = Producer::connect(&SystemBackend::default(), &config.names)?;
    producer.send(text, timeout)?;
    producer.close()?;
    Ok(())
}
