// Copyright (c) 2025 vivo Mobile Communication Co., Ltd.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `log`-crate backend (ambient stack, SPEC_FULL.md §12): tags every record
//! with the current tick, CPU, and thread the way the reference codebase's
//! own `logger.rs` does, serialized through a spinlock so concurrent
//! callers don't interleave a line.
//!
//! The reference backend hands the formatted line to `kprintln!`, which
//! ultimately reaches a UART the board-support package owns. This core has
//! no console of its own — §1 places `printf`/string routines and the
//! console shell out of scope as external collaborators — so the actual
//! byte sink is a single function pointer an embedder installs with
//! [`set_sink`]; until one is installed, records are formatted and then
//! silently dropped. The host test target installs a capturing sink so
//! assertions can inspect what was logged.

extern crate alloc;

use alloc::string::String;
use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record};

use crate::sync::lock::spinlock::SpinLock;

pub type SinkFn = fn(&str);

static SINK: SpinLock<Option<SinkFn>> = SpinLock::new(None);

struct LineBuf {
    buf: [u8; 256],
    len: usize,
}

impl LineBuf {
    fn new() -> Self {
        LineBuf { buf: [0; 256], len: 0 }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("<non-utf8 log line>")
    }
}

impl Write for LineBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let space = self.buf.len() - self.len;
        let n = bytes.len().min(space);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

/// Installs the function every logged line is handed to, once formatted.
/// Pass `None` to go back to silently dropping records.
pub fn set_sink(sink: Option<SinkFn>) {
    *SINK.lock() = sink;
}

struct Logger;

static LOGGER: Logger = Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let cpu = crate::cpu::current_cpu();
        let tid = crate::cpu::current_thread();
        let mut line = LineBuf::new();
        let _ = match tid {
            Some(tid) => write!(
                line,
                "[{:>8}ms cpu{} {}] {}: {}",
                crate::clock::now_ms(),
                cpu,
                tid,
                record.level(),
                record.args()
            ),
            None => write!(
                line,
                "[{:>8}ms cpu{} -] {}: {}",
                crate::clock::now_ms(),
                cpu,
                record.level(),
                record.args()
            ),
        };
        if let Some(sink) = *SINK.lock() {
            sink(line.as_str());
        }
    }

    fn flush(&self) {}
}

/// Installs this module as the `log` crate's global backend at `level`.
/// `log::set_logger` only accepts the first caller process-wide; later
/// calls are swallowed since re-running init isn't itself an error for a
/// logger (§4.8's init hooks may run more than once across suspend/resume).
pub fn init(level: LevelFilter) {
    log::set_max_level(level);
    let _ = log::set_logger(&LOGGER);
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, Ordering};

    static CAPTURED: SpinLock<Option<String>> = SpinLock::new(None);
    static INIT_DONE: AtomicBool = AtomicBool::new(false);

    fn capture(line: &str) {
        *CAPTURED.lock() = Some(String::from(line));
    }

    #[test]
    fn logged_line_includes_level_and_message() {
        if !INIT_DONE.swap(true, Ordering::SeqCst) {
            init(LevelFilter::Trace);
        }
        log::set_max_level(LevelFilter::Info);
        set_sink(Some(capture));
        log::info!("hello {}", 42);
        let line = CAPTURED.lock().clone().unwrap();
        assert!(line.contains("INFO"));
        assert!(line.contains("hello 42"));
        set_sink(None);
    }

    #[test]
    fn disabled_levels_never_reach_the_sink() {
        if !INIT_DONE.swap(true, Ordering::SeqCst) {
            init(LevelFilter::Trace);
        }
        log::set_max_level(LevelFilter::Warn);
        *CAPTURED.lock() = None;
        set_sink(Some(capture));
        log::debug!("should not be captured");
        assert!(CAPTURED.lock().is_none());
        set_sink(None);
    }
}
