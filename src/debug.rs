//! Allocation-free logging for the audio thread.
//!
//! The audio side formats into fixed-size entries and pushes them into a
//! single-producer ring. The editor timer drains the ring into the `log`
//! facade. Formatting only happens with the `debug` feature; otherwise
//! `wg_log!` costs one branch.

use ringbuf::{Consumer, Producer, RingBuffer};
use std::fmt;

const LOG_CAP: usize = 64;
const LOG_MSG_MAX: usize = 192;

#[derive(Copy, Clone)]
pub struct RtLogEntry {
    len: u8,
    bytes: [u8; LOG_MSG_MAX],
}

impl Default for RtLogEntry {
    fn default() -> Self {
        Self {
            len: 0,
            bytes: [0; LOG_MSG_MAX],
        }
    }
}

impl RtLogEntry {
    pub fn as_str(&self) -> &str {
        // Truncation in write_str may split a code point
        let raw = &self.bytes[..self.len as usize];
        match std::str::from_utf8(raw) {
            Ok(s) => s,
            Err(e) => std::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl fmt::Write for RtLogEntry {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let len = self.len as usize;
        let n = s.len().min(LOG_MSG_MAX - len);
        self.bytes[len..len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len = (len + n) as u8;
        Ok(())
    }
}

/// Audio-thread end of the log ring.
pub struct RtLogger {
    tx: Producer<RtLogEntry>,
    dropped: usize,
}

/// Editor-side end of the log ring.
pub struct RtLogDrain {
    rx: Consumer<RtLogEntry>,
}

pub fn rt_log_channel() -> (RtLogger, RtLogDrain) {
    let (tx, rx) = RingBuffer::<RtLogEntry>::new(LOG_CAP).split();
    (RtLogger { tx, dropped: 0 }, RtLogDrain { rx })
}

impl RtLogger {
    #[cfg(feature = "debug")]
    pub fn log_args(&mut self, args: fmt::Arguments) {
        let mut entry = RtLogEntry::default();
        let _ = fmt::write(&mut entry, args);
        if self.tx.push(entry).is_err() {
            self.dropped += 1;
        }
    }

    #[cfg(not(feature = "debug"))]
    pub fn log_args(&mut self, _args: fmt::Arguments) {}

    /// Messages lost because the editor was not draining.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl RtLogDrain {
    /// Forwards everything queued so far to `log::debug!`. Returns the count.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while let Some(entry) = self.rx.pop() {
            log::debug!("[rt] {}", entry.as_str());
            n += 1;
        }
        n
    }
}

#[macro_export]
macro_rules! wg_log {
    ($logger:expr, $($arg:tt)*) => {
        $logger.log_args(format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn test_entry_truncates() {
        let mut entry = RtLogEntry::default();
        let long = "x".repeat(LOG_MSG_MAX * 2);
        entry.write_str(&long).unwrap();
        assert_eq!(entry.as_str().len(), LOG_MSG_MAX);
    }

    #[test]
    fn test_entry_keeps_valid_utf8() {
        let mut entry = RtLogEntry::default();
        entry.write_str(&"a".repeat(LOG_MSG_MAX - 1)).unwrap();
        entry.write_str("é").unwrap();
        assert_eq!(entry.as_str().len(), LOG_MSG_MAX - 1);
    }

    #[cfg(feature = "debug")]
    #[test]
    fn test_channel_round_trip() {
        let (mut logger, mut drain) = rt_log_channel();
        wg_log!(logger, "period {} closed", 3);
        assert_eq!(drain.drain(), 1);
        assert_eq!(drain.drain(), 0);
    }

    #[cfg(not(feature = "debug"))]
    #[test]
    fn test_disabled_logger_is_silent() {
        let (mut logger, mut drain) = rt_log_channel();
        wg_log!(logger, "period {} closed", 3);
        assert_eq!(drain.drain(), 0);
        assert_eq!(logger.dropped(), 0);
    }
}
