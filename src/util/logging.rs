//! # Logging Utilities
//!
//! Rate limiting for log messages that can repeat at line speed, and frame
//! hex dumps for protocol debugging.
//!
//! ```rust
//! use mbus_master::util::logging::{LogThrottle, log_frame_hex};
//!
//! let mut throttle = LogThrottle::new(1000, 5); // 5 messages per second
//! if throttle.allow() {
//!     log::warn!("checksum error");
//! }
//! log_frame_hex("RX", &[0x10, 0x40, 0x01, 0x41, 0x16]);
//! ```

use std::time::Instant;

/// Caps the number of messages logged per time window.
#[derive(Debug)]
pub struct LogThrottle {
    window_ms: u64,
    cap: u32,
    count: u32,
    t0: Instant,
}

impl LogThrottle {
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            t0: Instant::now(),
        }
    }

    /// True if the message should be logged. Starts a new window once the
    /// current one has expired.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.t0).as_millis() as u64;

        if elapsed_ms > self.window_ms {
            self.t0 = now;
            self.count = 0;
        }

        self.count = self.count.saturating_add(1);
        self.count <= self.cap
    }

    /// Messages suppressed in the current window.
    pub fn suppressed(&self) -> u32 {
        self.count.saturating_sub(self.cap)
    }

    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.count = 0;
    }
}

/// Logs frame bytes at debug level, truncated to keep lines readable.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let hex_str = crate::util::hex::format_hex_compact(shown);
    if data.len() > MAX_LOG_BYTES {
        log::debug!("{prefix}: {hex_str} ... ({} bytes total)", data.len());
    } else {
        log::debug!("{prefix}: {hex_str}");
    }
}

/// Log a warning with throttling.
#[macro_export]
macro_rules! log_warn_throttled {
    ($throttle:expr, $($arg:tt)*) => {
        if $throttle.allow() {
            log::warn!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_caps_messages() {
        let mut throttle = LogThrottle::new(60_000, 3);
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());
        assert!(!throttle.allow());
        assert_eq!(throttle.suppressed(), 2);

        throttle.reset();
        assert!(throttle.allow());
        assert_eq!(throttle.suppressed(), 0);
    }

    #[test]
    fn throttle_window_expires() {
        let mut throttle = LogThrottle::new(0, 1);
        assert!(throttle.allow());
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(throttle.allow());
    }

    #[test]
    fn long_frames_do_not_panic() {
        log_frame_hex("RX", &[0x2F; 300]);
        log_frame_hex("RX", &[]);
    }
}
