//! Logger bootstrap. The crate itself only uses the `log` facade; binaries and
//! tests pick the backend.

/// Initializes the logger with the `env_logger` crate, configured through
/// `RUST_LOG` (e.g. `RUST_LOG=mbus_master=debug` for frame dumps).
pub fn init_logger() {
    env_logger::init();
}

/// Like [`init_logger`], but returns an error instead of panicking when a
/// logger is already installed. Falls back to `default_filter` when
/// `RUST_LOG` is unset.
pub fn try_init_logger(default_filter: &str) -> Result<(), log::SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .try_init()
}

/// Logger for tests: output is captured by the test harness and repeated
/// initialization is ignored.
pub fn init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}
