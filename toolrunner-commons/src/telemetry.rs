//! Tracing initialization.
//!
//! Mirrors the reference agent's split between interactive (stderr) and
//! file-redirected logging: a TUI or any other consumer of stdout cannot
//! share it with log output, so a configured log file takes precedence.

use crate::config::LogConfig;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize the global tracing subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init_tracing(cfg: &LogConfig) {
    INIT.call_once(|| {
        let filter = cfg
            .filter
            .clone()
            .map(EnvFilter::new)
            .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

        let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

        match &cfg.file {
            Some(path) => {
                if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
                    builder.with_ansi(false).with_writer(std::sync::Mutex::new(file)).init();
                    return;
                }
                // Fall through to stderr if the file can't be opened.
                builder.with_writer(std::io::stderr).init();
            }
            None => {
                builder.with_writer(std::io::stderr).init();
            }
        }
    });
}
