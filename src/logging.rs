//! Daemon logging bootstrap.
//!
//! stdout carries the request/response protocol, so every log record goes to
//! stderr. Records are single-line `event=... module=... status=...` pairs and
//! carry ids and counts only, never names or marks.

use flexi_logger::{Logger, LoggerHandle, WriteMode};
use log::info;
use once_cell::sync::OnceCell;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    _logger: LoggerHandle,
}

/// Returns the default log level for current build mode.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Starts the stderr logger.
///
/// Idempotent for the same level; a second call with a different level is
/// rejected. Never panics.
pub fn init_logging(level: &str) -> Result<(), String> {
    let normalized = normalize_level(level)?;

    if let Some(state) = LOGGING_STATE.get() {
        return check_same_level(state, normalized);
    }

    let logger = Logger::try_with_str(normalized)
        .map_err(|err| format!("invalid log level `{normalized}`: {err}"))?
        .log_to_stderr()
        .write_mode(WriteMode::Direct)
        .format_for_stderr(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    if LOGGING_STATE
        .set(LoggingState {
            level: normalized,
            _logger: logger,
        })
        .is_err()
    {
        // Lost a race with another initializer; keep theirs.
        if let Some(state) = LOGGING_STATE.get() {
            return check_same_level(state, normalized);
        }
    }

    info!(
        "event=daemon_start module=logging status=ok level={} version={}",
        normalized,
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

fn check_same_level(state: &LoggingState, requested: &'static str) -> Result<(), String> {
    if state.level != requested {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{}`",
            state.level, requested
        ));
    }
    Ok(())
}

pub fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}
