//! Gated logging for hot paths (signal handling, timer callbacks).
//!
//! A module opts in by defining two consts next to its imports:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "sos::detector";
//!
//! use crate::{log_debug, log_info};
//! ```
//! Every record is emitted under `LOG_TARGET` so `RUST_LOG=sos::detector=debug`
//! isolates one component.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Errors are never gated: a silenced module still reports failures.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!(target: LOG_TARGET, $($arg)*)
    };
}

/// Shortens a delivery token for display: first 20 chars plus an ellipsis.
pub fn token_preview(token: &str) -> String {
    let mut preview: String = token.chars().take(20).collect();
    preview.push_str("...");
    preview
}

#[cfg(test)]
mod tests {
    use super::token_preview;

    #[test]
    fn token_preview_keeps_twenty_chars() {
        let token = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(token_preview(token), "abcdefghijklmnopqrst...");
        assert_eq!(token_preview("short"), "short...");
    }
}
