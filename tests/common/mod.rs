//! Common test utilities with tracing setup and key helpers.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ... test code with tracing::info!, tracing::debug!, etc.
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Filter directives (e.g., `blinktree=debug,blinktree::tree::split=trace`)
//! - `BLINKTREE_LOG_DIR`: Log directory (default: `logs/`)
//! - `BLINKTREE_LOG_CONSOLE`: Set to "0" to disable console output
//!
//! # Log Files
//!
//! Logs are written to `logs/blinktree.jsonl` as newline-delimited JSON (NDJSON).
//!
//! ```bash
//! # Pretty-print all logs
//! cat logs/blinktree.jsonl | jq .
//!
//! # Root growth events only
//! cat logs/blinktree.jsonl | jq 'select(.fields.message == "growing tree")'
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use blinktree::{BLinkTree, KeyValue};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Ensures tracing is only initialized once across all tests.
static INIT: Once = Once::new();

/// Initialize the tracing subscriber with file and console logging.
///
/// Safe to call multiple times - only the first call takes effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        setup_tracing();
    });
}

/// Configuration for tracing setup.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// Log file name.
    pub log_file: String,
    /// Enable console output.
    pub console_enabled: bool,
    /// Default log level if RUST_LOG is not set.
    pub default_level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file: "blinktree.jsonl".to_string(),
            console_enabled: true,
            default_level: Level::INFO,
        }
    }
}

impl TracingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("BLINKTREE_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if env::var("BLINKTREE_LOG_CONSOLE").is_ok_and(|v| v == "0") {
            config.console_enabled = false;
        }

        config
    }
}

/// Create an EnvFilter from RUST_LOG or use default level.
fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{default_level}")))
}

#[expect(clippy::expect_used)]
fn setup_tracing() {
    let config = TracingConfig::from_env();

    std::fs::create_dir_all(&config.log_dir).expect("Failed to create log directory");

    let log_path = config.log_dir.join(&config.log_file);

    // Append mode: nextest runs tests in separate processes.
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .expect("Failed to open log file");

    let console_layer = if config.console_enabled {
        Some(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .compact()
                .with_filter(make_filter(config.default_level)),
        )
    } else {
        None
    };

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .with_filter(make_filter(config.default_level));

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// =============================================================================
// Key helpers
// =============================================================================

/// Scatter `0..n` over `i64` so inserts land all over the tree.
pub fn scattered_int(i: usize) -> i64 {
    (i as i64).wrapping_mul(0x9e37_79b9_7f4a_7c15_u64 as i64)
}

/// Fixed-width decimal string keys, so byte order equals numeric order.
pub fn padded_str(i: usize) -> String {
    format!("key-{i:08}")
}

/// Verify all keys are findable, panic with details if any missing.
pub fn verify_all_keys<P, F>(tree: &BLinkTree<P>, key_gen: F, count: usize, test_name: &str)
where
    P: Clone,
    F: Fn(usize) -> KeyValue,
{
    let missing: Vec<usize> = (0..count)
        .filter(|&i| tree.get(&key_gen(i)).is_none())
        .collect();

    if !missing.is_empty() {
        let sample: Vec<_> = missing.iter().take(20).collect();
        panic!(
            "{}: Missing {} keys (showing first 20): {:?}\n\
             tree.len()={}, expected={}",
            test_name,
            missing.len(),
            sample,
            tree.len(),
            count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_init() {
        init_tracing();
        tracing::info!("Tracing initialized successfully");
        tracing::debug!(key = "test_key", value = 42, "Debug event");
    }

    #[test]
    fn test_padded_keys_sort_numerically() {
        assert!(padded_str(9) < padded_str(10));
    }
}
