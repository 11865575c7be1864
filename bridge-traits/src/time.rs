//! Time and Logging Abstractions
//!
//! Provides injectable time source and logging sink for testing and platform integration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;

/// Time source trait
///
/// "This week in a past year" is anchored on `now()`, so tests inject a
/// [`FixedClock`] instead of reading the wall clock.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::time::Clock;
///
/// fn log_timestamp(clock: &dyn Clock) {
///     let now = clock.now();
///     println!("Current time: {}", now);
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Get current Unix timestamp in seconds
    fn unix_timestamp(&self) -> i64 {
        self.now().timestamp()
    }
}

/// System clock implementation using actual system time
#[derive(Debug, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to an instant until moved with [`FixedClock::set`].
#[derive(Debug)]
pub struct FixedClock {
    instant: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: RwLock::new(instant),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut guard = self.instant.write().unwrap_or_else(|e| e.into_inner());
        *guard = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Target module/component
    pub target: String,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: HashMap<String, String>,
    /// Name of the enclosing span, if any
    pub span_id: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: HashMap::new(),
            span_id: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }
}

/// Logger sink trait
///
/// Forwards structured logs from the core to host logging pipelines
/// (OSLog, Logcat, console).
///
/// Implementations must not log the Last.fm API key; the core already passes
/// it through `redact_if_sensitive` before it reaches a field.
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    /// Forward a log entry to the host logging system
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// Flush any buffered logs
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Get the minimum log level that will be processed
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Console logger implementation for testing/development
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    pub min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

#[async_trait::async_trait]
impl LoggerSink for ConsoleLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level >= self.min_level {
            let level_str = match entry.level {
                LogLevel::Trace => "TRACE",
                LogLevel::Debug => "DEBUG",
                LogLevel::Info => "INFO",
                LogLevel::Warn => "WARN",
                LogLevel::Error => "ERROR",
            };

            println!(
                "[{}] {} {}: {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                level_str,
                entry.target,
                entry.message
            );

            if !entry.fields.is_empty() {
                println!("  Fields: {:?}", entry.fields);
            }
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_system_clock() {
        let clock = SystemClock;
        let now = clock.now();
        let timestamp = clock.unix_timestamp();

        assert!(timestamp > 0);
        assert!(timestamp - now.timestamp() <= 1);
    }

    #[test]
    fn test_fixed_clock_moves_only_when_set() {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);

        let later = Utc.with_ymd_and_hms(2024, 1, 17, 12, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
        assert_eq!(clock.unix_timestamp(), later.timestamp());
    }

    #[test]
    fn test_log_entry_builder() {
        let entry = LogEntry::new(LogLevel::Info, "charts", "Chart loaded")
            .with_field("user_name", "ctrott")
            .with_span_id("get_chart");

        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.target, "charts");
        assert_eq!(entry.message, "Chart loaded");
        assert_eq!(entry.fields.get("user_name"), Some(&"ctrott".to_string()));
        assert_eq!(entry.span_id, Some("get_chart".to_string()));
    }

    #[tokio::test]
    async fn test_console_logger() {
        let logger = ConsoleLogger::default();
        let entry = LogEntry::new(LogLevel::Info, "test", "Test log");

        logger.log(entry).await.unwrap();
        assert_eq!(logger.min_level(), LogLevel::Info);
    }
}
