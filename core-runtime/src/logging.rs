//! # Logging & Tracing Infrastructure
//!
//! Provides structured logging with `tracing` crate, supporting:
//! - JSON and pretty-print output formats
//! - Module-level filtering
//! - Redaction of the Last.fm API key and similar secrets
//! - Integration with host logging via `LoggerSink`
//!
//! ## Overview
//!
//! This module configures the `tracing-subscriber` infrastructure and mirrors
//! every event that survives filtering to an optional host `LoggerSink`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{LoggingConfig, LogFormat, init_logging};
//! use bridge_traits::time::{LogLevel, ConsoleLogger};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LoggingConfig::default()
//!         .with_format(LogFormat::Pretty)
//!         .with_level(LogLevel::Debug)
//!         .with_logger_sink(Arc::new(ConsoleLogger::default()));
//!
//!     init_logging(config).expect("Failed to initialize logging");
//!
//!     tracing::info!("Application started");
//! }
//! ```

use crate::error::{Error, Result};

use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Crates whose events pass the default filter at the configured level.
const WORKSPACE_TARGETS: &[&str] = &[
    "core_runtime",
    "core_charts",
    "core_favorites",
    "core_service",
    "bridge_desktop",
];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format with colors
    Pretty,
    /// Structured JSON format for machine parsing
    Json,
    /// Compact format for production
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Logging configuration
#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Redact sensitive field values before they reach the host sink
    pub redact_sensitive: bool,
    /// Custom filter string (e.g., "core_charts=debug,core_favorites=trace")
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            redact_sensitive: true,
            filter: None,
            logger_sink: None,
            enable_spans: true,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_redaction(mut self, redact: bool) -> Self {
        self.redact_sensitive = redact;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set logger sink for host integration
    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }
}

/// Initialize the logging system
///
/// This should be called once during application startup. Subsequent calls
/// return [`Error::Config`] because a global subscriber is already set.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let sink_layer = LoggerSinkLayer::new(config.logger_sink.clone(), config.redact_sensitive);
    let registry = tracing_subscriber::registry().with(filter).with(sink_layer);

    let result = match config.format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(config.display_target)
                    .with_thread_ids(config.display_thread_info)
                    .with_thread_names(config.display_thread_info)
                    .with_span_events(if config.enable_spans {
                        tracing_subscriber::fmt::format::FmtSpan::ACTIVE
                    } else {
                        tracing_subscriber::fmt::format::FmtSpan::NONE
                    })
                    .with_writer(io::stdout),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(config.enable_spans)
                    .with_span_list(config.enable_spans)
                    .with_target(config.display_target)
                    .with_thread_ids(config.display_thread_info)
                    .with_thread_names(config.display_thread_info)
                    .with_writer(io::stdout),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(config.display_target)
                    .with_thread_ids(config.display_thread_info)
                    .with_thread_names(config.display_thread_info)
                    .with_writer(io::stdout),
            )
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let filter_string = match &config.filter {
        Some(custom_filter) => custom_filter.clone(),
        None => {
            // Our crates at the configured level, dependencies at warn
            let level = level_directive(config.level);
            let mut directives: Vec<String> = WORKSPACE_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, level))
                .collect();
            directives.extend(["h2=warn", "hyper=warn", "reqwest=warn"].map(String::from));
            directives.join(",")
        }
    };

    EnvFilter::try_new(filter_string)
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

/// Layer that forwards events to a `LoggerSink` implementation.
struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact: bool,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>, redact: bool) -> Self {
        Self { sink, redact }
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        let metadata = event.metadata();
        let level = tracing_level_to_log_level(*metadata.level());

        if level < sink.min_level() {
            return;
        }

        let mut visitor = SinkVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .unwrap_or_else(|| metadata.name().to_string());

        let mut entry = LogEntry::new(level, metadata.target(), message);

        for (key, value) in visitor.fields {
            let value = if self.redact {
                redact_if_sensitive(&key, &value)
            } else {
                value
            };
            entry = entry.with_field(key, value);
        }

        if let Some(span) = ctx.lookup_current() {
            entry = entry.with_span_id(span.name());
        }

        let sink = Arc::clone(sink);

        // Inside a runtime the sink call must not block a worker thread.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = sink.log(entry).await {
                    eprintln!("LoggerSink error: {}", err);
                }
            });
            return;
        }

        if let Err(err) = futures::executor::block_on(sink.log(entry)) {
            eprintln!("LoggerSink error: {}", err);
        }
    }
}

#[derive(Default)]
struct SinkVisitor {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl SinkVisitor {
    fn record_value(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for SinkVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_value(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, format!("{:?}", value));
    }
}

fn tracing_level_to_log_level(level: tracing::Level) -> LogLevel {
    match level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

/// Redact field values whose name marks them as secret.
///
/// Also strips an `api_key=` query parameter out of URLs, since request URLs
/// to the scrobbling service carry the key inline.
///
/// ```ignore
/// use tracing::debug;
/// use core_runtime::logging::redact_if_sensitive;
///
/// debug!(url = %redact_if_sensitive("url", &url), "Requesting chart");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const SENSITIVE_FIELDS: &[&str] = &[
        "token",
        "password",
        "secret",
        "api_key",
        "apikey",
        "authorization",
    ];

    let field_lower = field_name.to_lowercase();
    if SENSITIVE_FIELDS.iter().any(|&f| field_lower.contains(f)) {
        return "[REDACTED]".to_string();
    }

    match value.find("api_key=") {
        Some(start) => {
            let key_start = start + "api_key=".len();
            let key_end = value[key_start..]
                .find('&')
                .map(|offset| key_start + offset)
                .unwrap_or(value.len());
            format!("{}[REDACTED]{}", &value[..key_start], &value[key_end..])
        }
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as SinkResult;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Debug)
            .with_redaction(false)
            .with_filter("core_charts=trace")
            .with_spans(false)
            .with_thread_info(true);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.redact_sensitive);
        assert_eq!(config.filter, Some("core_charts=trace".to_string()));
        assert!(!config.enable_spans);
        assert!(config.display_target);
        assert!(config.display_thread_info);
    }

    #[test]
    fn test_redact_if_sensitive() {
        assert_eq!(redact_if_sensitive("api_key", "abc123"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("password", "pass"), "[REDACTED]");

        assert_eq!(
            redact_if_sensitive(
                "url",
                "https://ws.audioscrobbler.com/2.0/?method=user.getinfo&api_key=abc123&user=rj"
            ),
            "https://ws.audioscrobbler.com/2.0/?method=user.getinfo&api_key=[REDACTED]&user=rj"
        );
        assert_eq!(
            redact_if_sensitive("url", "https://x/?api_key=abc123"),
            "https://x/?api_key=[REDACTED]"
        );

        assert_eq!(redact_if_sensitive("user_name", "rj"), "rj");
    }

    #[test]
    fn test_default_format() {
        #[cfg(debug_assertions)]
        assert_eq!(LogFormat::default(), LogFormat::Pretty);

        #[cfg(not(debug_assertions))]
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }

    #[test]
    fn test_build_filter_names_workspace_crates() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let filter = build_filter(&config).unwrap().to_string();
        assert!(filter.contains("core_charts=debug"));
        assert!(filter.contains("core_favorites=debug"));
        assert!(filter.contains("reqwest=warn"));
    }

    #[test]
    fn test_build_custom_filter() {
        let config = LoggingConfig::default().with_filter("core_charts=trace,core_service=debug");
        let filter = build_filter(&config).unwrap();
        assert!(filter.to_string().contains("core_charts=trace"));
    }

    #[test]
    fn test_logger_sink_layer_forwards_event() {
        let sink = Arc::new(TestLoggerSink::default());
        let trait_sink: Arc<dyn LoggerSink> = sink.clone();
        let layer = LoggerSinkLayer::new(Some(trait_sink), true);
        let subscriber = tracing_subscriber::registry().with(layer);
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!(target: "test.target", user = "rj", api_key = "abc", "hello world");

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.target, "test.target");
        assert_eq!(entry.message, "hello world");
        assert_eq!(entry.fields.get("user"), Some(&"rj".to_string()));
        assert_eq!(entry.fields.get("api_key"), Some(&"[REDACTED]".to_string()));
    }

    #[derive(Default)]
    struct TestLoggerSink {
        entries: Mutex<Vec<LogEntry>>,
    }

    #[async_trait]
    impl LoggerSink for TestLoggerSink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()> {
            let mut entries = self.entries.lock().unwrap();
            entries.push(entry);
            Ok(())
        }

        fn min_level(&self) -> LogLevel {
            LogLevel::Trace
        }
    }
}
