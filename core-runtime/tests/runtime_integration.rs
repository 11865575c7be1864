//! Integration tests for logging, configuration and the event bus

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::config::{ChartSettings, LastFmApiConfig};
use core_runtime::events::{ChartEvent, CoreEvent, EventBus, EventStream, FavoritesEvent};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CapturingSink {
    async fn log(&self, entry: LogEntry) -> BridgeResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

// The global subscriber can only be installed once per process, so every
// assertion that depends on it lives in this single test.
#[test]
fn test_init_logging_forwards_workspace_events_once() {
    let sink = Arc::new(CapturingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Info)
        .with_logger_sink(sink.clone());

    init_logging(config.clone()).unwrap();

    tracing::info!(target: "core_charts", user_name = "rj", api_key = "abc", "Chart loaded");
    tracing::debug!(target: "core_charts", "below the configured level");
    tracing::info!(target: "some_dependency", "not one of ours");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Chart loaded");
        assert_eq!(entries[0].fields.get("user_name"), Some(&"rj".to_string()));
        assert_eq!(
            entries[0].fields.get("api_key"),
            Some(&"[REDACTED]".to_string())
        );
    }

    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}

#[test]
fn test_redaction_of_request_urls() {
    let url = "https://ws.audioscrobbler.com/2.0/?method=user.getweeklychartlist&user=rj&api_key=k3y&format=json";
    let redacted = redact_if_sensitive("url", url);
    assert!(!redacted.contains("k3y"));
    assert!(redacted.contains("user=rj"));
    assert!(redacted.ends_with("&format=json"));
}

#[test]
fn test_default_settings_are_valid() {
    assert!(ChartSettings::default().validate().is_ok());
    assert!(LastFmApiConfig::new("a-real-looking-key").validate().is_ok());
}

#[tokio::test]
async fn test_event_bus_carries_both_domains() {
    let bus = EventBus::default();
    let mut charts = EventStream::new(bus.subscribe())
        .filter(|event| matches!(event, CoreEvent::Chart(_)));
    let mut favorites = EventStream::new(bus.subscribe())
        .filter(|event| matches!(event, CoreEvent::Favorites(_)));

    bus.emit(CoreEvent::Favorites(FavoritesEvent::UserRemoved {
        user_name: "ctrott".to_string(),
        index: 1,
    }))
    .unwrap();
    bus.emit(CoreEvent::Chart(ChartEvent::CacheInvalidated {
        user_name: "ctrott".to_string(),
    }))
    .unwrap();

    assert_eq!(
        charts.recv().await.unwrap(),
        CoreEvent::Chart(ChartEvent::CacheInvalidated {
            user_name: "ctrott".to_string()
        })
    );
    assert!(matches!(
        favorites.recv().await.unwrap(),
        CoreEvent::Favorites(FavoritesEvent::UserRemoved { index: 1, .. })
    ));
}
