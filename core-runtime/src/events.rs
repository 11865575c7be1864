//! # Event Bus System
//!
//! Typed events published by the chart pipeline and the favorites store over
//! a `tokio::sync::broadcast` channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   emit   ┌───────────┐
//! │ ChartOrchestrator├─────────>│           │   subscribe   ┌────────────┐
//! └──────────────────┘          │ EventBus  ├──────────────>│ Subscriber │
//! ┌──────────────────┐   emit   │ (broadcast│               └────────────┘
//! │ FavoritesStore   ├─────────>│  channel) │
//! └──────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ChartEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Chart(ChartEvent::CacheInvalidated {
//!         user_name: "rj".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Chart(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal.
//! - **`RecvError::Closed`**: every sender is gone; treat it as shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore; a UI
//! that is not listening is not a failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Weekly chart pipeline events
    Chart(ChartEvent),
    /// Favorites list and preference events
    Favorites(FavoritesEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Chart(e) => e.description(),
            CoreEvent::Favorites(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Chart(ChartEvent::ChartFailed { .. }) => EventSeverity::Error,
            CoreEvent::Chart(ChartEvent::ChartLoaded {
                partial_failures, ..
            }) if *partial_failures > 0 => EventSeverity::Warning,
            CoreEvent::Chart(ChartEvent::ChartLoaded { .. }) => EventSeverity::Info,
            CoreEvent::Favorites(FavoritesEvent::Loaded { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Chart Events
// ============================================================================

/// Outcomes of weekly chart loads.
///
/// Periods are carried as unix seconds so subscribers do not need the chart
/// model types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ChartEvent {
    /// A user's list of reporting periods was fetched from the service.
    PeriodListRefreshed { user_name: String, period_count: usize },
    /// A chart page was produced.
    ChartLoaded {
        user_name: String,
        period_from: i64,
        period_to: i64,
        entry_count: usize,
        /// Entries whose artwork lookup failed
        partial_failures: usize,
        from_cache: bool,
    },
    /// No chart exists for the requested offset.
    ChartEmpty { user_name: String, reason: String },
    /// A stage that aborts the pipeline failed.
    ChartFailed {
        user_name: String,
        stage: String,
        message: String,
    },
    /// The caller cancelled before a result was available.
    ChartCancelled { user_name: String },
    /// Cached periods and pages for a user were dropped.
    CacheInvalidated { user_name: String },
    /// A background load put the chart for an adjacent year in the cache.
    ChartPrecached {
        user_name: String,
        period_from: i64,
        period_to: i64,
    },
}

impl ChartEvent {
    fn description(&self) -> &str {
        match self {
            ChartEvent::PeriodListRefreshed { .. } => "Chart periods refreshed",
            ChartEvent::ChartLoaded { .. } => "Weekly chart loaded",
            ChartEvent::ChartEmpty { .. } => "No weekly chart for that year",
            ChartEvent::ChartFailed { .. } => "Weekly chart failed to load",
            ChartEvent::ChartCancelled { .. } => "Weekly chart load cancelled",
            ChartEvent::CacheInvalidated { .. } => "Chart cache invalidated",
            ChartEvent::ChartPrecached { .. } => "Weekly chart precached",
        }
    }
}

// ============================================================================
// Favorites Events
// ============================================================================

/// Changes to the curated favorites list and the stored preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum FavoritesEvent {
    /// Persisted favorites were loaded into memory.
    Loaded { count: usize },
    UserAdded { user_name: String, index: usize },
    UserRemoved { user_name: String, index: usize },
    UserReplaced {
        index: usize,
        old_user_name: String,
        new_user_name: String,
    },
    UserMoved {
        user_name: String,
        from: usize,
        to: usize,
    },
    PreferencesChanged {
        current_user: Option<String>,
        min_play_count: u32,
    },
}

impl FavoritesEvent {
    fn description(&self) -> &str {
        match self {
            FavoritesEvent::Loaded { .. } => "Favorites loaded",
            FavoritesEvent::UserAdded { .. } => "Favorite added",
            FavoritesEvent::UserRemoved { .. } => "Favorite removed",
            FavoritesEvent::UserReplaced { .. } => "Favorite replaced",
            FavoritesEvent::UserMoved { .. } => "Favorite moved",
            FavoritesEvent::PreferencesChanged { .. } => "Preferences changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus clones the sender; every clone publishes to the same
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` that skips events failing a filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let favorites_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Favorites(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(user_name: &str, partial_failures: usize) -> CoreEvent {
        CoreEvent::Chart(ChartEvent::ChartLoaded {
            user_name: user_name.to_string(),
            period_from: 1_104_580_800,
            period_to: 1_105_185_600,
            entry_count: 10,
            partial_failures,
            from_cache: false,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(loaded("rj", 0)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Favorites(FavoritesEvent::UserAdded {
            user_name: "ctrott".to_string(),
            index: 0,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Favorites(_)));

        bus.emit(loaded("rj", 0)).unwrap();
        bus.emit(CoreEvent::Favorites(FavoritesEvent::Loaded { count: 3 }))
            .unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(event, CoreEvent::Favorites(FavoritesEvent::Loaded { count: 3 }));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for _ in 0..5 {
            bus.emit(loaded("rj", 0)).unwrap();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
        assert!(sub.recv().await.is_ok());
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(loaded("rj", 0).severity(), EventSeverity::Info);
        assert_eq!(loaded("rj", 2).severity(), EventSeverity::Warning);

        let failed = CoreEvent::Chart(ChartEvent::ChartFailed {
            user_name: "rj".to_string(),
            stage: "chart".to_string(),
            message: "timed out".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let moved = CoreEvent::Favorites(FavoritesEvent::UserMoved {
            user_name: "a".to_string(),
            from: 0,
            to: 2,
        });
        assert_eq!(moved.severity(), EventSeverity::Debug);
        assert_eq!(moved.description(), "Favorite moved");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Chart(ChartEvent::CacheInvalidated {
            user_name: "rj".to_string(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"Chart""#));
        assert!(json.contains(r#""event":"CacheInvalidated""#));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
