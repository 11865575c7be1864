//! # Weekly Chart Pipeline
//!
//! Answers "what was I listening to this week, N years ago?" for a Last.fm
//! user.
//!
//! ## Modules
//!
//! - [`gateway`] - [`ChartGateway`] trait and the Last.fm implementation
//! - [`period`] - Picks the reporting period for a year offset
//! - [`orchestrator`] - Runs a chart load: fetch, enrich, filter, cache
//! - [`cache`] - Period lists and enriched pages for the process lifetime
//! - [`coalesce`] - Shares one in-flight request between identical callers
//! - [`models`], [`page`] - Value types handed to the UI
//!
//! ## Example
//!
//! ```ignore
//! use core_charts::{ChartCache, ChartOrchestrator, LastFmGateway};
//!
//! let gateway = Arc::new(LastFmGateway::new(config.http_client.clone(), config.lastfm.clone()));
//! let orchestrator = ChartOrchestrator::new(
//!     gateway,
//!     Arc::new(ChartCache::new()),
//!     config.clock.clone(),
//!     events,
//!     &config.charts,
//! );
//! let result = orchestrator.get_chart("rj", 1, 1, &CancellationToken::new()).await;
//! ```

pub mod cache;
pub mod coalesce;
pub mod error;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod page;
pub mod period;

pub use cache::{CachedChart, ChartCache};
pub use error::{ChartError, ChartFailure, FetchStage, Result, ServiceError};
pub use gateway::{ChartGateway, LastFmGateway, DEFAULT_FRIENDS_LIMIT};
pub use models::{Album, Artist, ChartEntry, ChartPeriod, PeriodKey, User, WeekInfo, YearRange};
pub use orchestrator::ChartOrchestrator;
pub use page::{ChartPage, ChartResult, EmptyReason, PartialFailure};
pub use period::select_period;
pub use tokio_util::sync::CancellationToken;
