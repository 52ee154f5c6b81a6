//! CardOnCue geofence rotation core.
//!
//! Platforms only let an app watch a small number of geographic regions at
//! once (20 on iOS). This crate keeps the most relevant of a user's saved
//! places inside that budget as the user moves around:
//!
//! - [`refresh`] decides *when* to recompute (distance, time and visit hysteresis)
//! - [`selector`] decides *what* to watch (owned-card priority tier, then nearest first)
//! - [`monitor`] applies the result without ever exceeding the budget
//! - [`ranking`] optionally delegates the ranking to a backend service
//! - [`coordinator`] runs it all as a single-owner async task
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cardoncue::{
//!     ChannelLocationSource, GeofenceConfig, GeofenceCoordinator, InMemoryLocationStore,
//!     InMemoryRegionMonitor,
//! };
//!
//! let store = Arc::new(InMemoryLocationStore::from_json_reader(file)?);
//! let monitor = Arc::new(InMemoryRegionMonitor::new(20));
//! let source = Arc::new(ChannelLocationSource::new());
//!
//! let coordinator =
//!     GeofenceCoordinator::builder(GeofenceConfig::default(), store, monitor, source.clone())
//!         .spawn();
//! coordinator.start().await?;
//! source.publish_position(47.6062, -122.3321, 25.0);
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod config;
pub mod coordinator;
pub mod geo;
pub mod location;
pub mod logging;
pub mod monitor;
pub mod ranking;
pub mod refresh;
pub mod selector;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Boxed future type for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use coordinator::{
    CoordinatorError, CoordinatorPhase, CoordinatorStatus, GeofenceConfig, GeofenceCoordinator,
    RefreshOutcome, RefreshReport,
};
pub use geo::GeoPoint;
pub use location::{
    ChannelLocationSource, InMemoryLocationStore, LocationEvent, LocationOfInterest,
    LocationSource, LocationStore, MonitoredRegion, RegionEvent, RegionEventKind,
};
pub use monitor::{CapacityLimitedMonitor, InMemoryRegionMonitor, MonitorError, RegionMonitor};
pub use ranking::{HttpRankingClient, RankedRegion, RankingError, RegionRankingClient};
pub use refresh::{RefreshPolicy, RefreshState, RefreshTrigger};
pub use selector::{RegionSelector, Selection};
