//! Saved locations, monitored regions and the location event stream.
//!
//! # Ownership
//!
//! ```text
//! LocationStore (external) ──snapshot──► RegionSelector
//!        ▲                                     │
//!        └── active flags / last entry ── GeofenceCoordinator
//!                                              ▲
//! LocationSource (platform) ──LocationEvent────┘
//! ```

mod model;
mod source;
mod store;

pub use model::{
    LocationOfInterest, MonitoredRegion, RegionEvent, RegionEventKind, DEFAULT_RADIUS_METERS,
};
pub(crate) use model::sanitize_radius;
pub use source::{ChannelLocationSource, LocationEvent, LocationEventSender, LocationSource};
pub use store::{InMemoryLocationStore, LocationStore};
