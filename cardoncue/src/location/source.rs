//! Location source abstraction.
//!
//! Platform position services report through callbacks on arbitrary threads.
//! Here they are modelled as a stream of [`LocationEvent`] messages pushed
//! into an unbounded channel owned by the coordinator, so the coordinator's
//! reaction to each event is a plain dispatch inside its own task.
//!
//! Authorization is a precondition: a source is only subscribed once the
//! platform has granted location access.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::geo::GeoPoint;

/// A single report from the platform location service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocationEvent {
    /// Coarse position fix.
    PositionUpdate {
        latitude: f64,
        longitude: f64,
        /// Horizontal accuracy in meters. Negative means the fix is invalid.
        #[serde(default)]
        accuracy_meters: f64,
    },

    /// Stationary dwell detected at a place.
    VisitDetected { latitude: f64, longitude: f64 },

    /// Entered a monitored region.
    RegionEntered { region_id: String },

    /// Left a monitored region.
    RegionExited { region_id: String },

    /// Platform stopped monitoring a region.
    MonitoringFailed { region_id: String, error: String },
}

impl LocationEvent {
    /// Position carried by this event, if any.
    pub fn position(&self) -> Option<GeoPoint> {
        match self {
            LocationEvent::PositionUpdate {
                latitude,
                longitude,
                ..
            }
            | LocationEvent::VisitDetected {
                latitude,
                longitude,
            } => Some(GeoPoint::new(*latitude, *longitude)),
            _ => None,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            LocationEvent::PositionUpdate { .. } => "position",
            LocationEvent::VisitDetected { .. } => "visit",
            LocationEvent::RegionEntered { .. } => "enter",
            LocationEvent::RegionExited { .. } => "exit",
            LocationEvent::MonitoringFailed { .. } => "monitoring-failed",
        }
    }
}

/// Sender half handed to a [`LocationSource`] on subscription.
pub type LocationEventSender = mpsc::UnboundedSender<LocationEvent>;

/// Platform position-reporting primitive.
pub trait LocationSource: Send + Sync {
    /// Start delivering events to `sink`. Replaces any previous subscription.
    fn subscribe(&self, sink: LocationEventSender);

    /// Stop delivering events.
    fn unsubscribe(&self);
}

/// In-process [`LocationSource`] that forwards whatever is published to it.
///
/// Platform glue (or a test, or the replay CLI) calls [`publish`](Self::publish)
/// from any thread; events are dropped while nobody is subscribed.
#[derive(Debug, Default)]
pub struct ChannelLocationSource {
    sink: Mutex<Option<LocationEventSender>>,
}

impl ChannelLocationSource {
    /// Create an unsubscribed source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event. Returns `false` if nobody is subscribed.
    pub fn publish(&self, event: LocationEvent) -> bool {
        let mut sink = self.sink.lock();
        match sink.as_ref() {
            Some(tx) => {
                if tx.send(event).is_ok() {
                    true
                } else {
                    // Receiver is gone; forget it
                    *sink = None;
                    false
                }
            }
            None => {
                tracing::trace!(event = event.name(), "No subscriber, dropping location event");
                false
            }
        }
    }

    /// Convenience for publishing a position update.
    pub fn publish_position(&self, latitude: f64, longitude: f64, accuracy_meters: f64) -> bool {
        self.publish(LocationEvent::PositionUpdate {
            latitude,
            longitude,
            accuracy_meters,
        })
    }

    /// Returns `true` while a subscriber is attached.
    pub fn is_subscribed(&self) -> bool {
        self.sink
            .lock()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }
}

impl LocationSource for ChannelLocationSource {
    fn subscribe(&self, sink: LocationEventSender) {
        *self.sink.lock() = Some(sink);
    }

    fn unsubscribe(&self) {
        *self.sink.lock() = None;
    }
}
