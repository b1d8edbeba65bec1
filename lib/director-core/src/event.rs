//! Lifecycle events delivered by the resource event source

use director_api::TrafficDirector;
use std::fmt;

/// Type of a lifecycle event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A TrafficDirector lifecycle event
#[derive(Clone, Debug)]
pub enum ResourceEvent {
    Created(TrafficDirector),
    Updated(TrafficDirector),
    Deleted(TrafficDirector),
}

impl ResourceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ResourceEvent::Created(_) => EventKind::Created,
            ResourceEvent::Updated(_) => EventKind::Updated,
            ResourceEvent::Deleted(_) => EventKind::Deleted,
        }
    }

    pub fn object(&self) -> &TrafficDirector {
        match self {
            ResourceEvent::Created(td) | ResourceEvent::Updated(td) | ResourceEvent::Deleted(td) => td,
        }
    }
}
