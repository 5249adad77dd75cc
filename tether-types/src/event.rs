//! Model lifecycle events.
//!
//! A model fires one of these to every registered observer whenever its
//! state transitions. Library events are the named variants; applications
//! can fire their own through [`ModelEvent::Custom`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// An event fired by a model to its observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", content = "code", rename_all = "snake_case")]
pub enum ModelEvent {
    /// The current values became the new sync baseline.
    Sync,
    /// Values were reset to the defaults.
    Clear,
    /// A save request succeeded and the response was adopted.
    Saved,
    /// A fetch request succeeded and the response was adopted.
    Fetched,
    /// A delete request succeeded. The model is now terminal.
    Deleted,
    /// Values were restored from the sync baseline.
    Rollback,
    /// Application-defined event.
    Custom(u32),
}

impl ModelEvent {
    /// Whether this event is one the library itself fires.
    #[must_use]
    pub fn is_library_event(&self) -> bool {
        !matches!(self, ModelEvent::Custom(_))
    }

    /// Stable name of the event, suitable for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ModelEvent::Sync => "MODEL_SYNC",
            ModelEvent::Clear => "MODEL_CLEAR",
            ModelEvent::Saved => "MODEL_SAVED",
            ModelEvent::Fetched => "MODEL_FETCHED",
            ModelEvent::Deleted => "MODEL_DELETED",
            ModelEvent::Rollback => "MODEL_ROLLBACK",
            ModelEvent::Custom(_) => "MODEL_CUSTOM",
        }
    }
}

impl fmt::Display for ModelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelEvent::Custom(code) => write!(f, "{}({code})", self.name()),
            other => f.write_str(other.name()),
        }
    }
}
