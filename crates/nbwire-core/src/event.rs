#![forbid(unsafe_code)]

//! Notification payloads.

use std::fmt;

use serde_json::Value;

use crate::model::{Model, ModelRef};

/// The value delivered to listeners, tagged with the notifying member.
///
/// Events never nest: building an event from another event (via
/// `From<Event> for Value`) takes the inner value.
#[derive(Clone)]
pub struct Event {
    value: Value,
    name: Option<String>,
    target: Option<ModelRef>,
}

impl Event {
    /// Create an event carrying `value`.
    pub fn new(value: impl Into<Value>, name: Option<&str>, target: Option<ModelRef>) -> Self {
        Self {
            value: value.into(),
            name: name.map(str::to_owned),
            target,
        }
    }

    /// Create an event with no name or target.
    pub fn detached(value: impl Into<Value>) -> Self {
        Self::new(value, None, None)
    }

    /// The notified value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Name of the notifying trigger within its model.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The owning model, if it is still alive.
    #[must_use]
    pub fn target(&self) -> Option<Model> {
        self.target.as_ref().and_then(ModelRef::upgrade)
    }

    /// Whether the event was raised by a member of `model`.
    #[must_use]
    pub fn is_from(&self, model: &Model) -> bool {
        self.target.as_ref().is_some_and(|t| t.points_to(model))
    }

    /// Consume the event, yielding its value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }
}

impl From<Event> for Value {
    fn from(event: Event) -> Self {
        event.value
    }
}

impl From<&Event> for Value {
    fn from(event: &Event) -> Self {
        event.value.clone()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({}, {:?})", self.value, self.name)
    }
}
