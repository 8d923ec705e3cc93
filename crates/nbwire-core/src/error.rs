#![forbid(unsafe_code)]

//! Error taxonomy for the binding core.
//!
//! | Failure | Cause | Surfaced as |
//! |---------|-------|-------------|
//! | Cyclic bind | `a.bind(b)` where `a` is an ancestor of `b` | [`Error::Cycle`] |
//! | Value on a trigger | plain value assigned to a bare [`Trigger`](crate::Trigger) | [`Error::ValueOnTrigger`] |
//! | Trigger on a property | property bound to a non-property trigger | [`Error::TriggerOnProperty`] |
//! | Lookup | `prop(name)` on something that is not a trigger | [`Error::NotBound`] |
//! | Listener fault | a callback returned an error | [`Error::Listener`] |
//!
//! Binding and lookup errors are synchronous and leave state untouched.
//! Listener faults are reported after the value has already been committed.

use std::any::Any;
use std::fmt;

/// Error type returned by listener callbacks.
pub type Fault = Box<dyn std::error::Error + 'static>;

/// Result alias used across the binding core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from binding, lookup, and notification.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding would make a trigger its own ancestor.
    #[error("bound properties should not form a loop (binding '{name}')")]
    Cycle { name: String },

    /// A plain value was assigned to a trigger that holds no value.
    #[error("only properties can be set to a value (trigger '{name}')")]
    ValueOnTrigger { name: String },

    /// A property was bound to a trigger that is not a property.
    #[error("cannot set property '{name}' to a plain trigger")]
    TriggerOnProperty { name: String },

    /// The member is absent or not data-bound.
    #[error("'{name}' not a property or trigger but {found}")]
    NotBound { name: String, found: &'static str },

    /// The member holds a trigger, which has no value to read.
    #[error("'{name}' is a trigger and holds no value")]
    NoValue { name: String },

    /// The trigger already belongs to a model.
    #[error("trigger is already installed as '{existing}'")]
    AlreadyInstalled { existing: String },

    /// A property's coercion hook rejected the incoming value.
    #[error("property '{name}' rejected value: {message}")]
    Coerce { name: String, message: String },

    /// A stored value could not be decoded into the requested type.
    #[error("property '{name}' could not be decoded")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// One or more listeners failed during notification.
    #[error("{} listener fault(s) while notifying", .0.len())]
    Listener(Vec<ListenerFault>),
}

impl Error {
    /// Whether this is a structural binding error.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Cycle { .. } | Self::ValueOnTrigger { .. } | Self::TriggerOnProperty { .. }
        )
    }

    /// Split into listener faults, wrapping any other error as a single fault.
    #[must_use]
    pub fn into_faults(self, trigger: Option<&str>) -> Vec<ListenerFault> {
        match self {
            Self::Listener(faults) => faults,
            other => vec![ListenerFault::from_error(trigger, &other)],
        }
    }
}

/// A captured failure from one listener invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFault {
    /// Name of the notifying trigger, if it was installed in a model.
    pub trigger: Option<String>,
    /// Error message including its source chain.
    pub message: String,
    /// Whether the fault came from a panic rather than a returned error.
    pub panicked: bool,
}

impl ListenerFault {
    /// Build a fault from any error, flattening its source chain.
    pub fn from_error(trigger: Option<&str>, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str("\ncaused by: ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            trigger: trigger.map(str::to_owned),
            message,
            panicked: false,
        }
    }

    /// Build a fault from a caught panic payload.
    #[must_use]
    pub fn from_panic(trigger: Option<&str>, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "listener panicked".to_owned()
        };
        Self {
            trigger: trigger.map(str::to_owned),
            message,
            panicked: true,
        }
    }

    /// Convert a listener's returned fault, flattening nested notification
    /// faults from child triggers.
    pub(crate) fn collect(trigger: Option<&str>, fault: Fault, out: &mut Vec<Self>) {
        match fault.downcast::<Error>() {
            Ok(err) => match *err {
                Error::Listener(nested) => out.extend(nested),
                other => out.push(Self::from_error(trigger, &other)),
            },
            Err(fault) => out.push(Self::from_error(trigger, fault.as_ref())),
        }
    }
}

impl fmt::Display for ListenerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.panicked { "panic" } else { "error" };
        match &self.trigger {
            Some(name) => write!(f, "{kind} in listener for '{name}': {}", self.message),
            None => write!(f, "{kind} in listener: {}", self.message),
        }
    }
}
