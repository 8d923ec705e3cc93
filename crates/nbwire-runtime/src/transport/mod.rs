#![forbid(unsafe_code)]

//! Transport abstraction between a widget and its views.
//!
//! The runtime only needs two operations from a host: push
//! `(widget_id, name, value)` to every view of a widget, and deliver
//! `(name, value)` from any view to that widget's handler. Both are
//! fire-and-forget and FIFO per widget.
//!
//! Implementations:
//!
//! - [`BroadcastTransport`]: push channel per widget plus a named kernel
//!   callback for view-to-backend calls.
//! - [`CommTransport`]: per-widget duplex connections opened by the views,
//!   with a handshake and a queue for messages sent before any connection is
//!   ready.
//! - [`DetachedTransport`]: no host; warns once and drops everything.
//!
//! The host integration layer picks one and hands it to each widget.

pub mod broadcast;
pub mod comm;
pub mod detached;

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::HostKind;
use crate::error::RuntimeError;

pub use broadcast::{BroadcastHost, BroadcastTransport};
pub use comm::{Comm, CommEndpoint, CommHost, CommTransport, ConnectionState};
pub use detached::DetachedTransport;

/// Reserved payload sent on connection open to confirm readiness.
pub const HANDSHAKE: &str = "ok";

static NEXT_WIDGET_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique widget identifier, stable for the widget's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(u64);

impl WidgetId {
    /// Allocate a fresh identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_WIDGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A backend-to-view property notification.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    pub id: WidgetId,
    pub name: String,
    pub value: Value,
}

impl Outbound {
    /// Wire form: the ordered triple `[id, name, value]`.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!([self.id.get(), self.name, self.value])
    }

    /// Parse the wire triple.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Wire`] if the payload is not `[id, name, value]`.
    pub fn from_wire(payload: &Value) -> Result<Self, RuntimeError> {
        match payload.as_array().map(Vec::as_slice) {
            Some([id, Value::String(name), value]) => {
                let id = id
                    .as_u64()
                    .ok_or_else(|| RuntimeError::Wire(format!("bad widget id {id}")))?;
                Ok(Self {
                    id: WidgetId(id),
                    name: name.clone(),
                    value: value.clone(),
                })
            }
            _ => Err(RuntimeError::Wire(format!(
                "expected [id, name, value], got {payload}"
            ))),
        }
    }
}

/// A view-to-backend set request.
#[derive(Clone, Debug, PartialEq)]
pub struct Inbound {
    pub name: String,
    pub value: Value,
}

impl Inbound {
    /// Parse call arguments `[name]` or `[name, value]`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Wire`] if the first argument is not a string or there
    /// are too many arguments.
    pub fn from_args(args: &[Value]) -> Result<Self, RuntimeError> {
        match args {
            [Value::String(name)] => Ok(Self {
                name: name.clone(),
                value: Value::Null,
            }),
            [Value::String(name), value] => Ok(Self {
                name: name.clone(),
                value: value.clone(),
            }),
            _ => Err(RuntimeError::Wire(format!(
                "expected [name, value], got {} argument(s)",
                args.len()
            ))),
        }
    }

    /// Parse a wire payload holding the argument array.
    ///
    /// # Errors
    ///
    /// See [`from_args`](Self::from_args).
    pub fn from_wire(payload: &Value) -> Result<Self, RuntimeError> {
        match payload {
            Value::Array(args) => Self::from_args(args),
            other => Err(RuntimeError::Wire(format!("expected an array, got {other}"))),
        }
    }
}

/// Callback receiving view-originated messages for one widget.
pub type ReceiveHandler = Rc<dyn Fn(Inbound)>;

/// Channel between widgets and their views.
pub trait Transport {
    /// Which host substrate this transport speaks.
    fn kind(&self) -> HostKind;

    /// Send a notification to every live view of `message.id`. Never blocks.
    fn send(&self, message: Outbound);

    /// Route view-originated messages for `id` to `handler`.
    fn on_receive(&self, id: WidgetId, handler: ReceiveHandler);

    /// A view of `id` has been rendered and may start connecting.
    fn view_rendered(&self, _id: WidgetId) {}

    /// Widget `id` is gone: release its handler and anything still queued.
    fn forget(&self, _id: WidgetId) {}

    /// View-side script defining `nbwireRecv(id, fn)` and
    /// `nbwireSend(id, name, value)`.
    fn view_script(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widget_ids_are_unique() {
        let a = WidgetId::next();
        let b = WidgetId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn outbound_wire_triple() {
        let msg = Outbound {
            id: WidgetId(7),
            name: "value".into(),
            value: json!({"x": 1}),
        };
        let wire = msg.to_wire();
        assert_eq!(wire, json!([7, "value", {"x": 1}]));
        assert_eq!(Outbound::from_wire(&wire).unwrap(), msg);
    }

    #[test]
    fn outbound_rejects_bad_shapes() {
        assert!(Outbound::from_wire(&json!("ok")).is_err());
        assert!(Outbound::from_wire(&json!([-1, "v", 0])).is_err());
        assert!(Outbound::from_wire(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn inbound_args() {
        assert_eq!(
            Inbound::from_args(&[json!("click")]).unwrap(),
            Inbound {
                name: "click".into(),
                value: Value::Null
            }
        );
        assert_eq!(
            Inbound::from_wire(&json!(["value", 3])).unwrap().value,
            json!(3)
        );
        assert!(Inbound::from_args(&[]).is_err());
        assert!(Inbound::from_wire(&json!({"name": "v"})).is_err());
        assert!(Inbound::from_args(&[json!("a"), json!(1), json!(2)]).is_err());
    }
}
