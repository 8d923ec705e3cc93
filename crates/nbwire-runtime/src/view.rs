#![forbid(unsafe_code)]

//! View-side model mirror.
//!
//! [`ViewModel`] is the Rust counterpart of the `Model` class every rendered
//! view runs: a cache of property values seeded from the render snapshot,
//! kept current by backend notifications, plus calls back into the backend.
//! Test harnesses and non-browser views use it to play the view's part of the
//! protocol.
//!
//! # Coalescing
//!
//! [`ViewModel::set_soon`] keeps at most one request per name in flight. A
//! value arriving while one is pending replaces the pending value; the
//! backend's echo for the in-flight request releases the latest pending value.
//! This bookkeeping is per view and independent of any transport-level
//! handshake queue: a request sent before the connection is ready still
//! counts as in flight, and its echo arrives after the handshake like any
//! other notification.
//!
//! Unlike the backend, `off(names, None)` here clears every listener on the
//! named entries.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::{trace, warn};

use nbwire_core::{Event, Listener};

use crate::error::RuntimeError;
use crate::transport::{HANDSHAKE, Inbound, Outbound, WidgetId};

type Sender = Box<dyn Fn(Inbound)>;

/// One view's mirror of a widget model.
pub struct ViewModel {
    id: WidgetId,
    data: RefCell<Map<String, Value>>,
    listeners: RefCell<HashMap<String, Vec<Listener>>>,
    pending: RefCell<HashMap<String, Option<Value>>>,
    ready: Cell<bool>,
    sender: Sender,
}

impl fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModel")
            .field("id", &self.id)
            .field("data", &self.data.borrow())
            .field("pending", &self.pending.borrow())
            .field("ready", &self.ready.get())
            .finish_non_exhaustive()
    }
}

impl ViewModel {
    /// Mirror widget `id`, seeded with `init`; requests go through `sender`.
    pub fn new(id: WidgetId, init: Map<String, Value>, sender: impl Fn(Inbound) + 'static) -> Self {
        Self {
            id,
            data: RefCell::new(init),
            listeners: RefCell::new(HashMap::new()),
            pending: RefCell::new(HashMap::new()),
            ready: Cell::new(false),
            sender: Box::new(sender),
        }
    }

    #[must_use]
    pub fn id(&self) -> WidgetId {
        self.id
    }

    /// Last value received (or seeded) for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.data.borrow().get(name).cloned()
    }

    /// Whether the handshake has been seen.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    /// Whether a coalesced request for `name` is in flight.
    #[must_use]
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.borrow().contains_key(name)
    }

    /// Send a raw update request.
    pub fn trigger(&self, name: &str, value: impl Into<Value>) {
        (self.sender)(Inbound {
            name: name.to_owned(),
            value: value.into(),
        });
    }

    /// Send an update request now, abandoning any coalesced one for `name`.
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        self.pending.borrow_mut().remove(name);
        self.trigger(name, value);
    }

    /// Send an update request, coalescing with one already in flight.
    pub fn set_soon(&self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        let mut pending = self.pending.borrow_mut();
        if let Some(slot) = pending.get_mut(name) {
            trace!(widget = %self.id, name, "coalescing request");
            *slot = Some(value);
            return;
        }
        pending.insert(name.to_owned(), None);
        drop(pending);
        self.trigger(name, value);
    }

    /// Register `listener` on each whitespace-separated name.
    pub fn on(&self, names: &str, listener: &Listener) {
        let mut listeners = self.listeners.borrow_mut();
        for name in names.split_whitespace() {
            listeners
                .entry(name.to_owned())
                .or_default()
                .push(listener.clone());
        }
    }

    /// Remove `listener` from each name, or every listener when `None`.
    pub fn off(&self, names: &str, listener: Option<&Listener>) {
        let mut listeners = self.listeners.borrow_mut();
        for name in names.split_whitespace() {
            match listener {
                None => {
                    listeners.remove(name);
                }
                Some(target) => {
                    if let Some(list) = listeners.get_mut(name) {
                        list.retain(|l| !l.same(target));
                    }
                }
            }
        }
    }

    /// Apply a backend notification: update the cache, run listeners, then
    /// release a coalesced request for the same name.
    pub fn receive(&self, name: &str, value: Value) {
        self.data
            .borrow_mut()
            .insert(name.to_owned(), value.clone());
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default();
        let event = Event::new(value, Some(name), None);
        for listener in &listeners {
            if let Err(fault) = listener.call(&event) {
                warn!(widget = %self.id, name, %fault, "view listener failed");
            }
        }
        let released = self.pending.borrow_mut().remove(name);
        if let Some(Some(next)) = released {
            self.set_soon(name, next);
        }
    }

    /// Apply a raw wire payload: the handshake or an `[id, name, value]`
    /// triple.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Wire`] for malformed payloads or another widget's id.
    pub fn receive_wire(&self, payload: &Value) -> Result<(), RuntimeError> {
        if payload.as_str() == Some(HANDSHAKE) {
            self.ready.set(true);
            return Ok(());
        }
        let message = Outbound::from_wire(payload)?;
        if message.id != self.id {
            return Err(RuntimeError::Wire(format!(
                "message for widget {} delivered to view of {}",
                message.id, self.id
            )));
        }
        self.receive(&message.name, message.value);
        Ok(())
    }
}
