#![forbid(unsafe_code)]

//! Push-channel transport.
//!
//! Outbound messages are posted to a per-widget broadcast channel named
//! `channel_{id}` which every view of the widget listens on. Views call back
//! into the backend through a named kernel callback `invoke_{id}` whose
//! arguments are `[name, value]`.
//!
//! There is no handshake: a post with no listening view is simply lost.

use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{Inbound, Outbound, ReceiveHandler, Transport, WidgetId};
use crate::config::HostKind;

const SCRIPT: &str = include_str!("../../assets/broadcast.js");

/// The host primitives a broadcast transport needs.
pub trait BroadcastHost {
    /// Post `payload` to every listener of `channel`.
    fn post(&self, channel: &str, payload: Value);

    /// Expose `callback` to views under `name`. Re-registering a name
    /// replaces the previous callback.
    fn register_callback(&self, name: &str, callback: Box<dyn Fn(Vec<Value>)>);

    /// Withdraw the callback registered under `name`, if the host supports it.
    fn unregister_callback(&self, _name: &str) {}
}

impl<H: BroadcastHost + ?Sized> BroadcastHost for Rc<H> {
    fn post(&self, channel: &str, payload: Value) {
        (**self).post(channel, payload);
    }

    fn register_callback(&self, name: &str, callback: Box<dyn Fn(Vec<Value>)>) {
        (**self).register_callback(name, callback);
    }

    fn unregister_callback(&self, name: &str) {
        (**self).unregister_callback(name);
    }
}

/// Channel a widget's views listen on.
#[must_use]
pub fn channel_name(id: WidgetId) -> String {
    format!("channel_{id}")
}

/// Callback name views invoke to reach a widget.
#[must_use]
pub fn invoke_name(id: WidgetId) -> String {
    format!("invoke_{id}")
}

/// [`Transport`] over a [`BroadcastHost`].
pub struct BroadcastTransport<H> {
    host: H,
}

impl<H> std::fmt::Debug for BroadcastTransport<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastTransport").finish_non_exhaustive()
    }
}

impl<H: BroadcastHost> BroadcastTransport<H> {
    #[must_use]
    pub fn new(host: H) -> Self {
        Self { host }
    }

    /// The underlying host.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<H: BroadcastHost> Transport for BroadcastTransport<H> {
    fn kind(&self) -> HostKind {
        HostKind::Broadcast
    }

    fn send(&self, message: Outbound) {
        self.host.post(&channel_name(message.id), message.to_wire());
    }

    fn on_receive(&self, id: WidgetId, handler: ReceiveHandler) {
        let name = invoke_name(id);
        debug!(callback = %name, "registering broadcast receive handler");
        self.host.register_callback(
            &name,
            Box::new(move |args: Vec<Value>| match Inbound::from_args(&args) {
                Ok(inbound) => handler(inbound),
                Err(err) => warn!(widget = %id, error = %err, "dropping inbound message"),
            }),
        );
    }

    fn forget(&self, id: WidgetId) {
        self.host.unregister_callback(&invoke_name(id));
    }

    fn view_script(&self) -> &'static str {
        SCRIPT
    }
}
