#![forbid(unsafe_code)]

//! Handshaked duplex-connection transport.
//!
//! Each rendered view opens its own connection to the widget's target
//! `comm_{id}`. The backend answers every open with the reserved
//! [`HANDSHAKE`] payload, then flushes whatever was sent while no connection
//! existed. A widget may hold any number of live connections; outbound
//! messages go to all of them.
//!
//! # State Machine (per widget)
//!
//! ```text
//! NoConnection --view rendered--> Queueing --first open--> Connected
//!       ^                                                     |
//!       +------------------- last close ---------------------+
//! ```
//!
//! # Invariants
//!
//! 1. Messages sent while no connection is open are delivered, in send order,
//!    to the first connection that opens, after its handshake and before any
//!    later message.
//! 2. Closing one connection never affects the others.
//! 3. The handshake is the first payload every connection receives.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Queue at `max_queued` | Oldest message dropped, `warn!` |
//! | Malformed inbound payload | Message dropped, `warn!` |
//! | Inbound before `on_receive` | Message dropped, `warn!` |
//! | Widget dropped | Channel, queue and target released |

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{HANDSHAKE, Inbound, Outbound, ReceiveHandler, Transport, WidgetId};
use crate::config::{CommConfig, HostKind};

const SCRIPT: &str = include_str!("../../assets/comm.js");

/// One live duplex connection to a view.
pub trait Comm {
    /// Host-assigned identifier, unique among open connections.
    fn comm_id(&self) -> &str;

    /// Deliver `payload` to the view end. Never blocks.
    fn send(&self, payload: Value);
}

/// Backend side of a comm target, driven by the host.
pub trait CommEndpoint {
    /// A view opened `comm`; `data` is the open payload (`Null` when absent).
    fn open(&self, comm: Rc<dyn Comm>, data: Value);

    /// A message arrived on the connection `comm_id`.
    fn message(&self, comm_id: &str, data: Value);

    /// The connection `comm_id` closed.
    fn close(&self, comm_id: &str);
}

/// The host primitive a comm transport needs.
pub trait CommHost {
    /// Route connections opened against `target` to `endpoint`.
    fn register_target(&self, target: &str, endpoint: Rc<dyn CommEndpoint>);

    /// Stop routing `target`. Hosts without unregistration ignore this.
    fn unregister_target(&self, _target: &str) {}
}

impl<H: CommHost + ?Sized> CommHost for Rc<H> {
    fn register_target(&self, target: &str, endpoint: Rc<dyn CommEndpoint>) {
        (**self).register_target(target, endpoint);
    }

    fn unregister_target(&self, target: &str) {
        (**self).unregister_target(target);
    }
}

/// Target name views open connections against.
#[must_use]
pub fn target_name(id: WidgetId) -> String {
    format!("comm_{id}")
}

/// Connection state of one widget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not rendered yet and nothing open.
    NoConnection,
    /// Rendered, waiting for the first connection; sends are queued.
    Queueing,
    /// At least one connection is open; sends go out directly.
    Connected,
}

// ---------------------------------------------------------------------------
// Per-widget channel
// ---------------------------------------------------------------------------

struct CommChannel {
    id: WidgetId,
    max_queued: Option<usize>,
    comms: RefCell<Vec<Rc<dyn Comm>>>,
    queue: RefCell<VecDeque<Value>>,
    handler: RefCell<Option<ReceiveHandler>>,
    rendered: Cell<bool>,
}

impl CommChannel {
    fn new(id: WidgetId, max_queued: Option<usize>) -> Self {
        Self {
            id,
            max_queued,
            comms: RefCell::new(Vec::new()),
            queue: RefCell::new(VecDeque::new()),
            handler: RefCell::new(None),
            rendered: Cell::new(false),
        }
    }

    fn state(&self) -> ConnectionState {
        if !self.comms.borrow().is_empty() {
            ConnectionState::Connected
        } else if self.rendered.get() {
            ConnectionState::Queueing
        } else {
            ConnectionState::NoConnection
        }
    }

    fn send(&self, payload: Value) {
        let comms = self.comms.borrow().clone();
        if comms.is_empty() {
            let mut queue = self.queue.borrow_mut();
            if let Some(limit) = self.max_queued {
                if queue.len() >= limit {
                    queue.pop_front();
                    warn!(widget = %self.id, limit, "comm queue full, dropping oldest message");
                }
            }
            queue.push_back(payload);
            return;
        }
        for comm in &comms {
            comm.send(payload.clone());
        }
    }
}

impl CommEndpoint for CommChannel {
    fn open(&self, comm: Rc<dyn Comm>, data: Value) {
        debug!(widget = %self.id, comm = comm.comm_id(), "comm opened");
        comm.send(Value::String(HANDSHAKE.to_owned()));
        // Sends issued while flushing still find no connection and queue up
        // behind the backlog, so the drain loop picks them up in order.
        let mut flushed = 0usize;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(payload) = next else { break };
            comm.send(payload);
            flushed += 1;
        }
        if flushed > 0 {
            debug!(widget = %self.id, flushed, "flushed queued messages");
        }
        let comm_id = comm.comm_id().to_owned();
        self.comms.borrow_mut().push(comm);
        if !data.is_null() {
            self.message(&comm_id, data);
        }
    }

    fn message(&self, comm_id: &str, data: Value) {
        let handler = self.handler.borrow().clone();
        let Some(handler) = handler else {
            warn!(widget = %self.id, comm = comm_id, "no receive handler registered");
            return;
        };
        match Inbound::from_wire(&data) {
            Ok(inbound) => handler(inbound),
            Err(err) => warn!(widget = %self.id, comm = comm_id, error = %err, "dropping inbound message"),
        }
    }

    fn close(&self, comm_id: &str) {
        self.comms.borrow_mut().retain(|c| c.comm_id() != comm_id);
        debug!(widget = %self.id, comm = comm_id, "comm closed");
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// [`Transport`] over a [`CommHost`].
pub struct CommTransport<H> {
    host: H,
    config: CommConfig,
    channels: RefCell<HashMap<WidgetId, Rc<CommChannel>>>,
}

impl<H> std::fmt::Debug for CommTransport<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommTransport")
            .field("config", &self.config)
            .field("widgets", &self.channels.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<H: CommHost> CommTransport<H> {
    #[must_use]
    pub fn new(host: H) -> Self {
        Self::with_config(host, CommConfig::default())
    }

    #[must_use]
    pub fn with_config(host: H, config: CommConfig) -> Self {
        Self {
            host,
            config,
            channels: RefCell::new(HashMap::new()),
        }
    }

    /// The underlying host.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    fn channel(&self, id: WidgetId) -> Rc<CommChannel> {
        Rc::clone(
            self.channels
                .borrow_mut()
                .entry(id)
                .or_insert_with(|| Rc::new(CommChannel::new(id, self.config.max_queued))),
        )
    }

    fn existing(&self, id: WidgetId) -> Option<Rc<CommChannel>> {
        self.channels.borrow().get(&id).cloned()
    }

    /// Connection state of widget `id`.
    #[must_use]
    pub fn state(&self, id: WidgetId) -> ConnectionState {
        self.existing(id)
            .map_or(ConnectionState::NoConnection, |c| c.state())
    }

    /// Number of open connections to widget `id`.
    #[must_use]
    pub fn connection_count(&self, id: WidgetId) -> usize {
        self.existing(id).map_or(0, |c| c.comms.borrow().len())
    }

    /// Number of widgets with a live channel.
    #[must_use]
    pub fn widget_count(&self) -> usize {
        self.channels.borrow().len()
    }

    /// Number of messages waiting for widget `id`'s first connection.
    #[must_use]
    pub fn queued(&self, id: WidgetId) -> usize {
        self.existing(id).map_or(0, |c| c.queue.borrow().len())
    }
}

impl<H: CommHost> Transport for CommTransport<H> {
    fn kind(&self) -> HostKind {
        HostKind::Comm
    }

    fn send(&self, message: Outbound) {
        self.channel(message.id).send(message.to_wire());
    }

    fn on_receive(&self, id: WidgetId, handler: ReceiveHandler) {
        let channel = self.channel(id);
        *channel.handler.borrow_mut() = Some(handler);
        let target = target_name(id);
        debug!(comm_target = %target, "registering comm target");
        self.host.register_target(&target, channel);
    }

    fn view_rendered(&self, id: WidgetId) {
        self.channel(id).rendered.set(true);
    }

    fn forget(&self, id: WidgetId) {
        let removed = self.channels.borrow_mut().remove(&id);
        let Some(channel) = removed else {
            return;
        };
        let dropped = channel.queue.borrow_mut().drain(..).count();
        channel.handler.borrow_mut().take();
        channel.comms.borrow_mut().clear();
        self.host.unregister_target(&target_name(id));
        debug!(widget = %id, dropped, "comm channel released");
    }

    fn view_script(&self) -> &'static str {
        SCRIPT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Default)]
    struct Targets(RefCell<HashMap<String, Rc<dyn CommEndpoint>>>);

    impl CommHost for Targets {
        fn register_target(&self, target: &str, endpoint: Rc<dyn CommEndpoint>) {
            self.0.borrow_mut().insert(target.to_owned(), endpoint);
        }

        fn unregister_target(&self, target: &str) {
            self.0.borrow_mut().remove(target);
        }
    }

    struct Recorded {
        id: String,
        sent: RefCell<Vec<Value>>,
    }

    impl Recorded {
        fn new(id: &str) -> Rc<Self> {
            Rc::new(Self {
                id: id.to_owned(),
                sent: RefCell::new(Vec::new()),
            })
        }
    }

    impl Comm for Recorded {
        fn comm_id(&self) -> &str {
            &self.id
        }

        fn send(&self, payload: Value) {
            self.sent.borrow_mut().push(payload);
        }
    }

    fn outbound(id: WidgetId, n: i64) -> Outbound {
        Outbound {
            id,
            name: "value".into(),
            value: json!(n),
        }
    }

    fn setup() -> (CommTransport<Targets>, WidgetId, Rc<dyn CommEndpoint>) {
        let transport = CommTransport::new(Targets::default());
        let id = WidgetId::next();
        transport.on_receive(id, Rc::new(|_| {}));
        let endpoint = Rc::clone(&transport.host().0.borrow()[&target_name(id)]);
        (transport, id, endpoint)
    }

    #[test]
    fn state_progression() {
        let (transport, id, endpoint) = setup();
        assert_eq!(transport.state(id), ConnectionState::NoConnection);
        transport.view_rendered(id);
        assert_eq!(transport.state(id), ConnectionState::Queueing);
        endpoint.open(Recorded::new("a"), Value::Null);
        assert_eq!(transport.state(id), ConnectionState::Connected);
        endpoint.close("a");
        assert_eq!(transport.state(id), ConnectionState::Queueing);
    }

    #[test]
    fn queued_messages_flush_in_order_after_handshake() {
        let (transport, id, endpoint) = setup();
        transport.view_rendered(id);
        for n in 1..=3 {
            transport.send(outbound(id, n));
        }
        assert_eq!(transport.queued(id), 3);

        let comm = Recorded::new("a");
        endpoint.open(comm.clone(), Value::Null);
        transport.send(outbound(id, 4));

        assert_eq!(transport.queued(id), 0);
        let w = id.get();
        assert_eq!(
            *comm.sent.borrow(),
            vec![
                json!("ok"),
                json!([w, "value", 1]),
                json!([w, "value", 2]),
                json!([w, "value", 3]),
                json!([w, "value", 4]),
            ]
        );
    }

    #[test]
    fn forget_releases_channel_queue_and_target() {
        let (transport, id, _endpoint) = setup();
        transport.view_rendered(id);
        transport.send(outbound(id, 1));
        assert_eq!(transport.queued(id), 1);

        transport.forget(id);
        assert_eq!(transport.widget_count(), 0);
        assert_eq!(transport.queued(id), 0);
        assert_eq!(transport.state(id), ConnectionState::NoConnection);
        assert!(!transport.host().0.borrow().contains_key(&target_name(id)));

        transport.forget(id);
        assert_eq!(transport.widget_count(), 0);
    }

    #[test]
    fn second_connection_gets_handshake_only() {
        let (transport, id, endpoint) = setup();
        transport.send(outbound(id, 1));
        let a = Recorded::new("a");
        let b = Recorded::new("b");
        endpoint.open(a.clone(), Value::Null);
        endpoint.open(b.clone(), Value::Null);
        assert_eq!(b.sent.borrow().as_slice(), &[json!("ok")]);

        transport.send(outbound(id, 2));
        assert_eq!(a.sent.borrow().len(), 3);
        assert_eq!(b.sent.borrow().len(), 2);
        assert_eq!(transport.connection_count(id), 2);
    }

    #[test]
    fn close_removes_only_that_connection() {
        let (transport, id, endpoint) = setup();
        let a = Recorded::new("a");
        let b = Recorded::new("b");
        endpoint.open(a.clone(), Value::Null);
        endpoint.open(b.clone(), Value::Null);
        endpoint.close("a");
        transport.send(outbound(id, 7));
        assert_eq!(a.sent.borrow().len(), 1);
        assert_eq!(b.sent.borrow().last(), Some(&json!([id.get(), "value", 7])));
        assert_eq!(transport.connection_count(id), 1);
    }

    #[test]
    fn bounded_queue_drops_oldest() {
        let transport = CommTransport::with_config(
            Targets::default(),
            CommConfig {
                max_queued: Some(2),
            },
        );
        let id = WidgetId::next();
        for n in 1..=3 {
            transport.send(outbound(id, n));
        }
        assert_eq!(transport.queued(id), 2);
        transport.on_receive(id, Rc::new(|_| {}));
        let endpoint = Rc::clone(&transport.host().0.borrow()[&target_name(id)]);
        let comm = Recorded::new("a");
        endpoint.open(comm.clone(), Value::Null);
        assert_eq!(comm.sent.borrow()[1], json!([id.get(), "value", 2]));
    }

    #[test]
    fn open_payload_and_messages_reach_handler() {
        let transport = CommTransport::new(Targets::default());
        let id = WidgetId::next();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        transport.on_receive(id, Rc::new(move |m: Inbound| sink.borrow_mut().push(m)));
        let endpoint = Rc::clone(&transport.host().0.borrow()[&target_name(id)]);

        endpoint.open(Recorded::new("a"), json!(["value", 1]));
        endpoint.message("a", json!(["value", 2]));
        endpoint.message("a", json!("garbage"));

        let values: Vec<Value> = seen.borrow().iter().map(|m| m.value.clone()).collect();
        assert_eq!(values, vec![json!(1), json!(2)]);
    }

    proptest::proptest! {
        #[test]
        fn flush_preserves_send_order(before in 0usize..20, after in 0usize..5) {
            let (transport, id, endpoint) = setup();
            for n in 0..before {
                transport.send(outbound(id, n as i64));
            }
            let comm = Recorded::new("a");
            endpoint.open(comm.clone(), Value::Null);
            for n in before..before + after {
                transport.send(outbound(id, n as i64));
            }
            let sent = comm.sent.borrow();
            proptest::prop_assert_eq!(&sent[0], &json!("ok"));
            let order: Vec<i64> = sent[1..]
                .iter()
                .filter_map(|p| p[2].as_i64())
                .collect();
            let expected: Vec<i64> = (0..(before + after) as i64).collect();
            proptest::prop_assert_eq!(order, expected);
        }
    }

    #[test]
    fn unknown_widget_queries_are_empty() {
        let transport = CommTransport::new(Targets::default());
        let id = WidgetId::next();
        assert_eq!(transport.state(id), ConnectionState::NoConnection);
        assert_eq!(transport.connection_count(id), 0);
        assert_eq!(transport.queued(id), 0);
    }
}
