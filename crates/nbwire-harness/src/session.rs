#![forbid(unsafe_code)]

//! Simulated views.
//!
//! A [`ViewSession`] renders a widget, seeds a [`ViewModel`] from the render
//! snapshot and plays the view's side of the protocol over one of the
//! in-memory hosts. Nothing moves until [`ViewSession::pump`] runs, which
//! stands in for the host event loop: it hands pending backend payloads to
//! the view and pending view requests to the backend until both sides are
//! quiet.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::{Value, json};
use tracing::{trace, warn};

use nbwire_runtime::transport::broadcast::{channel_name, invoke_name};
use nbwire_runtime::transport::comm::target_name;
use nbwire_runtime::{Inbound, ViewModel, Widget};

use crate::error::HarnessError;
use crate::hosts::{MemoryBroadcastHost, MemoryComm, MemoryCommHost};

enum Link {
    Broadcast {
        host: Rc<MemoryBroadcastHost>,
        cursor: Cell<usize>,
    },
    Comm {
        host: Rc<MemoryCommHost>,
        comm: RefCell<Option<Rc<MemoryComm>>>,
    },
}

/// One rendered view of a widget, driven by hand.
pub struct ViewSession {
    view: ViewModel,
    html: String,
    link: Link,
    outbox: Rc<RefCell<VecDeque<Inbound>>>,
    received: RefCell<Vec<Value>>,
}

impl std::fmt::Debug for ViewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewSession")
            .field("view", &self.view)
            .field("outbox", &self.outbox.borrow().len())
            .field("received", &self.received.borrow().len())
            .finish_non_exhaustive()
    }
}

impl ViewSession {
    fn render(widget: &Widget, link: Link) -> Self {
        let html = widget.render();
        let outbox = Rc::new(RefCell::new(VecDeque::new()));
        let sink = Rc::clone(&outbox);
        let view = ViewModel::new(widget.id(), widget.model().snapshot(), move |msg| {
            sink.borrow_mut().push_back(msg);
        });
        Self {
            view,
            html,
            link,
            outbox,
            received: RefCell::new(Vec::new()),
        }
    }

    /// Render `widget` and listen on its broadcast channel from now on.
    #[must_use]
    pub fn broadcast(widget: &Widget, host: &Rc<MemoryBroadcastHost>) -> Self {
        let link = Link::Broadcast {
            host: Rc::clone(host),
            cursor: Cell::new(0),
        };
        let session = Self::render(widget, link);
        if let Link::Broadcast { host, cursor } = &session.link {
            cursor.set(host.post_count());
        }
        session
    }

    /// Render `widget` without opening a connection yet.
    #[must_use]
    pub fn comm_unconnected(widget: &Widget, host: &Rc<MemoryCommHost>) -> Self {
        Self::render(
            widget,
            Link::Comm {
                host: Rc::clone(host),
                comm: RefCell::new(None),
            },
        )
    }

    /// Render `widget` and open a connection to it.
    ///
    /// # Errors
    ///
    /// [`HarnessError::NoTarget`] if the widget never registered a target.
    pub fn comm(widget: &Widget, host: &Rc<MemoryCommHost>) -> Result<Self, HarnessError> {
        let session = Self::comm_unconnected(widget, host);
        session.connect(Value::Null)?;
        Ok(session)
    }

    /// Open this view's connection with open payload `data`.
    ///
    /// # Errors
    ///
    /// [`HarnessError::NotComm`] on a broadcast session,
    /// [`HarnessError::NoTarget`] if the target is missing.
    pub fn connect(&self, data: Value) -> Result<(), HarnessError> {
        let Link::Comm { host, comm } = &self.link else {
            return Err(HarnessError::NotComm);
        };
        let target = target_name(self.view.id());
        let opened = host
            .open(&target, data)
            .ok_or(HarnessError::NoTarget(target))?;
        *comm.borrow_mut() = Some(opened);
        Ok(())
    }

    /// Close this view's connection, if open.
    pub fn disconnect(&self) {
        if let Link::Comm { host, comm } = &self.link {
            if let Some(open) = comm.borrow_mut().take() {
                host.close(&open);
            }
        }
    }

    /// The view-side model.
    #[must_use]
    pub fn view(&self) -> &ViewModel {
        &self.view
    }

    /// Markup produced when this view was rendered.
    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Every payload this view has received, handshake included.
    #[must_use]
    pub fn received(&self) -> Vec<Value> {
        self.received.borrow().clone()
    }

    /// Property notifications received, as `(name, value)` pairs.
    #[must_use]
    pub fn notifications(&self) -> Vec<(String, Value)> {
        self.received
            .borrow()
            .iter()
            .filter_map(|p| match p.as_array().map(Vec::as_slice) {
                Some([_, Value::String(name), value]) => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    fn incoming(&self) -> Vec<Value> {
        match &self.link {
            Link::Broadcast { host, cursor } => {
                let channel = channel_name(self.view.id());
                let (found, next) = host.posts_since(&channel, cursor.get());
                cursor.set(next);
                found
            }
            Link::Comm { comm, .. } => comm
                .borrow()
                .as_ref()
                .map(|c| c.take())
                .unwrap_or_default(),
        }
    }

    fn deliver(&self, msg: Inbound) {
        match &self.link {
            Link::Broadcast { host, .. } => {
                let name = invoke_name(self.view.id());
                if !host.invoke(&name, vec![json!(msg.name), msg.value]) {
                    warn!(callback = %name, "view request lost: no callback");
                }
            }
            Link::Comm { host, comm } => {
                let open = comm.borrow().clone();
                match open {
                    Some(open) => host.message(&open, json!([msg.name, msg.value])),
                    None => trace!(name = %msg.name, "view request lost: not connected"),
                }
            }
        }
    }

    /// Exchange messages until neither side has anything pending. Returns the
    /// number of payloads moved.
    pub fn pump(&self) -> usize {
        let mut moved = 0;
        loop {
            let mut progressed = false;
            for payload in self.incoming() {
                self.received.borrow_mut().push(payload.clone());
                if let Err(err) = self.view.receive_wire(&payload) {
                    warn!(error = %err, "view rejected payload");
                }
                moved += 1;
                progressed = true;
            }
            loop {
                let next = self.outbox.borrow_mut().pop_front();
                let Some(msg) = next else { break };
                self.deliver(msg);
                moved += 1;
                progressed = true;
            }
            if !progressed {
                return moved;
            }
        }
    }
}
