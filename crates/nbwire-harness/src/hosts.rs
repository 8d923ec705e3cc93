#![forbid(unsafe_code)]

//! In-memory host substrates.
//!
//! Both hosts record instead of delivering: outbound payloads accumulate
//! until a [`ViewSession`](crate::ViewSession) (or a test) collects them,
//! the way a real notebook host hands them to its own event loop.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use nbwire_runtime::{BroadcastHost, Comm, CommEndpoint, CommHost};

// ---------------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------------

/// Broadcast host keeping a full post history.
#[derive(Default)]
pub struct MemoryBroadcastHost {
    posts: RefCell<Vec<(String, Value)>>,
    callbacks: RefCell<HashMap<String, Rc<dyn Fn(Vec<Value>)>>>,
}

impl std::fmt::Debug for MemoryBroadcastHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.callbacks.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("MemoryBroadcastHost")
            .field("posts", &self.posts.borrow().len())
            .field("callbacks", &names)
            .finish()
    }
}

impl MemoryBroadcastHost {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Total number of posts on all channels.
    #[must_use]
    pub fn post_count(&self) -> usize {
        self.posts.borrow().len()
    }

    /// Every payload posted to `channel`, in order.
    #[must_use]
    pub fn posted(&self, channel: &str) -> Vec<Value> {
        self.posts_since(channel, 0).0
    }

    /// Payloads posted to `channel` at history index `cursor` or later, and
    /// the cursor for the next call.
    #[must_use]
    pub fn posts_since(&self, channel: &str, cursor: usize) -> (Vec<Value>, usize) {
        let posts = self.posts.borrow();
        let found = posts
            .iter()
            .skip(cursor)
            .filter(|(c, _)| c == channel)
            .map(|(_, v)| v.clone())
            .collect();
        (found, posts.len())
    }

    /// Whether a callback is registered under `name`.
    #[must_use]
    pub fn has_callback(&self, name: &str) -> bool {
        self.callbacks.borrow().contains_key(name)
    }

    /// Invoke a registered callback as a view would. Returns `false` when no
    /// callback has that name.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> bool {
        let callback = self.callbacks.borrow().get(name).cloned();
        match callback {
            Some(callback) => {
                callback(args);
                true
            }
            None => {
                trace!(name, "invoke on unknown callback");
                false
            }
        }
    }
}

impl BroadcastHost for MemoryBroadcastHost {
    fn post(&self, channel: &str, payload: Value) {
        self.posts.borrow_mut().push((channel.to_owned(), payload));
    }

    fn register_callback(&self, name: &str, callback: Box<dyn Fn(Vec<Value>)>) {
        self.callbacks
            .borrow_mut()
            .insert(name.to_owned(), Rc::from(callback));
    }

    fn unregister_callback(&self, name: &str) {
        self.callbacks.borrow_mut().remove(name);
    }
}

// ---------------------------------------------------------------------------
// Comm
// ---------------------------------------------------------------------------

/// View end of one in-memory connection.
#[derive(Debug)]
pub struct MemoryComm {
    id: String,
    target: String,
    inbox: RefCell<VecDeque<Value>>,
    history: RefCell<Vec<Value>>,
}

impl MemoryComm {
    /// Target this connection was opened against.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Drain payloads not yet taken.
    pub fn take(&self) -> Vec<Value> {
        self.inbox.borrow_mut().drain(..).collect()
    }

    /// Every payload the backend sent on this connection.
    #[must_use]
    pub fn received(&self) -> Vec<Value> {
        self.history.borrow().clone()
    }
}

impl Comm for MemoryComm {
    fn comm_id(&self) -> &str {
        &self.id
    }

    fn send(&self, payload: Value) {
        self.history.borrow_mut().push(payload.clone());
        self.inbox.borrow_mut().push_back(payload);
    }
}

/// Comm host routing opens, messages and closes to registered targets.
#[derive(Default)]
pub struct MemoryCommHost {
    targets: RefCell<HashMap<String, Rc<dyn CommEndpoint>>>,
    next_comm: Cell<u64>,
}

impl std::fmt::Debug for MemoryCommHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.targets.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("MemoryCommHost")
            .field("targets", &names)
            .field("opened", &self.next_comm.get())
            .finish()
    }
}

impl MemoryCommHost {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn endpoint(&self, target: &str) -> Option<Rc<dyn CommEndpoint>> {
        self.targets.borrow().get(target).cloned()
    }

    /// Whether `target` has been registered.
    #[must_use]
    pub fn has_target(&self, target: &str) -> bool {
        self.targets.borrow().contains_key(target)
    }

    /// Open a connection to `target` with open payload `data`. `None` when
    /// the target is not registered.
    pub fn open(&self, target: &str, data: Value) -> Option<Rc<MemoryComm>> {
        let endpoint = self.endpoint(target)?;
        let n = self.next_comm.get() + 1;
        self.next_comm.set(n);
        let comm = Rc::new(MemoryComm {
            id: format!("comm-{n}"),
            target: target.to_owned(),
            inbox: RefCell::new(VecDeque::new()),
            history: RefCell::new(Vec::new()),
        });
        endpoint.open(Rc::clone(&comm) as Rc<dyn Comm>, data);
        Some(comm)
    }

    /// Send `data` from the view end of `comm`.
    pub fn message(&self, comm: &MemoryComm, data: Value) {
        match self.endpoint(&comm.target) {
            Some(endpoint) => endpoint.message(&comm.id, data),
            None => trace!(comm_target = %comm.target, "message to unregistered target"),
        }
    }

    /// Close `comm` from the view end.
    pub fn close(&self, comm: &MemoryComm) {
        if let Some(endpoint) = self.endpoint(&comm.target) {
            endpoint.close(&comm.id);
        }
    }
}

impl CommHost for MemoryCommHost {
    fn register_target(&self, target: &str, endpoint: Rc<dyn CommEndpoint>) {
        self.targets.borrow_mut().insert(target.to_owned(), endpoint);
    }

    fn unregister_target(&self, target: &str) {
        self.targets.borrow_mut().remove(target);
    }
}
