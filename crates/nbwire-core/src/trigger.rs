#![forbid(unsafe_code)]

//! Triggers and properties: named notification points with parent chains.
//!
//! A [`Trigger`] holds an ordered listener list and an optional parent.
//! Calling [`Trigger::trigger`] walks up to the root of the parent chain and
//! runs [`Trigger::handle`] there; the root notifies its listeners, and every
//! bound child is itself an internal listener of its parent, so the
//! notification fans back down the tree.
//!
//! A [`Property`] is a trigger that also stores the last handled value.
//!
//! # Invariants
//!
//! 1. The parent chain is acyclic; a bind that would close a loop fails before
//!    any state changes.
//! 2. A property's value equals the (coerced) argument of its last successful
//!    `handle`.
//! 3. A property can only be parented to another property.
//! 4. Listeners run in registration order; duplicates run once per entry.
//! 5. Name and target are assigned once, when a model installs the trigger.
//! 6. A dropped child leaves no relay behind on its parent.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Cycle | binding to a descendant or to self | `Error::Cycle`, bindings unchanged |
//! | Wrong kind | value on trigger, trigger on property | `Error::ValueOnTrigger` / `Error::TriggerOnProperty` |
//! | Coercion | hook rejects value | `Error::Coerce`, no store, no notify |
//! | Coercion on bind | hook rejects the parent's value | `Error::Coerce`, child stays unbound |
//! | Listener fault | callback returns `Err` | remaining listeners still run, then `Error::Listener` |

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, trace};

use crate::dispatch::Dispatch;
use crate::error::{Error, Fault, ListenerFault, Result};
use crate::event::Event;
use crate::listener::Listener;
use crate::model::{Model, ModelRef};

type Coercion = Rc<dyn Fn(Value) -> std::result::Result<Value, Fault>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Trigger,
    Property,
}

#[derive(Clone)]
struct Entry {
    listener: Listener,
    internal: bool,
}

struct ParentLink {
    parent: Trigger,
    relay: Listener,
}

struct Node {
    kind: Kind,
    value: RefCell<Value>,
    coerce: Option<Coercion>,
    listeners: RefCell<Vec<Entry>>,
    parent: RefCell<Option<ParentLink>>,
    name: OnceCell<String>,
    target: OnceCell<ModelRef>,
    dispatch: Dispatch,
}

impl Node {
    fn new(kind: Kind, value: Value, coerce: Option<Coercion>, dispatch: Dispatch) -> Self {
        Self {
            kind,
            value: RefCell::new(value),
            coerce,
            listeners: RefCell::new(Vec::new()),
            parent: RefCell::new(None),
            name: OnceCell::new(),
            target: OnceCell::new(),
            dispatch,
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(link) = self.parent.get_mut().take() {
            link.parent.off(Some(&link.relay));
        }
    }
}

/// What to assign to a trigger or model member.
#[derive(Clone, Debug)]
pub enum Assign {
    /// An ordinary value.
    Value(Value),
    /// A trigger (or property) to bind to, or to install.
    Trigger(Trigger),
}

impl From<Value> for Assign {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Trigger> for Assign {
    fn from(trigger: Trigger) -> Self {
        Self::Trigger(trigger)
    }
}

impl From<&Trigger> for Assign {
    fn from(trigger: &Trigger) -> Self {
        Self::Trigger(trigger.clone())
    }
}

impl From<Property> for Assign {
    fn from(property: Property) -> Self {
        Self::Trigger(property.trigger)
    }
}

impl From<&Property> for Assign {
    fn from(property: &Property) -> Self {
        Self::Trigger(property.trigger.clone())
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// A listenable notification point, optionally delegating to a parent.
///
/// Cloning a `Trigger` yields another handle to the same node.
#[derive(Clone)]
pub struct Trigger {
    node: Rc<Node>,
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger {
    /// Create a trigger on the current thread's dispatch context.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dispatch(Dispatch::current())
    }

    /// Create a trigger on an explicit dispatch context.
    #[must_use]
    pub fn with_dispatch(dispatch: Dispatch) -> Self {
        Self {
            node: Rc::new(Node::new(Kind::Trigger, Value::Null, None, dispatch)),
        }
    }

    /// Name assigned when the trigger was installed into a model.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.node.name.get().map(String::as_str)
    }

    /// The owning model, if installed and still alive.
    #[must_use]
    pub fn target(&self) -> Option<Model> {
        self.node.target.get().and_then(ModelRef::upgrade)
    }

    /// The current parent, if bound.
    #[must_use]
    pub fn parent(&self) -> Option<Trigger> {
        self.node
            .parent
            .borrow()
            .as_ref()
            .map(|link| link.parent.clone())
    }

    /// Whether this handle refers to a property.
    #[must_use]
    pub fn is_property(&self) -> bool {
        self.node.kind == Kind::Property
    }

    /// View this trigger as a property, if it is one.
    #[must_use]
    pub fn as_property(&self) -> Option<Property> {
        self.is_property().then(|| Property {
            trigger: self.clone(),
        })
    }

    /// Whether both handles refer to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    /// The dispatch context used for notification.
    #[must_use]
    pub fn dispatch(&self) -> &Dispatch {
        &self.node.dispatch
    }

    /// Number of registered listener entries, internal ones included.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.node.listeners.borrow().len()
    }

    /// Register a user listener. Registering twice delivers twice.
    pub fn on(&self, listener: &Listener) {
        self.push_listener(listener, false);
    }

    /// Register a plumbing listener that bypasses the re-entrancy guard.
    pub fn on_internal(&self, listener: &Listener) {
        self.push_listener(listener, true);
    }

    fn push_listener(&self, listener: &Listener, internal: bool) {
        self.node.listeners.borrow_mut().push(Entry {
            listener: listener.clone(),
            internal,
        });
    }

    /// Unregister every entry of `listener`, internal or not.
    ///
    /// `None` is a no-op: it never clears the listener list.
    pub fn off(&self, listener: Option<&Listener>) {
        let Some(listener) = listener else {
            return;
        };
        self.node
            .listeners
            .borrow_mut()
            .retain(|entry| !entry.listener.same(listener));
    }

    /// Raise `value` at the root of the parent chain.
    ///
    /// # Errors
    ///
    /// Coercion failures and listener faults from the root's `handle`.
    pub fn trigger(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.parent() {
            Some(parent) => parent.trigger(value),
            None => self.handle(value),
        }
    }

    /// Accept a value at this node: store it (properties only) and notify.
    ///
    /// # Errors
    ///
    /// [`Error::Coerce`] if a property's coercion hook rejects the value, or
    /// [`Error::Listener`] if any listener failed.
    pub fn handle(&self, value: impl Into<Value>) -> Result<()> {
        let value = self.coerce(value.into())?;
        self.commit(value)
    }

    fn coerce(&self, value: Value) -> Result<Value> {
        match &self.node.coerce {
            Some(coerce) if self.node.kind == Kind::Property => {
                coerce(value).map_err(|fault| Error::Coerce {
                    name: self.label(),
                    message: fault.to_string(),
                })
            }
            _ => Ok(value),
        }
    }

    fn commit(&self, value: Value) -> Result<()> {
        if self.node.kind == Kind::Property {
            *self.node.value.borrow_mut() = value.clone();
        }
        self.notify(value)
    }

    /// Assign to this trigger.
    ///
    /// Binding to a trigger reparents this node. For a property, binding also
    /// adopts the parent's current value, and assigning a plain value raises
    /// it through [`trigger`](Self::trigger).
    ///
    /// # Errors
    ///
    /// Structural errors for cycles or mismatched kinds, plus anything
    /// `trigger`/`handle` report.
    pub fn set(&self, assign: impl Into<Assign>) -> Result<()> {
        match (assign.into(), self.node.kind) {
            (Assign::Trigger(parent), Kind::Property) => {
                if !parent.is_property() {
                    return Err(Error::TriggerOnProperty { name: self.label() });
                }
                self.ensure_acyclic(&parent)?;
                let adopted = parent.node.value.borrow().clone();
                let adopted = self.coerce(adopted)?;
                self.attach(&parent)?;
                self.commit(adopted)
            }
            (Assign::Trigger(parent), Kind::Trigger) => self.attach(&parent),
            (Assign::Value(value), Kind::Property) => self.trigger(value),
            (Assign::Value(_), Kind::Trigger) => Err(Error::ValueOnTrigger { name: self.label() }),
        }
    }

    /// Bind to `parent`; shorthand for `set(parent)`.
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn bind(&self, parent: &Trigger) -> Result<()> {
        self.set(parent)
    }

    /// Deliver `value` to every listener.
    ///
    /// A user listener is skipped when another user listener is already
    /// running on the same dispatch context. Faults are collected and the
    /// remaining listeners still run.
    ///
    /// # Errors
    ///
    /// [`Error::Listener`] with one entry per failed listener.
    pub fn notify(&self, value: impl Into<Value>) -> Result<()> {
        let entries: Vec<Entry> = self.node.listeners.borrow().clone();
        let name = self.name();
        let event = Event::new(value, name, self.node.target.get().cloned());
        let mut faults = Vec::new();
        for entry in &entries {
            let guard = self.node.dispatch.enter(entry.internal);
            if guard.is_silenced() {
                trace!(trigger = name, "silenced recursive notification");
                continue;
            }
            if let Err(fault) = entry.listener.call(&event) {
                ListenerFault::collect(name, fault, &mut faults);
            }
        }
        if faults.is_empty() {
            Ok(())
        } else {
            Err(Error::Listener(faults))
        }
    }

    fn ensure_acyclic(&self, parent: &Trigger) -> Result<()> {
        let mut cursor = Some(parent.clone());
        while let Some(ancestor) = cursor {
            if ancestor.ptr_eq(self) {
                return Err(Error::Cycle { name: self.label() });
            }
            cursor = ancestor.parent();
        }
        Ok(())
    }

    fn attach(&self, parent: &Trigger) -> Result<()> {
        self.ensure_acyclic(parent)?;
        self.detach();

        let child = Rc::downgrade(&self.node);
        let relay = Listener::new(move |event: &Event| relay_to_child(&child, event));
        parent.on_internal(&relay);
        *self.node.parent.borrow_mut() = Some(ParentLink {
            parent: parent.clone(),
            relay,
        });
        debug!(child = self.name(), parent = parent.name(), "bound trigger");
        Ok(())
    }

    fn detach(&self) {
        let link = self.node.parent.borrow_mut().take();
        if let Some(link) = link {
            link.parent.off(Some(&link.relay));
        }
    }

    pub(crate) fn install(&self, name: &str, target: ModelRef) -> Result<()> {
        if let Some(existing) = self.node.name.get() {
            return Err(Error::AlreadyInstalled {
                existing: existing.clone(),
            });
        }
        let _ = self.node.name.set(name.to_owned());
        let _ = self.node.target.set(target);
        Ok(())
    }

    fn label(&self) -> String {
        self.name().unwrap_or("<unnamed>").to_owned()
    }
}

fn relay_to_child(child: &Weak<Node>, event: &Event) -> std::result::Result<(), Fault> {
    let Some(node) = child.upgrade() else {
        return Ok(());
    };
    Trigger { node }
        .handle(event.value().clone())
        .map_err(|err| Box::new(err) as Fault)
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(match self.node.kind {
            Kind::Trigger => "Trigger",
            Kind::Property => "Property",
        });
        s.field("name", &self.name());
        if self.node.kind == Kind::Property {
            s.field("value", &*self.node.value.borrow());
        }
        s.field("listeners", &self.listener_count())
            .field("bound", &self.node.parent.borrow().is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// A trigger that remembers its last value.
#[derive(Clone)]
pub struct Property {
    trigger: Trigger,
}

impl Property {
    /// Create a property holding `value`.
    pub fn new(value: impl Into<Value>) -> Self {
        Self::with_dispatch(value, Dispatch::current())
    }

    /// Create a property on an explicit dispatch context.
    pub fn with_dispatch(value: impl Into<Value>, dispatch: Dispatch) -> Self {
        Self {
            trigger: Trigger {
                node: Rc::new(Node::new(Kind::Property, value.into(), None, dispatch)),
            },
        }
    }

    /// Create a property whose incoming values pass through `coerce`.
    ///
    /// The initial value is coerced too.
    ///
    /// # Errors
    ///
    /// [`Error::Coerce`] if the initial value is rejected.
    pub fn with_coercion(
        initial: impl Into<Value>,
        coerce: impl Fn(Value) -> std::result::Result<Value, Fault> + 'static,
    ) -> Result<Self> {
        let property = Self {
            trigger: Trigger {
                node: Rc::new(Node::new(
                    Kind::Property,
                    Value::Null,
                    Some(Rc::new(coerce)),
                    Dispatch::current(),
                )),
            },
        };
        property.trigger.handle(initial)?;
        Ok(property)
    }

    /// Create a property already bound to `parent`, holding its value.
    ///
    /// # Errors
    ///
    /// Listener faults are impossible on a fresh node; errors only surface
    /// if `parent`'s chain is corrupt.
    pub fn bound_to(parent: &Property) -> Result<Self> {
        let child = Self::with_dispatch(Value::Null, parent.dispatch().clone());
        child.trigger.set(parent)?;
        Ok(child)
    }

    /// The last handled value.
    #[must_use]
    pub fn value(&self) -> Value {
        self.trigger.node.value.borrow().clone()
    }

    /// Inspect the value without cloning it.
    pub fn with_value<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.trigger.node.value.borrow())
    }

    /// Assign a value (through `trigger`) or bind to another property.
    ///
    /// # Errors
    ///
    /// See [`Trigger::set`].
    pub fn set(&self, assign: impl Into<Assign>) -> Result<()> {
        self.trigger.set(assign)
    }

    /// The underlying trigger handle.
    #[must_use]
    pub fn as_trigger(&self) -> &Trigger {
        &self.trigger
    }
}

impl Deref for Property {
    type Target = Trigger;

    fn deref(&self) -> &Trigger {
        &self.trigger
    }
}

impl From<Property> for Trigger {
    fn from(property: Property) -> Self {
        property.trigger
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.trigger.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
