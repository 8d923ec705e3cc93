#![forbid(unsafe_code)]

//! Named registry of triggers and properties with transparent value access.
//!
//! A [`Model`] maps member names to a [`Member`]: a bare trigger, a property,
//! or a plain (non-databound) value. Once a name holds a trigger or property,
//! [`Model::set`] on that name is forwarded to the member's own `set`; the
//! member object itself is never replaced.
//!
//! ```
//! use nbwire_core::{Listener, Model, Property};
//! use serde_json::json;
//!
//! let model = Model::new();
//! model.set("count", Property::new(0)).unwrap();
//! model.on("count", &Listener::infallible(|ev| println!("count = {}", ev.value())))
//!     .unwrap();
//! model.set("count", json!(5)).unwrap();
//! assert_eq!(model.value("count").unwrap(), json!(5));
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::json::JsonRepr;
use crate::listener::Listener;
use crate::trigger::{Assign, Property, Trigger};

type InstallHook = Rc<dyn Fn(&Trigger)>;

/// A slot in a model.
#[derive(Clone, Debug)]
pub enum Member {
    /// A trigger that holds no value.
    Trigger(Trigger),
    /// A property with a stored value.
    Property(Property),
    /// An ordinary attribute with no data binding.
    Plain(Value),
}

impl Member {
    fn kind(&self) -> &'static str {
        match self {
            Self::Trigger(_) => "a trigger",
            Self::Property(_) => "a property",
            Self::Plain(_) => "a plain value",
        }
    }
}

/// Result of reading a member.
#[derive(Clone, Debug)]
pub enum Slot {
    /// A property's stored value or a plain attribute.
    Value(Value),
    /// A bare trigger, returned as-is.
    Trigger(Trigger),
}

struct ModelInner {
    members: RefCell<HashMap<String, Member>>,
    install_hooks: RefCell<Vec<InstallHook>>,
}

/// Container of named triggers and properties.
///
/// Cloning a `Model` yields another handle to the same registry.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

/// Non-owning reference to a model, carried by events and triggers.
#[derive(Clone)]
pub struct ModelRef(Weak<ModelInner>);

impl ModelRef {
    /// The model, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Model> {
        self.0.upgrade().map(|inner| Model { inner })
    }

    /// Whether this reference points at `model`.
    #[must_use]
    pub fn points_to(&self, model: &Model) -> bool {
        Weak::as_ptr(&self.0) == Rc::as_ptr(&model.inner)
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelRef").field(&Weak::as_ptr(&self.0)).finish()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    /// Create an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ModelInner {
                members: RefCell::new(HashMap::new()),
                install_hooks: RefCell::new(Vec::new()),
            }),
        }
    }

    /// A non-owning reference to this model.
    #[must_use]
    pub fn downgrade(&self) -> ModelRef {
        ModelRef(Rc::downgrade(&self.inner))
    }

    /// Whether both handles refer to the same model.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `hook` for every trigger installed from now on.
    ///
    /// Hooks run after the trigger's name and target are assigned.
    pub fn on_install(&self, hook: impl Fn(&Trigger) + 'static) {
        self.inner.install_hooks.borrow_mut().push(Rc::new(hook));
    }

    /// Assign to `name`.
    ///
    /// - Name bound to a trigger/property: forwarded to that member's `set`.
    /// - Otherwise a trigger/property is installed under `name`, and a plain
    ///   value replaces whatever was there.
    ///
    /// # Errors
    ///
    /// Anything the member's `set` reports, or [`Error::AlreadyInstalled`]
    /// when installing a trigger that another model already owns.
    pub fn set(&self, name: &str, assign: impl Into<Assign>) -> Result<()> {
        let assign = assign.into();
        let bound = match self.inner.members.borrow().get(name) {
            Some(Member::Trigger(t)) => Some(t.clone()),
            Some(Member::Property(p)) => Some(p.as_trigger().clone()),
            _ => None,
        };
        if let Some(member) = bound {
            return member.set(assign);
        }
        match assign {
            Assign::Value(value) => {
                self.inner
                    .members
                    .borrow_mut()
                    .insert(name.to_owned(), Member::Plain(value));
                Ok(())
            }
            Assign::Trigger(trigger) => self.install(name, trigger),
        }
    }

    /// Assign the custom wire form of `value` to `name`.
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn set_repr<T: JsonRepr + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        self.set(name, value.json_repr())
    }

    fn install(&self, name: &str, trigger: Trigger) -> Result<()> {
        trigger.install(name, self.downgrade())?;
        let member = match trigger.as_property() {
            Some(property) => Member::Property(property),
            None => Member::Trigger(trigger.clone()),
        };
        self.inner
            .members
            .borrow_mut()
            .insert(name.to_owned(), member);
        debug!(name, property = trigger.is_property(), "installed member");
        let hooks: Vec<InstallHook> = self.inner.install_hooks.borrow().clone();
        for hook in hooks {
            hook(&trigger);
        }
        Ok(())
    }

    /// Read `name`: a property's value, a plain value, or a bare trigger.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Slot> {
        self.inner.members.borrow().get(name).map(|m| match m {
            Member::Trigger(t) => Slot::Trigger(t.clone()),
            Member::Property(p) => Slot::Value(p.value()),
            Member::Plain(v) => Slot::Value(v.clone()),
        })
    }

    /// Read the value at `name`.
    ///
    /// # Errors
    ///
    /// [`Error::NoValue`] for a bare trigger, [`Error::NotBound`] if absent.
    pub fn value(&self, name: &str) -> Result<Value> {
        match self.get(name) {
            Some(Slot::Value(v)) => Ok(v),
            Some(Slot::Trigger(_)) => Err(Error::NoValue {
                name: name.to_owned(),
            }),
            None => Err(Error::NotBound {
                name: name.to_owned(),
                found: "nothing",
            }),
        }
    }

    /// Read and decode the value at `name`.
    ///
    /// # Errors
    ///
    /// Lookup errors from [`value`](Self::value), or [`Error::Decode`].
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.value(name)?;
        serde_json::from_value(value).map_err(|source| Error::Decode {
            name: name.to_owned(),
            source,
        })
    }

    /// The trigger or property object at `name`, rather than its value.
    ///
    /// # Errors
    ///
    /// [`Error::NotBound`] if `name` is absent or a plain value.
    pub fn prop(&self, name: &str) -> Result<Trigger> {
        match self.inner.members.borrow().get(name) {
            Some(Member::Trigger(t)) => Ok(t.clone()),
            Some(Member::Property(p)) => Ok(p.as_trigger().clone()),
            Some(other) => Err(Error::NotBound {
                name: name.to_owned(),
                found: other.kind(),
            }),
            None => Err(Error::NotBound {
                name: name.to_owned(),
                found: "nothing",
            }),
        }
    }

    /// The property at `name`.
    ///
    /// # Errors
    ///
    /// [`Error::NotBound`] if `name` does not hold a property.
    pub fn property(&self, name: &str) -> Result<Property> {
        match self.inner.members.borrow().get(name) {
            Some(Member::Property(p)) => Ok(p.clone()),
            Some(other) => Err(Error::NotBound {
                name: name.to_owned(),
                found: other.kind(),
            }),
            None => Err(Error::NotBound {
                name: name.to_owned(),
                found: "nothing",
            }),
        }
    }

    /// Register `listener` on each whitespace-separated name.
    ///
    /// All names are resolved before any registration, so a bad name leaves
    /// every member untouched.
    ///
    /// # Errors
    ///
    /// [`Error::NotBound`] for the first name that is not a trigger.
    pub fn on(&self, names: &str, listener: &Listener) -> Result<&Self> {
        for trigger in self.resolve(names)? {
            trigger.on(listener);
        }
        Ok(self)
    }

    /// Unregister `listener` from each whitespace-separated name.
    ///
    /// Passing `None` resolves the names but removes nothing.
    ///
    /// # Errors
    ///
    /// [`Error::NotBound`] for the first name that is not a trigger.
    pub fn off(&self, names: &str, listener: Option<&Listener>) -> Result<&Self> {
        for trigger in self.resolve(names)? {
            trigger.off(listener);
        }
        Ok(self)
    }

    fn resolve(&self, names: &str) -> Result<Vec<Trigger>> {
        names.split_whitespace().map(|n| self.prop(n)).collect()
    }

    /// Names of all members, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.members.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `name` holds a trigger or property.
    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        matches!(
            self.inner.members.borrow().get(name),
            Some(Member::Trigger(_) | Member::Property(_))
        )
    }

    /// Current values of every property, keyed by name.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner
            .members
            .borrow()
            .iter()
            .filter_map(|(name, member)| match member {
                Member::Property(p) => Some((name.clone(), p.value())),
                _ => None,
            })
            .collect()
    }
}

impl AsRef<Model> for Model {
    fn as_ref(&self) -> &Model {
        self
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("members", &self.names())
            .finish()
    }
}
