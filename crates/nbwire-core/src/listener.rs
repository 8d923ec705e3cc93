#![forbid(unsafe_code)]

//! Listener callbacks.
//!
//! Every listener has the single signature `Fn(&Event) -> Result<(), Fault>`.
//! The constructors adapt the common shapes (infallible, zero-argument) at
//! registration time. A [`Listener`] is a cheap handle; clones compare equal,
//! so keep a clone to unregister later with `off`.

use std::fmt;
use std::rc::Rc;

use crate::error::Fault;
use crate::event::Event;

type Callback = dyn Fn(&Event) -> Result<(), Fault>;

/// A registered notification callback.
#[derive(Clone)]
pub struct Listener {
    callback: Rc<Callback>,
}

impl Listener {
    /// Wrap a fallible callback.
    pub fn new(f: impl Fn(&Event) -> Result<(), Fault> + 'static) -> Self {
        Self {
            callback: Rc::new(f),
        }
    }

    /// Wrap a callback that cannot fail.
    pub fn infallible(f: impl Fn(&Event) + 'static) -> Self {
        Self::new(move |ev| {
            f(ev);
            Ok(())
        })
    }

    /// Wrap a callback that ignores the event.
    pub fn bare(f: impl Fn() + 'static) -> Self {
        Self::new(move |_| {
            f();
            Ok(())
        })
    }

    /// Invoke the callback.
    pub fn call(&self, event: &Event) -> Result<(), Fault> {
        (self.callback)(event)
    }

    /// Whether two handles refer to the same callback.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.callback, &other.callback)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("ptr", &Rc::as_ptr(&self.callback).cast::<()>())
            .finish()
    }
}
