#![forbid(unsafe_code)]

//! Handler-nesting context that guards notification fan-out.
//!
//! A [`Dispatch`] counts how many non-internal listener invocations are in
//! progress. Entering a non-internal listener while another one is already
//! running yields a silenced [`HandlerGuard`]: the listener is skipped. This
//! stops a listener that writes to another bound property from starting a
//! second user-level notification chain inside the first one. Internal
//! listeners (parent-to-child plumbing and view relays) are never silenced and
//! do not count toward the depth.
//!
//! # Invariants
//!
//! 1. Depth equals the number of live non-internal guards.
//! 2. Every guard restores the depth on drop, including during unwinding.
//! 3. All triggers created without an explicit context share the thread's
//!    context, so the guard spans every widget on that thread.

use std::cell::Cell;
use std::rc::Rc;

thread_local! {
    static THREAD_DISPATCH: Dispatch = Dispatch::new();
}

/// Shared re-entrancy context for listener delivery.
#[derive(Clone, Debug, Default)]
pub struct Dispatch {
    depth: Rc<Cell<usize>>,
}

impl Dispatch {
    /// Create an independent context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The context shared by every trigger on the current thread.
    #[must_use]
    pub fn current() -> Self {
        THREAD_DISPATCH.with(Clone::clone)
    }

    /// Number of non-internal handlers currently running.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Whether both handles share one context.
    #[must_use]
    pub fn same_context(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.depth, &other.depth)
    }

    /// Enter a listener invocation.
    ///
    /// A non-internal entry is silenced when any other non-internal entry is
    /// live. Non-internal entries push onto the context whether or not they
    /// are silenced; the returned guard pops on drop.
    #[must_use = "dropping the guard immediately leaves the handler"]
    pub fn enter(&self, internal: bool) -> HandlerGuard {
        if internal {
            return HandlerGuard {
                depth: None,
                silenced: false,
            };
        }
        let silenced = self.depth.get() > 0;
        self.depth.set(self.depth.get() + 1);
        HandlerGuard {
            depth: Some(Rc::clone(&self.depth)),
            silenced,
        }
    }
}

/// RAII guard for one listener invocation.
#[must_use = "dropping the guard immediately leaves the handler"]
#[derive(Debug)]
pub struct HandlerGuard {
    depth: Option<Rc<Cell<usize>>>,
    silenced: bool,
}

impl HandlerGuard {
    /// Whether the listener must be skipped.
    #[must_use]
    pub fn is_silenced(&self) -> bool {
        self.silenced
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        if let Some(depth) = &self.depth {
            debug_assert!(depth.get() > 0);
            depth.set(depth.get().saturating_sub(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outermost_entry_is_not_silenced() {
        let ctx = Dispatch::new();
        let guard = ctx.enter(false);
        assert!(!guard.is_silenced());
        assert_eq!(ctx.depth(), 1);
        drop(guard);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn nested_user_entry_is_silenced() {
        let ctx = Dispatch::new();
        let _outer = ctx.enter(false);
        let inner = ctx.enter(false);
        assert!(inner.is_silenced());
        assert_eq!(ctx.depth(), 2);
    }

    #[test]
    fn internal_entry_never_silenced_and_not_counted() {
        let ctx = Dispatch::new();
        let _outer = ctx.enter(false);
        let internal = ctx.enter(true);
        assert!(!internal.is_silenced());
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn depth_restored_after_panic() {
        let ctx = Dispatch::new();
        let inner = ctx.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.enter(false);
            panic!("listener failure");
        }));
        assert!(result.is_err());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn thread_context_is_shared() {
        let a = Dispatch::current();
        let b = Dispatch::current();
        assert!(a.same_context(&b));
        assert!(!a.same_context(&Dispatch::new()));
    }
}
