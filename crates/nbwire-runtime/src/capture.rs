#![forbid(unsafe_code)]

//! Scoped output capture for listener code.
//!
//! While a [`CaptureScope`] is live on the current thread, text written with
//! [`nb_println!`](crate::nb_println), [`nb_eprintln!`](crate::nb_eprintln)
//! or through a [`CapturedWriter`] lands in the scope's buffer instead of the
//! process streams. The widget runtime opens a scope around every
//! view-originated update and renders whatever was captured above the widget.
//!
//! # How It Works
//!
//! 1. [`CaptureScope::enter()`] pushes a fresh buffer on a thread-local stack.
//! 2. Writers append to the innermost buffer.
//! 3. [`CaptureScope::finish()`] (or drop) pops the buffer.
//!
//! Process-wide stdout/stderr are never swapped, so one widget's scope cannot
//! swallow another thread's output.
//!
//! # Limitations
//!
//! Plain `println!` and direct writes to `std::io::stdout()` bypass the scope;
//! listener code has to use the macros or a `CapturedWriter`.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use nbwire_core::ListenerFault;

type Buffer = Rc<RefCell<Vec<u8>>>;

thread_local! {
    static CAPTURE_STACK: RefCell<Vec<Buffer>> = const { RefCell::new(Vec::new()) };
}

/// Guard owning one level of the capture stack.
///
/// Scopes nest; writes go to the innermost one. Dropping a scope also drops
/// every scope entered after it that is still on the stack.
pub struct CaptureScope {
    buffer: Buffer,
    level: usize,
}

impl std::fmt::Debug for CaptureScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureScope")
            .field("level", &self.level)
            .field("bytes", &self.buffer.borrow().len())
            .finish()
    }
}

impl CaptureScope {
    /// Start capturing on the current thread.
    #[must_use = "output is only captured while the scope is alive"]
    pub fn enter() -> Self {
        let buffer: Buffer = Rc::new(RefCell::new(Vec::new()));
        let level = CAPTURE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Rc::clone(&buffer));
            stack.len() - 1
        });
        Self { buffer, level }
    }

    /// Whether any scope is live on the current thread.
    #[must_use]
    pub fn is_active() -> bool {
        CAPTURE_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Text captured so far. Invalid UTF-8 is replaced with U+FFFD.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.borrow()).into_owned()
    }

    /// Stop capturing and return everything captured.
    #[must_use]
    pub fn finish(self) -> String {
        self.contents()
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        CAPTURE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert!(
                stack
                    .get(self.level)
                    .is_some_and(|b| Rc::ptr_eq(b, &self.buffer))
            );
            stack.truncate(self.level);
        });
    }
}

/// Append bytes to the innermost scope.
///
/// Returns `false` when no scope is live; callers fall back to the real
/// stream.
pub fn try_capture(bytes: &[u8]) -> bool {
    CAPTURE_STACK.with(|stack| match stack.borrow().last() {
        Some(buffer) => {
            buffer.borrow_mut().extend_from_slice(bytes);
            true
        }
        None => false,
    })
}

/// A [`Write`] adapter that appends to the innermost capture scope.
///
/// Without a live scope, writes are accepted and discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapturedWriter;

impl Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        try_capture(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Like `println!`, but captured by a live [`CaptureScope`].
#[macro_export]
macro_rules! nb_println {
    () => {
        $crate::nb_println!("")
    };
    ($($arg:tt)*) => {{
        let msg = ::std::format!("{}\n", ::std::format_args!($($arg)*));
        if !$crate::capture::try_capture(msg.as_bytes()) {
            ::std::print!("{}", msg);
        }
    }};
}

/// Like `eprintln!`, but captured by a live [`CaptureScope`].
#[macro_export]
macro_rules! nb_eprintln {
    () => {
        $crate::nb_eprintln!("")
    };
    ($($arg:tt)*) => {{
        let msg = ::std::format!("{}\n", ::std::format_args!($($arg)*));
        if !$crate::capture::try_capture(msg.as_bytes()) {
            ::std::eprint!("{}", msg);
        }
    }};
}

/// Escape text for inclusion in HTML element content or attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    v_htmlescape::escape(text).to_string()
}

/// Markup block for captured output.
#[must_use]
pub fn output_block(captured: &str) -> String {
    format!("<pre>{}</pre>", escape_html(captured))
}

/// Markup block for a listener fault report.
#[must_use]
pub fn fault_block(fault: &ListenerFault) -> String {
    format!(
        "<pre style=\"color:red;text-align:left\">{}</pre>",
        escape_html(&fault.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_lifecycle() {
        assert!(!CaptureScope::is_active());
        let scope = CaptureScope::enter();
        assert!(CaptureScope::is_active());
        drop(scope);
        assert!(!CaptureScope::is_active());
    }

    #[test]
    fn try_capture_without_scope_returns_false() {
        assert!(!try_capture(b"hello"));
    }

    #[test]
    fn captures_macro_output() {
        let scope = CaptureScope::enter();
        crate::nb_println!("count = {}", 42);
        crate::nb_eprintln!("warn: {}", "low");
        assert_eq!(scope.finish(), "count = 42\nwarn: low\n");
    }

    #[test]
    fn println_empty() {
        let scope = CaptureScope::enter();
        crate::nb_println!();
        assert_eq!(scope.finish(), "\n");
    }

    #[test]
    fn nested_scopes_capture_innermost() {
        let outer = CaptureScope::enter();
        try_capture(b"outer-1 ");
        {
            let inner = CaptureScope::enter();
            try_capture(b"inner");
            assert_eq!(inner.finish(), "inner");
        }
        try_capture(b"outer-2");
        assert_eq!(outer.finish(), "outer-1 outer-2");
    }

    #[test]
    fn writer_appends_to_scope() {
        let scope = CaptureScope::enter();
        let mut w = CapturedWriter;
        write!(w, "via writer").unwrap();
        assert_eq!(scope.contents(), "via writer");
    }

    #[test]
    fn writer_without_scope_is_silent() {
        let mut w = CapturedWriter;
        assert!(write!(w, "discarded").is_ok());
    }

    #[test]
    fn scope_popped_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _scope = CaptureScope::enter();
            panic!("inside scope");
        });
        assert!(result.is_err());
        assert!(!CaptureScope::is_active());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let scope = CaptureScope::enter();
        try_capture(&[0x66, 0xff, 0x6f]);
        assert_eq!(scope.finish(), "f\u{fffd}o");
    }

    #[test]
    fn blocks_escape_markup() {
        assert_eq!(output_block("<b>&"), "<pre>&lt;b&gt;&amp;</pre>");
        let closing = escape_html("</script>");
        assert!(closing.starts_with("&lt;"));
        assert!(!closing.contains("</"));
        let fault = ListenerFault {
            trigger: Some("p".into()),
            message: "bad <value>".into(),
            panicked: false,
        };
        assert_eq!(
            fault_block(&fault),
            "<pre style=\"color:red;text-align:left\">error in listener for &#x27;p&#x27;: bad &lt;value&gt;</pre>"
        );
    }
}
