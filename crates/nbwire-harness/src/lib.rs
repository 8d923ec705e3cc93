#![forbid(unsafe_code)]

//! Test harness for nbwire widgets.
//!
//! Provides in-memory versions of both notebook host substrates and a
//! simulated view, so a widget can be exercised end to end without a
//! browser or kernel:
//!
//! ```
//! use std::rc::Rc;
//! use nbwire_harness::{MemoryCommHost, ViewSession};
//! use nbwire_runtime::{CommTransport, Widget};
//! use serde_json::json;
//!
//! let host = MemoryCommHost::new();
//! let transport = Rc::new(CommTransport::new(Rc::clone(&host)));
//! let widget = Widget::builder().property("value", 1).build(transport).unwrap();
//!
//! let session = ViewSession::comm(&widget, &host).unwrap();
//! session.view().set("value", 5);
//! session.pump();
//!
//! assert_eq!(widget.value("value").unwrap(), json!(5));
//! assert_eq!(session.view().get("value"), Some(json!(5)));
//! ```

pub mod error;
pub mod hosts;
pub mod session;

pub use error::HarnessError;
pub use hosts::{MemoryBroadcastHost, MemoryComm, MemoryCommHost};
pub use session::ViewSession;
