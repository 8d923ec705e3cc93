#![forbid(unsafe_code)]

//! nbwire public facade crate.
//!
//! Data-bound widgets for notebook front ends: triggers and properties on the
//! backend, mirrored into browser views over the host's messaging channel.

pub use nbwire_core as core;
pub use nbwire_core::{
    Error, Event, Listener, ListenerFault, Model, Property, Result, Trigger, accessors,
};

#[cfg(feature = "runtime")]
pub use nbwire_runtime as runtime;
#[cfg(feature = "runtime")]
pub use nbwire_runtime::{nb_eprintln, nb_println};

#[cfg(feature = "testing")]
pub use nbwire_harness as harness;

pub mod prelude {
    pub use nbwire_core::json::JsonRepr;
    pub use nbwire_core::{Event, Listener, Model, Property, Trigger, accessors};

    #[cfg(feature = "runtime")]
    pub use nbwire_runtime::{
        HostKind, RuntimeConfig, Transport, Widget, WidgetConfig, WidgetView, nb_println,
    };
}
