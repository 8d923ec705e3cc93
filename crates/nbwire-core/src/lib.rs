#![forbid(unsafe_code)]

//! Data-binding core for nbwire notebook widgets.
//!
//! The core is transport-agnostic. It provides:
//!
//! - [`Trigger`]: a named, listenable notification point with an optional
//!   parent; `trigger` always runs `handle` at the root of the chain.
//! - [`Property`]: a trigger that remembers its last value.
//! - [`Model`]: a registry mapping names to triggers, properties, and plain
//!   values, with whitespace-separated bulk `on`/`off`.
//! - [`Event`]: the payload handed to every [`Listener`].
//! - [`Dispatch`]: the re-entrancy context that silences nested user
//!   listeners while letting internal plumbing through.
//!
//! # V-shaped propagation
//!
//! A view never writes state directly. It asks the backend to `trigger` a
//! property; the root property stores the value and notifies; one of its
//! internal listeners relays the confirmed value back to the view.
//!
//! ```text
//! view set ->                       -> view listeners
//!    trigger ->                 -> relay to view
//!                 root handle -> notify
//! ```

pub mod dispatch;
pub mod error;
pub mod event;
pub mod json;
pub mod listener;
pub mod model;
pub mod trigger;

pub use dispatch::{Dispatch, HandlerGuard};
pub use error::{Error, Fault, ListenerFault, Result};
pub use event::Event;
pub use listener::Listener;
pub use model::{Member, Model, ModelRef, Slot};
pub use trigger::{Assign, Property, Trigger};

/// Generate typed getters and setters for properties of a model-backed type.
///
/// The type must implement `AsRef<Model>`. Each entry `name: Type => setter`
/// produces `fn name(&self) -> Result<Type>` (decoding the stored value) and
/// `fn setter(&self, value: Type) -> Result<()>` (encoding permissively).
/// Writing `name: Type => setter as repr` encodes through
/// [`json::JsonRepr`] instead.
///
/// ```
/// use nbwire_core::{Model, Property, accessors};
///
/// struct Slider(Model);
///
/// impl AsRef<Model> for Slider {
///     fn as_ref(&self) -> &Model {
///         &self.0
///     }
/// }
///
/// accessors! {
///     Slider {
///         value: f64 => set_value,
///         label: String => set_label,
///     }
/// }
///
/// let slider = Slider(Model::new());
/// slider.0.set("value", Property::new(0.5)).unwrap();
/// slider.0.set("label", Property::new("gain")).unwrap();
/// slider.set_value(0.75).unwrap();
/// assert_eq!(slider.value().unwrap(), 0.75);
/// assert_eq!(slider.label().unwrap(), "gain");
/// ```
#[macro_export]
macro_rules! accessors {
    (@encode $value:ident) => {
        $crate::json::permissive(&$value)
    };
    (@encode repr $value:ident) => {
        $crate::json::JsonRepr::json_repr(&$value)
    };
    ($ty:ty { $($name:ident : $vt:ty => $setter:ident $(as $enc:ident)?),* $(,)? }) => {
        impl $ty {
            $(
                #[doc = concat!("Current value of `", stringify!($name), "`.")]
                pub fn $name(&self) -> $crate::Result<$vt> {
                    ::core::convert::AsRef::<$crate::Model>::as_ref(self)
                        .get_as::<$vt>(stringify!($name))
                }

                #[doc = concat!("Assign `", stringify!($name), "`, notifying listeners.")]
                pub fn $setter(&self, value: $vt) -> $crate::Result<()> {
                    ::core::convert::AsRef::<$crate::Model>::as_ref(self)
                        .set(stringify!($name), $crate::accessors!(@encode $($enc)? value))
                }
            )*
        }
    };
}
