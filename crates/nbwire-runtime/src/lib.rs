#![forbid(unsafe_code)]

//! Widget runtime for nbwire.
//!
//! Connects [`nbwire_core`] models to notebook views:
//!
//! - [`widget`]: [`Widget`], the model + view binding, rendering and the
//!   remote-update boundary where listener faults are captured.
//! - [`transport`]: the [`Transport`] seam and its broadcast, comm and
//!   detached implementations.
//! - [`capture`]: scoped output capture used around remote updates.
//! - [`view`]: [`ViewModel`], the view side of the protocol.
//! - [`config`]: host selection and per-widget settings.
//!
//! The host integration layer chooses a transport explicitly, from
//! [`RuntimeConfig`] or otherwise, and hands it to every widget it creates.

pub mod capture;
pub mod config;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod transport;
pub mod view;
pub mod widget;

use std::rc::Rc;

pub use capture::{CaptureScope, CapturedWriter};
pub use config::{CommConfig, HostKind, RuntimeConfig, WidgetConfig};
pub use error::RuntimeError;
pub use transport::{
    BroadcastHost, BroadcastTransport, Comm, CommEndpoint, CommHost, CommTransport,
    ConnectionState, DetachedTransport, Inbound, Outbound, Transport, WidgetId,
};
pub use view::ViewModel;
pub use widget::{PlainView, RemoteReport, Widget, WidgetBuilder, WidgetView};

/// Host primitives for whichever substrate a process runs on.
///
/// Used with [`transport_for`] when the host kind comes from configuration.
pub enum HostBinding {
    Broadcast(Rc<dyn BroadcastHost>),
    Comm(Rc<dyn CommHost>),
    Detached,
}

impl std::fmt::Debug for HostBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Broadcast(_) => "HostBinding::Broadcast",
            Self::Comm(_) => "HostBinding::Comm",
            Self::Detached => "HostBinding::Detached",
        })
    }
}

impl HostBinding {
    #[must_use]
    pub fn kind(&self) -> HostKind {
        match self {
            Self::Broadcast(_) => HostKind::Broadcast,
            Self::Comm(_) => HostKind::Comm,
            Self::Detached => HostKind::Detached,
        }
    }
}

/// Build the transport for `binding`, applying `config`.
///
/// # Errors
///
/// [`RuntimeError::InvalidConfig`] when `config.host` names a different
/// substrate than the one supplied.
pub fn transport_for(
    config: &RuntimeConfig,
    binding: HostBinding,
) -> Result<Rc<dyn Transport>, RuntimeError> {
    if binding.kind() != config.host {
        return Err(RuntimeError::InvalidConfig {
            key: "NBWIRE_HOST",
            value: format!("{} (host provides {})", config.host, binding.kind()),
        });
    }
    let transport: Rc<dyn Transport> = match binding {
        HostBinding::Broadcast(host) => Rc::new(BroadcastTransport::new(host)),
        HostBinding::Comm(host) => Rc::new(CommTransport::with_config(host, config.comm.clone())),
        HostBinding::Detached => Rc::new(DetachedTransport::new()),
    };
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_matches_configured_host() {
        let config = RuntimeConfig::default();
        let transport = transport_for(&config, HostBinding::Detached).unwrap();
        assert_eq!(transport.kind(), HostKind::Detached);
    }

    #[test]
    fn mismatched_host_is_rejected() {
        let config = RuntimeConfig {
            host: HostKind::Comm,
            ..RuntimeConfig::default()
        };
        let Err(err) = transport_for(&config, HostBinding::Detached) else {
            panic!("comm config must reject a detached binding");
        };
        assert!(matches!(err, RuntimeError::InvalidConfig { .. }));
    }
}
