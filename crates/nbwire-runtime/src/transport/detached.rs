#![forbid(unsafe_code)]

//! Transport for processes with no notebook host.
//!
//! Every operation is a no-op. The first use in the process logs a single
//! warning so a missing host is visible without failing widget code.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{trace, warn};

use super::{Outbound, ReceiveHandler, Transport, WidgetId};
use crate::config::HostKind;

const SCRIPT: &str = include_str!("../../assets/detached.js");

static WARNED: AtomicBool = AtomicBool::new(false);

fn report_unavailable(flag: &AtomicBool) {
    if !flag.swap(true, Ordering::Relaxed) {
        warn!("no notebook host configured; widget updates will not reach any view");
    }
}

/// [`Transport`] that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedTransport;

impl DetachedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transport for DetachedTransport {
    fn kind(&self) -> HostKind {
        HostKind::Detached
    }

    fn send(&self, message: Outbound) {
        report_unavailable(&WARNED);
        trace!(widget = %message.id, name = %message.name, "detached transport dropped message");
    }

    fn on_receive(&self, _id: WidgetId, _handler: ReceiveHandler) {
        report_unavailable(&WARNED);
    }

    fn view_script(&self) -> &'static str {
        SCRIPT
    }
}
