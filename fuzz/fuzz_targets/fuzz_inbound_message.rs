#![no_main]

use libfuzzer_sys::fuzz_target;
use nbwire_runtime::{Inbound, Outbound, ViewModel, WidgetId};
use serde_json::{Map, Value};

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    if let Ok(inbound) = Inbound::from_wire(&payload) {
        assert!(payload.as_array().is_some_and(|a| !a.is_empty()));
        let _ = inbound.name.len();
    }

    if let Ok(outbound) = Outbound::from_wire(&payload) {
        assert_eq!(outbound.to_wire(), payload);
    }

    let view = ViewModel::new(WidgetId::next(), Map::new(), |_| {});
    let _ = view.receive_wire(&payload);
});
