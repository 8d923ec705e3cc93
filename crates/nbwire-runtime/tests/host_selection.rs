#![forbid(unsafe_code)]

//! Integration tests: configuration-driven transport selection and the wire
//! contract seen by a host.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use nbwire_runtime::transport::broadcast::{channel_name, invoke_name};
use nbwire_runtime::{
    BroadcastHost, HostBinding, HostKind, Outbound, RuntimeConfig, Widget, transport_for,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

#[derive(Default)]
struct Page {
    posts: RefCell<Vec<(String, Value)>>,
    callbacks: RefCell<HashMap<String, Rc<dyn Fn(Vec<Value>)>>>,
}

impl BroadcastHost for Page {
    fn post(&self, channel: &str, payload: Value) {
        self.posts.borrow_mut().push((channel.to_owned(), payload));
    }

    fn register_callback(&self, name: &str, callback: Box<dyn Fn(Vec<Value>)>) {
        self.callbacks
            .borrow_mut()
            .insert(name.to_owned(), Rc::from(callback));
    }
}

impl Page {
    fn invoke(&self, name: &str, args: Vec<Value>) {
        let callback = self.callbacks.borrow().get(name).cloned();
        if let Some(callback) = callback {
            callback(args);
        }
    }
}

fn config(host: &str) -> RuntimeConfig {
    RuntimeConfig::from_lookup(|key| (key == "NBWIRE_HOST").then(|| host.to_owned())).unwrap()
}

#[test]
fn colab_alias_selects_broadcast() {
    let page = Rc::new(Page::default());
    let transport = transport_for(&config("colab"), HostBinding::Broadcast(page.clone())).unwrap();
    assert_eq!(transport.kind(), HostKind::Broadcast);

    let widget = Widget::builder().property("n", 1).build(transport).unwrap();
    assert_eq!(widget.host(), HostKind::Broadcast);
    assert!(page.callbacks.borrow().contains_key(&invoke_name(widget.id())));
}

#[test]
fn broadcast_wire_round_trip() {
    let page = Rc::new(Page::default());
    let transport = transport_for(&config("broadcast"), HostBinding::Broadcast(page.clone())).unwrap();
    let widget = Widget::builder().property("n", 1).build(transport).unwrap();
    let _ = widget.render();

    page.invoke(&invoke_name(widget.id()), vec![json!("n"), json!(2)]);
    page.invoke(&invoke_name(widget.id()), vec![json!(17)]);

    assert_eq!(widget.value("n").unwrap(), json!(2));
    let posts = page.posts.borrow();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, channel_name(widget.id()));
    let decoded = Outbound::from_wire(&posts[0].1).unwrap();
    assert_eq!(decoded.id, widget.id());
    assert_eq!(decoded.name, "n");
    assert_eq!(decoded.value, json!(2));
}

#[test]
fn configured_host_must_match_binding() {
    let page = Rc::new(Page::default());
    assert!(transport_for(&config("jupyter"), HostBinding::Broadcast(page)).is_err());
    assert!(transport_for(&config("none"), HostBinding::Detached).is_ok());
}
