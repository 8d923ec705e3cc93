#![forbid(unsafe_code)]

//! Property-based and scenario tests for trigger/property binding.

use std::cell::RefCell;
use std::rc::Rc;

use nbwire_core::{Error, Listener, Model, Property};
use proptest::prelude::*;
use serde_json::{Value, json};

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (-1.0e9..1.0e9f64).prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn set_then_value_roundtrips(initial in json_value(), next in json_value()) {
        let p = Property::new(initial);
        p.set(next.clone()).unwrap();
        prop_assert_eq!(p.value(), next);
    }

    #[test]
    fn bound_child_follows_parent(a0 in json_value(), b0 in json_value(), next in json_value()) {
        let a = Property::new(a0);
        let b = Property::new(b0.clone());
        a.set(&b).unwrap();
        prop_assert_eq!(a.value(), b0);
        b.set(next.clone()).unwrap();
        prop_assert_eq!(a.value(), next);
    }

    #[test]
    fn reverse_bind_always_rejected(depth in 1usize..6) {
        let chain: Vec<Property> = (0..=depth).map(|i| Property::new(i as i64)).collect();
        for pair in chain.windows(2) {
            pair[1].set(&pair[0]).unwrap();
        }
        let err = chain[0].set(&chain[depth]).unwrap_err();
        let is_cycle = matches!(err, Error::Cycle { .. });
        prop_assert!(is_cycle, "expected a cycle error, got {:?}", err);
        prop_assert!(chain[0].parent().is_none());
    }
}

#[test]
fn view_originated_trigger_reaches_model_listener() {
    let model = Model::new();
    let p = Property::new(5);
    model.set("p", &p).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    model
        .on(
            "p",
            &Listener::infallible(move |ev| s.borrow_mut().push(ev.value().clone())),
        )
        .unwrap();

    p.trigger(10).unwrap();
    assert_eq!(*seen.borrow(), vec![json!(10)]);
    assert_eq!(p.value(), json!(10));
}

#[test]
fn bind_then_parent_update() {
    let a = Property::new(1);
    let b = Property::new(2);
    a.set(&b).unwrap();
    assert_eq!(a.value(), json!(2));
    b.set(json!(99)).unwrap();
    assert_eq!(a.value(), json!(99));
}

#[test]
fn shared_parent_fans_out_to_siblings() {
    let root = Property::new(0);
    let left = Property::bound_to(&root).unwrap();
    let right = Property::bound_to(&root).unwrap();
    left.set(json!("from left")).unwrap();
    assert_eq!(root.value(), json!("from left"));
    assert_eq!(right.value(), json!("from left"));
}
