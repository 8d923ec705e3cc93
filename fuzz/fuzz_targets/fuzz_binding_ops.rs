#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use nbwire_core::{Error, Property};
use serde_json::json;

const SLOTS: usize = 8;

#[derive(Debug, Arbitrary)]
enum Op {
    Set { slot: u8, value: i32 },
    Bind { child: u8, parent: u8 },
}

fuzz_target!(|ops: Vec<Op>| {
    let props: Vec<Property> = (0..SLOTS).map(|i| Property::new(i as i64)).collect();
    let pick = |n: u8| &props[n as usize % SLOTS];

    for op in ops.iter().take(256) {
        match *op {
            Op::Set { slot, value } => {
                let p = pick(slot);
                p.set(json!(value)).expect("plain set cannot fail without listeners");
                let mut root = p.as_trigger().clone();
                while let Some(parent) = root.parent() {
                    root = parent;
                }
                let root = root.as_property().expect("properties only bind to properties");
                assert_eq!(root.value(), json!(value));
                assert_eq!(p.value(), json!(value));
            }
            Op::Bind { child, parent } => {
                let (c, p) = (pick(child), pick(parent));
                match c.set(p) {
                    Ok(()) => assert_eq!(c.value(), p.value()),
                    Err(Error::Cycle { .. }) => {}
                    Err(other) => panic!("unexpected bind error: {other}"),
                }
            }
        }
    }

    for p in &props {
        let mut steps = 0;
        let mut cursor = p.parent();
        while let Some(next) = cursor {
            steps += 1;
            assert!(steps <= SLOTS, "parent chain must be acyclic");
            cursor = next.parent();
        }
    }
});
