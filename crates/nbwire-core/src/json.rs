#![forbid(unsafe_code)]

//! Permissive JSON conversion for values crossing to the view.
//!
//! Anything that reaches the wire has to be plain JSON. [`permissive`]
//! converts any `Serialize` value and degrades what JSON cannot express to
//! `null` instead of failing. Types that want a custom wire shape implement
//! [`JsonRepr`] and are assigned with
//! [`Model::set_repr`](crate::Model::set_repr) or an `as repr` accessor;
//! array-like numeric buffers become nested number lists via
//! [`nested_array`].

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Custom wire representation hook.
pub trait JsonRepr {
    /// The JSON value sent to the view for `self`.
    fn json_repr(&self) -> Value;
}

impl JsonRepr for Value {
    fn json_repr(&self) -> Value {
        self.clone()
    }
}

/// Convert `value` to JSON, degrading unrepresentable values to `null`.
///
/// Non-finite floats become `null`; a value serde cannot encode (a map with
/// non-string keys, a failing `Serialize` impl) becomes `null` as a whole.
pub fn permissive<T: Serialize + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(err) => {
            debug!(%err, "value not representable as JSON; sending null");
            Value::Null
        }
    }
}

/// Convert a row-major numeric buffer of the given shape into nested lists.
///
/// Returns `null` when the shape does not match the buffer length. A zero-rank
/// shape yields the single scalar.
#[must_use]
pub fn nested_array(shape: &[usize], data: &[f64]) -> Value {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        debug!(
            expected,
            actual = data.len(),
            "array shape mismatch; sending null"
        );
        return Value::Null;
    }
    build_nested(shape, data)
}

fn build_nested(shape: &[usize], data: &[f64]) -> Value {
    match shape.split_first() {
        None => data.first().map_or(Value::Null, |&x| Value::from(x)),
        Some((_, [])) => Value::Array(data.iter().map(|&x| Value::from(x)).collect()),
        Some((&len, rest)) => {
            let stride: usize = rest.iter().product();
            Value::Array(
                (0..len)
                    .map(|i| build_nested(rest, &data[i * stride..(i + 1) * stride]))
                    .collect(),
            )
        }
    }
}

/// Encode `value` as compact JSON text.
#[must_use]
pub fn dump(value: &Value) -> String {
    value.to_string()
}

/// Make JSON text safe to embed inside an HTML `<script>` element.
#[must_use]
pub fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}

/// Strip leading indentation from every line of a script and drop blank
/// lines. A run of line breaks and whitespace collapses to one `\n`.
#[must_use]
pub fn minify(script: &str) -> String {
    let Some((first, rest)) = script.split_once('\n') else {
        return script.to_owned();
    };
    let mut out = String::with_capacity(script.len());
    out.push_str(first);
    // Every segment of `rest` follows a line break.
    let mut trailing_break = false;
    for line in rest.split('\n') {
        let line = line.trim_start();
        if line.is_empty() {
            trailing_break = true;
            continue;
        }
        out.push('\n');
        out.push_str(line);
        trailing_break = false;
    }
    if trailing_break {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn permissive_passes_plain_data() {
        #[derive(Serialize)]
        struct Point {
            x: i32,
            y: i32,
        }
        assert_eq!(permissive(&Point { x: 1, y: 2 }), json!({"x": 1, "y": 2}));
    }

    #[test]
    fn permissive_degrades_non_finite_floats() {
        assert_eq!(permissive(&f64::NAN), Value::Null);
        assert_eq!(permissive(&vec![1.0, f64::INFINITY]), json!([1.0, null]));
    }

    #[test]
    fn permissive_degrades_unencodable_maps() {
        let mut m = BTreeMap::new();
        m.insert((1, 2), "pair key");
        assert_eq!(permissive(&m), Value::Null);
    }

    #[test]
    fn custom_repr_reaches_listeners() {
        use crate::{Listener, Model, Property};
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Rgb(u8, u8, u8);
        impl JsonRepr for Rgb {
            fn json_repr(&self) -> Value {
                Value::String(format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2))
            }
        }

        let model = Model::new();
        model.set("color", Property::new(Value::Null)).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        model
            .on(
                "color",
                &Listener::infallible(move |ev| sink.borrow_mut().push(ev.value().clone())),
            )
            .unwrap();

        model.set_repr("color", &Rgb(255, 0, 16)).unwrap();
        assert_eq!(model.value("color").unwrap(), json!("#ff0010"));
        assert_eq!(*seen.borrow(), vec![json!("#ff0010")]);
    }

    #[test]
    fn nested_array_shapes() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(
            nested_array(&[2, 3], &data),
            json!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])
        );
        assert_eq!(nested_array(&[6], &data), json!([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        assert_eq!(nested_array(&[4], &data), Value::Null);
        assert_eq!(nested_array(&[], &[7.0]), json!(7.0));
    }

    #[test]
    fn script_safe_escapes_closing_tags() {
        let text = dump(&json!({"html": "</script>"}));
        assert_eq!(script_safe(&text), r#"{"html":"<\/script>"}"#);
    }

    #[test]
    fn minify_trims_indentation() {
        assert_eq!(minify("a {\n    b;\n  }"), "a {\nb;\n}");
    }

    #[test]
    fn minify_collapses_blank_lines() {
        assert_eq!(minify("a;\n\n    \n  b;\n\t\n}"), "a;\nb;\n}");
        assert_eq!(minify("a;\n  \n"), "a;\n");
        assert_eq!(minify("  a;"), "  a;");
    }
}
