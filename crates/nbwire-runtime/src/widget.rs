#![forbid(unsafe_code)]

//! Widgets: models with a live view binding over a transport.
//!
//! A [`Widget`] owns a [`Model`] and wires it to a [`Transport`]:
//!
//! - every trigger installed in the model gets an internal relay listener
//!   that forwards each notification to the views as
//!   `(widget_id, name, value)`, dropped while no view has been rendered;
//! - every inbound `(name, value)` from a view is raised with
//!   `prop(name).trigger(value)` inside a capture scope, so listener output,
//!   errors and panics are rendered next to the widget instead of escaping.
//!
//! Every widget carries three standard members: `style` and `data`
//! (properties mirrored onto the root element's style and dataset) and
//! `write` (a trigger whose payload is inserted as markup before the root).
//!
//! Concrete widgets implement [`WidgetView`] for their markup and script,
//! wrap a `Widget`, and usually generate typed accessors with
//! [`nbwire_core::accessors!`].

use std::borrow::Cow;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use nbwire_core::json::{self, JsonRepr};
use nbwire_core::{Assign, Event, Listener, ListenerFault, Model, Property, Trigger};

use crate::capture::{self, CaptureScope};
use crate::config::{HostKind, WidgetConfig};
use crate::error::RuntimeError;
use crate::transport::{Inbound, Outbound, Transport, WidgetId};

const MODEL_JS: &str = include_str!("../assets/model.js");
const STD_WIDGET_JS: &str = include_str!("../assets/std_widget.js");

/// Name of the standard style property.
pub const STYLE: &str = "style";
/// Name of the standard dataset property.
pub const DATA: &str = "data";
/// Name of the standard markup-insertion trigger.
pub const WRITE: &str = "write";

// ---------------------------------------------------------------------------
// View definition
// ---------------------------------------------------------------------------

/// Markup and script for one kind of widget.
pub trait WidgetView {
    /// Initial markup. Must contain an element with `widget.view_id()` as
    /// its id; [`Widget::std_attrs`] renders that attribute.
    fn html(&self, widget: &Widget) -> String {
        format!("<div {}></div>", widget.std_attrs())
    }

    /// Script run in the view after the standard bindings. `model` and
    /// `element` are in scope.
    fn script(&self, _widget: &Widget) -> Cow<'static, str> {
        Cow::Borrowed("")
    }
}

/// A view with the default empty root element and no script.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainView;

impl WidgetView for PlainView {}

/// What happened while applying one view-originated update.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoteReport {
    /// Text listeners printed through the capture macros.
    pub output: String,
    /// Faults raised by listeners (or by the lookup itself).
    pub faults: Vec<ListenerFault>,
}

impl RemoteReport {
    /// No output and no faults.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.output.is_empty() && self.faults.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`Widget`].
pub struct WidgetBuilder {
    style: Value,
    data: Value,
    members: Vec<(String, Assign)>,
    view: Box<dyn WidgetView>,
    config: WidgetConfig,
}

impl Default for WidgetBuilder {
    fn default() -> Self {
        Self {
            style: Value::Object(Map::new()),
            data: Value::Object(Map::new()),
            members: Vec::new(),
            view: Box::new(PlainView),
            config: WidgetConfig::default(),
        }
    }
}

impl fmt::Debug for WidgetBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetBuilder")
            .field("style", &self.style)
            .field("data", &self.data)
            .field(
                "members",
                &self.members.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WidgetBuilder {
    /// Initial CSS properties for the root element.
    #[must_use]
    pub fn style(mut self, style: impl Into<Value>) -> Self {
        self.style = style.into();
        self
    }

    /// Initial dataset attributes for the root element.
    #[must_use]
    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    /// Add a property holding `initial`.
    #[must_use]
    pub fn property(self, name: &str, initial: impl Into<Value>) -> Self {
        self.member(name, Property::new(initial))
    }

    /// Add a bare trigger.
    #[must_use]
    pub fn trigger(self, name: &str) -> Self {
        self.member(name, Trigger::new())
    }

    /// Add an arbitrary member: a trigger, a (possibly bound) property, or a
    /// plain value.
    #[must_use]
    pub fn member(mut self, name: &str, member: impl Into<Assign>) -> Self {
        self.members.push((name.to_owned(), member.into()));
        self
    }

    /// Markup and script provider.
    #[must_use]
    pub fn view(mut self, view: impl WidgetView + 'static) -> Self {
        self.view = Box::new(view);
        self
    }

    #[must_use]
    pub fn config(mut self, config: WidgetConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the widget and register it with `transport`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Bind`] if a member cannot be installed, for example a
    /// trigger already owned by another model, or a bound property whose
    /// initial notification fails.
    pub fn build(self, transport: Rc<dyn Transport>) -> Result<Widget, RuntimeError> {
        let widget = Widget {
            inner: Rc::new(WidgetInner {
                id: WidgetId::next(),
                model: Model::new(),
                view_count: Cell::new(0),
                transport,
                view: self.view,
                config: self.config,
            }),
        };
        let inner = &widget.inner;

        let weak = Rc::downgrade(inner);
        inner.model.on_install(move |trigger: &Trigger| {
            let weak = weak.clone();
            trigger.on_internal(&Listener::infallible(move |event: &Event| {
                if let Some(inner) = weak.upgrade() {
                    inner.relay(event);
                }
            }));
        });

        let weak: Weak<WidgetInner> = Rc::downgrade(inner);
        inner.transport.on_receive(
            inner.id,
            Rc::new(move |message: Inbound| {
                if let Some(inner) = weak.upgrade() {
                    let _ = Widget { inner }.handle_remote_set(&message.name, message.value);
                }
            }),
        );

        inner.model.set(STYLE, Property::new(self.style))?;
        inner.model.set(DATA, Property::new(self.data))?;
        inner.model.set(WRITE, Trigger::new())?;
        for (name, member) in self.members {
            inner.model.set(&name, member)?;
        }
        debug!(widget = %inner.id, host = %inner.transport.kind(), "widget created");
        Ok(widget)
    }
}

// ---------------------------------------------------------------------------
// Widget
// ---------------------------------------------------------------------------

struct WidgetInner {
    id: WidgetId,
    model: Model,
    view_count: Cell<u64>,
    transport: Rc<dyn Transport>,
    view: Box<dyn WidgetView>,
    config: WidgetConfig,
}

impl WidgetInner {
    fn relay(&self, event: &Event) {
        let Some(name) = event.name() else {
            return;
        };
        if self.view_count.get() == 0 {
            trace!(widget = %self.id, name, "no view rendered; relay dropped");
            return;
        }
        self.transport.send(Outbound {
            id: self.id,
            name: name.to_owned(),
            value: event.value().clone(),
        });
    }
}

impl Drop for WidgetInner {
    fn drop(&mut self) {
        self.transport.forget(self.id);
        trace!(widget = %self.id, "widget dropped");
    }
}

/// A model bound to views over a transport. Cloning shares the widget.
#[derive(Clone)]
pub struct Widget {
    inner: Rc<WidgetInner>,
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Widget")
            .field("id", &self.inner.id)
            .field("host", &self.inner.transport.kind())
            .field("views", &self.inner.view_count.get())
            .field("model", &self.inner.model)
            .finish()
    }
}

impl AsRef<Model> for Widget {
    fn as_ref(&self) -> &Model {
        &self.inner.model
    }
}

impl Widget {
    /// Start building a widget.
    #[must_use]
    pub fn builder() -> WidgetBuilder {
        WidgetBuilder::default()
    }

    /// A widget with only the standard members.
    ///
    /// # Errors
    ///
    /// See [`WidgetBuilder::build`].
    pub fn new(transport: Rc<dyn Transport>) -> Result<Self, RuntimeError> {
        Self::builder().build(transport)
    }

    #[must_use]
    pub fn id(&self) -> WidgetId {
        self.inner.id
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    #[must_use]
    pub fn host(&self) -> HostKind {
        self.inner.transport.kind()
    }

    /// Number of views rendered so far.
    #[must_use]
    pub fn view_count(&self) -> u64 {
        self.inner.view_count.get()
    }

    /// Element id of the view currently being rendered. Changes on every
    /// [`render`](Self::render).
    #[must_use]
    pub fn view_id(&self) -> String {
        format!("_{}_{}", self.inner.id, self.inner.view_count.get())
    }

    /// Standard attributes for the root element.
    #[must_use]
    pub fn std_attrs(&self) -> String {
        format!("id=\"{}\"", capture::escape_html(&self.view_id()))
    }

    /// Assign `name` on the model.
    ///
    /// # Errors
    ///
    /// See [`Model::set`].
    pub fn set(&self, name: &str, assign: impl Into<Assign>) -> nbwire_core::Result<()> {
        self.inner.model.set(name, assign)
    }

    /// Assign the custom wire form of `value` to `name`.
    ///
    /// # Errors
    ///
    /// See [`Model::set_repr`].
    pub fn set_repr<T: JsonRepr + ?Sized>(&self, name: &str, value: &T) -> nbwire_core::Result<()> {
        self.inner.model.set_repr(name, value)
    }

    /// # Errors
    ///
    /// See [`Model::value`].
    pub fn value(&self, name: &str) -> nbwire_core::Result<Value> {
        self.inner.model.value(name)
    }

    /// # Errors
    ///
    /// See [`Model::get_as`].
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> nbwire_core::Result<T> {
        self.inner.model.get_as(name)
    }

    /// # Errors
    ///
    /// See [`Model::prop`].
    pub fn prop(&self, name: &str) -> nbwire_core::Result<Trigger> {
        self.inner.model.prop(name)
    }

    /// # Errors
    ///
    /// See [`Model::property`].
    pub fn property(&self, name: &str) -> nbwire_core::Result<Property> {
        self.inner.model.property(name)
    }

    /// # Errors
    ///
    /// See [`Model::on`].
    pub fn on(&self, names: &str, listener: &Listener) -> nbwire_core::Result<&Self> {
        self.inner.model.on(names, listener)?;
        Ok(self)
    }

    /// # Errors
    ///
    /// See [`Model::off`].
    pub fn off(&self, names: &str, listener: Option<&Listener>) -> nbwire_core::Result<&Self> {
        self.inner.model.off(names, listener)?;
        Ok(self)
    }

    /// Apply a view-originated update: `prop(name).trigger(value)`.
    ///
    /// Nothing escapes. Listener faults, panics and lookup failures become
    /// [`ListenerFault`]s; the value has already been committed by then. With
    /// output capture enabled, captured text and one block per fault are
    /// written through the `write` trigger so they appear above the widget.
    pub fn handle_remote_set(&self, name: &str, value: Value) -> RemoteReport {
        let scope = self.inner.config.capture_output.then(CaptureScope::enter);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.inner.model.prop(name)?.trigger(value)
        }));
        let output = scope.map(CaptureScope::finish).unwrap_or_default();

        let faults = match outcome {
            Ok(Ok(())) => Vec::new(),
            Ok(Err(err)) => err.into_faults(Some(name)),
            Err(payload) => vec![ListenerFault::from_panic(Some(name), payload.as_ref())],
        };
        for fault in &faults {
            warn!(widget = %self.inner.id, %fault, "listener fault during remote update");
        }

        if self.inner.config.capture_output {
            if !output.is_empty() {
                self.write_markup(capture::output_block(&output));
            }
            for fault in &faults {
                self.write_markup(capture::fault_block(fault));
            }
        }
        RemoteReport { output, faults }
    }

    fn write_markup(&self, html: String) {
        let result = self
            .inner
            .model
            .prop(WRITE)
            .and_then(|write| write.trigger(html));
        if let Err(err) = result {
            warn!(widget = %self.inner.id, error = %err, "could not write to widget");
        }
    }

    /// Render a new view instance: markup followed by an inline script that
    /// seeds the view cache with every property value and installs the
    /// standard bindings and the widget's own script.
    #[must_use]
    pub fn render(&self) -> String {
        let inner = &self.inner;
        inner.view_count.set(inner.view_count.get() + 1);
        inner.transport.view_rendered(inner.id);

        let state = json::script_safe(&json::dump(&Value::Object(inner.model.snapshot())));
        let mut framework = String::new();
        framework.push_str(inner.transport.view_script());
        framework.push_str(MODEL_JS);
        framework.push_str(STD_WIDGET_JS);
        if inner.config.minify_scripts {
            framework = json::minify(&framework);
        }
        let framework = framework
            .replace("__NBWIRE_ID__", &inner.id.to_string())
            .replace("__NBWIRE_VIEW__", &self.view_id())
            .replace("__NBWIRE_STATE__", &state);

        let html = inner.view.html(self);
        let script = inner.view.script(self);
        debug!(widget = %inner.id, view = %self.view_id(), "rendered view");
        format!("{html}<script>(function() {{\n{framework}\n{script}\n}})();</script>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReceiveHandler;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Loopback {
        sent: RefCell<Vec<Outbound>>,
        handler: RefCell<Option<ReceiveHandler>>,
        rendered: Cell<u32>,
    }

    impl Loopback {
        fn deliver(&self, name: &str, value: Value) {
            let handler = self.handler.borrow().clone();
            if let Some(handler) = handler {
                handler(Inbound {
                    name: name.into(),
                    value,
                });
            }
        }

        fn sent_names(&self) -> Vec<String> {
            self.sent.borrow().iter().map(|m| m.name.clone()).collect()
        }
    }

    impl Transport for Loopback {
        fn kind(&self) -> HostKind {
            HostKind::Comm
        }

        fn send(&self, message: Outbound) {
            self.sent.borrow_mut().push(message);
        }

        fn on_receive(&self, _id: WidgetId, handler: ReceiveHandler) {
            *self.handler.borrow_mut() = Some(handler);
        }

        fn view_rendered(&self, _id: WidgetId) {
            self.rendered.set(self.rendered.get() + 1);
        }

        fn view_script(&self) -> &'static str {
            "function nbwireRecv(id, fn) {}\n"
        }
    }

    fn widget_with(builder: WidgetBuilder) -> (Widget, Rc<Loopback>) {
        let transport = Rc::new(Loopback::default());
        let widget = builder.build(transport.clone()).unwrap();
        (widget, transport)
    }

    #[test]
    fn standard_members_exist() {
        let (widget, _) = widget_with(Widget::builder().style(json!({"color": "red"})));
        assert_eq!(widget.value(STYLE).unwrap(), json!({"color": "red"}));
        assert_eq!(widget.value(DATA).unwrap(), json!({}));
        assert!(widget.prop(WRITE).unwrap().as_property().is_none());
    }

    #[test]
    fn relay_dropped_before_first_render() {
        let (widget, transport) = widget_with(Widget::builder().property("value", 1));
        widget.set("value", json!(2)).unwrap();
        assert!(transport.sent.borrow().is_empty());

        let _ = widget.render();
        widget.set("value", json!(3)).unwrap();
        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, widget.id());
        assert_eq!(sent[0].value, json!(3));
    }

    #[test]
    fn remote_set_echoes_confirmed_value() {
        let (widget, transport) = widget_with(Widget::builder().property("value", 5));
        let _ = widget.render();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        widget
            .on(
                "value",
                &Listener::infallible(move |ev| sink.borrow_mut().push(ev.value().clone())),
            )
            .unwrap();

        transport.deliver("value", json!(10));

        assert_eq!(widget.value("value").unwrap(), json!(10));
        assert_eq!(*seen.borrow(), vec![json!(10)]);
        assert_eq!(transport.sent_names(), vec!["value"]);
    }

    #[test]
    fn listener_fault_reported_once_and_value_kept() {
        let (widget, transport) = widget_with(Widget::builder().property("value", 0));
        let _ = widget.render();
        widget
            .on("value", &Listener::new(|_| Err("boom".into())))
            .unwrap();

        let report = widget.handle_remote_set("value", json!(7));

        assert_eq!(widget.value("value").unwrap(), json!(7));
        assert_eq!(report.faults.len(), 1);
        assert!(report.faults[0].message.contains("boom"));
        let writes: Vec<Value> = transport
            .sent
            .borrow()
            .iter()
            .filter(|m| m.name == WRITE)
            .map(|m| m.value.clone())
            .collect();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].as_str().unwrap().contains("color:red"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn listener_fault_is_logged() {
        let (widget, _) = widget_with(Widget::builder().property("value", 0));
        widget
            .on("value", &Listener::new(|_| Err("logged failure".into())))
            .unwrap();
        let _ = widget.handle_remote_set("value", json!(1));
        assert!(logs_contain("listener fault during remote update"));
        assert!(logs_contain("logged failure"));
    }

    #[test]
    fn panicking_listener_is_contained() {
        let (widget, _) = widget_with(Widget::builder().property("value", 0));
        widget
            .on("value", &Listener::bare(|| panic!("kaboom")))
            .unwrap();

        let report = widget.handle_remote_set("value", json!(1));

        assert_eq!(widget.value("value").unwrap(), json!(1));
        assert_eq!(report.faults.len(), 1);
        assert!(report.faults[0].panicked);
        assert_eq!(report.faults[0].message, "kaboom");
        assert_eq!(widget.model().prop("value").unwrap().dispatch().depth(), 0);
    }

    #[test]
    fn captured_output_is_written_before_widget() {
        let (widget, transport) = widget_with(Widget::builder().trigger("click"));
        let _ = widget.render();
        widget
            .on("click", &Listener::bare(|| crate::nb_println!("clicked <here>")))
            .unwrap();

        let report = widget.handle_remote_set("click", Value::Null);

        assert_eq!(report.output, "clicked <here>\n");
        assert!(report.faults.is_empty());
        let sent = transport.sent.borrow();
        let write = sent.iter().find(|m| m.name == WRITE).unwrap();
        assert_eq!(write.value, json!("<pre>clicked &lt;here&gt;\n</pre>"));
    }

    #[test]
    fn capture_disabled_only_reports() {
        let (widget, transport) = widget_with(
            Widget::builder()
                .property("value", 0)
                .config(WidgetConfig::default().with_capture_output(false)),
        );
        let _ = widget.render();
        widget
            .on("value", &Listener::new(|_| Err("quiet".into())))
            .unwrap();
        let report = widget.handle_remote_set("value", json!(1));
        assert_eq!(report.faults.len(), 1);
        assert_eq!(transport.sent_names(), vec!["value"]);
    }

    #[test]
    fn unknown_name_becomes_fault() {
        let (widget, _) = widget_with(Widget::builder());
        let report = widget.handle_remote_set("missing", json!(1));
        assert_eq!(report.faults.len(), 1);
        assert!(report.faults[0].message.contains("missing"));
    }

    #[test]
    fn render_increments_view_id_and_embeds_state() {
        let (widget, transport) =
            widget_with(Widget::builder().property("label", "</script><b>"));
        assert_eq!(widget.view_count(), 0);

        let first = widget.render();
        let second = widget.render();

        assert_eq!(widget.view_count(), 2);
        assert_eq!(transport.rendered.get(), 2);
        let id = widget.id();
        assert!(first.starts_with(&format!("<div id=\"_{id}_1\"></div><script>")));
        assert!(second.contains(&format!("document.getElementById(\"_{id}_2\")")));
        assert!(first.contains("<\\/script><b>"));
        assert!(!first.contains("\"</script>"));
        assert!(first.contains("class Model"));
        assert!(first.ends_with("})();</script>"));
    }

    #[test]
    fn custom_view_supplies_markup_and_script() {
        struct Button;

        impl WidgetView for Button {
            fn html(&self, widget: &Widget) -> String {
                format!("<button {}>go</button>", widget.std_attrs())
            }

            fn script(&self, _widget: &Widget) -> Cow<'static, str> {
                Cow::Borrowed("element.onclick = () => model.trigger('click');")
            }
        }

        let (widget, _) = widget_with(Widget::builder().trigger("click").view(Button));
        let html = widget.render();
        assert!(html.starts_with("<button id="));
        assert!(html.contains("model.trigger('click')"));
    }

    #[test]
    fn minify_strips_indentation() {
        let (widget, _) = widget_with(Widget::builder());
        assert!(!widget.render().contains("\n  "));

        let (widget, _) = widget_with(
            Widget::builder().config(WidgetConfig::default().with_minify_scripts(false)),
        );
        assert!(widget.render().contains("\n  "));
    }

    #[test]
    fn bound_member_follows_external_property() {
        let shared = Property::new(1);
        let (widget, transport) = widget_with(
            Widget::builder().member("level", Property::bound_to(&shared).unwrap()),
        );
        let _ = widget.render();
        shared.set(json!(4)).unwrap();
        assert_eq!(widget.value("level").unwrap(), json!(4));
        assert_eq!(transport.sent.borrow().last().unwrap().value, json!(4));
    }

    #[test]
    fn dropping_widget_releases_relay() {
        let shared = Property::new(0);
        let transport = Rc::new(Loopback::default());
        {
            let widget = Widget::builder()
                .member("level", Property::bound_to(&shared).unwrap())
                .build(transport.clone())
                .unwrap();
            let _ = widget.render();
        }
        shared.set(json!(1)).unwrap();
        assert!(transport.sent.borrow().is_empty());
    }
}
