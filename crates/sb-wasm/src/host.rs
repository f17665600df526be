//! Browser-backed `InterceptableHost`
//!
//! Every platform function the replacements delegate to is captured once, before
//! any replacement is installed, into [`OriginalApis`]. The host calls only
//! those captured functions, never the (replaced) globals.

use js_sys::{Array, Function, Object, Promise, Reflect, WeakMap};
use wasm_bindgen::{JsCast, JsValue};

use sb_core::antidebug::GUARDED_HANDLER_PROPERTIES;
use sb_core::host::{
    ElementView, HandlerTarget, InterceptableHost, NodeRecord, NodeView, ScriptPayload, ScriptProperty,
    TimerKind, WorkerKind,
};

/// Getter/setter pair of an accessor property.
#[derive(Debug, Clone, Default)]
pub struct Accessor {
    pub get: Option<Function>,
    pub set: Option<Function>,
}

impl Accessor {
    /// Look `name` up along the prototype chain of `start`.
    pub fn find(start: &JsValue, name: &str) -> Self {
        let key = JsValue::from_str(name);
        let mut current = start.clone();
        while current.is_object() || current.is_function() {
            let object: &Object = current.unchecked_ref();
            let descriptor = Object::get_own_property_descriptor(object, &key);
            if descriptor.is_object() {
                return Self {
                    get: function_property(&descriptor, "get"),
                    set: function_property(&descriptor, "set"),
                };
            }
            current = Object::get_prototype_of(&current).into();
        }
        Self::default()
    }
}

/// The platform functions the replacements delegate to.
pub struct OriginalApis {
    pub global: Object,
    pub document: web_sys::Document,
    pub string: Function,
    pub create_element: Function,
    pub append_child: Function,
    pub insert_before: Function,
    pub replace_child: Function,
    pub remove_child: Function,
    pub write: Function,
    pub writeln: Function,
    pub eval: Function,
    pub function: Function,
    pub set_timeout: Function,
    pub set_interval: Function,
    pub worker: Option<Function>,
    pub shared_worker: Option<Function>,
    /// `navigator.serviceWorker` and its `register`
    pub service_worker: Option<(Object, Function)>,
    pub add_event_listener: Function,
    pub script_src: Accessor,
    pub script_inner_html: Accessor,
    pub script_text_content: Accessor,
    pub window_handlers: Vec<(&'static str, Accessor)>,
    pub document_handlers: Vec<(&'static str, Accessor)>,
    /// Built with the original `Function`, so `instanceof Function` holds
    pub noop: Function,
    pub returns_true: Function,
}

impl OriginalApis {
    /// Capture the current platform functions. Must run before any
    /// replacement is installed.
    pub fn capture() -> Result<Self, JsValue> {
        let global: Object = js_sys::global().unchecked_into();
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("No document"))?;

        let document_proto = prototype(&global, "Document")?;
        let node_proto = prototype(&global, "Node")?;
        let event_target_proto = prototype(&global, "EventTarget")?;
        let script_proto: JsValue = prototype(&global, "HTMLScriptElement")?.into();
        let function = method(&global, "Function")?;

        let service_worker = Reflect::get(&global, &"navigator".into())
            .ok()
            .and_then(|navigator| Reflect::get(&navigator, &"serviceWorker".into()).ok())
            .and_then(|container| container.dyn_into::<Object>().ok())
            .and_then(|container| {
                let register = function_property(&container, "register")?;
                Some((container, register))
            });

        let handlers = |target: &JsValue| -> Vec<(&'static str, Accessor)> {
            GUARDED_HANDLER_PROPERTIES
                .iter()
                .map(|event_type| (*event_type, Accessor::find(target, &format!("on{event_type}"))))
                .collect()
        };
        let window_handlers = handlers(global.as_ref());
        let document_handlers = handlers(document.as_ref());

        let noop: Function = Reflect::construct(&function, &Array::of1(&"".into()))?.dyn_into()?;
        let returns_true: Function =
            Reflect::construct(&function, &Array::of1(&"return true".into()))?.dyn_into()?;

        Ok(Self {
            string: method(&global, "String")?,
            create_element: method(&document_proto, "createElement")?,
            append_child: method(&node_proto, "appendChild")?,
            insert_before: method(&node_proto, "insertBefore")?,
            replace_child: method(&node_proto, "replaceChild")?,
            remove_child: method(&node_proto, "removeChild")?,
            write: method(&document_proto, "write")?,
            writeln: method(&document_proto, "writeln")?,
            eval: method(&global, "eval")?,
            set_timeout: method(&global, "setTimeout")?,
            set_interval: method(&global, "setInterval")?,
            worker: function_property(&global, "Worker"),
            shared_worker: function_property(&global, "SharedWorker"),
            service_worker,
            add_event_listener: method(&event_target_proto, "addEventListener")?,
            script_src: Accessor::find(&script_proto, "src"),
            script_inner_html: Accessor::find(&script_proto, "innerHTML"),
            script_text_content: Accessor::find(&script_proto, "textContent"),
            window_handlers,
            document_handlers,
            noop,
            returns_true,
            function,
            global,
            document,
        })
    }

    pub fn script_accessor(&self, property: ScriptProperty) -> &Accessor {
        match property {
            ScriptProperty::Src => &self.script_src,
            ScriptProperty::InnerHtml => &self.script_inner_html,
            ScriptProperty::TextContent => &self.script_text_content,
        }
    }

    pub fn handler_target(&self, target: HandlerTarget) -> (&JsValue, &[(&'static str, Accessor)]) {
        match target {
            HandlerTarget::Window => (self.global.as_ref(), &self.window_handlers),
            HandlerTarget::Document => (self.document.as_ref(), &self.document_handlers),
        }
    }
}

pub(crate) fn prototype(global: &Object, constructor: &str) -> Result<Object, JsValue> {
    let constructor = Reflect::get(global, &constructor.into())?;
    Reflect::get(&constructor, &"prototype".into())?
        .dyn_into::<Object>()
        .map_err(|_| JsValue::from_str("Missing prototype"))
}

pub(crate) fn method(target: &Object, name: &str) -> Result<Function, JsValue> {
    function_property(target, name).ok_or_else(|| JsValue::from_str(&format!("{name} is not a function")))
}

fn function_property(target: &JsValue, name: &str) -> Option<Function> {
    Reflect::get(target, &name.into())
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
}

fn string_property(target: &JsValue, name: &str) -> Option<String> {
    Reflect::get(target, &name.into())
        .ok()
        .and_then(|value| value.as_string())
        .filter(|value| !value.is_empty())
}

fn args_array<'a>(values: impl IntoIterator<Item = &'a JsValue>) -> Array {
    let array = Array::new();
    for value in values {
        array.push(value);
    }
    array
}

/// Host over the live page.
pub struct JsHost {
    apis: OriginalApis,
    /// Node -> packed [`NodeRecord`]; entries die with their node
    records: WeakMap,
}

impl JsHost {
    pub fn new(apis: OriginalApis) -> Self {
        Self {
            apis,
            records: WeakMap::new(),
        }
    }

    pub fn apis(&self) -> &OriginalApis {
        &self.apis
    }

    fn element_view(&self, element: &web_sys::Element) -> ElementView {
        let mut view = ElementView::new(&element.node_name());
        view.text_content = element.text_content().unwrap_or_default();
        view.src = string_property(element, "src");
        view.href = string_property(element, "href");
        view.data = string_property(element, "data");

        let attributes = element.attributes();
        for i in 0..attributes.length() {
            if let Some(attr) = attributes.item(i) {
                view.attributes.push((attr.name().to_ascii_lowercase(), attr.value()));
            }
        }
        view
    }

    fn inert_dedicated_worker(&self) -> Object {
        let worker = Object::new();
        for name in ["postMessage", "terminate", "addEventListener", "removeEventListener"] {
            let _ = Reflect::set(&worker, &name.into(), &self.apis.noop);
        }
        let _ = Reflect::set(&worker, &"dispatchEvent".into(), &self.apis.returns_true);
        let _ = Reflect::set(&worker, &"onmessage".into(), &JsValue::NULL);
        let _ = Reflect::set(&worker, &"onerror".into(), &JsValue::NULL);
        worker
    }

    fn inert_shared_worker(&self) -> Object {
        let port = Object::new();
        for name in ["postMessage", "close", "start", "addEventListener", "removeEventListener"] {
            let _ = Reflect::set(&port, &name.into(), &self.apis.noop);
        }
        let worker = Object::new();
        let _ = Reflect::set(&worker, &"port".into(), &port);
        let _ = Reflect::set(&worker, &"onerror".into(), &JsValue::NULL);
        worker
    }

    fn handler_setter(&self, target: HandlerTarget, event_type: &str) -> Option<(&JsValue, &Function)> {
        let (object, accessors) = self.apis.handler_target(target);
        accessors
            .iter()
            .find(|(name, _)| *name == event_type)
            .and_then(|(_, accessor)| accessor.set.as_ref())
            .map(|set| (object, set))
    }
}

impl InterceptableHost for JsHost {
    type Node = JsValue;
    type Value = JsValue;
    type Worker = JsValue;
    type Registration = JsValue;
    type Error = JsValue;

    fn node_record(&self, node: &JsValue) -> Option<NodeRecord> {
        let node = node.dyn_ref::<web_sys::Node>()?;
        let bits = self.records.get(node.unchecked_ref()).as_f64().unwrap_or(0.0);
        Some(NodeRecord::from_bits(bits as u8))
    }

    fn store_node_record(&self, node: &JsValue, record: NodeRecord) {
        if let Some(node) = node.dyn_ref::<web_sys::Node>() {
            self.records
                .set(node.unchecked_ref(), &JsValue::from_f64(f64::from(record.to_bits())));
        }
    }

    fn node_view(&self, node: &JsValue) -> Option<NodeView> {
        let node = node.dyn_ref::<web_sys::Node>()?;
        let text = || node.text_content().unwrap_or_default();
        match node.node_type() {
            web_sys::Node::ELEMENT_NODE => Some(NodeView::Element(self.element_view(node.unchecked_ref()))),
            web_sys::Node::TEXT_NODE | web_sys::Node::CDATA_SECTION_NODE => Some(NodeView::Text(text())),
            web_sys::Node::COMMENT_NODE => Some(NodeView::Comment(text())),
            web_sys::Node::DOCUMENT_FRAGMENT_NODE => Some(NodeView::DocumentFragment(text())),
            _ => None,
        }
    }

    fn payload(&self, value: &JsValue) -> ScriptPayload {
        if let Some(text) = value.as_string() {
            return ScriptPayload::Text(text);
        }
        match value.dyn_ref::<Function>() {
            Some(function) => ScriptPayload::Function(function.to_string().into()),
            None => ScriptPayload::Other,
        }
    }

    fn url_text(&self, value: &JsValue) -> String {
        if let Some(text) = value.as_string() {
            return text;
        }
        self.apis
            .string
            .call1(&JsValue::UNDEFINED, value)
            .ok()
            .and_then(|text| text.as_string())
            .unwrap_or_default()
    }

    fn undefined(&self) -> JsValue {
        JsValue::UNDEFINED
    }

    fn text_value(&self, text: &str) -> JsValue {
        JsValue::from_str(text)
    }

    fn create_element(&self, tag: &JsValue, options: Option<&JsValue>) -> Result<JsValue, JsValue> {
        let document: &JsValue = self.apis.document.as_ref();
        match options {
            Some(options) => self.apis.create_element.call2(document, tag, options),
            None => self.apis.create_element.call1(document, tag),
        }
    }

    fn set_script_property(&self, element: &JsValue, property: ScriptProperty, value: &JsValue) -> Result<(), JsValue> {
        match &self.apis.script_accessor(property).set {
            Some(set) => set.call1(element, value).map(|_| ()),
            None => {
                log::warn!("no original {} setter captured", property.as_str());
                Ok(())
            }
        }
    }

    fn append_child(&self, parent: &JsValue, child: &JsValue) -> Result<JsValue, JsValue> {
        self.apis.append_child.call1(parent, child)
    }

    fn insert_before(&self, parent: &JsValue, new_node: &JsValue, reference: Option<&JsValue>) -> Result<JsValue, JsValue> {
        self.apis
            .insert_before
            .call2(parent, new_node, reference.unwrap_or(&JsValue::NULL))
    }

    fn replace_child(&self, parent: &JsValue, new_child: &JsValue, old_child: &JsValue) -> Result<JsValue, JsValue> {
        self.apis.replace_child.call2(parent, new_child, old_child)
    }

    fn remove_node(&self, node: &JsValue) {
        let Some(node) = node.dyn_ref::<web_sys::Node>() else { return };
        if let Some(parent) = node.parent_node() {
            let _ = self.apis.remove_child.call1(&parent, node);
        }
    }

    fn write(&self, markup: &[JsValue], newline: bool) -> Result<(), JsValue> {
        let write = if newline { &self.apis.writeln } else { &self.apis.write };
        write.apply(self.apis.document.as_ref(), &args_array(markup)).map(|_| ())
    }

    fn eval(&self, code: &JsValue) -> Result<JsValue, JsValue> {
        self.apis.eval.call1(&self.apis.global, code)
    }

    fn construct_function(&self, args: &[JsValue]) -> Result<JsValue, JsValue> {
        Reflect::construct(&self.apis.function, &args_array(args))
    }

    fn inert_function(&self) -> JsValue {
        self.apis.noop.clone().into()
    }

    fn schedule(&self, kind: TimerKind, handler: &JsValue, rest: &[JsValue]) -> Result<JsValue, JsValue> {
        let schedule = match kind {
            TimerKind::Timeout => &self.apis.set_timeout,
            TimerKind::Interval => &self.apis.set_interval,
        };
        schedule.apply(&self.apis.global, &args_array(std::iter::once(handler).chain(rest)))
    }

    fn sentinel_timer(&self) -> JsValue {
        JsValue::from_f64(0.0)
    }

    fn spawn_worker(&self, kind: WorkerKind, url: &JsValue, options: Option<&JsValue>) -> Result<JsValue, JsValue> {
        let constructor = match kind {
            WorkerKind::Dedicated => self.apis.worker.as_ref(),
            WorkerKind::Shared => self.apis.shared_worker.as_ref(),
        }
        .ok_or_else(|| JsValue::from_str("Worker is not supported"))?;
        Reflect::construct(constructor, &args_array(std::iter::once(url).chain(options)))
    }

    fn inert_worker(&self, kind: WorkerKind) -> JsValue {
        match kind {
            WorkerKind::Dedicated => self.inert_dedicated_worker().into(),
            WorkerKind::Shared => self.inert_shared_worker().into(),
        }
    }

    fn register_service_worker(&self, url: &JsValue, options: Option<&JsValue>) -> Result<JsValue, JsValue> {
        let (container, register) = self
            .apis
            .service_worker
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Service workers are not supported"))?;
        register.apply(container, &args_array(std::iter::once(url).chain(options)))
    }

    fn rejected_registration(&self, reason: &str) -> JsValue {
        Promise::reject(&js_sys::Error::new(reason).into()).into()
    }

    fn add_event_listener(
        &self,
        target: &JsValue,
        event_type: &str,
        listener: &JsValue,
        options: Option<&JsValue>,
    ) -> Result<(), JsValue> {
        let event_type = JsValue::from_str(event_type);
        let args = args_array([&event_type, listener].into_iter().chain(options));
        self.apis.add_event_listener.apply(target, &args).map(|_| ())
    }

    fn set_handler_property(&self, target: HandlerTarget, event_type: &str, handler: &JsValue) -> Result<(), JsValue> {
        match self.handler_setter(target, event_type) {
            Some((object, set)) => set.call1(object, handler).map(|_| ()),
            None => Ok(()),
        }
    }

    fn clear_handler_property(&self, target: HandlerTarget, event_type: &str) {
        if let Some((object, set)) = self.handler_setter(target, event_type) {
            let _ = set.call1(object, &JsValue::NULL);
        }
    }
}
