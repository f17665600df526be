//! Installing the replacements over the page's platform functions
//!
//! Each replacement is a Rust closure wrapped so that it receives the JS
//! receiver (`this`) and the argument list. Closures are leaked: a replaced
//! platform function lives as long as the page.

use std::rc::Rc;

use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use sb_core::host::{HandlerTarget, TimerKind, WorkerKind};
use sb_core::{HookSet, InterceptableHost, Interceptor};

use crate::host::{prototype, JsHost};

type Engine = Rc<Interceptor<JsHost>>;

#[wasm_bindgen(inline_js = "export function with_this(f) { return function (...args) { return f(this, args); }; }")]
extern "C" {
    fn with_this(hook: &Function) -> Function;
}

/// Hooks that need the subtree observer running.
const WATCHERS: HookSet = HookSet::MUTATION_WATCHER.union(HookSet::SCRIPT_SOURCE_WATCHER);

fn replacement<F>(hook: F) -> Function
where
    F: Fn(JsValue, Array) -> Result<JsValue, JsValue> + 'static,
{
    let closure = Closure::<dyn Fn(JsValue, Array) -> Result<JsValue, JsValue>>::new(hook);
    let function = with_this(closure.as_ref().unchecked_ref());
    closure.forget();
    function
}

/// Argument `index`, None when absent, undefined or null.
fn optional(args: &Array, index: u32) -> Option<JsValue> {
    if index >= args.length() {
        return None;
    }
    Some(args.get(index)).filter(|value| !value.is_undefined() && !value.is_null())
}

fn rest(args: &Array, from: u32) -> Vec<JsValue> {
    args.slice(from, args.length()).to_vec()
}

fn replace(target: &Object, name: &str, value: &Function) -> Result<(), JsValue> {
    if Reflect::set(target, &name.into(), value)? {
        Ok(())
    } else {
        Err(JsValue::from_str(&format!("Cannot replace {name}")))
    }
}

fn accessor_descriptor(get: Option<&Function>, set: &Function) -> Object {
    let descriptor = Object::new();
    if let Some(get) = get {
        let _ = Reflect::set(&descriptor, &"get".into(), get);
    }
    let _ = Reflect::set(&descriptor, &"set".into(), set);
    let _ = Reflect::set(&descriptor, &"configurable".into(), &JsValue::TRUE);
    let _ = Reflect::set(&descriptor, &"enumerable".into(), &JsValue::TRUE);
    descriptor
}

/// Carry the original constructor's `prototype` and static prototype over to
/// its replacement, so `instanceof` keeps working.
fn mirror_constructor(original: &Function, replacement: &Function) -> Result<(), JsValue> {
    let proto = Reflect::get(original, &"prototype".into())?;
    Reflect::set(replacement, &"prototype".into(), &proto)?;
    Object::set_prototype_of(replacement, &Object::get_prototype_of(original));
    Ok(())
}

/// Install the replacements for `added`. `previous` is what was installed
/// before this call.
pub fn install_hooks(engine: &Engine, added: HookSet, previous: HookSet) -> Result<(), JsValue> {
    if added.contains(HookSet::CREATE_ELEMENT) {
        install_create_element(engine)?;
    }
    if added.contains(HookSet::TREE_INSERTION) {
        install_tree_insertion(engine)?;
    }
    if added.contains(HookSet::MARKUP_WRITE) {
        install_markup_write(engine)?;
    }
    if added.contains(HookSet::EVAL) {
        install_eval(engine)?;
    }
    if added.contains(HookSet::FUNCTION_CONSTRUCTOR) {
        install_function_constructor(engine)?;
    }
    if added.contains(HookSet::TIMERS) {
        install_timers(engine)?;
    }
    if added.contains(HookSet::WORKERS) {
        install_workers(engine)?;
    }
    if added.contains(HookSet::SERVICE_WORKER) {
        install_service_worker(engine)?;
    }
    if added.contains(HookSet::ANTI_DEVTOOLS) {
        install_anti_devtools(engine)?;
    }
    if added.intersects(WATCHERS) && !previous.intersects(WATCHERS) {
        start_observer(engine)?;
    }
    log::debug!("installed hooks: {}", added.names().join(", "));
    Ok(())
}

fn install_create_element(engine: &Engine) -> Result<(), JsValue> {
    let apis = engine.host().apis();

    let descriptors: Vec<(&'static str, Object)> = sb_core::types::ScriptProperty::ALL
        .iter()
        .map(|&property| {
            let hook_engine = Rc::clone(engine);
            let set = replacement(move |this, args| {
                hook_engine.set_script_property(&this, property, &args.get(0))?;
                Ok(JsValue::UNDEFINED)
            });
            let accessor = apis.script_accessor(property);
            (property.as_str(), accessor_descriptor(accessor.get.as_ref(), &set))
        })
        .collect();

    let hook_engine = Rc::clone(engine);
    let create_element = replacement(move |_this, args| {
        let element = hook_engine.create_element(&args.get(0), optional(&args, 1).as_ref())?;
        if hook_engine.is_guarded(&element) {
            guard_script_element(&element, &descriptors);
        }
        Ok(element)
    });
    replace(&prototype(&apis.global, "Document")?, "createElement", &create_element)
}

/// Route the element's script property writes through the hooks. A failure
/// leaves the element unguarded; it never reaches the page's caller.
fn guard_script_element(element: &JsValue, descriptors: &[(&'static str, Object)]) {
    let target: &Object = element.unchecked_ref();
    for (name, descriptor) in descriptors {
        match Reflect::define_property(target, &JsValue::from_str(name), descriptor) {
            Ok(true) => {}
            Ok(false) | Err(_) => log::warn!("cannot guard {name} of a script element, left unguarded"),
        }
    }
}

fn install_tree_insertion(engine: &Engine) -> Result<(), JsValue> {
    let node_proto = prototype(&engine.host().apis().global, "Node")?;

    let hook_engine = Rc::clone(engine);
    let append_child = replacement(move |this, args| hook_engine.append_child(&this, &args.get(0)));
    replace(&node_proto, "appendChild", &append_child)?;

    let hook_engine = Rc::clone(engine);
    let insert_before = replacement(move |this, args| {
        hook_engine.insert_before(&this, &args.get(0), optional(&args, 1).as_ref())
    });
    replace(&node_proto, "insertBefore", &insert_before)?;

    let hook_engine = Rc::clone(engine);
    let replace_child =
        replacement(move |this, args| hook_engine.replace_child(&this, &args.get(0), &args.get(1)));
    replace(&node_proto, "replaceChild", &replace_child)
}

fn install_markup_write(engine: &Engine) -> Result<(), JsValue> {
    let document_proto = prototype(&engine.host().apis().global, "Document")?;
    for (name, newline) in [("write", false), ("writeln", true)] {
        let hook_engine = Rc::clone(engine);
        let write = replacement(move |_this, args| {
            hook_engine.write(&args.to_vec(), newline)?;
            Ok(JsValue::UNDEFINED)
        });
        replace(&document_proto, name, &write)?;
    }
    Ok(())
}

fn install_eval(engine: &Engine) -> Result<(), JsValue> {
    let hook_engine = Rc::clone(engine);
    let eval = replacement(move |_this, args| hook_engine.eval(&args.get(0)));

    // Pinned so page script cannot restore the original
    let descriptor = Object::new();
    Reflect::set(&descriptor, &"value".into(), &eval)?;
    Reflect::set(&descriptor, &"writable".into(), &JsValue::FALSE)?;
    Reflect::set(&descriptor, &"configurable".into(), &JsValue::FALSE)?;
    if Reflect::define_property(&engine.host().apis().global, &"eval".into(), &descriptor)? {
        Ok(())
    } else {
        Err(JsValue::from_str("Cannot replace eval"))
    }
}

fn install_function_constructor(engine: &Engine) -> Result<(), JsValue> {
    let apis = engine.host().apis();
    let hook_engine = Rc::clone(engine);
    let function = replacement(move |_this, args| hook_engine.construct_function(&args.to_vec()));
    mirror_constructor(&apis.function, &function)?;
    replace(&apis.global, "Function", &function)
}

fn install_timers(engine: &Engine) -> Result<(), JsValue> {
    for (name, kind) in [("setTimeout", TimerKind::Timeout), ("setInterval", TimerKind::Interval)] {
        let hook_engine = Rc::clone(engine);
        let schedule = replacement(move |_this, args| hook_engine.schedule(kind, &args.get(0), &rest(&args, 1)));
        replace(&engine.host().apis().global, name, &schedule)?;
    }
    Ok(())
}

fn install_workers(engine: &Engine) -> Result<(), JsValue> {
    let apis = engine.host().apis();
    let constructors = [
        ("Worker", WorkerKind::Dedicated, apis.worker.as_ref()),
        ("SharedWorker", WorkerKind::Shared, apis.shared_worker.as_ref()),
    ];
    for (name, kind, original) in constructors {
        let Some(original) = original else {
            log::debug!("{name} not available, not hooked");
            continue;
        };
        let hook_engine = Rc::clone(engine);
        let worker = replacement(move |_this, args| {
            hook_engine.spawn_worker(kind, &args.get(0), optional(&args, 1).as_ref())
        });
        mirror_constructor(original, &worker)?;
        replace(&apis.global, name, &worker)?;
    }
    Ok(())
}

fn install_service_worker(engine: &Engine) -> Result<(), JsValue> {
    let apis = engine.host().apis();
    if apis.service_worker.is_none() {
        log::debug!("service workers not available, not hooked");
        return Ok(());
    }
    let container_proto = prototype(&apis.global, "ServiceWorkerContainer")?;
    let hook_engine = Rc::clone(engine);
    let register = replacement(move |_this, args| {
        hook_engine.register_service_worker(&args.get(0), optional(&args, 1).as_ref())
    });
    replace(&container_proto, "register", &register)
}

fn install_anti_devtools(engine: &Engine) -> Result<(), JsValue> {
    let apis = engine.host().apis();

    let hook_engine = Rc::clone(engine);
    let add_event_listener = replacement(move |this, args| {
        let event_type = hook_engine.host().url_text(&args.get(0));
        hook_engine.add_event_listener(&this, &event_type, &args.get(1), optional(&args, 2).as_ref())?;
        Ok(JsValue::UNDEFINED)
    });
    replace(&prototype(&apis.global, "EventTarget")?, "addEventListener", &add_event_listener)?;

    for target in [HandlerTarget::Window, HandlerTarget::Document] {
        let (object, accessors) = apis.handler_target(target);
        for (event_type, accessor) in accessors {
            let event_type = *event_type;
            let hook_engine = Rc::clone(engine);
            let set = replacement(move |_this, args| {
                hook_engine.set_handler_property(target, event_type, &args.get(0))?;
                Ok(JsValue::UNDEFINED)
            });
            let descriptor = accessor_descriptor(accessor.get.as_ref(), &set);
            let name = JsValue::from_str(&format!("on{event_type}"));
            Reflect::define_property(object.unchecked_ref::<Object>(), &name, &descriptor)?;
        }
    }
    Ok(())
}

/// Observe the whole document for nodes added behind the hooks' back.
fn start_observer(engine: &Engine) -> Result<(), JsValue> {
    let hook_engine = Rc::clone(engine);
    let callback = Closure::<dyn FnMut(Array, web_sys::MutationObserver)>::new(
        move |records: Array, _observer: web_sys::MutationObserver| {
            let mut added = Vec::new();
            for record in records.iter() {
                let Ok(record) = record.dyn_into::<web_sys::MutationRecord>() else { continue };
                let nodes = record.added_nodes();
                for i in 0..nodes.length() {
                    if let Some(node) = nodes.get(i) {
                        added.push(JsValue::from(node));
                    }
                }
            }
            if !added.is_empty() {
                hook_engine.observe_added(&added);
            }
        },
    );

    let observer = web_sys::MutationObserver::new(callback.as_ref().unchecked_ref())?;
    callback.forget();

    let init = web_sys::MutationObserverInit::new();
    init.set_child_list(true);
    init.set_subtree(true);
    observer.observe_with_options(&engine.host().apis().document, &init)?;
    log::debug!("subtree observer started");
    Ok(())
}
