//! WebAssembly bindings for Script Blocker
//!
//! Runs in the page's own script context, before any page script. The engine is
//! installed once per page load, either from the `<meta>` handoff or from a
//! fetch function with bounded retries.

use std::cell::OnceCell;
use std::rc::Rc;

use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::prelude::*;

use sb_config::{load_with_retry, RawConfig, RetryPolicy};
use sb_core::{HookSet, InstallOptions, Interceptor, MergePolicy, PageContext};

pub mod handoff;
pub mod host;
mod install;
mod logger;
mod source;

use host::{JsHost, OriginalApis};
use source::{FetcherSource, JsSleep};

thread_local! {
    static ENGINE: OnceCell<Rc<Interceptor<JsHost>>> = const { OnceCell::new() };
}

fn engine() -> Option<Rc<Interceptor<JsHost>>> {
    ENGINE.with(|cell| cell.get().cloned())
}

fn document() -> Result<web_sys::Document, JsValue> {
    web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("No document"))
}

fn page_context() -> Result<PageContext, JsValue> {
    let location = web_sys::window()
        .ok_or_else(|| JsValue::from_str("No window"))?
        .location();
    Ok(PageContext::new(location.href()?, location.hostname()?.to_ascii_lowercase()))
}

fn flag(options: &JsValue, name: &str) -> Option<bool> {
    Reflect::get(options, &name.into()).ok()?.as_bool()
}

/// `{ antiDevtools?, mergePolicy?: "union" | "firstMatch", builtinWhitelists? }`
fn install_options(options: &JsValue) -> InstallOptions {
    let mut parsed = InstallOptions::default();
    if !options.is_object() {
        return parsed;
    }
    if let Some(anti_devtools) = flag(options, "antiDevtools") {
        parsed.anti_devtools = anti_devtools;
    }
    if let Some(builtin) = flag(options, "builtinWhitelists") {
        parsed.builtin_whitelists = builtin;
    }
    match Reflect::get(options, &"mergePolicy".into()).ok().and_then(|v| v.as_string()).as_deref() {
        Some("firstMatch") => parsed.merge_policy = MergePolicy::FirstMatch,
        Some("union") | None => {}
        Some(other) => log::warn!("unknown merge policy '{}', using union", other),
    }
    parsed
}

fn config_from_js(config: &JsValue) -> Result<RawConfig, JsValue> {
    let text = match config.as_string() {
        Some(text) => text,
        None => js_sys::JSON::stringify(config)?.into(),
    };
    RawConfig::from_json(&text).map_err(|e| JsValue::from_str(&format!("Invalid configuration: {}", e)))
}

fn install_engine(config: &RawConfig, options: InstallOptions) -> Result<bool, JsValue> {
    if is_installed() {
        return Err(JsValue::from_str("Already installed. Reload the page to reinstall."));
    }

    let apis = OriginalApis::capture()?;
    let engine = Rc::new(Interceptor::install(
        JsHost::new(apis),
        page_context()?,
        &config.to_filter_config(),
        options,
    ));
    activate(engine, |engine| {
        install::install_hooks(engine, engine.installed_hooks(), HookSet::empty())
    })
}

/// Publish `engine` as the page's engine, then put its hooks in place. The
/// engine is published first, so a partial install still counts as installed.
fn activate<F>(engine: Rc<Interceptor<JsHost>>, install: F) -> Result<bool, JsValue>
where
    F: FnOnce(&Rc<Interceptor<JsHost>>) -> Result<(), JsValue>,
{
    ENGINE
        .with(|cell| cell.set(Rc::clone(&engine)))
        .map_err(|_| JsValue::from_str("Failed to set engine state"))?;
    if let Err(e) = install(&engine) {
        log::warn!("hook installation incomplete: {:?}", e);
        return Err(e);
    }
    Ok(!engine.effective_hooks().is_empty())
}

#[wasm_bindgen]
pub fn init_logging(level: &str) -> Result<(), JsValue> {
    let level = logger::parse_level(level)
        .ok_or_else(|| JsValue::from_str(&format!("Unknown log level '{}'", level)))?;
    logger::init(level);
    Ok(())
}

/// Install from the configuration mirrored into the page. Returns whether
/// filtering is active.
#[wasm_bindgen]
pub fn install_from_page(options: JsValue) -> Result<bool, JsValue> {
    let document = document()?;
    if !handoff::has_handoff(&document) {
        log::debug!("no configuration metadata on page");
    }
    install_engine(&handoff::read_handoff(&document), install_options(&options))
}

/// Fetch the configuration through `fetcher` (retrying on failure) and
/// install. Exhausted retries install with an empty configuration.
#[wasm_bindgen]
pub async fn start(fetcher: Function, timeout_ms: Option<u32>, options: JsValue) -> Result<bool, JsValue> {
    let mut source = FetcherSource::new(fetcher);
    if let Some(timeout_ms) = timeout_ms {
        source = source.with_timeout(timeout_ms);
    }
    let outcome = load_with_retry(&source, &JsSleep, &RetryPolicy::default()).await;
    install_engine(&outcome.config, install_options(&options))
}

/// Re-resolve against a changed configuration. Hooks the new resolution needs
/// are installed; hooks it no longer needs stay in place and pass through.
#[wasm_bindgen]
pub fn apply_config_update(config: JsValue) -> Result<bool, JsValue> {
    let engine = engine().ok_or_else(|| JsValue::from_str("Not installed"))?;
    let config = config_from_js(&config)?;

    let previous = engine.installed_hooks();
    let added = engine.reconfigure(page_context()?, &config.to_filter_config());
    if !added.is_empty() {
        install::install_hooks(&engine, added, previous)?;
    }
    Ok(!engine.effective_hooks().is_empty())
}

/// Mirror a configuration into the page for a page-context install.
#[wasm_bindgen]
pub fn publish_config(config: JsValue) -> Result<(), JsValue> {
    let mut config = config_from_js(&config)?;
    config.migrate();
    handoff::publish(&document()?, &config)
}

#[wasm_bindgen]
pub fn is_installed() -> bool {
    engine().is_some()
}

#[wasm_bindgen]
pub fn blocked_count() -> u32 {
    engine().map(|engine| engine.blocked_count() as u32).unwrap_or(0)
}

/// Suppression records: `{ hook, keyword, source, preview }`.
#[wasm_bindgen]
pub fn blocked_records() -> Array {
    let records = Array::new();
    let Some(engine) = engine() else {
        return records;
    };
    for record in engine.records() {
        let entry = Object::new();
        let _ = Reflect::set(&entry, &"hook".into(), &JsValue::from_str(record.hook.as_str()));
        let _ = Reflect::set(&entry, &"keyword".into(), &JsValue::from_str(&record.keyword));
        let _ = Reflect::set(&entry, &"source".into(), &JsValue::from_str(&record.surface.to_string()));
        let _ = Reflect::set(&entry, &"preview".into(), &JsValue::from_str(&record.preview));
        records.push(&entry);
    }
    records
}

/// Names of the hooks the current resolution has in effect.
#[wasm_bindgen]
pub fn active_hooks() -> Array {
    engine()
        .map(|engine| engine.effective_hooks().names())
        .unwrap_or_default()
        .iter()
        .map(|name| JsValue::from_str(name))
        .collect()
}
