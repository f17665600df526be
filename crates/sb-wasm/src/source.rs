//! Configuration source backed by a page-supplied fetch function

use std::time::Duration;

use js_sys::{Array, Function, Promise, JSON};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use sb_config::{ConfigError, ConfigSource, RawConfig, Sleep};

/// Per-attempt timeout.
pub const FETCH_TIMEOUT_MS: u32 = 1500;

const TIMEOUT_MARKER: &str = "__script_blocker_timeout__";

/// Calls `fetcher()` per attempt. It may return the configuration as a JSON
/// string or object, or a promise of either.
pub struct FetcherSource {
    fetcher: Function,
    timeout_ms: u32,
}

impl FetcherSource {
    pub fn new(fetcher: Function) -> Self {
        Self {
            fetcher,
            timeout_ms: FETCH_TIMEOUT_MS,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

fn describe(error: &JsValue) -> String {
    error
        .as_string()
        .or_else(|| error.dyn_ref::<js_sys::Error>().map(|e| String::from(e.message())))
        .unwrap_or_else(|| format!("{:?}", error))
}

/// Promise rejecting with the timeout marker after `ms`.
fn timeout(ms: u32) -> Promise {
    Promise::new(&mut |_resolve, reject| {
        if let Some(window) = web_sys::window() {
            let reject_with_marker = reject.bind1(&JsValue::NULL, &JsValue::from_str(TIMEOUT_MARKER));
            let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(reject_with_marker.unchecked_ref(), ms as i32);
        }
    })
}

/// A string must at least be JSON; a malformed response is a failed attempt.
fn config_from_value(value: &JsValue) -> Result<RawConfig, ConfigError> {
    let text = match value.as_string() {
        Some(text) => {
            JSON::parse(&text).map_err(|e| ConfigError::Transport(describe(&e)))?;
            text
        }
        None => JSON::stringify(value)
            .map_err(|e| ConfigError::Transport(describe(&e)))?
            .into(),
    };
    Ok(RawConfig::from_json_lenient(&text))
}

impl ConfigSource for FetcherSource {
    async fn fetch(&self) -> Result<RawConfig, ConfigError> {
        let pending = self
            .fetcher
            .call0(&JsValue::UNDEFINED)
            .map_err(|e| ConfigError::Transport(describe(&e)))?;
        let race = Promise::race(&Array::of2(&Promise::resolve(&pending), &timeout(self.timeout_ms)));

        match JsFuture::from(race).await {
            Ok(value) => config_from_value(&value),
            Err(e) if e.as_string().as_deref() == Some(TIMEOUT_MARKER) => {
                Err(ConfigError::Timeout(u64::from(self.timeout_ms)))
            }
            Err(e) => Err(ConfigError::Transport(describe(&e))),
        }
    }
}

/// Delay between attempts on the page's timer.
pub struct JsSleep;

impl Sleep for JsSleep {
    async fn sleep(&self, delay: Duration) {
        let ms = delay.as_millis().min(i32::MAX as u128) as i32;
        let promise = Promise::new(&mut |resolve, _reject| match web_sys::window() {
            Some(window) => {
                let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms);
            }
            None => {
                let _ = resolve.call0(&JsValue::UNDEFINED);
            }
        });
        let _ = JsFuture::from(promise).await;
    }
}
