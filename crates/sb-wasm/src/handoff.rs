//! `<meta>` handoff between the extension context and the page context

use sb_config::handoff::{META_NAMES, RULES_META, GLOBAL_WHITELIST_META, SECONDARY_WHITELIST_META};
use sb_config::{decode_handoff, HandoffSlices, RawConfig};
use wasm_bindgen::JsValue;
use web_sys::{Document, Element};

fn find_meta(document: &Document, name: &str) -> Option<Element> {
    document
        .query_selector(&format!("meta[name=\"{}\"]", name))
        .ok()
        .flatten()
}

fn meta_content(document: &Document, name: &str) -> Option<String> {
    find_meta(document, name)?.get_attribute("content")
}

/// Read the configuration mirrored into the page. Never fails: missing or
/// malformed slices are empty.
pub fn read_handoff(document: &Document) -> RawConfig {
    decode_handoff(
        meta_content(document, RULES_META).as_deref(),
        meta_content(document, GLOBAL_WHITELIST_META).as_deref(),
        meta_content(document, SECONDARY_WHITELIST_META).as_deref(),
    )
}

/// Whether any handoff element is present.
pub fn has_handoff(document: &Document) -> bool {
    META_NAMES.iter().any(|name| find_meta(document, name).is_some())
}

/// Write (or overwrite in place) one `<meta>` per slice.
pub fn publish(document: &Document, config: &RawConfig) -> Result<(), JsValue> {
    let slices = HandoffSlices::encode(config).map_err(|e| JsValue::from_str(&e.to_string()))?;

    for (name, content) in slices.entries() {
        let meta = match find_meta(document, name) {
            Some(meta) => meta,
            None => {
                let meta = document.create_element("meta")?;
                meta.set_attribute("name", name)?;
                let parent: Element = match document.head() {
                    Some(head) => head.into(),
                    None => document
                        .document_element()
                        .ok_or_else(|| JsValue::from_str("Document has no root element"))?,
                };
                parent.append_child(&meta)?;
                meta
            }
        };
        meta.set_attribute("content", content)?;
    }

    log::debug!("published configuration metadata");
    Ok(())
}
