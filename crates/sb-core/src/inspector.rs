//! Content Inspector
//!
//! The shared decision primitive of the hooks and the mutation watcher: does a
//! node (or a piece of text) carry a blocked keyword on any surface the browser
//! could execute? Checks run in a fixed order and stop at the first hit.

use crate::host::{ElementView, NodeView};
use crate::types::{Finding, KeywordSet, Surface};
use crate::url::{is_script_resource, javascript_payload, parse_data_uri};

/// Inline event-handler attributes whose values are compiled as script.
pub const INLINE_HANDLER_ATTRIBUTES: &[&str] = &[
    "onclick", "ondblclick", "onmousedown", "onmouseup", "onmouseover",
    "onmousemove", "onmouseout", "onmouseenter", "onmouseleave",
    "onload", "onunload", "onerror", "onresize", "onscroll",
    "onfocus", "onblur", "onchange", "onsubmit", "onreset",
    "onselect", "oninput", "onkeydown", "onkeypress", "onkeyup",
    "oncontextmenu", "onpaste", "oncopy", "oncut", "ondrag",
    "ondrop", "ontouchstart", "ontouchmove", "ontouchend",
    "onanimationstart", "onanimationend", "onanimationiteration",
    "ontransitionstart", "ontransitionend", "ontransitionrun",
    "onwheel", "onauxclick", "ongotpointercapture", "onlostpointercapture",
    "onpointerdown", "onpointermove", "onpointerup", "onpointercancel",
    "onpointerover", "onpointerout", "onpointerenter", "onpointerleave",
];

/// Keyword search over a node's observable surfaces.
#[derive(Debug, Clone, Copy)]
pub struct ContentInspector<'a> {
    keywords: &'a KeywordSet,
}

impl<'a> ContentInspector<'a> {
    pub fn new(keywords: &'a KeywordSet) -> Self {
        Self { keywords }
    }

    /// Search a single text surface.
    #[inline]
    pub fn inspect_text(&self, text: &str, surface: Surface) -> Option<Finding> {
        self.keywords
            .find_in(text)
            .map(|keyword| Finding::new(keyword, text, surface))
    }

    /// Inspect every surface of a node, in order, stopping at the first hit.
    pub fn inspect(&self, view: &NodeView) -> Option<Finding> {
        if self.keywords.is_empty() {
            return None;
        }

        if let Some(finding) = self.inspect_text(view.text_content(), Surface::TextContent) {
            return Some(finding);
        }

        let element = view.as_element()?;

        if let Some(src) = element.src.as_deref() {
            if let Some(finding) = self.inspect_text(src, Surface::Src) {
                return Some(finding);
            }
        }

        self.inspect_handlers(element)
            .or_else(|| self.inspect_pseudo_protocols(element))
            .or_else(|| self.inspect_plugin(element))
            .or_else(|| self.inspect_meta_refresh(element))
            .or_else(|| self.inspect_base(element))
    }

    fn inspect_handlers(&self, element: &ElementView) -> Option<Finding> {
        INLINE_HANDLER_ATTRIBUTES.iter().find_map(|&attr| {
            let value = element.attribute(attr)?;
            self.inspect_text(value, Surface::InlineHandler(attr))
        })
    }

    fn inspect_pseudo_protocols(&self, element: &ElementView) -> Option<Finding> {
        for value in [element.href.as_deref(), element.src.as_deref()].into_iter().flatten() {
            if let Some(code) = javascript_payload(value) {
                if let Some(finding) = self.inspect_text(&code, Surface::JavascriptUrl) {
                    return Some(finding);
                }
            }
        }

        let src = element.src.as_deref()?;
        let uri = parse_data_uri(src).filter(|uri| uri.is_script())?;
        self.inspect_text(&uri.decode(), Surface::DataUri)
    }

    fn inspect_plugin(&self, element: &ElementView) -> Option<Finding> {
        if !element.is("object") && !element.is("embed") {
            return None;
        }
        let resource = element
            .data
            .as_deref()
            .filter(|data| !data.is_empty())
            .or(element.src.as_deref())?;
        if !is_script_resource(resource) {
            return None;
        }
        self.inspect_text(resource, Surface::PluginResource)
    }

    fn inspect_meta_refresh(&self, element: &ElementView) -> Option<Finding> {
        if !element.is("meta") {
            return None;
        }
        let is_refresh = element
            .attribute("http-equiv")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("refresh"));
        if !is_refresh {
            return None;
        }
        let content = element.attribute("content")?;
        if !content.to_ascii_lowercase().contains("javascript:") {
            return None;
        }
        self.inspect_text(content, Surface::MetaRefresh)
    }

    fn inspect_base(&self, element: &ElementView) -> Option<Finding> {
        if !element.is("base") {
            return None;
        }
        let href = element.href.as_deref().or_else(|| element.attribute("href"))?;
        self.inspect_text(href, Surface::BaseHref)
    }
}
