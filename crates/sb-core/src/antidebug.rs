//! Devtools-blocking countermeasure removal
//!
//! An optional add-on, separate from the keyword guarantee: pages that install
//! key or context-menu handlers to keep the developer tools closed are matched
//! by textual signature on the handler source. Signature matching is trivially
//! defeated by obfuscation; it only targets the common copy-pasted snippets.

/// Source fragments of well-known devtools-blocking snippets.
pub const DEVTOOLS_SIGNATURES: &[&str] = &[
    "keyCode == 123",
    "e.keyCode == 123",
    "e.key === \"F12\"",
    ".keyCode==123",
    "disableDevTools",
    "setInterval(function() {(debugger",
    "setInterval(function(){(debugger",
    "setInterval(function(){(debug",
    "setInterval(function() {(debug",
];

/// Event types whose listeners are screened.
pub const GUARDED_EVENTS: &[&str] = &["keydown", "keyup", "contextmenu"];

/// Handler properties that are cleared at install and screened on assignment.
pub const GUARDED_HANDLER_PROPERTIES: &[&str] = &["keydown", "contextmenu"];

pub fn is_guarded_event(event_type: &str) -> bool {
    GUARDED_EVENTS.contains(&event_type)
}

/// First devtools-blocking signature found in `source`.
pub fn find_signature(source: &str) -> Option<&'static str> {
    DEVTOOLS_SIGNATURES
        .iter()
        .copied()
        .find(|signature| source.contains(signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_signature() {
        let handler = "function(e){ if (e.keyCode == 123) { e.preventDefault(); } }";
        assert_eq!(find_signature(handler), Some("keyCode == 123"));
        assert_eq!(find_signature("function(e){ console.log(e.key) }"), None);
    }

    #[test]
    fn test_guarded_events() {
        assert!(is_guarded_event("keydown"));
        assert!(is_guarded_event("contextmenu"));
        assert!(!is_guarded_event("click"));
    }
}
