//! The platform boundary
//!
//! The interceptor never touches the page directly. Every original platform
//! operation it may delegate to, and every observation it needs to make about a
//! node or a value, goes through [`InterceptableHost`]. The browser adapter
//! implements it over the captured original functions; tests implement it over
//! an in-memory tree.
//!
//! All methods take `&self`: hooks are re-entered whenever a delegated call runs
//! page script synchronously (appending a script element executes it), so hosts
//! keep whatever mutable state they need behind their own cells.

pub use crate::registry::NodeRecord;
pub use crate::types::ScriptProperty;

// =============================================================================
// Node Views
// =============================================================================

/// Observable surfaces of an element, captured at inspection time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementView {
    /// Upper-case node name (`SCRIPT`, `OBJECT`, ...)
    pub tag: String,
    pub text_content: String,
    /// Resolved `src` property, if the element has one
    pub src: Option<String>,
    /// Resolved `href` property, if the element has one
    pub href: Option<String>,
    /// Resolved `data` property (`<object>`)
    pub data: Option<String>,
    /// Attributes as written, names lower-cased
    pub attributes: Vec<(String, String)>,
}

impl ElementView {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_uppercase(),
            ..Self::default()
        }
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    /// Attribute value by (case-insensitive) name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `<script type="module">`
    pub fn is_module_script(&self) -> bool {
        self.is("script")
            && self
                .attribute("type")
                .is_some_and(|ty| ty.trim().eq_ignore_ascii_case("module"))
    }
}

/// Tagged view over the node kinds the inspector understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeView {
    Element(ElementView),
    Text(String),
    Comment(String),
    /// Aggregated text of the fragment's descendants
    DocumentFragment(String),
}

impl NodeView {
    pub fn text_content(&self) -> &str {
        match self {
            Self::Element(element) => &element.text_content,
            Self::Text(data) | Self::Comment(data) | Self::DocumentFragment(data) => data,
        }
    }

    pub fn as_element(&self) -> Option<&ElementView> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }
}

// =============================================================================
// Values
// =============================================================================

/// What a host value looks like to the inspector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptPayload {
    /// A string that would be compiled as code
    Text(String),
    /// A function, represented by its source text
    Function(String),
    /// Anything else; never inspected
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Timeout,
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Dedicated,
    Shared,
}

/// Global objects whose `on*` handler properties are guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerTarget {
    Window,
    Document,
}

// =============================================================================
// Host
// =============================================================================

/// Capability boundary between the interception engine and the page.
pub trait InterceptableHost {
    /// A node handle (may also be a non-node value passed where a node is expected)
    type Node: Clone;
    /// Any page value
    type Value;
    /// Result of worker construction
    type Worker;
    /// Result of service-worker registration
    type Registration;
    /// Exception raised by an original operation; passed through to the page
    type Error;

    // ---- observation ----

    /// Side record of `node` (the default record when nothing is stored yet),
    /// or None when the value is not a node.
    fn node_record(&self, node: &Self::Node) -> Option<NodeRecord>;

    /// Store the side record of `node`. Storage is weakly keyed: the record
    /// must not keep the node alive and goes away with it. Non-nodes are
    /// ignored.
    fn store_node_record(&self, node: &Self::Node, record: NodeRecord);

    /// Inspectable view of `node`, or None for kinds the inspector ignores.
    fn node_view(&self, node: &Self::Node) -> Option<NodeView>;

    /// Classify a value passed to an evaluation entry point.
    fn payload(&self, value: &Self::Value) -> ScriptPayload;

    /// String form of a URL-like argument (string or URL object).
    fn url_text(&self, value: &Self::Value) -> String;

    fn undefined(&self) -> Self::Value;

    /// A page string.
    fn text_value(&self, text: &str) -> Self::Value;

    // ---- original operations ----

    fn create_element(
        &self,
        tag: &Self::Value,
        options: Option<&Self::Value>,
    ) -> Result<Self::Node, Self::Error>;

    /// Write through the element's original property setter.
    fn set_script_property(
        &self,
        element: &Self::Node,
        property: ScriptProperty,
        value: &Self::Value,
    ) -> Result<(), Self::Error>;

    fn append_child(&self, parent: &Self::Node, child: &Self::Node) -> Result<Self::Node, Self::Error>;

    fn insert_before(
        &self,
        parent: &Self::Node,
        new_node: &Self::Node,
        reference: Option<&Self::Node>,
    ) -> Result<Self::Node, Self::Error>;

    fn replace_child(
        &self,
        parent: &Self::Node,
        new_child: &Self::Node,
        old_child: &Self::Node,
    ) -> Result<Self::Node, Self::Error>;

    /// Detach a node from its parent, if it has one.
    fn remove_node(&self, node: &Self::Node);

    fn write(&self, markup: &[Self::Value], newline: bool) -> Result<(), Self::Error>;

    fn eval(&self, code: &Self::Value) -> Result<Self::Value, Self::Error>;

    fn construct_function(&self, args: &[Self::Value]) -> Result<Self::Value, Self::Error>;

    /// A function that does nothing, with the original constructor's prototype.
    fn inert_function(&self) -> Self::Value;

    fn schedule(
        &self,
        kind: TimerKind,
        handler: &Self::Value,
        rest: &[Self::Value],
    ) -> Result<Self::Value, Self::Error>;

    /// Sentinel returned instead of a timer id.
    fn sentinel_timer(&self) -> Self::Value;

    fn spawn_worker(
        &self,
        kind: WorkerKind,
        url: &Self::Value,
        options: Option<&Self::Value>,
    ) -> Result<Self::Worker, Self::Error>;

    /// Object with the worker's call surface whose methods do nothing.
    fn inert_worker(&self, kind: WorkerKind) -> Self::Worker;

    fn register_service_worker(
        &self,
        url: &Self::Value,
        options: Option<&Self::Value>,
    ) -> Result<Self::Registration, Self::Error>;

    /// A registration outcome that is already rejected with `reason`.
    fn rejected_registration(&self, reason: &str) -> Self::Registration;

    fn add_event_listener(
        &self,
        target: &Self::Value,
        event_type: &str,
        listener: &Self::Value,
        options: Option<&Self::Value>,
    ) -> Result<(), Self::Error>;

    fn set_handler_property(
        &self,
        target: HandlerTarget,
        event_type: &str,
        handler: &Self::Value,
    ) -> Result<(), Self::Error>;

    /// Drop any handler currently stored in the `on<event_type>` property.
    fn clear_handler_property(&self, target: HandlerTarget, event_type: &str);
}
