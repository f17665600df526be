//! In-memory host for tests
//!
//! `FakeHost` implements [`InterceptableHost`] over an arena of nodes and records
//! every delegated call, so interception behavior can be asserted without a
//! browser. Script elements that reach the tree through a delegated insertion
//! count as executed; markup parsing bypasses the hooks and only queues a
//! mutation record for the watcher. Node side records are stored on the node
//! itself and dropped by [`FakeHost::collect`], which stands in for garbage
//! collection.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::host::{
    ElementView, HandlerTarget, InterceptableHost, NodeRecord, NodeView, ScriptPayload, ScriptProperty,
    TimerKind, WorkerKind,
};

/// Arena index of a fake node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// A page value.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeValue {
    Undefined,
    Number(f64),
    Str(String),
    /// Function, by source text
    Func(String),
    /// The inert replacement for a blocked `Function` call
    InertFunction,
    Node(NodeId),
    Other,
}

impl FakeValue {
    pub fn str(value: &str) -> Self {
        Self::Str(value.to_string())
    }

    pub fn func(source: &str) -> Self {
        Self::Func(source.to_string())
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            _ => None,
        }
    }

    fn to_js_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Number(n) => n.to_string(),
            Self::Str(s) => s.clone(),
            Self::Func(source) => source.clone(),
            Self::InertFunction => "function () {}".to_string(),
            Self::Node(_) | Self::Other => "[object Object]".to_string(),
        }
    }
}

/// Exception raised by a fake original operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeError(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct FakeWorker {
    pub kind: WorkerKind,
    pub url: String,
    /// False for the inert stub
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeRegistration {
    Registered(String),
    Rejected(String),
}

#[derive(Debug, Clone)]
enum Kind {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text,
    Comment,
    Fragment,
}

#[derive(Debug, Clone)]
struct FakeNode {
    kind: Kind,
    /// Character data, or directly assigned element text
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    record: NodeRecord,
    /// Unreachable from the page; the slot is kept so ids stay stable
    collected: bool,
}

#[derive(Debug, Default)]
struct Page {
    nodes: Vec<FakeNode>,
    mutations: Vec<NodeId>,
    executed_scripts: Vec<String>,
    evaluated: Vec<String>,
    constructed: Vec<String>,
    written: Vec<String>,
    timers: Vec<(TimerKind, String)>,
    workers: Vec<FakeWorker>,
    registrations: Vec<String>,
    listeners: Vec<(String, FakeValue)>,
    handlers: HashMap<(HandlerTarget, String), FakeValue>,
}

/// Test double for [`InterceptableHost`].
#[derive(Debug)]
pub struct FakeHost {
    page: RefCell<Page>,
    next_timer: Cell<u32>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// A page with `<html><head></head><body></body></html>`.
    pub fn new() -> Self {
        let mut page = Page::default();
        let root = push_node(&mut page, element_kind("html"), String::new());
        let head = push_node(&mut page, element_kind("head"), String::new());
        let body = push_node(&mut page, element_kind("body"), String::new());
        attach(&mut page, root, head, None);
        attach(&mut page, root, body, None);
        page.mutations.clear();
        Self {
            page: RefCell::new(page),
            next_timer: Cell::new(1),
            root,
            head,
            body,
        }
    }

    pub fn root(&self) -> FakeValue {
        FakeValue::Node(self.root)
    }

    pub fn head(&self) -> FakeValue {
        FakeValue::Node(self.head)
    }

    pub fn body(&self) -> FakeValue {
        FakeValue::Node(self.body)
    }

    // ---- building nodes without going through hooks ----

    pub fn element(&self, tag: &str) -> FakeValue {
        let mut page = self.page.borrow_mut();
        FakeValue::Node(push_node(&mut page, element_kind(tag), String::new()))
    }

    pub fn text_node(&self, data: &str) -> FakeValue {
        let mut page = self.page.borrow_mut();
        FakeValue::Node(push_node(&mut page, Kind::Text, data.to_string()))
    }

    pub fn comment(&self, data: &str) -> FakeValue {
        let mut page = self.page.borrow_mut();
        FakeValue::Node(push_node(&mut page, Kind::Comment, data.to_string()))
    }

    pub fn fragment(&self) -> FakeValue {
        let mut page = self.page.borrow_mut();
        FakeValue::Node(push_node(&mut page, Kind::Fragment, String::new()))
    }

    pub fn set_attribute(&self, node: &FakeValue, name: &str, value: &str) {
        let Some(id) = node.as_node() else { return };
        let mut page = self.page.borrow_mut();
        if let Kind::Element { attributes, .. } = &mut page.nodes[index(id)].kind {
            set_attr(attributes, name, value);
        }
    }

    pub fn set_text(&self, node: &FakeValue, text: &str) {
        let Some(id) = node.as_node() else { return };
        let mut page = self.page.borrow_mut();
        set_text(&mut page, id, text);
    }

    /// Insert as the HTML parser would: no hooks run, a mutation is queued.
    pub fn parse_into(&self, parent: &FakeValue, child: &FakeValue) {
        let (Some(parent), Some(child)) = (parent.as_node(), child.as_node()) else {
            return;
        };
        let mut page = self.page.borrow_mut();
        attach(&mut page, parent, child, None);
    }

    /// Drop a detached node the page no longer references, together with its
    /// side record, as the garbage collector would.
    pub fn collect(&self, node: &FakeValue) {
        let Ok(id) = self.node(node) else { return };
        let mut page = self.page.borrow_mut();
        let slot = &mut page.nodes[index(id)];
        if slot.parent.is_none() {
            slot.record = NodeRecord::default();
            slot.collected = true;
        }
    }

    /// Live nodes carrying a side record.
    pub fn stored_records(&self) -> usize {
        self.page
            .borrow()
            .nodes
            .iter()
            .filter(|node| !node.collected && node.record != NodeRecord::default())
            .count()
    }

    /// Drain the inserted nodes queued since the last call.
    pub fn take_mutations(&self) -> Vec<FakeValue> {
        let mut page = self.page.borrow_mut();
        page.mutations.drain(..).map(FakeValue::Node).collect()
    }

    // ---- inspection helpers ----

    pub fn children(&self, node: &FakeValue) -> Vec<FakeValue> {
        let Some(id) = node.as_node() else {
            return Vec::new();
        };
        let page = self.page.borrow();
        page.nodes[index(id)].children.iter().copied().map(FakeValue::Node).collect()
    }

    pub fn is_connected(&self, node: &FakeValue) -> bool {
        let Some(mut id) = node.as_node() else {
            return false;
        };
        let page = self.page.borrow();
        loop {
            if id == self.root {
                return true;
            }
            match page.nodes[index(id)].parent {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    pub fn text_of(&self, node: &FakeValue) -> String {
        node.as_node()
            .map(|id| text_content(&self.page.borrow(), id))
            .unwrap_or_default()
    }

    pub fn attribute_of(&self, node: &FakeValue, name: &str) -> Option<String> {
        let id = node.as_node()?;
        let page = self.page.borrow();
        match &page.nodes[index(id)].kind {
            Kind::Element { attributes, .. } => get_attr(attributes, name).map(str::to_string),
            _ => None,
        }
    }

    pub fn executed_scripts(&self) -> Vec<String> {
        self.page.borrow().executed_scripts.clone()
    }

    pub fn evaluated(&self) -> Vec<String> {
        self.page.borrow().evaluated.clone()
    }

    pub fn constructed(&self) -> Vec<String> {
        self.page.borrow().constructed.clone()
    }

    pub fn written(&self) -> Vec<String> {
        self.page.borrow().written.clone()
    }

    pub fn timers(&self) -> Vec<(TimerKind, String)> {
        self.page.borrow().timers.clone()
    }

    pub fn workers(&self) -> Vec<FakeWorker> {
        self.page.borrow().workers.clone()
    }

    pub fn registrations(&self) -> Vec<String> {
        self.page.borrow().registrations.clone()
    }

    pub fn listeners(&self) -> Vec<(String, FakeValue)> {
        self.page.borrow().listeners.clone()
    }

    pub fn handler(&self, target: HandlerTarget, event_type: &str) -> Option<FakeValue> {
        self.page
            .borrow()
            .handlers
            .get(&(target, event_type.to_string()))
            .cloned()
    }

    /// Install a handler directly, as a page script that ran before install would.
    pub fn preset_handler(&self, target: HandlerTarget, event_type: &str, handler: FakeValue) {
        self.page
            .borrow_mut()
            .handlers
            .insert((target, event_type.to_string()), handler);
    }

    fn node(&self, value: &FakeValue) -> Result<NodeId, FakeError> {
        let id = value
            .as_node()
            .ok_or_else(|| FakeError("TypeError: parameter is not of type 'Node'".into()))?;
        match self.page.borrow().nodes.get(index(id)) {
            Some(node) if !node.collected => Ok(id),
            _ => Err(FakeError("TypeError: unknown node".into())),
        }
    }
}

impl InterceptableHost for FakeHost {
    type Node = FakeValue;
    type Value = FakeValue;
    type Worker = FakeWorker;
    type Registration = FakeRegistration;
    type Error = FakeError;

    fn node_record(&self, node: &FakeValue) -> Option<NodeRecord> {
        let id = self.node(node).ok()?;
        Some(self.page.borrow().nodes[index(id)].record)
    }

    fn store_node_record(&self, node: &FakeValue, record: NodeRecord) {
        if let Ok(id) = self.node(node) {
            self.page.borrow_mut().nodes[index(id)].record = record;
        }
    }

    fn node_view(&self, node: &FakeValue) -> Option<NodeView> {
        let id = self.node(node).ok()?;
        let page = self.page.borrow();
        let data = &page.nodes[index(id)];
        let view = match &data.kind {
            Kind::Element { tag, attributes } => {
                let mut view = ElementView::new(tag);
                view.text_content = text_content(&page, id);
                view.src = get_attr(attributes, "src").map(str::to_string);
                view.href = get_attr(attributes, "href").map(str::to_string);
                view.data = get_attr(attributes, "data").map(str::to_string);
                view.attributes = attributes.clone();
                NodeView::Element(view)
            }
            Kind::Text => NodeView::Text(data.text.clone()),
            Kind::Comment => NodeView::Comment(data.text.clone()),
            Kind::Fragment => NodeView::DocumentFragment(text_content(&page, id)),
        };
        Some(view)
    }

    fn payload(&self, value: &FakeValue) -> ScriptPayload {
        match value {
            FakeValue::Str(text) => ScriptPayload::Text(text.clone()),
            FakeValue::Func(source) => ScriptPayload::Function(source.clone()),
            _ => ScriptPayload::Other,
        }
    }

    fn url_text(&self, value: &FakeValue) -> String {
        value.to_js_string()
    }

    fn undefined(&self) -> FakeValue {
        FakeValue::Undefined
    }

    fn text_value(&self, text: &str) -> FakeValue {
        FakeValue::str(text)
    }

    fn create_element(&self, tag: &FakeValue, _options: Option<&FakeValue>) -> Result<FakeValue, FakeError> {
        let tag = tag.to_js_string();
        if tag.is_empty() || tag.contains(' ') {
            return Err(FakeError(format!("InvalidCharacterError: {tag:?}")));
        }
        Ok(self.element(&tag))
    }

    fn set_script_property(
        &self,
        element: &FakeValue,
        property: ScriptProperty,
        value: &FakeValue,
    ) -> Result<(), FakeError> {
        let id = self.node(element)?;
        let value = value.to_js_string();
        let mut page = self.page.borrow_mut();
        match property {
            ScriptProperty::Src => {
                if let Kind::Element { attributes, .. } = &mut page.nodes[index(id)].kind {
                    set_attr(attributes, "src", &value);
                }
            }
            ScriptProperty::InnerHtml | ScriptProperty::TextContent => set_text(&mut page, id, &value),
        }
        Ok(())
    }

    fn append_child(&self, parent: &FakeValue, child: &FakeValue) -> Result<FakeValue, FakeError> {
        let (parent_id, child_id) = (self.node(parent)?, self.node(child)?);
        let mut page = self.page.borrow_mut();
        attach(&mut page, parent_id, child_id, None);
        run_scripts(&mut page, child_id);
        Ok(child.clone())
    }

    fn insert_before(
        &self,
        parent: &FakeValue,
        new_node: &FakeValue,
        reference: Option<&FakeValue>,
    ) -> Result<FakeValue, FakeError> {
        let (parent_id, child_id) = (self.node(parent)?, self.node(new_node)?);
        let reference = reference.map(|r| self.node(r)).transpose()?;
        let mut page = self.page.borrow_mut();
        if let Some(reference) = reference {
            if page.nodes[index(reference)].parent != Some(parent_id) {
                return Err(FakeError("NotFoundError: reference is not a child".into()));
            }
        }
        attach(&mut page, parent_id, child_id, reference);
        run_scripts(&mut page, child_id);
        Ok(new_node.clone())
    }

    fn replace_child(
        &self,
        parent: &FakeValue,
        new_child: &FakeValue,
        old_child: &FakeValue,
    ) -> Result<FakeValue, FakeError> {
        let (parent_id, new_id, old_id) = (self.node(parent)?, self.node(new_child)?, self.node(old_child)?);
        let mut page = self.page.borrow_mut();
        if page.nodes[index(old_id)].parent != Some(parent_id) {
            return Err(FakeError("NotFoundError: old child is not a child".into()));
        }
        attach(&mut page, parent_id, new_id, Some(old_id));
        detach(&mut page, old_id);
        run_scripts(&mut page, new_id);
        Ok(old_child.clone())
    }

    fn remove_node(&self, node: &FakeValue) {
        if let Ok(id) = self.node(node) {
            detach(&mut self.page.borrow_mut(), id);
        }
    }

    fn write(&self, markup: &[FakeValue], newline: bool) -> Result<(), FakeError> {
        let mut text: String = markup.iter().map(FakeValue::to_js_string).collect();
        if newline {
            text.push('\n');
        }
        self.page.borrow_mut().written.push(text);
        Ok(())
    }

    fn eval(&self, code: &FakeValue) -> Result<FakeValue, FakeError> {
        let FakeValue::Str(code) = code else {
            return Ok(code.clone());
        };
        self.page.borrow_mut().evaluated.push(code.clone());
        let expr = code.rsplit('=').next().unwrap_or(code).trim();
        Ok(expr
            .parse::<f64>()
            .map(FakeValue::Number)
            .unwrap_or(FakeValue::Undefined))
    }

    fn construct_function(&self, args: &[FakeValue]) -> Result<FakeValue, FakeError> {
        let body = args.last().map(FakeValue::to_js_string).unwrap_or_default();
        self.page.borrow_mut().constructed.push(body.clone());
        Ok(FakeValue::Func(format!("function anonymous() {{ {body} }}")))
    }

    fn inert_function(&self) -> FakeValue {
        FakeValue::InertFunction
    }

    fn schedule(&self, kind: TimerKind, handler: &FakeValue, _rest: &[FakeValue]) -> Result<FakeValue, FakeError> {
        self.page.borrow_mut().timers.push((kind, handler.to_js_string()));
        let id = self.next_timer.get();
        self.next_timer.set(id + 1);
        Ok(FakeValue::Number(f64::from(id)))
    }

    fn sentinel_timer(&self) -> FakeValue {
        FakeValue::Number(0.0)
    }

    fn spawn_worker(
        &self,
        kind: WorkerKind,
        url: &FakeValue,
        _options: Option<&FakeValue>,
    ) -> Result<FakeWorker, FakeError> {
        let worker = FakeWorker {
            kind,
            url: url.to_js_string(),
            live: true,
        };
        self.page.borrow_mut().workers.push(worker.clone());
        Ok(worker)
    }

    fn inert_worker(&self, kind: WorkerKind) -> FakeWorker {
        FakeWorker {
            kind,
            url: String::new(),
            live: false,
        }
    }

    fn register_service_worker(
        &self,
        url: &FakeValue,
        _options: Option<&FakeValue>,
    ) -> Result<FakeRegistration, FakeError> {
        let url = url.to_js_string();
        self.page.borrow_mut().registrations.push(url.clone());
        Ok(FakeRegistration::Registered(url))
    }

    fn rejected_registration(&self, reason: &str) -> FakeRegistration {
        FakeRegistration::Rejected(reason.to_string())
    }

    fn add_event_listener(
        &self,
        _target: &FakeValue,
        event_type: &str,
        listener: &FakeValue,
        _options: Option<&FakeValue>,
    ) -> Result<(), FakeError> {
        self.page
            .borrow_mut()
            .listeners
            .push((event_type.to_string(), listener.clone()));
        Ok(())
    }

    fn set_handler_property(
        &self,
        target: HandlerTarget,
        event_type: &str,
        handler: &FakeValue,
    ) -> Result<(), FakeError> {
        self.preset_handler(target, event_type, handler.clone());
        Ok(())
    }

    fn clear_handler_property(&self, target: HandlerTarget, event_type: &str) {
        self.page
            .borrow_mut()
            .handlers
            .remove(&(target, event_type.to_string()));
    }
}

// =============================================================================
// Arena helpers
// =============================================================================

fn index(id: NodeId) -> usize {
    id.0 as usize
}

fn element_kind(tag: &str) -> Kind {
    Kind::Element {
        tag: tag.to_ascii_uppercase(),
        attributes: Vec::new(),
    }
}

fn push_node(page: &mut Page, kind: Kind, text: String) -> NodeId {
    let id = NodeId(page.nodes.len() as u64);
    page.nodes.push(FakeNode {
        kind,
        text,
        parent: None,
        children: Vec::new(),
        record: NodeRecord::default(),
        collected: false,
    });
    id
}

fn get_attr<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn set_attr(attributes: &mut Vec<(String, String)>, name: &str, value: &str) {
    let name = name.to_ascii_lowercase();
    match attributes.iter_mut().find(|(attr, _)| *attr == name) {
        Some((_, existing)) => *existing = value.to_string(),
        None => attributes.push((name, value.to_string())),
    }
}

fn set_text(page: &mut Page, id: NodeId, text: &str) {
    for child in std::mem::take(&mut page.nodes[index(id)].children) {
        page.nodes[index(child)].parent = None;
    }
    page.nodes[index(id)].text = text.to_string();
}

fn text_content(page: &Page, id: NodeId) -> String {
    let node = &page.nodes[index(id)];
    let mut text = node.text.clone();
    if matches!(node.kind, Kind::Element { .. } | Kind::Fragment) {
        for child in &node.children {
            if !matches!(page.nodes[index(*child)].kind, Kind::Comment) {
                text.push_str(&text_content(page, *child));
            }
        }
    }
    text
}

fn detach(page: &mut Page, id: NodeId) {
    if let Some(parent) = page.nodes[index(id)].parent.take() {
        page.nodes[index(parent)].children.retain(|child| *child != id);
    }
}

/// Insert `child` under `parent` (before `reference` if given) and queue the
/// inserted nodes. A fragment moves its children instead of itself.
fn attach(page: &mut Page, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
    let moved = if matches!(page.nodes[index(child)].kind, Kind::Fragment) {
        let children = std::mem::take(&mut page.nodes[index(child)].children);
        for grandchild in &children {
            page.nodes[index(*grandchild)].parent = None;
        }
        children
    } else {
        detach(page, child);
        vec![child]
    };

    let mut position = reference
        .and_then(|r| page.nodes[index(parent)].children.iter().position(|c| *c == r))
        .unwrap_or(page.nodes[index(parent)].children.len());
    for node in moved {
        page.nodes[index(node)].parent = Some(parent);
        page.nodes[index(parent)].children.insert(position, node);
        position += 1;
        page.mutations.push(node);
    }
}

/// Script elements inserted through a delegated call run immediately.
fn run_scripts(page: &mut Page, id: NodeId) {
    let node = &page.nodes[index(id)];
    if let Kind::Element { tag, attributes } = &node.kind {
        if tag == "SCRIPT" {
            let executed = get_attr(attributes, "src")
                .map(str::to_string)
                .unwrap_or_else(|| text_content(page, id));
            page.executed_scripts.push(executed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_operations() {
        let host = FakeHost::new();
        let script = host.element("script");
        host.set_text(&script, "run()");
        host.append_child(&host.body(), &script).unwrap();
        assert!(host.is_connected(&script));
        assert_eq!(host.executed_scripts(), vec!["run()".to_string()]);

        host.remove_node(&script);
        assert!(!host.is_connected(&script));
        assert!(host.append_child(&FakeValue::Other, &script).is_err());
    }

    #[test]
    fn test_fragment_moves_children() {
        let host = FakeHost::new();
        let fragment = host.fragment();
        let a = host.element("div");
        let b = host.text_node("b");
        let note = host.comment("note");
        host.parse_into(&fragment, &a);
        host.parse_into(&fragment, &b);
        host.parse_into(&a, &note);
        host.take_mutations();
        assert_eq!(host.text_of(&fragment), "b");

        host.append_child(&host.body(), &fragment).unwrap();
        assert_eq!(host.children(&host.body()), vec![a, b]);
        assert_eq!(host.take_mutations().len(), 2);
    }

    #[test]
    fn test_node_records() {
        let host = FakeHost::new();
        let div = host.element("div");
        assert_eq!(host.node_record(&div), Some(NodeRecord::default()));
        assert_eq!(host.node_record(&FakeValue::str("div")), None);

        let record = NodeRecord::default().guarded();
        host.store_node_record(&div, record);
        assert_eq!(host.node_record(&div), Some(record));
        assert_eq!(host.stored_records(), 1);

        // Attached nodes are reachable and survive collection
        host.parse_into(&host.body(), &div);
        host.collect(&div);
        assert_eq!(host.node_record(&div), Some(record));

        host.remove_node(&div);
        host.collect(&div);
        assert_eq!(host.node_record(&div), None);
        assert_eq!(host.stored_records(), 0);
    }

    #[test]
    fn test_toy_eval() {
        let host = FakeHost::new();
        assert_eq!(host.eval(&FakeValue::str("x = 1")).unwrap(), FakeValue::Number(1.0));
        assert_eq!(host.eval(&FakeValue::str("go()")).unwrap(), FakeValue::Undefined);
        assert_eq!(host.evaluated(), vec!["x = 1".to_string(), "go()".to_string()]);
    }
}
