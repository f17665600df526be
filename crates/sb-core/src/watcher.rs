//! Mutation Watcher
//!
//! Backstop for nodes that reach the tree without passing a hooked entry point
//! (markup parsing, `innerHTML` on a container). The adapter feeds every batch of
//! added nodes from its tree observer into [`Interceptor::observe_added`]. This
//! runs after insertion, so an inserted script may already have started.
//!
//! Three passes run per node:
//! - generic: full inspection of unprocessed nodes, structural nodes skipped
//! - script source: `<script type=module>` and `data:` script sources
//! - anti-devtools (add-on): scripts carrying a devtools-blocking signature

use crate::antidebug::find_signature;
use crate::host::{ElementView, InterceptableHost, NodeRecord, NodeView};
use crate::inspector::ContentInspector;
use crate::intercept::Interceptor;
use crate::journal::HookPoint;
use crate::registry::Outcome;
use crate::types::{Finding, HookSet, Surface};
use crate::url::parse_data_uri;

/// Nodes the generic pass never inspects.
const STRUCTURAL_TAGS: &[&str] = &["HTML", "HEAD", "BODY"];

impl<H: InterceptableHost> Interceptor<H> {
    /// Process one batch of added nodes. Returns how many were removed.
    pub fn observe_added(&self, nodes: &[H::Node]) -> usize {
        let hooks = self.effective_hooks();
        if !hooks.intersects(HookSet::MUTATION_WATCHER | HookSet::SCRIPT_SOURCE_WATCHER | HookSet::ANTI_DEVTOOLS) {
            return 0;
        }

        let mut removed = 0;
        for node in nodes {
            let Some(record) = self.host().node_record(node) else { continue };
            let Some(view) = self.host().node_view(node) else {
                self.mark(node, Outcome::Clean);
                continue;
            };

            let hit = (hooks.contains(HookSet::MUTATION_WATCHER) && self.watch_generic(node, record, &view))
                || (hooks.contains(HookSet::SCRIPT_SOURCE_WATCHER) && self.watch_script_source(node, &view))
                || (hooks.contains(HookSet::ANTI_DEVTOOLS) && self.watch_devtools(node, &view));
            if hit {
                removed += 1;
            }
        }
        if removed > 0 {
            log::debug!("mutation batch: removed {removed} of {} node(s)", nodes.len());
        }
        removed
    }

    fn remove_blocked(&self, node: &H::Node, hook: HookPoint, finding: &Finding) {
        self.host().remove_node(node);
        self.mark(node, Outcome::Blocked);
        self.suppress(hook, finding);
    }

    fn generic_finding(&self, view: &NodeView) -> Option<Finding> {
        let state = self.state.try_borrow().ok()?;
        let inspector = ContentInspector::new(&state.keywords);
        inspector.inspect(view).or_else(|| {
            // Raw attribute as written, in case it differs from the resolved property
            let element = view.as_element().filter(|element| element.is("script"))?;
            inspector.inspect_text(element.attribute("src")?, Surface::Src)
        })
    }

    /// Generic pass. Every node it sees is marked processed.
    pub(crate) fn watch_generic(&self, node: &H::Node, record: NodeRecord, view: &NodeView) -> bool {
        if record.is_processed() {
            return false;
        }

        if let NodeView::Element(element) = view {
            if STRUCTURAL_TAGS.iter().any(|tag| element.is(tag)) {
                self.mark(node, Outcome::Skipped);
                return false;
            }
        }

        match self.generic_finding(view) {
            Some(finding) => {
                self.remove_blocked(node, HookPoint::MutationWatcher, &finding);
                true
            }
            None => {
                self.mark(node, Outcome::Clean);
                false
            }
        }
    }

    fn script_source_finding(&self, element: &ElementView) -> Option<(HookPoint, Finding)> {
        if element.is_module_script() {
            let finding = element
                .src
                .as_deref()
                .and_then(|src| self.inspect_text(src, Surface::ModuleScript))
                .or_else(|| self.inspect_text(&element.text_content, Surface::ModuleScript))?;
            return Some((HookPoint::ModuleWatcher, finding));
        }

        let uri = parse_data_uri(element.src.as_deref()?)?;
        let finding = self.inspect_text(&uri.decode(), Surface::DataUri)?;
        Some((HookPoint::DataUriWatcher, finding))
    }

    /// Script-source pass: module scripts and `data:` sources.
    pub(crate) fn watch_script_source(&self, node: &H::Node, view: &NodeView) -> bool {
        if self.outcome(node) == Some(Outcome::Blocked) {
            return false;
        }
        let Some(element) = view.as_element().filter(|element| element.is("script")) else {
            return false;
        };
        match self.script_source_finding(element) {
            Some((hook, finding)) => {
                self.remove_blocked(node, hook, &finding);
                true
            }
            None => false,
        }
    }

    /// Anti-devtools pass.
    pub(crate) fn watch_devtools(&self, node: &H::Node, view: &NodeView) -> bool {
        if self.outcome(node) == Some(Outcome::Blocked) {
            return false;
        }
        let Some(element) = view.as_element().filter(|element| element.is("script")) else {
            return false;
        };
        let Some(signature) = find_signature(&element.text_content) else {
            return false;
        };
        let finding = Finding::new(signature, element.text_content.clone(), Surface::DevtoolsSignature);
        self.remove_blocked(node, HookPoint::AntiDevtools, &finding);
        true
    }
}
