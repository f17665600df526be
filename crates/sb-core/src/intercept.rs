//! Interception Layer
//!
//! Every replaced platform entry point lands in one of the methods below. Each
//! method inspects its candidate, records and suppresses on a finding, and
//! otherwise delegates to the original operation through the host.
//!
//! Delegated originals may run page script synchronously (appending a script
//! element executes it), and that script may call back into these hooks. No
//! borrow of the engine state is ever held across a host call: decide, release,
//! then delegate.
//!
//! Two hook sets are tracked. `installed` only grows: it is what the adapter has
//! put in place. `effective` is what the current resolution asks for; a hook that
//! is installed but not effective passes straight through.

use std::cell::{Cell, RefCell};

use crate::antidebug::{find_signature, is_guarded_event, GUARDED_HANDLER_PROPERTIES};
use crate::host::{HandlerTarget, InterceptableHost, ScriptPayload, TimerKind, WorkerKind};
use crate::inspector::ContentInspector;
use crate::journal::{BlockJournal, BlockRecord, HookPoint};
use crate::registry::{NodeRecord, Outcome};
use crate::resolver::{resolve_with, Resolution, ResolverOptions};
use crate::types::{
    FilterConfig, Finding, HookSet, KeywordSet, MergePolicy, PageContext, ScriptProperty, Surface,
};

/// Stored instead of a blocked `innerHTML`/`textContent` write.
pub const BLOCKED_PLACEHOLDER: &str = "/* blocked by script blocker */";

/// Rejection reason of a blocked service-worker registration.
pub const SERVICE_WORKER_REJECTION: &str = "Blocked by Script Blocker";

/// Install-time options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    /// Enable the devtools-blocking countermeasure removal add-on
    pub anti_devtools: bool,
    pub merge_policy: MergePolicy,
    /// Merge the built-in whitelists with the operator's
    pub builtin_whitelists: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            anti_devtools: true,
            merge_policy: MergePolicy::Union,
            builtin_whitelists: true,
        }
    }
}

impl InstallOptions {
    fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            merge_policy: self.merge_policy,
            builtin_whitelists: self.builtin_whitelists,
        }
    }

    /// Hooks a resolution asks for.
    pub fn required_hooks(&self, resolution: &Resolution) -> HookSet {
        match resolution {
            Resolution::Skip(_) => HookSet::empty(),
            Resolution::Active(policy) => HookSet::for_policy(policy, self.anti_devtools),
        }
    }
}

#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) page: PageContext,
    pub(crate) resolution: Resolution,
    /// Empty whenever the page is skipped
    pub(crate) keywords: KeywordSet,
    pub(crate) journal: BlockJournal,
}

/// The interception engine for one page.
pub struct Interceptor<H: InterceptableHost> {
    host: H,
    options: InstallOptions,
    installed: Cell<HookSet>,
    effective: Cell<HookSet>,
    pub(crate) state: RefCell<EngineState>,
}

impl<H: InterceptableHost> Interceptor<H> {
    /// Resolve `config` for `page` and set up the engine. The adapter installs
    /// the replacements named by [`Interceptor::installed_hooks`].
    pub fn install(host: H, page: PageContext, config: &FilterConfig, options: InstallOptions) -> Self {
        let interceptor = Self {
            host,
            options,
            installed: Cell::new(HookSet::empty()),
            effective: Cell::new(HookSet::empty()),
            state: RefCell::new(EngineState {
                page: page.clone(),
                resolution: Resolution::Skip(crate::resolver::SkipReason::NoMatchingRule),
                keywords: KeywordSet::new(),
                journal: BlockJournal::new(),
            }),
        };
        interceptor.reconfigure(page, config);
        interceptor
    }

    /// Re-resolve after a configuration change. Returns the hooks that were not
    /// installed before and now have to be.
    pub fn reconfigure(&self, page: PageContext, config: &FilterConfig) -> HookSet {
        let resolution = resolve_with(&page, config, &self.options.resolver_options());
        let required = self.options.required_hooks(&resolution);
        let added = required.difference(self.installed.get());

        self.installed.set(self.installed.get() | required);
        self.effective.set(required);
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.keywords = resolution.policy().map(|p| p.keywords.clone()).unwrap_or_default();
            state.resolution = resolution;
            state.page = page;
        }

        if added.contains(HookSet::ANTI_DEVTOOLS) {
            self.clear_devtools_handlers();
        }

        if required.is_empty() {
            log::info!("filtering inactive");
        } else {
            log::info!("filtering active, hooks: {}", required.names().join(", "));
        }
        added
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Every hook ever required on this page.
    pub fn installed_hooks(&self) -> HookSet {
        self.installed.get()
    }

    /// Hooks that currently filter.
    pub fn effective_hooks(&self) -> HookSet {
        self.effective.get()
    }

    pub fn resolution(&self) -> Resolution {
        self.state.borrow().resolution.clone()
    }

    pub fn page(&self) -> PageContext {
        self.state.borrow().page.clone()
    }

    pub fn keywords(&self) -> KeywordSet {
        self.state.borrow().keywords.clone()
    }

    /// Number of (deduplicated) suppressions on this page.
    pub fn blocked_count(&self) -> usize {
        self.state.borrow().journal.len()
    }

    pub fn records(&self) -> Vec<BlockRecord> {
        self.state.borrow().journal.records().to_vec()
    }

    pub fn outcome(&self, node: &H::Node) -> Option<Outcome> {
        self.host.node_record(node)?.outcome
    }

    /// Whether writes to this element's script properties go through
    /// [`Interceptor::set_script_property`].
    pub fn is_guarded(&self, node: &H::Node) -> bool {
        self.host
            .node_record(node)
            .is_some_and(|record| record.guard.is_some())
    }

    // =========================================================================
    // Decision helpers
    // =========================================================================

    #[inline]
    pub(crate) fn filtering(&self, hook: HookSet) -> bool {
        self.effective.get().contains(hook)
    }

    /// Search `text` for a keyword. An unavailable state is no finding.
    pub(crate) fn inspect_text(&self, text: &str, surface: Surface) -> Option<Finding> {
        let state = self.state.try_borrow().ok()?;
        ContentInspector::new(&state.keywords).inspect_text(text, surface)
    }

    /// Inspect a node that is not yet processed.
    fn inspect_node(&self, node: &H::Node, record: NodeRecord) -> Option<Finding> {
        if record.is_processed() {
            return None;
        }
        let view = self.host.node_view(node)?;
        let state = self.state.try_borrow().ok()?;
        ContentInspector::new(&state.keywords).inspect(&view)
    }

    pub(crate) fn update_record(&self, node: &H::Node, update: impl FnOnce(NodeRecord) -> NodeRecord) {
        if let Some(record) = self.host.node_record(node) {
            self.host.store_node_record(node, update(record));
        }
    }

    pub(crate) fn mark(&self, node: &H::Node, outcome: Outcome) {
        self.update_record(node, |record| record.marked(outcome));
    }

    pub(crate) fn suppress(&self, hook: HookPoint, finding: &Finding) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.journal.record(hook, finding);
        }
    }

    fn payload_finding(&self, value: &H::Value, text_surface: Surface, function_surface: Surface) -> Option<Finding> {
        match self.host.payload(value) {
            ScriptPayload::Text(text) => self.inspect_text(&text, text_surface),
            ScriptPayload::Function(source) => self.inspect_text(&source, function_surface),
            ScriptPayload::Other => None,
        }
    }

    // =========================================================================
    // Element creation
    // =========================================================================

    /// `document.createElement`. Script elements get their property writes
    /// guarded.
    pub fn create_element(&self, tag: &H::Value, options: Option<&H::Value>) -> Result<H::Node, H::Error> {
        let element = self.host.create_element(tag, options)?;
        if self.filtering(HookSet::CREATE_ELEMENT) && self.host.url_text(tag).eq_ignore_ascii_case("script") {
            self.update_record(&element, NodeRecord::guarded);
        }
        Ok(element)
    }

    /// A write to `src`, `innerHTML` or `textContent` of a guarded script.
    pub fn set_script_property(
        &self,
        element: &H::Node,
        property: ScriptProperty,
        value: &H::Value,
    ) -> Result<(), H::Error> {
        let guard = self.host.node_record(element).and_then(|record| record.guard);
        let Some(guard) = guard else {
            return self.host.set_script_property(element, property, value);
        };

        if guard.blocked {
            log::debug!("discarding {} write on blocked script", property.as_str());
            return Ok(());
        }
        if !self.filtering(HookSet::CREATE_ELEMENT) {
            return self.host.set_script_property(element, property, value);
        }

        let ScriptPayload::Text(text) = self.host.payload(value) else {
            return self.host.set_script_property(element, property, value);
        };
        let Some(finding) = self.inspect_text(&text, Surface::ScriptProperty(property)) else {
            return self.host.set_script_property(element, property, value);
        };

        self.update_record(element, |record| record.script_blocked().marked(Outcome::Blocked));
        self.suppress(HookPoint::CreateElement, &finding);

        match property {
            ScriptProperty::Src => Ok(()),
            ScriptProperty::InnerHtml | ScriptProperty::TextContent => {
                let placeholder = self.host.text_value(BLOCKED_PLACEHOLDER);
                self.host.set_script_property(element, property, &placeholder)
            }
        }
    }

    // =========================================================================
    // Tree insertion
    // =========================================================================

    /// Whether an insertion of `node` is suppressed. A node blocked earlier
    /// stays out of the tree; it is not recorded a second time.
    fn check_insertion(&self, hook: HookPoint, node: &H::Node) -> bool {
        if !self.filtering(HookSet::TREE_INSERTION) {
            return false;
        }
        let Some(record) = self.host.node_record(node) else {
            return false;
        };
        if record.is_blocked() {
            log::debug!("{} of an already blocked node suppressed", hook.as_str());
            return true;
        }
        match self.inspect_node(node, record) {
            Some(finding) => {
                self.mark(node, Outcome::Blocked);
                self.suppress(hook, &finding);
                true
            }
            None => false,
        }
    }

    /// `Node.prototype.appendChild`. A suppressed insertion returns the child
    /// without touching the tree.
    pub fn append_child(&self, parent: &H::Node, child: &H::Node) -> Result<H::Node, H::Error> {
        if self.check_insertion(HookPoint::AppendChild, child) {
            return Ok(child.clone());
        }
        self.host.append_child(parent, child)
    }

    pub fn insert_before(
        &self,
        parent: &H::Node,
        new_node: &H::Node,
        reference: Option<&H::Node>,
    ) -> Result<H::Node, H::Error> {
        if self.check_insertion(HookPoint::InsertBefore, new_node) {
            return Ok(new_node.clone());
        }
        self.host.insert_before(parent, new_node, reference)
    }

    /// A suppressed replacement returns the old child, as a real one would.
    pub fn replace_child(
        &self,
        parent: &H::Node,
        new_child: &H::Node,
        old_child: &H::Node,
    ) -> Result<H::Node, H::Error> {
        if self.check_insertion(HookPoint::ReplaceChild, new_child) {
            return Ok(old_child.clone());
        }
        self.host.replace_child(parent, new_child, old_child)
    }

    // =========================================================================
    // Markup write
    // =========================================================================

    /// `document.write` / `document.writeln`. Dropped when the joined markup
    /// opens a script and carries a keyword.
    pub fn write(&self, markup: &[H::Value], newline: bool) -> Result<(), H::Error> {
        if self.filtering(HookSet::MARKUP_WRITE) {
            let text: String = markup.iter().map(|value| self.host.url_text(value)).collect();
            if text.to_ascii_lowercase().contains("<script") {
                if let Some(finding) = self.inspect_text(&text, Surface::MarkupWrite) {
                    let hook = if newline {
                        HookPoint::DocumentWriteln
                    } else {
                        HookPoint::DocumentWrite
                    };
                    self.suppress(hook, &finding);
                    return Ok(());
                }
            }
        }
        self.host.write(markup, newline)
    }

    // =========================================================================
    // Dynamic code
    // =========================================================================

    /// `window.eval`. A suppressed evaluation returns undefined.
    pub fn eval(&self, code: &H::Value) -> Result<H::Value, H::Error> {
        if self.filtering(HookSet::EVAL) {
            if let Some(finding) = self.payload_finding(code, Surface::EvalText, Surface::EvalFunction) {
                self.suppress(HookPoint::Eval, &finding);
                return Ok(self.host.undefined());
            }
        }
        self.host.eval(code)
    }

    /// `window.Function`, called or constructed. The body is the last argument.
    pub fn construct_function(&self, args: &[H::Value]) -> Result<H::Value, H::Error> {
        if self.filtering(HookSet::FUNCTION_CONSTRUCTOR) {
            if let Some(body) = args.last() {
                if let ScriptPayload::Text(text) = self.host.payload(body) {
                    if let Some(finding) = self.inspect_text(&text, Surface::FunctionBody) {
                        self.suppress(HookPoint::FunctionConstructor, &finding);
                        return Ok(self.host.inert_function());
                    }
                }
            }
        }
        self.host.construct_function(args)
    }

    /// `setTimeout` / `setInterval`. A suppressed call returns the sentinel id.
    pub fn schedule(&self, kind: TimerKind, handler: &H::Value, rest: &[H::Value]) -> Result<H::Value, H::Error> {
        if self.filtering(HookSet::TIMERS) {
            if let Some(finding) = self.payload_finding(handler, Surface::TimerText, Surface::TimerFunction) {
                let hook = match kind {
                    TimerKind::Timeout => HookPoint::SetTimeout,
                    TimerKind::Interval => HookPoint::SetInterval,
                };
                self.suppress(hook, &finding);
                return Ok(self.host.sentinel_timer());
            }
        }
        self.host.schedule(kind, handler, rest)
    }

    // =========================================================================
    // Workers
    // =========================================================================

    /// `new Worker` / `new SharedWorker`. A suppressed construction yields an
    /// inert stub.
    pub fn spawn_worker(
        &self,
        kind: WorkerKind,
        url: &H::Value,
        options: Option<&H::Value>,
    ) -> Result<H::Worker, H::Error> {
        if self.filtering(HookSet::WORKERS) {
            if let Some(finding) = self.inspect_text(&self.host.url_text(url), Surface::WorkerUrl) {
                let hook = match kind {
                    WorkerKind::Dedicated => HookPoint::Worker,
                    WorkerKind::Shared => HookPoint::SharedWorker,
                };
                self.suppress(hook, &finding);
                return Ok(self.host.inert_worker(kind));
            }
        }
        self.host.spawn_worker(kind, url, options)
    }

    /// `navigator.serviceWorker.register`.
    pub fn register_service_worker(
        &self,
        url: &H::Value,
        options: Option<&H::Value>,
    ) -> Result<H::Registration, H::Error> {
        if self.filtering(HookSet::SERVICE_WORKER) {
            if let Some(finding) = self.inspect_text(&self.host.url_text(url), Surface::ServiceWorkerUrl) {
                self.suppress(HookPoint::ServiceWorker, &finding);
                return Ok(self.host.rejected_registration(SERVICE_WORKER_REJECTION));
            }
        }
        self.host.register_service_worker(url, options)
    }

    // =========================================================================
    // Anti-devtools add-on
    // =========================================================================

    fn devtools_finding(&self, handler: &H::Value) -> Option<Finding> {
        let source = match self.host.payload(handler) {
            ScriptPayload::Text(source) | ScriptPayload::Function(source) => source,
            ScriptPayload::Other => return None,
        };
        let signature = find_signature(&source)?;
        Some(Finding::new(signature, source, Surface::DevtoolsSignature))
    }

    /// `EventTarget.prototype.addEventListener`.
    pub fn add_event_listener(
        &self,
        target: &H::Value,
        event_type: &str,
        listener: &H::Value,
        options: Option<&H::Value>,
    ) -> Result<(), H::Error> {
        if self.filtering(HookSet::ANTI_DEVTOOLS) && is_guarded_event(event_type) {
            if let Some(finding) = self.devtools_finding(listener) {
                self.suppress(HookPoint::AntiDevtools, &finding);
                return Ok(());
            }
        }
        self.host.add_event_listener(target, event_type, listener, options)
    }

    /// Assignment to `on<event_type>` of window or document.
    pub fn set_handler_property(
        &self,
        target: HandlerTarget,
        event_type: &str,
        handler: &H::Value,
    ) -> Result<(), H::Error> {
        if self.filtering(HookSet::ANTI_DEVTOOLS) && GUARDED_HANDLER_PROPERTIES.contains(&event_type) {
            if let Some(finding) = self.devtools_finding(handler) {
                self.suppress(HookPoint::AntiDevtools, &finding);
                return Ok(());
            }
        }
        self.host.set_handler_property(target, event_type, handler)
    }

    fn clear_devtools_handlers(&self) {
        for target in [HandlerTarget::Window, HandlerTarget::Document] {
            for event_type in GUARDED_HANDLER_PROPERTIES {
                self.host.clear_handler_property(target, event_type);
            }
        }
        log::debug!("cleared existing key and context-menu handlers");
    }
}
