use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use kuchiki::Selectors;
use tracing::{debug, warn};

use super::binding::{EventBinding, ListenerKind};
use super::dom_event::{DispatchOutcome, DomEvent};
use super::drag::DragTracker;
use crate::dom::{Document, NodeId};
use crate::patch::values;
use crate::protocol::Command;
use crate::registry::{IdentityRegistry, NodeKey};

const SUPPRESSED_WHILE_DRAGGING: &[&str] = &["dragstart", "selectstart"];

#[derive(Debug, Clone)]
enum Handler {
    Listener(EventBinding),
    /// Swallow the event and its native default.
    SuppressDefault,
}

/// A compiled delegation selector and the text it came from.
#[derive(Clone)]
struct RowSelector {
    source: String,
    compiled: Rc<Selectors>,
}

impl RowSelector {
    fn compile(source: &str) -> Option<Self> {
        let compiled = Selectors::compile(source).ok()?;
        Some(Self {
            source: source.to_string(),
            compiled: Rc::new(compiled),
        })
    }
}

impl fmt::Debug for RowSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RowSelector").field(&self.source).finish()
    }
}

#[derive(Debug, Clone)]
struct Row {
    /// `None` matches any target.
    selector: Option<RowSelector>,
    handler: Handler,
}

/// Root-level event delegation plus direct per-element listeners.
///
/// One capturing root listener per event type serves every row registered for that type;
/// rows fire in registration order and all matching rows fire.
#[derive(Debug, Default)]
pub struct DelegationEngine {
    table: HashMap<String, Vec<Row>>,
    seen: HashSet<String>,
    direct: HashMap<NodeId, Vec<(String, Handler)>>,
    keys_disabled: bool,
    drag: DragTracker,
}

impl DelegationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delegated `on:*` code from an event declaration.
    ///
    /// With a selector the reported id is the matched target's; without one the
    /// registration is scoped to `context` and reports `owner`. Returns whether anything
    /// new was registered.
    pub fn register(
        &mut self,
        context: &str,
        selector: &str,
        code: &str,
        method: &str,
        owner: Option<NodeKey>,
    ) -> bool {
        let selector = selector.trim();
        let seen_key = if selector.is_empty() {
            format!("{context}{code}")
        } else {
            format!("{selector}{code}")
        };
        if self.seen.contains(&seen_key) {
            return false;
        }

        let compiled = if selector.is_empty() {
            None
        } else {
            match RowSelector::compile(selector) {
                Some(compiled) => Some(compiled),
                None => {
                    warn!(target = "events", selector, code, "dropping registration with invalid selector");
                    return false;
                }
            }
        };
        let owner = if compiled.is_none() { owner } else { None };
        let Some(binding) = EventBinding::from_code(code, method, owner) else {
            return false;
        };

        self.seen.insert(seen_key);
        if binding.kind == ListenerKind::Drag {
            for event_type in SUPPRESSED_WHILE_DRAGGING {
                self.push_row(event_type, compiled.clone(), Handler::SuppressDefault);
            }
            if self.drag.attach_root() {
                debug!(target = "events", "drag handlers attached");
            }
        }
        let event_type = binding.event_type.clone();
        self.push_row(&event_type, compiled, Handler::Listener(binding));
        true
    }

    fn push_row(&mut self, event_type: &str, selector: Option<RowSelector>, handler: Handler) {
        let rows = self.table.entry(event_type.to_string()).or_insert_with(|| {
            debug!(target = "events", event_type, "root listener attached");
            Vec::new()
        });
        rows.push(Row { selector, handler });
    }

    /// Attach a listener to one concrete element, bypassing the table.
    pub fn listen(&mut self, node: NodeId, binding: EventBinding) {
        let handlers = self.direct.entry(node).or_default();
        if binding.kind == ListenerKind::Drag {
            for event_type in SUPPRESSED_WHILE_DRAGGING {
                handlers.push((event_type.to_string(), Handler::SuppressDefault));
            }
            self.drag.attach_root();
        }
        handlers.push((binding.event_type.clone(), Handler::Listener(binding)));
    }

    pub fn is_attached(&self, event_type: &str) -> bool {
        self.table.contains_key(event_type)
    }

    pub fn row_count(&self, event_type: &str) -> usize {
        self.table.get(event_type).map_or(0, Vec::len)
    }

    pub fn keys_off(&mut self) {
        self.keys_disabled = true;
    }

    pub fn keys_on(&mut self) {
        self.keys_disabled = false;
    }

    pub fn keys_disabled(&self) -> bool {
        self.keys_disabled
    }

    pub fn drag(&self) -> &DragTracker {
        &self.drag
    }

    /// Drag mode requested by the server.
    pub fn enable_drag_mode(&mut self) {
        self.drag.begin();
    }

    /// Drop direct listeners held by nodes the document has discarded.
    pub fn forget(&mut self, node: NodeId) {
        if self.direct.remove(&node).is_some() {
            debug!(target = "events", node = node.index(), "direct listeners dropped");
        }
    }

    pub fn direct_count(&self) -> usize {
        self.direct.len()
    }

    /// Forget every registration and drag state. The key flag survives.
    pub fn reset(&mut self) {
        self.table.clear();
        self.seen.clear();
        self.direct.clear();
        self.drag.reset();
    }

    /// Deliver `event` through the root container `root`.
    pub fn dispatch(
        &mut self,
        event: &DomEvent,
        document: &Document,
        registry: &IdentityRegistry,
        root: NodeId,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        if !document.contains(root, event.target) {
            return outcome;
        }

        if self.handle_drag_root(event, &mut outcome) {
            return outcome;
        }

        let snapshot = self.table.get(&event.event_type).cloned().unwrap_or_default();
        for row in &snapshot {
            let matched = row
                .selector
                .as_ref()
                .map_or(true, |selector| document.matches(event.target, &selector.compiled));
            if matched {
                self.invoke(&row.handler, event, document, registry, &mut outcome);
            }
        }

        for node in document.ancestors(event.target) {
            if outcome.propagation_stopped {
                break;
            }
            let Some(handlers) = self.direct.get(&node) else {
                continue;
            };
            let handlers: Vec<Handler> = handlers
                .iter()
                .filter(|(event_type, _)| *event_type == event.event_type)
                .map(|(_, handler)| handler.clone())
                .collect();
            for handler in &handlers {
                self.invoke(handler, event, document, registry, &mut outcome);
            }
        }

        outcome
    }

    fn handle_drag_root(&mut self, event: &DomEvent, outcome: &mut DispatchOutcome) -> bool {
        if !self.drag.root_attached() || !self.drag.is_dragging() {
            return false;
        }
        match event.event_type.as_str() {
            "dragstart" | "selectstart" => {
                outcome.default_prevented = true;
            }
            "mousemove" => outcome.commands.push(Command::DragMove {
                x: event.page_x,
                y: event.page_y,
            }),
            "mouseup" => {
                outcome.commands.push(Command::DragStop {
                    x: event.page_x,
                    y: event.page_y,
                });
                self.drag.finish();
                debug!(target = "events", "drag mode disabled");
            }
            _ => return false,
        }
        outcome.propagation_stopped = true;
        true
    }

    fn invoke(
        &mut self,
        handler: &Handler,
        event: &DomEvent,
        document: &Document,
        registry: &IdentityRegistry,
        outcome: &mut DispatchOutcome,
    ) {
        let binding = match handler {
            Handler::SuppressDefault => {
                outcome.propagation_stopped = true;
                outcome.default_prevented = true;
                return;
            }
            Handler::Listener(binding) => binding,
        };
        // A key listener that rejects the key behaves as if it never ran.
        let key = match &binding.kind {
            ListenerKind::Key(filter) => {
                let Some(key) = self.accepted_key(filter.as_ref(), event, document) else {
                    return;
                };
                Some(key)
            }
            _ => None,
        };
        outcome.propagation_stopped = true;

        let Some(oid) = binding
            .owner
            .clone()
            .or_else(|| nearest_id(document, registry, event.target))
        else {
            debug!(
                target = "events",
                event_type = %event.event_type,
                "event target has no id"
            );
            return;
        };
        let method = binding.method.clone();

        let command = match &binding.kind {
            ListenerKind::Default => {
                if matches!(document.tag_name(event.target), Some("button" | "form")) {
                    outcome.default_prevented = true;
                }
                Some(Command::Click { method, oid })
            }
            ListenerKind::Change => values::extract(document, event.target, None)
                .map(|x| Command::Change { method, oid, x }),
            ListenerKind::ValueBind => values::extract(document, event.target, None)
                .map(|x| Command::BindValue { v: method, oid, x }),
            ListenerKind::Select => {
                let opts = values::selected_options(document, event.target)
                    .into_iter()
                    .filter_map(|option| registry.by_node(option).cloned())
                    .collect();
                Some(Command::Select { method, oid, opts })
            }
            ListenerKind::Key(_) => key.map(|key| Command::Key { method, oid, key }),
            ListenerKind::Drag => {
                self.drag.begin();
                Some(Command::DragStart {
                    method,
                    oid,
                    x: event.page_x,
                    y: event.page_y,
                    button: event.button,
                })
            }
        };

        if let Some(command) = command {
            outcome.commands.push(command);
        }
    }

    fn accepted_key(
        &self,
        filter: Option<&keyboard_types::Key>,
        event: &DomEvent,
        document: &Document,
    ) -> Option<String> {
        if self.keys_disabled {
            return None;
        }
        let key = event.key.as_ref()?;
        if filter.is_some_and(|wanted| wanted != key) {
            return None;
        }
        if document
            .layout_box(event.target)
            .is_some_and(|rect| rect.is_empty())
        {
            return None;
        }
        Some(key.to_string())
    }
}

fn nearest_id(document: &Document, registry: &IdentityRegistry, target: NodeId) -> Option<NodeKey> {
    document
        .ancestors(target)
        .into_iter()
        .find_map(|node| registry.by_node(node).cloned())
}

#[cfg(test)]
mod tests {
    use keyboard_types::Key;

    use super::*;
    use crate::dom::{Namespace, Rect};
    use crate::patch::FieldValue;

    struct Fixture {
        document: Document,
        registry: IdentityRegistry,
        root: NodeId,
        button: NodeId,
        input: NodeId,
    }

    fn fixture() -> Fixture {
        let mut document = Document::new();
        let mut registry = IdentityRegistry::new();
        let root = document.create_element("div", Namespace::Html);
        document.append_child(document.body(), root).unwrap();
        let button = document.create_element("button", Namespace::Html);
        document.set_attribute(button, "class", "action").unwrap();
        document.append_child(root, button).unwrap();
        let input = document.create_element("input", Namespace::Html);
        document.append_child(root, input).unwrap();
        registry.assign(button, NodeKey::Int(2));
        registry.assign(input, NodeKey::Int(3));
        Fixture {
            document,
            registry,
            root,
            button,
            input,
        }
    }

    fn dispatch(engine: &mut DelegationEngine, fixture: &Fixture, event: DomEvent) -> DispatchOutcome {
        engine.dispatch(&event, &fixture.document, &fixture.registry, fixture.root)
    }

    #[test]
    fn duplicate_registration_dispatches_once() {
        let fixture = fixture();
        let mut engine = DelegationEngine::new();
        assert!(engine.register("page", ".action", "on:click", "save", None));
        assert!(!engine.register("page", ".action", "on:click", "save", None));
        assert_eq!(engine.row_count("click"), 1);

        let outcome = dispatch(&mut engine, &fixture, DomEvent::new("click", fixture.button));
        assert_eq!(
            outcome.commands,
            vec![Command::Click {
                method: "save".into(),
                oid: NodeKey::Int(2)
            }]
        );
        assert!(outcome.default_prevented);
    }

    #[test]
    fn matching_rows_fan_out() {
        let fixture = fixture();
        let mut engine = DelegationEngine::new();
        engine.register("page", "button", "on:click", "first", None);
        engine.register("page", ".action", "on:click", "second", None);
        engine.register("page", "input", "on:click", "never", None);

        let outcome = dispatch(&mut engine, &fixture, DomEvent::new("click", fixture.button));
        let methods: Vec<_> = outcome
            .commands
            .iter()
            .map(|command| match command {
                Command::Click { method, .. } => method.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(methods, ["first", "second"]);
    }

    #[test]
    fn empty_selector_reports_owner() {
        let fixture = fixture();
        let mut engine = DelegationEngine::new();
        engine.register("toolbar", "", "on:click", "open", Some(NodeKey::from("toolbar")));
        assert!(!engine.register("toolbar", "", "on:click", "open", None));

        let outcome = dispatch(&mut engine, &fixture, DomEvent::new("click", fixture.input));
        assert_eq!(
            outcome.commands,
            vec![Command::Click {
                method: "open".into(),
                oid: NodeKey::from("toolbar")
            }]
        );
        assert!(!outcome.default_prevented);
    }

    #[test]
    fn direct_listeners_bubble_until_stopped() {
        let fixture = fixture();
        let mut engine = DelegationEngine::new();
        let binding = EventBinding::from_code("on:click", "outer", None).unwrap();
        engine.listen(fixture.root, binding);

        let outcome = dispatch(&mut engine, &fixture, DomEvent::new("click", fixture.button));
        assert_eq!(outcome.commands.len(), 1);
        assert!(outcome.propagation_stopped);

        engine.register("page", "button", "on:click", "delegated", None);
        let outcome = dispatch(&mut engine, &fixture, DomEvent::new("click", fixture.button));
        assert!(matches!(
            outcome.commands.as_slice(),
            [Command::Click { method, .. }] if method == "delegated"
        ));
    }

    #[test]
    fn key_listeners_respect_gates() {
        let mut fixture = fixture();
        let mut engine = DelegationEngine::new();
        engine.register("page", "input", "on:keyup:Enter", "submit", None);
        let enter = || DomEvent::new("keyup", fixture.input).with_key(Key::Enter);

        assert_eq!(dispatch(&mut engine, &fixture, enter()).commands.len(), 1);
        let escape = DomEvent::new("keyup", fixture.input).with_key(Key::Escape);
        assert!(dispatch(&mut engine, &fixture, escape).commands.is_empty());
        let keyless = DomEvent::new("keyup", fixture.input);
        assert!(dispatch(&mut engine, &fixture, keyless).commands.is_empty());

        engine.keys_off();
        assert!(dispatch(&mut engine, &fixture, enter()).commands.is_empty());
        engine.keys_on();

        fixture
            .document
            .set_layout_box(fixture.input, Rect::new(0.0, 0.0, 0.0, 12.0));
        let enter = DomEvent::new("keyup", fixture.input).with_key(Key::Enter);
        assert!(dispatch(&mut engine, &fixture, enter).commands.is_empty());
    }

    #[test]
    fn drag_gesture_emits_start_move_stop() {
        let fixture = fixture();
        let mut engine = DelegationEngine::new();
        engine.register("page", ".action", "on:drag", "moved", None);

        let press = DomEvent::new("mousedown", fixture.button).at(10.0, 20.0).with_button(1);
        let outcome = dispatch(&mut engine, &fixture, press);
        assert!(matches!(
            outcome.commands.as_slice(),
            [Command::DragStart { button: 1, .. }]
        ));
        assert!(engine.drag().is_dragging());

        let select = dispatch(&mut engine, &fixture, DomEvent::new("selectstart", fixture.input));
        assert!(select.default_prevented);

        let motion = DomEvent::new("mousemove", fixture.input).at(15.0, 25.0);
        assert_eq!(
            dispatch(&mut engine, &fixture, motion).commands,
            vec![Command::DragMove { x: 15.0, y: 25.0 }]
        );

        let release = DomEvent::new("mouseup", fixture.input).at(16.0, 26.0);
        assert_eq!(
            dispatch(&mut engine, &fixture, release).commands,
            vec![Command::DragStop { x: 16.0, y: 26.0 }]
        );
        assert!(!engine.drag().is_dragging());

        let idle = DomEvent::new("mousemove", fixture.input);
        assert!(dispatch(&mut engine, &fixture, idle).commands.is_empty());
    }

    #[test]
    fn reset_forgets_registrations_but_not_key_flag() {
        let fixture = fixture();
        let mut engine = DelegationEngine::new();
        engine.register("page", "button", "on:click", "save", None);
        engine.keys_off();
        engine.reset();

        assert!(!engine.is_attached("click"));
        assert!(dispatch(&mut engine, &fixture, DomEvent::new("click", fixture.button))
            .commands
            .is_empty());
        assert!(engine.keys_disabled());
        assert!(engine.register("page", "button", "on:click", "save", None));
    }

    #[test]
    fn change_with_unparseable_date_reports_nothing() {
        let mut fixture = fixture();
        let mut engine = DelegationEngine::new();
        engine.register("page", "input", "on:change", "picked", None);
        fixture.document.set_input_type(fixture.input, "date").unwrap();
        fixture.document.control_mut(fixture.input).unwrap().value = "2024-13-45".into();

        let change = || DomEvent::new("change", fixture.input);
        assert!(dispatch(&mut engine, &fixture, change()).commands.is_empty());

        fixture.document.control_mut(fixture.input).unwrap().value = "1970-01-02".into();
        assert_eq!(
            dispatch(&mut engine, &fixture, change()).commands,
            vec![Command::Change {
                method: "picked".into(),
                oid: NodeKey::Int(3),
                x: FieldValue::Integer(86_400_000),
            }]
        );
    }

    #[test]
    fn value_binding_reports_variable_on_input() {
        let mut fixture = fixture();
        let mut engine = DelegationEngine::new();
        let binding = EventBinding::value_bind("input", "name", Some(NodeKey::Int(3)));
        engine.listen(fixture.input, binding);
        fixture.document.control_mut(fixture.input).unwrap().value = "Ada".into();

        assert!(dispatch(&mut engine, &fixture, DomEvent::new("change", fixture.input))
            .commands
            .is_empty());
        let outcome = dispatch(&mut engine, &fixture, DomEvent::new("input", fixture.input));
        assert_eq!(outcome.commands.len(), 1);
        assert_eq!(
            serde_json::to_value(&outcome.commands[0]).unwrap(),
            serde_json::json!({"C": "B", "v": "name", "oid": 3, "x": "Ada"})
        );
    }

    #[test]
    fn select_reports_ids_of_selected_options() {
        let mut fixture = fixture();
        let select = fixture.document.create_element("select", Namespace::Html);
        fixture.document.append_child(fixture.root, select).unwrap();
        fixture.registry.assign(select, NodeKey::Int(5));
        let mut options = Vec::new();
        for (value, selected) in [("a", true), ("b", false), ("c", true), ("d", true)] {
            let option = fixture.document.create_element("option", Namespace::Html);
            fixture.document.set_attribute(option, "value", value).unwrap();
            if selected {
                fixture.document.set_attribute(option, "selected", "").unwrap();
            }
            fixture.document.append_child(select, option).unwrap();
            options.push(option);
        }
        for (option, id) in options.iter().zip([10, 11, 12]) {
            fixture.registry.assign(*option, NodeKey::Int(id));
        }
        let mut engine = DelegationEngine::new();
        engine.register("page", "select", "on:select", "chosen", None);

        let outcome = dispatch(&mut engine, &fixture, DomEvent::new("change", select));
        assert_eq!(
            outcome.commands,
            vec![Command::Select {
                method: "chosen".into(),
                oid: NodeKey::Int(5),
                opts: vec![NodeKey::Int(10), NodeKey::Int(12)],
            }]
        );
    }

    #[test]
    fn rejected_key_row_does_not_stop_propagation() {
        let mut fixture = fixture();
        let mut engine = DelegationEngine::new();
        engine.register("page", "input", "on:keyup:Enter", "submit", None);
        let any_key = EventBinding::from_code("on:keyup", "typed", Some(NodeKey::from("form")));
        engine.listen(fixture.root, any_key.unwrap());

        let escape = DomEvent::new("keyup", fixture.input).with_key(Key::Escape);
        let outcome = dispatch(&mut engine, &fixture, escape);
        assert_eq!(
            outcome.commands,
            vec![Command::Key {
                method: "typed".into(),
                oid: NodeKey::from("form"),
                key: "Escape".into(),
            }]
        );
        assert!(outcome.propagation_stopped);

        fixture
            .document
            .set_layout_box(fixture.input, Rect::new(0.0, 0.0, 0.0, 0.0));
        let enter = DomEvent::new("keyup", fixture.input).with_key(Key::Enter);
        let outcome = dispatch(&mut engine, &fixture, enter);
        assert!(outcome.commands.is_empty());
        assert!(!outcome.propagation_stopped);
    }

    #[test]
    fn forgotten_nodes_lose_direct_listeners() {
        let fixture = fixture();
        let mut engine = DelegationEngine::new();
        let binding = EventBinding::from_code("on:click", "save", None).unwrap();
        engine.listen(fixture.button, binding);
        assert_eq!(engine.direct_count(), 1);

        engine.forget(fixture.button);
        assert_eq!(engine.direct_count(), 0);
        assert!(dispatch(&mut engine, &fixture, DomEvent::new("click", fixture.button))
            .commands
            .is_empty());
    }

    #[test]
    fn invalid_selectors_are_not_registered() {
        let mut engine = DelegationEngine::new();
        assert!(!engine.register("page", "div[", "on:click", "save", None));
        assert!(!engine.is_attached("click"));
        assert!(engine.register("page", "div, .row > span", "on:click", "save", None));
    }

    #[test]
    fn events_outside_root_are_ignored() {
        let mut fixture = fixture();
        let outside = fixture.document.create_element("button", Namespace::Html);
        let body = fixture.document.body();
        fixture.document.append_child(body, outside).unwrap();
        fixture.registry.assign(outside, NodeKey::Int(9));
        let mut engine = DelegationEngine::new();
        engine.register("page", "button", "on:click", "save", None);

        assert!(dispatch(&mut engine, &fixture, DomEvent::new("click", outside))
            .commands
            .is_empty());
    }
}
