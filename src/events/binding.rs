use std::str::FromStr;

use keyboard_types::Key;
use tracing::debug;

use crate::patch::attributes::EVENT_PREFIX;
use crate::registry::NodeKey;

/// Closed set of listener behaviours; see `DelegationEngine::invoke`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerKind {
    Default,
    Change,
    Select,
    ValueBind,
    /// Optional exact-key filter.
    Key(Option<Key>),
    Drag,
}

/// A logical listener: which DOM event it hangs off and what it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBinding {
    pub event_type: String,
    pub kind: ListenerKind,
    pub method: String,
    /// Fixed id to report; falls back to the event target's id when absent.
    pub owner: Option<NodeKey>,
}

impl EventBinding {
    /// Translate an `on:*` event code into a binding.
    ///
    /// `on:select` listens to `change`, `on:drag` to `mousedown`, `on:keyup[:Key]` and
    /// `on:keydown[:Key]` carry an optional key filter; anything else listens to the
    /// named event.
    pub fn from_code(code: &str, method: &str, owner: Option<NodeKey>) -> Option<Self> {
        let Some(name) = code.strip_prefix(EVENT_PREFIX) else {
            debug!(target = "events", code, "not an event code");
            return None;
        };
        if name.is_empty() {
            debug!(target = "events", code, "empty event code");
            return None;
        }

        let (event_type, kind) = match name {
            "select" => ("change", ListenerKind::Select),
            "drag" => ("mousedown", ListenerKind::Drag),
            "change" => ("change", ListenerKind::Change),
            _ => match name.split_once(':') {
                Some((event @ ("keyup" | "keydown"), key)) => {
                    (event, ListenerKind::Key(Some(parse_key(key))))
                }
                None if matches!(name, "keyup" | "keydown") => (name, ListenerKind::Key(None)),
                _ => (name, ListenerKind::Default),
            },
        };

        Some(Self {
            event_type: event_type.to_string(),
            kind,
            method: method.to_string(),
            owner,
        })
    }

    /// `bind:value` listens to `input` on `<input>` elements and to `change` elsewhere.
    pub fn value_bind(tag_name: &str, variable: &str, owner: Option<NodeKey>) -> Self {
        let event_type = if tag_name.eq_ignore_ascii_case("input") {
            "input"
        } else {
            "change"
        };
        Self {
            event_type: event_type.to_string(),
            kind: ListenerKind::ValueBind,
            method: variable.to_string(),
            owner,
        }
    }
}

fn parse_key(name: &str) -> Key {
    Key::from_str(name).unwrap_or_else(|_| Key::Character(name.to_string()))
}
