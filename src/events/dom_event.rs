use keyboard_types::Key;

use crate::dom::NodeId;
use crate::protocol::Command;

/// A raw DOM event as reported by the embedder.
#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    pub event_type: String,
    pub target: NodeId,
    pub page_x: f64,
    pub page_y: f64,
    pub button: i16,
    pub key: Option<Key>,
}

impl DomEvent {
    pub fn new(event_type: &str, target: NodeId) -> Self {
        Self {
            event_type: event_type.to_string(),
            target,
            page_x: 0.0,
            page_y: 0.0,
            button: 0,
            key: None,
        }
    }

    pub fn at(mut self, page_x: f64, page_y: f64) -> Self {
        self.page_x = page_x;
        self.page_y = page_y;
        self
    }

    pub fn with_button(mut self, button: i16) -> Self {
        self.button = button;
        self
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
    pub propagation_stopped: bool,
    pub commands: Vec<Command>,
}
