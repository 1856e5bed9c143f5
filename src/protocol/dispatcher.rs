use std::collections::HashMap;
use std::fmt;

use serde_json::Value as JsonValue;
use tracing::{debug, error, info};

use super::command::Command;
use super::message::Message;
use crate::context::UiContext;
use crate::patch::{values, PatchApplier};

/// Side effects the dispatcher asks its owner to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    Reply(Command),
    Reopen,
}

pub type ClientFunction = Box<dyn FnMut(&[JsonValue]) + Send>;

/// Named functions the server may invoke with `call`.
#[derive(Default)]
pub struct Globals {
    functions: HashMap<String, ClientFunction>,
}

impl fmt::Debug for Globals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

impl Globals {
    pub fn define(&mut self, name: &str, function: ClientFunction) {
        self.functions.insert(name.to_string(), function);
    }

    /// Invoke `name` when defined; returns whether it was.
    pub fn call(&mut self, name: &str, args: &[JsonValue]) -> bool {
        match self.functions.get_mut(name) {
            Some(function) => {
                function(args);
                true
            }
            None => false,
        }
    }
}

/// Pending server round trips, shown as a busy indicator by the embedder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusyCounter(u32);

impl BusyCounter {
    pub fn raise(&mut self) {
        self.0 += 1;
    }

    pub fn lower(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn is_busy(&self) -> bool {
        self.0 > 0
    }

    pub fn count(&self) -> u32 {
        self.0
    }
}

/// Routes decoded server messages onto the UI context.
#[derive(Debug)]
pub struct Dispatcher {
    applier: PatchApplier,
    busy: BusyCounter,
    globals: Globals,
}

impl Dispatcher {
    pub fn new(applier: PatchApplier) -> Self {
        Self {
            applier,
            busy: BusyCounter::default(),
            globals: Globals::default(),
        }
    }

    pub fn busy(&self) -> &BusyCounter {
        &self.busy
    }

    pub fn busy_mut(&mut self) -> &mut BusyCounter {
        &mut self.busy
    }

    pub fn globals_mut(&mut self) -> &mut Globals {
        &mut self.globals
    }

    pub fn applier_mut(&mut self) -> &mut PatchApplier {
        &mut self.applier
    }

    /// Full reset: fresh root container, no ids, no event registrations, not busy.
    pub fn reset(&mut self, context: &mut UiContext) {
        context.reset();
        self.applier.reset();
        self.busy.reset();
    }

    pub fn handle(&mut self, context: &mut UiContext, message: Message) -> Vec<Reaction> {
        debug!(target = "protocol", kind = message.kind(), "message");
        let mut reactions = Vec::new();
        match message {
            Message::ReplaceContent { patches } => {
                let root = context.root();
                let previous = context.document.children(root);
                context.document.remove_children(root);
                self.applier.apply_all(context, &patches);
                // Old content the new patches did not pick up again is gone for good.
                for node in previous {
                    if !context.document.is_connected(node) {
                        context.document.remove(node);
                    }
                }
            }
            Message::Update { patches } => self.applier.apply_all(context, &patches),
            Message::Done => self.busy.lower(),
            Message::Error { payload } => error!(target = "protocol", payload = %payload, "server error"),
            Message::Log { payload } => info!(target = "protocol", payload = %payload, "server log"),
            Message::Remove { ids } => {
                for id in ids {
                    match context.node(&id) {
                        Some(node) => {
                            debug!(target = "protocol", id = %id, "removing node");
                            context.document.remove(node);
                        }
                        None => debug!(target = "protocol", id = %id, "node to remove not found"),
                    }
                    context.registry.release(&id, &mut context.document);
                }
            }
            Message::Measure { id } => {
                if let Some(node) = context.node(&id) {
                    let bounds = context.document.bounding_box(node).into();
                    reactions.push(Reaction::Reply(Command::Metrics { oid: id, bounds }));
                }
            }
            Message::ReadValue { id, type_hint } => {
                if let Some(node) = context.node(&id) {
                    let value = values::extract(&context.document, node, type_hint.as_deref());
                    reactions.push(Reaction::Reply(Command::Value { oid: id, value }));
                }
            }
            Message::DragMode => {
                debug!(target = "protocol", "drag mode enabled");
                context.events.enable_drag_mode();
            }
            Message::Call { method, args } => {
                if !self.globals.call(&method, &args) {
                    debug!(target = "protocol", method = %method, "no such client function");
                }
            }
            Message::Reset => {
                info!(target = "protocol", "full reset");
                self.reset(context);
            }
            Message::Reconnect => {
                info!(target = "protocol", "reconnect requested");
                reactions.push(Reaction::Reopen);
            }
            Message::Navigate { location } => context.document.navigate(&location),
            Message::Title { title } => context.document.set_title(&title),
            Message::CheckValidity { id } => {
                if let Some(node) = context.node(&id) {
                    let validity = context.document.is_valid(node);
                    reactions.push(Reaction::Reply(Command::Validity { oid: id, validity }));
                }
            }
            Message::KeysOff => context.events.keys_off(),
            Message::KeysOn => context.events.keys_on(),
            Message::Unknown => debug!(target = "protocol", "ignoring unknown message"),
        }
        context.release_discarded();
        reactions
    }
}
