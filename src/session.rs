use serde_json::Value as JsonValue;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::context::UiContext;
use crate::events::{DispatchOutcome, DomEvent};
use crate::net::{Backoff, Closed, ConnectionManager, Opened, RetryTimer, Transport};
use crate::patch::PatchApplier;
use crate::protocol::{ClientFunction, Codec, Command, Dispatcher, JsonCodec, Reaction};
use crate::registry::NodeKey;

/// What a transport reports about one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Frame(Vec<u8>),
    Closed(u16),
}

/// Everything the session loop reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transport { epoch: u64, event: TransportEvent },
    RetryDue(u64),
    Dom(DomEvent),
    Shutdown,
}

/// One UI session: document state, protocol routing and the server connection.
pub struct Session<T, R, C = JsonCodec> {
    context: UiContext,
    dispatcher: Dispatcher,
    connection: ConnectionManager<T, R>,
    codec: C,
}

impl<T: Transport, R: RetryTimer> Session<T, R, JsonCodec> {
    pub fn new(config: &ClientConfig, transport: T, timer: R) -> Result<Self, ConfigError> {
        Self::with_codec(config, transport, timer, JsonCodec)
    }
}

impl<T: Transport, R: RetryTimer, C: Codec> Session<T, R, C> {
    pub fn with_codec(
        config: &ClientConfig,
        transport: T,
        timer: R,
        codec: C,
    ) -> Result<Self, ConfigError> {
        let applier = PatchApplier::new(config.add_node_ids, config.utc_offset()?);
        let connection = ConnectionManager::new(
            transport,
            timer,
            Backoff::new(config.backoff_schedule()),
            config.pending_sends,
        );
        Ok(Self {
            context: UiContext::new(&config.root_id, &config.online_bar_id),
            dispatcher: Dispatcher::new(applier),
            connection,
            codec,
        })
    }

    pub fn context(&self) -> &UiContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut UiContext {
        &mut self.context
    }

    pub fn connection(&self) -> &ConnectionManager<T, R> {
        &self.connection
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Make `name` callable by the server's `call` message.
    pub fn define_function(&mut self, name: &str, function: ClientFunction) {
        self.dispatcher.globals_mut().define(name, function);
    }

    /// Connect and ask the server for the initial render.
    pub fn start(&mut self) {
        self.send(Command::Refresh);
    }

    pub fn send(&mut self, command: Command) {
        if command.is_interaction() {
            self.dispatcher.busy_mut().raise();
        }
        match self.codec.encode(&command) {
            Ok(frame) => self.connection.send(frame),
            Err(err) => warn!(target = "session", error = %err, "failed to encode command"),
        }
        self.sync_online();
    }

    /// Report a client-side call back to the server.
    pub fn call(&mut self, oid: NodeKey, method: &str, args: Vec<JsonValue>) {
        self.send(Command::Call {
            oid,
            method: method.to_string(),
            args,
        });
    }

    pub fn reset(&mut self) {
        self.dispatcher.reset(&mut self.context);
    }

    /// Route a DOM event through delegation and send whatever it produced.
    pub fn dispatch_event(&mut self, event: &DomEvent) -> DispatchOutcome {
        let root = self.context.root();
        let outcome = self.context.events.dispatch(
            event,
            &self.context.document,
            &self.context.registry,
            root,
        );
        for command in &outcome.commands {
            self.send(command.clone());
        }
        outcome
    }

    pub fn handle_frame(&mut self, frame: &[u8]) {
        let message = match self.codec.decode(frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(target = "session", error = %err, "dropping undecodable frame");
                return;
            }
        };
        for reaction in self.dispatcher.handle(&mut self.context, message) {
            match reaction {
                Reaction::Reply(command) => self.send(command),
                Reaction::Reopen => self.connection.reopen(),
            }
        }
        self.sync_online();
    }

    /// Handle one event; returns `false` once the session should stop.
    pub fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Transport { epoch, event } => match event {
                TransportEvent::Opened => {
                    if self.connection.handle_open(epoch) == Some(Opened::Resumed) {
                        info!(target = "session", "connection resumed, requesting resync");
                        self.send(Command::Up);
                    }
                }
                TransportEvent::Frame(frame) => {
                    if epoch == self.connection.epoch() {
                        self.handle_frame(&frame);
                    } else {
                        debug!(target = "session", epoch, "dropping frame from stale connection");
                    }
                }
                TransportEvent::Closed(code) => {
                    if let Some(Closed::GaveUp) = self.connection.handle_close(epoch, code) {
                        warn!(target = "session", "server unreachable, giving up");
                    }
                }
            },
            SessionEvent::RetryDue(ticket) => self.connection.handle_retry_due(ticket),
            SessionEvent::Dom(event) => {
                self.dispatch_event(&event);
            }
            SessionEvent::Shutdown => return false,
        }
        self.sync_online();
        true
    }

    /// Drain `events` until the channel closes or a shutdown arrives.
    pub async fn run(&mut self, mut events: UnboundedReceiver<SessionEvent>) {
        self.start();
        while let Some(event) = events.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
        info!(target = "session", "session loop finished");
    }

    fn sync_online(&mut self) {
        let connected = self.connection.is_connected();
        if self.context.is_online_shown() != connected {
            self.context.set_online(connected);
        }
    }
}
