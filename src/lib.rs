// Library exports for the client runtime and its tests

pub mod config;
pub mod context;
pub mod dom;
pub mod events;
pub mod net;
pub mod patch;
pub mod protocol;
pub mod registry;
pub mod session;

// Re-export commonly used types for tests
pub use config::{ClientConfig, ConfigError};
pub use context::UiContext;
pub use events::DomEvent;
pub use protocol::{Command, Message};
pub use registry::NodeKey;
pub use session::{Session, SessionEvent, TransportEvent};
