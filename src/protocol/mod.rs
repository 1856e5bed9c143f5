mod codec;
mod command;
mod dispatcher;
mod message;

pub use codec::{Codec, CodecError, JsonCodec};
pub use command::{BoxMetrics, Command};
pub use dispatcher::{BusyCounter, ClientFunction, Dispatcher, Globals, Reaction};
pub use message::Message;
