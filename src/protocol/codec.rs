use thiserror::Error;

use super::command::Command;
use super::message::Message;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Frame encoding. The production wire format plugs in here.
pub trait Codec: Send {
    fn decode(&self, frame: &[u8]) -> Result<Message, CodecError>;
    fn encode(&self, command: &Command) -> Result<Vec<u8>, CodecError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, frame: &[u8]) -> Result<Message, CodecError> {
        Ok(serde_json::from_slice(frame)?)
    }

    fn encode(&self, command: &Command) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(command)?)
    }
}
