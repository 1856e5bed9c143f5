mod backoff;
mod connection;
mod ws;

pub use backoff::{Backoff, DEFAULT_SCHEDULE_SECS};
pub use connection::{
    Closed, ConnectionManager, ConnectionState, Opened, PendingPolicy, RetryTimer, Transport,
    TransportError, CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL,
};
pub use ws::{TokioRetryTimer, WebSocketTransport};

#[cfg(test)]
pub(crate) use connection::testing;
