use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use url::Url;

use super::connection::{RetryTimer, Transport, TransportError, CLOSE_ABNORMAL, CLOSE_NO_STATUS};
use crate::session::{SessionEvent, TransportEvent};

enum Outbound {
    Frame(Vec<u8>),
    Close(u16),
}

/// WebSocket transport: each connection runs in its own task and reports back through
/// the session event channel.
pub struct WebSocketTransport {
    url: Url,
    events: UnboundedSender<SessionEvent>,
    outbound: Option<UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    pub fn new(url: Url, events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            url,
            events,
            outbound: None,
            task: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, epoch: u64) {
        let (tx, rx) = unbounded_channel();
        // Dropping the previous sender lets a still-running connection wind down on its own.
        self.outbound = Some(tx);
        self.task = Some(tokio::spawn(run_connection(
            self.url.clone(),
            epoch,
            rx,
            self.events.clone(),
        )));
    }

    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::NotOpen)
    }

    fn close(&mut self, code: u16) {
        if let Some(outbound) = &self.outbound {
            let _ = outbound.send(Outbound::Close(code));
        }
    }
}

async fn run_connection(
    url: Url,
    epoch: u64,
    mut outbound: UnboundedReceiver<Outbound>,
    events: UnboundedSender<SessionEvent>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(SessionEvent::Transport { epoch, event });
    };

    let mut stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            warn!(target = "connection", url = %url, error = %err, "connect failed");
            emit(TransportEvent::Closed(CLOSE_ABNORMAL));
            return;
        }
    };
    emit(TransportEvent::Opened);

    let mut closing: Option<u16> = None;
    let code = loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Binary(data))) => emit(TransportEvent::Frame(data.to_vec())),
                Some(Ok(WsMessage::Text(text))) => {
                    emit(TransportEvent::Frame(text.as_str().as_bytes().to_vec()))
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    break frame
                        .map(|frame| u16::from(frame.code))
                        .or(closing)
                        .unwrap_or(CLOSE_NO_STATUS);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(target = "connection", error = %err, "stream error");
                    break closing.unwrap_or(CLOSE_ABNORMAL);
                }
                None => break closing.unwrap_or(CLOSE_ABNORMAL),
            },
            command = outbound.recv(), if closing.is_none() => match command {
                Some(Outbound::Frame(frame)) => {
                    if let Err(err) = stream.send(WsMessage::Binary(frame.into())).await {
                        warn!(target = "connection", error = %err, "write failed");
                        break CLOSE_ABNORMAL;
                    }
                }
                Some(Outbound::Close(code)) => {
                    closing = Some(code);
                    let frame = CloseFrame {
                        code: code.into(),
                        reason: "".into(),
                    };
                    if let Err(err) = stream.close(Some(frame)).await {
                        debug!(target = "connection", error = %err, "close handshake failed");
                        break code;
                    }
                }
                None => {
                    let _ = stream.close(None).await;
                    return;
                }
            },
        }
    };

    debug!(target = "connection", epoch, code, "closed");
    emit(TransportEvent::Closed(code));
}

/// Retry timer backed by a spawned sleep; cancelling aborts the task.
pub struct TokioRetryTimer {
    events: UnboundedSender<SessionEvent>,
    task: Option<JoinHandle<()>>,
}

impl TokioRetryTimer {
    pub fn new(events: UnboundedSender<SessionEvent>) -> Self {
        Self { events, task: None }
    }
}

impl Drop for TokioRetryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl RetryTimer for TokioRetryTimer {
    fn start(&mut self, delay: Duration, ticket: u64) {
        self.cancel();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(SessionEvent::RetryDue(ticket));
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
