use std::collections::VecDeque;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_NO_STATUS: u16 = 1005;
pub const CLOSE_ABNORMAL: u16 = 1006;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection is not open")]
    NotOpen,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// One duplex connection at a time. Completion is reported back as session events
/// tagged with the epoch passed to `open`.
pub trait Transport {
    fn open(&mut self, epoch: u64);
    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;
    fn close(&mut self, code: u16);
}

/// Cancellable one-shot timer that reports `ticket` when it fires.
pub trait RetryTimer {
    fn start(&mut self, delay: Duration, ticket: u64);
    fn cancel(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A planned reopen is waiting for the old connection to close.
    Closing,
}

/// What to do with frames sent while disconnected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPolicy {
    /// Keep every frame and flush them in order on connect.
    #[default]
    Fifo,
    /// Keep only the most recent frame.
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opened {
    First,
    Resumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    Normal,
    Retrying(Duration),
    GaveUp,
    Unrecoverable(u16),
}

pub struct ConnectionManager<T, R> {
    transport: T,
    timer: R,
    state: ConnectionState,
    backoff: Backoff,
    epoch: u64,
    retry_ticket: u64,
    pending: VecDeque<Vec<u8>>,
    policy: PendingPolicy,
    wants_refresh: bool,
    opened_before: bool,
    gave_up: bool,
}

impl<T: Transport, R: RetryTimer> ConnectionManager<T, R> {
    pub fn new(transport: T, timer: R, backoff: Backoff, policy: PendingPolicy) -> Self {
        Self {
            transport,
            timer,
            state: ConnectionState::Disconnected,
            backoff,
            epoch: 0,
            retry_ticket: 0,
            pending: VecDeque::new(),
            policy,
            wants_refresh: false,
            opened_before: false,
            gave_up: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Epoch of the current (or last) connection attempt.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the retry schedule ran out.
    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn timer(&self) -> &R {
        &self.timer
    }

    /// Open a connection unless one is already open or opening.
    pub fn refresh(&mut self) {
        if self.state != ConnectionState::Disconnected {
            return;
        }
        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        debug!(target = "connection", epoch = self.epoch, "connecting");
        self.transport.open(self.epoch);
    }

    pub fn send(&mut self, frame: Vec<u8>) {
        if self.state != ConnectionState::Connected {
            self.enqueue(frame);
            self.refresh();
            return;
        }
        if let Err(err) = self.transport.send(frame.clone()) {
            warn!(target = "connection", error = %err, "send failed");
            self.pending.push_front(frame);
            self.fail_transport();
        }
    }

    fn enqueue(&mut self, frame: Vec<u8>) {
        if self.policy == PendingPolicy::Latest {
            self.pending.clear();
        }
        self.pending.push_back(frame);
    }

    /// Planned reconnect: cancel any scheduled retry, then cycle the connection.
    pub fn reopen(&mut self) {
        self.timer.cancel();
        self.retry_ticket += 1;
        match self.state {
            ConnectionState::Disconnected => self.refresh(),
            ConnectionState::Closing => self.wants_refresh = true,
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.state = ConnectionState::Closing;
                self.wants_refresh = true;
                self.transport.close(CLOSE_NORMAL);
            }
        }
    }

    pub fn handle_open(&mut self, epoch: u64) -> Option<Opened> {
        if epoch != self.epoch || self.state != ConnectionState::Connecting {
            debug!(target = "connection", epoch, "ignoring stale open");
            return None;
        }
        self.state = ConnectionState::Connected;
        self.backoff.reset();
        self.gave_up = false;

        let opened = if self.opened_before {
            Opened::Resumed
        } else {
            Opened::First
        };
        self.opened_before = true;
        info!(target = "connection", epoch, ?opened, "connected");

        while let Some(frame) = self.pending.pop_front() {
            if let Err(err) = self.transport.send(frame.clone()) {
                warn!(target = "connection", error = %err, "flushing pending sends failed");
                self.pending.push_front(frame);
                self.fail_transport();
                break;
            }
        }
        Some(opened)
    }

    pub fn handle_close(&mut self, epoch: u64, code: u16) -> Option<Closed> {
        if epoch != self.epoch {
            debug!(target = "connection", epoch, code, "ignoring stale close");
            return None;
        }
        self.state = ConnectionState::Disconnected;
        let wants_refresh = std::mem::take(&mut self.wants_refresh);

        let closed = match code {
            CLOSE_NORMAL => {
                debug!(target = "connection", "connection suspended");
                if wants_refresh {
                    self.refresh();
                }
                Closed::Normal
            }
            CLOSE_ABNORMAL => {
                warn!(target = "connection", "server down");
                self.schedule_retry()
            }
            other => {
                error!(target = "connection", code = other, "unrecoverable close");
                Closed::Unrecoverable(other)
            }
        };
        Some(closed)
    }

    pub fn handle_retry_due(&mut self, ticket: u64) {
        if ticket != self.retry_ticket {
            debug!(target = "connection", ticket, "ignoring cancelled retry");
            return;
        }
        self.refresh();
    }

    /// A send failed on an open connection: abandon it and take the abnormal-close path.
    fn fail_transport(&mut self) {
        self.transport.close(CLOSE_ABNORMAL);
        self.epoch += 1;
        self.state = ConnectionState::Disconnected;
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) -> Closed {
        match self.backoff.next_delay() {
            Some(delay) => {
                self.retry_ticket += 1;
                info!(
                    target = "connection",
                    delay_secs = delay.as_secs(),
                    attempt = self.backoff.failures(),
                    "retrying"
                );
                self.timer.start(delay, self.retry_ticket);
                Closed::Retrying(delay)
            }
            None => {
                error!(target = "connection", "no more retries, permanently offline");
                self.gave_up = true;
                Closed::GaveUp
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ManualTimer, RecordingTransport};
    use super::*;
    use crate::net::backoff::DEFAULT_SCHEDULE_SECS;

    type Manager = ConnectionManager<RecordingTransport, ManualTimer>;

    fn manager(policy: PendingPolicy) -> Manager {
        ConnectionManager::new(
            RecordingTransport::default(),
            ManualTimer::default(),
            Backoff::default(),
            policy,
        )
    }

    #[test]
    fn queued_sends_flush_in_order_on_open() {
        let mut connection = manager(PendingPolicy::Fifo);
        connection.send(b"one".to_vec());
        connection.send(b"two".to_vec());
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert_eq!(connection.transport().opened, vec![1]);

        assert_eq!(connection.handle_open(1), Some(Opened::First));
        assert_eq!(connection.transport().sent, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(connection.pending_len(), 0);

        connection.send(b"three".to_vec());
        assert_eq!(connection.transport().sent.len(), 3);
    }

    #[test]
    fn latest_policy_keeps_one_frame() {
        let mut connection = manager(PendingPolicy::Latest);
        connection.send(b"one".to_vec());
        connection.send(b"two".to_vec());
        connection.handle_open(1);
        assert_eq!(connection.transport().sent, vec![b"two".to_vec()]);
    }

    #[test]
    fn abnormal_closures_follow_backoff_then_give_up() {
        let mut connection = manager(PendingPolicy::Fifo);
        connection.refresh();
        connection.handle_open(1);

        for (attempt, expected) in DEFAULT_SCHEDULE_SECS.iter().enumerate() {
            let epoch = connection.epoch();
            assert_eq!(
                connection.handle_close(epoch, CLOSE_ABNORMAL),
                Some(Closed::Retrying(Duration::from_secs(*expected))),
                "closure {}",
                attempt + 1
            );
            let (_, ticket) = *connection.timer().started.last().unwrap();
            connection.handle_retry_due(ticket);
            assert_eq!(connection.state(), ConnectionState::Connecting);
        }

        let epoch = connection.epoch();
        assert_eq!(
            connection.handle_close(epoch, CLOSE_ABNORMAL),
            Some(Closed::GaveUp)
        );
        assert!(connection.gave_up());
        assert_eq!(connection.timer().started.len(), DEFAULT_SCHEDULE_SECS.len());
    }

    #[test]
    fn successful_open_resets_backoff() {
        let mut connection = manager(PendingPolicy::Fifo);
        connection.refresh();
        connection.handle_close(1, CLOSE_ABNORMAL);
        connection.handle_retry_due(1);
        connection.handle_close(2, CLOSE_ABNORMAL);
        connection.handle_retry_due(2);
        assert_eq!(connection.handle_open(3), Some(Opened::First));
        assert_eq!(
            connection.handle_close(3, CLOSE_ABNORMAL),
            Some(Closed::Retrying(Duration::from_secs(5)))
        );
    }

    #[test]
    fn reopen_cycles_connection_and_cancels_retry() {
        let mut connection = manager(PendingPolicy::Fifo);
        connection.refresh();
        connection.handle_open(1);

        connection.reopen();
        assert_eq!(connection.transport().closed, vec![CLOSE_NORMAL]);
        assert_eq!(connection.handle_close(1, CLOSE_NORMAL), Some(Closed::Normal));
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert_eq!(connection.handle_open(2), Some(Opened::Resumed));

        connection.handle_close(2, CLOSE_ABNORMAL);
        let (_, ticket) = connection.timer().started[0];
        connection.reopen();
        assert_eq!(connection.timer().cancelled, 2);
        assert_eq!(connection.state(), ConnectionState::Connecting);
        let epoch = connection.epoch();

        connection.handle_retry_due(ticket);
        assert_eq!(connection.epoch(), epoch);
    }

    #[test]
    fn sends_during_planned_reopen_wait_for_next_connection() {
        let mut connection = manager(PendingPolicy::Fifo);
        connection.refresh();
        connection.handle_open(1);

        connection.reopen();
        assert_eq!(connection.state(), ConnectionState::Closing);
        assert!(!connection.is_connected());
        connection.send(b"after-recon".to_vec());
        assert!(connection.transport().sent.is_empty());
        assert_eq!(connection.pending_len(), 1);
        assert_eq!(connection.transport().opened, vec![1]);

        connection.reopen();
        assert_eq!(connection.transport().closed, vec![CLOSE_NORMAL]);

        connection.handle_close(1, CLOSE_NORMAL);
        assert_eq!(connection.transport().opened, vec![1, 2]);
        assert_eq!(connection.handle_open(2), Some(Opened::Resumed));
        assert_eq!(connection.transport().sent, vec![b"after-recon".to_vec()]);
        assert_eq!(connection.pending_len(), 0);
    }

    #[test]
    fn abnormal_close_during_reopen_retries_once() {
        let mut connection = manager(PendingPolicy::Fifo);
        connection.refresh();
        connection.handle_open(1);
        connection.reopen();

        assert_eq!(
            connection.handle_close(1, CLOSE_ABNORMAL),
            Some(Closed::Retrying(Duration::from_secs(5)))
        );
        connection.handle_retry_due(2);
        connection.handle_open(2);
        assert_eq!(connection.handle_close(2, CLOSE_NORMAL), Some(Closed::Normal));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connection.transport().opened, vec![1, 2]);
    }

    #[test]
    fn normal_close_without_reopen_stays_down() {
        let mut connection = manager(PendingPolicy::Fifo);
        connection.refresh();
        connection.handle_open(1);
        assert_eq!(connection.handle_close(1, CLOSE_NORMAL), Some(Closed::Normal));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connection.transport().opened, vec![1]);
    }

    #[test]
    fn other_codes_are_unrecoverable() {
        let mut connection = manager(PendingPolicy::Fifo);
        connection.refresh();
        connection.handle_open(1);
        assert_eq!(
            connection.handle_close(1, 1011),
            Some(Closed::Unrecoverable(1011))
        );
        assert!(connection.timer().started.is_empty());
    }

    #[test]
    fn stale_events_are_ignored() {
        let mut connection = manager(PendingPolicy::Fifo);
        connection.refresh();
        assert_eq!(connection.handle_open(7), None);
        assert_eq!(connection.handle_close(7, CLOSE_ABNORMAL), None);
        assert_eq!(connection.state(), ConnectionState::Connecting);
    }

    #[test]
    fn send_failure_takes_abnormal_path() {
        let mut connection = manager(PendingPolicy::Fifo);
        connection.refresh();
        connection.handle_open(1);
        connection.transport_mut().fail_sends = true;

        connection.send(b"lost?".to_vec());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connection.pending_len(), 1);
        assert_eq!(connection.transport().closed, vec![CLOSE_ABNORMAL]);
        assert_eq!(connection.timer().started, vec![(Duration::from_secs(5), 1)]);
        assert_eq!(connection.handle_close(1, CLOSE_ABNORMAL), None);

        connection.transport_mut().fail_sends = false;
        connection.handle_retry_due(1);
        connection.handle_open(3);
        assert_eq!(connection.transport().sent, vec![b"lost?".to_vec()]);
    }
}
