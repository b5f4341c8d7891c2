//! Owner of the single streaming socket of a chat session.
//!
//! Each `open` spawns a connection task that reports back through one event
//! channel. Events carry the [`ConnectionId`] of the socket that produced
//! them, so events from a socket that has since been replaced can be told
//! apart and discarded by the receiver.

use std::fmt;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use super::config::ChatConfig;
use super::error::ChatResult;
use super::types::ChatRequest;

/// Upper bound on the closing handshake before the socket is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Identifier of one opened socket, unique per manager.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of the live socket.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket ready for traffic.
    Connected,
}

/// Why a socket ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CloseReason {
    /// `close()` was called, or the socket was replaced.
    Local,
    /// The server closed the socket.
    Remote {
        /// Close code sent by the server, if any.
        code: Option<u16>,
        /// Close reason sent by the server.
        reason: String,
    },
    /// The handshake or the transport failed.
    Failed(String),
}

impl CloseReason {
    /// Whether the close was requested by this side.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

/// Lifecycle and traffic events of a socket.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionEvent {
    /// Handshake completed.
    Connected {
        /// Socket that connected.
        id: ConnectionId,
    },
    /// One inbound text frame.
    Frame {
        /// Socket that received the frame.
        id: ConnectionId,
        /// Raw frame text.
        text: String,
    },
    /// Terminal event; emitted exactly once per socket.
    Closed {
        /// Socket that ended.
        id: ConnectionId,
        /// Why it ended.
        reason: CloseReason,
    },
}

impl ConnectionEvent {
    /// Socket the event belongs to.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        match self {
            Self::Connected { id } | Self::Frame { id, .. } | Self::Closed { id, .. } => *id,
        }
    }
}

enum Outbound {
    Text(String),
    Close,
}

struct LiveConnection {
    id: ConnectionId,
    chat_id: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

/// Manages at most one streaming socket at a time.
pub struct ConnectionManager {
    config: ChatConfig,
    live: Option<LiveConnection>,
    next_id: u64,
    state: ConnectionState,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a manager for the backend described by `config`.
    #[must_use]
    pub fn new(config: &ChatConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config: config.clone(),
            live: None,
            next_id: 0,
            state: ConnectionState::Disconnected,
            events_tx,
            events_rx,
        }
    }

    /// Open a socket for `chat_id`, closing any socket that is still open.
    ///
    /// Returns as soon as the connection task is spawned; readiness is
    /// reported by a [`ConnectionEvent::Connected`] event. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the socket URL cannot be built from the config.
    pub fn open(&mut self, token: &str, chat_id: &str) -> ChatResult<ConnectionId> {
        let url = self.config.socket_url(token)?;
        self.close();

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let events = self.events_tx.clone();

        info!(connection = %id, chat_id, "Opening chat socket");
        let task = tokio::spawn(drive_connection(id, url.into(), outbound_rx, events));

        self.live = Some(LiveConnection {
            id,
            chat_id: chat_id.to_string(),
            outbound,
            task,
        });
        self.state = ConnectionState::Connecting;
        Ok(id)
    }

    /// Serialize and send a request on the open socket.
    ///
    /// Silently dropped (with a warning) when no socket is connected.
    pub fn send(&self, request: &ChatRequest) {
        let Some(live) = self.live.as_ref().filter(|_| self.state == ConnectionState::Connected)
        else {
            warn!(chat_id = %request.chat_id, "Dropping chat request: socket not connected");
            return;
        };

        let payload = match serde_json::to_string(request) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(?err, "Failed to serialize chat request");
                return;
            }
        };

        debug!(connection = %live.id, bytes = payload.len(), "Sending chat request");
        if live.outbound.send(Outbound::Text(payload)).is_err() {
            warn!(connection = %live.id, "Connection task already finished");
        }
    }

    /// Tear down the open socket, if any. Safe to call repeatedly.
    ///
    /// The connection task gets [`CLOSE_TIMEOUT`] to say goodbye and is
    /// aborted after that, so the socket never outlives the bound.
    pub fn close(&mut self) {
        if let Some(live) = self.live.take() {
            info!(connection = %live.id, chat_id = %live.chat_id, "Closing chat socket");
            // A failed send means the task has already ended.
            let _ = live.outbound.send(Outbound::Close);
            reap(live.id, live.task);
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Wait for the next event from any socket opened by this manager.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.events_rx.recv().await
    }

    /// Record an event and report whether it belongs to the current socket.
    ///
    /// Events from replaced sockets return `false` and leave state untouched.
    pub fn observe(&mut self, event: &ConnectionEvent) -> bool {
        if self.current_id() != Some(event.id()) {
            debug!(connection = %event.id(), "Ignoring event from stale socket");
            return false;
        }
        match event {
            ConnectionEvent::Connected { .. } => self.state = ConnectionState::Connected,
            ConnectionEvent::Frame { .. } => {}
            ConnectionEvent::Closed { .. } => {
                self.live = None;
                self.state = ConnectionState::Disconnected;
            }
        }
        true
    }

    /// Id of the current socket, if one is open.
    #[must_use]
    pub fn current_id(&self) -> Option<ConnectionId> {
        self.live.as_ref().map(|live| live.id)
    }

    /// State of the current socket.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a socket is open or opening.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.live.is_some()
    }

    /// Number of sockets opened over the manager's lifetime.
    #[must_use]
    pub const fn opened_count(&self) -> u64 {
        self.next_id
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Abort `task` unless it finishes within [`CLOSE_TIMEOUT`].
fn reap(id: ConnectionId, task: JoinHandle<()>) {
    if task.is_finished() {
        return;
    }
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        task.abort();
        return;
    };
    let abort = task.abort_handle();
    runtime.spawn(async move {
        if tokio::time::timeout(CLOSE_TIMEOUT, task).await.is_err() {
            debug!(connection = %id, "Aborting chat socket after close timeout");
            abort.abort();
        }
    });
}

/// Run one socket until it is closed from either side or fails.
async fn drive_connection(
    id: ConnectionId,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = outbound.recv() => {
            debug!(connection = %id, "Socket closed before handshake finished");
            let _ = events.send(ConnectionEvent::Closed { id, reason: CloseReason::Local });
            return;
        }
    };

    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(err) => {
            warn!(connection = %id, %err, "Chat socket handshake failed");
            let _ = events.send(ConnectionEvent::Closed {
                id,
                reason: CloseReason::Failed(err.to_string()),
            });
            return;
        }
    };

    info!(connection = %id, "Chat socket connected");
    let _ = events.send(ConnectionEvent::Connected { id });

    let (mut sink, mut inbound) = stream.split();
    let mut frames = 0_usize;

    let reason = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(payload)) => {
                    if let Err(err) = sink.send(Message::Text(payload)).await {
                        warn!(connection = %id, %err, "Failed to send on chat socket");
                        break CloseReason::Failed(err.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "normal closure".into(),
                    };
                    let closing = sink.send(Message::Close(Some(frame)));
                    if tokio::time::timeout(CLOSE_TIMEOUT, closing).await.is_err() {
                        debug!(connection = %id, "Close handshake timed out");
                    }
                    break CloseReason::Local;
                }
            },
            message = inbound.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    frames += 1;
                    debug!(connection = %id, frames, bytes = text.len(), "Received frame");
                    let _ = events.send(ConnectionEvent::Frame { id, text });
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        frames += 1;
                        let _ = events.send(ConnectionEvent::Frame { id, text });
                    }
                    Err(_) => debug!(connection = %id, "Ignoring non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break CloseReason::Remote {
                        code: frame.as_ref().map(|f| u16::from(f.code)),
                        reason: frame.map(|f| f.reason.into_owned()).unwrap_or_default(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(connection = %id, %err, "Chat socket transport error");
                    break CloseReason::Failed(err.to_string());
                }
                None => {
                    break CloseReason::Remote { code: None, reason: String::new() };
                }
            },
        }
    };

    info!(connection = %id, frames, ?reason, "Chat socket closed");
    let _ = events.send(ConnectionEvent::Closed { id, reason });
}
