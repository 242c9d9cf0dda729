//! Connection supervisor: owns the active channel and the response in flight.
//!
//! # Architecture
//!
//! ```text
//! SupervisorHandle ──Command──┐
//! connect task ──Connected────┤
//! reader task ──Channel───────┼──> mpsc<SupervisorEvent> ──> ConnectionSupervisor::run
//! fallback task ──Streaming───┤        (single task, one event at a time)
//! timer tasks ──Expired/Due───┘              │
//!                                            ├── Session (admission)
//!                                            ├── StreamAssembler ──> Renderer
//!                                            └── Box<dyn PersistentChannel>
//! ```
//!
//! Every background producer reports through one unbounded channel, so all
//! state lives on the supervisor task and is never shared.
//!
//! # Routing
//!
//! While the persistent channel is connected, messages are written to it and
//! the response arrives as pushed frames. Otherwise each message becomes a
//! one-shot streaming request whose task always ends the response, either
//! with the server's own terminal event or a synthesized `complete`.
//!
//! # Reconnection
//!
//! Closure of the persistent channel (or a failed connect) schedules exactly
//! one reconnect timer. When it fires, a response that was riding the dead
//! channel is abandoned, the session returns to idle, and a fresh connect is
//! issued. Retries never stop; the delay comes from
//! [`Config::reconnect_delay`].

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::assembler::{Applied, StreamAssembler};
use crate::channel::{
    ChannelError, ChannelEvent, ChannelEvents, ChannelRoute, PersistentChannel, Transport,
};
use crate::config::Config;
use crate::constants::{
    CONNECTION_ERROR_MESSAGE, CONNECTION_RESTORED_MESSAGE, PERSISTENT_CONNECT_TIMEOUT,
    PERSISTENT_WRITE_TIMEOUT, SEND_FAILED_MESSAGE,
};
use crate::decoder::{decode_frame, LineDecoder};
use crate::protocol::{ChatRequest, OutgoingFrame, ProtocolEvent};
use crate::render::{Notification, NotificationId, NotificationLevel, Renderer};
use crate::session::{Session, SessionId, SessionStatus};

/// Request from a [`SupervisorHandle`].
#[derive(Debug)]
pub(crate) enum Command {
    /// Send a user message.
    Send(String),
    /// Close the channel and stop the supervisor.
    Shutdown,
}

/// Everything the supervisor task reacts to.
pub(crate) enum SupervisorEvent {
    /// From the handle.
    Command(Command),
    /// A connect attempt succeeded.
    Connected {
        generation: u64,
        channel: Box<dyn PersistentChannel>,
    },
    /// A connect attempt failed.
    ConnectFailed {
        generation: u64,
        error: ChannelError,
    },
    /// Inbound activity on a persistent channel.
    Channel {
        generation: u64,
        event: ChannelEvent,
    },
    /// Decoded event from a one-shot streaming response.
    Streaming { response: u64, event: ProtocolEvent },
    /// The reconnect delay elapsed.
    ReconnectDue,
    /// A notification's display interval elapsed.
    NotificationExpired(NotificationId),
}

impl std::fmt::Debug for SupervisorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            Self::Connected { generation, .. } => f
                .debug_struct("Connected")
                .field("generation", generation)
                .finish_non_exhaustive(),
            Self::ConnectFailed { generation, error } => f
                .debug_struct("ConnectFailed")
                .field("generation", generation)
                .field("error", error)
                .finish(),
            Self::Channel { generation, event } => f
                .debug_struct("Channel")
                .field("generation", generation)
                .field("event", event)
                .finish(),
            Self::Streaming { response, event } => f
                .debug_struct("Streaming")
                .field("response", response)
                .field("event", event)
                .finish(),
            Self::ReconnectDue => write!(f, "ReconnectDue"),
            Self::NotificationExpired(id) => f.debug_tuple("NotificationExpired").field(id).finish(),
        }
    }
}

/// The response currently in flight and the channel carrying it.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    id: u64,
    route: ChannelRoute,
}

/// Owns connectivity, routing, and the response in flight for one session.
pub struct ConnectionSupervisor {
    config: Config,
    transport: Arc<dyn Transport>,
    renderer: Box<dyn Renderer>,
    session: Session,
    assembler: StreamAssembler,

    /// Active persistent channel. At most one; replaced wholesale on reconnect.
    channel: Option<Box<dyn PersistentChannel>>,
    connected: bool,
    /// Incremented on every connect; older channel events are discarded.
    generation: u64,
    reconnect_pending: bool,
    /// Consecutive reconnect attempts since the last successful connect.
    reconnect_attempt: u32,
    /// Set once an established connection has been lost.
    has_disconnected: bool,

    in_flight: Option<InFlight>,
    next_response: u64,
    streaming_task: Option<JoinHandle<()>>,
    next_notification: u64,

    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    status_tx: watch::Sender<SessionStatus>,
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("session", &self.session)
            .field("connected", &self.connected)
            .field("generation", &self.generation)
            .field("reconnect_pending", &self.reconnect_pending)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl ConnectionSupervisor {
    /// Create a supervisor for a freshly generated session.
    pub fn new(config: Config, transport: Arc<dyn Transport>, renderer: Box<dyn Renderer>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(SessionStatus::default());
        Self {
            config,
            transport,
            renderer,
            session: Session::new(SessionId::generate()),
            assembler: StreamAssembler::new(),
            channel: None,
            connected: false,
            generation: 0,
            reconnect_pending: false,
            reconnect_attempt: 0,
            has_disconnected: false,
            in_flight: None,
            next_response: 0,
            streaming_task: None,
            next_notification: 0,
            events_tx,
            events_rx,
            status_tx,
        }
    }

    /// Use a caller-supplied session id instead of a generated one.
    pub fn with_session_id(mut self, id: SessionId) -> Self {
        self.session = Session::new(id);
        self
    }

    /// Spawn the supervisor on the current tokio runtime.
    pub fn spawn(self) -> SupervisorHandle {
        let session_id = self.session.id().clone();
        let events_tx = self.events_tx.clone();
        let status_rx = self.status_tx.subscribe();
        let task = tokio::spawn(self.run());
        SupervisorHandle {
            session_id,
            events_tx,
            status_rx,
            task: Some(task),
        }
    }

    /// A handle for a supervisor that the caller will drive with [`run`](Self::run).
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            session_id: self.session.id().clone(),
            events_tx: self.events_tx.clone(),
            status_rx: self.status_tx.subscribe(),
            task: None,
        }
    }

    /// Run until shutdown.
    pub async fn run(mut self) {
        log::info!("[Supervisor] Starting session {}", self.session.id());
        self.publish();
        self.connect();

        while let Some(event) = self.events_rx.recv().await {
            match event {
                SupervisorEvent::Command(Command::Shutdown) => break,
                SupervisorEvent::Command(Command::Send(text)) => self.handle_send(&text).await,
                SupervisorEvent::Connected {
                    generation,
                    channel,
                } => self.on_connected(generation, channel).await,
                SupervisorEvent::ConnectFailed { generation, error } => {
                    self.on_connect_failed(generation, &error);
                }
                SupervisorEvent::Channel { generation, event } => {
                    self.on_channel_event(generation, event);
                }
                SupervisorEvent::Streaming { response, event } => {
                    self.on_streaming_event(response, event);
                }
                SupervisorEvent::ReconnectDue => self.on_reconnect_due(),
                SupervisorEvent::NotificationExpired(id) => {
                    self.renderer.dismiss_notification(id);
                }
            }
        }

        self.stop().await;
    }

    // ========================================================================
    // Connectivity
    // ========================================================================

    /// Open a new persistent channel in the background.
    fn connect(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let transport = Arc::clone(&self.transport);
        let session_id = self.session.id().clone();
        let tx = self.events_tx.clone();
        let events = ChannelEvents::new(generation, tx.clone());

        log::info!(
            "[Supervisor] Connecting persistent channel (generation {})",
            generation
        );

        tokio::spawn(async move {
            let open = transport.open_persistent(&session_id, events);
            let outcome = match tokio::time::timeout(PERSISTENT_CONNECT_TIMEOUT, open).await {
                Ok(Ok(channel)) => SupervisorEvent::Connected {
                    generation,
                    channel,
                },
                Ok(Err(error)) => SupervisorEvent::ConnectFailed { generation, error },
                Err(_) => SupervisorEvent::ConnectFailed {
                    generation,
                    error: ChannelError::ConnectionFailed(format!(
                        "no answer within {}s",
                        PERSISTENT_CONNECT_TIMEOUT.as_secs()
                    )),
                },
            };
            let _ = tx.send(outcome);
        });
    }

    async fn on_connected(&mut self, generation: u64, mut channel: Box<dyn PersistentChannel>) {
        if generation != self.generation {
            log::debug!("[Supervisor] Discarding stale channel (generation {})", generation);
            channel.close().await;
            return;
        }

        log::info!("[Supervisor] Persistent channel connected");
        self.channel = Some(channel);
        self.connected = true;
        self.reconnect_attempt = 0;
        self.renderer.sending_enabled(true);
        if self.has_disconnected {
            self.notify(NotificationLevel::Info, CONNECTION_RESTORED_MESSAGE.to_string());
        }
        self.publish();
    }

    fn on_connect_failed(&mut self, generation: u64, error: &ChannelError) {
        if generation != self.generation {
            return;
        }
        log::warn!("[Supervisor] Connect failed: {}", error);
        // A failed open is reported the way a browser socket does it: error, then close
        self.notify(NotificationLevel::Error, CONNECTION_ERROR_MESSAGE.to_string());
        self.on_closed();
    }

    fn on_channel_event(&mut self, generation: u64, event: ChannelEvent) {
        if generation != self.generation {
            log::trace!(
                "[Supervisor] Dropping {:?} from stale generation {}",
                event,
                generation
            );
            return;
        }

        match event {
            ChannelEvent::Message(text) => {
                if matches!(self.in_flight, Some(f) if f.route == ChannelRoute::Streaming) {
                    log::debug!("[Supervisor] Ignoring pushed frame while a one-shot response is streaming");
                    return;
                }
                if let Some(event) = decode_frame(&text) {
                    self.apply_event(event);
                }
            }
            ChannelEvent::Error(message) => {
                log::warn!("[Supervisor] Persistent channel error: {}", message);
                self.notify(NotificationLevel::Error, CONNECTION_ERROR_MESSAGE.to_string());
            }
            ChannelEvent::Closed => {
                log::info!("[Supervisor] Persistent channel closed");
                self.on_closed();
            }
        }
    }

    /// Connectivity lost: disable sending and schedule one reconnect.
    fn on_closed(&mut self) {
        self.channel = None;
        // Anything the dead channel still delivers is now stale
        self.generation += 1;
        if self.connected {
            self.connected = false;
            self.has_disconnected = true;
            self.renderer.sending_enabled(false);
        }
        self.schedule_reconnect();
        self.publish();
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_pending {
            return;
        }
        self.reconnect_pending = true;
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        let delay = self.config.reconnect_delay(self.reconnect_attempt);

        log::info!(
            "[Supervisor] Reconnecting in {:.1}s (attempt {})",
            delay.as_secs_f32(),
            self.reconnect_attempt
        );

        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SupervisorEvent::ReconnectDue);
        });
    }

    fn on_reconnect_due(&mut self) {
        if !self.reconnect_pending {
            return;
        }
        self.reconnect_pending = false;

        // A response riding the dead channel can no longer complete
        if let Some(flight) = self.in_flight {
            if flight.route == ChannelRoute::Persistent {
                log::warn!(
                    "[Supervisor] Response {} lost with the persistent channel",
                    flight.id
                );
                self.assembler.abandon(&mut *self.renderer);
                self.in_flight = None;
                self.session.settle();
            }
        }

        if !self.connected {
            self.connect();
        }
        self.publish();
    }

    // ========================================================================
    // Sending
    // ========================================================================

    async fn handle_send(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            log::debug!("[Supervisor] Ignoring empty message");
            return;
        }
        if !self.session.admit() {
            log::debug!("[Supervisor] Ignoring message while a response is in flight");
            return;
        }

        self.next_response += 1;
        let id = self.next_response;
        self.renderer.user_message(text);
        self.assembler.begin(&mut *self.renderer);
        self.publish();

        let sent = match self.channel.as_mut() {
            Some(channel) if self.connected => Some(write_message(channel.as_mut(), text).await),
            _ => None,
        };

        match sent {
            Some(Ok(())) => {
                log::debug!("[Supervisor] Response {} requested on persistent channel", id);
                self.in_flight = Some(InFlight {
                    id,
                    route: ChannelRoute::Persistent,
                });
                return;
            }
            Some(Err(e)) => {
                log::warn!("[Supervisor] Persistent write failed, using one-shot request: {}", e);
                self.on_closed();
            }
            None => {}
        }

        self.start_streaming(id, text);
    }

    fn start_streaming(&mut self, id: u64, text: &str) {
        log::debug!("[Supervisor] Response {} requested on one-shot channel", id);
        self.in_flight = Some(InFlight {
            id,
            route: ChannelRoute::Streaming,
        });

        let request = ChatRequest {
            message: text.to_string(),
            session_id: self.session.id().to_string(),
        };
        let transport = Arc::clone(&self.transport);
        let tx = self.events_tx.clone();

        if let Some(previous) = self.streaming_task.replace(tokio::spawn(stream_response(
            transport, request, id, tx,
        ))) {
            previous.abort();
        }
    }

    fn on_streaming_event(&mut self, response: u64, event: ProtocolEvent) {
        match self.in_flight {
            Some(flight) if flight.id == response && flight.route == ChannelRoute::Streaming => {
                self.apply_event(event);
            }
            _ => log::debug!(
                "[Supervisor] Dropping {} for finished response {}",
                event.kind(),
                response
            ),
        }
    }

    // ========================================================================
    // Events and notifications
    // ========================================================================

    fn apply_event(&mut self, event: ProtocolEvent) {
        if let ProtocolEvent::Error(text) = &event {
            let text = if text.is_empty() {
                SEND_FAILED_MESSAGE.to_string()
            } else {
                text.clone()
            };
            self.notify(NotificationLevel::Error, text);
        }

        if let Applied::Finished(message) = self.assembler.apply(event, &mut *self.renderer) {
            log::info!(
                "[Supervisor] Response finished ({} bytes)",
                message.raw().len()
            );
            self.in_flight = None;
            self.session.settle();
            self.publish();
        }
    }

    fn notify(&mut self, level: NotificationLevel, text: String) {
        self.next_notification += 1;
        let id = NotificationId(self.next_notification);
        let ttl = match level {
            NotificationLevel::Info => self.config.info_notification_ttl(),
            NotificationLevel::Error => self.config.error_notification_ttl(),
        };

        self.renderer
            .show_notification(id, &Notification { level, text, ttl });

        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = tx.send(SupervisorEvent::NotificationExpired(id));
        });
    }

    fn publish(&self) {
        self.status_tx.send_replace(SessionStatus {
            connected: self.connected,
            state: self.session.state(),
            settled: self.session.settled(),
        });
    }

    async fn stop(&mut self) {
        log::info!("[Supervisor] Shutting down session {}", self.session.id());
        if let Some(task) = self.streaming_task.take() {
            task.abort();
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        self.connected = false;
        self.publish();
    }
}

/// Write one message frame, giving up after [`PERSISTENT_WRITE_TIMEOUT`].
async fn write_message(channel: &mut dyn PersistentChannel, text: &str) -> Result<(), ChannelError> {
    let payload = serde_json::to_string(&OutgoingFrame { message: text })
        .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
    match tokio::time::timeout(PERSISTENT_WRITE_TIMEOUT, channel.send_text(&payload)).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::SendFailed(format!(
            "write stalled for {}s",
            PERSISTENT_WRITE_TIMEOUT.as_secs()
        ))),
    }
}

/// Drive one one-shot response to its end.
///
/// Always reports a terminal event: the server's own, or a synthesized
/// `error` + `complete` on failure, or `complete` if the body simply ends.
async fn stream_response(
    transport: Arc<dyn Transport>,
    request: ChatRequest,
    response: u64,
    tx: mpsc::UnboundedSender<SupervisorEvent>,
) {
    let emit = |event: ProtocolEvent| {
        tx.send(SupervisorEvent::Streaming { response, event })
            .is_ok()
    };
    let fail = || {
        emit(ProtocolEvent::Error(SEND_FAILED_MESSAGE.to_string()));
        emit(ProtocolEvent::Complete);
    };

    let mut body = match transport.open_streaming(&request).await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("[Supervisor] One-shot request failed: {}", e);
            fail();
            return;
        }
    };

    let mut decoder = LineDecoder::new();
    let mut terminated = false;

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for event in decoder.push(&bytes) {
                    terminated |= event.is_terminal();
                    if !emit(event) {
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("[Supervisor] One-shot body failed: {}", e);
                if !terminated {
                    fail();
                }
                return;
            }
        }
    }

    for event in decoder.finish() {
        terminated |= event.is_terminal();
        emit(event);
    }

    if decoder.skipped() > 0 {
        log::warn!(
            "[Supervisor] Skipped {} undecodable line(s) in response {}",
            decoder.skipped(),
            response
        );
    }

    if !terminated {
        log::debug!("[Supervisor] Body ended without a terminal event, completing");
        emit(ProtocolEvent::Complete);
    }
}

/// Handle for talking to a running [`ConnectionSupervisor`].
///
/// Dropping the handle shuts the supervisor down.
pub struct SupervisorHandle {
    session_id: SessionId,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    status_rx: watch::Receiver<SessionStatus>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("session_id", &self.session_id)
            .field("status", &*self.status_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl SupervisorHandle {
    /// Session this supervisor serves.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Submit a user message.
    ///
    /// Empty input and input while a response is in flight are ignored by the
    /// supervisor. Returns `false` only if the supervisor has stopped.
    pub fn send(&self, text: &str) -> bool {
        self.events_tx
            .send(SupervisorEvent::Command(Command::Send(text.to_string())))
            .is_ok()
    }

    /// Latest published status.
    pub fn status(&self) -> SessionStatus {
        *self.status_rx.borrow()
    }

    /// A receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// Returns `None` if the supervisor stopped first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionStatus) -> bool,
    ) -> Option<SessionStatus> {
        let mut rx = self.status_rx.clone();
        rx.wait_for(|status| predicate(status)).await.ok().map(|s| *s)
    }

    /// Stop the supervisor and wait for it to close its channel.
    pub async fn shutdown(mut self) {
        let _ = self
            .events_tx
            .send(SupervisorEvent::Command(Command::Shutdown));
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self
                .events_tx
                .send(SupervisorEvent::Command(Command::Shutdown));
        }
    }
}
