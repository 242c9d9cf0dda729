//! Shared test doubles: an in-memory transport and a recording renderer.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use assistant_stream::{
    ByteStream, ChannelError, ChannelEvent, ChannelEvents, ChatRequest, FinishedMessage,
    Notification, NotificationId, NotificationLevel, PersistentChannel, Renderer, SessionId,
    Transport,
};

/// How the fake answers persistent connect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Connect succeeds immediately.
    Accept,
    /// Connect fails immediately.
    Refuse,
    /// Connect never resolves.
    Hang,
}

/// Scripted answer for one one-shot request.
pub enum StreamingScript {
    /// Request succeeds and the body yields these items in order.
    Body(Vec<Result<Bytes, ChannelError>>),
    /// Request fails before any body.
    Fail(ChannelError),
}

impl StreamingScript {
    /// Body made of complete `data:` lines, one chunk per line.
    pub fn lines(lines: &[&str]) -> Self {
        Self::Body(
            lines
                .iter()
                .map(|line| Ok(Bytes::from(format!("{line}\n"))))
                .collect(),
        )
    }
}

#[derive(Default)]
struct FakeState {
    mode: Option<ConnectMode>,
    connect_attempts: usize,
    sinks: Vec<ChannelEvents>,
    sent_frames: Vec<String>,
    fail_writes: bool,
    stall_writes: bool,
    closed_channels: usize,
    streaming_requests: Vec<ChatRequest>,
    streaming_scripts: VecDeque<StreamingScript>,
}

/// In-memory transport whose behavior the test scripts.
#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new(mode: ConnectMode) -> Self {
        let state = FakeState {
            mode: Some(mode),
            ..FakeState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn set_mode(&self, mode: ConnectMode) {
        self.state.lock().unwrap().mode = Some(mode);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Make persistent writes hang until the supervisor gives up on them.
    pub fn stall_writes(&self, stall: bool) {
        self.state.lock().unwrap().stall_writes = stall;
    }

    pub fn script_streaming(&self, script: StreamingScript) {
        self.state.lock().unwrap().streaming_scripts.push_back(script);
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().unwrap().connect_attempts
    }

    /// Event sink of the most recently opened persistent channel.
    pub fn latest_sink(&self) -> ChannelEvents {
        self.state
            .lock()
            .unwrap()
            .sinks
            .last()
            .cloned()
            .expect("no persistent channel opened yet")
    }

    /// Push a raw frame through the latest persistent channel.
    pub fn push_frame(&self, frame: &str) {
        self.latest_sink()
            .emit(ChannelEvent::Message(frame.to_string()));
    }

    pub fn push_chunk(&self, content: &str) {
        let frame = serde_json::json!({"type": "chunk", "content": content}).to_string();
        self.push_frame(&frame);
    }

    pub fn push_complete(&self) {
        self.push_frame(r#"{"type":"complete"}"#);
    }

    /// Simulate the server dropping the latest persistent channel.
    pub fn drop_connection(&self) {
        self.latest_sink().emit(ChannelEvent::Closed);
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.state.lock().unwrap().sent_frames.clone()
    }

    pub fn closed_channels(&self) -> usize {
        self.state.lock().unwrap().closed_channels
    }

    pub fn streaming_requests(&self) -> Vec<ChatRequest> {
        self.state.lock().unwrap().streaming_requests.clone()
    }
}

struct FakeChannel {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl PersistentChannel for FakeChannel {
    async fn send_text(&mut self, text: &str) -> Result<(), ChannelError> {
        let stalled = self.state.lock().unwrap().stall_writes;
        if stalled {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(ChannelError::SendFailed("broken pipe".to_string()));
        }
        state.sent_frames.push(text.to_string());
        Ok(())
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closed_channels += 1;
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open_persistent(
        &self,
        _session_id: &SessionId,
        events: ChannelEvents,
    ) -> Result<Box<dyn PersistentChannel>, ChannelError> {
        let mode = {
            let mut state = self.state.lock().unwrap();
            state.connect_attempts += 1;
            state.mode.unwrap_or(ConnectMode::Accept)
        };

        match mode {
            ConnectMode::Accept => {
                self.state.lock().unwrap().sinks.push(events);
                Ok(Box::new(FakeChannel {
                    state: Arc::clone(&self.state),
                }))
            }
            ConnectMode::Refuse => Err(ChannelError::ConnectionFailed("refused".to_string())),
            ConnectMode::Hang => std::future::pending().await,
        }
    }

    async fn open_streaming(&self, request: &ChatRequest) -> Result<ByteStream, ChannelError> {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.streaming_requests.push(request.clone());
            state.streaming_scripts.pop_front()
        };

        match script {
            Some(StreamingScript::Body(items)) => Ok(futures_util::stream::iter(items).boxed()),
            Some(StreamingScript::Fail(error)) => Err(error),
            None => Err(ChannelError::RequestFailed { status: 500 }),
        }
    }
}

/// One call observed by [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    Start,
    Append { delta: String, rendered: String },
    Finish { raw: String, formatted: String },
    Show { id: NotificationId, level: NotificationLevel, text: String },
    Dismiss(NotificationId),
    Abandon,
    User(String),
    Sending(bool),
}

/// Renderer that records every call into a shared log.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    calls: Arc<Mutex<Vec<RenderCall>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RenderCall::Finish { raw, formatted } => Some((raw, formatted)),
                _ => None,
            })
            .collect()
    }

    pub fn appended(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RenderCall::Append { rendered, .. } => Some(rendered),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<(NotificationId, NotificationLevel, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RenderCall::Show { id, level, text } => Some((id, level, text)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &RenderCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: RenderCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Renderer for RecordingRenderer {
    fn start_response(&mut self) {
        self.record(RenderCall::Start);
    }

    fn append_response(&mut self, delta: &str, rendered: &str) {
        self.record(RenderCall::Append {
            delta: delta.to_string(),
            rendered: rendered.to_string(),
        });
    }

    fn finish_response(&mut self, message: &FinishedMessage) {
        self.record(RenderCall::Finish {
            raw: message.raw().to_string(),
            formatted: message.formatted().to_string(),
        });
    }

    fn show_notification(&mut self, id: NotificationId, notification: &Notification) {
        self.record(RenderCall::Show {
            id,
            level: notification.level,
            text: notification.text.clone(),
        });
    }

    fn dismiss_notification(&mut self, id: NotificationId) {
        self.record(RenderCall::Dismiss(id));
    }

    fn abandon_response(&mut self) {
        self.record(RenderCall::Abandon);
    }

    fn user_message(&mut self, text: &str) {
        self.record(RenderCall::User(text.to_string()));
    }

    fn sending_enabled(&mut self, enabled: bool) {
        self.record(RenderCall::Sending(enabled));
    }
}

/// Let every spawned task run until the runtime is idle.
///
/// Under a paused clock the sleep only completes once nothing else is
/// runnable, and it advances time by a negligible amount.
pub async fn quiesce() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
