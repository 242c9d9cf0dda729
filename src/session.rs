//! Session identity and the admission-control state machine.
//!
//! A session is either `Idle` or `AwaitingResponse`. Sending is only admitted
//! from `Idle`; any send while a response is in flight is silently ignored.
//! That single rule keeps events of different responses from interleaving.

/// Opaque session identifier, stable for the lifetime of one client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh id of the form `session_<unix-millis>_<9 base36 chars>`.
    pub fn generate() -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let suffix: String = (0..9)
            .map(|_| {
                let idx = rand::random::<u32>() as usize % ALPHABET.len();
                char::from(ALPHABET[idx])
            })
            .collect();
        Self(format!(
            "session_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            suffix
        ))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether a response is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Ready to send.
    #[default]
    Idle,
    /// A message was sent and its response has not ended.
    AwaitingResponse,
}

/// Snapshot published to observers of a running supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatus {
    /// Whether the persistent channel is connected.
    pub connected: bool,
    /// Current admission state.
    pub state: SessionState,
    /// Responses that have ended so far, finished or abandoned.
    pub settled: u64,
}

impl SessionStatus {
    /// Shorthand for `state == Idle`.
    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }
}

/// A client session: identity plus admission state.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    settled: u64,
}

impl Session {
    /// Create an idle session.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            settled: 0,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current admission state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Try to start a response. Returns `false` while one is in flight.
    pub fn admit(&mut self) -> bool {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::AwaitingResponse;
                true
            }
            SessionState::AwaitingResponse => false,
        }
    }

    /// Number of responses that have ended.
    pub fn settled(&self) -> u64 {
        self.settled
    }

    /// The response in flight reached a terminal state.
    pub fn settle(&mut self) {
        if self.state == SessionState::AwaitingResponse {
            self.settled += 1;
        }
        self.state = SessionState::Idle;
    }
}
