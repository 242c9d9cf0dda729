//! Outgoing message sources.
//!
//! A source yields the user's messages one at a time. [`pump`] feeds them to
//! a running supervisor and waits for each response to end before reading the
//! next one, which mirrors a send control that stays disabled while the
//! assistant is answering.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::supervisor::SupervisorHandle;

/// Yields outgoing user messages.
#[async_trait]
pub trait OutgoingMessageSource: Send {
    /// Next message, or `None` when the source is exhausted.
    async fn next_message(&mut self) -> Option<String>;
}

/// Reads one message per line from standard input.
#[derive(Debug)]
pub struct StdinSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinSource {
    /// Create a source over the process's standard input.
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutgoingMessageSource for StdinSource {
    async fn next_message(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                log::warn!("[StdinSource] Read failed: {}", e);
                None
            }
        }
    }
}

/// Fixed list of messages, handed out in order.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    messages: std::collections::VecDeque<String>,
}

impl ScriptedSource {
    /// Create a source that yields `messages` and then ends.
    pub fn new<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            messages: messages.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl OutgoingMessageSource for ScriptedSource {
    async fn next_message(&mut self) -> Option<String> {
        self.messages.pop_front()
    }
}

/// Feed every message from `source` to the supervisor.
///
/// Blank messages are skipped. After each send, waits until that response
/// has ended. Returns the number of messages sent, stopping early if the
/// supervisor goes away.
pub async fn pump(source: &mut dyn OutgoingMessageSource, handle: &SupervisorHandle) -> usize {
    let mut sent = 0;

    while let Some(message) = source.next_message().await {
        let message = message.trim();
        if message.is_empty() {
            continue;
        }

        if handle.wait_for(|s| s.is_idle()).await.is_none() {
            break;
        }
        let settled = handle.status().settled;
        if !handle.send(message) {
            break;
        }
        sent += 1;

        if handle.wait_for(|s| s.settled > settled).await.is_none() {
            break;
        }
    }

    log::debug!("[Source] Exhausted after {} message(s)", sent);
    sent
}
