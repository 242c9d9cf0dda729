//! One-shot streaming request channel over HTTP.
//!
//! Each outgoing message becomes a `POST /api/chat` whose response body is a
//! stream of event-prefixed lines. The channel only hands back the raw byte
//! stream; line reassembly and decoding belong to
//! [`LineDecoder`](crate::decoder::LineDecoder).

use futures_util::{StreamExt, TryStreamExt};

use crate::constants::{CHAT_PATH, HTTP_CONNECT_TIMEOUT};
use crate::protocol::ChatRequest;

use super::{ByteStream, ChannelError};

/// HTTP client for the one-shot channel.
#[derive(Debug, Clone)]
pub struct StreamingRequestChannel {
    client: reqwest::Client,
    url: String,
}

impl StreamingRequestChannel {
    /// Create a client posting to `<server_url>/api/chat`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}{}", server_url.trim_end_matches('/'), CHAT_PATH),
        })
    }

    /// Endpoint this channel posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send the request and return the body stream.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::ConnectionFailed` if the request cannot be sent
    /// and `ChannelError::RequestFailed` for a non-success status.
    pub async fn open(&self, request: &ChatRequest) -> Result<ByteStream, ChannelError> {
        log::debug!(
            "[StreamingChannel] POST {} (session={})",
            self.url,
            request.session_id
        );

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("[StreamingChannel] Request failed with status {}", status);
            return Err(ChannelError::RequestFailed {
                status: status.as_u16(),
            });
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| ChannelError::Stream(e.to_string()))
            .boxed())
    }
}
