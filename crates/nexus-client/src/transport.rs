//! Chat request transport.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;

use nexus_core::config::ClientConfig;
use nexus_core::error::{NexusError, Result, TransportError};

/// Raw response body, chunked however the network delivered it.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Sends one user message and hands back the streamed answer body.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, message: &str) -> Result<ChunkStream>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// `POST {base_url}/api/chat` with `{"message": ...}`, answered with an
/// event-stream body.
pub struct HttpChatTransport {
    client: Client,
    url: String,
}

impl HttpChatTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Connect(format!("HTTP client setup failed: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            url: config.chat_url(),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn open(&self, message: &str) -> Result<ChunkStream> {
        let response = self
            .client
            .post(&self.url)
            .json(&ChatRequest { message })
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let chunks = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| NexusError::from(TransportError::Read(e.to_string())))
        });
        Ok(Box::pin(chunks))
    }
}
