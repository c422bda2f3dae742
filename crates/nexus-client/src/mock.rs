use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use nexus_core::error::{NexusError, Result, TransportError};

use crate::transport::{ChatTransport, ChunkStream};

/// One scripted step of a mock response body.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Deliver these bytes as one chunk.
    Chunk(Bytes),
    /// Fail the read with this message.
    Fail(String),
    /// Never deliver anything again.
    Stall,
}

impl MockStep {
    pub fn text(text: impl Into<String>) -> Self {
        let text: String = text.into();
        MockStep::Chunk(Bytes::from(text))
    }
}

struct ReleaseProbe(Arc<AtomicBool>);

impl Drop for ReleaseProbe {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Transport replaying a fixed script, for testing without HTTP.
///
/// Every `open` replays the same steps. The mock records the messages it
/// was asked to send, how many chunks were pulled, and whether the last
/// body was released.
pub struct MockTransport {
    steps: Vec<MockStep>,
    open_error: Option<String>,
    gate: Option<Arc<Notify>>,
    messages: Mutex<Vec<String>>,
    chunks_served: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps,
            open_error: None,
            gate: None,
            messages: Mutex::new(Vec::new()),
            chunks_served: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One chunk per string.
    pub fn from_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(chunks.into_iter().map(MockStep::text).collect())
    }

    /// Every `open` fails before any body is returned.
    pub fn refusing(error: impl Into<String>) -> Self {
        let mut transport = Self::new(Vec::new());
        transport.open_error = Some(error.into());
        transport
    }

    /// Hold each body until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn call_count(&self) -> usize {
        self.messages().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn chunks_served(&self) -> usize {
        self.chunks_served.load(Ordering::SeqCst)
    }

    /// Whether the most recently opened body has been dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn open(&self, message: &str) -> Result<ChunkStream> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());

        if let Some(error) = &self.open_error {
            return Err(TransportError::Connect(error.clone()).into());
        }

        self.released.store(false, Ordering::SeqCst);
        let probe = ReleaseProbe(Arc::clone(&self.released));
        let served = Arc::clone(&self.chunks_served);
        let steps = self.steps.clone();
        let gate = self.gate.clone();

        Ok(Box::pin(async_stream::stream! {
            let _probe = probe;
            if let Some(gate) = gate {
                gate.notified().await;
            }
            for step in steps {
                match step {
                    MockStep::Chunk(bytes) => {
                        served.fetch_add(1, Ordering::SeqCst);
                        yield Ok(bytes);
                    }
                    MockStep::Fail(message) => {
                        let error: NexusError = TransportError::Read(message).into();
                        yield Err(error);
                    }
                    MockStep::Stall => {
                        futures::future::pending::<()>().await;
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn replays_script() {
        let transport = MockTransport::from_chunks(["a", "b"]);
        let body = transport.open("hi").await.unwrap();
        let chunks: Vec<Bytes> = body.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![Bytes::from("a"), Bytes::from("b")]);
        assert_eq!(transport.messages(), vec!["hi"]);
        assert_eq!(transport.chunks_served(), 2);
        assert!(transport.released());
    }

    #[tokio::test]
    async fn dropping_body_releases_it() {
        let transport = MockTransport::new(vec![MockStep::text("a"), MockStep::Stall]);
        let mut body = transport.open("hi").await.unwrap();
        assert!(body.next().await.is_some());
        assert!(!transport.released());
        drop(body);
        assert!(transport.released());
    }

    #[tokio::test]
    async fn refusing_transport() {
        let transport = MockTransport::refusing("connection refused");
        assert!(transport.open("hi").await.is_err());
        assert_eq!(transport.call_count(), 1);
    }
}
