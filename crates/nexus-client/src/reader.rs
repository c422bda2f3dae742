use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::debug;

use nexus_core::error::{Result, TransportError};

use crate::transport::ChunkStream;

/// Owns the response body of one submission and reads it chunk by chunk.
///
/// Cancelling drops the body, which closes the connection. Cancelling
/// twice, or after the body ended on its own, does nothing.
pub struct ChunkReader {
    stream: Option<ChunkStream>,
    idle_timeout: Option<Duration>,
    bytes_read: usize,
}

impl ChunkReader {
    pub fn new(stream: ChunkStream, idle_timeout: Option<Duration>) -> Self {
        Self {
            stream: Some(stream),
            idle_timeout,
            bytes_read: 0,
        }
    }

    /// Next chunk, `None` at end of body (or after cancel).
    ///
    /// A read error or idle timeout releases the body before returning.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let next = match self.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    self.cancel();
                    return Err(TransportError::IdleTimeout { limit }.into());
                }
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(chunk)) => {
                debug!(bytes = chunk.len(), "Chunk received");
                self.bytes_read += chunk.len();
                Ok(Some(chunk))
            }
            Some(Err(e)) => {
                self.cancel();
                Err(e)
            }
            None => {
                self.stream = None;
                Ok(None)
            }
        }
    }

    /// Chunks as a stream. It ends after the first error; dropping it
    /// releases the body.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Bytes>> + Send {
        async_stream::stream! {
            loop {
                match self.next_chunk().await {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    /// Release the body. Returns whether anything was still open.
    pub fn cancel(&mut self) -> bool {
        let was_open = self.stream.take().is_some();
        if was_open {
            debug!(bytes_read = self.bytes_read, "Closed response stream");
        }
        was_open
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }
}
