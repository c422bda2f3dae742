//! Async adapters from a chunked response body to lines and events.

use bytes::Bytes;
use futures::{Stream, StreamExt};

use nexus_core::error::Result;

use crate::decoder::{EventDecoder, StreamEvent};
use crate::splitter::LineSplitter;

/// Lazily split a byte-chunk stream into complete lines.
///
/// The trailing unterminated fragment is yielded when the input ends. A
/// read error is yielded as the last item; the fragment buffered before
/// it is dropped.
pub fn line_stream<S>(chunks: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send,
{
    async_stream::stream! {
        let mut splitter = LineSplitter::new();
        let mut chunks = Box::pin(chunks);
        let mut failed = false;

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    for line in splitter.push_bytes(&bytes) {
                        yield Ok(line);
                    }
                }
                Err(e) => {
                    failed = true;
                    yield Err(e);
                    break;
                }
            }
        }

        if !failed {
            if let Some(line) = splitter.finish() {
                yield Ok(line);
            }
        }
    }
}

/// Decode a byte-chunk stream into events, ending right after `Done`.
///
/// The input stream is dropped as soon as `Done` is seen, so bytes the
/// sender keeps writing after the sentinel are never read.
pub fn event_stream<S>(chunks: S) -> impl Stream<Item = Result<StreamEvent>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send,
{
    async_stream::stream! {
        let mut decoder = EventDecoder::new();
        let mut lines = Box::pin(line_stream(chunks));

        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    for event in decoder.decode(&line) {
                        yield Ok(event);
                    }
                    if decoder.is_done() {
                        break;
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}
