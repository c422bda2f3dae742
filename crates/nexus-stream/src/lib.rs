pub mod accumulator;
pub mod decoder;
pub mod splitter;
pub mod sse;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::accumulator::{Applied, TurnAccumulator};
    pub use crate::decoder::{EventDecoder, StreamEvent};
    pub use crate::splitter::LineSplitter;
    pub use crate::sse::{event_stream, line_stream};
}
