pub mod controller;
pub mod mock;
pub mod reader;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::controller::{ChatController, RejectReason, SubmissionState, SubmitOutcome};
    pub use crate::mock::{MockStep, MockTransport};
    pub use crate::reader::ChunkReader;
    pub use crate::transport::{ChatTransport, ChunkStream, HttpChatTransport};
}
