pub mod http;
pub mod memory;
pub mod store;
pub mod writer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::http::HttpHistoryGateway;
    pub use crate::memory::MemoryHistoryGateway;
    pub use crate::store::HistoryGateway;
    pub use crate::writer::HistoryWriter;
}
