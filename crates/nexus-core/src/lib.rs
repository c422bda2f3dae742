pub mod config;
pub mod error;
pub mod session;
pub mod turn;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::ClientConfig;
    pub use crate::error::{
        DecodeError, InvariantViolation, NexusError, PersistenceError, Result, TransportError,
    };
    pub use crate::session::ChatSession;
    pub use crate::turn::{ChatTurn, Role, Source};
}
