use async_trait::async_trait;

use nexus_core::error::Result;
use nexus_core::turn::ChatTurn;

/// Remote store holding the turns of one conversation.
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait HistoryGateway: Send + Sync {
    /// Fetch the stored turns. No stored history is an empty list, not an error.
    async fn load(&self) -> Result<Vec<ChatTurn>>;

    /// Overwrite the stored turns with `turns`.
    async fn save(&self, turns: &[ChatTurn]) -> Result<()>;

    /// Remove the stored history.
    async fn clear(&self) -> Result<()>;
}
