use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use nexus_core::error::{PersistenceError, Result};
use nexus_core::turn::ChatTurn;

use crate::store::HistoryGateway;

/// In-memory history gateway for testing and offline use.
///
/// Failures can be switched on per operation to exercise the recovery
/// paths of callers. All data is lost when the gateway is dropped.
#[derive(Debug, Default)]
pub struct MemoryHistoryGateway {
    turns: Mutex<Vec<ChatTurn>>,
    fail_load: AtomicBool,
    fail_save: AtomicBool,
    fail_clear: AtomicBool,
    saves: AtomicUsize,
    clears: AtomicUsize,
}

impl MemoryHistoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `turns` already stored.
    pub fn with_turns(turns: Vec<ChatTurn>) -> Self {
        Self {
            turns: Mutex::new(turns),
            ..Self::default()
        }
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::SeqCst);
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Vec<ChatTurn> {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HistoryGateway for MemoryHistoryGateway {
    async fn load(&self) -> Result<Vec<ChatTurn>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(PersistenceError::Load("memory gateway set to fail".into()).into());
        }
        Ok(self.stored())
    }

    async fn save(&self, turns: &[ChatTurn]) -> Result<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(PersistenceError::Save("memory gateway set to fail".into()).into());
        }
        *self.turns.lock().unwrap_or_else(PoisonError::into_inner) = turns.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(PersistenceError::Clear("memory gateway set to fail".into()).into());
        }
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::error::NexusError;

    #[tokio::test]
    async fn load_empty() {
        let gateway = MemoryHistoryGateway::new();
        assert!(gateway.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let gateway = MemoryHistoryGateway::new();
        let turns = vec![ChatTurn::user("q"), ChatTurn::assistant("a")];
        gateway.save(&turns).await.unwrap();
        assert_eq!(gateway.load().await.unwrap(), turns);
        assert_eq!(gateway.save_count(), 1);
    }

    #[tokio::test]
    async fn save_overwrites() {
        let gateway = MemoryHistoryGateway::with_turns(vec![ChatTurn::user("old")]);
        gateway.save(&[ChatTurn::user("new")]).await.unwrap();
        assert_eq!(gateway.stored(), vec![ChatTurn::user("new")]);
    }

    #[tokio::test]
    async fn clear_removes_history() {
        let gateway = MemoryHistoryGateway::with_turns(vec![ChatTurn::user("q")]);
        gateway.clear().await.unwrap();
        assert!(gateway.stored().is_empty());
        assert_eq!(gateway.clear_count(), 1);
    }

    #[tokio::test]
    async fn injected_failures() {
        let gateway = MemoryHistoryGateway::with_turns(vec![ChatTurn::user("q")]);
        gateway.set_fail_load(true);
        gateway.set_fail_save(true);
        gateway.set_fail_clear(true);

        assert!(matches!(
            gateway.load().await.unwrap_err(),
            NexusError::Persistence(PersistenceError::Load(_))
        ));
        assert!(gateway.save(&[]).await.is_err());
        assert!(gateway.clear().await.is_err());
        assert_eq!(gateway.stored(), vec![ChatTurn::user("q")]);
        assert_eq!(gateway.save_count(), 0);
    }
}
