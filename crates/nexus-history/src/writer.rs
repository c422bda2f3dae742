use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use nexus_core::turn::ChatTurn;

use crate::store::HistoryGateway;

enum Command {
    Save(Vec<ChatTurn>),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front end to a [`HistoryGateway`].
///
/// Saves are queued to one background task that performs them in order,
/// so a slow or failing backend never holds up the caller and an older
/// snapshot can never overwrite a newer one. Failures are logged and
/// dropped.
#[derive(Clone)]
pub struct HistoryWriter {
    sender: mpsc::UnboundedSender<Command>,
}

impl HistoryWriter {
    /// Spawn the background task. Must be called inside a tokio runtime.
    pub fn spawn(gateway: Arc<dyn HistoryGateway>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(background_writer(receiver, gateway));
        Self { sender }
    }

    /// Queue a save of `turns`. Never blocks.
    pub fn submit(&self, turns: Vec<ChatTurn>) {
        if self.sender.send(Command::Save(turns)).is_err() {
            warn!("History writer stopped, dropping save");
        }
    }

    /// Wait until every save queued before this call has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn background_writer(
    mut receiver: mpsc::UnboundedReceiver<Command>,
    gateway: Arc<dyn HistoryGateway>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Save(turns) => match gateway.save(&turns).await {
                Ok(()) => debug!(turn_count = turns.len(), "History saved"),
                Err(e) => warn!(error = %e, turn_count = turns.len(), "History save failed"),
            },
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHistoryGateway;

    #[tokio::test]
    async fn saves_are_applied_in_order() {
        let gateway = Arc::new(MemoryHistoryGateway::new());
        let writer = HistoryWriter::spawn(gateway.clone());

        writer.submit(vec![ChatTurn::user("first")]);
        writer.submit(vec![ChatTurn::user("first"), ChatTurn::assistant("second")]);
        writer.flush().await;

        assert_eq!(gateway.save_count(), 2);
        assert_eq!(
            gateway.stored(),
            vec![ChatTurn::user("first"), ChatTurn::assistant("second")]
        );
    }

    #[tokio::test]
    async fn failed_save_does_not_stop_writer() {
        let gateway = Arc::new(MemoryHistoryGateway::new());
        let writer = HistoryWriter::spawn(gateway.clone());

        gateway.set_fail_save(true);
        writer.submit(vec![ChatTurn::user("lost")]);
        writer.flush().await;
        assert_eq!(gateway.save_count(), 0);

        gateway.set_fail_save(false);
        writer.submit(vec![ChatTurn::user("kept")]);
        writer.flush().await;
        assert_eq!(gateway.stored(), vec![ChatTurn::user("kept")]);
    }

    #[tokio::test]
    async fn clones_share_the_queue() {
        let gateway = Arc::new(MemoryHistoryGateway::new());
        let writer = HistoryWriter::spawn(gateway.clone());
        let other = writer.clone();

        other.submit(vec![ChatTurn::user("from clone")]);
        writer.flush().await;
        assert_eq!(gateway.save_count(), 1);
    }
}
