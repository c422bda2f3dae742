//! Submission state machine tying transport, stream decoding, session
//! state and history persistence together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use nexus_core::config::ClientConfig;
use nexus_core::error::{NexusError, Result};
use nexus_core::session::ChatSession;
use nexus_core::turn::ChatTurn;
use nexus_history::store::HistoryGateway;
use nexus_history::writer::HistoryWriter;
use nexus_stream::accumulator::{Applied, TurnAccumulator};
use nexus_stream::sse::event_stream;

use crate::reader::ChunkReader;
use crate::transport::ChatTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Another submission (or a history operation) is in progress.
    Busy,
    /// The message is blank.
    EmptyMessage,
}

/// How a call to [`ChatController::submit`] ended.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The answer streamed to completion (sentinel or end of body).
    Completed(Arc<ChatTurn>),
    /// The transport failed; the turn now carries the configured error text.
    Failed {
        turn: Arc<ChatTurn>,
        error: NexusError,
    },
    /// Nothing happened.
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Sentinel,
    EndOfBody,
}

/// Clears the busy flag when the operation holding it ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives one chat session.
///
/// The current [`ChatSession`] is published on a watch channel: every
/// change replaces the whole value, so a subscriber always reads a
/// complete snapshot. Only one operation that mutates the session runs at
/// a time; overlapping calls are rejected rather than queued.
pub struct ChatController {
    config: ClientConfig,
    transport: Arc<dyn ChatTransport>,
    gateway: Arc<dyn HistoryGateway>,
    writer: HistoryWriter,
    session: watch::Sender<ChatSession>,
    busy: AtomicBool,
}

impl ChatController {
    /// Must be called inside a tokio runtime (the history writer is spawned here).
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn ChatTransport>,
        gateway: Arc<dyn HistoryGateway>,
    ) -> Self {
        let (session, _) = watch::channel(ChatSession::new());
        let writer = HistoryWriter::spawn(Arc::clone(&gateway));
        Self {
            config,
            transport,
            gateway,
            writer,
            session,
            busy: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current session snapshot.
    pub fn session(&self) -> ChatSession {
        self.session.borrow().clone()
    }

    /// Receive every future session snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ChatSession> {
        self.session.subscribe()
    }

    pub fn state(&self) -> SubmissionState {
        if self.busy.load(Ordering::SeqCst) {
            SubmissionState::Submitting
        } else {
            SubmissionState::Idle
        }
    }

    /// Replace the session with stored history, or the greeting if there is none.
    ///
    /// Returns whether stored turns were restored. Load failures are logged
    /// and fall back to the greeting.
    pub async fn load_history(&self) -> bool {
        let Some(_guard) = self.try_begin() else {
            warn!("History load ignored while a submission is in flight");
            return false;
        };

        let mut next = ChatSession::new();
        let restored = match self.gateway.load().await {
            Ok(turns) if !turns.is_empty() => {
                info!(
                    session_id = %self.config.session_id,
                    turn_count = turns.len(),
                    "History loaded"
                );
                next.load_from(turns);
                true
            }
            Ok(_) => {
                debug!(session_id = %self.config.session_id, "No stored history");
                next.reset(self.config.greeting.as_str());
                false
            }
            Err(e) => {
                warn!(error = %e, "History load failed, starting with greeting");
                next.reset(self.config.greeting.as_str());
                false
            }
        };
        self.session.send_replace(next);
        restored
    }

    /// Clear stored history and reset the session to the greeting.
    ///
    /// The session is left alone if the clear fails. Returns whether the
    /// reset happened.
    pub async fn new_chat(&self) -> bool {
        let Some(_guard) = self.try_begin() else {
            warn!("New chat ignored while a submission is in flight");
            return false;
        };

        // Pending saves must not land after the clear.
        self.writer.flush().await;
        match self.gateway.clear().await {
            Ok(()) => {
                self.session
                    .send_replace(ChatSession::with_greeting(self.config.greeting.as_str()));
                info!(session_id = %self.config.session_id, "Started new chat");
                true
            }
            Err(e) => {
                warn!(error = %e, "History clear failed, keeping current chat");
                false
            }
        }
    }

    /// Send `message` and stream the answer into the session.
    ///
    /// A no-op while another submission is in flight or when `message` is
    /// blank. Transport failures are not returned as `Err`: they end the
    /// turn with the configured error text and come back as
    /// [`SubmitOutcome::Failed`]. `Err` means an internal invariant broke.
    pub async fn submit(&self, message: &str) -> Result<SubmitOutcome> {
        if message.trim().is_empty() {
            return Ok(SubmitOutcome::Rejected(RejectReason::EmptyMessage));
        }
        let Some(_guard) = self.try_begin() else {
            warn!("Submission rejected, another answer is still streaming");
            return Ok(SubmitOutcome::Rejected(RejectReason::Busy));
        };

        info!(session_id = %self.config.session_id, chars = message.chars().count(), "Submitting message");
        let mut next = self.session();
        next.append(ChatTurn::user(message));
        next.append(ChatTurn::placeholder());
        self.session.send_replace(next);

        // Line buffer and decoder live inside the event stream opened for
        // this submission; nothing is carried over from the previous one.
        let mut accumulator = TurnAccumulator::new();
        let outcome = match self.stream_answer(message, &mut accumulator).await {
            Ok(end) => {
                let turn = accumulator.finish();
                if end == StreamEnd::EndOfBody {
                    self.publish_turn(Arc::clone(&turn))?;
                }
                info!(
                    ?end,
                    tokens = accumulator.token_count(),
                    unparseable = accumulator.unparseable_count(),
                    "Answer complete"
                );
                SubmitOutcome::Completed(turn)
            }
            Err(e) if e.is_transport() => {
                warn!(error = %e, "Answer stream failed");
                let turn = accumulator.fail(&self.config.error_message)?;
                self.publish_turn(Arc::clone(&turn))?;
                SubmitOutcome::Failed { turn, error: e }
            }
            Err(e) => {
                error!(error = %e, "Answer stream aborted");
                return Err(e);
            }
        };

        self.save_history();
        Ok(outcome)
    }

    /// Queue a save of the current session unless it has no user turn yet.
    pub fn save_history(&self) {
        let snapshot = self.session();
        if snapshot.has_conversation() {
            self.writer.submit(snapshot.to_turns());
        } else {
            debug!("Skipping history save, no conversation yet");
        }
    }

    /// Wait for queued history saves to be attempted.
    pub async fn flush_history(&self) {
        self.writer.flush().await;
    }

    fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    async fn stream_answer(
        &self,
        message: &str,
        accumulator: &mut TurnAccumulator,
    ) -> Result<StreamEnd> {
        let body = self.transport.open(message).await?;
        let reader = ChunkReader::new(body, self.config.idle_timeout);
        let mut events = Box::pin(event_stream(reader.into_stream()));

        while let Some(event) = events.next().await {
            match accumulator.apply(event?)? {
                Applied::Changed(turn) => self.publish_turn(turn)?,
                Applied::Unchanged => {}
                Applied::Finished(turn) => {
                    // Releases the response body without reading further.
                    drop(events);
                    self.publish_turn(turn)?;
                    return Ok(StreamEnd::Sentinel);
                }
            }
        }
        Ok(StreamEnd::EndOfBody)
    }

    fn publish_turn(&self, turn: Arc<ChatTurn>) -> Result<()> {
        let mut next = self.session();
        next.replace_last(turn)?;
        self.session.send_replace(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockStep, MockTransport};
    use nexus_history::memory::MemoryHistoryGateway;

    fn controller(transport: MockTransport) -> (ChatController, Arc<MemoryHistoryGateway>) {
        let gateway = Arc::new(MemoryHistoryGateway::new());
        let controller = ChatController::new(
            ClientConfig::default().with_greeting("hello!"),
            Arc::new(transport),
            gateway.clone(),
        );
        (controller, gateway)
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let (controller, _) = controller(MockTransport::from_chunks(["data: [DONE]\n"]));
        controller.load_history().await;
        let outcome = controller.submit("   ").await.unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected(RejectReason::EmptyMessage)
        ));
        assert_eq!(controller.session().len(), 1);
    }

    #[tokio::test]
    async fn state_returns_to_idle() {
        let (controller, _) = controller(MockTransport::from_chunks([
            "data: {\"token\":\"ok\"}\n\ndata: [DONE]\n\n",
        ]));
        assert_eq!(controller.state(), SubmissionState::Idle);
        controller.submit("q").await.unwrap();
        assert_eq!(controller.state(), SubmissionState::Idle);
    }

    #[tokio::test]
    async fn end_of_body_without_sentinel_keeps_answer() {
        let (controller, _) = controller(MockTransport::from_chunks([
            "data: {\"token\":\"partial\"}\n\ndata: {\"tok",
            "en\":\" answer\"}",
        ]));
        controller.load_history().await;
        match controller.submit("q").await.unwrap() {
            SubmitOutcome::Completed(turn) => assert_eq!(turn.text, "partial answer"),
            other => panic!("Expected Completed, got {other:?}"),
        }
        assert_eq!(controller.session().last().unwrap().text, "partial answer");
    }

    #[tokio::test]
    async fn refused_connection_shows_error_text() {
        let (controller, _) = controller(MockTransport::refusing("connection refused"));
        controller.load_history().await;
        let outcome = controller.submit("q").await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Failed { .. }));
        let session = controller.session();
        assert_eq!(session.len(), 3);
        assert_eq!(
            session.last().unwrap().text,
            controller.config().error_message
        );
    }

    #[tokio::test]
    async fn sentinel_releases_body_without_reading_on() {
        let transport = Arc::new(MockTransport::new(vec![
            MockStep::text("data: {\"token\":\"a\"}\n\ndata: [DONE]\n\ndata: {\"token\":\"b\"}\n\n"),
            MockStep::text("data: {\"token\":\"c\"}\n\n"),
            MockStep::Stall,
        ]));
        let gateway = Arc::new(MemoryHistoryGateway::new());
        let controller = ChatController::new(
            ClientConfig::default().with_idle_timeout(None),
            transport.clone(),
            gateway,
        );

        let outcome = controller.submit("q").await.unwrap();
        match outcome {
            SubmitOutcome::Completed(turn) => assert_eq!(turn.text, "a"),
            other => panic!("Expected Completed, got {other:?}"),
        }
        assert_eq!(transport.chunks_served(), 1);
        assert!(transport.released());
    }

    #[tokio::test]
    async fn token_survives_bad_source_entry() {
        let (controller, _) = controller(MockTransport::from_chunks([
            "data: {\"token\":\"x\",\"sources\":[42]}\n\ndata: [DONE]\n\n",
        ]));
        match controller.submit("q").await.unwrap() {
            SubmitOutcome::Completed(turn) => {
                assert_eq!(turn.text, "x");
                assert!(turn.sources.is_empty());
            }
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_line_does_not_stop_answer() {
        let (controller, _) = controller(MockTransport::from_chunks([
            "data: {\"token\":\"one\"}\n\n",
            "data: {broken\n\n",
            "data: {\"token\":\" two\"}\n\ndata: [DONE]\n\n",
        ]));
        match controller.submit("q").await.unwrap() {
            SubmitOutcome::Completed(turn) => assert_eq!(turn.text, "one two"),
            other => panic!("Expected Completed, got {other:?}"),
        }
    }
}
