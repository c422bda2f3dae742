use std::sync::Arc;

use tracing::{debug, warn};

use nexus_core::error::{InvariantViolation, Result};
use nexus_core::turn::{ChatTurn, Source};

use crate::decoder::StreamEvent;

/// Outcome of folding one event into the turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The turn changed; this is its new snapshot.
    Changed(Arc<ChatTurn>),
    /// Diagnostic only, nothing to publish.
    Unchanged,
    /// The answer is complete; this is the final snapshot.
    Finished(Arc<ChatTurn>),
}

/// Builds the in-flight assistant turn of one submission.
///
/// Every mutation goes through [`Arc::make_mut`]: while a previously
/// returned snapshot is still alive somewhere, the turn is cloned before
/// being changed, so holders of a snapshot never see it move.
#[derive(Debug)]
pub struct TurnAccumulator {
    turn: Arc<ChatTurn>,
    finished: bool,
    tokens: usize,
    unparseable: usize,
}

impl Default for TurnAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnAccumulator {
    /// Start from an empty assistant placeholder.
    pub fn new() -> Self {
        Self {
            turn: Arc::new(ChatTurn::placeholder()),
            finished: false,
            tokens: 0,
            unparseable: 0,
        }
    }

    pub fn snapshot(&self) -> Arc<ChatTurn> {
        Arc::clone(&self.turn)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn token_count(&self) -> usize {
        self.tokens
    }

    pub fn unparseable_count(&self) -> usize {
        self.unparseable
    }

    pub fn on_token(&mut self, text: &str) -> Result<Arc<ChatTurn>> {
        self.ensure_open("on_token")?;
        Arc::make_mut(&mut self.turn).text.push_str(text);
        self.tokens += 1;
        Ok(self.snapshot())
    }

    /// Later updates replace earlier ones wholesale.
    pub fn on_sources_update(&mut self, sources: Vec<Source>) -> Result<Arc<ChatTurn>> {
        self.ensure_open("on_sources_update")?;
        Arc::make_mut(&mut self.turn).sources = sources;
        Ok(self.snapshot())
    }

    pub fn on_unparseable(&mut self, raw_line: &str, reason: &str) {
        self.unparseable += 1;
        warn!(line = %raw_line, reason = %reason, "Skipping unparseable stream line");
    }

    /// Mark the turn complete. Calling it again is harmless.
    pub fn finish(&mut self) -> Arc<ChatTurn> {
        self.finished = true;
        self.snapshot()
    }

    /// Discard whatever was received and finish with `message` as the text.
    pub fn fail(&mut self, message: &str) -> Result<Arc<ChatTurn>> {
        self.ensure_open("fail")?;
        let turn = Arc::make_mut(&mut self.turn);
        turn.text.clear();
        turn.text.push_str(message);
        Ok(self.finish())
    }

    pub fn apply(&mut self, event: StreamEvent) -> Result<Applied> {
        debug!(kind = event.kind(), "Applying stream event");
        match event {
            StreamEvent::Token(text) => self.on_token(&text).map(Applied::Changed),
            StreamEvent::SourcesUpdate(sources) => {
                self.on_sources_update(sources).map(Applied::Changed)
            }
            StreamEvent::Unparseable { raw_line, reason } => {
                self.on_unparseable(&raw_line, &reason);
                Ok(Applied::Unchanged)
            }
            StreamEvent::Done => Ok(Applied::Finished(self.finish())),
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.finished {
            return Err(InvariantViolation::new(operation, "turn is already finished").into());
        }
        Ok(())
    }
}
