//! Running buffers that fold decoded deltas into the streaming assistant turn.

use super::protocol::ParsedDelta;
use super::types::{AssistantTurn, TurnStatus};

/// Accumulated think and response text for the turn being streamed.
#[derive(Clone, Debug, Default)]
pub struct StreamAccumulator {
    think: String,
    response: String,
    frames: usize,
}

impl StreamAccumulator {
    /// Create empty buffers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            think: String::new(),
            response: String::new(),
            frames: 0,
        }
    }

    /// Append a delta to the running buffers.
    pub fn push(&mut self, delta: &ParsedDelta) {
        if let Some(think) = &delta.think_segment {
            self.think.push_str(think);
        }
        self.response.push_str(&delta.response_segment);
        self.frames += 1;
    }

    /// Build the full replacement for the tail turn from the buffers.
    ///
    /// The think buffer is surfaced only when it is non-blank.
    #[must_use]
    pub fn render(&self, base: &AssistantTurn, status: TurnStatus) -> AssistantTurn {
        AssistantTurn {
            think_content: (!self.think.trim().is_empty()).then(|| self.think.clone()),
            response_content: self.response.clone(),
            timestamp: base.timestamp,
            status,
        }
    }

    /// Number of frames folded since the last reset.
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    /// Drop buffered text.
    pub fn reset(&mut self) {
        self.think.clear();
        self.response.clear();
        self.frames = 0;
    }
}

/// Append a late delta onto an already rendered turn.
pub fn extend_turn(turn: &mut AssistantTurn, delta: &ParsedDelta) {
    if let Some(think) = delta.think_segment.as_deref().filter(|t| !t.trim().is_empty()) {
        turn.think_content
            .get_or_insert_with(String::new)
            .push_str(think);
    }
    turn.response_content.push_str(&delta.response_segment);
}
