//! Render State Machine
//!
//! Tracks a single render invocation through its stages:
//!
//! ```text
//! Init -> TextSegmented -> VocalSynthesized -> Layered -> Mixed -> Finalized
//! ```
//!
//! Any non-terminal state may move to `Failed` (fatal error) or `Cancelled`.
//! `Finalized`, `Failed` and `Cancelled` are terminal.

use crate::error::{PsalmodyError, Result};
use std::fmt;
use tracing::{debug, warn};

/// Stages of a render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderState {
    #[default]
    Init,
    TextSegmented,
    VocalSynthesized,
    Layered,
    Mixed,
    Finalized,
    Failed,
    Cancelled,
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderState::Init => "INIT",
            RenderState::TextSegmented => "TEXT_SEGMENTED",
            RenderState::VocalSynthesized => "VOCAL_SYNTHESIZED",
            RenderState::Layered => "LAYERED",
            RenderState::Mixed => "MIXED",
            RenderState::Finalized => "FINALIZED",
            RenderState::Failed => "FAILED",
            RenderState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", name)
    }
}

impl RenderState {
    /// The state that follows on success, if any
    pub fn next(&self) -> Option<RenderState> {
        match self {
            RenderState::Init => Some(RenderState::TextSegmented),
            RenderState::TextSegmented => Some(RenderState::VocalSynthesized),
            RenderState::VocalSynthesized => Some(RenderState::Layered),
            RenderState::Layered => Some(RenderState::Mixed),
            RenderState::Mixed => Some(RenderState::Finalized),
            _ => None,
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RenderState::Finalized | RenderState::Failed | RenderState::Cancelled
        )
    }

    /// Whether `self -> to` is a legal transition
    pub fn can_transition_to(&self, to: RenderState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            RenderState::Failed | RenderState::Cancelled => true,
            other => self.next() == Some(other),
        }
    }
}

/// Records the current state and every transition of one render
#[derive(Debug, Clone, Default)]
pub struct RenderTracker {
    state: RenderState,
    history: Vec<RenderState>,
}

impl RenderTracker {
    pub fn new() -> Self {
        Self {
            state: RenderState::Init,
            history: vec![RenderState::Init],
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// All states visited, starting with `Init`
    pub fn history(&self) -> &[RenderState] {
        &self.history
    }

    /// Move to `to`, rejecting illegal transitions
    pub fn transition(&mut self, to: RenderState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(PsalmodyError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        debug!(from = %self.state, to = %to, "render state transition");
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Advance to the next stage in the happy path
    pub fn advance(&mut self) -> Result<RenderState> {
        let next = self.state.next().ok_or_else(|| PsalmodyError::InvalidTransition {
            from: self.state.to_string(),
            to: "next stage".to_string(),
        })?;
        self.transition(next)?;
        Ok(next)
    }

    /// Record a fatal error; a no-op once terminal
    pub fn fail(&mut self, error: &PsalmodyError) {
        if self.state.is_terminal() {
            return;
        }
        warn!(
            state = %self.state,
            code = error.error_code(),
            segment = ?error.segment_index(),
            layer = ?error.layer(),
            "render failed: {}",
            error
        );
        self.state = RenderState::Failed;
        self.history.push(RenderState::Failed);
    }

    /// Record cancellation; a no-op once terminal
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = RenderState::Cancelled;
        self.history.push(RenderState::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_happy_path() {
        let mut tracker = RenderTracker::new();
        for _ in 0..5 {
            tracker.advance().unwrap();
        }
        assert_eq!(tracker.state(), RenderState::Finalized);
        assert_eq!(
            tracker.history(),
            &[
                RenderState::Init,
                RenderState::TextSegmented,
                RenderState::VocalSynthesized,
                RenderState::Layered,
                RenderState::Mixed,
                RenderState::Finalized,
            ]
        );
        assert!(tracker.advance().is_err());
    }

    #[test]
    fn test_skipping_stage_rejected() {
        let mut tracker = RenderTracker::new();
        let err = tracker.transition(RenderState::Layered).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
        assert_eq!(tracker.state(), RenderState::Init);
    }

    #[test]
    fn test_fail_is_terminal() {
        let mut tracker = RenderTracker::new();
        tracker.advance().unwrap();
        tracker.fail(&PsalmodyError::processing("mix", "boom"));
        assert_eq!(tracker.state(), RenderState::Failed);
        assert!(tracker.transition(RenderState::VocalSynthesized).is_err());
        tracker.cancel();
        assert_eq!(tracker.state(), RenderState::Failed);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(RenderState::VocalSynthesized.to_string(), "VOCAL_SYNTHESIZED");
        assert_eq!(RenderState::Cancelled.to_string(), "CANCELLED");
    }
}
