// SPDX-License-Identifier: GPL-3.0-only

//! Session state and the single record every timer and task writes through

use crate::fallback::Tier;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of a recording session, in forward order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Stopping,
    Finished,
    Failed,
}

impl RecorderState {
    /// Whether `next` is a legal successor
    ///
    /// `Finished` and `Failed` are both terminal; neither can follow the other.
    pub fn can_transition_to(self, next: RecorderState) -> bool {
        use RecorderState::*;
        matches!(
            (self, next),
            (Idle, Recording) | (Recording, Stopping) | (Stopping, Finished) | (Stopping, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RecorderState::Finished | RecorderState::Failed)
    }
}

/// The live session record
///
/// Owned by [`RecordingSession`](super::RecordingSession) behind a mutex;
/// nothing outside the recording module mutates it.
#[derive(Debug, Clone)]
pub struct RecorderSession {
    pub id: Uuid,
    pub state: RecorderState,
    pub tier: Tier,
    pub started_at: Option<Instant>,
    pub chunk_count: u64,
    pub chunk_bytes: usize,
    pub filter_applied: bool,
    /// Last reported progress; never decreases
    pub progress: f32,
}

impl Default for RecorderSession {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RecorderState::Idle,
            tier: Tier::default(),
            started_at: None,
            chunk_count: 0,
            chunk_bytes: 0,
            filter_applied: false,
            progress: 0.0,
        }
    }
}

impl RecorderSession {
    /// Apply a transition, returning false if it would move backwards
    pub fn transition(&mut self, next: RecorderState) -> bool {
        if !self.state.can_transition_to(next) {
            debug!(session = %self.id, from = ?self.state, to = ?next, "Ignoring state transition");
            return false;
        }
        debug!(session = %self.id, from = ?self.state, to = ?next, "Session state transition");
        self.state = next;
        true
    }

    /// Back to a fresh `Idle` record with the same id
    pub fn reset(&mut self) {
        *self = Self {
            id: self.id,
            ..Self::default()
        };
    }

    /// Raise the tier; lower tiers are ignored
    pub fn escalate(&mut self, tier: Tier) {
        self.tier = self.tier.escalate(tier);
    }

    /// Record a chunk arrival and return the progress to report
    ///
    /// Clamped to 0..=100 and never lower than a previous report.
    pub fn record_chunk(&mut self, bytes: usize, percent: f32) -> f32 {
        self.chunk_count += 1;
        self.chunk_bytes += bytes;
        self.progress = self.progress.max(percent.clamp(0.0, 100.0));
        self.progress
    }
}
