// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capture tiers in the order they are attempted
///
/// Ordering follows escalation: a session only ever moves to a greater tier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Tier {
    /// Filtered frames drawn by the compositor
    #[default]
    Composited,
    /// Unmodified source frames
    Direct,
    /// Synthesized "capture failed" clip
    Placeholder,
}

impl Tier {
    /// Move to `next` unless already past it
    pub fn escalate(self, next: Tier) -> Tier {
        self.max(next)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Composited => "composited",
            Tier::Direct => "direct",
            Tier::Placeholder => "placeholder",
        };
        f.write_str(name)
    }
}
