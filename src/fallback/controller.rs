// SPDX-License-Identifier: GPL-3.0-only

//! Tier driver loop
//!
//! Walks the strategy list in order until one constructs and starts. The
//! placeholder is not a strategy: it is what `finish` falls back to when no
//! strategy is running or the one that ran produced too little data.

use super::placeholder::{self, PlaceholderClip};
use super::strategy::{CaptureContext, CaptureStrategy, CompositedStrategy, DirectStrategy, RunningCapture};
use super::tier::Tier;
use crate::encoder::FlushHandle;
use crate::errors::CaptureError;
use crate::filters::FilterProgram;
use crate::recording::CaptureCallbacks;
use tracing::{debug, info, warn};

/// What a finished capture hands back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub tier: Tier,
    pub filter_applied: bool,
    pub chunk_count: usize,
}

impl From<PlaceholderClip> for CaptureOutcome {
    fn from(clip: PlaceholderClip) -> Self {
        Self {
            bytes: clip.bytes,
            mime_type: clip.mime_type,
            tier: Tier::Placeholder,
            filter_applied: false,
            chunk_count: 0,
        }
    }
}

pub struct FallbackController {
    ctx: CaptureContext,
    strategies: Vec<Box<dyn CaptureStrategy>>,
    callbacks: CaptureCallbacks,
    tier: Tier,
    running: Option<(usize, RunningCapture)>,
    failure_reported: bool,
    filter_error_reported: bool,
}

impl FallbackController {
    /// Controller with the standard composited, then direct ordering
    pub fn new(ctx: CaptureContext, callbacks: CaptureCallbacks) -> Self {
        Self::with_strategies(
            ctx,
            callbacks,
            vec![Box::new(CompositedStrategy), Box::new(DirectStrategy)],
        )
    }

    pub fn with_strategies(
        ctx: CaptureContext,
        callbacks: CaptureCallbacks,
        strategies: Vec<Box<dyn CaptureStrategy>>,
    ) -> Self {
        Self {
            ctx,
            strategies,
            callbacks,
            tier: Tier::default(),
            running: None,
            failure_reported: false,
            filter_error_reported: false,
        }
    }

    /// Start the first tier that can be constructed
    ///
    /// Never fails: when every strategy fails the controller settles on
    /// [`Tier::Placeholder`] and the clip is synthesized by [`finish`](Self::finish).
    pub async fn start(&mut self) -> Tier {
        let mut filter_unavailable = false;

        for (index, strategy) in self.strategies.iter().enumerate() {
            self.tier = self.tier.escalate(strategy.tier());

            let prepared = match strategy.construct(&self.ctx) {
                Ok(prepared) => prepared,
                Err(e) => {
                    warn!(tier = %self.tier, error = %e, "Capture tier construction failed");
                    if matches!(e, CaptureError::Filter(_) | CaptureError::Compositor(_)) {
                        filter_unavailable = true;
                    }
                    continue;
                }
            };

            match strategy.run(prepared, &self.ctx).await {
                Ok(running) => {
                    if !running.filter_applied() {
                        report_filter_unavailable(
                            &self.callbacks,
                            &self.ctx.program,
                            &mut self.filter_error_reported,
                        );
                    }
                    info!(tier = %self.tier, filter_applied = running.filter_applied(), "Capture started");
                    self.running = Some((index, running));
                    return self.tier;
                }
                Err(e) => {
                    warn!(tier = %self.tier, error = %e, "Capture tier failed to start");
                }
            }
        }

        if filter_unavailable {
            report_filter_unavailable(
                &self.callbacks,
                &self.ctx.program,
                &mut self.filter_error_reported,
            );
        }
        self.tier = Tier::Placeholder;
        self.failure_reported = true;
        self.callbacks
            .error("No capture tier could be started, delivering placeholder clip");
        self.tier
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn filter_applied(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|(_, running)| running.filter_applied())
    }

    /// Flush handle of the running tier, if any
    pub fn flush_handle(&self) -> Option<FlushHandle> {
        self.running.as_ref().map(|(_, running)| running.flush_handle())
    }

    /// Stop the running tier and judge its output
    pub async fn finish(mut self) -> CaptureOutcome {
        if let Some((index, running)) = self.running.take() {
            let output = running.finish().await;
            let min_bytes = self.ctx.config.min_artifact_bytes;
            let sufficient = self
                .strategies
                .get(index)
                .is_some_and(|strategy| strategy.is_sufficient(&output, min_bytes));

            if sufficient {
                debug!(
                    tier = %output.tier,
                    chunks = output.chunks.len(),
                    bytes = output.chunks.total_bytes(),
                    "Capture output accepted"
                );
                return CaptureOutcome {
                    chunk_count: output.chunks.len(),
                    bytes: output.chunks.concat(),
                    mime_type: output.mime_type,
                    tier: output.tier,
                    filter_applied: output.filter_applied,
                };
            }

            self.tier = self.tier.escalate(Tier::Placeholder);
            if !self.failure_reported {
                self.failure_reported = true;
                self.callbacks.error(&format!(
                    "{} capture produced {} bytes in {} chunks, delivering placeholder clip",
                    output.tier,
                    output.chunks.total_bytes(),
                    output.chunks.len()
                ));
            }
        }

        let clip = placeholder::synthesize(
            self.ctx.backend.as_ref(),
            self.ctx.format.as_deref(),
            &self.ctx.config,
        )
        .await;
        info!(kind = ?clip.kind, bytes = clip.bytes.len(), "Placeholder delivered");
        clip.into()
    }
}

/// Fire the filter error once per capture; identity never reports
fn report_filter_unavailable(
    callbacks: &CaptureCallbacks,
    program: &FilterProgram,
    reported: &mut bool,
) {
    if *reported || program.is_identity() {
        return;
    }
    *reported = true;
    callbacks.filter_error(&format!(
        "Filter '{}' is not available, recording without it",
        program.display_name
    ));
}
