// SPDX-License-Identifier: GPL-3.0-only

use crate::encoder::extension_for_mime;
use crate::fallback::Tier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The finished capture, handed to the upload collaborator
///
/// Created once per session. The metadata serializes for upload requests;
/// the bytes travel separately.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureArtifact {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub tier: Tier,
    pub filter_applied: bool,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub chunk_count: usize,
    pub filter_id: String,
}

impl CaptureArtifact {
    pub fn file_extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Suggested file name, e.g. `capture_20260101_120000.webm`
    pub fn file_name(&self) -> String {
        format!(
            "capture_{}.{}",
            self.created_at.format("%Y%m%d_%H%M%S"),
            self.file_extension()
        )
    }
}
