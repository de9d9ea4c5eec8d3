use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::file_record::FileRecord;

/// A file picked by the user, held until it is submitted or replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConflict {
    #[serde(rename = "similar_to_filename")]
    pub similar_to: String,
    #[serde(rename = "similarity_score")]
    pub score: f64,
    #[serde(default)]
    pub message: String,
}

/// Server reply to `POST /upload-and-analyze`.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadResponse {
    /// Persisted. `None` when the reply did not carry a complete record.
    Accepted(Option<FileRecord>),
    NearDuplicate(UploadConflict),
}

impl UploadResponse {
    pub fn from_value(value: serde_json::Value) -> Result<Self, AppError> {
        let status = value
            .get("status")
            .and_then(|s| s.as_str())
            .map(ToString::to_string);
        match status.as_deref() {
            // A 2xx body without a status is a plain acceptance.
            Some("ok") | None => Ok(Self::Accepted(serde_json::from_value(value).ok())),
            Some("near_duplicate_found") => {
                let conflict: UploadConflict = serde_json::from_value(value).map_err(|e| {
                    AppError::protocol(format!("malformed near-duplicate reply: {e}"))
                })?;
                Ok(Self::NearDuplicate(conflict))
            }
            Some(other) => Err(AppError::protocol(format!(
                "unexpected upload status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attempt {
    Initial,
    Forced,
}

impl Attempt {
    pub fn force(self) -> bool {
        matches!(self, Self::Forced)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum UploadState {
    #[default]
    Idle,
    Sending(Attempt),
    ConflictPending(UploadConflict),
    Succeeded,
}

impl UploadState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Sending(_) | Self::ConflictPending(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sending(_) => "sending",
            Self::ConflictPending(_) => "conflict_pending",
            Self::Succeeded => "succeeded",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Succeeded(Option<Arc<FileRecord>>),
    ConflictDetected(UploadConflict),
    Cancelled,
    /// The reply belonged to a session that was abandoned or superseded.
    Ignored,
}
