use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::file_record::{deserialize_timestamp, FileId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentFile {
    pub id: FileId,
    #[serde(rename = "original_filename")]
    pub filename: String,
    #[serde(rename = "upload_date", deserialize_with = "deserialize_timestamp")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(rename = "file_size_bytes")]
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub total_files: u64,
    pub total_storage_mb: f64,
    #[serde(default)]
    pub recent_files: Vec<RecentFile>,
    #[serde(default)]
    pub category_counts: Vec<CategoryCount>,
    #[serde(rename = "data_version")]
    pub version: String,
}

impl DashboardSnapshot {
    /// Orders recent files newest first and keeps at most `limit` of them.
    pub fn normalize(mut self, limit: usize) -> Self {
        self.recent_files.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        self.recent_files.truncate(limit);
        self
    }
}

/// Reply to a conditional dashboard request.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardFetch {
    Fresh(DashboardSnapshot),
    Unchanged,
}

impl DashboardFetch {
    pub fn from_value(value: serde_json::Value) -> Result<Self, AppError> {
        if value.get("status").and_then(|s| s.as_str()) == Some("unchanged") {
            return Ok(Self::Unchanged);
        }
        let snapshot: DashboardSnapshot = serde_json::from_value(value)
            .map_err(|e| AppError::protocol(format!("malformed dashboard payload: {e}")))?;
        Ok(Self::Fresh(snapshot))
    }
}
