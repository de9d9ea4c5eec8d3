use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::file_record::{FileId, FileRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    All,
    Search,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    #[serde(rename = "date-desc")]
    DateDesc,
    #[serde(rename = "date-asc")]
    DateAsc,
    #[serde(rename = "name-asc")]
    NameAsc,
    #[serde(rename = "size-desc")]
    SizeDesc,
}

impl SortKey {
    /// Total order over records; every key falls back to `id` so ties never
    /// depend on input order.
    pub fn compare(self, a: &FileRecord, b: &FileRecord) -> Ordering {
        match self {
            Self::DateDesc => b
                .uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| b.id.cmp(&a.id)),
            Self::DateAsc => a
                .uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.id.cmp(&b.id)),
            Self::NameAsc => a.filename.cmp(&b.filename).then_with(|| a.id.cmp(&b.id)),
            Self::SizeDesc => b
                .size_bytes
                .cmp(&a.size_bytes)
                .then_with(|| a.id.cmp(&b.id)),
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DateDesc => write!(f, "date-desc"),
            Self::DateAsc => write!(f, "date-asc"),
            Self::NameAsc => write!(f, "name-asc"),
            Self::SizeDesc => write!(f, "size-desc"),
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date-desc" => Ok(Self::DateDesc),
            "date-asc" => Ok(Self::DateAsc),
            "name-asc" => Ok(Self::NameAsc),
            "size-desc" => Ok(Self::SizeDesc),
            _ => Err(format!("unknown sort key: {s}")),
        }
    }
}

/// Which subset of the catalog is on display. Holding the query or the label
/// inside the variant keeps search and category filtering mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum ViewFilter {
    #[default]
    All,
    Search(String),
    Category(String),
}

/// Read-only projection handed to the presentation layer. `results` shares
/// its records with the store's master set.
#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    pub(crate) filter: ViewFilter,
    pub(crate) sort_key: SortKey,
    pub(crate) results: Vec<Arc<FileRecord>>,
    pub(crate) match_scores: HashMap<FileId, f64>,
    pub(crate) version: u64,
}

impl CatalogView {
    pub fn mode(&self) -> ViewMode {
        match self.filter {
            ViewFilter::All => ViewMode::All,
            ViewFilter::Search(_) => ViewMode::Search,
            ViewFilter::Category(_) => ViewMode::Category,
        }
    }

    pub fn query(&self) -> &str {
        match &self.filter {
            ViewFilter::Search(query) => query,
            _ => "",
        }
    }

    pub fn selected_category(&self) -> Option<&str> {
        match &self.filter {
            ViewFilter::Category(label) => Some(label),
            _ => None,
        }
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn results(&self) -> &[Arc<FileRecord>] {
        &self.results
    }

    /// Relevance reported by the last search, only while in search mode.
    pub fn match_score(&self, id: FileId) -> Option<f64> {
        self.match_scores.get(&id).copied()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn ids(&self) -> Vec<FileId> {
        self.results.iter().map(|record| record.id).collect()
    }
}
