use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::AppError;
use crate::models::dashboard::CategoryCount;
use crate::models::file_record::{FileId, FileRecord};
use crate::models::view::{CatalogView, SortKey, ViewFilter};
use crate::services::api_client::CatalogApi;
use crate::services::dashboard_service::DashboardCache;

/// The master copy of the user's catalog plus the one view derived from it.
///
/// Every mutating operation ends in [`recompute`](Self::recompute), so the
/// displayed set is always filtered and sorted by the time control returns.
/// Remote operations apply nothing until the server has answered; a failed
/// call leaves both the master set and the view exactly as they were.
#[derive(Debug, Default)]
pub struct CatalogStore {
    master: Vec<Arc<FileRecord>>,
    search_hits: Vec<FileId>,
    view: CatalogView,
    needs_reload: bool,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort_key(sort_key: SortKey) -> Self {
        let mut store = Self::default();
        store.view.sort_key = sort_key;
        store
    }

    pub fn view(&self) -> &CatalogView {
        &self.view
    }

    pub fn view_version(&self) -> u64 {
        self.view.version
    }

    pub fn records(&self) -> &[Arc<FileRecord>] {
        &self.master
    }

    pub fn len(&self) -> usize {
        self.master.len()
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_empty()
    }

    pub fn get(&self, id: FileId) -> Option<&Arc<FileRecord>> {
        self.master.iter().find(|record| record.id == id)
    }

    /// Set when an upload succeeded without returning a usable record.
    pub fn needs_reload(&self) -> bool {
        self.needs_reload
    }

    pub async fn load(&mut self, api: &dyn CatalogApi) -> Result<(), AppError> {
        let files = api.list_files().await?;

        let mut seen = HashSet::new();
        self.master = files
            .into_iter()
            .filter(|record| seen.insert(record.id))
            .map(Arc::new)
            .collect();
        self.clear_search();
        self.view.filter = ViewFilter::All;
        self.needs_reload = false;
        self.recompute();

        info!(count = self.master.len(), "catalog loaded");
        Ok(())
    }

    /// Server-side search. Hits replace the displayed set; hits the master
    /// set has not seen yet are merged into it. Known ids keep the master's
    /// record and only contribute their score.
    pub async fn apply_search(&mut self, api: &dyn CatalogApi, query: &str) -> Result<(), AppError> {
        let query = query.trim();
        if query.is_empty() {
            self.clear_filters();
            return Ok(());
        }

        let hits = api.search(query).await?;

        let mut seen = HashSet::new();
        let mut merged = 0usize;
        self.clear_search();
        for mut hit in hits {
            if !seen.insert(hit.id) {
                continue;
            }
            if let Some(score) = hit.match_score.take() {
                self.view.match_scores.insert(hit.id, score);
            }
            self.search_hits.push(hit.id);
            if self.get(hit.id).is_none() {
                self.master.push(Arc::new(hit));
                merged += 1;
            }
        }
        self.view.filter = ViewFilter::Search(query.to_string());
        self.recompute();

        debug!(query, hits = self.search_hits.len(), merged, "search applied");
        Ok(())
    }

    /// Exact, case-sensitive label match against the master set.
    pub fn apply_category_filter(&mut self, category: &str) {
        self.view.filter = ViewFilter::Category(category.to_string());
        self.clear_search();
        self.recompute();
    }

    pub fn clear_filters(&mut self) {
        self.view.filter = ViewFilter::All;
        self.clear_search();
        self.recompute();
    }

    pub fn set_sort_key(&mut self, sort_key: SortKey) {
        self.view.sort_key = sort_key;
        self.recompute();
    }

    /// Drops a record from the master and displayed sets. Absent ids are a
    /// no-op. Returns whether anything was removed.
    pub fn remove_record(&mut self, id: FileId, dashboard: &DashboardCache) -> bool {
        let removed = self.remove_local(id);
        if removed {
            dashboard.invalidate();
        }
        removed
    }

    /// Deletes on the server, then locally. The dashboard is invalidated
    /// whenever the server confirms, even for ids this store never held.
    pub async fn delete_file(
        &mut self,
        api: &dyn CatalogApi,
        id: FileId,
        dashboard: &DashboardCache,
    ) -> Result<bool, AppError> {
        api.delete_file(id).await?;
        dashboard.invalidate();
        let removed = self.remove_local(id);
        info!(id, removed, "file deleted");
        Ok(removed)
    }

    /// Takes in a record confirmed by the server, replacing any record with
    /// the same id.
    pub fn admit(&mut self, record: FileRecord) -> Arc<FileRecord> {
        let record = Arc::new(record);
        match self.master.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => *existing = Arc::clone(&record),
            None => self.master.push(Arc::clone(&record)),
        }
        self.recompute();
        record
    }

    pub fn mark_needs_reload(&mut self) {
        self.needs_reload = true;
    }

    /// Record count per category label over the master set, ordered by label.
    pub fn category_counts(&self) -> Vec<CategoryCount> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for record in &self.master {
            *counts.entry(record.category.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(category, count)| CategoryCount {
                category: category.to_string(),
                count,
            })
            .collect()
    }

    fn remove_local(&mut self, id: FileId) -> bool {
        let before = self.master.len();
        self.master.retain(|record| record.id != id);
        self.search_hits.retain(|hit| *hit != id);
        self.view.match_scores.remove(&id);
        let removed = self.master.len() != before;
        if removed {
            self.recompute();
        }
        removed
    }

    fn clear_search(&mut self) {
        self.search_hits.clear();
        self.view.match_scores.clear();
    }

    /// Re-derives the displayed set from the current filter and sort key and
    /// bumps the view version.
    fn recompute(&mut self) {
        let mut results: Vec<Arc<FileRecord>> = match &self.view.filter {
            ViewFilter::All => self.master.clone(),
            ViewFilter::Search(_) => {
                let by_id: HashMap<FileId, &Arc<FileRecord>> =
                    self.master.iter().map(|record| (record.id, record)).collect();
                self.search_hits
                    .iter()
                    .filter_map(|id| by_id.get(id).map(|record| Arc::clone(*record)))
                    .collect()
            }
            ViewFilter::Category(label) => self
                .master
                .iter()
                .filter(|record| record.category == *label)
                .cloned()
                .collect(),
        };
        let sort_key = self.view.sort_key;
        results.sort_by(|a, b| sort_key.compare(a, b));
        self.view.results = results;
        self.view.version += 1;
    }
}
