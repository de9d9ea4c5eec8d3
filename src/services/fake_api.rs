use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::dashboard::{DashboardFetch, DashboardSnapshot};
use crate::models::file_record::{FileId, FileRecord};
use crate::models::share::ShareOptions;
use crate::models::upload::{UploadConflict, UploadFile, UploadResponse};
use crate::services::api_client::CatalogApi;

#[derive(Debug, Clone)]
pub enum FakeFailure {
    Network,
    Validation(u16, String),
    Server(String),
}

impl FakeFailure {
    fn to_error(&self) -> AppError {
        match self {
            Self::Network => AppError::Network("connection refused".to_string()),
            Self::Validation(status, message) => AppError::Validation {
                status: *status,
                detail: Some(message.clone()),
            },
            Self::Server(message) => AppError::Server {
                status: 500,
                detail: Some(message.clone()),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum FakeUpload {
    Accept(FileRecord),
    AcceptWithoutRecord,
    Duplicate(UploadConflict),
    Fail(FakeFailure),
}

#[derive(Default)]
pub struct FakeCatalogApi {
    pub files: Mutex<Vec<FileRecord>>,
    pub search_results: Mutex<HashMap<String, Vec<FileRecord>>>,
    pub dashboard: Mutex<Option<DashboardSnapshot>>,
    pub upload_replies: Mutex<VecDeque<FakeUpload>>,
    pub fail_next: Mutex<Option<FakeFailure>>,
    pub upload_calls: Mutex<Vec<(String, bool)>>,
    pub dashboard_calls: Mutex<Vec<Option<String>>>,
    pub deleted: Mutex<Vec<FileId>>,
    pub list_calls: AtomicU64,
}

impl FakeCatalogApi {
    pub fn with_files(files: Vec<FileRecord>) -> Self {
        Self {
            files: Mutex::new(files),
            ..Self::default()
        }
    }

    pub async fn fail_next(&self, failure: FakeFailure) {
        *self.fail_next.lock().await = Some(failure);
    }

    pub async fn set_dashboard(&self, snapshot: DashboardSnapshot) {
        *self.dashboard.lock().await = Some(snapshot);
    }

    pub async fn push_upload(&self, reply: FakeUpload) {
        self.upload_replies.lock().await.push_back(reply);
    }

    pub async fn set_search(&self, query: &str, results: Vec<FileRecord>) {
        self.search_results
            .lock()
            .await
            .insert(query.to_string(), results);
    }

    async fn take_failure(&self) -> Result<(), AppError> {
        match self.fail_next.lock().await.take() {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CatalogApi for FakeCatalogApi {
    async fn list_files(&self) -> Result<Vec<FileRecord>, AppError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        self.take_failure().await?;
        Ok(self.files.lock().await.clone())
    }

    async fn search(&self, query: &str) -> Result<Vec<FileRecord>, AppError> {
        self.take_failure().await?;
        Ok(self
            .search_results
            .lock()
            .await
            .get(query)
            .cloned()
            .unwrap_or_default())
    }

    async fn dashboard(&self, current_version: Option<&str>) -> Result<DashboardFetch, AppError> {
        self.dashboard_calls
            .lock()
            .await
            .push(current_version.map(ToString::to_string));
        self.take_failure().await?;
        let snapshot = self
            .dashboard
            .lock()
            .await
            .clone()
            .ok_or_else(|| AppError::protocol("no dashboard configured"))?;
        if current_version == Some(snapshot.version.as_str()) {
            return Ok(DashboardFetch::Unchanged);
        }
        Ok(DashboardFetch::Fresh(snapshot))
    }

    async fn upload(&self, file: &UploadFile, force: bool) -> Result<UploadResponse, AppError> {
        self.upload_calls
            .lock()
            .await
            .push((file.filename.clone(), force));
        let reply = self
            .upload_replies
            .lock()
            .await
            .pop_front()
            .unwrap_or(FakeUpload::AcceptWithoutRecord);
        match reply {
            FakeUpload::Accept(record) => {
                self.files.lock().await.push(record.clone());
                Ok(UploadResponse::Accepted(Some(record)))
            }
            FakeUpload::AcceptWithoutRecord => Ok(UploadResponse::Accepted(None)),
            FakeUpload::Duplicate(conflict) => Ok(UploadResponse::NearDuplicate(conflict)),
            FakeUpload::Fail(failure) => Err(failure.to_error()),
        }
    }

    async fn delete_file(&self, id: FileId) -> Result<(), AppError> {
        self.take_failure().await?;
        let mut files = self.files.lock().await;
        let before = files.len();
        files.retain(|f| f.id != id);
        if files.len() == before {
            return Err(AppError::Validation {
                status: 404,
                detail: Some("File not found".to_string()),
            });
        }
        self.deleted.lock().await.push(id);
        Ok(())
    }

    async fn download_url(&self, id: FileId) -> Result<String, AppError> {
        self.take_failure().await?;
        Ok(format!("https://files.example.test/{id}"))
    }

    async fn create_share_link(
        &self,
        id: FileId,
        options: &ShareOptions,
    ) -> Result<String, AppError> {
        self.take_failure().await?;
        let days = options.expires_in_days.unwrap_or(0);
        Ok(format!("https://share.example.test/{id}?days={days}"))
    }
}

pub fn record(id: FileId, filename: &str, category: &str, size_bytes: u64, day: u32) -> FileRecord {
    FileRecord {
        id,
        filename: filename.to_string(),
        category: category.to_string(),
        size_bytes,
        uploaded_at: Utc.with_ymd_and_hms(2025, 1, day, 9, 0, 0).unwrap(),
        summary: String::new(),
        match_score: None,
    }
}

pub fn snapshot(version: &str, total_files: u64) -> DashboardSnapshot {
    DashboardSnapshot {
        total_files,
        total_storage_mb: total_files as f64 * 0.5,
        recent_files: Vec::new(),
        category_counts: Vec::new(),
        version: version.to_string(),
    }
}
