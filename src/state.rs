use std::sync::Arc;

use rusqlite::Connection;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::AppError;
use crate::models::dashboard::DashboardSnapshot;
use crate::models::file_record::FileId;
use crate::models::share::ShareOptions;
use crate::models::upload::UploadOutcome;
use crate::services::api_client::{CatalogApi, HttpCatalogApi};
use crate::services::catalog_service::CatalogStore;
use crate::services::dashboard_service::DashboardCache;
use crate::services::upload_service::UploadNegotiator;

/// Everything one signed-in account owns on the client. Built when the app
/// starts and torn down through [`logout`](Self::logout).
pub struct ClientSession {
    api: Arc<dyn CatalogApi>,
    pub catalog: CatalogStore,
    pub dashboard: DashboardCache,
    pub uploads: UploadNegotiator,
}

impl ClientSession {
    pub fn new(
        api: Arc<dyn CatalogApi>,
        conn: Connection,
        account: &str,
        recent_files_limit: usize,
    ) -> Self {
        Self {
            api,
            catalog: CatalogStore::new(),
            dashboard: DashboardCache::new(conn, account, recent_files_limit),
            uploads: UploadNegotiator::new(),
        }
    }

    pub fn open(
        config: &ClientConfig,
        account: &str,
        auth_token: Option<String>,
    ) -> anyhow::Result<Self> {
        let api = HttpCatalogApi::from_config(config, auth_token)?;
        let conn = config.open_database()?;
        info!(account, base_url = %config.api_base_url, "session opened");
        Ok(Self::new(
            Arc::new(api),
            conn,
            account,
            config.recent_files_limit,
        ))
    }

    pub fn api(&self) -> &dyn CatalogApi {
        self.api.as_ref()
    }

    pub async fn load_catalog(&mut self) -> Result<(), AppError> {
        self.catalog.load(self.api.as_ref()).await
    }

    pub async fn search(&mut self, query: &str) -> Result<(), AppError> {
        self.catalog.apply_search(self.api.as_ref(), query).await
    }

    pub async fn delete_file(&mut self, id: FileId) -> Result<bool, AppError> {
        self.catalog
            .delete_file(self.api.as_ref(), id, &self.dashboard)
            .await
    }

    pub fn remove_record(&mut self, id: FileId) -> bool {
        self.catalog.remove_record(id, &self.dashboard)
    }

    /// Persisted statistics, available before any network round trip. Show
    /// this first, then replace it with [`dashboard`](Self::dashboard).
    pub fn cached_dashboard(&self) -> Option<DashboardSnapshot> {
        self.dashboard.snapshot()
    }

    pub async fn dashboard(&self) -> Option<DashboardSnapshot> {
        self.dashboard.refresh(self.api.as_ref()).await
    }

    pub async fn submit_upload(&mut self) -> Result<UploadOutcome, AppError> {
        self.uploads
            .submit(self.api.as_ref(), &mut self.catalog, &self.dashboard)
            .await
    }

    pub async fn resolve_conflict(&mut self, confirm_override: bool) -> Result<UploadOutcome, AppError> {
        self.uploads
            .resolve_and_send(
                confirm_override,
                self.api.as_ref(),
                &mut self.catalog,
                &self.dashboard,
            )
            .await
    }

    pub async fn download_url(&self, id: FileId) -> Result<String, AppError> {
        self.api.download_url(id).await
    }

    pub async fn share(&self, id: FileId, options: &ShareOptions) -> Result<String, AppError> {
        self.api.create_share_link(id, options).await
    }

    /// Drops any live upload and the account's persisted dashboard.
    pub fn logout(mut self) -> Result<(), AppError> {
        self.uploads.abandon();
        self.dashboard.clear()?;
        info!(account = self.dashboard.account(), "session closed");
        Ok(())
    }
}
