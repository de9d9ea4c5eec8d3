mod config;
mod data;
mod error;
pub mod models;
mod services;
mod state;

pub use config::{open_database_at, ClientConfig, DEFAULT_API_URL};
pub use error::{AppError, ErrorKind};
pub use services::api_client::{CatalogApi, HttpCatalogApi};
pub use services::catalog_service::CatalogStore;
pub use services::dashboard_service::DashboardCache;
pub use services::upload_service::{UploadNegotiator, UploadTicket};
pub use state::ClientSession;

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "docvault_lib=info";

/// Installs the global fmt subscriber. Safe to call more than once; later
/// calls are no-ops when a subscriber is already set.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
