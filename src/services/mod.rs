pub mod api_client;
pub mod catalog_service;
pub mod dashboard_service;
pub mod upload_service;

#[cfg(test)]
pub mod fake_api;
