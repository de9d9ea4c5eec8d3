use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::AppError;
use crate::models::dashboard::DashboardFetch;
use crate::models::file_record::{FileId, FileRecord};
use crate::models::share::ShareOptions;
use crate::models::upload::{UploadFile, UploadResponse};

const REQUEST_ID_HEADER: &str = "x-request-id";
const UPLOAD_PATH: &str = "/upload-and-analyze/";

/// The document service as seen by the client. Every call is one round trip;
/// retries and caching live in the callers.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_files(&self) -> Result<Vec<FileRecord>, AppError>;

    async fn search(&self, query: &str) -> Result<Vec<FileRecord>, AppError>;

    async fn dashboard(&self, current_version: Option<&str>) -> Result<DashboardFetch, AppError>;

    async fn upload(&self, file: &UploadFile, force: bool) -> Result<UploadResponse, AppError>;

    async fn delete_file(&self, id: FileId) -> Result<(), AppError>;

    async fn download_url(&self, id: FileId) -> Result<String, AppError>;

    async fn create_share_link(&self, id: FileId, options: &ShareOptions)
        -> Result<String, AppError>;
}

pub struct HttpCatalogApi {
    client: reqwest::Client,
    base_url: String,
    auth_bearer: Option<String>,
}

impl HttpCatalogApi {
    pub fn new(
        base_url: &str,
        auth_bearer: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::General(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_bearer: auth_bearer.filter(|token| !token.trim().is_empty()),
        })
    }

    pub fn from_config(config: &ClientConfig, auth_bearer: Option<String>) -> Result<Self, AppError> {
        Self::new(&config.api_base_url, auth_bearer, config.request_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn headers(&self) -> Result<HeaderMap, AppError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.auth_bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| AppError::General(format!("invalid auth header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        headers.insert(
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderValue::from_str(&request_id)
                .map_err(|e| AppError::General(format!("invalid request id: {e}")))?,
        );
        Ok(headers)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, AppError> {
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| AppError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::Network(format!("read body failed: {e}")))?;
        debug!(status = status.as_u16(), bytes = body.len(), "response received");
        if !status.is_success() {
            return Err(classify_status(
                status.as_u16(),
                &String::from_utf8_lossy(&body),
            ));
        }
        Ok(body.to_vec())
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<serde_json::Value, AppError> {
        let body = self.send(request).await?;
        parse_json(&body)
    }
}

/// Maps a non-success HTTP status to the client error taxonomy. Redirects
/// are not followed for multipart bodies, so a 3xx means the route is wrong.
pub(crate) fn classify_status(status: u16, body: &str) -> AppError {
    let detail = extract_detail(body);
    match status {
        300..=399 => AppError::protocol(format!(
            "unexpected redirect (HTTP {status}); check the endpoint path"
        )),
        400..=499 => AppError::Validation { status, detail },
        _ => AppError::Server { status, detail },
    }
}

/// Pulls the human-readable `detail` out of an error body. Validation
/// failures carry a list of `{msg}` objects instead of a string.
pub(crate) fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) => Some(detail.clone()),
        serde_json::Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}

pub(crate) fn parse_json(body: &[u8]) -> Result<serde_json::Value, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::protocol(format!("unparsable response body: {e}")))
}

fn string_field(value: &serde_json::Value, field: &str) -> Result<String, AppError> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or_else(|| AppError::protocol(format!("response is missing '{field}'")))
}

#[async_trait]
impl CatalogApi for HttpCatalogApi {
    #[instrument(name = "api_list_files", skip(self))]
    async fn list_files(&self) -> Result<Vec<FileRecord>, AppError> {
        let value = self.send_json(self.client.get(self.url("/files"))).await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::protocol(format!("malformed file listing: {e}")))
    }

    #[instrument(name = "api_search", skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<FileRecord>, AppError> {
        let request = self
            .client
            .get(self.url("/search"))
            .query(&[("query", query)]);
        let value = self.send_json(request).await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::protocol(format!("malformed search results: {e}")))
    }

    #[instrument(name = "api_dashboard", skip(self))]
    async fn dashboard(&self, current_version: Option<&str>) -> Result<DashboardFetch, AppError> {
        let mut request = self.client.get(self.url("/dashboard"));
        if let Some(version) = current_version {
            request = request.query(&[("current_version", version)]);
        }
        let value = self.send_json(request).await?;
        DashboardFetch::from_value(value)
    }

    #[instrument(name = "api_upload", skip(self, file), fields(filename = %file.filename))]
    async fn upload(&self, file: &UploadFile, force: bool) -> Result<UploadResponse, AppError> {
        let mut part = Part::bytes(file.bytes.clone()).file_name(file.filename.clone());
        if let Some(content_type) = &file.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| AppError::General(format!("invalid content type: {e}")))?;
        }
        let mut request = self
            .client
            .post(self.url(UPLOAD_PATH))
            .multipart(Form::new().part("file", part));
        if force {
            request = request.query(&[("force", "true")]);
        }
        let value = self.send_json(request).await?;
        UploadResponse::from_value(value)
    }

    #[instrument(name = "api_delete_file", skip(self))]
    async fn delete_file(&self, id: FileId) -> Result<(), AppError> {
        self.send(self.client.delete(self.url(&format!("/files/{id}"))))
            .await?;
        Ok(())
    }

    #[instrument(name = "api_download_url", skip(self))]
    async fn download_url(&self, id: FileId) -> Result<String, AppError> {
        let value = self
            .send_json(self.client.get(self.url(&format!("/files/{id}/download"))))
            .await?;
        string_field(&value, "download_url")
    }

    #[instrument(name = "api_share", skip(self, options))]
    async fn create_share_link(
        &self,
        id: FileId,
        options: &ShareOptions,
    ) -> Result<String, AppError> {
        let request = self
            .client
            .post(self.url(&format!("/files/{id}/share")))
            .json(options);
        let value = self.send_json(request).await?;
        string_field(&value, "share_url")
    }
}
