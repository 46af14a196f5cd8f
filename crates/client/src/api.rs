use reqwest::multipart;
use serde_json::{Value, json};

use formats::VectorDocument;
use session::DerivedProducts;

use crate::error::ClientError;
use crate::protocol::{AnalyzeReply, MergeReply, StatusReply, feature_collection};

const API_KEY_HEADER: &str = "x-api-key";

/// HTTP client for the processing backend.
///
/// One outbound request per call; no retries, no polling. Cancellation is
/// the caller's concern (a superseded call is allowed to finish and its
/// result is discarded upstream).
pub struct BackendClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST `/upload-tif`: store one raster tile for a later merge.
    pub async fn upload_raster(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ClientError> {
        let part = multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(self.endpoint("/upload-tif"))
            .header(API_KEY_HEADER, self.api_key.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::transport("failed to send upload", e))?;

        let reply: StatusReply = read_json(resp).await?;
        reply.into_filename()
    }

    /// POST `/merge-dem`: merge the uploaded rasters and derive artifacts.
    pub async fn merge_dem(&self, folder_path: &str) -> Result<DerivedProducts, ClientError> {
        let resp = self
            .http
            .post(self.endpoint("/merge-dem"))
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&json!({ "folder_path": folder_path }))
            .send()
            .await
            .map_err(|e| ClientError::transport("failed to send merge request", e))?;

        let reply: MergeReply = read_json(resp).await?;
        reply.into_products(&self.base_url)
    }

    /// GET a background layer (`/api/restricted`, `/api/zones`, ...).
    pub async fn fetch_layer(&self, path: &str) -> Result<VectorDocument, ClientError> {
        tracing::debug!("fetching background layer from {path}");
        let resp = self
            .http
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|e| ClientError::transport("failed to fetch layer", e))?;

        let value: Value = read_json(resp).await?;
        feature_collection(value)
    }

    /// GET `/api/analyze`: per-zone risk scores.
    pub async fn risk_scores(&self) -> Result<Vec<f64>, ClientError> {
        let resp = self
            .http
            .get(self.endpoint("/api/analyze"))
            .send()
            .await
            .map_err(|e| ClientError::transport("failed to fetch risk scores", e))?;

        let reply: AnalyzeReply = read_json(resp).await?;
        Ok(reply.scores)
    }

    /// GET `/api/export`: kick off a metadata download on the backend.
    ///
    /// Fire-and-forget; only the HTTP status is checked, no body is consumed.
    pub async fn start_export(&self) -> Result<(), ClientError> {
        let resp = self
            .http
            .get(self.endpoint("/api/export"))
            .send()
            .await
            .map_err(|e| ClientError::transport("failed to start export", e))?;

        if !resp.status().is_success() {
            return Err(ClientError::backend(format!(
                "export failed: HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// POST `/api/visual-preview`: server-side parse of an uploaded file into
    /// a feature collection.
    pub async fn visual_preview(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<VectorDocument, ClientError> {
        let part = multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(self.endpoint("/api/visual-preview"))
            .header(API_KEY_HEADER, self.api_key.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::transport("failed to send preview upload", e))?;

        let value: Value = read_json(resp).await?;
        feature_collection(value)
    }
}

/// Read a JSON body, converting HTTP-level failures into backend errors that
/// prefer the backend's own `message`/`error` wording when present.
async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ClientError::transport("failed to read response", e))?;

    if !status.is_success() {
        let message = serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(ClientError::backend(message));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| ClientError::backend(format!("malformed response: {e}")))
}
