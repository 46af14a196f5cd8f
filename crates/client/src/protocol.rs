//! Wire shapes for the processing backend and their boundary validation.
//!
//! Every reply is deserialized into a declared shape and checked here;
//! malformed or incomplete payloads become backend errors instead of leaking
//! untyped JSON deeper into the system.

use serde::Deserialize;
use serde_json::Value;

use formats::VectorDocument;
use session::DerivedProducts;

use crate::error::ClientError;

/// Generic `{status, filename?, message?}` reply used by the upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReply {
    pub status: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusReply {
    pub fn into_filename(self) -> Result<String, ClientError> {
        check_status(&self.status, self.message.as_deref())?;
        self.filename
            .ok_or_else(|| ClientError::backend("upload reply missing filename"))
    }
}

/// Reply of the merge endpoint; all four artifact paths arrive together on
/// success.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeReply {
    pub status: String,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub slope_map: Option<String>,
    #[serde(default)]
    pub interactive: Option<String>,
    #[serde(default)]
    pub merged_dem: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl MergeReply {
    /// Validate the reply and absolutize the artifact paths against the
    /// backend base URL.
    pub fn into_products(self, base_url: &str) -> Result<DerivedProducts, ClientError> {
        check_status(&self.status, self.message.as_deref())?;

        let require = |field: Option<String>, name: &str| {
            field.ok_or_else(|| {
                ClientError::backend(format!("merge reply missing artifact: {name}"))
            })
        };
        Ok(DerivedProducts {
            preview: join_url(base_url, &require(self.preview, "preview")?),
            slope_map: join_url(base_url, &require(self.slope_map, "slope_map")?),
            interactive: join_url(base_url, &require(self.interactive, "interactive")?),
            merged_dem: join_url(base_url, &require(self.merged_dem, "merged_dem")?),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeReply {
    pub scores: Vec<f64>,
}

fn check_status(status: &str, message: Option<&str>) -> Result<(), ClientError> {
    if status == "success" {
        return Ok(());
    }
    Err(ClientError::backend(
        message.unwrap_or("backend reported failure").to_string(),
    ))
}

/// Parse a payload that is either a GeoJSON feature collection or an
/// `{"error": ...}` object.
pub fn feature_collection(value: Value) -> Result<VectorDocument, ClientError> {
    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
        return Err(ClientError::backend(error.to_string()));
    }
    VectorDocument::from_geojson_value(value)
        .map_err(|e| ClientError::backend(format!("unexpected payload: {e}")))
}

pub fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::{AnalyzeReply, MergeReply, StatusReply, feature_collection, join_url};
    use crate::error::ClientError;

    #[test]
    fn merge_reply_requires_all_four_artifacts() {
        let reply: MergeReply = serde_json::from_str(
            r#"{"status": "success", "preview": "/p.png", "slope_map": "/s.png",
                "interactive": "/i.html", "merged_dem": "/m.tif"}"#,
        )
        .expect("deserialize");
        let products = reply.into_products("http://backend:5000").expect("products");
        assert_eq!(products.preview, "http://backend:5000/p.png");
        assert_eq!(products.merged_dem, "http://backend:5000/m.tif");

        let partial: MergeReply = serde_json::from_str(
            r#"{"status": "success", "preview": "/p.png", "slope_map": "/s.png",
                "interactive": "/i.html"}"#,
        )
        .expect("deserialize");
        let err = partial.into_products("http://backend:5000").unwrap_err();
        assert!(err.message().contains("merged_dem"));
    }

    #[test]
    fn semantic_failure_carries_backend_message() {
        let reply: MergeReply = serde_json::from_str(
            r#"{"status": "error", "message": "no valid .tif files found"}"#,
        )
        .expect("deserialize");
        let err = reply.into_products("http://backend:5000").unwrap_err();
        assert!(matches!(err, ClientError::Backend { .. }));
        assert_eq!(err.message(), "no valid .tif files found");
    }

    #[test]
    fn upload_reply_yields_stored_filename() {
        let reply: StatusReply =
            serde_json::from_str(r#"{"status": "success", "filename": "tile.tif"}"#)
                .expect("deserialize");
        assert_eq!(reply.into_filename().expect("filename"), "tile.tif");

        let no_name: StatusReply =
            serde_json::from_str(r#"{"status": "success"}"#).expect("deserialize");
        assert!(no_name.into_filename().is_err());
    }

    #[test]
    fn analyze_reply_is_an_ordered_sequence() {
        let reply: AnalyzeReply =
            serde_json::from_str(r#"{"scores": [0.2, 0.8, 0.5]}"#).expect("deserialize");
        assert_eq!(reply.scores, vec![0.2, 0.8, 0.5]);
    }

    #[test]
    fn preview_error_object_becomes_backend_error() {
        let err = feature_collection(serde_json::json!({"error": "Unsupported file"}))
            .unwrap_err();
        assert_eq!(err.message(), "Unsupported file");

        let not_geojson = feature_collection(serde_json::json!({"type": "Bogus"})).unwrap_err();
        assert!(not_geojson.message().contains("unexpected payload"));
    }

    #[test]
    fn url_join_handles_slashes_and_absolutes() {
        assert_eq!(join_url("http://b:5000/", "/p.png"), "http://b:5000/p.png");
        assert_eq!(join_url("http://b:5000", "p.png"), "http://b:5000/p.png");
        assert_eq!(
            join_url("http://b:5000", "https://cdn/x.png"),
            "https://cdn/x.png"
        );
    }
}
