use formats::VectorDocument;

use crate::operations::{OperationKind, OperationLedger, OperationStatus, SlotKey};
use crate::view_state::ViewState;

/// Display cap for the metadata preview table.
pub const METADATA_ROW_CAP: usize = 5;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LayerSource {
    Uploaded,
    RemotePreview,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapLayerPlan {
    pub name: String,
    pub source: LayerSource,
    pub feature_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRow {
    pub name: String,
    pub geometry_type: &'static str,
    pub vertex_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskChartPlan {
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePanel {
    pub title: &'static str,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub label: &'static str,
    pub url: String,
}

/// Everything the presentation surface needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub map_layers: Vec<MapLayerPlan>,
    pub metadata_rows: Vec<MetadataRow>,
    pub chart: Option<RiskChartPlan>,
    pub images: Vec<ImagePanel>,
    pub links: Vec<DownloadLink>,
    /// Slots still awaiting a completion; each one renders as a loading
    /// indicator, including a hung request that never completes.
    pub loading: Vec<SlotKey>,
    pub awaiting_upload: bool,
}

/// Derive the visible output from the current view and operation statuses.
///
/// Pure: reads a snapshot, mutates nothing, and is safe to call on every
/// event. A layer is shown only while its backing document is present and
/// its slot has not transitioned into Failed.
pub fn compose(view: &ViewState, ledger: &OperationLedger) -> RenderPlan {
    let mut map_layers = Vec::new();

    if let Some(doc) = &view.uploaded_vector
        && ledger.status(&SlotKey::of(OperationKind::UploadVector)) != OperationStatus::Failed
    {
        map_layers.push(MapLayerPlan {
            name: "uploaded".to_string(),
            source: LayerSource::Uploaded,
            feature_count: doc.len(),
        });
    }

    if let Some(doc) = &view.remote_preview
        && ledger.status(&SlotKey::of(OperationKind::VisualPreview)) != OperationStatus::Failed
    {
        map_layers.push(MapLayerPlan {
            name: "preview".to_string(),
            source: LayerSource::RemotePreview,
            feature_count: doc.len(),
        });
    }

    for (name, doc) in &view.background_layers {
        if ledger.status(&SlotKey::background_layer(name.clone())) == OperationStatus::Failed {
            continue;
        }
        map_layers.push(MapLayerPlan {
            name: name.clone(),
            source: LayerSource::Background,
            feature_count: doc.len(),
        });
    }

    let metadata_rows = match &view.uploaded_vector {
        Some(doc)
            if ledger.status(&SlotKey::of(OperationKind::UploadVector))
                != OperationStatus::Failed =>
        {
            table_rows(doc)
        }
        _ => Vec::new(),
    };

    let chart = if view.risk_scores.is_empty() {
        None
    } else {
        Some(RiskChartPlan {
            labels: (1..=view.risk_scores.len())
                .map(|i| format!("Zone {i}"))
                .collect(),
            scores: view.risk_scores.clone(),
        })
    };

    let mut images = Vec::new();
    let mut links = Vec::new();
    if let Some(products) = &view.derived_products {
        images.push(ImagePanel {
            title: "DEM preview",
            url: products.preview.clone(),
        });
        images.push(ImagePanel {
            title: "Slope map",
            url: products.slope_map.clone(),
        });
        links.push(DownloadLink {
            label: "Download DEM",
            url: products.merged_dem.clone(),
        });
        links.push(DownloadLink {
            label: "Download slope map",
            url: products.slope_map.clone(),
        });
        links.push(DownloadLink {
            label: "Preview image",
            url: products.preview.clone(),
        });
        links.push(DownloadLink {
            label: "Interactive map",
            url: products.interactive.clone(),
        });
    }

    let awaiting_upload = map_layers.is_empty();

    RenderPlan {
        map_layers,
        metadata_rows,
        chart,
        images,
        links,
        loading: ledger.pending_slots(),
        awaiting_upload,
    }
}

fn table_rows(doc: &VectorDocument) -> Vec<MetadataRow> {
    doc.features
        .iter()
        .take(METADATA_ROW_CAP)
        .enumerate()
        .map(|(idx, feature)| MetadataRow {
            name: feature
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Feature {}", idx + 1)),
            geometry_type: feature.geometry.type_name(),
            vertex_count: feature.geometry.vertex_count(),
        })
        .collect()
}
