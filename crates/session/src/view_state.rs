use std::collections::BTreeMap;

use formats::VectorDocument;
use serde::{Deserialize, Serialize};

use crate::operations::OperationOutput;

/// Artifact references produced by a terrain merge.
///
/// Partial success is not modeled: either all four references arrived
/// together or the operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedProducts {
    pub preview: String,
    pub slope_map: String,
    pub interactive: String,
    pub merged_dem: String,
}

/// The aggregate the renderer reads.
///
/// Created empty at startup and mutated only by operation completions.
/// Updates are whole-value replacement (`merge` returns a fresh value), so a
/// reader never observes a half-written field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub uploaded_vector: Option<VectorDocument>,
    pub remote_preview: Option<VectorDocument>,
    pub derived_products: Option<DerivedProducts>,
    pub background_layers: BTreeMap<String, VectorDocument>,
    pub risk_scores: Vec<f64>,
}

/// Fold one completed operation into the view.
///
/// Pure: replaces only the field owned by the output's kind and leaves every
/// other field byte-for-byte intact. Raster uploads and metadata exports own
/// no view field, so for them this is the identity.
pub fn merge(view: &ViewState, output: &OperationOutput) -> ViewState {
    let mut next = view.clone();
    match output {
        OperationOutput::VectorParsed(document) => {
            next.uploaded_vector = Some(document.clone());
        }
        OperationOutput::PreviewParsed(document) => {
            next.remote_preview = Some(document.clone());
        }
        OperationOutput::Products(products) => {
            next.derived_products = Some(products.clone());
        }
        OperationOutput::BackgroundLayer { name, document } => {
            next.background_layers.insert(name.clone(), document.clone());
        }
        OperationOutput::RiskScores(scores) => {
            next.risk_scores = scores.clone();
        }
        OperationOutput::RasterStored { .. } | OperationOutput::ExportStarted => {}
    }
    next
}
