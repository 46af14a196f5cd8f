use std::collections::BTreeMap;

use formats::VectorDocument;

use crate::view_state::DerivedProducts;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    UploadVector,
    UploadRaster,
    GenerateDerivedProducts,
    LoadBackgroundLayer,
    LoadRiskScores,
    ExportMetadata,
    VisualPreview,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::UploadVector => "boundary upload",
            OperationKind::UploadRaster => "elevation upload",
            OperationKind::GenerateDerivedProducts => "terrain processing",
            OperationKind::LoadBackgroundLayer => "background layer",
            OperationKind::LoadRiskScores => "risk analysis",
            OperationKind::ExportMetadata => "metadata export",
            OperationKind::VisualPreview => "visual preview",
        }
    }
}

/// Unit of supersession.
///
/// Background layers are keyed by name so that concurrently loading layers
/// never supersede each other; every other kind has exactly one slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub kind: OperationKind,
    pub layer: Option<String>,
}

impl SlotKey {
    pub fn of(kind: OperationKind) -> Self {
        Self { kind, layer: None }
    }

    pub fn background_layer(name: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::LoadBackgroundLayer,
            layer: Some(name.into()),
        }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.layer {
            Some(layer) => write!(f, "{} ({layer})", self.kind.label()),
            None => write!(f, "{}", self.kind.label()),
        }
    }
}

/// Monotonically increasing per-ledger completion token.
///
/// Small and copyable so it can travel through completion messages without
/// heap allocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Idle,
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The request could not be sent or produced no response.
    Transport { message: String },
    /// A response arrived but reported a semantic failure.
    Backend { message: String },
    /// Vector content could not be parsed into a document.
    Parse { message: String },
}

impl OperationError {
    pub fn message(&self) -> &str {
        match self {
            OperationError::Transport { message }
            | OperationError::Backend { message }
            | OperationError::Parse { message } => message,
        }
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationError::Transport { message } => write!(f, "transport error: {message}"),
            OperationError::Backend { message } => write!(f, "backend error: {message}"),
            OperationError::Parse { message } => write!(f, "parse error: {message}"),
        }
    }
}

impl std::error::Error for OperationError {}

/// Kind-specific success payload; the variant determines which `ViewState`
/// field the aggregator may replace.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    VectorParsed(VectorDocument),
    RasterStored { filename: String },
    Products(DerivedProducts),
    BackgroundLayer {
        name: String,
        document: VectorDocument,
    },
    RiskScores(Vec<f64>),
    PreviewParsed(VectorDocument),
    ExportStarted,
}

impl OperationOutput {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationOutput::VectorParsed(_) => OperationKind::UploadVector,
            OperationOutput::RasterStored { .. } => OperationKind::UploadRaster,
            OperationOutput::Products(_) => OperationKind::GenerateDerivedProducts,
            OperationOutput::BackgroundLayer { .. } => OperationKind::LoadBackgroundLayer,
            OperationOutput::RiskScores(_) => OperationKind::LoadRiskScores,
            OperationOutput::PreviewParsed(_) => OperationKind::VisualPreview,
            OperationOutput::ExportStarted => OperationKind::ExportMetadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationHandle {
    pub status: OperationStatus,
    pub generation: Generation,
    pub result: Option<OperationOutput>,
    pub error: Option<OperationError>,
}

/// Outcome of delivering a completion to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Applied(OperationStatus),
    /// The completion belonged to a superseded request; nothing changed.
    Stale,
}

/// Per-slot operation state with stale-result suppression.
///
/// Slots are keyed in a `BTreeMap` for stable traversal order, and the
/// generation counter is monotonic across the ledger, so replaying the same
/// sequence of calls always yields the same state.
#[derive(Debug, Default)]
pub struct OperationLedger {
    next_generation: u64,
    slots: BTreeMap<SlotKey, OperationHandle>,
}

impl OperationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the operation owning `slot`.
    ///
    /// A pending handle in the slot is superseded: its entry is replaced and
    /// its eventual completion will no longer match the current generation.
    pub fn begin(&mut self, slot: SlotKey) -> Generation {
        self.next_generation += 1;
        let generation = Generation(self.next_generation);
        self.slots.insert(
            slot,
            OperationHandle {
                status: OperationStatus::Pending,
                generation,
                result: None,
                error: None,
            },
        );
        generation
    }

    /// Deliver a completion.
    ///
    /// Applies only when `generation` still identifies the slot's pending
    /// handle; anything else is a stale completion and is dropped without
    /// touching the handle.
    pub fn settle(
        &mut self,
        slot: &SlotKey,
        generation: Generation,
        outcome: Result<OperationOutput, OperationError>,
    ) -> Settled {
        let Some(handle) = self.slots.get_mut(slot) else {
            return Settled::Stale;
        };
        if handle.generation != generation || handle.status != OperationStatus::Pending {
            return Settled::Stale;
        }

        match outcome {
            Ok(output) => {
                handle.status = OperationStatus::Succeeded;
                handle.result = Some(output);
                handle.error = None;
            }
            Err(error) => {
                handle.status = OperationStatus::Failed;
                handle.result = None;
                handle.error = Some(error);
            }
        }
        Settled::Applied(handle.status)
    }

    pub fn handle(&self, slot: &SlotKey) -> Option<&OperationHandle> {
        self.slots.get(slot)
    }

    /// Idle when the slot has never been begun.
    pub fn status(&self, slot: &SlotKey) -> OperationStatus {
        self.slots
            .get(slot)
            .map(|h| h.status)
            .unwrap_or(OperationStatus::Idle)
    }

    /// Slots currently awaiting a completion, in stable key order.
    pub fn pending_slots(&self) -> Vec<SlotKey> {
        self.slots
            .iter()
            .filter(|(_, h)| h.status == OperationStatus::Pending)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        OperationError, OperationKind, OperationLedger, OperationOutput, OperationStatus,
        Settled, SlotKey,
    };

    fn scores(values: &[f64]) -> OperationOutput {
        OperationOutput::RiskScores(values.to_vec())
    }

    #[test]
    fn idle_until_begun_then_pending() {
        let mut ledger = OperationLedger::new();
        let slot = SlotKey::of(OperationKind::LoadRiskScores);
        assert_eq!(ledger.status(&slot), OperationStatus::Idle);

        ledger.begin(slot.clone());
        assert_eq!(ledger.status(&slot), OperationStatus::Pending);
        assert_eq!(ledger.pending_slots(), vec![slot]);
    }

    #[test]
    fn success_records_result() {
        let mut ledger = OperationLedger::new();
        let slot = SlotKey::of(OperationKind::LoadRiskScores);
        let generation = ledger.begin(slot.clone());

        let settled = ledger.settle(&slot, generation, Ok(scores(&[1.0, 2.0])));
        assert_eq!(settled, Settled::Applied(OperationStatus::Succeeded));

        let handle = ledger.handle(&slot).expect("handle");
        assert_eq!(handle.result, Some(scores(&[1.0, 2.0])));
        assert!(handle.error.is_none());
    }

    #[test]
    fn failure_records_error_without_result() {
        let mut ledger = OperationLedger::new();
        let slot = SlotKey::of(OperationKind::GenerateDerivedProducts);
        let generation = ledger.begin(slot.clone());

        let err = OperationError::Backend {
            message: "merge failed".to_string(),
        };
        let settled = ledger.settle(&slot, generation, Err(err.clone()));
        assert_eq!(settled, Settled::Applied(OperationStatus::Failed));

        let handle = ledger.handle(&slot).expect("handle");
        assert!(handle.result.is_none());
        assert_eq!(handle.error, Some(err));
    }

    #[test]
    fn superseded_completion_is_dropped() {
        let mut ledger = OperationLedger::new();
        let slot = SlotKey::of(OperationKind::LoadRiskScores);
        let first = ledger.begin(slot.clone());
        let second = ledger.begin(slot.clone());
        assert_ne!(first, second);

        // The superseded request finishes late; the ledger must ignore it.
        assert_eq!(
            ledger.settle(&slot, first, Ok(scores(&[9.0]))),
            Settled::Stale
        );
        assert_eq!(ledger.status(&slot), OperationStatus::Pending);

        assert_eq!(
            ledger.settle(&slot, second, Ok(scores(&[1.0]))),
            Settled::Applied(OperationStatus::Succeeded)
        );
        let handle = ledger.handle(&slot).expect("handle");
        assert_eq!(handle.result, Some(scores(&[1.0])));
    }

    #[test]
    fn duplicate_completion_is_stale() {
        let mut ledger = OperationLedger::new();
        let slot = SlotKey::of(OperationKind::ExportMetadata);
        let generation = ledger.begin(slot.clone());

        assert_eq!(
            ledger.settle(&slot, generation, Ok(OperationOutput::ExportStarted)),
            Settled::Applied(OperationStatus::Succeeded)
        );
        assert_eq!(
            ledger.settle(&slot, generation, Ok(OperationOutput::ExportStarted)),
            Settled::Stale
        );
    }

    #[test]
    fn background_layers_track_independently() {
        let mut ledger = OperationLedger::new();
        let restricted = SlotKey::background_layer("restricted");
        let zones = SlotKey::background_layer("zones");

        let g_restricted = ledger.begin(restricted.clone());
        let g_zones = ledger.begin(zones.clone());

        // Beginning one layer must not supersede the other.
        assert_eq!(ledger.pending_slots().len(), 2);

        let layer = |name: &str| OperationOutput::BackgroundLayer {
            name: name.to_string(),
            document: formats::VectorDocument::default(),
        };
        assert_eq!(
            ledger.settle(&restricted, g_restricted, Ok(layer("restricted"))),
            Settled::Applied(OperationStatus::Succeeded)
        );
        assert_eq!(ledger.status(&zones), OperationStatus::Pending);
        assert_eq!(
            ledger.settle(&zones, g_zones, Ok(layer("zones"))),
            Settled::Applied(OperationStatus::Succeeded)
        );
    }
}
