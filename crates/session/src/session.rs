use crate::notify::{Notification, NotificationQueue, Severity};
use crate::operations::{
    Generation, OperationError, OperationLedger, OperationOutput, OperationStatus, Settled,
    SlotKey,
};
use crate::render::{self, RenderPlan};
use crate::view_state::{self, ViewState};

/// Session-scoped orchestrator state: the operation ledger, the aggregated
/// view, and the pending UI signals.
///
/// One instance owns all mutable state for a dashboard session. Completions
/// must be applied from a single logical consumer; each `complete` call is
/// one atomic step from the renderer's point of view.
#[derive(Debug, Default)]
pub struct Session {
    ledger: OperationLedger,
    view: ViewState,
    notifications: NotificationQueue,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or supersede) the operation owning `slot`.
    pub fn begin(&mut self, slot: SlotKey) -> Generation {
        self.ledger.begin(slot)
    }

    /// Deliver a completion for `slot`.
    ///
    /// Stale completions change nothing and produce no signal. Applied
    /// completions update the handle, fold success payloads into the view,
    /// and enqueue at most one toast for the transition.
    pub fn complete(
        &mut self,
        slot: &SlotKey,
        generation: Generation,
        outcome: Result<OperationOutput, OperationError>,
    ) -> Settled {
        let settled = self.ledger.settle(slot, generation, outcome);
        let Settled::Applied(status) = settled else {
            return settled;
        };

        match status {
            OperationStatus::Succeeded => {
                if let Some(output) = self.ledger.handle(slot).and_then(|h| h.result.clone()) {
                    self.view = view_state::merge(&self.view, &output);
                    if let Some(note) = success_toast(&output) {
                        self.notifications.push(note);
                    }
                    if let OperationOutput::Products(products) = &output {
                        self.notifications
                            .push(Notification::open(products.interactive.clone()));
                    }
                }
            }
            OperationStatus::Failed => {
                let message = self
                    .ledger
                    .handle(slot)
                    .and_then(|h| h.error.as_ref())
                    .map(|e| e.message().to_string())
                    .unwrap_or_default();
                self.notifications.push(Notification::error(format!(
                    "{} failed: {message}",
                    slot.kind.label()
                )));
            }
            OperationStatus::Idle | OperationStatus::Pending => {}
        }

        settled
    }

    /// Report a classifier-boundary rejection (unrecognized file, malformed
    /// content detected before any operation started).
    pub fn notify(&mut self, severity: Severity, message: impl Into<String>) {
        self.notifications.push(Notification::Toast {
            severity,
            message: message.into(),
        });
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn ledger(&self) -> &OperationLedger {
        &self.ledger
    }

    pub fn status(&self, slot: &SlotKey) -> OperationStatus {
        self.ledger.status(slot)
    }

    pub fn compose(&self) -> RenderPlan {
        render::compose(&self.view, &self.ledger)
    }

    /// Hand the queued signals to the presentation collaborator, once.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain()
    }
}

fn success_toast(output: &OperationOutput) -> Option<Notification> {
    match output {
        OperationOutput::VectorParsed(doc) => Some(Notification::info(format!(
            "boundary file loaded: {} features",
            doc.len()
        ))),
        OperationOutput::RasterStored { filename } => Some(Notification::info(format!(
            "elevation tile uploaded: {filename}"
        ))),
        OperationOutput::Products(_) => Some(Notification::info("terrain products ready")),
        OperationOutput::PreviewParsed(doc) => Some(Notification::info(format!(
            "preview loaded: {} features",
            doc.len()
        ))),
        OperationOutput::ExportStarted => Some(Notification::info("metadata export started")),
        // Context data loads silently; only failures surface.
        OperationOutput::BackgroundLayer { .. } | OperationOutput::RiskScores(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use formats::{Feature, GeoPoint, Geometry, VectorDocument};
    use pretty_assertions::assert_eq;

    use super::Session;
    use crate::notify::{Notification, Severity};
    use crate::operations::{
        OperationError, OperationKind, OperationOutput, OperationStatus, Settled, SlotKey,
    };
    use crate::view_state::DerivedProducts;

    fn doc(feature_count: usize) -> VectorDocument {
        let features = (0..feature_count)
            .map(|i| Feature {
                id: None,
                properties: serde_json::Map::new(),
                geometry: Geometry::Point(GeoPoint::new(i as f64, 0.0)),
            })
            .collect();
        VectorDocument { features }
    }

    fn products() -> DerivedProducts {
        DerivedProducts {
            preview: "http://b/p.png".to_string(),
            slope_map: "http://b/s.png".to_string(),
            interactive: "http://b/i.html".to_string(),
            merged_dem: "http://b/m.tif".to_string(),
        }
    }

    #[test]
    fn superseded_upload_never_reaches_the_view() {
        let mut session = Session::new();
        let slot = SlotKey::of(OperationKind::UploadVector);

        let first = session.begin(slot.clone());
        let second = session.begin(slot.clone());

        // First upload finishes after being superseded: dropped silently.
        assert_eq!(
            session.complete(&slot, first, Ok(OperationOutput::VectorParsed(doc(9)))),
            Settled::Stale
        );
        assert_eq!(session.view().uploaded_vector, None);
        assert!(session.drain_notifications().is_empty());

        assert_eq!(
            session.complete(&slot, second, Ok(OperationOutput::VectorParsed(doc(3)))),
            Settled::Applied(OperationStatus::Succeeded)
        );
        assert_eq!(session.view().uploaded_vector, Some(doc(3)));
    }

    #[test]
    fn failed_merge_keeps_previous_products_and_toasts_once() {
        let mut session = Session::new();
        let slot = SlotKey::of(OperationKind::GenerateDerivedProducts);

        let generation = session.begin(slot.clone());
        session.complete(
            &slot,
            generation,
            Ok(OperationOutput::Products(products())),
        );
        let _ = session.drain_notifications();

        let generation = session.begin(slot.clone());
        session.complete(
            &slot,
            generation,
            Err(OperationError::Backend {
                message: "no rasters in folder".to_string(),
            }),
        );

        assert_eq!(session.view().derived_products, Some(products()));
        assert_eq!(session.status(&slot), OperationStatus::Failed);

        let notes = session.drain_notifications();
        assert_eq!(notes.len(), 1);
        assert!(matches!(
            &notes[0],
            Notification::Toast { severity: Severity::Error, message }
                if message.contains("no rasters in folder")
        ));
        // Draining again yields nothing: one toast per transition.
        assert!(session.drain_notifications().is_empty());
    }

    #[test]
    fn failed_vector_parse_leaves_upload_unchanged() {
        let mut session = Session::new();
        let slot = SlotKey::of(OperationKind::UploadVector);

        let generation = session.begin(slot.clone());
        session.complete(&slot, generation, Ok(OperationOutput::VectorParsed(doc(2))));
        let _ = session.drain_notifications();

        let generation = session.begin(slot.clone());
        session.complete(
            &slot,
            generation,
            Err(OperationError::Parse {
                message: "malformed JSON: expected value".to_string(),
            }),
        );

        assert_eq!(session.view().uploaded_vector, Some(doc(2)));
        assert_eq!(session.status(&slot), OperationStatus::Failed);
        assert_eq!(session.drain_notifications().len(), 1);
    }

    #[test]
    fn successful_merge_signals_toast_and_external_open() {
        let mut session = Session::new();
        let slot = SlotKey::of(OperationKind::GenerateDerivedProducts);
        let generation = session.begin(slot.clone());
        session.complete(
            &slot,
            generation,
            Ok(OperationOutput::Products(products())),
        );

        let notes = session.drain_notifications();
        assert_eq!(notes.len(), 2);
        assert_eq!(
            notes[1],
            Notification::open("http://b/i.html".to_string())
        );
    }

    #[test]
    fn background_layers_complete_in_any_order() {
        let mut session = Session::new();
        let restricted = SlotKey::background_layer("restricted");
        let zones = SlotKey::background_layer("zones");

        let g_restricted = session.begin(restricted.clone());
        let g_zones = session.begin(zones.clone());

        // Reverse completion order relative to the begins.
        session.complete(
            &zones,
            g_zones,
            Ok(OperationOutput::BackgroundLayer {
                name: "zones".to_string(),
                document: doc(2),
            }),
        );
        session.complete(
            &restricted,
            g_restricted,
            Ok(OperationOutput::BackgroundLayer {
                name: "restricted".to_string(),
                document: doc(1),
            }),
        );

        assert_eq!(session.view().background_layers.len(), 2);
        assert_eq!(session.view().background_layers["restricted"], doc(1));
        assert_eq!(session.view().background_layers["zones"], doc(2));
        // Context loads succeed silently.
        assert!(session.drain_notifications().is_empty());
    }

    #[test]
    fn classifier_rejection_is_reported_without_an_operation() {
        let mut session = Session::new();
        session.notify(Severity::Error, "unsupported file type: notes.txt");

        assert!(session.ledger().pending_slots().is_empty());
        let notes = session.drain_notifications();
        assert_eq!(notes.len(), 1);
    }
}
