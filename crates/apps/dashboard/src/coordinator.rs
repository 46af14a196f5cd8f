use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use client::BackendClient;
use formats::{ClassifiedUpload, UploadClass, UploadedFile, classify_upload};
use session::{
    Generation, Notification, OperationError, OperationKind, OperationOutput, OperationStatus,
    RenderPlan, Session, Settled, Severity, SlotKey,
};

/// Completion message delivered from a finished backend task.
#[derive(Debug)]
pub struct Completion {
    pub slot: SlotKey,
    pub generation: Generation,
    pub outcome: Result<OperationOutput, OperationError>,
}

/// Drives the per-operation lifecycles.
///
/// Every started operation issues exactly one backend task; the task's only
/// side channel is the completion message sent back here. All session
/// mutation happens in `apply`, on the caller's single event loop.
pub struct Coordinator {
    session: Session,
    client: Arc<BackendClient>,
    completions: mpsc::UnboundedSender<Completion>,
    merge_folder: String,
    raster_ready: bool,
}

impl Coordinator {
    pub fn new(
        client: Arc<BackendClient>,
        completions: mpsc::UnboundedSender<Completion>,
        merge_folder: String,
    ) -> Self {
        Self {
            session: Session::new(),
            client,
            completions,
            merge_folder,
            raster_ready: false,
        }
    }

    /// Route an upload to the right ingestion path.
    ///
    /// Unrecognized extensions are rejected here, before any operation
    /// starts. Vector parsing runs on a blocking thread inside the
    /// `UploadVector` lifecycle so large documents never stall the loop.
    pub fn submit_upload(&mut self, file: UploadedFile) {
        match formats::upload_class(&file.name) {
            UploadClass::Unrecognized => {
                self.session
                    .notify(Severity::Error, format!("unsupported file type: {}", file.name));
            }
            UploadClass::RasterImage => {
                let slot = SlotKey::of(OperationKind::UploadRaster);
                let generation = self.session.begin(slot.clone());
                let client = Arc::clone(&self.client);
                self.dispatch(slot, generation, async move {
                    client
                        .upload_raster(&file.name, file.bytes)
                        .await
                        .map(|filename| OperationOutput::RasterStored { filename })
                        .map_err(|e| e.to_operation_error())
                });
            }
            UploadClass::VectorText => {
                let slot = SlotKey::of(OperationKind::UploadVector);
                let generation = self.session.begin(slot.clone());
                self.dispatch(slot, generation, async move {
                    let parsed = tokio::task::spawn_blocking(move || classify_upload(file))
                        .await
                        .map_err(|e| OperationError::Parse {
                            message: format!("parse task failed: {e}"),
                        })?;
                    match parsed {
                        Ok(ClassifiedUpload::Vector(doc)) => {
                            Ok(OperationOutput::VectorParsed(doc))
                        }
                        Ok(ClassifiedUpload::Raster { name, .. }) => {
                            Err(OperationError::Parse {
                                message: format!("{name} is not a vector document"),
                            })
                        }
                        Err(err) => Err(OperationError::Parse {
                            message: err.to_string(),
                        }),
                    }
                });
            }
        }
    }

    /// Server-side parse preview of an uploaded file.
    pub fn submit_preview(&mut self, file: UploadedFile) {
        let slot = SlotKey::of(OperationKind::VisualPreview);
        let generation = self.session.begin(slot.clone());
        let client = Arc::clone(&self.client);
        self.dispatch(slot, generation, async move {
            client
                .visual_preview(&file.name, file.bytes)
                .await
                .map(OperationOutput::PreviewParsed)
                .map_err(|e| e.to_operation_error())
        });
    }

    /// Merge the uploaded rasters and derive terrain products.
    ///
    /// Requesting a merge before any raster upload succeeded is a
    /// precondition violation: settled locally as a failure, no request sent.
    pub fn generate_products(&mut self) {
        let slot = SlotKey::of(OperationKind::GenerateDerivedProducts);
        let generation = self.session.begin(slot.clone());

        if !self.raster_ready {
            self.apply(Completion {
                slot,
                generation,
                outcome: Err(OperationError::Backend {
                    message: "no elevation tiles uploaded yet".to_string(),
                }),
            });
            return;
        }

        let client = Arc::clone(&self.client);
        let folder = self.merge_folder.clone();
        self.dispatch(slot, generation, async move {
            client
                .merge_dem(&folder)
                .await
                .map(OperationOutput::Products)
                .map_err(|e| e.to_operation_error())
        });
    }

    pub fn load_background_layer(&mut self, name: &str, path: &str) {
        let slot = SlotKey::background_layer(name);
        let generation = self.session.begin(slot.clone());
        let client = Arc::clone(&self.client);
        let name = name.to_string();
        let path = path.to_string();
        self.dispatch(slot, generation, async move {
            client
                .fetch_layer(&path)
                .await
                .map(|document| OperationOutput::BackgroundLayer { name, document })
                .map_err(|e| e.to_operation_error())
        });
    }

    pub fn load_risk_scores(&mut self) {
        let slot = SlotKey::of(OperationKind::LoadRiskScores);
        let generation = self.session.begin(slot.clone());
        let client = Arc::clone(&self.client);
        self.dispatch(slot, generation, async move {
            client
                .risk_scores()
                .await
                .map(OperationOutput::RiskScores)
                .map_err(|e| e.to_operation_error())
        });
    }

    pub fn start_export(&mut self) {
        let slot = SlotKey::of(OperationKind::ExportMetadata);
        let generation = self.session.begin(slot.clone());
        let client = Arc::clone(&self.client);
        self.dispatch(slot, generation, async move {
            client
                .start_export()
                .await
                .map(|()| OperationOutput::ExportStarted)
                .map_err(|e| e.to_operation_error())
        });
    }

    /// Apply a completion on the event loop; stale completions are dropped
    /// silently (not an error, not a toast).
    pub fn apply(&mut self, completion: Completion) -> Settled {
        let settled = self.session.complete(
            &completion.slot,
            completion.generation,
            completion.outcome,
        );
        match &settled {
            Settled::Stale => {
                debug!("dropping stale completion for {}", completion.slot);
            }
            Settled::Applied(OperationStatus::Succeeded)
                if completion.slot.kind == OperationKind::UploadRaster =>
            {
                // Merge eligibility is a coordinator policy, not aggregator state.
                self.raster_ready = true;
            }
            Settled::Applied(_) => {}
        }
        settled
    }

    pub fn reject_unreadable(&mut self, path: &str, err: &std::io::Error) {
        self.session
            .notify(Severity::Error, format!("could not read {path}: {err}"));
    }

    pub fn compose(&self) -> RenderPlan {
        self.session.compose()
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.session.drain_notifications()
    }

    fn dispatch<F>(&self, slot: SlotKey, generation: Generation, work: F)
    where
        F: Future<Output = Result<OperationOutput, OperationError>> + Send + 'static,
    {
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let outcome = work.await;
            // The loop may already be gone on shutdown; nothing to do then.
            let _ = tx.send(Completion {
                slot,
                generation,
                outcome,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use client::BackendClient;
    use session::{Notification, OperationKind, OperationStatus, Severity, SlotKey};
    use tokio::sync::mpsc;

    use super::Coordinator;

    #[test]
    fn merge_before_raster_upload_fails_locally() {
        let client = Arc::new(BackendClient::new("http://localhost:5000", "key"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = Coordinator::new(client, tx, "Uploads/input".to_string());

        coordinator.generate_products();

        let slot = SlotKey::of(OperationKind::GenerateDerivedProducts);
        assert_eq!(
            coordinator.session.status(&slot),
            OperationStatus::Failed
        );
        assert!(coordinator.session.view().derived_products.is_none());

        let notes = coordinator.drain_notifications();
        assert_eq!(notes.len(), 1);
        assert!(matches!(
            &notes[0],
            Notification::Toast { severity: Severity::Error, message }
                if message.contains("no elevation tiles uploaded yet")
        ));

        // No request was issued, so no completion can arrive.
        assert!(rx.try_recv().is_err());
    }
}

