use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::launch::DriverTab;
use crate::error::{AppError, ErrorKind, ValidationError};
use crate::location::PermissionStatus;
use crate::media::PhotoSource;
use crate::models::order::{OrderDetail, OrderId};
use crate::models::proof::{DeliveryProof, ProofDraft, ProofReceipt};

#[async_trait]
pub trait OrderDetailSource: Send + Sync {
    async fn order_detail(&self, id: &OrderId) -> Result<OrderDetail, AppError>;
}

/// Where a confirmed delivery proof goes.
#[async_trait]
pub trait ProofSink: Send + Sync {
    async fn submit(&self, order_id: &OrderId, proof: DeliveryProof) -> Result<ProofReceipt, AppError>;
}

/// Keeps confirmed proofs on the device until an upload path exists.
#[derive(Default)]
pub struct DeferredProofSink {
    pending: DashMap<Uuid, ProofReceipt>,
}

impl DeferredProofSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<ProofReceipt> {
        let mut receipts: Vec<ProofReceipt> =
            self.pending.iter().map(|entry| entry.value().clone()).collect();
        receipts.sort_by_key(|receipt| receipt.recorded_at);
        receipts
    }
}

#[async_trait]
impl ProofSink for DeferredProofSink {
    async fn submit(&self, order_id: &OrderId, proof: DeliveryProof) -> Result<ProofReceipt, AppError> {
        let receipt = ProofReceipt {
            id: Uuid::new_v4(),
            order_id: order_id.clone(),
            proof,
            recorded_at: Utc::now(),
        };
        self.pending.insert(receipt.id, receipt.clone());

        info!(
            order_id = %receipt.order_id,
            receipt_id = %receipt.id,
            quantity = receipt.proof.delivered_quantity,
            "delivery proof queued"
        );
        Ok(receipt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryStage {
    Assigned,
    ViewingDetail {
        detail: OrderDetail,
    },
    DetailUnavailable {
        order_id: OrderId,
        kind: ErrorKind,
        message: String,
    },
    Arrived {
        detail: OrderDetail,
        draft: ProofDraft,
    },
    AwaitingConfirmation {
        detail: OrderDetail,
        draft: ProofDraft,
        proof: DeliveryProof,
        prompt: String,
    },
    Completed {
        receipt: ProofReceipt,
    },
}

impl DeliveryStage {
    pub fn name(&self) -> &'static str {
        match self {
            DeliveryStage::Assigned => "assigned",
            DeliveryStage::ViewingDetail { .. } => "viewing detail",
            DeliveryStage::DetailUnavailable { .. } => "detail unavailable",
            DeliveryStage::Arrived { .. } => "arrived",
            DeliveryStage::AwaitingConfirmation { .. } => "awaiting confirmation",
            DeliveryStage::Completed { .. } => "completed",
        }
    }

    /// Where the driver lands once this stage is left behind.
    pub fn next_tab(&self) -> Option<DriverTab> {
        match self {
            DeliveryStage::Completed { .. } => Some(DriverTab::History),
            _ => None,
        }
    }
}

pub fn confirmation_prompt(quantity: u32) -> String {
    format!("Has the order of {quantity} pack(s) really been delivered with photo proof?")
}

/// One driver's walk through a single order:
/// assigned → viewing detail → arrived → (confirm) → completed.
pub struct DeliveryFlow {
    details: Arc<dyn OrderDetailSource>,
    photos: Arc<dyn PhotoSource>,
    sink: Arc<dyn ProofSink>,
    stage: DeliveryStage,
}

impl DeliveryFlow {
    pub fn new(
        details: Arc<dyn OrderDetailSource>,
        photos: Arc<dyn PhotoSource>,
        sink: Arc<dyn ProofSink>,
    ) -> Self {
        Self {
            details,
            photos,
            sink,
            stage: DeliveryStage::Assigned,
        }
    }

    pub fn stage(&self) -> &DeliveryStage {
        &self.stage
    }

    /// Fetch failures and payloads without a customer land in
    /// `DetailUnavailable`; only an out-of-order call returns `Err`.
    pub async fn select(&mut self, order_id: OrderId) -> Result<&DeliveryStage, AppError> {
        match self.stage {
            DeliveryStage::Assigned | DeliveryStage::DetailUnavailable { .. } => {}
            _ => return Err(self.invalid("select an order")),
        }
        self.load_detail(order_id).await;
        Ok(&self.stage)
    }

    pub async fn retry(&mut self) -> Result<&DeliveryStage, AppError> {
        let DeliveryStage::DetailUnavailable { order_id, .. } = &self.stage else {
            return Err(self.invalid("retry"));
        };
        let order_id = order_id.clone();
        self.load_detail(order_id).await;
        Ok(&self.stage)
    }

    pub fn back(&mut self) -> Result<(), AppError> {
        match self.stage {
            DeliveryStage::ViewingDetail { .. }
            | DeliveryStage::DetailUnavailable { .. }
            | DeliveryStage::Arrived { .. } => {
                self.stage = DeliveryStage::Assigned;
                Ok(())
            }
            _ => Err(self.invalid("go back")),
        }
    }

    /// Local transition only; the backend is not told.
    pub fn mark_arrived(&mut self) -> Result<(), AppError> {
        match mem::replace(&mut self.stage, DeliveryStage::Assigned) {
            DeliveryStage::ViewingDetail { detail } => {
                info!(order_id = %detail.id, "driver arrived");
                self.stage = DeliveryStage::Arrived {
                    detail,
                    draft: ProofDraft::default(),
                };
                Ok(())
            }
            other => {
                self.stage = other;
                Err(self.invalid("mark arrived"))
            }
        }
    }

    /// Picks a proof photo from the gallery. Returns `Ok(false)` when the
    /// driver cancels; the draft keeps whatever photo it had.
    pub async fn attach_photo(&mut self) -> Result<bool, AppError> {
        self.draft_mut("attach a photo")?;

        let permission = self.photos.request_media_permission().await;
        if permission != PermissionStatus::Granted {
            warn!(?permission, "gallery permission not granted");
            return Err(AppError::GalleryPermissionDenied);
        }

        let Some(reference) = self.photos.pick_photo().await? else {
            return Ok(false);
        };
        self.draft_mut("attach a photo")?.photo = Some(reference);
        Ok(true)
    }

    pub fn set_quantity(&mut self, input: impl Into<String>) -> Result<(), AppError> {
        let draft = self.draft_mut("enter a quantity")?;
        draft.quantity_input = input.into();
        Ok(())
    }

    /// First half of completion: validates the draft and asks for
    /// confirmation. Nothing is submitted yet.
    pub fn request_completion(&mut self) -> Result<&str, AppError> {
        match mem::replace(&mut self.stage, DeliveryStage::Assigned) {
            DeliveryStage::Arrived { detail, draft } => match draft.validate() {
                Ok(proof) => {
                    let prompt = confirmation_prompt(proof.delivered_quantity);
                    self.stage = DeliveryStage::AwaitingConfirmation {
                        detail,
                        draft,
                        proof,
                        prompt,
                    };
                    match &self.stage {
                        DeliveryStage::AwaitingConfirmation { prompt, .. } => Ok(prompt),
                        _ => Err(AppError::Internal("confirmation prompt missing".into())),
                    }
                }
                Err(err) => {
                    self.stage = DeliveryStage::Arrived { detail, draft };
                    Err(err.into())
                }
            },
            other => {
                self.stage = other;
                Err(self.invalid("complete the delivery"))
            }
        }
    }

    pub fn cancel_confirmation(&mut self) -> Result<(), AppError> {
        match mem::replace(&mut self.stage, DeliveryStage::Assigned) {
            DeliveryStage::AwaitingConfirmation { detail, draft, .. } => {
                self.stage = DeliveryStage::Arrived { detail, draft };
                Ok(())
            }
            other => {
                self.stage = other;
                Err(self.invalid("cancel confirmation"))
            }
        }
    }

    /// Second half of completion. On a sink failure the flow stays in
    /// `AwaitingConfirmation` so the driver can confirm again.
    pub async fn confirm(&mut self) -> Result<&ProofReceipt, AppError> {
        let (order_id, proof) = match &self.stage {
            DeliveryStage::AwaitingConfirmation { detail, proof, .. } => {
                (detail.id.clone(), proof.clone())
            }
            _ => return Err(self.invalid("confirm")),
        };

        let receipt = self.sink.submit(&order_id, proof).await.inspect_err(|err| {
            warn!(order_id = %order_id, error = %err, "failed to record delivery proof");
        })?;

        info!(order_id = %order_id, "delivery completed");
        self.stage = DeliveryStage::Completed { receipt };
        match &self.stage {
            DeliveryStage::Completed { receipt } => Ok(receipt),
            _ => Err(AppError::Internal("completion receipt missing".into())),
        }
    }

    async fn load_detail(&mut self, order_id: OrderId) {
        let result: Result<OrderDetail, AppError> = if order_id.as_str().trim().is_empty() {
            Err(ValidationError::MissingOrderId.into())
        } else {
            self.details.order_detail(&order_id).await
        };

        self.stage = match result {
            Ok(detail) => {
                info!(order_id = %detail.id, "order detail loaded");
                DeliveryStage::ViewingDetail { detail }
            }
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "order detail unavailable");
                DeliveryStage::DetailUnavailable {
                    order_id,
                    kind: err.kind(),
                    message: err.user_message(),
                }
            }
        };
    }

    fn draft_mut(&mut self, action: &'static str) -> Result<&mut ProofDraft, AppError> {
        let stage = self.stage.name();
        match &mut self.stage {
            DeliveryStage::Arrived { draft, .. } => Ok(draft),
            _ => Err(AppError::InvalidTransition { action, stage }),
        }
    }

    fn invalid(&self, action: &'static str) -> AppError {
        AppError::InvalidTransition {
            action,
            stage: self.stage.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::models::order::{Customer, OrderStatus};

    struct StaticDetails {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl OrderDetailSource for StaticDetails {
        async fn order_detail(&self, id: &OrderId) -> Result<OrderDetail, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(AppError::NoResponse("connection timed out".into()));
            }
            Ok(OrderDetail {
                id: id.clone(),
                status: OrderStatus::Proses,
                customer: Customer {
                    name: Some("Budi".into()),
                    phone: Some("0812".into()),
                    address: Some("Jl. Kenanga 3".into()),
                },
                quantity_packs: 9,
            })
        }
    }

    /// Hands out `picks` in order; `None` is a cancelled picker.
    struct Gallery {
        permission: PermissionStatus,
        picks: Mutex<VecDeque<Option<&'static str>>>,
    }

    impl Gallery {
        fn new(permission: PermissionStatus, picks: Vec<Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                permission,
                picks: Mutex::new(picks.into()),
            })
        }
    }

    #[async_trait]
    impl PhotoSource for Gallery {
        async fn request_media_permission(&self) -> PermissionStatus {
            self.permission
        }

        async fn pick_photo(&self) -> Result<Option<String>, AppError> {
            let pick = self.picks.lock().unwrap().pop_front().flatten();
            Ok(pick.map(str::to_string))
        }
    }

    fn flow_with(fail_first: bool, photos: Arc<Gallery>) -> (DeliveryFlow, Arc<DeferredProofSink>) {
        let sink = Arc::new(DeferredProofSink::new());
        let details = Arc::new(StaticDetails {
            calls: AtomicUsize::new(0),
            fail_first,
        });
        (DeliveryFlow::new(details, photos, sink.clone()), sink)
    }

    fn flow(fail_first: bool) -> (DeliveryFlow, Arc<DeferredProofSink>) {
        let photos = Gallery::new(PermissionStatus::Granted, vec![Some("file:///bukti.jpg")]);
        flow_with(fail_first, photos)
    }

    fn photo(stage: &DeliveryStage) -> Option<&str> {
        match stage {
            DeliveryStage::Arrived { draft, .. } => draft.photo.as_deref(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn walks_from_assigned_to_completed() {
        let (mut flow, sink) = flow(false);

        flow.select(OrderId::new("11")).await.unwrap();
        assert_eq!(flow.stage().name(), "viewing detail");

        flow.mark_arrived().unwrap();
        assert!(flow.attach_photo().await.unwrap());
        flow.set_quantity("9").unwrap();

        let prompt = flow.request_completion().unwrap().to_string();
        assert!(prompt.contains("9 pack"));
        assert!(sink.pending().is_empty());

        let receipt = flow.confirm().await.unwrap().clone();
        assert_eq!(receipt.order_id.as_str(), "11");
        assert_eq!(receipt.proof.delivered_quantity, 9);
        assert_eq!(receipt.proof.photo_local_reference, "file:///bukti.jpg");
        assert_eq!(sink.pending(), vec![receipt]);
        assert_eq!(flow.stage().next_tab(), Some(DriverTab::History));
        assert_eq!(DriverTab::History.path(), "/driver/riwayat");
    }

    #[tokio::test]
    async fn denied_gallery_blocks_photo_with_its_own_error() {
        let (mut flow, _sink) = flow_with(
            false,
            Gallery::new(PermissionStatus::Denied, vec![Some("file:///bukti.jpg")]),
        );
        flow.select(OrderId::new("11")).await.unwrap();
        flow.mark_arrived().unwrap();

        let err = flow.attach_photo().await.unwrap_err();
        assert!(matches!(err, AppError::GalleryPermissionDenied));
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_ne!(
            err.user_message(),
            AppError::from(ValidationError::MissingPhoto).user_message()
        );
        assert_eq!(photo(flow.stage()), None);
        assert_eq!(flow.stage().next_tab(), None);
    }

    #[tokio::test]
    async fn cancelled_pick_keeps_the_previous_photo() {
        let (mut flow, _sink) = flow_with(
            false,
            Gallery::new(PermissionStatus::Granted, vec![Some("file:///first.jpg"), None]),
        );
        flow.select(OrderId::new("11")).await.unwrap();
        flow.mark_arrived().unwrap();

        assert!(flow.attach_photo().await.unwrap());
        assert!(!flow.attach_photo().await.unwrap());
        assert_eq!(photo(flow.stage()), Some("file:///first.jpg"));
    }

    #[tokio::test]
    async fn photo_cannot_be_attached_before_arrival() {
        let (mut flow, _sink) = flow(false);
        flow.select(OrderId::new("11")).await.unwrap();
        assert!(matches!(
            flow.attach_photo().await,
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn validation_failures_keep_the_driver_on_the_proof_step() {
        let (mut flow, sink) = flow(false);
        flow.select(OrderId::new("11")).await.unwrap();
        flow.mark_arrived().unwrap();
        flow.set_quantity("9").unwrap();

        let err = flow.request_completion().unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::MissingPhoto)));

        assert!(flow.attach_photo().await.unwrap());
        for bad in ["0", "-3", "abc"] {
            flow.set_quantity(bad).unwrap();
            let err = flow.request_completion().unwrap_err();
            assert!(matches!(err, AppError::Validation(ValidationError::InvalidQuantity(_))));
            assert_eq!(flow.stage().name(), "arrived");
        }
        assert!(sink.pending().is_empty());
    }

    #[tokio::test]
    async fn cancelling_confirmation_returns_to_arrived_with_draft() {
        let (mut flow, sink) = flow(false);
        flow.select(OrderId::new("11")).await.unwrap();
        flow.mark_arrived().unwrap();
        assert!(flow.attach_photo().await.unwrap());
        flow.set_quantity("4").unwrap();
        flow.request_completion().unwrap();

        flow.cancel_confirmation().unwrap();

        match flow.stage() {
            DeliveryStage::Arrived { draft, .. } => assert_eq!(draft.quantity_input, "4"),
            other => panic!("unexpected stage {other:?}"),
        }
        assert!(sink.pending().is_empty());
    }

    #[tokio::test]
    async fn failed_detail_fetch_offers_retry() {
        let (mut flow, _sink) = flow(true);

        flow.select(OrderId::new("11")).await.unwrap();
        match flow.stage() {
            DeliveryStage::DetailUnavailable { kind, .. } => assert_eq!(*kind, ErrorKind::NoResponse),
            other => panic!("unexpected stage {other:?}"),
        }
        assert!(flow.mark_arrived().is_err());

        flow.retry().await.unwrap();
        assert_eq!(flow.stage().name(), "viewing detail");
    }

    #[tokio::test]
    async fn empty_order_id_is_a_validation_error_state() {
        let (mut flow, _sink) = flow(false);
        flow.select(OrderId::new("")).await.unwrap();

        match flow.stage() {
            DeliveryStage::DetailUnavailable { kind, .. } => assert_eq!(*kind, ErrorKind::Validation),
            other => panic!("unexpected stage {other:?}"),
        }
        flow.back().unwrap();
        assert_eq!(flow.stage(), &DeliveryStage::Assigned);
    }

    #[tokio::test]
    async fn confirm_without_request_is_rejected() {
        let (mut flow, _sink) = flow(false);
        assert!(matches!(
            flow.confirm().await,
            Err(AppError::InvalidTransition { .. })
        ));
    }
}
