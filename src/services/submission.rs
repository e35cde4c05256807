//! Order Submission Service
//!
//! Converts a draft into a persisted order with a single `POST /Orders`.
//! Each submission has exactly one navigation outcome: the order list for
//! cash on delivery, or the payment gateway for online payment.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::api::{CreateOrderRequest, StorefrontApi};
use crate::domain::aggregates::{OrderDraft, PaymentMethod};
use crate::domain::value_objects::OrderId;
use crate::services::checkout::DraftCache;
use crate::{Navigation, Result, StorefrontError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SubmissionOutcome {
    /// Cash on delivery: the order exists and awaits payment on delivery.
    #[serde(rename_all = "camelCase")]
    Placed { order_id: OrderId },
    /// Online payment: the caller must redirect to `payment_url` and nowhere else.
    #[serde(rename_all = "camelCase")]
    PaymentRedirect { order_id: Option<OrderId>, payment_url: String },
}

impl SubmissionOutcome {
    pub fn navigation(&self) -> Navigation {
        match self {
            Self::Placed { .. } => Navigation::Orders,
            Self::PaymentRedirect { payment_url, .. } => Navigation::External(payment_url.clone()),
        }
    }
}

pub struct OrderSubmissionService {
    api: Arc<dyn StorefrontApi>,
    cache: DraftCache,
    submitting: AtomicBool,
}

impl std::fmt::Debug for OrderSubmissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSubmissionService").field("submitting", &self.submitting.load(Ordering::Relaxed)).finish_non_exhaustive()
    }
}

struct SubmittingGuard<'a>(&'a AtomicBool);

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

impl OrderSubmissionService {
    pub fn new(api: Arc<dyn StorefrontApi>, cache: DraftCache) -> Self {
        Self { api, cache, submitting: AtomicBool::new(false) }
    }

    /// Submits `draft`.
    ///
    /// Preconditions are checked before any request, each with its own
    /// error: no items, no single store, no usable shipping info. A failed request
    /// leaves nothing assumed on the client; whether an order exists is for
    /// the server to say.
    pub async fn submit(&self, draft: &OrderDraft) -> Result<SubmissionOutcome> {
        if draft.items().is_empty() { return Err(StorefrontError::EmptyCart); }
        if draft.store_id().is_blank() { return Err(StorefrontError::MissingStoreId); }
        // A resumed draft is re-read from storage; every line must still belong to its store.
        if let Some(item) = draft.items().iter().find(|i| &i.store_id != draft.store_id()) {
            return Err(StorefrontError::StoreMismatch { expected: draft.store_id().clone(), found: item.store_id.clone() });
        }
        let shipping = draft.shipping().ok_or(StorefrontError::MissingShippingInfo)?;
        if let Err(e) = shipping.validate() {
            debug!(error = %e, "draft carries incomplete shipping info");
            return Err(StorefrontError::MissingShippingInfo);
        }

        if self.submitting.swap(true, Ordering::AcqRel) {
            return Err(StorefrontError::SubmissionInFlight);
        }
        let _guard = SubmittingGuard(&self.submitting);

        let request = CreateOrderRequest::from_draft(draft, shipping);
        let response = self.api.create_order(&request).await.map_err(|e| {
            warn!(draft_id = %draft.id(), error = %e, "order submission failed");
            StorefrontError::from(e)
        })?;

        match request.payment_method {
            PaymentMethod::Cod => {
                let order_id = response.id.ok_or_else(|| StorefrontError::UnexpectedResponse("order created without an id".into()))?;
                // The order exists; a failed discard is not a failed submission.
                if let Err(e) = self.cache.discard().await {
                    warn!(order_id = %order_id, error = %e, "could not discard checkout draft after placing order");
                }
                info!(order_id = %order_id, store_id = %draft.store_id(), "cash-on-delivery order placed");
                Ok(SubmissionOutcome::Placed { order_id })
            }
            PaymentMethod::Online => {
                let payment_url = response.payment_url.filter(|u| !u.trim().is_empty()).ok_or(StorefrontError::MissingPaymentUrl)?;
                info!(order_id = ?response.id, store_id = %draft.store_id(), "redirecting to online payment");
                Ok(SubmissionOutcome::PaymentRedirect { order_id: response.id, payment_url })
            }
        }
    }
}
