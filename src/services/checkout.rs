//! Checkout Assembler
//!
//! Turns requested lines into a priced [`OrderDraft`]. Prices, names and
//! stores always come from a fresh catalog lookup, never from the cart.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, StorefrontApi};
use crate::domain::aggregates::{Cart, CheckoutLine, DraftItem, OrderDraft, PaymentOption};
use crate::domain::value_objects::ShippingInfo;
use crate::storage::{SessionStorage, StorageKey};
use crate::{Result, StorefrontError};

/// Where the lines being checked out came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum CheckoutSource {
    Cart { items: Vec<CheckoutLine> },
    BuyNow { item: CheckoutLine },
}

impl CheckoutSource {
    pub fn from_cart(cart: &Cart) -> Self { Self::Cart { items: CheckoutLine::from_cart(cart) } }

    pub fn into_lines(self) -> Vec<CheckoutLine> {
        match self {
            Self::Cart { items } => items,
            Self::BuyNow { item } => vec![item],
        }
    }
}

/// The resume-checkout draft kept under `tempOrder`.
#[derive(Clone)]
pub struct DraftCache {
    storage: Arc<dyn SessionStorage>,
}

impl std::fmt::Debug for DraftCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("DraftCache").finish_non_exhaustive() }
}

impl DraftCache {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self { Self { storage } }

    pub async fn stash(&self, draft: &OrderDraft) -> Result<()> {
        let encoded = serde_json::to_string(draft)?;
        self.storage.set(StorageKey::TempOrder, &encoded).await?;
        Ok(())
    }

    /// The stashed draft, if any. An unreadable entry is dropped.
    pub async fn resume(&self) -> Result<Option<OrderDraft>> {
        let Some(raw) = self.storage.get(StorageKey::TempOrder).await? else { return Ok(None) };
        match serde_json::from_str(&raw) {
            Ok(draft) => Ok(Some(draft)),
            Err(e) => {
                warn!(error = %e, "discarding unreadable checkout draft");
                self.discard().await?;
                Ok(None)
            }
        }
    }

    pub async fn discard(&self) -> Result<()> {
        self.storage.remove(StorageKey::TempOrder).await?;
        Ok(())
    }
}

pub struct CheckoutAssembler {
    api: Arc<dyn StorefrontApi>,
    cache: DraftCache,
}

impl std::fmt::Debug for CheckoutAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("CheckoutAssembler").finish_non_exhaustive() }
}

impl CheckoutAssembler {
    pub fn new(api: Arc<dyn StorefrontApi>, cache: DraftCache) -> Self { Self { api, cache } }

    /// Fetches every line's catalog record in parallel and builds a draft.
    ///
    /// All-or-nothing: one failed lookup fails the whole assembly and no
    /// draft is produced or stashed. An empty source is refused before any
    /// request and sends the user home.
    pub async fn assemble(&self, source: CheckoutSource, shipping: Option<ShippingInfo>, payment: PaymentOption) -> Result<OrderDraft> {
        let lines = source.into_lines();
        if lines.is_empty() {
            debug!("checkout requested with no items");
            return Err(StorefrontError::EmptyCart);
        }
        if lines.iter().any(|l| l.quantity < 1) {
            return Err(StorefrontError::InvalidQuantity);
        }

        let menus = try_join_all(lines.iter().map(|line| self.api.get_menu(&line.menu_id)))
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized => StorefrontError::Unauthorized,
                other => {
                    warn!(error = %other, "catalog lookup failed during checkout");
                    StorefrontError::CatalogUnavailable(other)
                }
            })?;

        let items = lines.iter().zip(menus)
            .map(|(line, menu)| DraftItem::priced(line, menu))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let draft = OrderDraft::assemble(items, shipping, payment)?;

        self.cache.stash(&draft).await?;
        info!(draft_id = %draft.id(), store_id = %draft.store_id(), items = draft.items().len(), total = %draft.total(), "checkout draft assembled");
        Ok(draft)
    }

    /// Reopens the draft stashed by the last assembly, e.g. after a restart.
    pub async fn resume(&self) -> Result<Option<OrderDraft>> { self.cache.resume().await }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockStorefrontApi;
    use crate::domain::aggregates::MenuItem;
    use crate::domain::value_objects::StoreId;
    use crate::storage::MemoryStorage;
    use rust_decimal::Decimal;

    fn catalog() -> MockStorefrontApi {
        let mut api = MockStorefrontApi::new();
        api.expect_get_menu().returning(|id| {
            let (price, store) = match id.as_str() {
                "1" => (50000, "A"),
                "2" => (30000, "A"),
                "3" => (20000, "B"),
                _ => return Err(ApiError::Status { status: 404, message: "not found".into() }),
            };
            Ok(MenuItem { id: id.clone(), name: format!("Mon {id}"), price: Decimal::new(price, 0), store_id: Some(StoreId::from(store)), image_url: None })
        });
        api
    }

    fn assembler(api: MockStorefrontApi) -> (CheckoutAssembler, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (CheckoutAssembler::new(Arc::new(api), DraftCache::new(storage.clone())), storage)
    }

    fn cart_source(lines: &[(&str, u32)]) -> CheckoutSource {
        CheckoutSource::Cart { items: lines.iter().map(|(id, q)| CheckoutLine::new(*id, *q, None)).collect() }
    }

    #[tokio::test]
    async fn test_assemble_from_cart() {
        let (assembler, _) = assembler(catalog());
        let draft = assembler.assemble(cart_source(&[("1", 2), ("2", 1)]), None, PaymentOption::Cash).await.unwrap();
        assert_eq!(draft.total(), Decimal::new(130000, 0));
        assert_eq!(draft.store_id().as_str(), "A");
        assert_eq!(draft.items()[0].name, "Mon 1");
    }

    #[tokio::test]
    async fn test_buy_now() {
        let (assembler, _) = assembler(catalog());
        let source = CheckoutSource::BuyNow { item: CheckoutLine::new("3", 3, Some("it cay".into())) };
        let draft = assembler.assemble(source, None, PaymentOption::Momo).await.unwrap();
        assert_eq!(draft.total(), Decimal::new(60000, 0));
        assert_eq!(draft.items()[0].note.as_deref(), Some("it cay"));
    }

    #[tokio::test]
    async fn test_store_mismatch_produces_no_draft() {
        let (assembler, storage) = assembler(catalog());
        let err = assembler.assemble(cart_source(&[("1", 1), ("3", 1)]), None, PaymentOption::Cash).await.unwrap_err();
        assert!(matches!(err, StorefrontError::StoreMismatch { .. }));
        assert_eq!(storage.get(StorageKey::TempOrder).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_one_failed_lookup_fails_everything() {
        let (assembler, storage) = assembler(catalog());
        let err = assembler.assemble(cart_source(&[("1", 1), ("99", 1)]), None, PaymentOption::Cash).await.unwrap_err();
        assert!(matches!(err, StorefrontError::CatalogUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(storage.get(StorageKey::TempOrder).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_source_goes_home_without_requests() {
        let mut api = MockStorefrontApi::new();
        api.expect_get_menu().never();
        let (assembler, _) = assembler(api);
        let err = assembler.assemble(cart_source(&[]), None, PaymentOption::Cash).await.unwrap_err();
        assert_eq!(err.navigation(), Some(crate::Navigation::Home));
    }

    #[tokio::test]
    async fn test_draft_can_be_resumed() {
        let (assembler, _) = assembler(catalog());
        let shipping = ShippingInfo::new("1 Le Loi", "0912345678").unwrap();
        let draft = assembler.assemble(cart_source(&[("2", 2)]), Some(shipping), PaymentOption::Vnpay).await.unwrap();
        assert_eq!(assembler.resume().await.unwrap(), Some(draft));
    }

    #[tokio::test]
    async fn test_unreadable_draft_is_dropped() {
        let (assembler, storage) = assembler(catalog());
        storage.set(StorageKey::TempOrder, "{not json").await.unwrap();
        assert_eq!(assembler.resume().await.unwrap(), None);
        assert_eq!(storage.get(StorageKey::TempOrder).await.unwrap(), None);
    }
}
