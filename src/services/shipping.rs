//! Shipping Info Store
//!
//! Keeps the delivery address and phone across navigation and restarts until
//! checkout reads them. Reading never clears or alters what was saved.

use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

use crate::domain::value_objects::ShippingInfo;
use crate::storage::{SessionStorage, StorageKey};
use crate::{Result, StorefrontError};

#[derive(Clone)]
pub struct ShippingInfoStore {
    storage: Arc<dyn SessionStorage>,
}

impl std::fmt::Debug for ShippingInfoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("ShippingInfoStore").finish_non_exhaustive() }
}

impl ShippingInfoStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self { Self { storage } }

    /// Values handed over by the previous screen win over saved ones; with
    /// neither, both fields come back empty.
    pub async fn load(&self, passed: Option<ShippingInfo>) -> Result<ShippingInfo> {
        if let Some(info) = passed.filter(|i| !i.is_empty()) {
            return Ok(info);
        }
        let address = self.storage.get(StorageKey::DeliveryAddress).await?.unwrap_or_default();
        let phone = self.storage.get(StorageKey::PhoneNumber).await?.unwrap_or_default();
        Ok(ShippingInfo::unchecked(address, phone))
    }

    /// Validates, then persists both fields together. Nothing is written if validation fails.
    pub async fn save(&self, delivery_address: &str, phone_number: &str) -> Result<ShippingInfo> {
        let info = ShippingInfo::new(delivery_address, phone_number)?;
        self.storage
            .set_many(&[
                (StorageKey::DeliveryAddress, info.delivery_address.clone()),
                (StorageKey::PhoneNumber, info.phone_number.clone()),
            ])
            .await?;
        info!("shipping info saved");
        Ok(info)
    }

    /// Saved shipping info that is complete enough to submit an order with.
    pub async fn require(&self, passed: Option<ShippingInfo>) -> Result<ShippingInfo> {
        let info = self.load(passed).await?;
        if let Err(e) = info.validate() {
            debug!(error = %e, "shipping info incomplete");
            return Err(StorefrontError::MissingShippingInfo);
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, SqliteStorage};

    fn store() -> (ShippingInfoStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (ShippingInfoStore::new(storage.clone()), storage)
    }

    #[tokio::test]
    async fn test_load_with_nothing_saved() {
        let (shipping, _) = store();
        let info = shipping.load(None).await.unwrap();
        assert_eq!(info, ShippingInfo::unchecked("", ""));
    }

    #[tokio::test]
    async fn test_passed_state_wins() {
        let (shipping, _) = store();
        shipping.save("1 Le Loi", "0912345678").await.unwrap();
        let passed = ShippingInfo::unchecked("9 Tran Phu", "0987654321");
        assert_eq!(shipping.load(Some(passed.clone())).await.unwrap(), passed);
        assert_eq!(shipping.load(Some(ShippingInfo::default())).await.unwrap().delivery_address, "1 Le Loi");
    }

    #[tokio::test]
    async fn test_invalid_phone_saves_nothing() {
        let (shipping, storage) = store();
        let err = shipping.save("1 Le Loi", "12345").await.unwrap_err();
        assert!(matches!(err, StorefrontError::InvalidShippingInfo(_)));
        assert_eq!(storage.get(StorageKey::DeliveryAddress).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reading_is_idempotent() {
        let (shipping, _) = store();
        shipping.save("1 Le Loi", "0912345678").await.unwrap();
        let first = shipping.require(None).await.unwrap();
        let second = shipping.require(None).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_require_routes_to_entry_when_missing() {
        let (shipping, storage) = store();
        storage.set(StorageKey::DeliveryAddress, "1 Le Loi").await.unwrap();
        let err = shipping.require(None).await.unwrap_err();
        assert_eq!(err.navigation(), Some(crate::Navigation::ShippingEntry));
    }

    #[tokio::test]
    async fn test_round_trip_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("shipping.db").display());

        let storage = Arc::new(SqliteStorage::connect(&url).await.unwrap());
        ShippingInfoStore::new(storage.clone()).save("22 Nguyen Hue, Q1", "02838221234").await.unwrap();
        storage.close().await;

        let fresh = ShippingInfoStore::new(Arc::new(SqliteStorage::connect(&url).await.unwrap()));
        let loaded = fresh.load(None).await.unwrap();
        assert_eq!(loaded, ShippingInfo::unchecked("22 Nguyen Hue, Q1", "02838221234"));
    }
}
