//! Order Draft
//!
//! A priced, single-store snapshot built just before submission. Drafts are
//! only constructed through [`OrderDraft::assemble`], which refuses empty
//! item sets and items spanning several stores.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::cart::Cart;
use crate::domain::aggregates::order::PaymentMethod;
use crate::domain::value_objects::{MenuId, ShippingInfo, StoreId};

/// Authoritative catalog record returned by `GET /Menus/{id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: MenuId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub store_id: Option<StoreId>,
    #[serde(default, alias = "image")]
    pub image_url: Option<String>,
}

/// What the user asked to buy, before pricing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
    pub menu_id: MenuId,
    pub quantity: u32,
    #[serde(default)]
    pub note: Option<String>,
}

impl CheckoutLine {
    pub fn new(menu_id: impl Into<MenuId>, quantity: u32, note: Option<String>) -> Self {
        Self { menu_id: menu_id.into(), quantity, note }
    }

    pub fn from_cart(cart: &Cart) -> Vec<Self> {
        cart.items().iter()
            .map(|i| Self { menu_id: i.menu_id().clone(), quantity: i.quantity(), note: i.note().map(str::to_string) })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftItem {
    pub menu_id: MenuId,
    pub quantity: u32,
    pub note: Option<String>,
    pub name: String,
    pub price: Decimal,
    pub store_id: StoreId,
    pub image_url: Option<String>,
}

impl DraftItem {
    /// Prices a requested line with its freshly fetched catalog record.
    pub fn priced(line: &CheckoutLine, menu: MenuItem) -> Result<Self, DraftError> {
        let store_id = menu.store_id
            .filter(|s| !s.is_blank())
            .ok_or_else(|| DraftError::MissingStoreId(line.menu_id.clone()))?;
        Ok(Self {
            menu_id: line.menu_id.clone(),
            quantity: line.quantity,
            note: line.note.clone(),
            name: menu.name,
            price: menu.price,
            store_id,
            image_url: menu.image_url,
        })
    }

    pub fn line_total(&self) -> Decimal { self.price * Decimal::from(self.quantity) }
}

/// Payment choices offered at checkout. Each maps onto exactly one server-level method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOption {
    #[default]
    #[serde(alias = "cod")]
    Cash,
    Vnpay,
    Momo,
    Card,
}

impl PaymentOption {
    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::Cash => PaymentMethod::Cod,
            Self::Vnpay | Self::Momo | Self::Card => PaymentMethod::Online,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    id: Uuid,
    store_id: StoreId,
    items: Vec<DraftItem>,
    total: Decimal,
    shipping: Option<ShippingInfo>,
    payment: PaymentOption,
    created_at: DateTime<Utc>,
}

impl OrderDraft {
    pub fn assemble(items: Vec<DraftItem>, shipping: Option<ShippingInfo>, payment: PaymentOption) -> Result<Self, DraftError> {
        let store_id = items.first().map(|i| i.store_id.clone()).ok_or(DraftError::Empty)?;
        if let Some(other) = items.iter().find(|i| i.store_id != store_id) {
            return Err(DraftError::StoreMismatch { expected: store_id, found: other.store_id.clone() });
        }
        let total = items.iter().map(DraftItem::line_total).sum();
        Ok(Self { id: Uuid::now_v7(), store_id, items, total, shipping, payment, created_at: Utc::now() })
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn store_id(&self) -> &StoreId { &self.store_id }
    pub fn items(&self) -> &[DraftItem] { &self.items }
    pub fn total(&self) -> Decimal { self.total }
    pub fn shipping(&self) -> Option<&ShippingInfo> { self.shipping.as_ref() }
    pub fn payment(&self) -> PaymentOption { self.payment }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn with_shipping(mut self, shipping: ShippingInfo) -> Self { self.shipping = Some(shipping); self }
    pub fn with_payment(mut self, payment: PaymentOption) -> Self { self.payment = payment; self }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("no items to check out")]
    Empty,
    #[error("menu item {0} has no store")]
    MissingStoreId(MenuId),
    #[error("items belong to different stores ({expected} and {found})")]
    StoreMismatch { expected: StoreId, found: StoreId },
}
