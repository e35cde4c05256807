//! Remote storefront API
//!
//! The catalog, the cart and persisted orders all live on the remote REST
//! service. [`StorefrontApi`] is the seam every service talks through;
//! [`HttpStorefrontApi`] is the real client.

mod http;

pub use http::HttpStorefrontApi;

use async_trait::async_trait;
use mockall::automock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::{CartError, CartItem, MenuItem, Order, OrderDraft, OrderStatus, PaymentMethod};
use crate::domain::value_objects::{CartItemId, MenuId, OrderId, ShippingInfo, StoreId};
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not authenticated")]
    Unauthorized,

    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("credential store unavailable: {0}")]
    Credentials(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server refused the request because of the resource's current state.
    pub fn is_state_conflict(&self) -> bool { matches!(self.status(), Some(400 | 409 | 422)) }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRecord {
    pub id: CartItemId,
    pub menu_id: MenuId,
    #[serde(default, alias = "menuName")]
    pub name: String,
    #[serde(alias = "price")]
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub note: Option<String>,
}

impl TryFrom<CartItemRecord> for CartItem {
    type Error = CartError;

    /// Any `subTotal` the server sent is dropped; it is recomputed locally.
    fn try_from(r: CartItemRecord) -> Result<Self, Self::Error> {
        CartItem::new(r.id, r.menu_id, r.name, r.unit_price, r.quantity, r.note)
    }
}

/// `GET /Cart` answers either `{ "items": [...] }` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CartPayload {
    Wrapped { #[serde(alias = "cartItems")] items: Vec<CartItemRecord> },
    Bare(Vec<CartItemRecord>),
}

impl CartPayload {
    pub(crate) fn into_items(self) -> Vec<CartItemRecord> {
        match self {
            Self::Wrapped { items } | Self::Bare(items) => items,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItemRequest {
    pub menu_id: MenuId,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateOrderItem {
    pub menu_id: MenuId,
    pub quantity: u32,
    pub note: Option<String>,
}

/// Body of `POST /Orders`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateOrderRequest {
    pub store_id: StoreId,
    pub delivery_address: String,
    pub payment_method: PaymentMethod,
    pub items: Vec<CreateOrderItem>,
}

impl CreateOrderRequest {
    pub fn from_draft(draft: &OrderDraft, shipping: &ShippingInfo) -> Self {
        Self {
            store_id: draft.store_id().clone(),
            delivery_address: shipping.delivery_address.clone(),
            payment_method: draft.payment().method(),
            items: draft.items().iter()
                .map(|i| CreateOrderItem { menu_id: i.menu_id.clone(), quantity: i.quantity, note: i.note.clone() })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    #[serde(default, alias = "orderId")]
    pub id: Option<OrderId>,
    #[serde(default)]
    pub payment_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct RejectOrderRequest<'a> {
    pub reason: &'a str,
}

// =============================================================================
// Client seam
// =============================================================================

#[automock]
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    /// `GET /Cart`
    async fn get_cart(&self) -> Result<Vec<CartItemRecord>, ApiError>;

    /// `POST /Cart/add-item`; answers with the created or merged line.
    async fn add_cart_item(&self, request: &AddCartItemRequest) -> Result<CartItemRecord, ApiError>;

    /// `PUT /Cart/update-quantity/{itemId}`
    async fn update_cart_quantity(&self, item_id: &CartItemId, quantity: u32) -> Result<(), ApiError>;

    /// `DELETE /Cart/remove-item/{itemId}`
    async fn remove_cart_item(&self, item_id: &CartItemId) -> Result<(), ApiError>;

    /// `DELETE /Cart/clear`
    async fn clear_cart(&self) -> Result<(), ApiError>;

    /// `GET /Menus/{id}`
    async fn get_menu(&self, menu_id: &MenuId) -> Result<MenuItem, ApiError>;

    /// `POST /Orders`
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<CreateOrderResponse, ApiError>;

    /// `PUT /orders/{id}/status`
    async fn update_order_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<(), ApiError>;

    /// `PUT /orders/{id}/reject`
    async fn reject_order(&self, order_id: &OrderId, reason: &str) -> Result<(), ApiError>;

    /// `GET /Orders/myorders`
    async fn my_orders(&self) -> Result<Vec<Order>, ApiError>;

    /// `GET /orders/store/{storeId}`
    async fn store_orders(&self, store_id: &StoreId) -> Result<Vec<Order>, ApiError>;
}
