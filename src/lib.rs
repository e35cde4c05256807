//! Storefront Orders
//!
//! Cart, checkout and order lifecycle engine for a multi-role
//! (customer/seller/admin) food-ordering storefront. Catalog, stores and
//! persisted orders live behind a remote REST API; this crate keeps the
//! client-side state consistent with it.
//!
//! ## Features
//! - Cart store mirrored from the remote cart, with a live item count
//! - Checkout assembly with fresh catalog prices and single-store drafts
//! - Shipping info that survives restarts
//! - Order submission for cash-on-delivery and redirect-based online payment
//! - Order status state machine for customer, seller and admin actors
//! - Push notifications that trigger re-fetches of order feeds

pub mod api;
pub mod config;
pub mod domain;
pub mod services;
pub mod storage;
pub mod web;

#[cfg(test)]
mod test;

use serde::Serialize;
use thiserror::Error;

use crate::api::ApiError;
use crate::domain::aggregates::{CartError, DraftError, Order, TransitionError};
use crate::domain::value_objects::{CartItemId, MenuId, OrderId, StoreId};
use crate::storage::StorageError;

// =============================================================================
// Outcomes
// =============================================================================

/// Where the user should be sent after an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "to", content = "url", rename_all = "camelCase")]
pub enum Navigation {
    Home,
    Login,
    ShippingEntry,
    Orders,
    /// Leave the storefront, e.g. for a payment gateway.
    External(String),
}

impl Navigation {
    pub fn path(&self) -> &str {
        match self {
            Self::Home => "/",
            Self::Login => "/login",
            Self::ShippingEntry => "/shipping",
            Self::Orders => "/orders",
            Self::External(url) => url,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The input itself is invalid; retrying the same call cannot succeed.
    Precondition,
    /// Network or server failure; the same operation may be re-run.
    Transient,
    /// Credential missing or rejected; the session must sign in again.
    Authorization,
    /// The order changed under us; re-fetch before acting again.
    Conflict,
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Order has no store")]
    MissingStoreId,

    #[error("Shipping information is missing")]
    MissingShippingInfo,

    #[error("Invalid shipping information: {0}")]
    InvalidShippingInfo(#[from] validator::ValidationErrors),

    #[error("Items from different stores cannot be ordered together ({expected} and {found})")]
    StoreMismatch { expected: StoreId, found: StoreId },

    #[error("Menu item {0} is not sold by any store")]
    MenuWithoutStore(MenuId),

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Cart item {0} not found")]
    CartItemNotFound(CartItemId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Order {order_id} was changed elsewhere and is now {}", current.status())]
    StaleOrder { order_id: OrderId, current: Box<Order> },

    #[error("A status change for order {0} is already in progress")]
    TransitionInFlight(OrderId),

    #[error("This order is already being submitted")]
    SubmissionInFlight,

    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Could not load product information, please try again")]
    CatalogUnavailable(#[source] ApiError),

    #[error("Online payment did not return a payment link")]
    MissingPaymentUrl,

    #[error("Unexpected response from server: {0}")]
    UnexpectedResponse(String),

    #[error("Session expired, please sign in again")]
    Unauthorized,

    #[error("Request failed ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Network error, please try again")]
    Network(#[source] ApiError),

    #[error("Notification channel error: {0}")]
    Bridge(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorefrontError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyCart
            | Self::MissingStoreId
            | Self::MissingShippingInfo
            | Self::InvalidShippingInfo(_)
            | Self::StoreMismatch { .. }
            | Self::MenuWithoutStore(_)
            | Self::InvalidQuantity
            | Self::CartItemNotFound(_) => ErrorKind::Precondition,
            Self::Transition(e) if e.is_conflict() => ErrorKind::Conflict,
            Self::Transition(_) => ErrorKind::Precondition,
            Self::StaleOrder { .. } | Self::TransitionInFlight(_) | Self::SubmissionInFlight | Self::OrderNotFound(_) => {
                ErrorKind::Conflict
            }
            Self::Unauthorized => ErrorKind::Authorization,
            Self::CatalogUnavailable(_)
            | Self::MissingPaymentUrl
            | Self::UnexpectedResponse(_)
            | Self::Remote { .. }
            | Self::Network(_)
            | Self::Bridge(_)
            | Self::Storage(_)
            | Self::Serialization(_) => ErrorKind::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool { self.kind() == ErrorKind::Transient }

    /// Redirect the caller should perform instead of showing an inline message.
    pub fn navigation(&self) -> Option<Navigation> {
        match self {
            Self::EmptyCart => Some(Navigation::Home),
            Self::Unauthorized => Some(Navigation::Login),
            Self::MissingShippingInfo => Some(Navigation::ShippingEntry),
            _ => None,
        }
    }
}

impl From<ApiError> for StorefrontError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthorized => Self::Unauthorized,
            ApiError::Status { status, message } => Self::Remote { status, message },
            ApiError::Decode(msg) => Self::UnexpectedResponse(msg),
            ApiError::Credentials(e) => Self::Storage(e),
            e @ ApiError::Transport(_) => Self::Network(e),
        }
    }
}

impl From<DraftError> for StorefrontError {
    fn from(e: DraftError) -> Self {
        match e {
            DraftError::Empty => Self::EmptyCart,
            DraftError::MissingStoreId(menu_id) => Self::MenuWithoutStore(menu_id),
            DraftError::StoreMismatch { expected, found } => Self::StoreMismatch { expected, found },
        }
    }
}

impl From<CartError> for StorefrontError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound(id) => Self::CartItemNotFound(id),
            CartError::InvalidQuantity(_) => Self::InvalidQuantity,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;

    #[test]
    fn test_error_taxonomy() {
        assert_eq!(StorefrontError::EmptyCart.kind(), ErrorKind::Precondition);
        assert_eq!(StorefrontError::EmptyCart.navigation(), Some(Navigation::Home));
        assert_eq!(StorefrontError::Unauthorized.navigation(), Some(Navigation::Login));
        assert_eq!(StorefrontError::MissingShippingInfo.navigation(), Some(Navigation::ShippingEntry));
        assert!(StorefrontError::Remote { status: 500, message: "boom".into() }.is_retryable());
        assert!(!StorefrontError::Unauthorized.is_retryable());
        let terminal = StorefrontError::Transition(TransitionError::Terminal(OrderStatus::Completed));
        assert_eq!(terminal.kind(), ErrorKind::Conflict);
        assert_eq!(StorefrontError::Transition(TransitionError::EmptyReason).kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_api_error_mapping() {
        assert!(matches!(StorefrontError::from(ApiError::Unauthorized), StorefrontError::Unauthorized));
        let remote = StorefrontError::from(ApiError::Status { status: 409, message: "conflict".into() });
        assert!(matches!(remote, StorefrontError::Remote { status: 409, .. }));
    }
}
