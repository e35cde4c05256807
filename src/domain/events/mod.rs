//! Domain events
//!
//! [`OrderEvent`]s are raised by the order aggregate as its status moves.
//! [`Notification`]s arrive out of band from the push channel and only ever
//! trigger a re-fetch; they are never applied to local state directly.

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::{OrderId, StoreId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderEvent {
    StatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
    Rejected { order_id: OrderId, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    NewOrder { store_id: StoreId, order_id: OrderId },
    #[serde(rename_all = "camelCase")]
    OrderStatusChanged { order_id: OrderId, #[serde(default)] status: OrderStatus },
    #[serde(rename_all = "camelCase")]
    PaymentConfirmed { order_id: OrderId },
    #[serde(rename_all = "camelCase")]
    StoreApproved { store_id: StoreId },
}

impl Notification {
    pub fn store_id(&self) -> Option<&StoreId> {
        match self {
            Self::NewOrder { store_id, .. } | Self::StoreApproved { store_id } => Some(store_id),
            _ => None,
        }
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            Self::NewOrder { order_id, .. }
            | Self::OrderStatusChanged { order_id, .. }
            | Self::PaymentConfirmed { order_id } => Some(order_id),
            Self::StoreApproved { .. } => None,
        }
    }
}
