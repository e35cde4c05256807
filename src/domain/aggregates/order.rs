//! Order Aggregate
//!
//! Identity and lines are fixed once the server has created the order. Only
//! `status`, `payment_status` and the rejection reason move afterwards. Status
//! moves locally only through [`Order::apply`], which consults [`authorize`];
//! payment status is only ever read from the server.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{CustomerId, MenuId, OrderId, StoreId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Completed,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        Self::Pending, Self::Confirmed, Self::Preparing, Self::Ready,
        Self::Completed, Self::Cancelled, Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Preparing => "Preparing",
            Self::Ready => "Ready",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Rejected => "Rejected",
        }
    }

    /// Reads a server status. Anything unrecognized renders as `Pending`.
    pub fn parse_lenient(raw: &str) -> Self {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|s| s.as_str().eq_ignore_ascii_case(raw)).unwrap_or_default()
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Completed | Self::Cancelled | Self::Rejected) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { serializer.serialize_str(self.as_str()) }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse_lenient).unwrap_or_default())
    }
}

/// Server-level payment methods. UI payment choices collapse onto these.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[default]
    #[serde(rename = "COD", alias = "Cod", alias = "cod")]
    Cod,
    #[serde(alias = "online", alias = "ONLINE")]
    Online,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

impl<'de> Deserialize<'de> for PaymentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref().map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("paid") => Self::Paid,
            _ => Self::Pending,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Customer,
    Seller,
    Admin,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Customer => "customer", Self::Seller => "seller", Self::Admin => "admin" })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Transition {
    Confirm,
    Reject { reason: String },
    StartPreparing,
    MarkReady,
    Complete,
    Cancel,
}

impl Transition {
    pub fn source(&self) -> OrderStatus {
        match self {
            Self::Confirm | Self::Reject { .. } | Self::Cancel => OrderStatus::Pending,
            Self::StartPreparing => OrderStatus::Confirmed,
            Self::MarkReady => OrderStatus::Preparing,
            Self::Complete => OrderStatus::Ready,
        }
    }

    pub fn target(&self) -> OrderStatus {
        match self {
            Self::Confirm => OrderStatus::Confirmed,
            Self::Reject { .. } => OrderStatus::Rejected,
            Self::StartPreparing => OrderStatus::Preparing,
            Self::MarkReady => OrderStatus::Ready,
            Self::Complete => OrderStatus::Completed,
            Self::Cancel => OrderStatus::Cancelled,
        }
    }

    fn permits(&self, actor: Actor) -> bool {
        match self {
            Self::Cancel => matches!(actor, Actor::Customer | Actor::Admin),
            _ => actor == Actor::Seller,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}->{}", self.source(), self.target()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("order is already {0} and accepts no further transitions")]
    Terminal(OrderStatus),
    #[error("order is {current}, cannot apply {transition}")]
    InvalidSource { current: OrderStatus, transition: Transition },
    #[error("{actor} may not apply {transition}")]
    NotPermitted { actor: Actor, transition: Transition },
    #[error("a rejection reason is required")]
    EmptyReason,
}

impl TransitionError {
    /// Terminal and out-of-sequence attempts are conflicts with the current state.
    pub fn is_conflict(&self) -> bool { matches!(self, Self::Terminal(_) | Self::InvalidSource { .. }) }
}

/// Checks whether `actor` may move an order from `current` via `transition`.
pub fn authorize(actor: Actor, transition: &Transition, current: OrderStatus) -> Result<OrderStatus, TransitionError> {
    if current.is_terminal() { return Err(TransitionError::Terminal(current)); }
    if !transition.permits(actor) {
        return Err(TransitionError::NotPermitted { actor, transition: transition.clone() });
    }
    if transition.source() != current {
        return Err(TransitionError::InvalidSource { current, transition: transition.clone() });
    }
    if let Transition::Reject { reason } = transition {
        if reason.trim().is_empty() { return Err(TransitionError::EmptyReason); }
    }
    Ok(transition.target())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub menu_id: MenuId,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "unitPrice")]
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal { self.price * Decimal::from(self.quantity) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    store_id: StoreId,
    #[serde(default)]
    customer_id: Option<CustomerId>,
    #[serde(default, alias = "orderItems")]
    items: Vec<OrderLine>,
    total_price: Decimal,
    #[serde(default)]
    payment_method: PaymentMethod,
    #[serde(default)]
    payment_status: PaymentStatus,
    #[serde(default)]
    status: OrderStatus,
    #[serde(default)]
    delivery_address: String,
    #[serde(default)]
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

impl Order {
    /// Rebuilds an order from authoritative data.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: OrderId, store_id: StoreId, customer_id: Option<CustomerId>, items: Vec<OrderLine>,
        payment_method: PaymentMethod, status: OrderStatus, delivery_address: impl Into<String>, created_at: DateTime<Utc>,
    ) -> Self {
        let total_price = items.iter().map(OrderLine::line_total).sum();
        Self {
            id, store_id, customer_id, items, total_price, payment_method,
            payment_status: PaymentStatus::Pending, status, delivery_address: delivery_address.into(),
            rejection_reason: None, created_at, events: vec![],
        }
    }

    pub fn id(&self) -> &OrderId { &self.id }
    pub fn store_id(&self) -> &StoreId { &self.store_id }
    pub fn customer_id(&self) -> Option<&CustomerId> { self.customer_id.as_ref() }
    pub fn items(&self) -> &[OrderLine] { &self.items }
    pub fn total_price(&self) -> Decimal { self.total_price }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn delivery_address(&self) -> &str { &self.delivery_address }
    pub fn rejection_reason(&self) -> Option<&str> { self.rejection_reason.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Transitions `actor` may currently trigger; drives which actions a view enables.
    pub fn available_transitions(&self, actor: Actor) -> Vec<Transition> {
        let candidates = [
            Transition::Confirm,
            Transition::Reject { reason: String::new() },
            Transition::StartPreparing,
            Transition::MarkReady,
            Transition::Complete,
            Transition::Cancel,
        ];
        candidates.into_iter()
            .filter(|t| t.permits(actor) && t.source() == self.status && !self.status.is_terminal())
            .collect()
    }

    pub fn apply(&mut self, actor: Actor, transition: &Transition) -> Result<OrderStatus, TransitionError> {
        let from = self.status;
        let to = authorize(actor, transition, from)?;
        self.status = to;
        if let Transition::Reject { reason } = transition {
            let reason = reason.trim().to_string();
            self.rejection_reason = Some(reason.clone());
            self.raise_event(OrderEvent::Rejected { order_id: self.id.clone(), reason });
        }
        self.raise_event(OrderEvent::StatusChanged { order_id: self.id.clone(), from, to });
        Ok(to)
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
}
