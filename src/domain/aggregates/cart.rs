//! Cart Aggregate
//!
//! Local mirror of the user's remote cart. Every line's `sub_total` is derived
//! from `unit_price * quantity` whenever a line is built or its quantity moves,
//! so a stale server-side sub total can never leak in.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::domain::value_objects::{CartItemId, MenuId};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    id: CartItemId,
    menu_id: MenuId,
    name: String,
    unit_price: Decimal,
    quantity: u32,
    note: Option<String>,
    sub_total: Decimal,
}

impl CartItem {
    pub fn new(
        id: CartItemId,
        menu_id: MenuId,
        name: impl Into<String>,
        unit_price: Decimal,
        quantity: u32,
        note: Option<String>,
    ) -> Result<Self, CartError> {
        if quantity < 1 { return Err(CartError::InvalidQuantity(quantity)); }
        Ok(Self {
            id, menu_id, name: name.into(), unit_price, quantity,
            note: note.filter(|n| !n.trim().is_empty()),
            sub_total: unit_price * Decimal::from(quantity),
        })
    }

    pub fn id(&self) -> &CartItemId { &self.id }
    pub fn menu_id(&self) -> &MenuId { &self.menu_id }
    pub fn name(&self) -> &str { &self.name }
    pub fn unit_price(&self) -> Decimal { self.unit_price }
    pub fn quantity(&self) -> u32 { self.quantity }
    pub fn note(&self) -> Option<&str> { self.note.as_deref() }
    pub fn sub_total(&self) -> Decimal { self.sub_total }

    fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity;
        self.sub_total = self.unit_price * Decimal::from(quantity);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<CartItem>,
    updated_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self { Self::new() }
}

impl Cart {
    pub fn new() -> Self { Self { items: vec![], updated_at: Utc::now() } }

    pub fn from_items(items: Vec<CartItem>) -> Self {
        Self { items, updated_at: Utc::now() }
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Number of distinct lines; this is what the cart badge shows.
    pub fn item_count(&self) -> usize { self.items.len() }

    pub fn total_quantity(&self) -> u32 { self.items.iter().map(CartItem::quantity).sum() }

    pub fn total(&self) -> Decimal { self.items.iter().map(CartItem::sub_total).sum() }

    pub fn find(&self, id: &CartItemId) -> Option<&CartItem> { self.items.iter().find(|i| &i.id == id) }

    /// Applies a server-confirmed line: replaces the line with the same id, or appends it.
    pub fn upsert(&mut self, item: CartItem) {
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
        self.touch();
    }

    pub fn set_quantity(&mut self, id: &CartItemId, quantity: u32) -> Result<(), CartError> {
        if quantity < 1 { return Err(CartError::InvalidQuantity(quantity)); }
        let item = self.items.iter_mut().find(|i| &i.id == id).ok_or_else(|| CartError::ItemNotFound(id.clone()))?;
        item.set_quantity(quantity);
        self.touch();
        Ok(())
    }

    pub fn remove(&mut self, id: &CartItemId) -> Result<CartItem, CartError> {
        let pos = self.items.iter().position(|i| &i.id == id).ok_or_else(|| CartError::ItemNotFound(id.clone()))?;
        let removed = self.items.remove(pos);
        self.touch();
        Ok(removed)
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart item {0} not found")]
    ItemNotFound(CartItemId),
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),
}
