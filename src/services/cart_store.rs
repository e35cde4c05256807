//! Cart Store
//!
//! The one in-process mirror of the signed-in user's remote cart. Views read
//! snapshots or subscribe to the item count; only the methods here mutate it.
//! Every mutation goes to the server first and is applied locally only after
//! the server accepted it, so a failed call leaves the mirror untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::{AddCartItemRequest, ApiError, StorefrontApi};
use crate::domain::aggregates::{Cart, CartError, CartItem};
use crate::domain::value_objects::{CartItemId, MenuId};
use crate::{Result, StorefrontError};

pub struct CartStore {
    api: Arc<dyn StorefrontApi>,
    cart: RwLock<Cart>,
    count: watch::Sender<usize>,
    // Quantity updates and removals of one line are issued one at a time.
    item_locks: StdMutex<HashMap<CartItemId, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore").field("count", &*self.count.borrow()).finish_non_exhaustive()
    }
}

impl CartStore {
    pub fn new(api: Arc<dyn StorefrontApi>) -> Self {
        let (count, _) = watch::channel(0);
        Self { api, cart: RwLock::new(Cart::new()), count, item_locks: StdMutex::new(HashMap::new()) }
    }

    /// Live item count for badges and the like.
    pub fn subscribe(&self) -> watch::Receiver<usize> { self.count.subscribe() }

    pub fn item_count(&self) -> usize { *self.count.borrow() }

    pub async fn snapshot(&self) -> Cart { self.cart.read().await.clone() }

    /// Reloads the cart from the server.
    ///
    /// A missing or rejected credential yields an empty cart: a signed-out
    /// user simply has nothing in their cart.
    pub async fn refresh(&self) -> Result<Cart> {
        let cart = match self.api.get_cart().await {
            Ok(records) => {
                let items = records.into_iter().map(CartItem::try_from).collect::<std::result::Result<Vec<_>, CartError>>()
                    .map_err(|e| StorefrontError::UnexpectedResponse(e.to_string()))?;
                Cart::from_items(items)
            }
            Err(ApiError::Unauthorized) => {
                debug!("no valid credential, treating cart as empty");
                Cart::new()
            }
            Err(e) => {
                warn!(error = %e, "cart refresh failed");
                return Err(e.into());
            }
        };
        self.replace(cart.clone()).await;
        Ok(cart)
    }

    pub async fn add_item(&self, menu_id: MenuId, quantity: u32, note: Option<String>) -> Result<CartItem> {
        if quantity < 1 { return Err(StorefrontError::InvalidQuantity); }
        let request = AddCartItemRequest { menu_id, quantity, note: note.filter(|n| !n.trim().is_empty()) };
        let record = self.api.add_cart_item(&request).await.map_err(|e| self.mutation_failed("add", e))?;
        let item = CartItem::try_from(record).map_err(|e| StorefrontError::UnexpectedResponse(e.to_string()))?;

        let mut cart = self.cart.write().await;
        cart.upsert(item.clone());
        self.publish(&cart);
        info!(item_id = %item.id(), menu_id = %item.menu_id(), quantity = item.quantity(), "cart item added");
        Ok(item)
    }

    /// Sets a line's quantity. Quantities below 1 are refused without a
    /// network call; use [`CartStore::remove_item`] to drop a line.
    pub async fn update_quantity(&self, item_id: &CartItemId, quantity: u32) -> Result<()> {
        if quantity < 1 {
            debug!(item_id = %item_id, quantity, "refusing quantity below 1");
            return Err(StorefrontError::InvalidQuantity);
        }
        let lock = self.item_lock(item_id);
        let _serialized = lock.lock().await;

        self.api.update_cart_quantity(item_id, quantity).await.map_err(|e| self.mutation_failed("update", e))?;

        let mut cart = self.cart.write().await;
        match cart.set_quantity(item_id, quantity) {
            Ok(()) => {
                self.publish(&cart);
                info!(item_id = %item_id, quantity, "cart quantity updated");
                Ok(())
            }
            Err(CartError::ItemNotFound(_)) => {
                drop(cart);
                debug!(item_id = %item_id, "updated line missing locally, reloading cart");
                self.refresh().await.map(|_| ())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove_item(&self, item_id: &CartItemId) -> Result<()> {
        let lock = self.item_lock(item_id);
        let _serialized = lock.lock().await;

        self.api.remove_cart_item(item_id).await.map_err(|e| self.mutation_failed("remove", e))?;

        let mut cart = self.cart.write().await;
        if cart.remove(item_id).is_err() {
            debug!(item_id = %item_id, "removed line was not mirrored locally");
        }
        self.publish(&cart);
        drop(cart);
        self.release_lock(item_id, &lock);
        info!(item_id = %item_id, "cart item removed");
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.api.clear_cart().await.map_err(|e| self.mutation_failed("clear", e))?;
        self.replace(Cart::new()).await;
        info!("cart cleared");
        Ok(())
    }

    async fn replace(&self, next: Cart) {
        let mut cart = self.cart.write().await;
        *cart = next;
        self.publish(&cart);
        if let Ok(mut locks) = self.item_locks.lock() {
            // Locks of vanished lines go unless someone still holds them.
            locks.retain(|id, lock| Arc::strong_count(lock) > 1 || cart.find(id).is_some());
        }
    }

    fn publish(&self, cart: &Cart) { self.count.send_replace(cart.item_count()); }

    fn item_lock(&self, item_id: &CartItemId) -> Arc<Mutex<()>> {
        match self.item_locks.lock() {
            Ok(mut locks) => locks.entry(item_id.clone()).or_default().clone(),
            // Poisoned map: fall back to an unshared lock.
            Err(_) => Arc::new(Mutex::new(())),
        }
    }

    /// Drops the map's entry for a removed line once `held` is its only other owner.
    fn release_lock(&self, item_id: &CartItemId, held: &Arc<Mutex<()>>) {
        if let Ok(mut locks) = self.item_locks.lock() {
            let idle = locks.get(item_id).is_some_and(|lock| Arc::ptr_eq(lock, held) && Arc::strong_count(lock) == 2);
            if idle { locks.remove(item_id); }
        }
    }

    fn mutation_failed(&self, op: &'static str, e: ApiError) -> StorefrontError {
        warn!(op, error = %e, "cart mutation failed");
        e.into()
    }
}
