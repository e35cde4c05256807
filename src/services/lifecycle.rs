//! Order Lifecycle
//!
//! Drives status transitions against the remote order resource on behalf of
//! one actor, and keeps order feeds (a customer's orders, a store's orders)
//! in sync with the server.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiError, StorefrontApi};
use crate::domain::aggregates::{Actor, Order, Transition};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{OrderId, StoreId};
use crate::{Result, StorefrontError};

/// Which orders a view is looking at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedScope {
    Mine,
    Store(StoreId),
}

impl FeedScope {
    async fn fetch(&self, api: &dyn StorefrontApi) -> std::result::Result<Vec<Order>, ApiError> {
        match self {
            Self::Mine => api.my_orders().await,
            Self::Store(store_id) => api.store_orders(store_id).await,
        }
    }
}

pub struct OrderLifecycle {
    api: Arc<dyn StorefrontApi>,
    actor: Actor,
    in_flight: Mutex<HashSet<OrderId>>,
}

impl std::fmt::Debug for OrderLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderLifecycle").field("actor", &self.actor).finish_non_exhaustive()
    }
}

/// Marks an order as having a transition request in flight until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<OrderId>>,
    order_id: OrderId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() { set.remove(&self.order_id); }
    }
}

impl OrderLifecycle {
    pub fn new(api: Arc<dyn StorefrontApi>, actor: Actor) -> Self {
        Self { api, actor, in_flight: Mutex::new(HashSet::new()) }
    }

    pub fn actor(&self) -> Actor { self.actor }

    /// Whether a transition for `order_id` is awaiting the server; views disable the action meanwhile.
    pub fn is_pending(&self, order_id: &OrderId) -> bool {
        self.in_flight.lock().map(|set| set.contains(order_id)).unwrap_or(false)
    }

    fn begin(&self, order_id: &OrderId) -> Result<InFlight<'_>> {
        let mut set = self.in_flight.lock().map_err(|_| StorefrontError::TransitionInFlight(order_id.clone()))?;
        if !set.insert(order_id.clone()) {
            return Err(StorefrontError::TransitionInFlight(order_id.clone()));
        }
        Ok(InFlight { set: &self.in_flight, order_id: order_id.clone() })
    }

    /// Applies `transition` to `order` and returns the updated order.
    ///
    /// Local checks (terminal state, actor authority, rejection reason) run
    /// before any request. When the server refuses the change, the order is
    /// re-fetched and returned inside [`StorefrontError::StaleOrder`] instead
    /// of trusting the local copy.
    pub async fn apply(&self, order: &Order, transition: Transition) -> Result<Order> {
        let mut updated = order.clone();
        if let Err(e) = updated.apply(self.actor, &transition) {
            debug!(order_id = %order.id(), actor = %self.actor, %transition, error = %e, "transition refused locally");
            return Err(e.into());
        }

        let _in_flight = self.begin(order.id())?;
        let remote = match &transition {
            Transition::Reject { reason } => self.api.reject_order(order.id(), reason.trim()).await,
            other => self.api.update_order_status(order.id(), other.target()).await,
        };

        match remote {
            Ok(()) => {
                for event in updated.take_events() {
                    log_event(self.actor, &event);
                }
                Ok(updated)
            }
            Err(e) if e.is_state_conflict() => {
                warn!(order_id = %order.id(), %transition, error = %e, "server refused transition, re-syncing");
                let current = self.fetch(order.id(), order.store_id()).await?;
                Err(StorefrontError::StaleOrder { order_id: order.id().clone(), current: Box::new(current) })
            }
            Err(e) => {
                warn!(order_id = %order.id(), %transition, error = %e, "transition request failed");
                Err(e.into())
            }
        }
    }

    /// Fetches the authoritative order, then applies `transition` to it.
    pub async fn apply_by_id(&self, order_id: &OrderId, store_id: &StoreId, transition: Transition) -> Result<Order> {
        let order = self.fetch(order_id, store_id).await?;
        self.apply(&order, transition).await
    }

    /// Reads one order from the feed this actor is entitled to see. Sellers and
    /// admins look in the store's orders, customers in their own.
    pub async fn fetch(&self, order_id: &OrderId, store_id: &StoreId) -> Result<Order> {
        let scope = match self.actor {
            Actor::Seller | Actor::Admin => FeedScope::Store(store_id.clone()),
            Actor::Customer => FeedScope::Mine,
        };
        scope.fetch(self.api.as_ref()).await?
            .into_iter()
            .find(|o| o.id() == order_id)
            .ok_or_else(|| StorefrontError::OrderNotFound(order_id.clone()))
    }
}

fn log_event(actor: Actor, event: &OrderEvent) {
    match event {
        OrderEvent::StatusChanged { order_id, from, to } => info!(%order_id, %actor, %from, %to, "order status changed"),
        OrderEvent::Rejected { order_id, reason } => info!(%order_id, %actor, reason = %reason, "order rejected"),
    }
}

/// Last known list of orders for one scope, re-fetched in full on demand.
pub struct OrderFeed {
    api: Arc<dyn StorefrontApi>,
    scope: FeedScope,
    orders: watch::Sender<Vec<Order>>,
}

impl std::fmt::Debug for OrderFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderFeed").field("scope", &self.scope).finish_non_exhaustive()
    }
}

impl OrderFeed {
    pub fn new(api: Arc<dyn StorefrontApi>, scope: FeedScope) -> Self {
        let (orders, _) = watch::channel(Vec::new());
        Self { api, scope, orders }
    }

    pub fn scope(&self) -> &FeedScope { &self.scope }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Order>> { self.orders.subscribe() }

    pub fn snapshot(&self) -> Vec<Order> { self.orders.borrow().clone() }

    /// Fetches a fresh list. Doubles as the manual retry after a failure;
    /// on error the previous snapshot is kept.
    pub async fn reload(&self) -> Result<Vec<Order>> {
        let mut orders = self.scope.fetch(self.api.as_ref()).await.map_err(|e| {
            warn!(scope = ?self.scope, error = %e, "order feed reload failed");
            StorefrontError::from(e)
        })?;
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        debug!(scope = ?self.scope, count = orders.len(), "order feed reloaded");
        self.orders.send_replace(orders.clone());
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockStorefrontApi;
    use crate::test::GatedApi;
    use crate::domain::aggregates::{OrderLine, OrderStatus, PaymentMethod};
    use crate::ErrorKind;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn order(id: &str, status: OrderStatus) -> Order {
        let line = OrderLine { menu_id: "m".into(), name: "Com ga".into(), price: Decimal::new(40000, 0), quantity: 1, note: None, image_url: None };
        Order::from_parts(id.into(), "S1".into(), None, vec![line], PaymentMethod::Cod, status, "1 Le Loi", Utc::now())
    }

    #[tokio::test]
    async fn test_seller_confirms() {
        let mut api = MockStorefrontApi::new();
        api.expect_update_order_status()
            .withf(|id, status| id.as_str() == "o1" && *status == OrderStatus::Confirmed)
            .times(1)
            .returning(|_, _| Ok(()));
        let seller = OrderLifecycle::new(Arc::new(api), Actor::Seller);
        let updated = seller.apply(&order("o1", OrderStatus::Pending), Transition::Confirm).await.unwrap();
        assert_eq!(updated.status(), OrderStatus::Confirmed);
        assert!(!seller.is_pending(&"o1".into()));
    }

    #[tokio::test]
    async fn test_empty_rejection_reason_never_reaches_server() {
        let mut api = MockStorefrontApi::new();
        api.expect_reject_order().never();
        let seller = OrderLifecycle::new(Arc::new(api), Actor::Seller);
        let err = seller.apply(&order("o1", OrderStatus::Pending), Transition::Reject { reason: "".into() }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[tokio::test]
    async fn test_reject_sends_reason() {
        let mut api = MockStorefrontApi::new();
        api.expect_reject_order().withf(|_, reason| reason.trim() == "Het mon").times(1).returning(|_, _| Ok(()));
        let seller = OrderLifecycle::new(Arc::new(api), Actor::Seller);
        let updated = seller.apply(&order("o1", OrderStatus::Pending), Transition::Reject { reason: " Het mon ".into() }).await.unwrap();
        assert_eq!(updated.status(), OrderStatus::Rejected);
        assert_eq!(updated.rejection_reason(), Some("Het mon"));
    }

    #[tokio::test]
    async fn test_terminal_orders_are_conflicts() {
        let mut api = MockStorefrontApi::new();
        api.expect_update_order_status().never();
        let seller = OrderLifecycle::new(Arc::new(api), Actor::Seller);
        for status in [OrderStatus::Completed, OrderStatus::Cancelled, OrderStatus::Rejected] {
            let err = seller.apply(&order("o1", status), Transition::Complete).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Conflict);
        }
    }

    #[tokio::test]
    async fn test_server_conflict_resyncs() {
        let mut api = MockStorefrontApi::new();
        api.expect_update_order_status().returning(|_, _| Err(ApiError::Status { status: 409, message: "already completed".into() }));
        api.expect_store_orders()
            .withf(|store| store.as_str() == "S1")
            .returning(|_| Ok(vec![order("o1", OrderStatus::Completed), order("o2", OrderStatus::Pending)]));
        let seller = OrderLifecycle::new(Arc::new(api), Actor::Seller);
        let err = seller.apply(&order("o1", OrderStatus::Ready), Transition::Complete).await.unwrap_err();
        match err {
            StorefrontError::StaleOrder { current, .. } => assert_eq!(current.status(), OrderStatus::Completed),
            other => panic!("expected stale order, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_customer_cancels_pending() {
        let mut api = MockStorefrontApi::new();
        api.expect_update_order_status()
            .withf(|_, status| *status == OrderStatus::Cancelled)
            .returning(|_, _| Ok(()));
        let customer = OrderLifecycle::new(Arc::new(api), Actor::Customer);
        let updated = customer.apply(&order("o1", OrderStatus::Pending), Transition::Cancel).await.unwrap();
        assert_eq!(updated.status(), OrderStatus::Cancelled);
        let err = customer.apply(&order("o2", OrderStatus::Pending), Transition::Confirm).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[tokio::test]
    async fn test_duplicate_request_is_refused_while_in_flight() {
        let seller = OrderLifecycle::new(Arc::new(MockStorefrontApi::new()), Actor::Seller);
        let guard = seller.begin(&"o1".into()).unwrap();
        assert!(seller.is_pending(&"o1".into()));
        assert!(matches!(seller.begin(&"o1".into()), Err(StorefrontError::TransitionInFlight(_))));
        assert!(seller.begin(&"o2".into()).is_ok());
        drop(guard);
        assert!(seller.begin(&"o1".into()).is_ok());
    }

    #[tokio::test]
    async fn test_apply_by_id_uses_authoritative_status() {
        let mut api = MockStorefrontApi::new();
        api.expect_store_orders().returning(|_| Ok(vec![order("o1", OrderStatus::Preparing)]));
        api.expect_update_order_status()
            .withf(|_, status| *status == OrderStatus::Ready)
            .times(1)
            .returning(|_, _| Ok(()));
        let seller = OrderLifecycle::new(Arc::new(api), Actor::Seller);
        let updated = seller.apply_by_id(&"o1".into(), &"S1".into(), Transition::MarkReady).await.unwrap();
        assert_eq!(updated.status(), OrderStatus::Ready);
        let err = seller.apply_by_id(&"zz".into(), &"S1".into(), Transition::MarkReady).await.unwrap_err();
        assert!(matches!(err, StorefrontError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_feed_reload_sorts_newest_first_and_keeps_snapshot_on_error() {
        let mut api = MockStorefrontApi::new();
        let mut calls = 0;
        api.expect_my_orders().returning(move || {
            calls += 1;
            if calls > 1 { return Err(ApiError::Status { status: 503, message: "busy".into() }); }
            let older = Order::from_parts("a".into(), "S1".into(), None, vec![], PaymentMethod::Cod, OrderStatus::Pending, "x", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
            let newer = Order::from_parts("b".into(), "S1".into(), None, vec![], PaymentMethod::Online, OrderStatus::Ready, "x", Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
            Ok(vec![older, newer])
        });
        let feed = OrderFeed::new(Arc::new(api), FeedScope::Mine);
        let orders = feed.reload().await.unwrap();
        assert_eq!(orders[0].id().as_str(), "b");
        assert!(feed.reload().await.unwrap_err().is_retryable());
        assert_eq!(feed.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_admin_cancels_from_store_orders() {
        let mut api = MockStorefrontApi::new();
        api.expect_my_orders().never();
        api.expect_store_orders()
            .withf(|store| store.as_str() == "S1")
            .returning(|_| Ok(vec![order("o1", OrderStatus::Pending)]));
        api.expect_update_order_status()
            .withf(|id, status| id.as_str() == "o1" && *status == OrderStatus::Cancelled)
            .times(1)
            .returning(|_, _| Ok(()));
        let admin = OrderLifecycle::new(Arc::new(api), Actor::Admin);
        let updated = admin.apply_by_id(&"o1".into(), &"S1".into(), Transition::Cancel).await.unwrap();
        assert_eq!(updated.status(), OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_concurrent_transition_on_same_order_is_refused() {
        let api = Arc::new(GatedApi::new());
        let seller = OrderLifecycle::new(api.clone(), Actor::Seller);
        let pending = order("o1", OrderStatus::Pending);

        let second = async {
            api.wait_for(1).await;
            assert!(seller.is_pending(pending.id()));
            let refused = seller.apply(&pending, Transition::Confirm).await;
            api.open();
            refused
        };
        let (first, refused) = tokio::join!(seller.apply(&pending, Transition::Confirm), second);

        assert_eq!(first.unwrap().status(), OrderStatus::Confirmed);
        assert!(matches!(refused, Err(StorefrontError::TransitionInFlight(id)) if id.as_str() == "o1"));
        assert_eq!(api.calls(), vec!["start status o1=Confirmed".to_string(), "end status o1=Confirmed".to_string()]);
        assert!(!seller.is_pending(pending.id()));
    }
}
