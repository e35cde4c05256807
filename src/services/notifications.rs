//! Notification Bridge
//!
//! Push messages (new order for a store, status changed, payment confirmed,
//! store approved) are only signals. Every view they concern re-fetches its
//! data from the API; nothing in a message is written into local state.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::domain::events::Notification;
use crate::services::lifecycle::{FeedScope, OrderFeed};
use crate::{Result, StorefrontError};

/// Something that can bring itself back in line with the server.
#[async_trait]
pub trait Resync: Send + Sync {
    fn name(&self) -> String;

    fn interested_in(&self, notification: &Notification) -> bool;

    async fn resync(&self) -> Result<()>;
}

#[async_trait]
impl Resync for OrderFeed {
    fn name(&self) -> String {
        match self.scope() {
            FeedScope::Mine => "orders:mine".to_string(),
            FeedScope::Store(store_id) => format!("orders:store:{store_id}"),
        }
    }

    fn interested_in(&self, notification: &Notification) -> bool {
        match (self.scope(), notification) {
            (FeedScope::Store(mine), Notification::NewOrder { store_id, .. } | Notification::StoreApproved { store_id }) => mine == store_id,
            (FeedScope::Mine, Notification::NewOrder { .. } | Notification::StoreApproved { .. }) => false,
            // Status and payment messages carry no store, so every feed listens.
            (_, Notification::OrderStatusChanged { .. } | Notification::PaymentConfirmed { .. }) => true,
        }
    }

    async fn resync(&self) -> Result<()> {
        self.reload().await.map(|_| ())
    }
}

/// Routes push messages to the views they concern. Views can register at any time.
#[derive(Default)]
pub struct NotificationBridge {
    targets: RwLock<Vec<Arc<dyn Resync>>>,
}

impl std::fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let targets = self.targets.read().map(|t| t.len()).unwrap_or_default();
        f.debug_struct("NotificationBridge").field("targets", &targets).finish()
    }
}

impl NotificationBridge {
    pub fn new() -> Self { Self::default() }

    pub fn register(&self, target: Arc<dyn Resync>) {
        if let Ok(mut targets) = self.targets.write() {
            debug!(target = %target.name(), "resync target registered");
            targets.push(target);
        }
    }

    /// Re-fetches every interested target. Returns how many resynced successfully.
    pub async fn dispatch(&self, notification: &Notification) -> usize {
        let interested: Vec<_> = match self.targets.read() {
            Ok(targets) => targets.iter().filter(|t| t.interested_in(notification)).cloned().collect(),
            Err(_) => return 0,
        };
        let mut refreshed = 0;
        for target in interested {
            match target.resync().await {
                Ok(()) => refreshed += 1,
                Err(e) => warn!(target = %target.name(), error = %e, "resync after notification failed"),
            }
        }
        debug!(?notification, refreshed, "notification dispatched");
        refreshed
    }

    /// Consumes raw payloads until the stream ends. Undecodable payloads are skipped.
    pub async fn run<S>(&self, payloads: S)
    where
        S: Stream<Item = Vec<u8>> + Send,
    {
        let mut payloads = std::pin::pin!(payloads);
        while let Some(payload) = payloads.next().await {
            match serde_json::from_slice::<Notification>(&payload) {
                Ok(notification) => { self.dispatch(&notification).await; }
                Err(e) => warn!(error = %e, bytes = payload.len(), "ignoring undecodable notification"),
            }
        }
        info!("notification stream closed");
    }
}

/// Subscribes to `subject` on the NATS server at `url`, yielding message payloads.
pub async fn connect_nats(url: &str, subject: &str) -> Result<BoxStream<'static, Vec<u8>>> {
    let client = async_nats::connect(url).await.map_err(|e| StorefrontError::Bridge(e.to_string()))?;
    let subscriber = client.subscribe(subject.to_string()).await.map_err(|e| StorefrontError::Bridge(e.to_string()))?;
    info!(url, subject, "subscribed to notifications");
    Ok(subscriber.map(|message| message.payload.to_vec()).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, MockStorefrontApi};
    use crate::domain::aggregates::{Order, OrderStatus, PaymentMethod};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn order(id: &str) -> Order {
        Order::from_parts(id.into(), "S1".into(), None, vec![], PaymentMethod::Cod, OrderStatus::Pending, "x", Utc::now())
    }

    fn counting_store_feed(store: &str, calls: Arc<AtomicUsize>) -> Arc<OrderFeed> {
        let mut api = MockStorefrontApi::new();
        api.expect_store_orders().returning(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![order("o1")])
        });
        Arc::new(OrderFeed::new(Arc::new(api), FeedScope::Store(store.into())))
    }

    #[tokio::test]
    async fn test_new_order_refreshes_only_matching_store() {
        let s1_calls = Arc::new(AtomicUsize::new(0));
        let s2_calls = Arc::new(AtomicUsize::new(0));
        let s1 = counting_store_feed("S1", s1_calls.clone());
        let bridge = NotificationBridge::new();
        bridge.register(s1.clone());
        bridge.register(counting_store_feed("S2", s2_calls.clone()));

        let refreshed = bridge.dispatch(&Notification::NewOrder { store_id: "S1".into(), order_id: "o1".into() }).await;
        assert_eq!(refreshed, 1);
        assert_eq!(s1_calls.load(Ordering::SeqCst), 1);
        assert_eq!(s2_calls.load(Ordering::SeqCst), 0);
        assert_eq!(s1.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_status_change_refreshes_customer_feed() {
        let mut api = MockStorefrontApi::new();
        api.expect_my_orders().times(1).returning(|| Ok(vec![order("o1")]));
        let mine = Arc::new(OrderFeed::new(Arc::new(api), FeedScope::Mine));
        let bridge = NotificationBridge::new();
        bridge.register(mine.clone());

        assert!(!mine.interested_in(&Notification::StoreApproved { store_id: "S1".into() }));
        let n = Notification::OrderStatusChanged { order_id: "o1".into(), status: OrderStatus::Ready };
        assert_eq!(bridge.dispatch(&n).await, 1);
        assert_eq!(mine.snapshot()[0].id().as_str(), "o1");
    }

    #[tokio::test]
    async fn test_run_skips_garbage_and_survives_failed_reload() {
        let mut api = MockStorefrontApi::new();
        api.expect_my_orders().times(2).returning(|| Err(ApiError::Status { status: 503, message: "busy".into() }));
        let mine = Arc::new(OrderFeed::new(Arc::new(api), FeedScope::Mine));
        let bridge = NotificationBridge::new();
        bridge.register(mine);

        let payloads = futures::stream::iter(vec![
            br#"{"type":"PaymentConfirmed","orderId":"o1"}"#.to_vec(),
            b"not json".to_vec(),
            br#"{"type":"OrderStatusChanged","orderId":"o1","status":"Completed"}"#.to_vec(),
        ]);
        bridge.run(payloads).await;
    }
}
