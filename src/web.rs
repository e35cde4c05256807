//! HTTP surface of the companion service.
//!
//! One process serves one signed-in session: the stored bearer token decides
//! who the remote API sees, and the routes below expose the cart, checkout and
//! order services to a local front end.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::api::StorefrontApi;
use crate::domain::aggregates::{Actor, Cart, CartItem, CheckoutLine, Order, OrderDraft, PaymentOption, Transition};
use crate::domain::value_objects::{CartItemId, MenuId, OrderId, ShippingInfo, StoreId};
use crate::services::{
    CartStore, CheckoutAssembler, CheckoutSource, DraftCache, FeedScope, NotificationBridge, OrderFeed, OrderLifecycle,
    OrderSubmissionService, ShippingInfoStore, SubmissionOutcome,
};
use crate::storage::{Credentials, SessionStorage};
use crate::{ErrorKind, Navigation, Result, StorefrontError};

#[derive(Clone)]
pub struct AppState {
    pub cart: Arc<CartStore>,
    pub assembler: Arc<CheckoutAssembler>,
    pub shipping: ShippingInfoStore,
    pub submission: Arc<OrderSubmissionService>,
    pub customer: Arc<OrderLifecycle>,
    pub seller: Arc<OrderLifecycle>,
    pub admin: Arc<OrderLifecycle>,
    pub my_orders: Arc<OrderFeed>,
    pub store_orders: Arc<RwLock<HashMap<StoreId, Arc<OrderFeed>>>>,
    pub bridge: Arc<NotificationBridge>,
    pub credentials: Credentials,
    api: Arc<dyn StorefrontApi>,
}

impl AppState {
    pub fn new(api: Arc<dyn StorefrontApi>, storage: Arc<dyn SessionStorage>) -> Self {
        let cache = DraftCache::new(storage.clone());
        let my_orders = Arc::new(OrderFeed::new(api.clone(), FeedScope::Mine));
        let bridge = Arc::new(NotificationBridge::new());
        bridge.register(my_orders.clone());
        Self {
            cart: Arc::new(CartStore::new(api.clone())),
            assembler: Arc::new(CheckoutAssembler::new(api.clone(), cache.clone())),
            shipping: ShippingInfoStore::new(storage.clone()),
            submission: Arc::new(OrderSubmissionService::new(api.clone(), cache)),
            customer: Arc::new(OrderLifecycle::new(api.clone(), Actor::Customer)),
            seller: Arc::new(OrderLifecycle::new(api.clone(), Actor::Seller)),
            admin: Arc::new(OrderLifecycle::new(api.clone(), Actor::Admin)),
            my_orders,
            store_orders: Arc::new(RwLock::new(HashMap::new())),
            bridge,
            credentials: Credentials::new(storage),
            api,
        }
    }

    fn lifecycle(&self, actor: Actor) -> &OrderLifecycle {
        match actor {
            Actor::Customer => &self.customer,
            Actor::Seller => &self.seller,
            Actor::Admin => &self.admin,
        }
    }

    /// The feed for one store, created and registered with the bridge on first use.
    pub async fn store_feed(&self, store_id: &StoreId) -> Arc<OrderFeed> {
        if let Some(feed) = self.store_orders.read().await.get(store_id) {
            return feed.clone();
        }
        let mut feeds = self.store_orders.write().await;
        feeds
            .entry(store_id.clone())
            .or_insert_with(|| {
                let feed = Arc::new(OrderFeed::new(self.api.clone(), FeedScope::Store(store_id.clone())));
                self.bridge.register(feed.clone());
                feed
            })
            .clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-orders"})) }))
        .route("/session", put(sign_in).delete(sign_out))
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_cart_item))
        .route("/cart/items/:id", put(update_cart_item).delete(remove_cart_item))
        .route("/checkout/draft", get(resume_draft).post(assemble_draft))
        .route("/checkout/submit", post(submit_order))
        .route("/shipping", get(get_shipping).put(save_shipping))
        .route("/orders/mine", get(my_orders))
        .route("/orders/:id/transitions", post(transition_order))
        .route("/stores/:id/orders", get(store_orders))
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: ErrorKind,
    retryable: bool,
    redirect: Option<Navigation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<&'a Order>,
}

impl StorefrontError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CartItemNotFound(_) | Self::OrderNotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Serialization(_) | Self::Bridge(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => match self.kind() {
                ErrorKind::Precondition => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Authorization => StatusCode::UNAUTHORIZED,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Transient => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self, status = status.as_u16(), "request failed");
        } else {
            debug!(error = %self, status = status.as_u16(), "request refused");
        }
        let current = match &self {
            Self::StaleOrder { current, .. } => Some(current.as_ref()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            retryable: self.is_retryable(),
            redirect: self.navigation(),
            current,
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Deserialize)]
struct SignIn {
    token: String,
}

async fn sign_in(State(s): State<AppState>, Json(req): Json<SignIn>) -> Result<Json<CartView>> {
    s.credentials.set_token(&req.token).await?;
    let cart = s.cart.refresh().await?;
    Ok(Json(CartView::from(&cart)))
}

async fn sign_out(State(s): State<AppState>) -> Result<StatusCode> {
    s.credentials.clear().await?;
    s.cart.refresh().await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CartView {
    items: Vec<CartItem>,
    item_count: usize,
    total_quantity: u32,
    total: Decimal,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self { items: cart.items().to_vec(), item_count: cart.item_count(), total_quantity: cart.total_quantity(), total: cart.total() }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItem {
    menu_id: MenuId,
    #[serde(default = "one")]
    quantity: u32,
    #[serde(default)]
    note: Option<String>,
}

fn one() -> u32 { 1 }

#[derive(Deserialize)]
struct SetQuantity {
    quantity: u32,
}

async fn get_cart(State(s): State<AppState>) -> Result<Json<CartView>> {
    let cart = s.cart.refresh().await?;
    Ok(Json(CartView::from(&cart)))
}

async fn add_cart_item(State(s): State<AppState>, Json(req): Json<AddItem>) -> Result<(StatusCode, Json<CartItem>)> {
    let item = s.cart.add_item(req.menu_id, req.quantity, req.note).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_cart_item(State(s): State<AppState>, Path(id): Path<String>, Json(req): Json<SetQuantity>) -> Result<Json<CartView>> {
    s.cart.update_quantity(&CartItemId::new(id), req.quantity).await?;
    Ok(Json(CartView::from(&s.cart.snapshot().await)))
}

async fn remove_cart_item(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<CartView>> {
    s.cart.remove_item(&CartItemId::new(id)).await?;
    Ok(Json(CartView::from(&s.cart.snapshot().await)))
}

async fn clear_cart(State(s): State<AppState>) -> Result<StatusCode> {
    s.cart.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Checkout
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftRequest {
    /// Check out this single line instead of the cart.
    #[serde(default)]
    buy_now: Option<CheckoutLine>,
    #[serde(default)]
    payment: PaymentOption,
    #[serde(default)]
    shipping: Option<ShippingInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    #[serde(default)]
    payment: Option<PaymentOption>,
    #[serde(default)]
    shipping: Option<ShippingInfo>,
}

#[derive(Serialize)]
struct SubmitResponse {
    #[serde(flatten)]
    outcome: SubmissionOutcome,
    redirect: Navigation,
}

async fn assemble_draft(State(s): State<AppState>, Json(req): Json<DraftRequest>) -> Result<(StatusCode, Json<OrderDraft>)> {
    let source = match req.buy_now {
        Some(item) => CheckoutSource::BuyNow { item },
        None => CheckoutSource::from_cart(&s.cart.refresh().await?),
    };
    let shipping = s.shipping.load(req.shipping).await?;
    let shipping = (!shipping.is_empty()).then_some(shipping);
    let draft = s.assembler.assemble(source, shipping, req.payment).await?;
    Ok((StatusCode::CREATED, Json(draft)))
}

async fn resume_draft(State(s): State<AppState>) -> Result<Json<Option<OrderDraft>>> {
    Ok(Json(s.assembler.resume().await?))
}

async fn submit_order(State(s): State<AppState>, Json(req): Json<SubmitRequest>) -> Result<Json<SubmitResponse>> {
    let mut draft = s.assembler.resume().await?.ok_or(StorefrontError::EmptyCart)?;
    // Shipping copied into the draft at assembly may be outdated; the last saved values win.
    let shipping = s.shipping.require(req.shipping).await?;
    draft = draft.with_shipping(shipping);
    if let Some(payment) = req.payment {
        draft = draft.with_payment(payment);
    }

    let outcome = s.submission.submit(&draft).await?;
    if let SubmissionOutcome::Placed { .. } = outcome {
        if let Err(e) = s.cart.refresh().await {
            warn!(error = %e, "cart refresh after order placement failed");
        }
    }
    let redirect = outcome.navigation();
    Ok(Json(SubmitResponse { outcome, redirect }))
}

async fn get_shipping(State(s): State<AppState>) -> Result<Json<ShippingInfo>> {
    Ok(Json(s.shipping.load(None).await?))
}

async fn save_shipping(State(s): State<AppState>, Json(req): Json<ShippingInfo>) -> Result<Json<ShippingInfo>> {
    Ok(Json(s.shipping.save(&req.delivery_address, &req.phone_number).await?))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransitionRequest {
    actor: Actor,
    store_id: StoreId,
    #[serde(flatten)]
    transition: Transition,
}

async fn my_orders(State(s): State<AppState>) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.my_orders.reload().await?))
}

async fn store_orders(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<Order>>> {
    let feed = s.store_feed(&StoreId::new(id)).await;
    Ok(Json(feed.reload().await?))
}

async fn transition_order(State(s): State<AppState>, Path(id): Path<String>, Json(req): Json<TransitionRequest>) -> Result<Json<Order>> {
    let order_id = OrderId::new(id);
    let updated = s.lifecycle(req.actor).apply_by_id(&order_id, &req.store_id, req.transition).await?;
    // Dependent views re-fetch rather than patch in the returned order.
    let feed = match req.actor {
        Actor::Seller | Actor::Admin => s.store_feed(&req.store_id).await,
        Actor::Customer => s.my_orders.clone(),
    };
    if let Err(e) = feed.reload().await {
        warn!(order_id = %order_id, error = %e, "order feed reload after transition failed");
    }
    Ok(Json(updated))
}
