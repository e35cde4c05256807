//! reqwest client for the storefront REST API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{
    AddCartItemRequest, ApiError, CartItemRecord, CartPayload, CreateOrderRequest, CreateOrderResponse,
    RejectOrderRequest, StorefrontApi,
};
use crate::domain::aggregates::{MenuItem, Order, OrderStatus};
use crate::domain::value_objects::{CartItemId, MenuId, OrderId, StoreId};
use crate::storage::Credentials;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Auth {
    Required,
    Optional,
}

#[derive(Debug, Clone)]
pub struct HttpStorefrontApi {
    base_url: String,
    http: Client,
    credentials: Credentials,
}

impl HttpStorefrontApi {
    pub fn new(base_url: impl Into<String>, credentials: Credentials, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url: base_url.into().trim_end_matches('/').to_string(), http, credentials })
    }

    fn url(&self, path: &str) -> String { format!("{}/{}", self.base_url, path.trim_start_matches('/')) }

    /// Attaches the bearer token and maps non-2xx answers.
    ///
    /// Without a stored token a [`Auth::Required`] call fails before any
    /// network traffic. A 401 answer drops the stored token.
    async fn send(&self, request: RequestBuilder, auth: Auth) -> Result<Response, ApiError> {
        let token = self.credentials.token().await?;
        let request = match (token, auth) {
            (Some(token), _) => request.bearer_auth(token),
            (None, Auth::Required) => return Err(ApiError::Unauthorized),
            (None, Auth::Optional) => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!("remote API rejected credentials, clearing stored token");
            self.credentials.clear().await?;
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), message });
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StorefrontApi for HttpStorefrontApi {
    async fn get_cart(&self) -> Result<Vec<CartItemRecord>, ApiError> {
        let response = self.send(self.http.get(self.url("Cart")), Auth::Required).await?;
        Ok(Self::read_json::<CartPayload>(response).await?.into_items())
    }

    async fn add_cart_item(&self, request: &AddCartItemRequest) -> Result<CartItemRecord, ApiError> {
        let response = self.send(self.http.post(self.url("Cart/add-item")).json(request), Auth::Required).await?;
        Self::read_json(response).await
    }

    async fn update_cart_quantity(&self, item_id: &CartItemId, quantity: u32) -> Result<(), ApiError> {
        let url = self.url(&format!("Cart/update-quantity/{item_id}"));
        let body = serde_json::json!({ "quantity": quantity });
        self.send(self.http.put(url).json(&body), Auth::Required).await?;
        Ok(())
    }

    async fn remove_cart_item(&self, item_id: &CartItemId) -> Result<(), ApiError> {
        let url = self.url(&format!("Cart/remove-item/{item_id}"));
        self.send(self.http.delete(url), Auth::Required).await?;
        Ok(())
    }

    async fn clear_cart(&self) -> Result<(), ApiError> {
        self.send(self.http.delete(self.url("Cart/clear")), Auth::Required).await?;
        Ok(())
    }

    async fn get_menu(&self, menu_id: &MenuId) -> Result<MenuItem, ApiError> {
        let response = self.send(self.http.get(self.url(&format!("Menus/{menu_id}"))), Auth::Optional).await?;
        Self::read_json(response).await
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<CreateOrderResponse, ApiError> {
        let response = self.send(self.http.post(self.url("Orders")).json(request), Auth::Required).await?;
        Self::read_json(response).await
    }

    async fn update_order_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<(), ApiError> {
        // The endpoint takes the bare status as a JSON string.
        let url = self.url(&format!("orders/{order_id}/status"));
        self.send(self.http.put(url).json(&status), Auth::Required).await?;
        Ok(())
    }

    async fn reject_order(&self, order_id: &OrderId, reason: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("orders/{order_id}/reject"));
        self.send(self.http.put(url).json(&RejectOrderRequest { reason }), Auth::Required).await?;
        Ok(())
    }

    async fn my_orders(&self) -> Result<Vec<Order>, ApiError> {
        let response = self.send(self.http.get(self.url("Orders/myorders")), Auth::Required).await?;
        Self::read_json(response).await
    }

    async fn store_orders(&self, store_id: &StoreId) -> Result<Vec<Order>, ApiError> {
        let response = self.send(self.http.get(self.url(&format!("orders/store/{store_id}"))), Auth::Required).await?;
        Self::read_json(response).await
    }
}
