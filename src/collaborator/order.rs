//! Order-placement collaborator.
//!
//! The confirm room places one order per member through this fixed-contract
//! interface; the production implementation talks to the upstream order API
//! over HTTP. Handlers relay the single canonical result shape, no response
//! shape guessing.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream HTTP client timeout for one order call.
const ORDER_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a placed order, relayed verbatim to the requesting member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub id: String,
    pub menu_item_id: String,
    pub menu_name: String,
    pub status: String,
    pub order_number: i64,
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("order service returned status {0}")]
    UpstreamStatus(reqwest::StatusCode),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Place one order for `menu_item_id` and return the upstream result.
    async fn place_order(&self, menu_item_id: &str) -> Result<OrderResult, OrderError>;
}

#[derive(Serialize)]
struct PlaceOrderRequest<'a> {
    menu_item_id: &'a str,
}

/// `OrderService` over the upstream order API.
pub struct HttpOrderService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpOrderService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, OrderError> {
        let client = reqwest::Client::builder()
            .timeout(ORDER_HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl OrderService for HttpOrderService {
    async fn place_order(&self, menu_item_id: &str) -> Result<OrderResult, OrderError> {
        let url = format!("{}/v1/orders", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&PlaceOrderRequest { menu_item_id })
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            return Err(OrderError::UpstreamStatus(status));
        }
        Ok(response.json::<OrderResult>().await?)
    }
}
