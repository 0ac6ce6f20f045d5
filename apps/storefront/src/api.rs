//! # Storefront API
//!
//! The seam between the checkout session and the storefront backend.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST /promo-codes/validate  {code, user_id, subtotal}                  │
//! │                              → {promo | null, applicable, reason?}      │
//! │  GET  /cities                → {data: [city, ...]}                      │
//! │  POST /orders                {user_id, address_id, promo_code_id, ...}  │
//! │                              → {order: {id, totals...}}                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transport failures come back as `CoreError::Network` (retriable);
//! payloads that do not decode come back as `CoreError::MalformedPayload`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use basket_core::wire::{
    CityListResponse, CouponLookupRequest, CouponLookupResponse, OrderCreated, OrderSubmission,
};
use basket_core::{CoreError, CoreResult, RejectionReason};

use crate::config::ApiConfig;
use crate::error::AppResult;

/// Header carrying the per-attempt order key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Storefront backend operations used by the checkout session.
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    /// Asks the server whether `request.code` applies to this cart.
    async fn lookup_coupon(&self, request: &CouponLookupRequest)
        -> CoreResult<CouponLookupResponse>;

    /// Fetches the delivery cities and their shipping rules.
    async fn list_cities(&self) -> CoreResult<CityListResponse>;

    /// Places an order. Resubmitting with the same `idempotency_key` must
    /// not create a second order.
    async fn submit_order(
        &self,
        order: &OrderSubmission,
        idempotency_key: &str,
    ) -> CoreResult<OrderCreated>;
}

// =============================================================================
// HTTP Client
// =============================================================================

/// [`StorefrontApi`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpStorefrontApi {
    client: Client,
    base_url: String,
}

impl HttpStorefrontApi {
    /// Builds a client with the configured timeout.
    pub fn new(config: &ApiConfig) -> AppResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(HttpStorefrontApi {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> CoreResult<Response> {
        request.send().await.map_err(transport_error)
    }
}

#[async_trait]
impl StorefrontApi for HttpStorefrontApi {
    async fn lookup_coupon(
        &self,
        request: &CouponLookupRequest,
    ) -> CoreResult<CouponLookupResponse> {
        debug!(code = %request.code, "POST /promo-codes/validate");
        let builder = self.client.post(self.url("/promo-codes/validate")).json(request);
        let response = self.execute(builder).await?;

        // Some deployments answer an unknown code with 404 instead of a null promo
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(CouponLookupResponse {
                promo: None,
                applicable: false,
                reason: Some(RejectionReason::NotFound.as_code().to_string()),
            });
        }
        decode("coupon lookup response", response).await
    }

    async fn list_cities(&self) -> CoreResult<CityListResponse> {
        debug!("GET /cities");
        let response = self.execute(self.client.get(self.url("/cities"))).await?;
        decode("city list", response).await
    }

    async fn submit_order(
        &self,
        order: &OrderSubmission,
        idempotency_key: &str,
    ) -> CoreResult<OrderCreated> {
        debug!(items = order.items.len(), key = %idempotency_key, "POST /orders");
        let builder = self
            .client
            .post(self.url("/orders"))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(order);
        let response = self.execute(builder).await?;
        decode("order response", response).await
    }
}

async fn decode<T: DeserializeOwned>(what: &str, response: Response) -> CoreResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(what, status, &body));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| CoreError::malformed(what, e.to_string()))
}

fn transport_error(err: reqwest::Error) -> CoreError {
    warn!(error = %err, "Storefront API unreachable");
    CoreError::network(err.to_string())
}

/// Server-side and throttling failures are worth retrying; other statuses
/// mean the request itself was wrong.
fn status_error(what: &str, status: StatusCode, body: &str) -> CoreError {
    let detail = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        warn!(status = status.as_u16(), "Storefront API failed");
        CoreError::network(detail)
    } else {
        CoreError::malformed(what, detail)
    }
}
