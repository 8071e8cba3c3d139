//! HTTP client for a Paytrail-style hosted checkout API.
//!
//! Requests are signed with the merchant secret; responses are only trusted
//! after their own signature checks out.

use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use super::{param_map, PaymentGateway, PaymentRequest, ProviderSession, SignedParams};
use crate::constants::{
    DEFAULT_GATEWAY_BASE_URL, DEFAULT_GATEWAY_TIMEOUT_SECS, SIGNATURE_ALGORITHM,
    SIGNATURE_HEADER,
};
use crate::error::StorefrontError;
use crate::hmac;

/// Merchant credentials and return URLs for the gateway.
#[derive(Clone)]
pub struct GatewayConfig {
    pub merchant_id: String,
    secret: Vec<u8>,
    pub base_url: String,
    /// Server-to-server status callbacks.
    pub callback_url: String,
    /// Browser redirect after a completed payment.
    pub success_url: String,
    /// Browser redirect after the user backs out.
    pub cancel_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("merchant_id", &self.merchant_id)
            .field("secret", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("callback_url", &self.callback_url)
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GatewayConfig {
    /// Config with return URLs derived from `return_base`
    /// (`{base}/callback`, `{base}/success`, `{base}/cancel`).
    pub fn new(merchant_id: impl Into<String>, secret: Vec<u8>, return_base: &str) -> Self {
        let base = return_base.trim_end_matches('/');
        Self {
            merchant_id: merchant_id.into(),
            secret,
            base_url: DEFAULT_GATEWAY_BASE_URL.to_string(),
            callback_url: format!("{base}/callback"),
            success_url: format!("{base}/success"),
            cancel_url: format!("{base}/cancel"),
            timeout: Duration::from_secs(DEFAULT_GATEWAY_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_return_urls(
        mut self,
        callback_url: impl Into<String>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        self.callback_url = callback_url.into();
        self.success_url = success_url.into();
        self.cancel_url = cancel_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentResponse {
    transaction_id: String,
    href: String,
}

/// [`PaymentGateway`] over HTTPS.
pub struct HttpGatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl HttpGatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, StorefrontError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                StorefrontError::GatewayUnavailable(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn request_body(&self, request: &PaymentRequest) -> serde_json::Value {
        let items: Vec<serde_json::Value> = request
            .items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "productCode": item.product_id,
                    "units": item.quantity,
                    "unitPrice": item.unit_price,
                })
            })
            .collect();
        serde_json::json!({
            "stamp": request.attempt_id.to_string(),
            "reference": request.order_id.to_string(),
            "amount": request.amount,
            "currency": request.currency.as_str(),
            "items": items,
            "redirectUrls": {
                "success": self.config.success_url,
                "cancel": self.config.cancel_url,
            },
            "callbackUrls": {
                "success": self.config.callback_url,
                "cancel": self.config.callback_url,
            },
        })
    }
}

fn transport_error(e: reqwest::Error) -> StorefrontError {
    if e.is_timeout() {
        StorefrontError::GatewayTimeout
    } else {
        StorefrontError::GatewayUnavailable(format!("request failed: {e}"))
    }
}

impl PaymentGateway for HttpGatewayClient {
    async fn open_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProviderSession, StorefrontError> {
        let url = format!("{}/payments", self.config.base_url.trim_end_matches('/'));
        let body = serde_json::to_vec(&self.request_body(request))?;

        let nonce = Uuid::new_v4().to_string();
        let timestamp =
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let headers = [
            ("checkout-account", self.config.merchant_id.as_str()),
            ("checkout-algorithm", SIGNATURE_ALGORITHM),
            ("checkout-method", "POST"),
            ("checkout-nonce", nonce.as_str()),
            ("checkout-timestamp", timestamp.as_str()),
        ];
        let signature = hmac::sign_params(self.config.secret(), headers, &body);

        let mut builder = self
            .http
            .post(&url)
            .header("Content-Type", "application/json; charset=utf-8");
        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        let started = std::time::Instant::now();
        let resp = builder
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let resp_params: SignedParams = param_map(
            resp.headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str(), v))),
        );
        let bytes = resp.bytes().await.map_err(transport_error)?;
        tracing::debug!(
            order_id = %request.order_id,
            status = %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gateway create-payment call finished"
        );

        if status.is_server_error() {
            return Err(StorefrontError::GatewayUnavailable(format!(
                "provider returned {status}"
            )));
        }
        if status.is_client_error() {
            return Err(StorefrontError::GatewayRejected(format!(
                "provider returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(StorefrontError::GatewayUnavailable(format!(
                "unexpected provider status {status}"
            )));
        }

        if !self.verify_signature(&resp_params, &bytes) {
            tracing::warn!(
                order_id = %request.order_id,
                "gateway response failed signature verification"
            );
            return Err(StorefrontError::GatewayUnavailable(
                "provider response signature invalid".to_string(),
            ));
        }

        let parsed: CreatePaymentResponse = serde_json::from_slice(&bytes).map_err(|e| {
            StorefrontError::GatewayUnavailable(format!("malformed provider response: {e}"))
        })?;
        Ok(ProviderSession {
            transaction_id: parsed.transaction_id,
            redirect_url: parsed.href,
        })
    }

    fn verify_signature(&self, params: &SignedParams, body: &[u8]) -> bool {
        // Missing signature verifies against an empty MAC and fails there.
        let signature = params
            .get(SIGNATURE_HEADER)
            .map(String::as_str)
            .unwrap_or_default();
        hmac::verify_params(
            self.config.secret(),
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            body,
            signature,
        )
    }
}
