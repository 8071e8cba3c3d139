//! Payment gateway abstraction and the signed callback parameter set.
//!
//! The provider signs every response and callback with HMAC-SHA256 over the
//! `checkout-*` parameters and the body (see [`crate::hmac::canonical_message`]).

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::constants::{CHECKOUT_PREFIX, SIGNATURE_ALGORITHM};
use crate::error::StorefrontError;
use crate::order::{Currency, LineItem};

pub mod http;

pub use http::{GatewayConfig, HttpGatewayClient};

/// Case-normalized parameter map, as received in headers or a query string.
pub type SignedParams = BTreeMap<String, String>;

/// Build a [`SignedParams`] map, lowercasing keys.
pub fn param_map<'a, I>(pairs: I) -> SignedParams
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect()
}

/// External payment provider.
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted-checkout session for one payment attempt.
    fn open_payment(
        &self,
        request: &PaymentRequest,
    ) -> impl std::future::Future<Output = Result<ProviderSession, StorefrontError>> + Send;

    /// Recompute the MAC over `params` and `body` and compare it in constant
    /// time with the `signature` parameter.
    fn verify_signature(&self, params: &SignedParams, body: &[u8]) -> bool;
}

/// What the provider is asked to charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Sent as the provider `stamp`, unique per attempt.
    pub attempt_id: Uuid,
    /// Sent as the provider `reference`.
    pub order_id: Uuid,
    pub amount: u64,
    pub currency: Currency,
    pub items: Vec<LineItem>,
}

/// Provider answer to a successful `open_payment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub transaction_id: String,
    pub redirect_url: String,
}

/// Provider-reported result carried by a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// `ok`
    Paid,
    /// `cancel`
    Cancelled,
    /// `fail`
    Declined,
    /// `pending`, `new` or `delayed`: nothing settled yet.
    Pending,
}

impl CallbackOutcome {
    pub fn parse(status: &str) -> Result<Self, StorefrontError> {
        match status {
            "ok" => Ok(Self::Paid),
            "cancel" => Ok(Self::Cancelled),
            "fail" => Ok(Self::Declined),
            "pending" | "new" | "delayed" => Ok(Self::Pending),
            other => Err(StorefrontError::InvalidCallback(format!(
                "unknown checkout-status '{other}'"
            ))),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "ok",
            Self::Cancelled => "cancel",
            Self::Declined => "fail",
            Self::Pending => "pending",
        }
    }
}

/// Parsed signed callback parameters. Only build one after the signature
/// over the raw parameters has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub account: String,
    pub amount: u64,
    pub attempt_id: Uuid,
    pub order_id: Uuid,
    pub transaction_id: String,
    pub outcome: CallbackOutcome,
    pub provider: Option<String>,
}

fn required<'p>(params: &'p SignedParams, name: &str) -> Result<&'p str, StorefrontError> {
    params
        .get(&format!("{CHECKOUT_PREFIX}{name}"))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StorefrontError::InvalidCallback(format!("missing {CHECKOUT_PREFIX}{name}")))
}

impl CallbackParams {
    pub fn from_params(params: &SignedParams) -> Result<Self, StorefrontError> {
        let get = |name: &str| required(params, name);

        let algorithm = get("algorithm")?;
        if algorithm != SIGNATURE_ALGORITHM {
            return Err(StorefrontError::InvalidCallback(format!(
                "unsupported algorithm '{algorithm}'"
            )));
        }

        let amount = get("amount")?
            .parse::<u64>()
            .map_err(|_| StorefrontError::InvalidCallback("amount is not an integer".into()))?;
        let attempt_id = Uuid::parse_str(get("stamp")?)
            .map_err(|_| StorefrontError::InvalidCallback("stamp is not a uuid".into()))?;
        let order_id = Uuid::parse_str(get("reference")?)
            .map_err(|_| StorefrontError::InvalidCallback("reference is not a uuid".into()))?;

        Ok(Self {
            account: get("account")?.to_string(),
            amount,
            attempt_id,
            order_id,
            transaction_id: get("transaction-id")?.to_string(),
            outcome: CallbackOutcome::parse(get("status")?)?,
            provider: params
                .get(&format!("{CHECKOUT_PREFIX}provider"))
                .filter(|v| !v.is_empty())
                .cloned(),
        })
    }
}
