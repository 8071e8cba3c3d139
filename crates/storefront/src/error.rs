use thiserror::Error;
use uuid::Uuid;

/// Coarse classification used by the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape, rejected before touching state.
    Validation,
    NotFound,
    Forbidden,
    /// Signature verification failed.
    Trust,
    /// Payment gateway unreachable, timed out or refused the request.
    Upstream,
    /// Refused because the operation would break an order invariant.
    Invariant,
    Internal,
}

/// Errors returned by storefront operations.
#[derive(Debug, Error)]
pub enum StorefrontError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("cart is empty")]
    EmptyCart,

    #[error("product {product_id} is unavailable: {reason}")]
    ProductUnavailable { product_id: String, reason: String },

    #[error("product {product_id} is priced in {found}, store currency is {expected}")]
    CurrencyMismatch {
        product_id: String,
        expected: String,
        found: String,
    },

    #[error("order total overflows")]
    AmountOverflow,

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("payment attempt not found: {0}")]
    AttemptNotFound(Uuid),

    #[error("order {0} belongs to another user")]
    NotOwner(Uuid),

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("payment gateway timed out")]
    GatewayTimeout,

    #[error("payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("callback signature verification failed")]
    UntrustedCallback,

    #[error("invalid callback: {0}")]
    InvalidCallback(String),

    #[error("callback amount {received} does not match attempt amount {expected}")]
    AmountMismatch { expected: u64, received: u64 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl StorefrontError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidCallback(_) => ErrorKind::Validation,
            Self::ProductNotFound(_) | Self::OrderNotFound(_) | Self::AttemptNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::NotOwner(_) => ErrorKind::Forbidden,
            Self::UntrustedCallback => ErrorKind::Trust,
            Self::GatewayUnavailable(_) | Self::GatewayTimeout | Self::GatewayRejected(_) => {
                ErrorKind::Upstream
            }
            Self::EmptyCart
            | Self::ProductUnavailable { .. }
            | Self::CurrencyMismatch { .. }
            | Self::AmountOverflow
            | Self::AmountMismatch { .. } => ErrorKind::Invariant,
            Self::Storage(_) | Self::SerdeError(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code, safe to return to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request",
            Self::EmptyCart => "empty_cart",
            Self::ProductUnavailable { .. } => "product_unavailable",
            Self::CurrencyMismatch { .. } => "currency_mismatch",
            Self::AmountOverflow => "amount_overflow",
            Self::ProductNotFound(_) => "product_not_found",
            Self::OrderNotFound(_) => "order_not_found",
            Self::AttemptNotFound(_) => "payment_not_found",
            Self::NotOwner(_) => "not_owner",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
            Self::GatewayTimeout => "gateway_timeout",
            Self::GatewayRejected(_) => "gateway_rejected",
            Self::UntrustedCallback => "untrusted_callback",
            Self::InvalidCallback(_) => "invalid_callback",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::Storage(_) | Self::SerdeError(_) => "internal_error",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable(_) | Self::GatewayTimeout)
    }
}

impl From<rusqlite::Error> for StorefrontError {
    fn from(e: rusqlite::Error) -> Self {
        StorefrontError::Storage(e.to_string())
    }
}
