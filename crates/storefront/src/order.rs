//! Orders, line items, payment attempts and their status machines.
//!
//! Money is carried as integer minor units (cents for EUR/USD).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorefrontError;

/// ISO 4217 currency code, three uppercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, StorefrontError> {
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code.to_string()))
        } else {
            Err(StorefrontError::Validation(format!(
                "invalid currency code '{code}'"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = StorefrontError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    AwaitingPayment,
    Paid,
    /// The provider declined the payment. The order may be paid again.
    Failed,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Terminal states are never left and never re-entered.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled | Self::Expired)
    }

    /// States from which a new payment attempt may be opened.
    pub const fn is_payable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending | Failed, AwaitingPayment)
                | (Pending | Failed, Cancelled)
                | (AwaitingPayment, Paid | Cancelled | Failed | Expired)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StorefrontError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => Self::Pending,
            "AWAITING_PAYMENT" => Self::AwaitingPayment,
            "PAID" => Self::Paid,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            "EXPIRED" => Self::Expired,
            other => {
                return Err(StorefrontError::Storage(format!(
                    "unknown order status '{other}'"
                )))
            }
        })
    }
}

/// Payment attempt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    /// Built locally, gateway has not answered yet. Never persisted.
    Created,
    Active,
    Confirmed,
    Failed,
    Expired,
}

impl AttemptStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Active => "ACTIVE",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Expired)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = StorefrontError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CREATED" => Self::Created,
            "ACTIVE" => Self::Active,
            "CONFIRMED" => Self::Confirmed,
            "FAILED" => Self::Failed,
            "EXPIRED" => Self::Expired,
            other => {
                return Err(StorefrontError::Storage(format!(
                    "unknown attempt status '{other}'"
                )))
            }
        })
    }
}

/// One priced line of an order. Immutable once the order exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub quantity: u32,
    /// Catalog price at the moment the order was created.
    pub unit_price: u64,
}

impl LineItem {
    pub fn subtotal(&self) -> Option<u64> {
        self.unit_price.checked_mul(u64::from(self.quantity))
    }
}

/// Sum of `quantity × unit_price`, refusing overflow.
pub fn total_of(items: &[LineItem]) -> Result<u64, StorefrontError> {
    items.iter().try_fold(0u64, |acc, item| {
        item.subtotal()
            .and_then(|s| acc.checked_add(s))
            .ok_or(StorefrontError::AmountOverflow)
    })
}

/// Immutable copy of a cart, priced from the catalog, taken at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    currency: Currency,
    items: Vec<LineItem>,
    total: u64,
}

impl CartSnapshot {
    pub fn new(currency: Currency, items: Vec<LineItem>) -> Result<Self, StorefrontError> {
        if items.is_empty() {
            return Err(StorefrontError::EmptyCart);
        }
        if let Some(line) = items.iter().find(|i| i.quantity == 0) {
            return Err(StorefrontError::Validation(format!(
                "line for product {} has zero quantity",
                line.product_id
            )));
        }
        let total = total_of(&items)?;
        Ok(Self {
            currency,
            items,
            total,
        })
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub items: Vec<LineItem>,
    pub currency: Currency,
    /// Derived from `items` at creation, never recomputed.
    pub total: u64,
    pub status: OrderStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// A fresh PENDING order consuming the snapshot.
    pub fn pending(user_id: &str, snapshot: CartSnapshot, now: i64) -> Self {
        let total = snapshot.total;
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            items: snapshot.items,
            currency: snapshot.currency,
            total,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// `total == Σ(quantity × unit_price)`.
    pub fn total_is_consistent(&self) -> bool {
        total_of(&self.items).is_ok_and(|t| t == self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Transaction id assigned by the provider, known once it has answered.
    pub provider_reference: Option<String>,
    pub redirect_url: Option<String>,
    pub amount: u64,
    pub status: AttemptStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PaymentAttempt {
    /// A CREATED attempt for the full order total.
    pub fn for_order(order: &Order, now: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            provider_reference: None,
            redirect_url: None,
            amount: order.total,
            status: AttemptStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the attempt ACTIVE with the provider's session details.
    pub fn activate(mut self, provider_reference: String, redirect_url: String, now: i64) -> Self {
        self.provider_reference = Some(provider_reference);
        self.redirect_url = Some(redirect_url);
        self.status = AttemptStatus::Active;
        self.updated_at = now;
        self
    }
}
