//! Persistence for orders, payment attempts, products and carts.
//!
//! Both traits are synchronous and are shared as `Arc<dyn ...>`. Every
//! status change is a compare-and-swap: the caller names the status it
//! expects to replace, and a `false` return means someone else got there
//! first and nothing was written.

use uuid::Uuid;

use crate::catalog::{CartLine, Product};
use crate::error::StorefrontError;
use crate::order::{AttemptStatus, CartSnapshot, Order, OrderStatus, PaymentAttempt};

pub mod memory;
pub mod sqlite;

pub use memory::{InMemoryCatalog, InMemoryOrderStore};
pub use sqlite::SqliteStore;

/// Attempt half of a joint order/attempt transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptTransition {
    pub attempt_id: Uuid,
    pub from: AttemptStatus,
    pub to: AttemptStatus,
    /// Recorded on the attempt when present.
    pub provider_reference: Option<String>,
}

impl AttemptTransition {
    pub fn new(attempt_id: Uuid, from: AttemptStatus, to: AttemptStatus) -> Self {
        Self {
            attempt_id,
            from,
            to,
            provider_reference: None,
        }
    }

    pub fn with_provider_reference(mut self, reference: Option<String>) -> Self {
        self.provider_reference = reference;
        self
    }
}

/// Storage backend for orders and their payment attempts.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait OrderStore: Send + Sync {
    /// Persist a new PENDING order with its line items. All-or-nothing.
    fn create_order(&self, user_id: &str, snapshot: CartSnapshot)
        -> Result<Order, StorefrontError>;

    /// Compare-and-swap the order status.
    ///
    /// Returns `false` without writing if the current status is not `from`
    /// or `from → to` is not a legal transition.
    fn update_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StorefrontError>;

    fn get_by_id(&self, order_id: Uuid) -> Result<Order, StorefrontError>;

    /// Orders of one user, newest first.
    fn list_by_user(&self, user_id: &str) -> Result<Vec<Order>, StorefrontError>;

    /// Atomically move the order `from → AWAITING_PAYMENT` and record the
    /// ACTIVE `attempt`. Returns `false` and writes nothing on a miss.
    fn begin_payment(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        attempt: &PaymentAttempt,
    ) -> Result<bool, StorefrontError>;

    /// Atomically CAS the order and, if given, one of its attempts.
    /// If either side misses nothing changes and `false` is returned.
    fn transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        attempt: Option<&AttemptTransition>,
    ) -> Result<bool, StorefrontError>;

    fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<PaymentAttempt>, StorefrontError>;

    fn active_attempt(&self, order_id: Uuid) -> Result<Option<PaymentAttempt>, StorefrontError>;

    /// All attempts of an order, oldest first.
    fn attempts_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentAttempt>, StorefrontError>;

    /// ACTIVE attempts created before `cutoff` whose order awaits payment.
    fn stale_active_attempts(&self, cutoff: i64) -> Result<Vec<PaymentAttempt>, StorefrontError>;

    /// Cheap liveness probe for health checks.
    fn ping(&self) -> Result<(), StorefrontError> {
        Ok(())
    }
}

/// Product catalog and per-user carts.
pub trait Catalog: Send + Sync {
    fn product(&self, product_id: &str) -> Result<Option<Product>, StorefrontError>;

    /// Active products ordered by id.
    fn list_products(&self) -> Result<Vec<Product>, StorefrontError>;

    fn upsert_product(&self, product: &Product) -> Result<(), StorefrontError>;

    /// Cart lines in the order they were first added.
    fn cart_lines(&self, user_id: &str) -> Result<Vec<CartLine>, StorefrontError>;

    /// Set the quantity of a cart line. Zero removes the line.
    fn set_cart_line(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), StorefrontError>;

    /// Returns whether a line was removed.
    fn remove_cart_line(&self, user_id: &str, product_id: &str) -> Result<bool, StorefrontError>;

    fn clear_cart(&self, user_id: &str) -> Result<(), StorefrontError>;

    /// Remove each of `lines` that the cart still holds with the same
    /// quantity. Lines added or changed since are kept. Returns how many
    /// were removed.
    fn remove_ordered_lines(
        &self,
        user_id: &str,
        lines: &[CartLine],
    ) -> Result<usize, StorefrontError>;
}

/// Attempts only ever move from ACTIVE to a terminal status.
pub(crate) fn attempt_move_is_legal(t: &AttemptTransition) -> bool {
    t.from == AttemptStatus::Active && t.to.is_terminal()
}
