//! DashMap-backed stores. Fast but lost on restart.
//!
//! Each order lives in one map entry together with its attempts, so holding
//! the entry's write guard makes a joint order/attempt update atomic.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use super::{attempt_move_is_legal, AttemptTransition, Catalog, OrderStore};
use crate::catalog::{CartLine, Product};
use crate::error::StorefrontError;
use crate::order::{AttemptStatus, CartSnapshot, Order, OrderStatus, PaymentAttempt};
use crate::unix_now;

struct OrderRecord {
    seq: u64,
    order: Order,
    attempts: Vec<PaymentAttempt>,
}

pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, OrderRecord>,
    attempt_index: DashMap<Uuid, Uuid>,
    next_seq: AtomicU64,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            attempt_index: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn create_order(
        &self,
        user_id: &str,
        snapshot: CartSnapshot,
    ) -> Result<Order, StorefrontError> {
        let order = Order::pending(user_id, snapshot, unix_now());
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.orders.insert(
            order.id,
            OrderRecord {
                seq,
                order: order.clone(),
                attempts: Vec::new(),
            },
        );
        Ok(order)
    }

    fn update_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StorefrontError> {
        let mut record = self
            .orders
            .get_mut(&order_id)
            .ok_or(StorefrontError::OrderNotFound(order_id))?;
        if record.order.status != from || !from.can_transition_to(to) {
            return Ok(false);
        }
        record.order.status = to;
        record.order.updated_at = unix_now();
        Ok(true)
    }

    fn get_by_id(&self, order_id: Uuid) -> Result<Order, StorefrontError> {
        self.orders
            .get(&order_id)
            .map(|r| r.order.clone())
            .ok_or(StorefrontError::OrderNotFound(order_id))
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<Order>, StorefrontError> {
        let mut found: Vec<(u64, Order)> = self
            .orders
            .iter()
            .filter(|r| r.order.user_id == user_id)
            .map(|r| (r.seq, r.order.clone()))
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, o)| o).collect())
    }

    fn begin_payment(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        attempt: &PaymentAttempt,
    ) -> Result<bool, StorefrontError> {
        if attempt.status != AttemptStatus::Active || attempt.order_id != order_id {
            return Err(StorefrontError::Validation(
                "only an ACTIVE attempt of this order can begin a payment".to_string(),
            ));
        }
        let mut record = self
            .orders
            .get_mut(&order_id)
            .ok_or(StorefrontError::OrderNotFound(order_id))?;
        if record.order.status != from
            || !from.can_transition_to(OrderStatus::AwaitingPayment)
            || record
                .attempts
                .iter()
                .any(|a| a.status == AttemptStatus::Active)
        {
            return Ok(false);
        }
        record.attempts.push(attempt.clone());
        record.order.status = OrderStatus::AwaitingPayment;
        record.order.updated_at = unix_now();
        self.attempt_index.insert(attempt.id, order_id);
        Ok(true)
    }

    fn transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        attempt: Option<&AttemptTransition>,
    ) -> Result<bool, StorefrontError> {
        if !from.can_transition_to(to) || attempt.is_some_and(|t| !attempt_move_is_legal(t)) {
            return Ok(false);
        }
        let mut guard = self
            .orders
            .get_mut(&order_id)
            .ok_or(StorefrontError::OrderNotFound(order_id))?;
        let record = &mut *guard;
        if record.order.status != from {
            return Ok(false);
        }

        let now = unix_now();
        if let Some(t) = attempt {
            let Some(a) = record.attempts.iter_mut().find(|a| a.id == t.attempt_id) else {
                return Ok(false);
            };
            if a.status != t.from {
                return Ok(false);
            }
            a.status = t.to;
            a.updated_at = now;
            if let Some(reference) = &t.provider_reference {
                a.provider_reference = Some(reference.clone());
            }
        }
        record.order.status = to;
        record.order.updated_at = now;
        Ok(true)
    }

    fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<PaymentAttempt>, StorefrontError> {
        let Some(order_id) = self.attempt_index.get(&attempt_id).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.orders.get(&order_id).and_then(|r| {
            r.attempts
                .iter()
                .find(|a| a.id == attempt_id)
                .cloned()
        }))
    }

    fn active_attempt(&self, order_id: Uuid) -> Result<Option<PaymentAttempt>, StorefrontError> {
        Ok(self.orders.get(&order_id).and_then(|r| {
            r.attempts
                .iter()
                .find(|a| a.status == AttemptStatus::Active)
                .cloned()
        }))
    }

    fn attempts_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentAttempt>, StorefrontError> {
        Ok(self
            .orders
            .get(&order_id)
            .map(|r| r.attempts.clone())
            .unwrap_or_default())
    }

    fn stale_active_attempts(&self, cutoff: i64) -> Result<Vec<PaymentAttempt>, StorefrontError> {
        let mut stale: Vec<PaymentAttempt> = self
            .orders
            .iter()
            .filter(|r| r.order.status == OrderStatus::AwaitingPayment)
            .flat_map(|r| {
                r.attempts
                    .iter()
                    .filter(|a| a.status == AttemptStatus::Active && a.created_at < cutoff)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        stale.sort_by_key(|a| a.created_at);
        Ok(stale)
    }
}

/// In-memory product catalog and carts.
pub struct InMemoryCatalog {
    products: DashMap<String, Product>,
    carts: DashMap<String, Vec<CartLine>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            products: DashMap::new(),
            carts: DashMap::new(),
        }
    }

    /// Catalog pre-populated with `products`.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let catalog = Self::new();
        for p in products {
            catalog.products.insert(p.id.clone(), p);
        }
        catalog
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog for InMemoryCatalog {
    fn product(&self, product_id: &str) -> Result<Option<Product>, StorefrontError> {
        Ok(self.products.get(product_id).map(|p| p.clone()))
    }

    fn list_products(&self) -> Result<Vec<Product>, StorefrontError> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|p| p.active)
            .map(|p| p.clone())
            .collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(products)
    }

    fn upsert_product(&self, product: &Product) -> Result<(), StorefrontError> {
        self.products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    fn cart_lines(&self, user_id: &str) -> Result<Vec<CartLine>, StorefrontError> {
        Ok(self
            .carts
            .get(user_id)
            .map(|c| c.clone())
            .unwrap_or_default())
    }

    fn set_cart_line(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), StorefrontError> {
        let mut cart = self.carts.entry(user_id.to_string()).or_default();
        if quantity == 0 {
            cart.retain(|l| l.product_id != product_id);
            return Ok(());
        }
        match cart.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity = quantity,
            None => cart.push(CartLine {
                product_id: product_id.to_string(),
                quantity,
            }),
        }
        Ok(())
    }

    fn remove_cart_line(&self, user_id: &str, product_id: &str) -> Result<bool, StorefrontError> {
        let Some(mut cart) = self.carts.get_mut(user_id) else {
            return Ok(false);
        };
        let before = cart.len();
        cart.retain(|l| l.product_id != product_id);
        Ok(cart.len() != before)
    }

    fn clear_cart(&self, user_id: &str) -> Result<(), StorefrontError> {
        self.carts.remove(user_id);
        Ok(())
    }

    fn remove_ordered_lines(
        &self,
        user_id: &str,
        lines: &[CartLine],
    ) -> Result<usize, StorefrontError> {
        let Some(mut cart) = self.carts.get_mut(user_id) else {
            return Ok(0);
        };
        let before = cart.len();
        cart.retain(|l| !lines.contains(l));
        Ok(before - cart.len())
    }
}
