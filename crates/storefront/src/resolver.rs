//! Turns a user's live cart into the immutable, priced line items of an order.

use std::sync::Arc;

use crate::error::StorefrontError;
use crate::order::{CartSnapshot, Currency, LineItem};
use crate::store::Catalog;

/// Reads a cart and prices it from the catalog at checkout time.
///
/// Read-only: stock is checked but not reserved.
pub struct CartSnapshotResolver {
    catalog: Arc<dyn Catalog>,
    currency: Currency,
}

impl CartSnapshotResolver {
    pub fn new(catalog: Arc<dyn Catalog>, currency: Currency) -> Self {
        Self { catalog, currency }
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Snapshot `user_id`'s cart.
    ///
    /// Fails with [`StorefrontError::EmptyCart`] when there is nothing to buy
    /// and [`StorefrontError::ProductUnavailable`] naming the first line whose
    /// product is missing, inactive or short on stock. Unit prices always come
    /// from the catalog.
    pub fn resolve(&self, user_id: &str) -> Result<CartSnapshot, StorefrontError> {
        let lines = self.catalog.cart_lines(user_id)?;
        if lines.is_empty() {
            return Err(StorefrontError::EmptyCart);
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let Some(product) = self.catalog.product(&line.product_id)? else {
                return Err(StorefrontError::ProductUnavailable {
                    product_id: line.product_id,
                    reason: "product does not exist".to_string(),
                });
            };
            if let Some(reason) = product.unavailable_reason(line.quantity) {
                return Err(StorefrontError::ProductUnavailable {
                    product_id: product.id,
                    reason,
                });
            }
            if product.currency != self.currency {
                return Err(StorefrontError::CurrencyMismatch {
                    product_id: product.id,
                    expected: self.currency.to_string(),
                    found: product.currency.to_string(),
                });
            }
            items.push(LineItem {
                product_id: product.id,
                quantity: line.quantity,
                unit_price: product.price,
            });
        }

        CartSnapshot::new(self.currency.clone(), items)
    }
}
