use serde::{Deserialize, Serialize};

use crate::constants::MAX_PRODUCT_ID_LEN;
use crate::error::StorefrontError;
use crate::order::Currency;

/// A sellable item. Prices are in minor units of `currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: u64,
    pub currency: Currency,
    pub stock: u32,
    pub active: bool,
}

impl Product {
    /// Check the fields an administrator supplies before the product is stored.
    pub fn validate(&self) -> Result<(), StorefrontError> {
        let id = self.id.trim();
        if id.is_empty() || id != self.id || self.id.len() > MAX_PRODUCT_ID_LEN {
            return Err(StorefrontError::Validation(format!(
                "product id must be 1 to {MAX_PRODUCT_ID_LEN} characters without surrounding whitespace"
            )));
        }
        if self.name.trim().is_empty() {
            return Err(StorefrontError::Validation(
                "product name must not be empty".to_string(),
            ));
        }
        if self.price == 0 || i64::try_from(self.price).is_err() {
            return Err(StorefrontError::Validation(
                "price must be a positive amount in minor units".to_string(),
            ));
        }
        Ok(())
    }

    /// Why `quantity` of this product cannot be ordered, if it cannot.
    pub fn unavailable_reason(&self, quantity: u32) -> Option<String> {
        if !self.active {
            Some("product is not active".to_string())
        } else if self.stock < quantity {
            Some(format!(
                "insufficient stock: requested {quantity}, available {}",
                self.stock
            ))
        } else {
            None
        }
    }
}

/// One product line in a user's live cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
}
