//! Order and payment lifecycle core for the storefront checkout backend.
//!
//! An order is created from an immutable snapshot of the user's cart, paid
//! through a hosted-checkout payment provider, and settled by asynchronous
//! provider callbacks. Every state change goes through a compare-and-swap at
//! the store, so duplicate, reordered or concurrent requests settle on exactly
//! one outcome.
//!
//! # Components
//!
//! - [`store`] - [`OrderStore`] and [`Catalog`] traits with in-memory and SQLite backends
//! - [`resolver`] - [`CartSnapshotResolver`], cart → priced, stock-checked snapshot
//! - [`gateway`] - [`PaymentGateway`] trait and the signed HTTP client
//! - [`coordinator`] - [`Coordinator`], the order/payment state machine
//! - [`security`] - [`SharedSecret`], constant-time checks of caller-presented secrets
//!
//! # Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use storefront::gateway::http::{GatewayConfig, HttpGatewayClient};
//! use storefront::store::sqlite::SqliteStore;
//! use storefront::{Coordinator, CoordinatorConfig, Currency};
//!
//! # async fn run() -> Result<(), storefront::StorefrontError> {
//! let store = Arc::new(SqliteStore::open("./storefront.db")?);
//! let gateway = HttpGatewayClient::new(GatewayConfig::new(
//!     "375917",
//!     b"merchant-secret".to_vec(),
//!     "https://shop.example/api/v1/payments",
//! ))?;
//! let coordinator = Coordinator::new(
//!     store.clone(),
//!     store,
//!     gateway,
//!     CoordinatorConfig::new(Currency::new("EUR")?),
//! );
//!
//! let order = coordinator.create_order("user-1").await?;
//! let started = coordinator.initiate_payment(order.id).await?;
//! println!("{:?}", started.redirect_url());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod hmac;
pub mod order;
pub mod resolver;
pub mod security;
pub mod store;

pub use catalog::{CartLine, Product};
pub use coordinator::{
    CallbackAck, Coordinator, CoordinatorConfig, PaymentInitiation, PaymentStatusView,
    TransitionOutcome,
};
pub use error::{ErrorKind, StorefrontError};
pub use gateway::{CallbackOutcome, CallbackParams, PaymentGateway, PaymentRequest, ProviderSession};
pub use order::{
    AttemptStatus, CartSnapshot, Currency, LineItem, Order, OrderStatus, PaymentAttempt,
};
pub use resolver::CartSnapshotResolver;
pub use security::SharedSecret;
pub use store::{AttemptTransition, Catalog, OrderStore};

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
