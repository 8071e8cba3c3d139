#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use storefront::constants::SIGNATURE_HEADER;
use storefront::gateway::{param_map, SignedParams};
use storefront::store::{InMemoryCatalog, InMemoryOrderStore, SqliteStore};
use storefront::{
    hmac, Catalog, Coordinator, CoordinatorConfig, Currency, OrderStore, PaymentAttempt,
    PaymentGateway, PaymentRequest, Product, ProviderSession, StorefrontError,
};
use tokio::sync::Barrier;

pub const SECRET: &[u8] = b"integration-secret";

/// Provider double. Optionally parks every call on a barrier so that
/// concurrent initiations all reach the gateway before any of them commits.
#[derive(Default)]
pub struct FakeGateway {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub barrier: Option<Arc<Barrier>>,
}

impl FakeGateway {
    pub fn gated(parties: usize) -> Self {
        Self {
            barrier: Some(Arc::new(Barrier::new(parties))),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for FakeGateway {
    async fn open_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProviderSession, StorefrontError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorefrontError::GatewayUnavailable("provider returned 503".into()));
        }
        Ok(ProviderSession {
            transaction_id: format!("tx-{}", request.attempt_id),
            redirect_url: format!("https://pay.example/checkout/{}", request.attempt_id),
        })
    }

    fn verify_signature(&self, params: &SignedParams, body: &[u8]) -> bool {
        let signature = params.get(SIGNATURE_HEADER).cloned().unwrap_or_default();
        hmac::verify_params(
            SECRET,
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            body,
            &signature,
        )
    }
}

pub struct Shop {
    pub coordinator: Arc<Coordinator<FakeGateway>>,
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn Catalog>,
    _dir: Option<tempfile::TempDir>,
}

impl Shop {
    pub fn gateway(&self) -> &FakeGateway {
        self.coordinator.gateway()
    }

    /// Put A×2 and B×1 in `user`'s cart: 25.00 USD.
    pub fn fill_cart(&self, user: &str) {
        self.catalog.set_cart_line(user, "A", 2).unwrap();
        self.catalog.set_cart_line(user, "B", 1).unwrap();
    }
}

pub fn products() -> Vec<Product> {
    let usd = Currency::new("USD").unwrap();
    vec![
        Product {
            id: "A".into(),
            name: "Alpha".into(),
            price: 1000,
            currency: usd.clone(),
            stock: 100,
            active: true,
        },
        Product {
            id: "B".into(),
            name: "Beta".into(),
            price: 500,
            currency: usd,
            stock: 100,
            active: true,
        },
    ]
}

pub fn build(
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    gateway: FakeGateway,
    dir: Option<tempfile::TempDir>,
) -> Shop {
    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&orders),
        Arc::clone(&catalog),
        gateway,
        CoordinatorConfig::new(Currency::new("USD").unwrap()),
    ));
    Shop {
        coordinator,
        orders,
        catalog,
        _dir: dir,
    }
}

pub fn memory_shop(gateway: FakeGateway) -> Shop {
    let orders = Arc::new(InMemoryOrderStore::new());
    let catalog = Arc::new(InMemoryCatalog::with_products(products()));
    build(orders, catalog, gateway, None)
}

/// SQLite store seeded with [`products`]. Keep the directory alive.
pub fn seeded_sqlite_store() -> (Arc<SqliteStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    let store = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());
    for p in products() {
        store.upsert_product(&p).unwrap();
    }
    (store, dir)
}

pub fn sqlite_shop(gateway: FakeGateway) -> Shop {
    let (store, dir) = seeded_sqlite_store();
    build(store.clone(), store, gateway, Some(dir))
}

/// Callback parameters for `attempt` signed with `secret`.
pub fn callback_signed_with(
    secret: &[u8],
    attempt: &PaymentAttempt,
    status: &str,
    amount: u64,
) -> SignedParams {
    let amount = amount.to_string();
    let stamp = attempt.id.to_string();
    let reference = attempt.order_id.to_string();
    let transaction = attempt.provider_reference.clone().unwrap_or_default();
    let mut params = param_map([
        ("checkout-account", "375917"),
        ("checkout-algorithm", "sha256"),
        ("checkout-amount", amount.as_str()),
        ("checkout-stamp", stamp.as_str()),
        ("checkout-reference", reference.as_str()),
        ("checkout-transaction-id", transaction.as_str()),
        ("checkout-status", status),
        ("checkout-provider", "osuuspankki"),
    ]);
    let signature = hmac::sign_params(
        secret,
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        b"",
    );
    params.insert(SIGNATURE_HEADER.to_string(), signature);
    params
}

pub fn callback(attempt: &PaymentAttempt, status: &str) -> SignedParams {
    callback_signed_with(SECRET, attempt, status, attempt.amount)
}
