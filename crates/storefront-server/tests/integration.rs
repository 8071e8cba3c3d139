use std::collections::HashMap;
use std::sync::Arc;

use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{test, web, App};
use storefront::constants::SIGNATURE_HEADER;
use storefront::gateway::{param_map, SignedParams};
use storefront::store::SqliteStore;
use storefront::{
    hmac, unix_now, Catalog, Currency, Order, OrderStatus, OrderStore, PaymentAttempt, Product,
};
use uuid::Uuid;

use storefront_server::{headers::security_headers, routes, AppState, ServerConfig};

const SECRET: &str = "SAIPPUAKAUPPIAS-test-secret";
const USER: &str = "user-1";

struct Harness {
    state: web::Data<AppState>,
    store: Arc<SqliteStore>,
    _dir: tempfile::TempDir,
}

fn harness(extra: &[(&str, &str)]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("storefront.db");
    let db_path = db_path.to_str().unwrap().to_string();

    let mut vars: HashMap<String, String> = [
        ("DATABASE_PATH", db_path.as_str()),
        ("STORE_CURRENCY", "USD"),
        ("PAYTRAIL_MERCHANT_ID", "375917"),
        ("PAYTRAIL_SECRET_KEY", SECRET),
        // Nothing listens here: every outbound payment call fails fast.
        ("PAYTRAIL_BASE_URL", "http://127.0.0.1:1"),
        ("PAYTRAIL_CALLBACK_URL", "https://shop.example/api/v1/payments/callback"),
        ("PAYTRAIL_SUCCESS_URL", "https://shop.example/api/v1/payments/success"),
        ("PAYTRAIL_CANCEL_URL", "https://shop.example/api/v1/payments/cancel"),
        ("GATEWAY_TIMEOUT_SECS", "2"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }

    let config = ServerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());

    let usd = Currency::new("USD").unwrap();
    for (id, price, active) in [("A", 1000, true), ("B", 500, true), ("RETIRED", 900, false)] {
        store
            .upsert_product(&Product {
                id: id.to_string(),
                name: format!("Product {id}"),
                price,
                currency: usd.clone(),
                stock: 50,
                active,
            })
            .unwrap();
    }

    let state = AppState::new(config, store.clone()).unwrap();
    Harness {
        state: web::Data::new(state),
        store,
        _dir: dir,
    }
}

macro_rules! app {
    ($h:expr) => {
        test::init_service(
            App::new()
                .app_data($h.state.clone())
                .wrap(security_headers(false))
                .service(
                    web::scope("/api/v1")
                        .configure(routes::configure_unthrottled)
                        .service(web::scope("").configure(routes::configure)),
                ),
        )
        .await
    };
}

fn fill_cart(h: &Harness, user: &str) {
    h.store.set_cart_line(user, "A", 2).unwrap();
    h.store.set_cart_line(user, "B", 1).unwrap();
}

/// Order for `user` with an ACTIVE attempt, as if the provider had answered.
async fn awaiting_payment(h: &Harness, user: &str) -> (Order, PaymentAttempt) {
    fill_cart(h, user);
    let order = h.state.coordinator.create_order(user).await.unwrap();
    let now = unix_now();
    let attempt = PaymentAttempt::for_order(&order, now).activate(
        format!("tx-{}", Uuid::new_v4()),
        "https://pay.example/checkout/1".to_string(),
        now,
    );
    assert!(h
        .store
        .begin_payment(order.id, OrderStatus::Pending, &attempt)
        .unwrap());
    (order, attempt)
}

fn signed(attempt: &PaymentAttempt, status: &str, secret: &str) -> SignedParams {
    let amount = attempt.amount.to_string();
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
        ("checkout-provider", "nordea"),
    ]);
    let signature = hmac::sign_params(
        secret.as_bytes(),
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        b"",
    );
    params.insert(SIGNATURE_HEADER.to_string(), signature);
    params
}

fn callback_request(params: &SignedParams) -> test::TestRequest {
    let mut req = test::TestRequest::post().uri("/api/v1/payments/callback");
    for (k, v) in params {
        req = req.insert_header((k.as_str(), v.as_str()));
    }
    req
}

#[actix_rt::test]
async fn test_health_reports_database() {
    let h = harness(&[]);
    let app = app!(h);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
}

#[actix_rt::test]
async fn test_products_list_only_active() {
    let h = harness(&[]);
    let app = app!(h);

    let req = test::TestRequest::get().uri("/api/v1/products").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["products"][0]["id"], "A");
    assert_eq!(body["products"][0]["price"], 1000);

    let req = test::TestRequest::get().uri("/api/v1/products/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "product_not_found");
}

#[actix_rt::test]
async fn test_user_routes_require_user_header() {
    let h = harness(&[]);
    let app = app!(h);

    let req = test::TestRequest::get().uri("/api/v1/cart").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unauthorized");
}

#[actix_rt::test]
async fn test_cart_flow() {
    let h = harness(&[]);
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/v1/cart")
        .insert_header(("X-User-Id", USER))
        .set_json(serde_json::json!({"productId": "A", "quantity": 3}))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["items"][0]["productId"], "A");
    assert_eq!(body["items"][0]["quantity"], 3);

    // inactive products cannot be added
    let req = test::TestRequest::post()
        .uri("/api/v1/cart")
        .insert_header(("X-User-Id", USER))
        .set_json(serde_json::json!({"productId": "RETIRED", "quantity": 1}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    let req = test::TestRequest::post()
        .uri("/api/v1/cart")
        .insert_header(("X-User-Id", USER))
        .set_json(serde_json::json!({"productId": "B", "quantity": 1_000_000}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::delete()
        .uri("/api/v1/cart/items/A")
        .insert_header(("X-User-Id", USER))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
}

#[actix_rt::test]
async fn test_empty_cart_cannot_be_ordered() {
    let h = harness(&[]);
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/v1/orders")
        .insert_header(("X-User-Id", USER))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "empty_cart");
}

#[actix_rt::test]
async fn test_order_created_from_cart_and_private_to_owner() {
    let h = harness(&[]);
    let app = app!(h);
    fill_cart(&h, USER);

    let req = test::TestRequest::post()
        .uri("/api/v1/orders")
        .insert_header(("X-User-Id", USER))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let order: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(order["total"], 2500);
    assert_eq!(order["currency"], "USD");
    assert_eq!(order["status"], "PENDING");
    let id = order["id"].as_str().unwrap().to_string();

    // cart was consumed
    assert!(h.store.cart_lines(USER).unwrap().is_empty());

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/orders/{id}"))
        .insert_header(("X-User-Id", "someone-else"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::get()
        .uri("/api/v1/orders")
        .insert_header(("X-User-Id", USER))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["orders"][0]["id"], id.as_str());

    let req = test::TestRequest::get()
        .uri("/api/v1/orders/not-a-uuid")
        .insert_header(("X-User-Id", USER))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn test_pay_with_gateway_down_keeps_order_payable() {
    let h = harness(&[]);
    let app = app!(h);
    fill_cart(&h, USER);

    let req = test::TestRequest::post()
        .uri("/api/v1/orders")
        .insert_header(("X-User-Id", USER))
        .to_request();
    let order: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let id = order["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/orders/{id}/pay"))
        .insert_header(("X-User-Id", USER))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 502);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "gateway_unavailable");

    let order_id = Uuid::parse_str(&id).unwrap();
    let stored = h.store.get_by_id(order_id).unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(h.store.attempts_for_order(order_id).unwrap().is_empty());
}

#[actix_rt::test]
async fn test_signed_callback_marks_order_paid_and_replay_is_acknowledged() {
    let h = harness(&[]);
    let app = app!(h);
    let (order, attempt) = awaiting_payment(&h, USER).await;

    let params = signed(&attempt, "ok", SECRET);
    let resp = test::call_service(&app, callback_request(&params).to_request()).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["received"], true);
    assert_eq!(h.store.get_by_id(order.id).unwrap().status, OrderStatus::Paid);

    // replay
    let resp = test::call_service(&app, callback_request(&params).to_request()).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(h.store.get_by_id(order.id).unwrap().status, OrderStatus::Paid);

    // status endpoint for the owner
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/payments/{}/status", attempt.id))
        .insert_header(("X-User-Id", USER))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["orderStatus"], "PAID");
    assert_eq!(body["attempt"]["status"], "CONFIRMED");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/payments/{}/status", attempt.id))
        .insert_header(("X-User-Id", "someone-else"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_rt::test]
async fn test_callback_always_answers_200() {
    let h = harness(&[]);
    let app = app!(h);
    let (order, attempt) = awaiting_payment(&h, USER).await;

    // garbage
    let req = test::TestRequest::post()
        .uri("/api/v1/payments/callback")
        .set_payload("not even json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // forged: signed with the wrong secret
    let forged = signed(&attempt, "ok", "attacker-secret");
    let resp = test::call_service(&app, callback_request(&forged).to_request()).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        h.store.get_by_id(order.id).unwrap().status,
        OrderStatus::AwaitingPayment
    );

    // GET with query parameters takes the same path
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(forged.iter())
        .finish();
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/payments/callback?{query}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        h.store.get_by_id(order.id).unwrap().status,
        OrderStatus::AwaitingPayment
    );
}

#[actix_rt::test]
async fn test_success_redirect_verifies_signature() {
    let h = harness(&[]);
    let app = app!(h);
    let (order, attempt) = awaiting_payment(&h, USER).await;

    let forged = signed(&attempt, "ok", "attacker-secret");
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(forged.iter())
        .finish();
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/payments/success?{query}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let params = signed(&attempt, "ok", SECRET);
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/payments/success?{query}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "PAID");
    assert_eq!(body["applied"], true);
    assert_eq!(body["orderId"], order.id.to_string());
}

#[actix_rt::test]
async fn test_cancel_then_pay_is_a_noop() {
    let h = harness(&[]);
    let app = app!(h);
    let (order, attempt) = awaiting_payment(&h, USER).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/orders/{}/cancel", order.id))
        .insert_header(("X-User-Id", USER))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "CANCELLED");
    assert_eq!(body["applied"], true);

    let stored = h.store.get_attempt(attempt.id).unwrap().unwrap();
    assert_eq!(stored.status, storefront::AttemptStatus::Failed);

    // pay on a cancelled order never reaches the (unreachable) gateway
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/orders/{}/pay", order.id))
        .insert_header(("X-User-Id", USER))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "CANCELLED");
    assert_eq!(body["applied"], false);
    assert!(body["redirectUrl"].is_null());

    // second cancel is a no-op, not an error
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/orders/{}/cancel", order.id))
        .insert_header(("X-User-Id", USER))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["applied"], false);
}

#[actix_rt::test]
async fn test_internal_auth_and_gateway_ips() {
    let h = harness(&[
        ("INTERNAL_AUTH_SECRET", "kong-shared-secret"),
        ("ALLOWED_GATEWAY_IPS", "10.0.0.7"),
    ]);
    let app = app!(h);
    let gateway_peer: std::net::SocketAddr = "10.0.0.7:40000".parse().unwrap();

    let req = test::TestRequest::get()
        .uri("/api/v1/cart")
        .peer_addr(gateway_peer)
        .insert_header(("X-User-Id", USER))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/cart")
        .peer_addr(gateway_peer)
        .insert_header(("X-User-Id", USER))
        .insert_header(("X-Internal-Auth", "wrong"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/cart")
        .peer_addr("192.168.1.5:40000".parse().unwrap())
        .insert_header(("X-User-Id", USER))
        .insert_header(("X-Internal-Auth", "kong-shared-secret"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/cart")
        .peer_addr(gateway_peer)
        .insert_header(("X-User-Id", USER))
        .insert_header(("X-Internal-Auth", "kong-shared-secret"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_rt::test]
async fn test_metrics_requires_token_when_configured() {
    let h = harness(&[("METRICS_TOKEN", "scrape-token")]);
    let app = app!(h);

    let req = test::TestRequest::get().uri("/api/v1/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/metrics")
        .insert_header(("Authorization", "Bearer scrape-token"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_rt::test]
async fn test_database_and_readiness_checks() {
    let h = harness(&[]);
    let app = app!(h);

    let req = test::TestRequest::get().uri("/api/v1/health/db").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert!(body["latencyMs"].is_u64());

    let req = test::TestRequest::get().uri("/api/v1/health/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["database"], "ok");
    assert_eq!(body["checks"]["catalog"], "ok");
    assert_eq!(body["activeProducts"], 2);
    assert_eq!(body["currency"], "USD");
}

#[actix_rt::test]
async fn test_responses_carry_security_headers() {
    let h = harness(&[]);
    let app = app!(h);

    // Error responses too.
    for uri in ["/api/v1/products", "/api/v1/cart"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        let headers = resp.headers();
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
    }
}

#[actix_rt::test]
async fn test_rate_limit_spares_callbacks_and_health() {
    let h = harness(&[]);
    let limiter = GovernorConfigBuilder::default()
        .requests_per_minute(1)
        .burst_size(2)
        .finish()
        .unwrap();
    let app = test::init_service(
        App::new().app_data(h.state.clone()).service(
            web::scope("/api/v1")
                .configure(routes::configure_unthrottled)
                .service(
                    web::scope("")
                        .wrap(Governor::new(&limiter))
                        .configure(routes::configure),
                ),
        ),
    )
    .await;
    let provider: std::net::SocketAddr = "198.51.100.20:443".parse().unwrap();
    let (order, attempt) = awaiting_payment(&h, USER).await;

    // The limiter answers with an error rather than a response.
    let mut statuses = Vec::new();
    for _ in 0..4 {
        let req = test::TestRequest::get()
            .uri("/api/v1/products")
            .peer_addr(provider)
            .to_request();
        let status = match test::try_call_service(&app, req).await {
            Ok(resp) => resp.status(),
            Err(e) => e.as_response_error().status_code(),
        };
        statuses.push(status.as_u16());
    }
    assert_eq!(&statuses[..2], &[200, 200]);
    assert!(statuses[2..].iter().all(|s| *s == 429), "{statuses:?}");

    // Same peer, now over its limit: provider retries are still acknowledged.
    let params = signed(&attempt, "ok", SECRET);
    for _ in 0..5 {
        let req = callback_request(&params).peer_addr(provider).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
    assert_eq!(h.store.get_by_id(order.id).unwrap().status, OrderStatus::Paid);

    let req = test::TestRequest::get()
        .uri("/api/v1/health")
        .peer_addr(provider)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

fn admin_request(req: test::TestRequest) -> test::TestRequest {
    req.insert_header(("X-User-Id", "ops-1"))
        .insert_header(("X-User-Role", "admin"))
}

#[actix_rt::test]
async fn test_admin_routes_require_admin_role() {
    let h = harness(&[]);
    let app = app!(h);
    let mug = serde_json::json!({"id": "MUG", "name": "Mug", "price": 1290, "stock": 5});

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/products")
        .set_json(&mug)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/products")
        .insert_header(("X-User-Id", USER))
        .insert_header(("X-User-Role", "customer"))
        .set_json(&mug)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "forbidden");

    let req = test::TestRequest::delete()
        .uri("/api/v1/admin/products/A")
        .insert_header(("X-User-Id", USER))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
    assert!(h.store.product("MUG").unwrap().is_none());
    assert!(h.store.product("A").unwrap().unwrap().active);
}

#[actix_rt::test]
async fn test_admin_role_still_needs_gateway_secret() {
    let h = harness(&[("INTERNAL_AUTH_SECRET", "kong-shared-secret")]);
    let app = app!(h);
    let mug = serde_json::json!({"id": "MUG", "name": "Mug", "price": 1290});

    let req = admin_request(test::TestRequest::post().uri("/api/v1/admin/products"))
        .set_json(&mug)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = admin_request(test::TestRequest::post().uri("/api/v1/admin/products"))
        .insert_header(("X-Internal-Auth", "kong-shared-secret"))
        .set_json(&mug)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}

#[actix_rt::test]
async fn test_admin_manages_catalog_that_customers_can_buy_from() {
    let h = harness(&[]);
    let app = app!(h);

    let req = admin_request(test::TestRequest::post().uri("/api/v1/admin/products"))
        .set_json(serde_json::json!({"id": "MUG", "name": "Mug", "price": 1290, "stock": 5}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(created["currency"], "USD");
    assert_eq!(created["active"], true);

    // same id again
    let req = admin_request(test::TestRequest::post().uri("/api/v1/admin/products"))
        .set_json(serde_json::json!({"id": "MUG", "name": "Other", "price": 1}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    // priced outside the store currency, or for free
    for body in [
        serde_json::json!({"id": "CAP", "name": "Cap", "price": 900, "currency": "EUR"}),
        serde_json::json!({"id": "CAP", "name": "Cap", "price": 0}),
        serde_json::json!({"id": "", "name": "Cap", "price": 900}),
    ] {
        let req = admin_request(test::TestRequest::post().uri("/api/v1/admin/products"))
            .set_json(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }
    assert!(h.store.product("CAP").unwrap().is_none());

    let req = test::TestRequest::post()
        .uri("/api/v1/cart")
        .insert_header(("X-User-Id", USER))
        .set_json(serde_json::json!({"productId": "MUG", "quantity": 2}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    // restock and reprice; untouched fields stay
    let req = admin_request(test::TestRequest::put().uri("/api/v1/admin/products/MUG"))
        .set_json(serde_json::json!({"price": 1490, "stock": 20}))
        .to_request();
    let updated: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["price"], 1490);
    assert_eq!(updated["stock"], 20);
    assert_eq!(updated["name"], "Mug");

    let req = admin_request(test::TestRequest::put().uri("/api/v1/admin/products/NOPE"))
        .set_json(serde_json::json!({"stock": 1}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // checkout prices the line at the current catalog price
    let req = test::TestRequest::post()
        .uri("/api/v1/orders")
        .insert_header(("X-User-Id", USER))
        .to_request();
    let order: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(order["total"], 2980);

    let req = admin_request(test::TestRequest::delete().uri("/api/v1/admin/products/MUG"))
        .to_request();
    let removed: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(removed["active"], false);

    let req = test::TestRequest::get().uri("/api/v1/products").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 2);

    // existing orders keep their snapshot
    let order_id = Uuid::parse_str(order["id"].as_str().unwrap()).unwrap();
    assert_eq!(h.store.get_by_id(order_id).unwrap().total, 2980);

    let req = admin_request(test::TestRequest::delete().uri("/api/v1/admin/products/NOPE"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}
