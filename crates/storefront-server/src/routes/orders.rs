use std::time::Instant;

use actix_web::{web, HttpResponse};
use storefront::PaymentInitiation;

use super::parse_id;
use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::metrics::{ORDERS_CREATED, PAYMENT_INITIATIONS, PAYMENT_INITIATION_LATENCY};
use crate::state::AppState;

/// POST /orders - Create an order from the caller's cart
pub async fn create_order(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let order = state.coordinator.create_order(user.id()).await?;
    ORDERS_CREATED.inc();
    Ok(HttpResponse::Created().json(order))
}

/// GET /orders - The caller's orders, newest first
pub async fn list_orders(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let orders = state.coordinator.orders_for_user(user.id())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": orders.len(),
        "orders": orders,
    })))
}

/// GET /orders/{id}
pub async fn get_order(
    user: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let order_id = parse_id(&path)?;
    let order = state.coordinator.order_for_user(order_id, user.id())?;
    Ok(HttpResponse::Ok().json(order))
}

/// POST /orders/{id}/pay - Open a payment, or return the one in progress
pub async fn pay_order(
    user: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let order_id = parse_id(&path)?;
    state.coordinator.order_for_user(order_id, user.id())?;

    let started = Instant::now();
    let result = state.coordinator.initiate_payment(order_id).await;
    let label = match &result {
        Ok(PaymentInitiation::Opened(_)) => "opened",
        Ok(PaymentInitiation::Existing(_)) => "existing",
        Ok(PaymentInitiation::Unchanged(_)) => "unchanged",
        Err(e) => e.code(),
    };
    PAYMENT_INITIATIONS.with_label_values(&[label]).inc();
    PAYMENT_INITIATION_LATENCY
        .with_label_values(&[label])
        .observe(started.elapsed().as_secs_f64());

    let initiation = result?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "orderId": order_id,
        "status": initiation.order_status(),
        "applied": initiation.applied(),
        "attemptId": initiation.attempt().map(|a| a.id),
        "redirectUrl": initiation.redirect_url(),
    })))
}

/// POST /orders/{id}/cancel
pub async fn cancel_order(
    user: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let order_id = parse_id(&path)?;
    // Other users' orders look absent rather than forbidden.
    state.coordinator.order_for_user(order_id, user.id())?;
    let outcome = state.coordinator.cancel_order(order_id, user.id()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/orders")
            .route(web::post().to(create_order))
            .route(web::get().to(list_orders)),
    )
    .route("/orders/{id}", web::get().to(get_order))
    .route("/orders/{id}/pay", web::post().to(pay_order))
    .route("/orders/{id}/cancel", web::post().to(cancel_order));
}
