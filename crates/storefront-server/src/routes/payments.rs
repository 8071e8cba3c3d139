//! Payment provider callbacks and browser redirects.

use actix_web::{web, HttpRequest, HttpResponse};
use storefront::constants::{CHECKOUT_PREFIX, SIGNATURE_HEADER};
use storefront::gateway::SignedParams;
use storefront::{CallbackAck, StorefrontError};

use super::parse_id;
use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::metrics::CALLBACKS;
use crate::state::AppState;

fn is_signed_param(name: &str) -> bool {
    name.starts_with(CHECKOUT_PREFIX) || name == SIGNATURE_HEADER
}

/// Signed parameters from the query string and headers, keys lowercased.
/// Headers win when both carry the same key.
fn signed_params(req: &HttpRequest) -> SignedParams {
    let mut params: SignedParams = url::form_urlencoded::parse(req.query_string().as_bytes())
        .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
        .filter(|(k, _)| is_signed_param(k))
        .collect();
    for (name, value) in req.headers() {
        let name = name.as_str().to_ascii_lowercase();
        if !is_signed_param(&name) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            params.insert(name, value.to_string());
        }
    }
    params
}

fn record(result: &Result<CallbackAck, StorefrontError>) {
    let label = match result {
        Ok(ack) if ack.applied => "applied",
        Ok(_) => "acknowledged",
        Err(e) => e.code(),
    };
    CALLBACKS.with_label_values(&[label]).inc();
}

/// POST|GET /payments/callback - Server-to-server status callback
///
/// Always answers 200 so the provider does not keep retrying a callback we
/// have already decided about.
pub async fn callback(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let params = signed_params(&req);
    let result = state.coordinator.handle_callback(&params, &body).await;
    record(&result);

    match &result {
        Ok(ack) => tracing::info!(
            order_id = %ack.order_id,
            status = %ack.status,
            applied = ack.applied,
            "payment callback processed"
        ),
        Err(e) => tracing::warn!(
            error = %e,
            code = e.code(),
            "payment callback rejected"
        ),
    }

    HttpResponse::Ok().json(serde_json::json!({ "received": true }))
}

async fn redirect(req: &HttpRequest, state: &AppState) -> Result<HttpResponse, ApiError> {
    let params = signed_params(req);
    let result = state.coordinator.handle_callback(&params, b"").await;
    record(&result);
    let ack = result?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "orderId": ack.order_id,
        "status": ack.status,
        "applied": ack.applied,
    })))
}

/// GET /payments/success - Browser redirect after a completed payment
pub async fn success(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    redirect(&req, &state).await
}

/// GET /payments/cancel - Browser redirect after the user backed out
pub async fn cancel(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    redirect(&req, &state).await
}

/// GET /payments/{id}/status - Attempt and order status for the owner
pub async fn payment_status(
    user: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let attempt_id = parse_id(&path)?;
    let view = state.coordinator.payment_status(attempt_id, user.id())?;
    Ok(HttpResponse::Ok().json(view))
}

/// Provider callback ingress, kept outside the rate limiter.
pub fn configure_callbacks(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/payments/callback")
            .route(web::post().to(callback))
            .route(web::get().to(callback)),
    );
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/payments/success", web::get().to(success))
        .route("/payments/cancel", web::get().to(cancel))
        .route("/payments/{id}/status", web::get().to(payment_status));
}
