use std::time::Instant;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::metrics::metrics_output;
use crate::state::AppState;

/// GET /health - Liveness and database check
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let mut response = serde_json::json!({
        "status": "ok",
        "service": "storefront",
        "version": env!("CARGO_PKG_VERSION"),
        "database": "ok",
    });

    if let Err(e) = state.orders.ping() {
        tracing::error!(error = %e, "health check: database unreachable");
        response["status"] = serde_json::json!("degraded");
        response["database"] = serde_json::json!("unreachable");
        return HttpResponse::ServiceUnavailable().json(response);
    }

    HttpResponse::Ok().json(response)
}

/// GET /health/db - Database round trip with its latency
pub async fn health_db(state: web::Data<AppState>) -> HttpResponse {
    let started = Instant::now();
    let result = state.orders.ping();
    let latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "database": "sqlite",
            "latencyMs": latency_ms,
        })),
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unavailable",
                "database": "sqlite",
                "latencyMs": latency_ms,
            }))
        }
    }
}

/// GET /health/ready - Whether this instance can take checkout traffic
pub async fn health_ready(state: web::Data<AppState>) -> HttpResponse {
    let database = state.orders.ping();
    let catalog = state.catalog.list_products();
    let ready = database.is_ok() && catalog.is_ok();

    if let Err(ref e) = database {
        tracing::warn!(error = %e, "readiness: order store unreachable");
    }
    if let Err(ref e) = catalog {
        tracing::warn!(error = %e, "readiness: catalog unreachable");
    }

    let check = |ok: bool| if ok { "ok" } else { "failed" };
    let status = if ready { "ready" } else { "not_ready" };
    let body = serde_json::json!({
        "status": status,
        "checks": {
            "database": check(database.is_ok()),
            "catalog": check(catalog.is_ok()),
        },
        "activeProducts": catalog.as_ref().map(Vec::len).unwrap_or(0),
        "currency": state.config.store_currency.as_str(),
    });

    if ready {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// GET /metrics - Prometheus metrics endpoint (optionally auth-gated)
pub async fn metrics(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Some(ref expected_token) = state.config.metrics_token {
        let authorization = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok());

        if !expected_token.matches_bearer(authorization) {
            return HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "unauthorized",
                "message": "Valid Bearer token required for /metrics"
            }));
        }
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics_output())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/health/db", web::get().to(health_db))
        .route("/health/ready", web::get().to(health_ready))
        .route("/metrics", web::get().to(metrics));
}
