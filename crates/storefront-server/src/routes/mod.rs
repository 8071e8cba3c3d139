use actix_web::web;

pub mod admin;
pub mod catalog;
pub mod health;
pub mod orders;
pub mod payments;

/// Routes that must answer regardless of client request rate: health checks
/// and the provider callback. Mounted under `/api/v1` ahead of [`configure`].
pub fn configure_unthrottled(cfg: &mut web::ServiceConfig) {
    health::configure(cfg);
    payments::configure_callbacks(cfg);
}

/// User and admin routes. Mounted under `/api/v1` behind the rate limiter.
pub fn configure(cfg: &mut web::ServiceConfig) {
    catalog::configure(cfg);
    admin::configure(cfg);
    orders::configure(cfg);
    payments::configure(cfg);
}

/// Parse a path id, mapping garbage to 400 instead of actix's plain-text 404.
pub(crate) fn parse_id(raw: &str) -> Result<uuid::Uuid, crate::error::ApiError> {
    uuid::Uuid::parse_str(raw)
        .map_err(|_| crate::error::ApiError::BadRequest(format!("invalid id: {raw}")))
}
