//! CORS configuration for the storefront API.

use actix_cors::Cors;

/// Build the CORS middleware from allowed origins.
///
/// `*` matches any origin. Production configs never contain it; that is
/// rejected when the config is loaded.
pub fn build_cors(allowed_origins: &[String]) -> Cors {
    let allowed = allowed_origins.to_vec();
    Cors::default()
        .allowed_origin_fn(move |origin, _req_head| {
            let origin_str = origin.to_str().unwrap_or("");
            allowed.iter().any(|a| a == "*" || a == origin_str)
        })
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
            actix_web::http::header::HeaderName::from_static(crate::auth::USER_ID_HEADER),
            actix_web::http::header::HeaderName::from_static(crate::auth::USER_ROLE_HEADER),
        ])
        .max_age(3600)
}
