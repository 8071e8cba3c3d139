//! Response headers added to every API response.

use actix_web::middleware::DefaultHeaders;

/// Hardening headers for a JSON API that is never framed or cached.
///
/// Handlers that set one of these themselves keep their own value.
/// `Strict-Transport-Security` is only sent in production, where the
/// service is reached over TLS.
pub fn security_headers(production: bool) -> DefaultHeaders {
    let headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "no-referrer"))
        .add((
            "Content-Security-Policy",
            "default-src 'none'; frame-ancestors 'none'",
        ))
        .add(("Cache-Control", "no-store"));
    if production {
        headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains",
        ))
    } else {
        headers
    }
}
