//! Upstream API-gateway trust boundary for user routes.
//!
//! The storefront sits behind an API gateway that authenticates users and
//! forwards their id in `X-User-Id`. When `INTERNAL_AUTH_SECRET` is set the
//! gateway must also prove itself with `X-Internal-Auth`, and when
//! `ALLOWED_GATEWAY_IPS` is set it must connect from one of those peers.
//!
//! Catalog administration additionally needs the gateway to forward the
//! user's role as `X-User-Role: admin`.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};

use crate::error::ApiError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const INTERNAL_AUTH_HEADER: &str = "x-internal-auth";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const ADMIN_ROLE: &str = "admin";

const MAX_USER_ID_LEN: usize = 128;

/// The user a request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::Internal("application state not configured".to_string()))?;
    let config = &state.config;

    if !config.allowed_gateway_ips.is_empty() {
        let peer = req.peer_addr().map(|addr| addr.ip());
        if !peer.is_some_and(|ip| config.allowed_gateway_ips.contains(&ip)) {
            tracing::warn!(peer = ?peer, "user request from a peer outside ALLOWED_GATEWAY_IPS");
            return Err(ApiError::Unauthorized);
        }
    }

    if let Some(ref secret) = config.internal_auth_secret {
        let presented = req
            .headers()
            .get(INTERNAL_AUTH_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();
        if !secret.matches(presented) {
            tracing::warn!("missing or invalid X-Internal-Auth");
            return Err(ApiError::Unauthorized);
        }
    }

    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_USER_ID_LEN)
        .ok_or(ApiError::Unauthorized)?;

    Ok(AuthenticatedUser(user_id.to_string()))
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

/// A user the gateway has vouched for as a catalog administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUser(pub AuthenticatedUser);

impl AdminUser {
    pub fn id(&self) -> &str {
        self.0.id()
    }
}

fn authenticate_admin(req: &HttpRequest) -> Result<AdminUser, ApiError> {
    let user = authenticate(req)?;
    let is_admin = req
        .headers()
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|role| role.split(',').any(|r| r.trim() == ADMIN_ROLE));
    if !is_admin {
        tracing::warn!(user_id = %user.id(), "admin route requested without the admin role");
        return Err(ApiError::Forbidden);
    }
    Ok(AdminUser(user))
}

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate_admin(req))
    }
}
