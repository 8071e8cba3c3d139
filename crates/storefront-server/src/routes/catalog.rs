use actix_web::{web, HttpResponse};
use serde::Deserialize;
use storefront::constants::MAX_LINE_QUANTITY;
use storefront::StorefrontError;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCartLine {
    pub product_id: String,
    pub quantity: u32,
}

/// GET /products - List active products
pub async fn list_products(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let products = state.catalog.list_products()?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": products.len(),
        "products": products,
    })))
}

/// GET /products/{id}
pub async fn get_product(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let product = state
        .catalog
        .product(&id)?
        .ok_or(StorefrontError::ProductNotFound(id))?;
    Ok(HttpResponse::Ok().json(product))
}

fn cart_response(state: &AppState, user_id: &str) -> Result<HttpResponse, ApiError> {
    let items = state.catalog.cart_lines(user_id)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "items": items })))
}

/// GET /cart
pub async fn get_cart(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    cart_response(&state, user.id())
}

/// POST /cart - Set the quantity of one line; 0 removes it
pub async fn set_cart_line(
    user: AuthenticatedUser,
    body: web::Json<SetCartLine>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let SetCartLine {
        product_id,
        quantity,
    } = body.into_inner();
    if quantity > MAX_LINE_QUANTITY {
        return Err(ApiError::BadRequest(format!(
            "quantity must be at most {MAX_LINE_QUANTITY}"
        )));
    }

    if quantity > 0 {
        let product = state
            .catalog
            .product(&product_id)?
            .ok_or_else(|| StorefrontError::ProductNotFound(product_id.clone()))?;
        if !product.active {
            return Err(StorefrontError::ProductUnavailable {
                product_id,
                reason: "product is not active".to_string(),
            }
            .into());
        }
    }

    state
        .catalog
        .set_cart_line(user.id(), &product_id, quantity)?;
    cart_response(&state, user.id())
}

/// DELETE /cart/items/{product_id}
pub async fn remove_cart_line(
    user: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let product_id = path.into_inner();
    if !state.catalog.remove_cart_line(user.id(), &product_id)? {
        tracing::debug!(user_id = %user.id(), product_id = %product_id, "cart line already absent");
    }
    cart_response(&state, user.id())
}

/// DELETE /cart
pub async fn clear_cart(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    state.catalog.clear_cart(user.id())?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/products", web::get().to(list_products))
        .route("/products/{id}", web::get().to(get_product))
        .service(
            web::resource("/cart")
                .route(web::get().to(get_cart))
                .route(web::post().to(set_cart_line))
                .route(web::delete().to(clear_cart)),
        )
        .route(
            "/cart/items/{product_id}",
            web::delete().to(remove_cart_line),
        );
}
