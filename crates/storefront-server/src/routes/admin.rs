//! Catalog administration, reachable only through the API gateway with the
//! admin role.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use storefront::{Currency, Product, StorefrontError};

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProduct {
    pub id: String,
    pub name: String,
    pub price: u64,
    /// Defaults to the store currency.
    pub currency: Option<String>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

/// Fields left out keep their current value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub price: Option<u64>,
    pub currency: Option<String>,
    pub stock: Option<u32>,
    pub active: Option<bool>,
}

/// Orders are priced in one currency, so every product must use it.
fn store_currency(state: &AppState, requested: Option<&str>) -> Result<Currency, ApiError> {
    let store = &state.config.store_currency;
    match requested {
        None => Ok(store.clone()),
        Some(code) => {
            let currency = Currency::new(code)?;
            if &currency != store {
                return Err(ApiError::BadRequest(format!(
                    "products must be priced in {store}, got {currency}"
                )));
            }
            Ok(currency)
        }
    }
}

fn existing(state: &AppState, id: &str) -> Result<Product, ApiError> {
    Ok(state
        .catalog
        .product(id)?
        .ok_or_else(|| StorefrontError::ProductNotFound(id.to_string()))?)
}

/// POST /admin/products
pub async fn create_product(
    admin: AdminUser,
    body: web::Json<CreateProduct>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let product = Product {
        currency: store_currency(&state, body.currency.as_deref())?,
        id: body.id,
        name: body.name,
        price: body.price,
        stock: body.stock,
        active: body.active,
    };
    product.validate()?;
    if state.catalog.product(&product.id)?.is_some() {
        return Err(ApiError::Conflict(format!(
            "product {} already exists",
            product.id
        )));
    }

    state.catalog.upsert_product(&product)?;
    tracing::info!(
        admin = %admin.id(),
        product_id = %product.id,
        price = product.price,
        stock = product.stock,
        "product created"
    );
    Ok(HttpResponse::Created().json(product))
}

/// PUT /admin/products/{id}
pub async fn update_product(
    admin: AdminUser,
    path: web::Path<String>,
    body: web::Json<UpdateProduct>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let changes = body.into_inner();
    let mut product = existing(&state, &id)?;

    if let Some(code) = changes.currency.as_deref() {
        product.currency = store_currency(&state, Some(code))?;
    }
    if let Some(name) = changes.name {
        product.name = name;
    }
    if let Some(price) = changes.price {
        product.price = price;
    }
    if let Some(stock) = changes.stock {
        product.stock = stock;
    }
    if let Some(active) = changes.active {
        product.active = active;
    }
    product.validate()?;

    state.catalog.upsert_product(&product)?;
    tracing::info!(
        admin = %admin.id(),
        product_id = %product.id,
        price = product.price,
        stock = product.stock,
        active = product.active,
        "product updated"
    );
    Ok(HttpResponse::Ok().json(product))
}

/// DELETE /admin/products/{id} - Deactivate; past orders keep referring to it
pub async fn deactivate_product(
    admin: AdminUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let mut product = existing(&state, &id)?;
    if product.active {
        product.active = false;
        state.catalog.upsert_product(&product)?;
        tracing::info!(admin = %admin.id(), product_id = %product.id, "product deactivated");
    }
    Ok(HttpResponse::Ok().json(product))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/admin/products", web::post().to(create_product))
        .service(
            web::resource("/admin/products/{id}")
                .route(web::put().to(update_product))
                .route(web::delete().to(deactivate_product)),
        );
}
