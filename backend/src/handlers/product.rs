//! HTTP handlers for the product catalog and bills of materials

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::inventory::{BomEntry, InventoryService, UpsertBomLineInput};
use crate::services::product::{CreateProductInput, Product, ProductService};
use crate::AppState;

pub async fn list_products(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    let service = ProductService::new(state.db);
    Ok(Json(service.list_products().await?))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    Ok(Json(service.get_product(product_id).await?))
}

/// Add a product to the catalog (staff only)
pub async fn create_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<Product>)> {
    current_user.0.require_staff()?;
    let service = ProductService::new(state.db);
    let product = service.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Bill of materials for a product
pub async fn get_product_bom(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Vec<BomEntry>>> {
    let service = InventoryService::new(state.db);
    Ok(Json(service.get_bom(product_id).await?))
}

/// Set one material's per-unit quantity in a product's BOM (staff only)
pub async fn upsert_bom_line(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpsertBomLineInput>,
) -> AppResult<Json<Vec<BomEntry>>> {
    current_user.0.require_staff()?;
    let service = InventoryService::new(state.db);
    Ok(Json(service.upsert_bom_line(product_id, input).await?))
}
