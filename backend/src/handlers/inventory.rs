//! HTTP handlers for materials, the stock ledger and daily output

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::inventory::{
    BomDeductionInput, CreateMaterialInput, DailyOutput, DailyOutputResult, InventoryService,
    InventoryTransaction, Material, RecordDailyOutputInput, RecordTransactionInput,
    TransactionFilter,
};
use crate::AppState;
use shared::MaterialRequirement;

#[derive(Debug, Deserialize, Default)]
pub struct DailyOutputQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

pub async fn list_materials(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Material>>> {
    current_user.0.require_staff()?;
    let service = InventoryService::new(state.db);
    Ok(Json(service.list_materials().await?))
}

pub async fn get_material(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<Material>> {
    current_user.0.require_staff()?;
    let service = InventoryService::new(state.db);
    Ok(Json(service.get_material(material_id).await?))
}

pub async fn create_material(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateMaterialInput>,
) -> AppResult<(StatusCode, Json<Material>)> {
    current_user.0.require_staff()?;
    let service = InventoryService::new(state.db);
    let material = service.create_material(input).await?;
    Ok((StatusCode::CREATED, Json(material)))
}

/// Materials at or below their reorder level
pub async fn low_stock_materials(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Material>>> {
    current_user.0.require_staff()?;
    let service = InventoryService::new(state.db);
    Ok(Json(service.low_stock_materials().await?))
}

/// Record an inventory transaction
pub async fn record_transaction(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<RecordTransactionInput>,
) -> AppResult<(StatusCode, Json<InventoryTransaction>)> {
    current_user.0.require_staff()?;
    let service = InventoryService::new(state.db);
    let transaction = service.record_transaction(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<TransactionFilter>,
) -> AppResult<Json<Vec<InventoryTransaction>>> {
    current_user.0.require_staff()?;
    let service = InventoryService::new(state.db);
    Ok(Json(service.list_transactions(filter).await?))
}

/// Record a day's output of the stocked product and consume its materials
pub async fn record_daily_output(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<RecordDailyOutputInput>,
) -> AppResult<(StatusCode, Json<DailyOutputResult>)> {
    current_user.0.require_staff()?;
    let service = InventoryService::new(state.db);
    let result = service.record_daily_output(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn list_daily_outputs(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<DailyOutputQuery>,
) -> AppResult<Json<Vec<DailyOutput>>> {
    current_user.0.require_staff()?;
    let service = InventoryService::new(state.db);
    Ok(Json(service.list_daily_outputs(query.start_date, query.end_date).await?))
}

/// Consume BOM materials for a production run
pub async fn deduct_bom(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<BomDeductionInput>,
) -> AppResult<Json<Vec<MaterialRequirement>>> {
    current_user.0.require_staff()?;
    let service = InventoryService::new(state.db);
    Ok(Json(service.consume_for_production(current_user.0.user_id, input).await?))
}
