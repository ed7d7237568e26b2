//! HTTP handlers for productions and their stage logs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::production::{
    AdvanceSummary, CompleteStageInput, CreateProductionInput, Production, ProductionDashboard,
    ProductionDetail, ProductionFilter, ProductionService, StageProgressInput, StartStageInput,
    TimelineSummary, UpdateProductionInput,
};
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct UpdateStagesQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn list_productions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<ProductionFilter>,
) -> AppResult<Json<Vec<Production>>> {
    current_user.0.require_staff()?;
    let service = ProductionService::new(state.db);
    Ok(Json(service.list_productions(filter).await?))
}

pub async fn create_production(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateProductionInput>,
) -> AppResult<(StatusCode, Json<ProductionDetail>)> {
    current_user.0.require_staff()?;
    let service = ProductionService::new(state.db);
    let production = service.create_production(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(production)))
}

pub async fn get_production(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(production_id): Path<Uuid>,
) -> AppResult<Json<ProductionDetail>> {
    current_user.0.require_staff()?;
    let service = ProductionService::new(state.db);
    Ok(Json(service.get_production(production_id).await?))
}

pub async fn update_production(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(production_id): Path<Uuid>,
    Json(input): Json<UpdateProductionInput>,
) -> AppResult<Json<ProductionDetail>> {
    current_user.0.require_staff()?;
    let service = ProductionService::new(state.db);
    Ok(Json(service.update_production(production_id, input).await?))
}

pub async fn production_dashboard(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ProductionDashboard>> {
    current_user.0.require_staff()?;
    let service = ProductionService::new(state.db);
    Ok(Json(service.dashboard(Utc::now()).await?))
}

pub async fn start_stage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((production_id, log_id)): Path<(Uuid, Uuid)>,
    input: Option<Json<StartStageInput>>,
) -> AppResult<Json<ProductionDetail>> {
    current_user.0.require_staff()?;
    let service = ProductionService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.start_stage(production_id, log_id, input).await?))
}

pub async fn complete_stage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((production_id, log_id)): Path<(Uuid, Uuid)>,
    input: Option<Json<CompleteStageInput>>,
) -> AppResult<Json<ProductionDetail>> {
    current_user.0.require_staff()?;
    let service = ProductionService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.complete_stage(production_id, log_id, input).await?))
}

pub async fn update_stage_progress(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((production_id, log_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<StageProgressInput>,
) -> AppResult<Json<ProductionDetail>> {
    current_user.0.require_staff()?;
    let service = ProductionService::new(state.db);
    Ok(Json(service.update_stage_progress(production_id, log_id, input).await?))
}

/// Run one auto-advance pass now
pub async fn trigger_auto_advance(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<AdvanceSummary>> {
    current_user.0.require_staff()?;
    let service = ProductionService::new(state.db);
    Ok(Json(service.auto_advance_all(Utc::now()).await?))
}

/// Run one timeline sweep now; `?force=true` closes every delayed stage
pub async fn trigger_update_stages(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<UpdateStagesQuery>,
) -> AppResult<Json<TimelineSummary>> {
    current_user.0.require_staff()?;
    let service = ProductionService::new(state.db);
    Ok(Json(service.update_stages_all(Utc::now(), query.force).await?))
}
