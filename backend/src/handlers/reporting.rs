//! Reporting handlers for production analytics and inventory exports

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::reporting::{
    render_production_report, InventoryReportKind, InventoryReportQuery, ProductionReportQuery,
    ReportingService,
};
use crate::AppState;

/// Production report as JSON, CSV or text
pub async fn get_production_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ProductionReportQuery>,
) -> AppResult<Response> {
    current_user.0.require_staff()?;
    let service = ReportingService::new(state.db.clone());
    let now = Utc::now();
    let report = service.production_report(&query, now).await?;

    let format = query.format.unwrap_or_default();
    let body = render_production_report(&report, format)?;
    let filename = format!(
        "attachment; filename=\"production_report_{}_{}.{}\"",
        report.report_info.period.as_str(),
        now.format("%Y%m%d"),
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        body,
    )
        .into_response())
}

/// Inventory CSV export: overview, turnover or replenishment
pub async fn get_inventory_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(kind): Path<InventoryReportKind>,
    Query(query): Query<InventoryReportQuery>,
) -> AppResult<Response> {
    current_user.0.require_staff()?;
    let window_days = query
        .window_days
        .unwrap_or(state.config.reports.inventory_window_days)
        .clamp(1, 365);
    let service = ReportingService::new(state.db.clone());
    let csv = service.inventory_report(kind, window_days, Utc::now()).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}_{}d.csv\"", kind.file_stem(), window_days),
            ),
        ],
        csv,
    )
        .into_response())
}
