//! Reporting service for production analytics and inventory exports

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, AppResult};
use crate::services::production::ProductionService;
use shared::{
    build_production_report, forecast_material, DateRange, MaterialForecast, MaterialUsage,
    ProductType, ProductionReport, ReportFormat, ReportPeriod, TransactionType,
};

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
    productions: ProductionService,
}

/// Production report parameters
#[derive(Debug, Deserialize, Default)]
pub struct ProductionReportQuery {
    pub period: Option<ReportPeriod>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub product_type: Option<ProductType>,
    pub format: Option<ReportFormat>,
}

#[derive(Debug, Deserialize, Default)]
pub struct InventoryReportQuery {
    pub window_days: Option<u32>,
}

/// Inventory CSV exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryReportKind {
    Overview,
    Turnover,
    Replenishment,
}

impl InventoryReportKind {
    pub const ALL: [InventoryReportKind; 3] = [
        InventoryReportKind::Overview,
        InventoryReportKind::Turnover,
        InventoryReportKind::Replenishment,
    ];

    pub fn file_stem(&self) -> &'static str {
        match self {
            InventoryReportKind::Overview => "inventory_overview",
            InventoryReportKind::Turnover => "inventory_turnover",
            InventoryReportKind::Replenishment => "replenishment_schedule",
        }
    }
}

#[derive(Debug, FromRow)]
struct MaterialUsageRow {
    material_code: String,
    material_name: String,
    unit_of_measure: String,
    current_stock: Decimal,
    critical_stock: Decimal,
    reorder_level: Decimal,
    max_level: Option<Decimal>,
    lead_time_days: i32,
    consumed: Decimal,
}

impl From<MaterialUsageRow> for MaterialUsage {
    fn from(row: MaterialUsageRow) -> Self {
        MaterialUsage {
            material_code: row.material_code,
            material_name: row.material_name,
            unit_of_measure: row.unit_of_measure,
            on_hand: row.current_stock,
            critical_stock: row.critical_stock,
            reorder_level: row.reorder_level,
            max_level: row.max_level,
            lead_time_days: row.lead_time_days,
            consumed_in_window: row.consumed,
        }
    }
}

#[derive(Debug, Serialize)]
struct OverviewRow<'a> {
    material_code: &'a str,
    material_name: &'a str,
    unit_of_measure: &'a str,
    on_hand: Decimal,
    critical_stock: Decimal,
    reorder_level: Decimal,
    lead_time_days: i32,
}

#[derive(Debug, Serialize)]
struct TurnoverRow<'a> {
    material_code: &'a str,
    material_name: &'a str,
    on_hand: Decimal,
    avg_daily_usage: Decimal,
    days_to_depletion: Option<Decimal>,
    inventory_turnover_days: Option<Decimal>,
    reorder_point: Decimal,
}

#[derive(Debug, Serialize)]
struct ReplenishmentRow<'a> {
    material_code: &'a str,
    material_name: &'a str,
    on_hand: Decimal,
    reorder_point: Decimal,
    reorder_on_or_before: Option<NaiveDate>,
    suggested_order_qty: Decimal,
}

/// Body returned for an empty export
pub const NO_DATA: &str = "No data\n";

/// Render the report in the requested format; returns the body text
pub fn render_production_report(report: &ProductionReport, format: ReportFormat) -> AppResult<String> {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| AppError::Internal(format!("JSON serialization error: {}", e))),
        ReportFormat::Txt => Ok(report.render_text()),
        ReportFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(vec![]);
            let csv_err = |e: csv::Error| AppError::Internal(format!("CSV serialization error: {}", e));
            wtr.write_record(["Metric", "Value"]).map_err(csv_err)?;
            for (metric, value) in report.summary_rows() {
                wtr.write_record([metric, value.as_str()]).map_err(csv_err)?;
            }
            into_string(wtr)
        }
    }
}

fn into_string(wtr: csv::Writer<Vec<u8>>) -> AppResult<String> {
    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
}

/// Export rows as CSV, `No data` when there are none
pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
    if data.is_empty() {
        return Ok(NO_DATA.to_string());
    }
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in data {
        wtr.serialize(record)
            .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
    }
    into_string(wtr)
}

/// Build one inventory export from forecasts
pub fn inventory_csv(
    kind: InventoryReportKind,
    usage: &[MaterialUsage],
    forecasts: &[MaterialForecast],
) -> AppResult<String> {
    match kind {
        InventoryReportKind::Overview => {
            let rows: Vec<OverviewRow> = usage
                .iter()
                .map(|u| OverviewRow {
                    material_code: &u.material_code,
                    material_name: &u.material_name,
                    unit_of_measure: &u.unit_of_measure,
                    on_hand: u.on_hand,
                    critical_stock: u.critical_stock,
                    reorder_level: u.reorder_level,
                    lead_time_days: u.lead_time_days,
                })
                .collect();
            export_to_csv(&rows)
        }
        InventoryReportKind::Turnover => {
            let rows: Vec<TurnoverRow> = forecasts
                .iter()
                .map(|f| TurnoverRow {
                    material_code: &f.material_code,
                    material_name: &f.material_name,
                    on_hand: f.on_hand,
                    avg_daily_usage: f.avg_daily_usage,
                    days_to_depletion: f.days_to_depletion,
                    inventory_turnover_days: f.inventory_turnover_days,
                    reorder_point: f.reorder_point,
                })
                .collect();
            export_to_csv(&rows)
        }
        InventoryReportKind::Replenishment => {
            let rows: Vec<ReplenishmentRow> = forecasts
                .iter()
                .filter(|f| f.suggested_order_qty > Decimal::ZERO)
                .map(|f| ReplenishmentRow {
                    material_code: &f.material_code,
                    material_name: &f.material_name,
                    on_hand: f.on_hand,
                    reorder_point: f.reorder_point,
                    reorder_on_or_before: f.reorder_on_or_before,
                    suggested_order_qty: f.suggested_order_qty,
                })
                .collect();
            export_to_csv(&rows)
        }
    }
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self {
            productions: ProductionService::new(db.clone()),
            db,
        }
    }

    /// Production report over an explicit range, or the calendar window of
    /// the period containing today
    pub async fn production_report(
        &self,
        query: &ProductionReportQuery,
        now: DateTime<Utc>,
    ) -> AppResult<ProductionReport> {
        let (period, range) = match (query.start_date, query.end_date) {
            (Some(start), Some(end)) => (
                query.period.unwrap_or(ReportPeriod::Custom),
                DateRange { start, end },
            ),
            (None, None) => {
                let period = query.period.unwrap_or_default();
                (period, period.window(now.date_naive()))
            }
            _ => {
                return Err(AppError::ValidationError(
                    "start_date and end_date must be given together".to_string(),
                ))
            }
        };
        if !range.is_valid() {
            return Err(AppError::Validation {
                field: "end_date".to_string(),
                message: "end_date must not be before start_date".to_string(),
            });
        }

        let (start, end) = range.bounds();
        let snapshots = self
            .productions
            .snapshots(start, end, query.product_type)
            .await?;
        Ok(build_production_report(period, start, end, &snapshots, now))
    }

    /// Current stock and consumption over the last `window_days`
    pub async fn material_usage(&self, window_days: u32, now: DateTime<Utc>) -> AppResult<Vec<MaterialUsage>> {
        let consumption_types: Vec<&str> = [
            TransactionType::Consumption,
            TransactionType::ProductionUsage,
            TransactionType::OrderAcceptance,
        ]
        .iter()
        .filter(|t| t.is_consumption())
        .map(|t| t.as_str())
        .collect();

        let rows = sqlx::query_as::<_, MaterialUsageRow>(
            r#"
            SELECT m.material_code, m.material_name, m.unit_of_measure, m.current_stock,
                   m.critical_stock, m.reorder_level, m.max_level, m.lead_time_days,
                   COALESCE(SUM(-t.quantity) FILTER (
                       WHERE t.transaction_type = ANY($1) AND t.occurred_at >= $2
                   ), 0) AS consumed
            FROM materials m
            LEFT JOIN inventory_transactions t ON t.material_id = m.id
            GROUP BY m.id
            ORDER BY m.material_code
            "#,
        )
        .bind(&consumption_types)
        .bind(now - Duration::days(i64::from(window_days)))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(MaterialUsage::from).collect())
    }

    pub async fn inventory_report(
        &self,
        kind: InventoryReportKind,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        let usage = self.material_usage(window_days, now).await?;
        let forecasts: Vec<MaterialForecast> = usage
            .iter()
            .map(|u| forecast_material(u, window_days, now.date_naive()))
            .collect();
        inventory_csv(kind, &usage, &forecasts)
    }

    /// Write a JSON production report under `<dir>/production/`
    pub async fn save_production_report(
        &self,
        period: ReportPeriod,
        output_dir: &Path,
        now: DateTime<Utc>,
    ) -> AppResult<PathBuf> {
        let query = ProductionReportQuery {
            period: Some(period),
            ..Default::default()
        };
        let report = self.production_report(&query, now).await?;
        let body = render_production_report(&report, ReportFormat::Json)?;

        let dir = output_dir.join("production");
        let path = dir.join(format!(
            "production_report_{}_{}.json",
            period.as_str(),
            now.format("%Y%m%d_%H%M%S")
        ));
        write_file(&dir, &path, body).await?;
        Ok(path)
    }

    /// Write every inventory export under `<dir>/inventory/<date>/`
    pub async fn save_inventory_reports(
        &self,
        window_days: u32,
        output_dir: &Path,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PathBuf>> {
        let usage = self.material_usage(window_days, now).await?;
        let forecasts: Vec<MaterialForecast> = usage
            .iter()
            .map(|u| forecast_material(u, window_days, now.date_naive()))
            .collect();

        let dir = output_dir
            .join("inventory")
            .join(now.date_naive().format("%Y-%m-%d").to_string());
        let mut paths = Vec::with_capacity(InventoryReportKind::ALL.len());
        for kind in InventoryReportKind::ALL {
            let body = inventory_csv(kind, &usage, &forecasts)?;
            let path = dir.join(format!("{}_{}d.csv", kind.file_stem(), window_days));
            write_file(&dir, &path, body).await?;
            paths.push(path);
        }
        Ok(paths)
    }
}

async fn write_file(dir: &Path, path: &Path, body: String) -> AppResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Internal(format!("Cannot create {}: {}", dir.display(), e)))?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| AppError::Internal(format!("Cannot write {}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), "Report saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(code: &str, on_hand: i64, consumed: i64) -> MaterialUsage {
        MaterialUsage {
            material_code: code.to_string(),
            material_name: format!("Material {}", code),
            unit_of_measure: "pcs".to_string(),
            on_hand: Decimal::from(on_hand),
            critical_stock: Decimal::from(5),
            reorder_level: Decimal::from(10),
            max_level: Some(Decimal::from(100)),
            lead_time_days: 7,
            consumed_in_window: Decimal::from(consumed),
        }
    }

    #[test]
    fn test_empty_export_reads_no_data() {
        let out = inventory_csv(InventoryReportKind::Overview, &[], &[]).unwrap();
        assert_eq!(out, NO_DATA);
    }

    #[test]
    fn test_overview_has_header_and_rows() {
        let usage = vec![usage("PLY-01", 40, 30), usage("NAIL-02", 3, 60)];
        let out = inventory_csv(InventoryReportKind::Overview, &usage, &[]).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("material_code,material_name,unit_of_measure,on_hand,critical_stock,reorder_level,lead_time_days")
        );
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_replenishment_only_lists_positive_suggestions() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let usage = vec![usage("PLY-01", 1000, 30), usage("NAIL-02", 3, 60)];
        let forecasts: Vec<MaterialForecast> =
            usage.iter().map(|u| forecast_material(u, 30, today)).collect();
        let out = inventory_csv(InventoryReportKind::Replenishment, &usage, &forecasts).unwrap();
        assert!(out.contains("NAIL-02"));
        assert!(!out.contains("PLY-01"));
    }
}
