//! Customer-facing order tracking
//!
//! `order_trackings` mirrors each production onto its order line. It is
//! refreshed inside whatever transaction changed the production.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::production::{Production, ProductionService};
use shared::{
    format_duration, pipeline_minutes, predict_completion, tracking_progress, OrderStatus,
    ProductionStatus, TrackingStatus, TrackingType,
};

#[derive(Clone)]
pub struct TrackingService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderTracking {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub production_id: Option<Uuid>,
    pub tracking_type: String,
    pub current_stage: String,
    pub status: String,
    pub progress: Decimal,
    pub estimated_start_date: Option<DateTime<Utc>>,
    pub estimated_completion_date: Option<DateTime<Utc>>,
    pub actual_start_date: Option<DateTime<Utc>>,
    pub actual_completion_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TimelineEntry {
    pub stage: String,
    pub status: String,
    pub progress: Decimal,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub duration: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackedItem {
    #[serde(flatten)]
    pub tracking: OrderTracking,
    pub product_name: String,
    pub message: &'static str,
    pub estimated_duration: String,
    pub predicted_completion: Option<DateTime<Utc>>,
    pub timeline: Vec<TimelineEntry>,
}

#[derive(Debug, Serialize)]
pub struct OrderTrackingView {
    pub order_id: Uuid,
    pub order_status: String,
    pub payment_status: String,
    pub items: Vec<TrackedItem>,
}

impl TrackingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Upsert the tracking row for a production's order line and move the
    /// order to ready-for-delivery once every production on it is done.
    pub async fn sync_production(conn: &mut PgConnection, production_id: Uuid) -> AppResult<()> {
        let production = sqlx::query_as::<_, Production>("SELECT * FROM productions WHERE id = $1")
            .bind(production_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Production".to_string()))?;

        let Some(order_id) = production.order_id else {
            return Ok(());
        };

        let status = production.status();
        let tracking_status = TrackingStatus::from_production(status, production.requires_tracking);
        let progress = tracking_progress(status, production.requires_tracking, production.overall_progress);

        sqlx::query(
            r#"
            INSERT INTO order_trackings (
                order_id, product_id, production_id, tracking_type, current_stage, status,
                progress, estimated_start_date, estimated_completion_date, actual_start_date,
                actual_completion_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $8, $10)
            ON CONFLICT (order_id, product_id) DO UPDATE SET
                production_id = EXCLUDED.production_id,
                tracking_type = EXCLUDED.tracking_type,
                current_stage = EXCLUDED.current_stage,
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                estimated_completion_date = EXCLUDED.estimated_completion_date,
                actual_start_date = COALESCE(order_trackings.actual_start_date, EXCLUDED.actual_start_date),
                actual_completion_date = EXCLUDED.actual_completion_date,
                updated_at = NOW()
            "#,
        )
        .bind(order_id)
        .bind(production.product_id)
        .bind(production.id)
        .bind(TrackingType::for_product(production.product_type()).as_str())
        .bind(&production.current_stage)
        .bind(tracking_status.as_str())
        .bind(progress)
        .bind(production.production_started_at)
        .bind(production.estimated_completion_date)
        .bind(production.actual_completion_date)
        .execute(&mut *conn)
        .await?;

        let unfinished = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM productions WHERE order_id = $1 AND status <> $2",
        )
        .bind(order_id)
        .bind(ProductionStatus::Completed.as_str())
        .fetch_one(&mut *conn)
        .await?;

        if unfinished == 0 {
            let moved = sqlx::query(
                "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
            )
            .bind(order_id)
            .bind(OrderStatus::ReadyForDelivery.as_str())
            .bind(OrderStatus::Processing.as_str())
            .execute(&mut *conn)
            .await?;
            if moved.rows_affected() > 0 {
                tracing::info!(order_id = %order_id, "Order ready for delivery");
            }
        }

        Ok(())
    }

    /// Tracking page for one order. Customers only see their own orders.
    pub async fn order_tracking(&self, user: &AuthUser, order_id: Uuid) -> AppResult<OrderTrackingView> {
        let (owner, order_status, payment_status) = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT user_id, status, payment_status FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        if owner != user.user_id && !user.is_staff() {
            return Err(AppError::Forbidden("Order belongs to another customer".to_string()));
        }

        let rows = sqlx::query_as::<_, OrderTracking>(
            "SELECT * FROM order_trackings WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        let now = Utc::now();
        let mut conn = self.db.acquire().await?;
        let mut items = Vec::with_capacity(rows.len());
        for tracking in rows {
            let product_name = sqlx::query_scalar::<_, String>("SELECT name FROM products WHERE id = $1")
                .bind(tracking.product_id)
                .fetch_one(&mut *conn)
                .await?;

            let logs = match tracking.production_id {
                Some(production_id) => ProductionService::stage_logs(&mut conn, production_id).await?,
                None => Vec::new(),
            };

            let timeline = logs
                .into_iter()
                .map(|log| TimelineEntry {
                    duration: match (log.started_at, log.completed_at) {
                        (Some(start), Some(end)) => Some(format_duration((end - start).num_minutes())),
                        _ => None,
                    },
                    stage: log.stage_name,
                    status: log.status,
                    progress: log.progress_percentage,
                    started_at: log.started_at,
                    completed_at: log.completed_at,
                    estimated_completion_at: log.estimated_completion_at,
                })
                .collect();

            let predicted_completion = match (tracking.actual_completion_date, tracking.actual_start_date) {
                (Some(done), _) => Some(done),
                (None, Some(started)) => predict_completion(started, tracking.progress, now)
                    .or(tracking.estimated_completion_date),
                (None, None) => tracking.estimated_completion_date,
            };

            let message = TrackingStatus::from_str(&tracking.status)
                .unwrap_or(TrackingStatus::Pending)
                .customer_message();

            items.push(TrackedItem {
                product_name,
                message,
                estimated_duration: format_duration(pipeline_minutes()),
                predicted_completion,
                timeline,
                tracking,
            });
        }

        Ok(OrderTrackingView {
            order_id,
            order_status,
            payment_status,
            items,
        })
    }
}
