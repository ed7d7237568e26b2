//! Production service
//!
//! Loads a production and its stage logs into the shared progression engine,
//! applies a transition, and writes back whatever changed. Every mutation
//! runs in a transaction holding the production row lock, so the scheduler
//! and HTTP triggers cannot advance the same production twice.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::product::Product;
use crate::services::tracking::TrackingService;
use shared::{
    estimated_completion, format_batch_number, is_production_delayed, plan_stage_logs,
    validate_progress, AdvanceOutcome, Priority, ProductType, ProductionSnapshot,
    ProductionState, ProductionStatus, StageLogStatus, StageState, STAGE_CATALOG,
    STAGE_READY_FOR_DELIVERY,
};

/// Production service
#[derive(Clone)]
pub struct ProductionService {
    db: PgPool,
}

/// Production record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Production {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub product_id: Uuid,
    pub product_name: String,
    pub date: NaiveDate,
    pub current_stage: String,
    pub status: String,
    pub quantity: i32,
    pub priority: String,
    pub production_batch_number: Option<String>,
    pub requires_tracking: bool,
    pub product_type: String,
    pub overall_progress: Decimal,
    pub production_started_at: Option<DateTime<Utc>>,
    pub estimated_completion_date: Option<DateTime<Utc>>,
    pub actual_completion_date: Option<DateTime<Utc>>,
    pub resources_used: serde_json::Value,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Production {
    pub fn status(&self) -> ProductionStatus {
        // unknown values are parked rather than advanced
        ProductionStatus::from_str(&self.status).unwrap_or(ProductionStatus::Hold)
    }

    pub fn product_type(&self) -> ProductType {
        ProductType::from_str(&self.product_type)
            .unwrap_or_else(|| ProductType::from_product_name(&self.product_name))
    }

    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        is_production_delayed(self.status(), self.estimated_completion_date, now)
    }
}

/// Stage log joined with its catalog stage
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StageLog {
    pub id: Uuid,
    pub production_id: Uuid,
    pub production_stage_id: Uuid,
    pub stage_name: String,
    pub description: Option<String>,
    pub order_sequence: i32,
    pub duration_hours: i32,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub actual_duration_hours: Option<i32>,
    pub progress_percentage: Decimal,
    pub notes: Option<String>,
    pub issues: serde_json::Value,
    pub resources_used: serde_json::Value,
    pub assigned_worker_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl StageLog {
    pub fn to_state(&self) -> StageState {
        StageState {
            id: self.id,
            order_sequence: self.order_sequence,
            stage_name: self.stage_name.clone(),
            duration_hours: self.duration_hours,
            status: StageLogStatus::from_str(&self.status).unwrap_or(StageLogStatus::Hold),
            started_at: self.started_at,
            completed_at: self.completed_at,
            estimated_completion_at: self.estimated_completion_at,
            actual_duration_hours: self.actual_duration_hours,
            progress_percentage: self.progress_percentage,
            notes: self.notes.clone(),
            issues: serde_json::from_value(self.issues.clone()).unwrap_or_default(),
        }
    }
}

/// Stage log with derived delay information
#[derive(Debug, Serialize)]
pub struct StageLogView {
    #[serde(flatten)]
    pub log: StageLog,
    pub is_delayed: bool,
    pub delay_hours: i64,
}

#[derive(Debug, Serialize)]
pub struct ProductionDetail {
    #[serde(flatten)]
    pub production: Production,
    pub is_delayed: bool,
    pub stages: Vec<StageLogView>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductionInput {
    pub product_id: Uuid,
    pub order_id: Option<Uuid>,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductionInput {
    pub priority: Option<Priority>,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: Option<i32>,
    pub notes: Option<String>,
    /// Only `Hold` and `In Progress` may be set by hand
    pub status: Option<ProductionStatus>,
    pub estimated_completion_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StartStageInput {
    pub assigned_worker_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CompleteStageInput {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StageProgressInput {
    pub progress_percentage: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProductionFilter {
    pub status: Option<String>,
    pub product_type: Option<String>,
    pub order_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Counts from one auto-advance pass
#[derive(Debug, Default, Serialize)]
pub struct AdvanceSummary {
    pub examined: usize,
    pub advanced: usize,
    pub stages_completed: usize,
    pub productions_completed: usize,
    pub failed: usize,
}

/// Counts from one timeline sweep
#[derive(Debug, Default, Serialize)]
pub struct TimelineSummary {
    pub examined: usize,
    pub updated: usize,
    pub severely_delayed_closed: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ProductionDeadline {
    pub id: Uuid,
    pub product_name: String,
    pub current_stage: String,
    pub overall_progress: Decimal,
    pub estimated_completion_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ProductionDashboard {
    pub total_productions: i64,
    pub in_progress: i64,
    pub completed_today: i64,
    pub delayed: i64,
    pub requiring_tracking: i64,
    pub ready_stocked_units: i64,
    pub average_completion_hours: Decimal,
    pub stage_workload: BTreeMap<String, i64>,
    pub recent: Vec<Production>,
    pub delayed_productions: Vec<ProductionDeadline>,
    pub upcoming_deadlines: Vec<ProductionDeadline>,
}

const STAGE_LOG_QUERY: &str = r#"
    SELECT l.id, l.production_id, l.production_stage_id, s.name AS stage_name, s.description,
           s.order_sequence, s.duration_hours, l.status, l.started_at, l.completed_at,
           l.estimated_completion_at, l.actual_duration_hours, l.progress_percentage, l.notes,
           l.issues, l.resources_used, l.assigned_worker_id, l.updated_at
    FROM production_stage_logs l
    JOIN production_stages s ON s.id = l.production_stage_id
"#;

impl ProductionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ========================================================================
    // Loading and persisting progression state
    // ========================================================================

    async fn lock_production(conn: &mut PgConnection, production_id: Uuid) -> AppResult<Production> {
        sqlx::query_as::<_, Production>("SELECT * FROM productions WHERE id = $1 FOR UPDATE")
            .bind(production_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Production".to_string()))
    }

    pub(crate) async fn stage_logs(conn: &mut PgConnection, production_id: Uuid) -> AppResult<Vec<StageLog>> {
        let logs = sqlx::query_as::<_, StageLog>(&format!(
            "{STAGE_LOG_QUERY} WHERE l.production_id = $1 ORDER BY s.order_sequence"
        ))
        .bind(production_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(logs)
    }

    fn to_state(production: &Production, logs: &[StageLog]) -> ProductionState {
        ProductionState::new(
            production.status(),
            production.current_stage.clone(),
            production.overall_progress,
            production.requires_tracking,
            production.actual_completion_date,
            logs.iter().map(StageLog::to_state).collect(),
        )
    }

    /// Lock a production and load its progression state
    async fn load_state(
        conn: &mut PgConnection,
        production_id: Uuid,
    ) -> AppResult<(Production, ProductionState)> {
        let production = Self::lock_production(conn, production_id).await?;
        let logs = Self::stage_logs(conn, production_id).await?;
        let state = Self::to_state(&production, &logs);
        Ok((production, state))
    }

    /// Write back the production fields and every stage log that changed,
    /// then refresh the customer-facing tracking row.
    async fn persist_state(
        conn: &mut PgConnection,
        production: &Production,
        before: &ProductionState,
        after: &ProductionState,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE productions
            SET status = $2, current_stage = $3, overall_progress = $4,
                actual_completion_date = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(production.id)
        .bind(after.status.as_str())
        .bind(&after.current_stage)
        .bind(after.overall_progress)
        .bind(after.actual_completion_date)
        .execute(&mut *conn)
        .await?;

        for (old, new) in before.stages.iter().zip(after.stages.iter()) {
            if old == new {
                continue;
            }
            sqlx::query(
                r#"
                UPDATE production_stage_logs
                SET status = $2, started_at = $3, completed_at = $4,
                    estimated_completion_at = $5, actual_duration_hours = $6,
                    progress_percentage = $7, notes = $8, issues = $9, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(new.id)
            .bind(new.status.as_str())
            .bind(new.started_at)
            .bind(new.completed_at)
            .bind(new.estimated_completion_at)
            .bind(new.actual_duration_hours)
            .bind(new.progress_percentage)
            .bind(&new.notes)
            .bind(serde_json::to_value(&new.issues).map_err(anyhow::Error::from)?)
            .execute(&mut *conn)
            .await?;
        }

        TrackingService::sync_production(conn, production.id).await?;
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn list_productions(&self, filter: ProductionFilter) -> AppResult<Vec<Production>> {
        let productions = sqlx::query_as::<_, Production>(
            r#"
            SELECT * FROM productions
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR product_type = $2)
              AND ($3::uuid IS NULL OR order_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&filter.status)
        .bind(&filter.product_type)
        .bind(filter.order_id)
        .bind(filter.limit.unwrap_or(50).clamp(1, 500))
        .bind(filter.offset.unwrap_or(0).max(0))
        .fetch_all(&self.db)
        .await?;
        Ok(productions)
    }

    pub async fn get_production(&self, production_id: Uuid) -> AppResult<ProductionDetail> {
        let production = sqlx::query_as::<_, Production>("SELECT * FROM productions WHERE id = $1")
            .bind(production_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Production".to_string()))?;

        let mut conn = self.db.acquire().await?;
        let logs = Self::stage_logs(&mut conn, production_id).await?;
        let now = Utc::now();

        let stages = logs
            .into_iter()
            .map(|log| {
                let state = log.to_state();
                StageLogView {
                    is_delayed: state.is_delayed(now),
                    delay_hours: state.delay_hours(now),
                    log,
                }
            })
            .collect();

        Ok(ProductionDetail {
            is_delayed: production.is_delayed(now),
            production,
            stages,
        })
    }

    /// Snapshots of productions created in `[start, end]` for reporting
    pub async fn snapshots(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        product_type: Option<ProductType>,
    ) -> AppResult<Vec<ProductionSnapshot>> {
        let productions = sqlx::query_as::<_, Production>(
            r#"
            SELECT * FROM productions
            WHERE created_at BETWEEN $1 AND $2
              AND ($3::text IS NULL OR product_type = $3)
            ORDER BY created_at
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(product_type.map(|t| t.as_str()))
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<Uuid> = productions.iter().map(|p| p.id).collect();
        let logs = sqlx::query_as::<_, StageLog>(&format!(
            "{STAGE_LOG_QUERY} WHERE l.production_id = ANY($1) ORDER BY s.order_sequence"
        ))
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;

        let mut by_production: BTreeMap<Uuid, Vec<StageLog>> = BTreeMap::new();
        for log in logs {
            by_production.entry(log.production_id).or_default().push(log);
        }

        Ok(productions
            .into_iter()
            .map(|p| {
                let logs = by_production.remove(&p.id).unwrap_or_default();
                let mut resources: BTreeMap<String, Decimal> =
                    serde_json::from_value(p.resources_used.clone()).unwrap_or_default();
                for log in &logs {
                    let stage_resources: BTreeMap<String, Decimal> =
                        serde_json::from_value(log.resources_used.clone()).unwrap_or_default();
                    for (name, amount) in stage_resources {
                        *resources.entry(name).or_default() += amount;
                    }
                }
                ProductionSnapshot {
                    id: p.id,
                    product_type: p.product_type(),
                    status: p.status(),
                    requires_tracking: p.requires_tracking,
                    created_at: p.created_at,
                    production_started_at: p.production_started_at,
                    estimated_completion_date: p.estimated_completion_date,
                    actual_completion_date: p.actual_completion_date,
                    resources_used: resources,
                    stages: logs.iter().map(StageLog::to_state).collect(),
                    batch_number: p.production_batch_number,
                    product_name: p.product_name,
                }
            })
            .collect())
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Claim the next batch sequence for `date`. The counter row stays
    /// locked until the caller's transaction ends, so concurrent acceptances
    /// on one date queue up instead of colliding.
    async fn next_batch_sequence(conn: &mut PgConnection, date: NaiveDate) -> AppResult<i32> {
        let sequence = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO production_batch_counters (batch_date, last_sequence)
            VALUES ($1, 1)
            ON CONFLICT (batch_date) DO UPDATE
                SET last_sequence = production_batch_counters.last_sequence + 1
            RETURNING last_sequence
            "#,
        )
        .bind(date)
        .fetch_one(&mut *conn)
        .await?;
        Ok(sequence)
    }

    /// Create a production inside the caller's transaction.
    ///
    /// Tracked products get one pending log per catalog stage and start
    /// stage 1 immediately. Stocked products are created finished and
    /// ready for delivery.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_in_tx(
        conn: &mut PgConnection,
        product: &Product,
        order_id: Option<Uuid>,
        user_id: Option<Uuid>,
        quantity: i32,
        priority: Priority,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Production> {
        let product_type = product.product_type();
        let requires_tracking = product_type.requires_tracking();
        let today = now.date_naive();

        let sequence = Self::next_batch_sequence(conn, today).await?;
        let batch_number = format_batch_number(today, sequence as u32);

        let (status, current_stage, progress, eta, completed_at) = if requires_tracking {
            (
                ProductionStatus::InProgress,
                STAGE_CATALOG[0].name,
                Decimal::ZERO,
                Some(estimated_completion(now)),
                None,
            )
        } else {
            (
                ProductionStatus::Completed,
                STAGE_READY_FOR_DELIVERY,
                Decimal::ONE_HUNDRED,
                Some(now),
                Some(now),
            )
        };

        let production = sqlx::query_as::<_, Production>(
            r#"
            INSERT INTO productions (
                order_id, user_id, product_id, product_name, date, current_stage, status,
                quantity, priority, production_batch_number, requires_tracking, product_type,
                overall_progress, production_started_at, estimated_completion_date,
                actual_completion_date, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(user_id)
        .bind(product.id)
        .bind(&product.name)
        .bind(today)
        .bind(current_stage)
        .bind(status.as_str())
        .bind(quantity)
        .bind(priority.as_str())
        .bind(&batch_number)
        .bind(requires_tracking)
        .bind(product_type.as_str())
        .bind(progress)
        .bind(now)
        .bind(eta)
        .bind(completed_at)
        .bind(notes)
        .fetch_one(&mut *conn)
        .await?;

        if requires_tracking {
            let mut state = ProductionState::new(
                status,
                current_stage,
                progress,
                true,
                None,
                plan_stage_logs(now),
            );
            state.start_stage(0, now)?;

            for stage in &state.stages {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO production_stage_logs (
                        id, production_id, production_stage_id, status, started_at,
                        estimated_completion_at, progress_percentage
                    )
                    SELECT $1, $2, s.id, $4, $5, $6, $7
                    FROM production_stages s
                    WHERE s.name = $3
                    "#,
                )
                .bind(stage.id)
                .bind(production.id)
                .bind(&stage.stage_name)
                .bind(stage.status.as_str())
                .bind(stage.started_at)
                .bind(stage.estimated_completion_at)
                .bind(stage.progress_percentage)
                .execute(&mut *conn)
                .await?;

                if inserted.rows_affected() == 0 {
                    return Err(AppError::Internal(format!(
                        "Production stage '{}' is missing from the catalog",
                        stage.stage_name
                    )));
                }
            }
        }

        tracing::info!(
            production_id = %production.id,
            batch = %batch_number,
            product_type = %product_type,
            requires_tracking,
            "Production created"
        );
        Ok(production)
    }

    pub async fn create_production(
        &self,
        user_id: Uuid,
        input: CreateProductionInput,
    ) -> AppResult<ProductionDetail> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(input.product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let production = Self::create_in_tx(
            &mut tx,
            &product,
            input.order_id,
            Some(user_id),
            input.quantity,
            input.priority.unwrap_or_default(),
            input.notes.as_deref(),
            Utc::now(),
        )
        .await?;
        TrackingService::sync_production(&mut tx, production.id).await?;
        tx.commit().await?;

        self.get_production(production.id).await
    }

    pub async fn update_production(
        &self,
        production_id: Uuid,
        input: UpdateProductionInput,
    ) -> AppResult<ProductionDetail> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let production = Self::lock_production(&mut tx, production_id).await?;

        if let Some(status) = input.status {
            let current = production.status();
            let allowed = matches!(
                (current, status),
                (ProductionStatus::InProgress, ProductionStatus::Hold)
                    | (ProductionStatus::Hold, ProductionStatus::InProgress)
                    | (ProductionStatus::Pending, ProductionStatus::Hold)
            ) || current == status;
            if !allowed {
                return Err(AppError::InvalidStateTransition(format!(
                    "Cannot change production status from {} to {}",
                    current, status
                )));
            }
        }

        sqlx::query(
            r#"
            UPDATE productions SET
                priority = COALESCE($2, priority),
                quantity = COALESCE($3, quantity),
                notes = COALESCE($4, notes),
                status = COALESCE($5, status),
                estimated_completion_date = COALESCE($6, estimated_completion_date),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(production_id)
        .bind(input.priority.map(|p| p.as_str()))
        .bind(input.quantity)
        .bind(&input.notes)
        .bind(input.status.map(|s| s.as_str()))
        .bind(input.estimated_completion_date)
        .execute(&mut *tx)
        .await?;

        TrackingService::sync_production(&mut tx, production_id).await?;
        tx.commit().await?;

        self.get_production(production_id).await
    }

    // ========================================================================
    // Stage transitions
    // ========================================================================

    pub async fn start_stage(
        &self,
        production_id: Uuid,
        log_id: Uuid,
        input: StartStageInput,
    ) -> AppResult<ProductionDetail> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let (production, before) = Self::load_state(&mut tx, production_id).await?;
        if matches!(before.status, ProductionStatus::Completed | ProductionStatus::Hold) {
            return Err(shared::ProgressionError::NotAdvancing(before.status).into());
        }

        let mut after = before.clone();
        let index = after.stage_index(log_id)?;
        after.start_stage(index, now)?;
        Self::persist_state(&mut tx, &production, &before, &after).await?;

        if let Some(worker) = input.assigned_worker_id {
            sqlx::query("UPDATE production_stage_logs SET assigned_worker_id = $2 WHERE id = $1")
                .bind(log_id)
                .bind(worker)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(production_id = %production_id, stage = %after.current_stage, "Stage started");
        self.get_production(production_id).await
    }

    pub async fn complete_stage(
        &self,
        production_id: Uuid,
        log_id: Uuid,
        input: CompleteStageInput,
    ) -> AppResult<ProductionDetail> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let (production, before) = Self::load_state(&mut tx, production_id).await?;
        if before.status == ProductionStatus::Hold {
            return Err(shared::ProgressionError::NotAdvancing(before.status).into());
        }

        let mut after = before.clone();
        let index = after.stage_index(log_id)?;
        let completed = after.stages[index].stage_name.clone();
        let next = after.complete_stage(index, now, input.notes.as_deref())?;
        Self::persist_state(&mut tx, &production, &before, &after).await?;
        tx.commit().await?;

        tracing::info!(
            production_id = %production_id,
            completed = %completed,
            next = next.as_deref().unwrap_or("none"),
            progress = %after.overall_progress,
            "Stage completed"
        );
        self.get_production(production_id).await
    }

    pub async fn update_stage_progress(
        &self,
        production_id: Uuid,
        log_id: Uuid,
        input: StageProgressInput,
    ) -> AppResult<ProductionDetail> {
        validate_progress(input.progress_percentage).map_err(|msg| AppError::Validation {
            field: "progress_percentage".to_string(),
            message: msg.to_string(),
        })?;

        let mut tx = self.db.begin().await?;
        let (production, before) = Self::load_state(&mut tx, production_id).await?;
        let mut after = before.clone();
        let index = after.stage_index(log_id)?;
        after.update_stage_progress(index, input.progress_percentage)?;
        if let Some(notes) = input.notes.filter(|n| !n.is_empty()) {
            after.stages[index].notes = Some(notes);
        }
        Self::persist_state(&mut tx, &production, &before, &after).await?;
        tx.commit().await?;

        self.get_production(production_id).await
    }

    // ========================================================================
    // Scheduled progression
    // ========================================================================

    async fn active_tracked_ids(&self) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM productions
            WHERE status = $1 AND requires_tracking = TRUE
            ORDER BY created_at
            "#,
        )
        .bind(ProductionStatus::InProgress.as_str())
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    async fn advance_one(&self, production_id: Uuid, now: DateTime<Utc>) -> AppResult<AdvanceOutcome> {
        let mut tx = self.db.begin().await?;
        let (production, before) = Self::load_state(&mut tx, production_id).await?;

        let mut after = before.clone();
        let outcome = after.auto_advance(now);
        if outcome.changed() {
            Self::persist_state(&mut tx, &production, &before, &after).await?;
        }
        tx.commit().await?;
        Ok(outcome)
    }

    /// Time-threshold pass over every in-progress tracked production
    pub async fn auto_advance_all(&self, now: DateTime<Utc>) -> AppResult<AdvanceSummary> {
        let mut summary = AdvanceSummary::default();

        for id in self.active_tracked_ids().await? {
            summary.examined += 1;
            match self.advance_one(id, now).await {
                Ok(AdvanceOutcome::Advanced { completed, next }) => {
                    summary.advanced += 1;
                    summary.stages_completed += 1;
                    if next.is_none() {
                        summary.productions_completed += 1;
                    }
                    tracing::info!(
                        production_id = %id,
                        completed = %completed,
                        next = next.as_deref().unwrap_or("Completed"),
                        "Production advanced"
                    );
                }
                Ok(AdvanceOutcome::Progressed { .. }) => summary.advanced += 1,
                Ok(AdvanceOutcome::Idle) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(production_id = %id, error = %e, "Auto-advance failed");
                }
            }
        }

        tracing::info!(
            examined = summary.examined,
            advanced = summary.advanced,
            stages_completed = summary.stages_completed,
            "Auto-advance pass finished"
        );
        Ok(summary)
    }

    async fn sweep_one(
        &self,
        production_id: Uuid,
        now: DateTime<Utc>,
        force: bool,
    ) -> AppResult<(bool, usize)> {
        let mut tx = self.db.begin().await?;
        let (production, before) = Self::load_state(&mut tx, production_id).await?;

        let mut after = before.clone();
        let changed = after.apply_timeline(now, force);
        let closed = after.sweep_severely_delayed(now);
        if after != before {
            Self::persist_state(&mut tx, &production, &before, &after).await?;
        }
        tx.commit().await?;
        Ok((changed, closed))
    }

    /// Timeline sweep: close due stages, start stages whose slot has come,
    /// and force-close stages twelve or more hours overdue
    pub async fn update_stages_all(&self, now: DateTime<Utc>, force: bool) -> AppResult<TimelineSummary> {
        let mut summary = TimelineSummary::default();

        for id in self.active_tracked_ids().await? {
            summary.examined += 1;
            match self.sweep_one(id, now, force).await {
                Ok((changed, closed)) => {
                    if changed || closed > 0 {
                        summary.updated += 1;
                    }
                    if closed > 0 {
                        tracing::warn!(production_id = %id, closed, "Severely delayed stages auto-completed");
                    }
                    summary.severely_delayed_closed += closed;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(production_id = %id, error = %e, "Stage update failed");
                }
            }
        }

        tracing::info!(
            examined = summary.examined,
            updated = summary.updated,
            force,
            "Stage update pass finished"
        );
        Ok(summary)
    }

    // ========================================================================
    // Dashboard
    // ========================================================================

    pub async fn dashboard(&self, now: DateTime<Utc>) -> AppResult<ProductionDashboard> {
        let (total, in_progress, completed_today, delayed, requiring_tracking) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE status = 'In Progress'),
                    COUNT(*) FILTER (WHERE status = 'Completed' AND actual_completion_date::date = $1::date),
                    COUNT(*) FILTER (WHERE status <> 'Completed' AND estimated_completion_date < $1),
                    COUNT(*) FILTER (WHERE requires_tracking)
                FROM productions
                "#,
            )
            .bind(now)
            .fetch_one(&self.db)
            .await?;

        let ready_stocked_units = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(stock), 0)::bigint FROM products WHERE product_type = $1",
        )
        .bind(ProductType::Alkansya.as_str())
        .fetch_one(&self.db)
        .await?;

        let average_completion_hours = sqlx::query_scalar::<_, Option<Decimal>>(
            r#"
            SELECT ROUND(AVG(EXTRACT(EPOCH FROM (actual_completion_date - production_started_at)) / 3600)::numeric, 1)
            FROM productions
            WHERE status = 'Completed' AND requires_tracking
              AND actual_completion_date IS NOT NULL AND production_started_at IS NOT NULL
            "#,
        )
        .fetch_one(&self.db)
        .await?
        .unwrap_or(Decimal::ZERO);

        let workload = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT current_stage, COUNT(*) FROM productions
            WHERE status = 'In Progress' AND requires_tracking
            GROUP BY current_stage
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let recent = sqlx::query_as::<_, Production>(
            "SELECT * FROM productions ORDER BY created_at DESC LIMIT 10",
        )
        .fetch_all(&self.db)
        .await?;

        let delayed_productions = sqlx::query_as::<_, ProductionDeadline>(
            r#"
            SELECT id, product_name, current_stage, overall_progress, estimated_completion_date
            FROM productions
            WHERE status <> 'Completed' AND estimated_completion_date < $1
            ORDER BY estimated_completion_date
            "#,
        )
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        let upcoming_deadlines = sqlx::query_as::<_, ProductionDeadline>(
            r#"
            SELECT id, product_name, current_stage, overall_progress, estimated_completion_date
            FROM productions
            WHERE status <> 'Completed' AND estimated_completion_date BETWEEN $1 AND $2
            ORDER BY estimated_completion_date
            "#,
        )
        .bind(now)
        .bind(now + Duration::days(3))
        .fetch_all(&self.db)
        .await?;

        Ok(ProductionDashboard {
            total_productions: total,
            in_progress,
            completed_today,
            delayed,
            requiring_tracking,
            ready_stocked_units,
            average_completion_hours,
            stage_workload: workload.into_iter().collect(),
            recent,
            delayed_productions,
            upcoming_deadlines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    async fn setup_test_db() -> PgPool {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&database_url).await.expect("Failed to create pool");
        sqlx::migrate!("./migrations").run(&pool).await.expect("Failed to migrate");
        pool
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_concurrent_batch_sequences_are_unique() {
        let pool = setup_test_db().await;
        let date = NaiveDate::from_ymd_opt(2099, 12, 31).unwrap();
        sqlx::query("DELETE FROM production_batch_counters WHERE batch_date = $1")
            .bind(date)
            .execute(&pool)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let mut tx = pool.begin().await.unwrap();
                let sequence = ProductionService::next_batch_sequence(&mut tx, date).await.unwrap();
                tx.commit().await.unwrap();
                sequence
            }));
        }

        let mut sequences = BTreeSet::new();
        for handle in handles {
            sequences.insert(handle.await.unwrap());
        }
        assert_eq!(sequences, (1..=8).collect::<BTreeSet<i32>>());
    }
}
