//! Inventory service: materials, the stock ledger, BOM deduction and daily
//! output of stocked products

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use shared::{
    apply_stock_delta, plan_bom_deduction, plan_bom_return, validate_bom_quantity,
    validate_material_code, BomLine, MaterialRequirement, OutputRevision, ProductType,
    TransactionType,
};

/// Inventory service for materials and stock movements
#[derive(Clone)]
pub struct InventoryService {
    db: PgPool,
}

/// Raw material record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Material {
    pub id: Uuid,
    pub material_name: String,
    pub material_code: String,
    pub unit_of_measure: String,
    pub current_stock: Decimal,
    pub reorder_level: Decimal,
    pub critical_stock: Decimal,
    pub max_level: Option<Decimal>,
    pub lead_time_days: i32,
    pub standard_cost: Decimal,
    pub supplier: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ledger entry
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub material_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub production_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub transaction_type: String,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub reference: Option<String>,
    pub remarks: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// BOM row as exposed by the API
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BomEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub material_id: Uuid,
    pub material_name: String,
    pub material_code: String,
    pub unit_of_measure: String,
    pub quantity_per_product: Decimal,
    pub current_stock: Decimal,
}

#[derive(Debug, FromRow)]
struct BomLineRow {
    material_id: Uuid,
    material_name: String,
    material_code: String,
    quantity_per_product: Decimal,
    current_stock: Decimal,
    standard_cost: Decimal,
}

impl From<BomLineRow> for BomLine {
    fn from(row: BomLineRow) -> Self {
        BomLine {
            material_id: row.material_id,
            material_name: row.material_name,
            material_code: row.material_code,
            quantity_per_product: row.quantity_per_product,
            current_stock: row.current_stock,
            unit_cost: row.standard_cost,
        }
    }
}

/// Daily output of a stocked product
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailyOutput {
    pub id: Uuid,
    pub product_id: Uuid,
    pub output_date: NaiveDate,
    pub quantity_produced: i32,
    pub produced_by: String,
    pub notes: Option<String>,
    pub materials_used: serde_json::Value,
    pub total_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DailyOutputResult {
    pub output: DailyOutput,
    pub materials_used: Vec<MaterialRequirement>,
    pub total_cost: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMaterialInput {
    #[validate(length(min = 1, max = 255))]
    pub material_name: String,
    pub material_code: String,
    #[validate(length(min = 1, max = 20))]
    pub unit_of_measure: String,
    pub current_stock: Option<Decimal>,
    pub reorder_level: Option<Decimal>,
    pub critical_stock: Option<Decimal>,
    pub max_level: Option<Decimal>,
    #[validate(range(min = 0, max = 365))]
    pub lead_time_days: Option<i32>,
    pub standard_cost: Option<Decimal>,
    pub supplier: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertBomLineInput {
    pub material_id: Uuid,
    pub quantity_per_product: Decimal,
}

/// Input for a hand-posted ledger entry
#[derive(Debug, Deserialize, Validate)]
pub struct RecordTransactionInput {
    pub material_id: Uuid,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TransactionFilter {
    pub material_id: Option<Uuid>,
    pub transaction_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordDailyOutputInput {
    /// Defaults to the stocked Alkansya product
    pub product_id: Option<Uuid>,
    pub output_date: NaiveDate,
    #[validate(range(min = 0, max = 100000))]
    pub quantity_produced: i32,
    #[validate(length(min = 1, max = 255))]
    pub produced_by: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BomDeductionInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub production_id: Option<Uuid>,
    pub reference: Option<String>,
}

/// Who and what a BOM deduction is recorded against
#[derive(Debug, Clone)]
pub struct DeductionContext {
    pub transaction_type: TransactionType,
    pub reference: String,
    pub order_id: Option<Uuid>,
    pub production_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

const MATERIAL_COLUMNS: &str = r#"
    id, material_name, material_code, unit_of_measure, current_stock, reorder_level,
    critical_stock, max_level, lead_time_days, standard_cost, supplier, category,
    created_at, updated_at
"#;

impl InventoryService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ========================================================================
    // Materials
    // ========================================================================

    pub async fn list_materials(&self) -> AppResult<Vec<Material>> {
        let materials = sqlx::query_as::<_, Material>(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials ORDER BY material_code"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(materials)
    }

    pub async fn get_material(&self, material_id: Uuid) -> AppResult<Material> {
        sqlx::query_as::<_, Material>(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1"
        ))
        .bind(material_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Material".to_string()))
    }

    /// Materials at or below their reorder level
    pub async fn low_stock_materials(&self) -> AppResult<Vec<Material>> {
        let materials = sqlx::query_as::<_, Material>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS} FROM materials
            WHERE current_stock <= reorder_level
            ORDER BY (current_stock - critical_stock), material_code
            "#
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(materials)
    }

    pub async fn create_material(&self, input: CreateMaterialInput) -> AppResult<Material> {
        input.validate()?;
        validate_material_code(&input.material_code).map_err(|msg| AppError::Validation {
            field: "material_code".to_string(),
            message: msg.to_string(),
        })?;

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM materials WHERE material_code = $1",
        )
        .bind(&input.material_code)
        .fetch_one(&self.db)
        .await?;
        if existing > 0 {
            return Err(AppError::DuplicateEntry("material_code".to_string()));
        }

        let material = sqlx::query_as::<_, Material>(&format!(
            r#"
            INSERT INTO materials (
                material_name, material_code, unit_of_measure, current_stock, reorder_level,
                critical_stock, max_level, lead_time_days, standard_cost, supplier, category
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MATERIAL_COLUMNS}
            "#
        ))
        .bind(&input.material_name)
        .bind(&input.material_code)
        .bind(&input.unit_of_measure)
        .bind(input.current_stock.unwrap_or(Decimal::ZERO).max(Decimal::ZERO))
        .bind(input.reorder_level.unwrap_or(Decimal::ZERO))
        .bind(input.critical_stock.unwrap_or(Decimal::ZERO))
        .bind(input.max_level)
        .bind(input.lead_time_days.unwrap_or(0))
        .bind(input.standard_cost.unwrap_or(Decimal::ZERO))
        .bind(&input.supplier)
        .bind(&input.category)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(material = %material.material_code, "Material created");
        Ok(material)
    }

    // ========================================================================
    // Bill of materials
    // ========================================================================

    pub async fn get_bom(&self, product_id: Uuid) -> AppResult<Vec<BomEntry>> {
        let entries = sqlx::query_as::<_, BomEntry>(
            r#"
            SELECT b.id, b.product_id, b.material_id, m.material_name, m.material_code,
                   m.unit_of_measure, b.quantity_per_product, m.current_stock
            FROM bill_of_materials b
            JOIN materials m ON m.id = b.material_id
            WHERE b.product_id = $1
            ORDER BY m.material_code
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;
        Ok(entries)
    }

    pub async fn upsert_bom_line(
        &self,
        product_id: Uuid,
        input: UpsertBomLineInput,
    ) -> AppResult<Vec<BomEntry>> {
        validate_bom_quantity(input.quantity_per_product).map_err(|msg| AppError::Validation {
            field: "quantity_per_product".to_string(),
            message: msg.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO bill_of_materials (product_id, material_id, quantity_per_product)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id, material_id)
            DO UPDATE SET quantity_per_product = EXCLUDED.quantity_per_product
            "#,
        )
        .bind(product_id)
        .bind(input.material_id)
        .bind(input.quantity_per_product)
        .execute(&self.db)
        .await?;

        self.get_bom(product_id).await
    }

    /// Deduct BOM materials for `quantity` units inside the caller's transaction.
    ///
    /// Material rows are locked for the rest of the transaction. A single
    /// short material fails the call before any stock is touched.
    pub async fn deduct_bom(
        conn: &mut PgConnection,
        product_id: Uuid,
        quantity: i32,
        ctx: &DeductionContext,
    ) -> AppResult<Vec<MaterialRequirement>> {
        let lines = Self::lock_bom_lines(conn, product_id).await?;
        let plan = plan_bom_deduction(&lines, quantity)?;

        for requirement in plan.iter().filter(|r| r.quantity_used > Decimal::ZERO) {
            sqlx::query(
                "UPDATE materials SET current_stock = current_stock - $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(requirement.material_id)
            .bind(requirement.quantity_used)
            .execute(&mut *conn)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO inventory_transactions (
                    material_id, order_id, production_id, user_id, transaction_type,
                    quantity, unit_cost, total_cost, reference, remarks
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(requirement.material_id)
            .bind(ctx.order_id)
            .bind(ctx.production_id)
            .bind(ctx.user_id)
            .bind(ctx.transaction_type.as_str())
            .bind(-requirement.quantity_used)
            .bind(requirement.unit_cost)
            .bind(requirement.total_cost)
            .bind(&ctx.reference)
            .bind(format!("BOM deduction for {} unit(s)", quantity))
            .execute(&mut *conn)
            .await?;
        }

        tracing::debug!(
            product_id = %product_id,
            quantity,
            materials = plan.len(),
            "BOM deducted"
        );
        Ok(plan)
    }

    /// Hand back the materials of `quantity` withdrawn units, posting RETURN
    /// entries to the ledger. Must run inside the caller's transaction.
    pub async fn return_bom(
        conn: &mut PgConnection,
        product_id: Uuid,
        quantity: i32,
        ctx: &DeductionContext,
    ) -> AppResult<Vec<MaterialRequirement>> {
        let lines = Self::lock_bom_lines(conn, product_id).await?;
        let returns = plan_bom_return(&lines, quantity);

        for entry in returns.iter().filter(|r| r.quantity_used < Decimal::ZERO) {
            let returned = -entry.quantity_used;
            sqlx::query(
                "UPDATE materials SET current_stock = current_stock + $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(entry.material_id)
            .bind(returned)
            .execute(&mut *conn)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO inventory_transactions (
                    material_id, order_id, production_id, user_id, transaction_type,
                    quantity, unit_cost, total_cost, reference, remarks
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(entry.material_id)
            .bind(ctx.order_id)
            .bind(ctx.production_id)
            .bind(ctx.user_id)
            .bind(TransactionType::Return.as_str())
            .bind(returned)
            .bind(entry.unit_cost)
            .bind(-entry.total_cost)
            .bind(&ctx.reference)
            .bind(format!("BOM return for {} unit(s)", quantity))
            .execute(&mut *conn)
            .await?;
        }

        tracing::debug!(product_id = %product_id, quantity, "BOM returned");
        Ok(returns)
    }

    async fn lock_bom_lines(conn: &mut PgConnection, product_id: Uuid) -> AppResult<Vec<BomLine>> {
        let lines: Vec<BomLine> = sqlx::query_as::<_, BomLineRow>(
            r#"
            SELECT m.id AS material_id, m.material_name, m.material_code,
                   b.quantity_per_product, m.current_stock, m.standard_cost
            FROM bill_of_materials b
            JOIN materials m ON m.id = b.material_id
            WHERE b.product_id = $1
            ORDER BY m.id
            FOR UPDATE OF m
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(BomLine::from)
        .collect();

        if lines.is_empty() {
            return Err(AppError::NotFound("Bill of materials".to_string()));
        }
        Ok(lines)
    }

    /// Stand-alone BOM deduction for production consumption
    pub async fn consume_for_production(
        &self,
        user_id: Uuid,
        input: BomDeductionInput,
    ) -> AppResult<Vec<MaterialRequirement>> {
        input.validate()?;
        let ctx = DeductionContext {
            transaction_type: TransactionType::ProductionUsage,
            reference: input
                .reference
                .clone()
                .unwrap_or_else(|| format!("Production usage - {}", Utc::now().date_naive())),
            order_id: None,
            production_id: input.production_id,
            user_id: Some(user_id),
        };

        let mut tx = self.db.begin().await?;
        let plan = Self::deduct_bom(&mut tx, input.product_id, input.quantity, &ctx).await?;
        tx.commit().await?;
        Ok(plan)
    }

    // ========================================================================
    // Ledger
    // ========================================================================

    /// Post a manual ledger entry and move the material's stock
    pub async fn record_transaction(
        &self,
        user_id: Uuid,
        input: RecordTransactionInput,
    ) -> AppResult<InventoryTransaction> {
        input.validate()?;
        if !input.transaction_type.is_manual() {
            return Err(AppError::ValidationError(format!(
                "{} transactions are recorded by the system",
                input.transaction_type
            )));
        }
        if input.quantity.is_zero() {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: "Quantity cannot be zero".to_string(),
            });
        }

        let delta = input.transaction_type.signed_quantity(input.quantity);

        let mut tx = self.db.begin().await?;

        let (current_stock, standard_cost) = sqlx::query_as::<_, (Decimal, Decimal)>(
            "SELECT current_stock, standard_cost FROM materials WHERE id = $1 FOR UPDATE",
        )
        .bind(input.material_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Material".to_string()))?;

        let new_stock = apply_stock_delta(current_stock, delta).ok_or_else(|| {
            AppError::InvalidStateTransition(format!(
                "Transaction would leave negative stock (on hand {}, change {})",
                current_stock, delta
            ))
        })?;

        sqlx::query("UPDATE materials SET current_stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(input.material_id)
            .bind(new_stock)
            .execute(&mut *tx)
            .await?;

        let unit_cost = input.unit_cost.unwrap_or(standard_cost);
        let transaction = sqlx::query_as::<_, InventoryTransaction>(
            r#"
            INSERT INTO inventory_transactions (
                material_id, user_id, transaction_type, quantity, unit_cost, total_cost,
                reference, remarks
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(input.material_id)
        .bind(user_id)
        .bind(input.transaction_type.as_str())
        .bind(delta)
        .bind(unit_cost)
        .bind((delta.abs() * unit_cost).round_dp(2))
        .bind(&input.reference)
        .bind(&input.remarks)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            material_id = %input.material_id,
            transaction_type = %input.transaction_type,
            quantity = %delta,
            "Inventory transaction recorded"
        );
        Ok(transaction)
    }

    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> AppResult<Vec<InventoryTransaction>> {
        let transactions = sqlx::query_as::<_, InventoryTransaction>(
            r#"
            SELECT * FROM inventory_transactions
            WHERE ($1::uuid IS NULL OR material_id = $1)
              AND ($2::text IS NULL OR transaction_type = $2)
              AND ($3::date IS NULL OR occurred_at::date >= $3)
              AND ($4::date IS NULL OR occurred_at::date <= $4)
            ORDER BY occurred_at DESC
            LIMIT $5
            "#,
        )
        .bind(filter.material_id)
        .bind(&filter.transaction_type)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.limit.unwrap_or(100).clamp(1, 1000))
        .fetch_all(&self.db)
        .await?;
        Ok(transactions)
    }

    // ========================================================================
    // Daily output
    // ========================================================================

    /// Record a day's output of a stocked product.
    ///
    /// Each date holds one row and re-recording it overwrites the quantity.
    /// Only the difference moves stock: a higher figure deducts materials and
    /// adds finished units, a lower one returns both. Everything runs in one
    /// transaction.
    pub async fn record_daily_output(
        &self,
        user_id: Uuid,
        input: RecordDailyOutputInput,
    ) -> AppResult<DailyOutputResult> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        let (product_id, product_stock) = match input.product_id {
            Some(id) => sqlx::query_as::<_, (Uuid, i32)>(
                "SELECT id, stock FROM products WHERE id = $1 FOR UPDATE",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?,
            None => sqlx::query_as::<_, (Uuid, i32)>(
                r#"
                SELECT id, stock FROM products
                WHERE product_type = $1
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE
                "#,
            )
            .bind(ProductType::Alkansya.as_str())
            .fetch_optional(&mut *tx)
            .await?,
        }
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let previous = sqlx::query_scalar::<_, i32>(
            "SELECT quantity_produced FROM daily_outputs WHERE product_id = $1 AND output_date = $2 FOR UPDATE",
        )
        .bind(product_id)
        .bind(input.output_date)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(0);

        let revision = OutputRevision::between(previous, input.quantity_produced);
        if apply_stock_delta(Decimal::from(product_stock), Decimal::from(revision.stock_delta())).is_none() {
            return Err(AppError::Validation {
                field: "quantity_produced".to_string(),
                message: format!(
                    "Only {} finished unit(s) remain in stock; output for {} cannot drop from {} to {}",
                    product_stock, input.output_date, previous, input.quantity_produced
                ),
            });
        }

        let reference = format!("Alkansya Daily Output - {}", input.output_date);
        let ctx = DeductionContext {
            transaction_type: TransactionType::ProductionUsage,
            reference: reference.clone(),
            order_id: None,
            production_id: None,
            user_id: Some(user_id),
        };
        let materials_used = match revision {
            OutputRevision::Raised(n) => Self::deduct_bom(&mut tx, product_id, n, &ctx).await?,
            OutputRevision::Lowered(n) => Self::return_bom(&mut tx, product_id, n, &ctx).await?,
            OutputRevision::Unchanged => Vec::new(),
        };
        let total_cost: Decimal = materials_used.iter().map(|m| m.total_cost).sum();

        let output = sqlx::query_as::<_, DailyOutput>(
            r#"
            INSERT INTO daily_outputs (
                product_id, output_date, quantity_produced, produced_by, notes,
                materials_used, total_cost
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (product_id, output_date) DO UPDATE SET
                quantity_produced = EXCLUDED.quantity_produced,
                produced_by = EXCLUDED.produced_by,
                notes = COALESCE(EXCLUDED.notes, daily_outputs.notes),
                materials_used = daily_outputs.materials_used || EXCLUDED.materials_used,
                total_cost = daily_outputs.total_cost + EXCLUDED.total_cost,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(input.output_date)
        .bind(input.quantity_produced)
        .bind(&input.produced_by)
        .bind(&input.notes)
        .bind(serde_json::to_value(&materials_used).map_err(anyhow::Error::from)?)
        .bind(total_cost)
        .fetch_one(&mut *tx)
        .await?;

        let delta = revision.stock_delta();
        if delta != 0 {
            sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
                .bind(product_id)
                .bind(delta)
                .execute(&mut *tx)
                .await?;

            let transaction_type = if delta > 0 {
                TransactionType::ProductionOutput
            } else {
                TransactionType::Adjustment
            };
            sqlx::query(
                r#"
                INSERT INTO inventory_transactions (
                    product_id, user_id, transaction_type, quantity, total_cost, reference, remarks
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(product_id)
            .bind(user_id)
            .bind(transaction_type.as_str())
            .bind(Decimal::from(delta))
            .bind(total_cost.abs())
            .bind(&reference)
            .bind(format!("Output revised from {} to {}", previous, input.quantity_produced))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            product_id = %product_id,
            date = %input.output_date,
            previous,
            recorded = input.quantity_produced,
            total_cost = %total_cost,
            "Daily output recorded"
        );

        Ok(DailyOutputResult {
            output,
            materials_used,
            total_cost,
        })
    }

    pub async fn list_daily_outputs(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> AppResult<Vec<DailyOutput>> {
        let outputs = sqlx::query_as::<_, DailyOutput>(
            r#"
            SELECT * FROM daily_outputs
            WHERE ($1::date IS NULL OR output_date >= $1)
              AND ($2::date IS NULL OR output_date <= $2)
            ORDER BY output_date DESC
            "#,
        )
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&self.db)
        .await?;
        Ok(outputs)
    }
}
