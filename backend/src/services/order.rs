//! Order service: checkout, acceptance workflow and status updates

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::inventory::{DeductionContext, InventoryService};
use crate::services::product::Product;
use crate::services::production::ProductionService;
use crate::services::tracking::{OrderTracking, TrackingService};
use shared::{
    estimated_completion, find_shortages, order_reference, order_total, validate_order_quantity,
    AcceptanceStatus, BomLine, OrderStatus, PaymentMethod, PaymentStatus, PricedLine, Priority,
    StockShortage, TrackingStatus, TrackingType, TransactionType, STAGE_CATALOG,
    STAGE_READY_FOR_DELIVERY,
};

#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_price: Decimal,
    pub status: String,
    pub acceptance_status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub transaction_ref: Option<String>,
    pub shipping_address: Option<String>,
    pub contact_phone: Option<String>,
    pub checkout_date: Option<DateTime<Utc>>,
    pub accepted_by: Option<Uuid>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn status(&self) -> AppResult<OrderStatus> {
        OrderStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown order status '{}'", self.status)))
    }

    pub fn acceptance(&self) -> Option<AcceptanceStatus> {
        AcceptanceStatus::from_str(&self.acceptance_status)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub tracking: Vec<OrderTracking>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutInput {
    #[validate(length(min = 1, message = "Cart is empty"))]
    pub items: Vec<CheckoutItem>,
    pub payment_method: Option<PaymentMethod>,
    #[validate(length(min = 1, max = 1000))]
    pub shipping_address: String,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AcceptOrderInput {
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectOrderInput {
    #[validate(length(min = 1, max = 1000))]
    pub rejection_reason: String,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusInput {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, Default)]
pub struct OrderFilter {
    pub status: Option<String>,
    pub acceptance_status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrderStatistics {
    pub pending: i64,
    pub accepted_today: i64,
    pub accepted_this_week: i64,
    pub rejected: i64,
    pub total_orders: i64,
    pub average_acceptance_hours: Option<Decimal>,
    pub paid_revenue: Decimal,
}

impl OrderService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Order> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    async fn items(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT i.id, i.order_id, i.product_id, p.name AS product_name, i.quantity, i.price
            FROM order_items i
            JOIN products p ON p.id = i.product_id
            WHERE i.order_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(items)
    }

    async fn bom_lines(conn: &mut PgConnection, product_id: Uuid) -> AppResult<Vec<BomLine>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String, Decimal, Decimal, Decimal)>(
            r#"
            SELECT m.id, m.material_name, m.material_code, b.quantity_per_product,
                   m.current_stock, m.standard_cost
            FROM bill_of_materials b
            JOIN materials m ON m.id = b.material_id
            WHERE b.product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(material_id, material_name, material_code, per_unit, stock, cost)| BomLine {
                material_id,
                material_name,
                material_code,
                quantity_per_product: per_unit,
                current_stock: stock,
                unit_cost: cost,
            })
            .collect())
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    /// Place an order. Stocked products are taken from finished-goods stock
    /// immediately; made-to-order products only get a material pre-check,
    /// materials are consumed when the order is accepted.
    pub async fn checkout(&self, user_id: Uuid, input: CheckoutInput) -> AppResult<OrderDetail> {
        input.validate()?;
        if let Some(phone) = input.contact_phone.as_deref() {
            shared::validate_phone(phone).map_err(|msg| AppError::Validation {
                field: "contact_phone".to_string(),
                message: msg.to_string(),
            })?;
        }

        let now = Utc::now();
        let payment_method = input.payment_method.unwrap_or_default();
        let mut tx = self.db.begin().await?;

        let mut lines = Vec::with_capacity(input.items.len());
        let mut products = Vec::with_capacity(input.items.len());
        let mut shortages: Vec<StockShortage> = Vec::new();

        for item in &input.items {
            validate_order_quantity(item.quantity).map_err(|msg| AppError::Validation {
                field: "quantity".to_string(),
                message: msg.to_string(),
            })?;

            let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
                .bind(item.product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Product {}", item.product_id)))?;

            if product.is_made_to_order() {
                let bom = Self::bom_lines(&mut tx, product.id).await?;
                shortages.extend(find_shortages(&bom, item.quantity));
            } else if product.stock < item.quantity {
                shortages.push(StockShortage {
                    material: product.name.clone(),
                    code: product.product_type.clone(),
                    required: Decimal::from(item.quantity),
                    available: Decimal::from(product.stock),
                    shortage: Decimal::from(item.quantity - product.stock),
                });
            }

            lines.push(PricedLine {
                product_id: product.id,
                quantity: item.quantity,
                unit_price: product.price,
            });
            products.push(product);
        }

        if !shortages.is_empty() {
            tracing::warn!(user_id = %user_id, shortages = shortages.len(), "Checkout rejected for stock");
            return Err(AppError::StockShortages(shortages));
        }

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (
                user_id, total_price, status, acceptance_status, payment_status, payment_method,
                shipping_address, contact_phone, checkout_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(order_total(&lines))
        .bind(OrderStatus::Pending.as_str())
        .bind(AcceptanceStatus::Pending.as_str())
        .bind(payment_method.initial_payment_status().as_str())
        .bind(payment_method.as_str())
        .bind(&input.shipping_address)
        .bind(&input.contact_phone)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if payment_method != PaymentMethod::Cod {
            sqlx::query("UPDATE orders SET transaction_ref = $2 WHERE id = $1")
                .bind(order.id)
                .bind(order_reference(order.id, now))
                .execute(&mut *tx)
                .await?;
        }

        for (line, product) in lines.iter().zip(products.iter()) {
            sqlx::query("INSERT INTO order_items (order_id, product_id, quantity, price) VALUES ($1, $2, $3, $4)")
                .bind(order.id)
                .bind(line.product_id)
                .bind(line.quantity)
                .bind(line.unit_price)
                .execute(&mut *tx)
                .await?;

            let product_type = product.product_type();
            let tracking_type = TrackingType::for_product(product_type);

            if !product.is_made_to_order() {
                Self::move_product_stock(
                    &mut tx,
                    product,
                    -line.quantity,
                    TransactionType::Consumption,
                    order.id,
                    user_id,
                    "Checkout",
                )
                .await?;
            }

            let (stage, eta) = if product_type.requires_tracking() {
                (STAGE_CATALOG[0].name, estimated_completion(now))
            } else {
                (STAGE_READY_FOR_DELIVERY, now + Duration::days(1))
            };

            sqlx::query(
                r#"
                INSERT INTO order_trackings (
                    order_id, product_id, tracking_type, current_stage, status,
                    estimated_start_date, estimated_completion_date
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (order_id, product_id) DO NOTHING
                "#,
            )
            .bind(order.id)
            .bind(product.id)
            .bind(tracking_type.as_str())
            .bind(stage)
            .bind(TrackingStatus::Pending.as_str())
            .bind(now)
            .bind(eta)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            order_id = %order.id,
            user_id = %user_id,
            payment_method = payment_method.as_str(),
            "Order placed"
        );

        self.load_detail(order.id).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn move_product_stock(
        conn: &mut PgConnection,
        product: &Product,
        delta: i32,
        transaction_type: TransactionType,
        order_id: Uuid,
        user_id: Uuid,
        label: &str,
    ) -> AppResult<()> {
        sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
            .bind(product.id)
            .bind(delta)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO inventory_transactions (
                product_id, order_id, user_id, transaction_type, quantity, unit_cost, total_cost,
                reference, remarks
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(product.id)
        .bind(order_id)
        .bind(user_id)
        .bind(transaction_type.as_str())
        .bind(Decimal::from(delta))
        .bind(product.price)
        .bind(product.price * Decimal::from(delta.abs()))
        .bind(format!("Order {}", order_id))
        .bind(format!("{} - {}", label, product.name))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Put stocked goods back on the shelf for an order that will not ship
    async fn restock(conn: &mut PgConnection, order: &Order, user_id: Uuid, label: &str) -> AppResult<()> {
        let items = Self::items(conn, order.id).await?;
        for item in items {
            let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
                .bind(item.product_id)
                .fetch_one(&mut *conn)
                .await?;
            if !product.is_made_to_order() {
                Self::move_product_stock(
                    conn,
                    &product,
                    item.quantity,
                    TransactionType::Return,
                    order.id,
                    user_id,
                    label,
                )
                .await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    async fn load_detail(&self, order_id: Uuid) -> AppResult<OrderDetail> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let mut conn = self.db.acquire().await?;
        let items = Self::items(&mut conn, order_id).await?;
        let tracking = sqlx::query_as::<_, OrderTracking>(
            "SELECT * FROM order_trackings WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(OrderDetail { order, items, tracking })
    }

    pub async fn get_order(&self, user: &AuthUser, order_id: Uuid) -> AppResult<OrderDetail> {
        let detail = self.load_detail(order_id).await?;
        if detail.order.user_id != user.user_id && !user.is_staff() {
            return Err(AppError::Forbidden("Order belongs to another customer".to_string()));
        }
        Ok(detail)
    }

    pub async fn my_orders(&self, user_id: Uuid) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(orders)
    }

    pub async fn list_orders(&self, filter: OrderFilter) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR acceptance_status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&filter.status)
        .bind(&filter.acceptance_status)
        .bind(filter.limit.unwrap_or(50).clamp(1, 500))
        .bind(filter.offset.unwrap_or(0).max(0))
        .fetch_all(&self.db)
        .await?;
        Ok(orders)
    }

    pub async fn pending_orders(&self) -> AppResult<Vec<OrderDetail>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM orders WHERE acceptance_status = $1 ORDER BY checkout_date",
        )
        .bind(AcceptanceStatus::Pending.as_str())
        .fetch_all(&self.db)
        .await?;

        let mut details = Vec::with_capacity(ids.len());
        for id in ids {
            details.push(self.load_detail(id).await?);
        }
        Ok(details)
    }

    pub async fn statistics(&self) -> AppResult<OrderStatistics> {
        let (pending, accepted_today, accepted_this_week, rejected, total_orders) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE acceptance_status = 'pending'),
                    COUNT(*) FILTER (WHERE acceptance_status = 'accepted' AND accepted_at::date = CURRENT_DATE),
                    COUNT(*) FILTER (WHERE acceptance_status = 'accepted' AND accepted_at >= date_trunc('week', NOW())),
                    COUNT(*) FILTER (WHERE acceptance_status = 'rejected'),
                    COUNT(*)
                FROM orders
                "#,
            )
            .fetch_one(&self.db)
            .await?;

        let average_acceptance_hours = sqlx::query_scalar::<_, Option<Decimal>>(
            r#"
            SELECT ROUND(AVG(EXTRACT(EPOCH FROM (accepted_at - checkout_date)) / 3600)::numeric, 1)
            FROM orders
            WHERE acceptance_status = 'accepted' AND accepted_at IS NOT NULL AND checkout_date IS NOT NULL
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let paid_revenue = sqlx::query_scalar::<_, Option<Decimal>>(
            "SELECT SUM(total_price) FROM orders WHERE payment_status = $1",
        )
        .bind(PaymentStatus::Paid.as_str())
        .fetch_one(&self.db)
        .await?
        .unwrap_or(Decimal::ZERO);

        Ok(OrderStatistics {
            pending,
            accepted_today,
            accepted_this_week,
            rejected,
            total_orders,
            average_acceptance_hours,
            paid_revenue,
        })
    }

    // ========================================================================
    // Acceptance workflow
    // ========================================================================

    /// Accept a pending order: consume materials for made-to-order lines and
    /// open one production per line, all in a single transaction.
    pub async fn accept_order(
        &self,
        staff: &AuthUser,
        order_id: Uuid,
        input: AcceptOrderInput,
    ) -> AppResult<OrderDetail> {
        staff.require_staff()?;
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let order = Self::lock_order(&mut tx, order_id).await?;
        if order.acceptance() != Some(AcceptanceStatus::Pending) {
            return Err(AppError::InvalidStateTransition(format!(
                "Order has already been {}",
                order.acceptance_status
            )));
        }
        if order.status()? == OrderStatus::Cancelled {
            return Err(AppError::InvalidStateTransition("Order was cancelled".to_string()));
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET acceptance_status = $2, status = $3, accepted_by = $4, accepted_at = $5,
                admin_notes = COALESCE($6, admin_notes), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(AcceptanceStatus::Accepted.as_str())
        .bind(OrderStatus::Processing.as_str())
        .bind(staff.user_id)
        .bind(now)
        .bind(&input.admin_notes)
        .execute(&mut *tx)
        .await?;

        let items = Self::items(&mut tx, order_id).await?;
        for item in &items {
            let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
                .bind(item.product_id)
                .fetch_one(&mut *tx)
                .await?;

            if product.is_made_to_order() {
                let ctx = DeductionContext {
                    transaction_type: TransactionType::OrderAcceptance,
                    reference: format!("Order {} acceptance", order_id),
                    order_id: Some(order_id),
                    production_id: None,
                    user_id: Some(staff.user_id),
                };
                InventoryService::deduct_bom(&mut tx, product.id, item.quantity, &ctx).await?;
            }

            let production = ProductionService::create_in_tx(
                &mut tx,
                &product,
                Some(order_id),
                Some(staff.user_id),
                item.quantity,
                Priority::default(),
                None,
                now,
            )
            .await?;
            TrackingService::sync_production(&mut tx, production.id).await?;
        }

        tx.commit().await?;
        tracing::info!(order_id = %order_id, staff = %staff.user_id, items = items.len(), "Order accepted");

        self.load_detail(order_id).await
    }

    pub async fn reject_order(
        &self,
        staff: &AuthUser,
        order_id: Uuid,
        input: RejectOrderInput,
    ) -> AppResult<OrderDetail> {
        staff.require_staff()?;
        input.validate()?;
        if input.rejection_reason.trim().is_empty() {
            return Err(AppError::Validation {
                field: "rejection_reason".to_string(),
                message: "A rejection reason is required".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;
        let order = Self::lock_order(&mut tx, order_id).await?;
        if order.acceptance() != Some(AcceptanceStatus::Pending) {
            return Err(AppError::InvalidStateTransition(format!(
                "Order has already been {}",
                order.acceptance_status
            )));
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET acceptance_status = $2, status = $3, rejected_by = $4, rejected_at = NOW(),
                rejection_reason = $5, admin_notes = COALESCE($6, admin_notes), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(AcceptanceStatus::Rejected.as_str())
        .bind(OrderStatus::Cancelled.as_str())
        .bind(staff.user_id)
        .bind(input.rejection_reason.trim())
        .bind(&input.admin_notes)
        .execute(&mut *tx)
        .await?;

        Self::restock(&mut tx, &order, staff.user_id, "Order rejected").await?;
        tx.commit().await?;

        tracing::info!(order_id = %order_id, staff = %staff.user_id, "Order rejected");
        self.load_detail(order_id).await
    }

    /// Customer cancellation, only while the order awaits acceptance
    pub async fn cancel_order(&self, user: &AuthUser, order_id: Uuid) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;
        let order = Self::lock_order(&mut tx, order_id).await?;

        if order.user_id != user.user_id && !user.is_staff() {
            return Err(AppError::Forbidden("Order belongs to another customer".to_string()));
        }
        if order.acceptance() != Some(AcceptanceStatus::Pending)
            || !order.status()?.can_transition_to(OrderStatus::Cancelled)
        {
            return Err(AppError::InvalidStateTransition(
                "Only orders awaiting acceptance can be cancelled".to_string(),
            ));
        }

        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(OrderStatus::Cancelled.as_str())
            .execute(&mut *tx)
            .await?;

        Self::restock(&mut tx, &order, user.user_id, "Order cancelled").await?;
        tx.commit().await?;

        tracing::info!(order_id = %order_id, "Order cancelled");
        self.load_detail(order_id).await
    }

    /// Staff status change; orders only move forward
    pub async fn update_status(
        &self,
        staff: &AuthUser,
        order_id: Uuid,
        input: UpdateOrderStatusInput,
    ) -> AppResult<OrderDetail> {
        staff.require_staff()?;
        let mut tx = self.db.begin().await?;
        let order = Self::lock_order(&mut tx, order_id).await?;
        let current = order.status()?;

        if !current.can_transition_to(input.status) {
            return Err(AppError::InvalidStateTransition(format!(
                "Cannot change order status from {} to {}",
                current, input.status
            )));
        }

        // cash on delivery settles when the goods are handed over
        let settle_cod = matches!(input.status, OrderStatus::Delivered | OrderStatus::Completed)
            && PaymentStatus::from_str(&order.payment_status) == Some(PaymentStatus::CodPending);

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2,
                payment_status = CASE WHEN $3 THEN $4 ELSE payment_status END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(input.status.as_str())
        .bind(settle_cod)
        .bind(PaymentStatus::Paid.as_str())
        .execute(&mut *tx)
        .await?;

        if input.status == OrderStatus::Cancelled {
            Self::restock(&mut tx, &order, staff.user_id, "Order cancelled").await?;
        }
        tx.commit().await?;

        tracing::info!(order_id = %order_id, from = %current, to = %input.status, "Order status updated");
        self.load_detail(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkout_rejects_empty_cart() {
        let input: CheckoutInput = serde_json::from_value(json!({
            "items": [],
            "shipping_address": "12 Mabini St, Quezon City"
        }))
        .unwrap();
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("items"));
    }

    #[test]
    fn test_checkout_accepts_filled_cart() {
        let input: CheckoutInput = serde_json::from_value(json!({
            "items": [{ "product_id": Uuid::new_v4(), "quantity": 2 }],
            "shipping_address": "12 Mabini St, Quezon City"
        }))
        .unwrap();
        assert!(input.validate().is_ok());
    }
}
