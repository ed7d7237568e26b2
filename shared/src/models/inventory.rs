//! Inventory models: ledger transaction types, BOM requirement planning and
//! replenishment forecasting

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;
use uuid::Uuid;

/// Inventory ledger transaction types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Purchase,
    Consumption,
    Adjustment,
    Return,
    ProductionUsage,
    ProductionOutput,
    OrderAcceptance,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "PURCHASE",
            TransactionType::Consumption => "CONSUMPTION",
            TransactionType::Adjustment => "ADJUSTMENT",
            TransactionType::Return => "RETURN",
            TransactionType::ProductionUsage => "PRODUCTION_USAGE",
            TransactionType::ProductionOutput => "PRODUCTION_OUTPUT",
            TransactionType::OrderAcceptance => "ORDER_ACCEPTANCE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PURCHASE" => Some(TransactionType::Purchase),
            "CONSUMPTION" => Some(TransactionType::Consumption),
            "ADJUSTMENT" => Some(TransactionType::Adjustment),
            "RETURN" => Some(TransactionType::Return),
            "PRODUCTION_USAGE" => Some(TransactionType::ProductionUsage),
            "PRODUCTION_OUTPUT" => Some(TransactionType::ProductionOutput),
            "ORDER_ACCEPTANCE" => Some(TransactionType::OrderAcceptance),
            _ => None,
        }
    }

    /// Types that may be posted by hand; the rest are system generated
    pub fn is_manual(&self) -> bool {
        matches!(
            self,
            TransactionType::Purchase
                | TransactionType::Consumption
                | TransactionType::Adjustment
                | TransactionType::Return
        )
    }

    /// Types counted as material consumption for forecasting
    pub fn is_consumption(&self) -> bool {
        matches!(
            self,
            TransactionType::Consumption
                | TransactionType::ProductionUsage
                | TransactionType::OrderAcceptance
        )
    }

    /// Apply the conventional sign for this type to an unsigned quantity.
    /// Adjustments keep the caller's sign.
    pub fn signed_quantity(&self, quantity: Decimal) -> Decimal {
        match self {
            TransactionType::Purchase | TransactionType::Return | TransactionType::ProductionOutput => {
                quantity.abs()
            }
            TransactionType::Consumption
            | TransactionType::ProductionUsage
            | TransactionType::OrderAcceptance => -quantity.abs(),
            TransactionType::Adjustment => quantity,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product category; made-to-order products consume materials at acceptance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Stocked,
    MadeToOrder,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Stocked => "stocked",
            ProductCategory::MadeToOrder => "made_to_order",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stocked" => Some(ProductCategory::Stocked),
            "made_to_order" => Some(ProductCategory::MadeToOrder),
            _ => None,
        }
    }
}

// ============================================================================
// BOM requirement planning
// ============================================================================

/// One BOM row joined with the material's current stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomLine {
    pub material_id: Uuid,
    pub material_name: String,
    pub material_code: String,
    pub quantity_per_product: Decimal,
    pub current_stock: Decimal,
    pub unit_cost: Decimal,
}

/// Material consumed by a batch, with its cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_id: Uuid,
    pub material_name: String,
    pub material_code: String,
    pub quantity_used: Decimal,
    pub remaining_stock: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
}

/// A material that cannot cover a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("Insufficient stock for {material} ({code}): required {required}, available {available}")]
pub struct StockShortage {
    pub material: String,
    pub code: String,
    pub required: Decimal,
    pub available: Decimal,
    pub shortage: Decimal,
}

fn requirement_for(line: &BomLine, quantity: i32) -> Decimal {
    line.quantity_per_product * Decimal::from(quantity)
}

/// Every material whose stock cannot cover `quantity` units
pub fn find_shortages(lines: &[BomLine], quantity: i32) -> Vec<StockShortage> {
    lines
        .iter()
        .filter_map(|line| {
            let required = requirement_for(line, quantity);
            (line.current_stock < required).then(|| StockShortage {
                material: line.material_name.clone(),
                code: line.material_code.clone(),
                required,
                available: line.current_stock,
                shortage: required - line.current_stock,
            })
        })
        .collect()
}

/// Plan the deduction for producing `quantity` units.
///
/// All-or-nothing: the first material short of stock aborts the plan and
/// nothing is returned to apply.
pub fn plan_bom_deduction(
    lines: &[BomLine],
    quantity: i32,
) -> Result<Vec<MaterialRequirement>, StockShortage> {
    if let Some(shortage) = find_shortages(lines, quantity).into_iter().next() {
        return Err(shortage);
    }

    Ok(lines
        .iter()
        .map(|line| {
            let required = requirement_for(line, quantity);
            MaterialRequirement {
                material_id: line.material_id,
                material_name: line.material_name.clone(),
                material_code: line.material_code.clone(),
                quantity_used: required,
                remaining_stock: line.current_stock - required,
                unit_cost: line.unit_cost,
                total_cost: (required * line.unit_cost).round_dp(2),
            }
        })
        .collect())
}

/// Materials handed back when `quantity` units of recorded output are
/// withdrawn. Quantities and costs are negative, mirroring a deduction.
pub fn plan_bom_return(lines: &[BomLine], quantity: i32) -> Vec<MaterialRequirement> {
    lines
        .iter()
        .map(|line| {
            let returned = requirement_for(line, quantity);
            MaterialRequirement {
                material_id: line.material_id,
                material_name: line.material_name.clone(),
                material_code: line.material_code.clone(),
                quantity_used: -returned,
                remaining_stock: line.current_stock + returned,
                unit_cost: line.unit_cost,
                total_cost: -(returned * line.unit_cost).round_dp(2),
            }
        })
        .collect()
}

/// Change in produced units when a day's output is recorded again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputRevision {
    Unchanged,
    Raised(i32),
    Lowered(i32),
}

impl OutputRevision {
    pub fn between(previous: i32, recorded: i32) -> Self {
        match recorded.cmp(&previous) {
            Ordering::Greater => OutputRevision::Raised(recorded - previous),
            Ordering::Less => OutputRevision::Lowered(previous - recorded),
            Ordering::Equal => OutputRevision::Unchanged,
        }
    }

    /// Signed change to finished stock
    pub fn stock_delta(&self) -> i32 {
        match *self {
            OutputRevision::Unchanged => 0,
            OutputRevision::Raised(n) => n,
            OutputRevision::Lowered(n) => -n,
        }
    }
}

/// Apply a signed delta to a stock level, refusing to go negative
pub fn apply_stock_delta(current: Decimal, delta: Decimal) -> Option<Decimal> {
    let next = current + delta;
    (next >= Decimal::ZERO).then_some(next)
}

// ============================================================================
// Replenishment forecasting
// ============================================================================

/// Stock levels and window consumption for one material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialUsage {
    pub material_code: String,
    pub material_name: String,
    pub unit_of_measure: String,
    pub on_hand: Decimal,
    pub critical_stock: Decimal,
    pub reorder_level: Decimal,
    pub max_level: Option<Decimal>,
    pub lead_time_days: i32,
    pub consumed_in_window: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialForecast {
    pub material_code: String,
    pub material_name: String,
    pub on_hand: Decimal,
    pub avg_daily_usage: Decimal,
    pub days_to_depletion: Option<Decimal>,
    pub inventory_turnover_days: Option<Decimal>,
    pub reorder_point: Decimal,
    pub reorder_on_or_before: Option<NaiveDate>,
    pub suggested_order_qty: Decimal,
}

/// Forecast depletion and the replenishment point for a material.
///
/// Average usage is window consumption over window days; the reorder
/// point covers lead-time usage on top of the critical stock.
pub fn forecast_material(usage: &MaterialUsage, window_days: u32, today: NaiveDate) -> MaterialForecast {
    let window = Decimal::from(window_days.max(1));
    let avg_daily_usage = (usage.consumed_in_window.abs() / window).round_dp(3);
    let reorder_point =
        (avg_daily_usage * Decimal::from(usage.lead_time_days.max(0)) + usage.critical_stock).round_dp(2);

    let days_to_depletion = (avg_daily_usage > Decimal::ZERO)
        .then(|| (usage.on_hand / avg_daily_usage).round_dp(1));

    let inventory_turnover_days = (usage.consumed_in_window.abs() > Decimal::ZERO).then(|| {
        (usage.on_hand * window / usage.consumed_in_window.abs()).round_dp(1)
    });

    let reorder_on_or_before = if usage.on_hand <= reorder_point {
        Some(today)
    } else if avg_daily_usage > Decimal::ZERO {
        ((usage.on_hand - reorder_point) / avg_daily_usage)
            .floor()
            .to_i64()
            .map(|days| today + Duration::days(days))
    } else {
        None
    };

    let suggested_order_qty = if usage.on_hand <= reorder_point {
        let target = usage
            .max_level
            .filter(|m| *m > Decimal::ZERO)
            .unwrap_or(reorder_point * Decimal::TWO);
        (target - usage.on_hand).max(Decimal::ZERO).round_dp(2)
    } else {
        Decimal::ZERO
    };

    MaterialForecast {
        material_code: usage.material_code.clone(),
        material_name: usage.material_name.clone(),
        on_hand: usage.on_hand,
        avg_daily_usage,
        days_to_depletion,
        inventory_turnover_days,
        reorder_point,
        reorder_on_or_before,
        suggested_order_qty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(code: &str, per_unit: &str, stock: &str) -> BomLine {
        BomLine {
            material_id: Uuid::new_v4(),
            material_name: format!("Material {code}"),
            material_code: code.to_string(),
            quantity_per_product: dec(per_unit),
            current_stock: dec(stock),
            unit_cost: dec("2.50"),
        }
    }

    #[test]
    fn test_plan_deduction_success() {
        let lines = vec![line("PLY", "0.5", "100"), line("GLUE", "0.02", "5")];
        let plan = plan_bom_deduction(&lines, 50).unwrap();
        assert_eq!(plan[0].quantity_used, dec("25"));
        assert_eq!(plan[0].remaining_stock, dec("75"));
        assert_eq!(plan[1].quantity_used, dec("1"));
        assert_eq!(plan[0].total_cost, dec("62.50"));
    }

    #[test]
    fn test_plan_deduction_reports_shortage() {
        let lines = vec![line("PLY", "0.5", "100"), line("GLUE", "0.2", "5")];
        let err = plan_bom_deduction(&lines, 50).unwrap_err();
        assert_eq!(err.code, "GLUE");
        assert_eq!(err.required, dec("10"));
        assert_eq!(err.available, dec("5"));
        assert_eq!(err.shortage, dec("5"));
    }

    #[test]
    fn test_zero_quantity_deducts_nothing() {
        let lines = vec![line("PLY", "0.5", "0")];
        let plan = plan_bom_deduction(&lines, 0).unwrap();
        assert_eq!(plan[0].quantity_used, Decimal::ZERO);
    }

    #[test]
    fn test_signed_quantity() {
        assert_eq!(TransactionType::Purchase.signed_quantity(dec("-3")), dec("3"));
        assert_eq!(TransactionType::Consumption.signed_quantity(dec("3")), dec("-3"));
        assert_eq!(TransactionType::Adjustment.signed_quantity(dec("-3")), dec("-3"));
    }

    #[test]
    fn test_apply_stock_delta_rejects_negative() {
        assert_eq!(apply_stock_delta(dec("5"), dec("-5")), Some(Decimal::ZERO));
        assert_eq!(apply_stock_delta(dec("5"), dec("-6")), None);
    }

    #[test]
    fn test_forecast_reorder_now() {
        let usage = MaterialUsage {
            material_code: "PLY".into(),
            material_name: "Plywood".into(),
            unit_of_measure: "sheet".into(),
            on_hand: dec("20"),
            critical_stock: dec("10"),
            reorder_level: dec("15"),
            max_level: Some(dec("100")),
            lead_time_days: 5,
            consumed_in_window: dec("60"),
        };
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let f = forecast_material(&usage, 30, today);
        assert_eq!(f.avg_daily_usage, dec("2"));
        assert_eq!(f.reorder_point, dec("20"));
        assert_eq!(f.reorder_on_or_before, Some(today));
        assert_eq!(f.suggested_order_qty, dec("80"));
        assert_eq!(f.days_to_depletion, Some(dec("10")));
    }
}
