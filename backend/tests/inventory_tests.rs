//! Inventory management tests
//!
//! Tests for raw material handling including:
//! - BOM deduction planning (all-or-nothing)
//! - Shortage reporting
//! - Signed ledger quantities and stock floor
//! - Re-recording a day's output
//! - Replenishment forecasting

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    apply_stock_delta, find_shortages, forecast_material, plan_bom_deduction, plan_bom_return,
    BomLine, MaterialUsage, OutputRevision, TransactionType,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn line(code: &str, per_unit: &str, stock: &str, cost: &str) -> BomLine {
    BomLine {
        material_id: Uuid::new_v4(),
        material_name: format!("Material {}", code),
        material_code: code.to_string(),
        quantity_per_product: dec(per_unit),
        current_stock: dec(stock),
        unit_cost: dec(cost),
    }
}

/// BOM of a dining table
fn table_bom() -> Vec<BomLine> {
    vec![
        line("HW-MAHOG-2x4", "4", "100", "350.00"),
        line("PLY-18MM", "1.5", "20", "1200.00"),
        line("WS-1.5", "24", "500", "1.50"),
    ]
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_plan_scales_by_quantity() {
        let plan = plan_bom_deduction(&table_bom(), 5).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].quantity_used, dec("20"));
        assert_eq!(plan[0].remaining_stock, dec("80"));
        assert_eq!(plan[0].total_cost, dec("7000.00"));
        assert_eq!(plan[1].quantity_used, dec("7.5"));
        assert_eq!(plan[2].quantity_used, dec("120"));
    }

    #[test]
    fn test_plan_allows_exact_stock() {
        let bom = vec![line("ALK-CLAY", "2", "10", "15.00")];
        let plan = plan_bom_deduction(&bom, 5).unwrap();
        assert_eq!(plan[0].remaining_stock, Decimal::ZERO);
        assert_eq!(plan[0].total_cost, dec("150.00"));
    }

    #[test]
    fn test_plan_aborts_on_first_shortage() {
        // 14 tables need 21 plywood sheets, only 20 on hand
        let shortage = plan_bom_deduction(&table_bom(), 14).unwrap_err();
        assert_eq!(shortage.code, "PLY-18MM");
        assert_eq!(shortage.required, dec("21"));
        assert_eq!(shortage.available, dec("20"));
        assert_eq!(shortage.shortage, dec("1"));
    }

    #[test]
    fn test_find_shortages_lists_every_material() {
        let shortages = find_shortages(&table_bom(), 30);
        let codes: Vec<&str> = shortages.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["HW-MAHOG-2x4", "PLY-18MM", "WS-1.5"]);
    }

    #[test]
    fn test_shortage_message_names_material() {
        let shortage = plan_bom_deduction(&table_bom(), 14).unwrap_err();
        let message = shortage.to_string();
        assert!(message.contains("PLY-18MM"));
        assert!(message.contains("required 21"));
    }

    #[test]
    fn test_consumption_types_are_negative() {
        let qty = dec("3");
        assert_eq!(TransactionType::Consumption.signed_quantity(qty), dec("-3"));
        assert_eq!(TransactionType::Purchase.signed_quantity(qty), dec("3"));
        assert!(TransactionType::Consumption.is_consumption());
        assert!(!TransactionType::Purchase.is_consumption());
    }

    #[test]
    fn test_stock_never_goes_negative() {
        assert_eq!(apply_stock_delta(dec("5"), dec("-5")), Some(Decimal::ZERO));
        assert_eq!(apply_stock_delta(dec("5"), dec("-5.01")), None);
        assert_eq!(apply_stock_delta(dec("5"), dec("2")), Some(dec("7")));
    }

    #[test]
    fn test_rerecorded_output_raises_by_difference() {
        let revision = OutputRevision::between(10, 14);
        assert_eq!(revision, OutputRevision::Raised(4));
        assert_eq!(revision.stock_delta(), 4);

        let bom = vec![line("ALK-CLAY", "2", "30", "15.00")];
        let plan = plan_bom_deduction(&bom, 4).unwrap();
        assert_eq!(plan[0].quantity_used, dec("8"));
        assert_eq!(plan[0].remaining_stock, dec("22"));
    }

    #[test]
    fn test_rerecorded_output_lowered_returns_materials() {
        let revision = OutputRevision::between(10, 6);
        assert_eq!(revision, OutputRevision::Lowered(4));
        assert_eq!(revision.stock_delta(), -4);

        let bom = vec![line("ALK-CLAY", "2", "10", "15.00")];
        let returns = plan_bom_return(&bom, 4);
        assert_eq!(returns[0].quantity_used, dec("-8"));
        assert_eq!(returns[0].remaining_stock, dec("18"));
        assert_eq!(returns[0].total_cost, dec("-120.00"));
    }

    #[test]
    fn test_rerecording_same_output_changes_nothing() {
        let revision = OutputRevision::between(7, 7);
        assert_eq!(revision, OutputRevision::Unchanged);
        assert_eq!(revision.stock_delta(), 0);
    }

    #[test]
    fn test_lowering_output_is_limited_by_finished_stock() {
        // 10 recorded, 8 already sold, so only 2 units can be withdrawn
        let finished = Decimal::from(2);
        let lowered = OutputRevision::between(10, 6).stock_delta();
        assert_eq!(apply_stock_delta(finished, Decimal::from(lowered)), None);
        let lowered = OutputRevision::between(10, 8).stock_delta();
        assert_eq!(apply_stock_delta(finished, Decimal::from(lowered)), Some(Decimal::ZERO));
    }

    #[test]
    fn test_forecast_reorder_point() {
        let usage = MaterialUsage {
            material_code: "PLY-18MM".to_string(),
            material_name: "Plywood 18mm".to_string(),
            unit_of_measure: "sheet".to_string(),
            on_hand: dec("100"),
            critical_stock: dec("10"),
            reorder_level: dec("20"),
            max_level: Some(dec("200")),
            lead_time_days: 7,
            consumed_in_window: dec("60"),
        };
        let today = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let forecast = forecast_material(&usage, 30, today);

        assert_eq!(forecast.avg_daily_usage, dec("2"));
        assert_eq!(forecast.reorder_point, dec("24"));
        assert_eq!(forecast.days_to_depletion, Some(dec("50")));
        assert_eq!(forecast.inventory_turnover_days, Some(dec("50")));
        assert_eq!(forecast.reorder_on_or_before, Some(today + chrono::Duration::days(38)));
    }

    #[test]
    fn test_forecast_without_usage() {
        let usage = MaterialUsage {
            material_code: "VARNISH".to_string(),
            material_name: "Varnish".to_string(),
            unit_of_measure: "liter".to_string(),
            on_hand: dec("40"),
            critical_stock: dec("5"),
            reorder_level: dec("10"),
            max_level: None,
            lead_time_days: 3,
            consumed_in_window: Decimal::ZERO,
        };
        let today = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let forecast = forecast_material(&usage, 30, today);

        assert_eq!(forecast.days_to_depletion, None);
        assert_eq!(forecast.reorder_on_or_before, None);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Per-unit quantities from 0.1 to 50.0
    fn per_unit_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=500i64).prop_map(|n| Decimal::new(n, 1))
    }

    /// Stock levels from 0 to 2000.0
    fn stock_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=20000i64).prop_map(|n| Decimal::new(n, 1))
    }

    fn bom_strategy() -> impl Strategy<Value = Vec<BomLine>> {
        prop::collection::vec((per_unit_strategy(), stock_strategy()), 1..8).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (per_unit, stock))| BomLine {
                    material_id: Uuid::new_v4(),
                    material_name: format!("Material {}", i),
                    material_code: format!("MAT-{}", i),
                    quantity_per_product: per_unit,
                    current_stock: stock,
                    unit_cost: Decimal::ONE,
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A plan exists exactly when no material is short
        #[test]
        fn prop_plan_is_all_or_nothing(bom in bom_strategy(), quantity in 1i32..=100) {
            let shortages = find_shortages(&bom, quantity);
            match plan_bom_deduction(&bom, quantity) {
                Ok(plan) => {
                    prop_assert!(shortages.is_empty());
                    prop_assert_eq!(plan.len(), bom.len());
                    for req in plan {
                        prop_assert!(req.remaining_stock >= Decimal::ZERO);
                    }
                }
                Err(first) => {
                    prop_assert!(!shortages.is_empty());
                    prop_assert_eq!(&first, &shortages[0]);
                }
            }
        }

        /// Remaining stock is on-hand stock minus the batch requirement
        #[test]
        fn prop_plan_conserves_stock(bom in bom_strategy(), quantity in 1i32..=20) {
            if let Ok(plan) = plan_bom_deduction(&bom, quantity) {
                for (req, line) in plan.iter().zip(bom.iter()) {
                    prop_assert_eq!(
                        req.remaining_stock + req.quantity_used,
                        line.current_stock
                    );
                    prop_assert_eq!(
                        req.quantity_used,
                        line.quantity_per_product * Decimal::from(quantity)
                    );
                }
            }
        }

        /// Recording a date twice leaves stock as if only the second figure was recorded
        #[test]
        fn prop_rerecorded_output_nets_to_latest(
            bom in bom_strategy(),
            first in 0i32..=20,
            second in 0i32..=20,
        ) {
            let after_first = match plan_bom_deduction(&bom, first) {
                Ok(plan) => plan,
                Err(_) => return Ok(()),
            };
            let restocked: Vec<BomLine> = bom
                .iter()
                .zip(after_first.iter())
                .map(|(line, req)| BomLine { current_stock: req.remaining_stock, ..line.clone() })
                .collect();

            let remaining: Vec<Decimal> = match OutputRevision::between(first, second) {
                OutputRevision::Raised(n) => match plan_bom_deduction(&restocked, n) {
                    Ok(plan) => plan.iter().map(|r| r.remaining_stock).collect(),
                    Err(_) => return Ok(()),
                },
                OutputRevision::Lowered(n) => plan_bom_return(&restocked, n)
                    .iter()
                    .map(|r| r.remaining_stock)
                    .collect(),
                OutputRevision::Unchanged => restocked.iter().map(|l| l.current_stock).collect(),
            };

            for (line, left) in bom.iter().zip(remaining) {
                prop_assert_eq!(
                    left,
                    line.current_stock - line.quantity_per_product * Decimal::from(second)
                );
            }
        }

        /// Reported shortage is required minus available and always positive
        #[test]
        fn prop_shortage_amount(bom in bom_strategy(), quantity in 1i32..=100) {
            for s in find_shortages(&bom, quantity) {
                prop_assert!(s.shortage > Decimal::ZERO);
                prop_assert_eq!(s.shortage, s.required - s.available);
            }
        }
    }
}
