//! Production report tests
//!
//! Tests for report aggregation including:
//! - Summary rates and on-time delivery
//! - Stage efficiency and bottleneck thresholds
//! - Recommendations and text rendering

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    build_production_report, plan_stage_logs, rate, Bottleneck, ProductType, ProductionSnapshot,
    ProductionStatus, RecommendationCategory, ReportPeriod, Severity, StageLogStatus,
};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn day(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap()
}

fn snapshot(
    product_type: ProductType,
    status: ProductionStatus,
    created: DateTime<Utc>,
    eta: DateTime<Utc>,
    completed: Option<DateTime<Utc>>,
) -> ProductionSnapshot {
    ProductionSnapshot {
        id: Uuid::new_v4(),
        product_name: format!("{} sample", product_type),
        batch_number: Some("PROD-20240501-0001".to_string()),
        product_type,
        status,
        requires_tracking: product_type.requires_tracking(),
        created_at: created,
        production_started_at: Some(created),
        estimated_completion_date: Some(eta),
        actual_completion_date: completed,
        resources_used: BTreeMap::new(),
        stages: Vec::new(),
    }
}

fn window() -> (DateTime<Utc>, DateTime<Utc>) {
    (day(1, 0), day(31, 23))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_rate_rounding() {
        assert_eq!(rate(1, 3), dec("33.3"));
        assert_eq!(rate(2, 3), dec("66.7"));
        assert_eq!(rate(0, 0), Decimal::ZERO);
    }

    #[test]
    fn test_summary_counts_and_on_time() {
        let (start, end) = window();
        let productions = vec![
            // on time: 48h, finished before eta
            snapshot(ProductType::Table, ProductionStatus::Completed, day(1, 8), day(10, 8), Some(day(3, 8))),
            // late: finished after eta
            snapshot(ProductType::Chair, ProductionStatus::Completed, day(2, 8), day(3, 8), Some(day(6, 8))),
            snapshot(ProductType::Table, ProductionStatus::InProgress, day(4, 8), day(30, 8), None),
            // open and past its eta
            snapshot(ProductType::Chair, ProductionStatus::InProgress, day(4, 8), day(5, 8), None),
        ];
        let report = build_production_report(ReportPeriod::Monthly, start, end, &productions, day(20, 0));

        assert_eq!(report.summary.total_productions, 4);
        assert_eq!(report.summary.completed, 2);
        assert_eq!(report.summary.in_progress, 2);
        assert_eq!(report.summary.delayed, 1);
        assert_eq!(report.summary.completion_rate, dec("50"));
        assert_eq!(report.summary.on_time_delivery_rate, dec("50"));
        // (48 + 96) / 2
        assert_eq!(report.summary.average_completion_time, dec("72"));
        assert_eq!(report.capacity_utilization.maximum, 200);
        assert_eq!(report.capacity_utilization.available_capacity, 196);
    }

    #[test]
    fn test_product_type_breakdown() {
        let (start, end) = window();
        let productions = vec![
            snapshot(ProductType::Alkansya, ProductionStatus::Completed, day(1, 8), day(2, 8), Some(day(1, 9))),
            snapshot(ProductType::Alkansya, ProductionStatus::Completed, day(2, 8), day(3, 8), Some(day(2, 9))),
            snapshot(ProductType::Table, ProductionStatus::InProgress, day(2, 8), day(16, 8), None),
        ];
        let report = build_production_report(ReportPeriod::Monthly, start, end, &productions, day(3, 0));

        let alkansya = &report.product_types[&ProductType::Alkansya];
        assert_eq!(alkansya.total, 2);
        assert_eq!(alkansya.completion_rate, dec("100"));
        assert_eq!(report.product_types[&ProductType::Table].in_progress, 1);
    }

    #[test]
    fn test_slow_product_type_is_a_bottleneck() {
        let (start, end) = window();
        // 400 hours from start to finish
        let slow = snapshot(
            ProductType::Table,
            ProductionStatus::Completed,
            day(1, 0),
            day(30, 0),
            Some(day(1, 0) + Duration::hours(400)),
        );
        let report = build_production_report(ReportPeriod::Monthly, start, end, &[slow], day(30, 0));

        assert!(report.bottlenecks.iter().any(|b| matches!(
            b,
            Bottleneck::SlowProductType { product_type: ProductType::Table, severity: Severity::High, .. }
        )));
    }

    #[test]
    fn test_delayed_stage_is_a_bottleneck() {
        let (start, end) = window();
        let mut stuck = snapshot(ProductType::Chair, ProductionStatus::InProgress, day(1, 0), day(15, 0), None);
        stuck.stages = plan_stage_logs(day(1, 0));
        stuck.stages[0].status = StageLogStatus::InProgress;
        stuck.stages[0].started_at = Some(day(1, 0));

        let report = build_production_report(ReportPeriod::Monthly, start, end, &[stuck], day(5, 0));

        let prep = &report.stage_efficiency[0];
        assert_eq!(prep.stage, "Material Preparation");
        assert_eq!(prep.delayed, 1);
        assert!(report.bottlenecks.iter().any(|b| matches!(
            b,
            Bottleneck::StageDelay { severity: Severity::High, .. }
        )));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.category == RecommendationCategory::Efficiency
                && r.title.contains("Material Preparation")));
    }

    #[test]
    fn test_low_completion_recommendation() {
        let (start, end) = window();
        let productions = vec![
            snapshot(ProductType::Table, ProductionStatus::InProgress, day(1, 8), day(28, 8), None),
            snapshot(ProductType::Chair, ProductionStatus::Pending, day(2, 8), day(28, 8), None),
        ];
        let report = build_production_report(ReportPeriod::Monthly, start, end, &productions, day(3, 0));

        assert!(report
            .recommendations
            .iter()
            .any(|r| r.title == "Low Completion Rate"));
    }

    #[test]
    fn test_long_windows_use_wider_buckets() {
        let start = day(1, 0);
        let end = Utc.with_ymd_and_hms(2024, 7, 31, 0, 0, 0).unwrap();
        let report = build_production_report(ReportPeriod::Custom, start, end, &[], end);
        assert_eq!(report.performance_trends[1].date, NaiveDate::from_ymd_opt(2024, 5, 8).unwrap());

        let (start, end) = window();
        let report = build_production_report(ReportPeriod::Monthly, start, end, &[], end);
        assert_eq!(report.performance_trends.len(), 31);

        let end = Utc.with_ymd_and_hms(2025, 4, 30, 0, 0, 0).unwrap();
        let report = build_production_report(ReportPeriod::Custom, start, end, &[], end);
        assert_eq!(report.performance_trends[1].date, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
    }

    #[test]
    fn test_render_text_sections() {
        let (start, end) = window();
        let report = build_production_report(ReportPeriod::Weekly, start, end, &[], end);
        let text = report.render_text();
        assert!(text.contains("PRODUCTION REPORT - WEEKLY"));
        assert!(text.contains("Total Productions: 0"));
        assert!(text.contains("STAGE EFFICIENCY"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = ProductionStatus> {
        prop_oneof![
            Just(ProductionStatus::Pending),
            Just(ProductionStatus::InProgress),
            Just(ProductionStatus::Completed),
            Just(ProductionStatus::Hold),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Rates are percentages
        #[test]
        fn prop_rate_bounded(whole in 0usize..500, part_seed in 0usize..500) {
            let part = if whole == 0 { 0 } else { part_seed % (whole + 1) };
            let r = rate(part, whole);
            prop_assert!(r >= Decimal::ZERO);
            prop_assert!(r <= Decimal::ONE_HUNDRED);
        }

        /// Summary counts never exceed the total
        #[test]
        fn prop_summary_consistent(statuses in prop::collection::vec(status_strategy(), 0..30)) {
            let (start, end) = window();
            let productions: Vec<ProductionSnapshot> = statuses
                .iter()
                .enumerate()
                .map(|(i, status)| {
                    let created = day(1, 0) + Duration::hours(i as i64);
                    let completed = (*status == ProductionStatus::Completed)
                        .then(|| created + Duration::hours(30));
                    snapshot(ProductType::Chair, *status, created, created + Duration::days(14), completed)
                })
                .collect();
            let report = build_production_report(ReportPeriod::Monthly, start, end, &productions, day(31, 0));

            prop_assert_eq!(report.summary.total_productions, productions.len());
            prop_assert!(report.summary.completed + report.summary.in_progress <= productions.len());
            prop_assert!(report.summary.delayed <= productions.len() - report.summary.completed);
            let bucketed: usize = report.performance_trends.iter().map(|b| b.total).sum();
            prop_assert_eq!(bucketed, productions.len());
        }
    }
}
