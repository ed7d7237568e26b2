//! Order lifecycle tests
//!
//! Tests for orders and tracking including:
//! - Forward-only status transitions
//! - Customer tracking status derived from production
//! - Completion prediction and order totals

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    order_total, pipeline_minutes, predict_completion, tracking_progress, OrderStatus,
    PricedLine, ProductType, ProductionStatus, TrackingStatus, TrackingType,
};
use std::str::FromStr;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 8, 0, 0).unwrap()
}

const ALL_STATUSES: [OrderStatus; 6] = [
    OrderStatus::Pending,
    OrderStatus::Processing,
    OrderStatus::ReadyForDelivery,
    OrderStatus::Delivered,
    OrderStatus::Completed,
    OrderStatus::Cancelled,
];

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_status_strings_roundtrip() {
        for status in ALL_STATUSES {
            assert_eq!(OrderStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::from_str("shipped"), None);
    }

    #[test]
    fn test_full_happy_path() {
        let path = [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::ReadyForDelivery,
            OrderStatus::Delivered,
            OrderStatus::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_cancel_allowed_before_delivery_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::ReadyForDelivery.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn test_tracking_status_from_production() {
        assert_eq!(
            TrackingStatus::from_production(ProductionStatus::InProgress, true),
            TrackingStatus::InProduction
        );
        assert_eq!(
            TrackingStatus::from_production(ProductionStatus::Completed, false),
            TrackingStatus::ReadyForDelivery
        );
        assert_eq!(
            TrackingStatus::from_production(ProductionStatus::Completed, true),
            TrackingStatus::Completed
        );
        assert_eq!(
            TrackingStatus::from_production(ProductionStatus::Hold, true),
            TrackingStatus::Pending
        );
    }

    #[test]
    fn test_tracking_type_by_product() {
        assert_eq!(TrackingType::for_product(ProductType::Alkansya), TrackingType::Alkansya);
        assert_eq!(TrackingType::for_product(ProductType::Table), TrackingType::Custom);
        assert_eq!(ProductType::from_product_name("Narra Dining Table"), ProductType::Table);
        assert_eq!(ProductType::from_product_name("Mini Alkansya"), ProductType::Alkansya);
    }

    #[test]
    fn test_tracking_progress() {
        assert_eq!(
            tracking_progress(ProductionStatus::InProgress, true, dec("33.33")),
            dec("33.33")
        );
        assert_eq!(
            tracking_progress(ProductionStatus::Completed, false, Decimal::ZERO),
            Decimal::ONE_HUNDRED
        );
        assert_eq!(
            tracking_progress(ProductionStatus::Pending, false, dec("50")),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_predict_completion_from_pace() {
        // 25% done after 10 hours leaves 30 hours
        let now = t0() + Duration::hours(10);
        assert_eq!(
            predict_completion(t0(), dec("25"), now),
            Some(now + Duration::hours(30))
        );
        assert_eq!(predict_completion(t0(), Decimal::ZERO, now), None);
        assert_eq!(predict_completion(t0(), Decimal::ONE_HUNDRED, now), Some(now));
    }

    #[test]
    fn test_pipeline_minutes() {
        assert_eq!(pipeline_minutes(), 180 * 60);
    }

    #[test]
    fn test_order_total() {
        let lines = vec![
            PricedLine { product_id: Uuid::new_v4(), quantity: 2, unit_price: dec("4500.00") },
            PricedLine { product_id: Uuid::new_v4(), quantity: 10, unit_price: dec("149.50") },
        ];
        assert_eq!(order_total(&lines), dec("10495.00"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = OrderStatus> {
        prop::sample::select(ALL_STATUSES.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Terminal orders never change again
        #[test]
        fn prop_terminal_is_final(from in status_strategy(), to in status_strategy()) {
            if from.is_terminal() {
                prop_assert!(!from.can_transition_to(to));
            }
        }

        /// No status can transition to itself
        #[test]
        fn prop_no_self_transition(status in status_strategy()) {
            prop_assert!(!status.can_transition_to(status));
        }

        /// Following any chain of allowed transitions ends within six steps
        #[test]
        fn prop_transitions_terminate(choices in prop::collection::vec(0usize..6, 1..20)) {
            let mut current = OrderStatus::Pending;
            let mut steps = 0;
            for choice in choices {
                let next = ALL_STATUSES[choice];
                if current.can_transition_to(next) {
                    current = next;
                    steps += 1;
                }
            }
            prop_assert!(steps <= 5);
        }

        /// Predicted completion is never before now
        #[test]
        fn prop_prediction_not_in_past(progress in 1i64..=100, hours in 0i64..=400) {
            let now = t0() + Duration::hours(hours);
            let predicted = predict_completion(t0(), Decimal::from(progress), now);
            prop_assert!(predicted.is_some());
            prop_assert!(predicted.unwrap() >= now);
        }
    }
}
