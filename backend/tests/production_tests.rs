//! Production progression tests
//!
//! Tests for the stage engine including:
//! - Stage ordering and next-stage activation
//! - Overall progress as the completed share of stages
//! - Time-threshold auto-advance and the timeline sweep

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    plan_stage_logs, AdvanceOutcome, ProductType, ProductionState, ProductionStatus,
    StageLogStatus, ISSUE_SEVERELY_DELAYED, STAGE_CATALOG, STAGE_COMPLETED,
};
use std::str::FromStr;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 8, 0, 0).unwrap()
}

/// Tracked production with its first stage running since `start`
fn started(start: DateTime<Utc>) -> ProductionState {
    let mut state = ProductionState::new(
        ProductionStatus::Pending,
        STAGE_CATALOG[0].name,
        Decimal::ZERO,
        true,
        None,
        plan_stage_logs(start),
    );
    state.start_stage(0, start).unwrap();
    state
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_catalog_is_sequential() {
        for (i, stage) in STAGE_CATALOG.iter().enumerate() {
            assert_eq!(stage.order_sequence, i as i32 + 1);
            assert!(stage.duration_hours > 0);
        }
        let total: i32 = STAGE_CATALOG.iter().map(|s| s.duration_hours).sum();
        assert_eq!(total, 180);
    }

    #[test]
    fn test_starting_first_stage_moves_production_in_progress() {
        let state = started(t0());
        assert_eq!(state.status, ProductionStatus::InProgress);
        assert_eq!(state.stages[0].status, StageLogStatus::InProgress);
        assert_eq!(state.stages[0].started_at, Some(t0()));
        assert_eq!(
            state.stages[0].estimated_completion_at,
            Some(t0() + Duration::hours(24))
        );
    }

    #[test]
    fn test_only_frontier_stage_can_start() {
        let mut state = ProductionState::new(
            ProductionStatus::Pending,
            STAGE_CATALOG[0].name,
            Decimal::ZERO,
            true,
            None,
            plan_stage_logs(t0()),
        );
        assert!(state.start_stage(3, t0()).is_err());
        assert_eq!(state.stages[3].status, StageLogStatus::Pending);
    }

    #[test]
    fn test_progress_after_three_stages() {
        let mut state = started(t0());
        for i in 0..3 {
            state
                .complete_stage(i, t0() + Duration::hours(10 * (i as i64 + 1)), None)
                .unwrap();
        }
        assert_eq!(state.overall_progress, dec("50"));
        assert_eq!(state.current_stage, "Sanding & Surface Preparation");
    }

    #[test]
    fn test_auto_advance_progresses_before_threshold() {
        let mut state = started(t0());
        let outcome = state.auto_advance(t0() + Duration::hours(12));
        assert_eq!(
            outcome,
            AdvanceOutcome::Progressed {
                stage: "Material Preparation".to_string(),
                progress: dec("50"),
            }
        );
        assert_eq!(state.stages[0].status, StageLogStatus::InProgress);
    }

    #[test]
    fn test_auto_advance_completes_at_threshold() {
        let mut state = started(t0());
        let outcome = state.auto_advance(t0() + Duration::hours(24));
        assert_eq!(
            outcome,
            AdvanceOutcome::Advanced {
                completed: "Material Preparation".to_string(),
                next: Some("Cutting & Shaping".to_string()),
            }
        );
        assert_eq!(state.stages[1].status, StageLogStatus::InProgress);
        assert_eq!(state.overall_progress, dec("16.67"));
    }

    #[test]
    fn test_auto_advance_ignores_hold_and_untracked() {
        let mut held = started(t0());
        held.status = ProductionStatus::Hold;
        assert_eq!(held.auto_advance(t0() + Duration::days(30)), AdvanceOutcome::Idle);

        let mut untracked = ProductionState::new(
            ProductionStatus::InProgress,
            "Ready for Delivery",
            Decimal::ZERO,
            ProductType::Alkansya.requires_tracking(),
            None,
            Vec::new(),
        );
        assert_eq!(untracked.auto_advance(t0()), AdvanceOutcome::Idle);
    }

    #[test]
    fn test_timeline_sweep_within_grace_keeps_delayed_stage_open() {
        let mut state = started(t0());
        state.stages[0].status = StageLogStatus::Delayed;
        // Delayed stages are not closed until past the grace window
        let changed = state.apply_timeline(t0() + Duration::hours(25), false);
        assert!(!changed);
        assert_eq!(state.stages[0].status, StageLogStatus::Delayed);
    }

    #[test]
    fn test_forced_timeline_sweep_closes_delayed_stage() {
        let mut state = started(t0());
        state.stages[0].status = StageLogStatus::Delayed;
        let changed = state.apply_timeline(t0() + Duration::hours(25), true);
        assert!(changed);
        assert!(state.stages[0].is_completed());
    }

    #[test]
    fn test_severely_delayed_stages_are_closed_and_flagged() {
        let mut state = started(t0());
        let closed = state.sweep_severely_delayed(t0() + Duration::hours(24 + 12));
        assert_eq!(closed, 1);
        assert!(state.stages[0]
            .issues
            .iter()
            .any(|i| i == ISSUE_SEVERELY_DELAYED));
        assert_eq!(state.stages[1].status, StageLogStatus::InProgress);
    }

    #[test]
    fn test_severe_delay_sweep_skips_productions_not_in_progress() {
        let overdue = t0() + Duration::hours(24 + 12);
        for status in [ProductionStatus::Hold, ProductionStatus::Pending] {
            let mut state = started(t0());
            state.status = status;
            assert_eq!(state.sweep_severely_delayed(overdue), 0);
            assert_eq!(state.stages[0].status, StageLogStatus::InProgress);
            assert_eq!(state.stages[1].status, StageLogStatus::Pending);
            assert!(state.stages[0].issues.is_empty());
            assert_eq!(state.status, status);
        }

        let mut untracked = started(t0());
        untracked.requires_tracking = false;
        assert_eq!(untracked.sweep_severely_delayed(overdue), 0);
    }

    #[test]
    fn test_stage_rank_after_completion() {
        let mut state = started(t0());
        for i in 0..STAGE_CATALOG.len() {
            state.complete_stage(i, t0() + Duration::hours(i as i64), None).unwrap();
        }
        assert_eq!(state.current_stage, STAGE_COMPLETED);
        assert_eq!(state.stage_rank(), 7);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn hours_strategy() -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(0i64..=72, 1..40)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Overall progress always equals completed stages over total stages
        #[test]
        fn prop_overall_progress_matches_completed_share(steps in hours_strategy()) {
            let mut state = started(t0());
            let mut now = t0();
            for step in steps {
                now += Duration::hours(step);
                state.auto_advance(now);

                let completed = state.completed_stage_count() as u64;
                let expected = (Decimal::from(completed) * Decimal::ONE_HUNDRED
                    / Decimal::from(STAGE_CATALOG.len() as u64))
                    .round_dp(2);
                prop_assert_eq!(state.overall_progress, expected);
            }
        }

        /// Auto-advance never moves a production backwards
        #[test]
        fn prop_stage_rank_never_regresses(steps in hours_strategy()) {
            let mut state = started(t0());
            let mut now = t0();
            let mut rank = state.stage_rank();
            let mut progress = state.overall_progress;
            for step in steps {
                now += Duration::hours(step);
                state.auto_advance(now);
                prop_assert!(state.stage_rank() >= rank);
                prop_assert!(state.overall_progress >= progress);
                rank = state.stage_rank();
                progress = state.overall_progress;
            }
        }

        /// At most one stage is running at any time
        #[test]
        fn prop_single_active_stage(steps in hours_strategy(), force in any::<bool>()) {
            let mut state = started(t0());
            let mut now = t0();
            for step in steps {
                now += Duration::hours(step);
                state.apply_timeline(now, force);
                let active = state.stages.iter().filter(|s| s.status.is_active()).count();
                prop_assert!(active <= 1);
            }
        }

        /// Manual progress is clamped and never decreases
        #[test]
        fn prop_manual_progress_monotonic(values in prop::collection::vec(-50i64..=150, 1..20)) {
            let mut state = started(t0());
            let mut last = Decimal::ZERO;
            for v in values {
                let stored = state.update_stage_progress(0, Decimal::from(v)).unwrap();
                prop_assert!(stored >= last);
                prop_assert!(stored <= Decimal::ONE_HUNDRED);
                last = stored;
            }
        }
    }
}
