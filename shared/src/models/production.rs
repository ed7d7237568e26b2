//! Production models and the stage-progression engine
//!
//! A tracked production owns one stage log per catalog stage. Stages move
//! pending -> in_progress -> completed strictly in `order_sequence`; the
//! production's overall progress is the share of completed stages.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Terminal `current_stage` label of a finished tracked production
pub const STAGE_COMPLETED: &str = "Completed";

/// `current_stage` label of a stocked (untracked) production
pub const STAGE_READY_FOR_DELIVERY: &str = "Ready for Delivery";

/// Lead time applied to a new tracked production's estimated completion
pub const DEFAULT_LEAD_TIME_DAYS: i64 = 14;

/// Fallback duration when a stage carries no usable estimate
pub const FALLBACK_STAGE_MINUTES: i64 = 60;

/// Overdue margin after which the timeline sweep completes the current stage
pub const OVERDUE_GRACE_HOURS: i64 = 6;

/// Overdue margin after which a stage is force-completed as severely delayed
pub const SEVERE_DELAY_HOURS: i64 = 12;

pub const NOTE_TIMELINE_COMPLETION: &str = "Auto-completed by system based on timeline";
pub const NOTE_SEVERE_DELAY: &str = "Auto-completed: significantly overdue (12+ hours)";
pub const NOTE_TIME_ADVANCE: &str = "Auto-completed after estimated duration elapsed";
pub const ISSUE_SEVERELY_DELAYED: &str = "severely_delayed";

// ============================================================================
// Stage catalog
// ============================================================================

/// One fixed manufacturing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageDefinition {
    pub order_sequence: i32,
    pub name: &'static str,
    pub duration_hours: i32,
    pub description: &'static str,
}

pub const STAGE_CATALOG: [StageDefinition; 6] = [
    StageDefinition {
        order_sequence: 1,
        name: "Material Preparation",
        duration_hours: 24,
        description: "Selecting and preparing high-quality materials",
    },
    StageDefinition {
        order_sequence: 2,
        name: "Cutting & Shaping",
        duration_hours: 36,
        description: "Precision cutting and shaping of components",
    },
    StageDefinition {
        order_sequence: 3,
        name: "Assembly",
        duration_hours: 48,
        description: "Careful assembly of all components",
    },
    StageDefinition {
        order_sequence: 4,
        name: "Sanding & Surface Preparation",
        duration_hours: 24,
        description: "Sanding and preparing surfaces for finishing",
    },
    StageDefinition {
        order_sequence: 5,
        name: "Finishing",
        duration_hours: 36,
        description: "Applying stains, sealants and protective coatings",
    },
    StageDefinition {
        order_sequence: 6,
        name: "Quality Check & Packaging",
        duration_hours: 12,
        description: "Final inspection and packaging for delivery",
    },
];

/// Look up a catalog stage by name
pub fn stage_definition(name: &str) -> Option<&'static StageDefinition> {
    STAGE_CATALOG.iter().find(|s| s.name == name)
}

// ============================================================================
// Status enums
// ============================================================================

/// Production lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Hold,
}

impl ProductionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionStatus::Pending => "Pending",
            ProductionStatus::InProgress => "In Progress",
            ProductionStatus::Completed => "Completed",
            ProductionStatus::Hold => "Hold",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(ProductionStatus::Pending),
            "In Progress" => Some(ProductionStatus::InProgress),
            "Completed" => Some(ProductionStatus::Completed),
            "Hold" => Some(ProductionStatus::Hold),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProductionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage log status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageLogStatus {
    Pending,
    InProgress,
    Completed,
    Delayed,
    Hold,
}

impl StageLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageLogStatus::Pending => "pending",
            StageLogStatus::InProgress => "in_progress",
            StageLogStatus::Completed => "completed",
            StageLogStatus::Delayed => "delayed",
            StageLogStatus::Hold => "hold",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StageLogStatus::Pending),
            "in_progress" => Some(StageLogStatus::InProgress),
            "completed" => Some(StageLogStatus::Completed),
            "delayed" => Some(StageLogStatus::Delayed),
            "hold" => Some(StageLogStatus::Hold),
            _ => None,
        }
    }

    /// Whether a stage in this status has been started and not finished
    pub fn is_active(&self) -> bool {
        matches!(self, StageLogStatus::InProgress | StageLogStatus::Delayed)
    }
}

impl std::fmt::Display for StageLogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of product being manufactured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Alkansya,
    Table,
    Chair,
    Custom,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Alkansya => "alkansya",
            ProductType::Table => "table",
            ProductType::Chair => "chair",
            ProductType::Custom => "custom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "alkansya" => Some(ProductType::Alkansya),
            "table" => Some(ProductType::Table),
            "chair" => Some(ProductType::Chair),
            "custom" => Some(ProductType::Custom),
            _ => None,
        }
    }

    /// Infer the type from a product's display name
    pub fn from_product_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("alkansya") {
            ProductType::Alkansya
        } else if lower.contains("table") {
            ProductType::Table
        } else if lower.contains("chair") {
            ProductType::Chair
        } else {
            ProductType::Custom
        }
    }

    /// Stocked products are produced in daily batches and skip stage tracking
    pub fn requires_tracking(&self) -> bool {
        !matches!(self, ProductType::Alkansya)
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// Build a batch number of the form `PROD-YYYYMMDD-NNNN`
pub fn format_batch_number(date: NaiveDate, sequence: u32) -> String {
    format!("PROD-{}-{:04}", date.format("%Y%m%d"), sequence)
}

// ============================================================================
// Progression engine
// ============================================================================

/// Errors raised by stage transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressionError {
    #[error("Stage log not found")]
    StageNotFound,

    #[error("Cannot {action} stage '{stage}' while it is {status}")]
    InvalidTransition {
        stage: String,
        status: StageLogStatus,
        action: &'static str,
    },

    #[error("Stage '{stage}' cannot run before '{blocking}' is completed")]
    OutOfOrder { stage: String, blocking: String },

    #[error("Production is {0} and cannot advance")]
    NotAdvancing(ProductionStatus),
}

/// In-memory view of one stage log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub id: Uuid,
    pub order_sequence: i32,
    pub stage_name: String,
    pub duration_hours: i32,
    pub status: StageLogStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub actual_duration_hours: Option<i32>,
    pub progress_percentage: Decimal,
    pub notes: Option<String>,
    pub issues: Vec<String>,
}

impl StageState {
    pub fn is_completed(&self) -> bool {
        self.status == StageLogStatus::Completed
    }

    /// Planned duration in minutes
    pub fn estimated_minutes(&self) -> i64 {
        let minutes = i64::from(self.duration_hours) * 60;
        if minutes > 0 {
            minutes
        } else {
            FALLBACK_STAGE_MINUTES
        }
    }

    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed()
            && self
                .estimated_completion_at
                .map(|eta| now > eta)
                .unwrap_or(false)
    }

    /// Whole hours past the estimated completion, zero when on time
    pub fn delay_hours(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_delayed(now) {
            return 0;
        }
        self.estimated_completion_at
            .map(|eta| (now - eta).num_hours())
            .unwrap_or(0)
    }

    /// Elapsed-time progress, clamped to 0..=100
    pub fn time_progress(&self, now: DateTime<Utc>) -> Decimal {
        let Some(started_at) = self.started_at else {
            return Decimal::ZERO;
        };
        let elapsed = (now - started_at).num_minutes().max(0);
        let pct = Decimal::from(elapsed) * Decimal::ONE_HUNDRED
            / Decimal::from(self.estimated_minutes());
        clamp_percentage(pct).round_dp(2)
    }

    fn start(&mut self, now: DateTime<Utc>) {
        self.status = StageLogStatus::InProgress;
        self.started_at = Some(now);
        self.estimated_completion_at =
            Some(now + Duration::minutes(self.estimated_minutes()));
    }

    fn complete(&mut self, now: DateTime<Utc>, note: Option<&str>) {
        self.status = StageLogStatus::Completed;
        self.completed_at = Some(now);
        self.progress_percentage = Decimal::ONE_HUNDRED;
        self.actual_duration_hours = self
            .started_at
            .map(|started| (now - started).num_hours().max(0) as i32);
        if let Some(note) = note {
            self.notes = Some(match self.notes.take() {
                Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
                _ => note.to_string(),
            });
        }
    }
}

/// Clamp a percentage into 0..=100
pub fn clamp_percentage(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).min(Decimal::ONE_HUNDRED)
}

/// Fresh pending stage logs for a production starting at `start`.
///
/// Each log's estimated completion is the start plus the cumulative
/// duration of every stage up to and including it.
pub fn plan_stage_logs(start: DateTime<Utc>) -> Vec<StageState> {
    let mut cumulative = 0i64;
    STAGE_CATALOG
        .iter()
        .map(|def| {
            cumulative += i64::from(def.duration_hours);
            StageState {
                id: Uuid::new_v4(),
                order_sequence: def.order_sequence,
                stage_name: def.name.to_string(),
                duration_hours: def.duration_hours,
                status: StageLogStatus::Pending,
                started_at: None,
                completed_at: None,
                estimated_completion_at: Some(start + Duration::hours(cumulative)),
                actual_duration_hours: None,
                progress_percentage: Decimal::ZERO,
                notes: None,
                issues: Vec::new(),
            }
        })
        .collect()
}

/// Result of one auto-advance pass over a production
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// Nothing to do: not in progress, untracked, or every stage is done
    Idle,
    /// The active stage gained time-based progress
    Progressed { stage: String, progress: Decimal },
    /// The active stage completed; `next` is `None` when the production finished
    Advanced { completed: String, next: Option<String> },
}

impl AdvanceOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, AdvanceOutcome::Idle)
    }
}

/// Production fields the progression engine reads and writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionState {
    pub status: ProductionStatus,
    pub current_stage: String,
    pub overall_progress: Decimal,
    pub requires_tracking: bool,
    pub actual_completion_date: Option<DateTime<Utc>>,
    /// Stage logs sorted by `order_sequence`
    pub stages: Vec<StageState>,
}

impl ProductionState {
    pub fn new(
        status: ProductionStatus,
        current_stage: impl Into<String>,
        overall_progress: Decimal,
        requires_tracking: bool,
        actual_completion_date: Option<DateTime<Utc>>,
        mut stages: Vec<StageState>,
    ) -> Self {
        stages.sort_by_key(|s| s.order_sequence);
        Self {
            status,
            current_stage: current_stage.into(),
            overall_progress,
            requires_tracking,
            actual_completion_date,
            stages,
        }
    }

    pub fn completed_stage_count(&self) -> usize {
        self.stages.iter().filter(|s| s.is_completed()).count()
    }

    /// Index of the first stage that is not completed
    pub fn frontier_index(&self) -> Option<usize> {
        self.stages.iter().position(|s| !s.is_completed())
    }

    /// Stage the clock runs against: first in-progress, else first pending
    pub fn active_stage_index(&self) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.status.is_active())
            .or_else(|| {
                self.stages
                    .iter()
                    .position(|s| s.status == StageLogStatus::Pending)
            })
    }

    pub fn stage_index(&self, stage_id: Uuid) -> Result<usize, ProgressionError> {
        self.stages
            .iter()
            .position(|s| s.id == stage_id)
            .ok_or(ProgressionError::StageNotFound)
    }

    /// Completed share of stage logs, rounded to two decimals
    pub fn computed_progress(&self) -> Decimal {
        if !self.requires_tracking {
            return Decimal::ONE_HUNDRED;
        }
        if self.stages.is_empty() {
            return Decimal::ZERO;
        }
        let completed = Decimal::from(self.completed_stage_count() as u64);
        let total = Decimal::from(self.stages.len() as u64);
        (completed * Decimal::ONE_HUNDRED / total).round_dp(2)
    }

    /// Recompute overall progress and close the production at 100
    pub fn recompute_progress(&mut self, now: DateTime<Utc>) {
        self.overall_progress = self.computed_progress();
        if self.overall_progress >= Decimal::ONE_HUNDRED
            && self.status != ProductionStatus::Completed
        {
            self.status = ProductionStatus::Completed;
            if self.requires_tracking {
                self.current_stage = STAGE_COMPLETED.to_string();
            }
            self.actual_completion_date = Some(now);
        }
    }

    fn ensure_in_order(&self, index: usize) -> Result<(), ProgressionError> {
        match self.frontier_index() {
            Some(frontier) if frontier < index => Err(ProgressionError::OutOfOrder {
                stage: self.stages[index].stage_name.clone(),
                blocking: self.stages[frontier].stage_name.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Start a pending stage; only the earliest unfinished stage may start
    pub fn start_stage(&mut self, index: usize, now: DateTime<Utc>) -> Result<(), ProgressionError> {
        let stage = self.stages.get(index).ok_or(ProgressionError::StageNotFound)?;
        if stage.status != StageLogStatus::Pending {
            return Err(ProgressionError::InvalidTransition {
                stage: stage.stage_name.clone(),
                status: stage.status,
                action: "start",
            });
        }
        self.ensure_in_order(index)?;

        self.stages[index].start(now);
        self.current_stage = self.stages[index].stage_name.clone();
        if self.status == ProductionStatus::Pending {
            self.status = ProductionStatus::InProgress;
        }
        Ok(())
    }

    /// Complete a stage, then either activate the next pending stage or
    /// close the production. Returns the name of the stage now running.
    pub fn complete_stage(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<Option<String>, ProgressionError> {
        let stage = self.stages.get(index).ok_or(ProgressionError::StageNotFound)?;
        if matches!(stage.status, StageLogStatus::Completed | StageLogStatus::Hold) {
            return Err(ProgressionError::InvalidTransition {
                stage: stage.stage_name.clone(),
                status: stage.status,
                action: "complete",
            });
        }
        self.ensure_in_order(index)?;

        self.stages[index].complete(now, note);
        self.recompute_progress(now);

        if self.status == ProductionStatus::Completed {
            return Ok(None);
        }
        Ok(self.start_next_stage(now))
    }

    /// Start the earliest pending stage if none is running.
    pub fn start_next_stage(&mut self, now: DateTime<Utc>) -> Option<String> {
        let frontier = self.frontier_index()?;
        let stage = &mut self.stages[frontier];
        if stage.status == StageLogStatus::Pending {
            stage.start(now);
        }
        self.current_stage = stage.stage_name.clone();
        Some(self.current_stage.clone())
    }

    /// Manual progress update. Clamped to 0..=100 and never lowers the
    /// stored value. Returns the stored percentage.
    pub fn update_stage_progress(
        &mut self,
        index: usize,
        value: Decimal,
    ) -> Result<Decimal, ProgressionError> {
        let stage = self
            .stages
            .get_mut(index)
            .ok_or(ProgressionError::StageNotFound)?;
        if stage.is_completed() {
            return Ok(stage.progress_percentage);
        }
        stage.progress_percentage = stage.progress_percentage.max(clamp_percentage(value).round_dp(2));
        Ok(stage.progress_percentage)
    }

    /// Time-threshold advance: stamp an unstarted active stage, raise its
    /// progress from elapsed time, and complete it once the estimate is reached.
    pub fn auto_advance(&mut self, now: DateTime<Utc>) -> AdvanceOutcome {
        if self.status != ProductionStatus::InProgress || !self.requires_tracking {
            return AdvanceOutcome::Idle;
        }
        let Some(index) = self.active_stage_index() else {
            return AdvanceOutcome::Idle;
        };
        if self.ensure_in_order(index).is_err() {
            return AdvanceOutcome::Idle;
        }

        if self.stages[index].started_at.is_none() || self.stages[index].status == StageLogStatus::Pending {
            self.stages[index].start(now);
        }

        let stage = &mut self.stages[index];
        let elapsed = stage
            .started_at
            .map(|s| (now - s).num_minutes())
            .unwrap_or(0);
        stage.progress_percentage = stage.progress_percentage.max(stage.time_progress(now));
        self.current_stage = stage.stage_name.clone();

        if elapsed >= stage.estimated_minutes() {
            let completed = stage.stage_name.clone();
            // index is the frontier, so completion cannot fail
            let next = self
                .complete_stage(index, now, Some(NOTE_TIME_ADVANCE))
                .unwrap_or(None);
            return AdvanceOutcome::Advanced { completed, next };
        }

        AdvanceOutcome::Progressed {
            stage: self.stages[index].stage_name.clone(),
            progress: self.stages[index].progress_percentage,
        }
    }

    /// Whether the timeline sweep should close `stage`
    pub fn should_complete_on_timeline(stage: &StageState, now: DateTime<Utc>, force: bool) -> bool {
        let Some(eta) = stage.estimated_completion_at else {
            return false;
        };
        (force && stage.is_delayed(now))
            || now > eta + Duration::hours(OVERDUE_GRACE_HOURS)
            || (stage.status == StageLogStatus::InProgress && now >= eta)
    }

    /// Timeline sweep for one production. Completes the current stage when it
    /// is due, then starts the next pending stage once its predecessor's
    /// estimate has passed. Returns true when anything changed.
    pub fn apply_timeline(&mut self, now: DateTime<Utc>, force: bool) -> bool {
        if self.status != ProductionStatus::InProgress
            || !self.requires_tracking
            || self.current_stage == STAGE_COMPLETED
        {
            return false;
        }

        let mut changed = false;
        let current = self
            .stages
            .iter()
            .position(|s| !s.is_completed() && s.stage_name == self.current_stage);

        if let Some(index) = current {
            if Self::should_complete_on_timeline(&self.stages[index], now, force)
                && self
                    .complete_stage(index, now, Some(NOTE_TIMELINE_COMPLETION))
                    .is_ok()
            {
                changed = true;
            }
        }

        if self.status == ProductionStatus::InProgress
            && !self.stages.iter().any(|s| s.status.is_active())
        {
            if let Some(frontier) = self.frontier_index() {
                let predecessor_due = frontier == 0
                    || self.stages[frontier - 1]
                        .estimated_completion_at
                        .map(|eta| now >= eta)
                        .unwrap_or(true);
                if predecessor_due && self.start_stage(frontier, now).is_ok() {
                    changed = true;
                }
            }
        }

        changed
    }

    /// Force-complete stages at least twelve hours past their estimate.
    /// Returns how many stages were closed.
    pub fn sweep_severely_delayed(&mut self, now: DateTime<Utc>) -> usize {
        if self.status != ProductionStatus::InProgress || !self.requires_tracking {
            return 0;
        }
        let mut closed = 0;
        while let Some(index) = self.frontier_index() {
            let stage = &self.stages[index];
            let overdue = stage
                .estimated_completion_at
                .map(|eta| now >= eta + Duration::hours(SEVERE_DELAY_HOURS))
                .unwrap_or(false);
            if !overdue || stage.status == StageLogStatus::Hold {
                break;
            }
            self.stages[index]
                .issues
                .push(ISSUE_SEVERELY_DELAYED.to_string());
            if self.complete_stage(index, now, Some(NOTE_SEVERE_DELAY)).is_err() {
                break;
            }
            closed += 1;
        }
        closed
    }

    /// Position of the current stage in the catalog, 7 once completed
    pub fn stage_rank(&self) -> i32 {
        if self.status == ProductionStatus::Completed || self.current_stage == STAGE_COMPLETED {
            return STAGE_CATALOG.len() as i32 + 1;
        }
        stage_definition(&self.current_stage)
            .map(|s| s.order_sequence)
            .unwrap_or(0)
    }
}

/// Estimated completion for a production started at `start`
pub fn estimated_completion(start: DateTime<Utc>) -> DateTime<Utc> {
    start + Duration::days(DEFAULT_LEAD_TIME_DAYS)
}

pub fn is_production_delayed(
    status: ProductionStatus,
    estimated_completion_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    status != ProductionStatus::Completed
        && estimated_completion_date
            .map(|eta| now > eta)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn tracked(now: DateTime<Utc>) -> ProductionState {
        let mut state = ProductionState::new(
            ProductionStatus::InProgress,
            "Material Preparation",
            Decimal::ZERO,
            true,
            None,
            plan_stage_logs(now),
        );
        state.start_stage(0, now).unwrap();
        state
    }

    #[test]
    fn test_plan_stage_logs_cumulative_estimates() {
        let logs = plan_stage_logs(t0());
        assert_eq!(logs.len(), 6);
        assert_eq!(logs[0].estimated_completion_at, Some(t0() + Duration::hours(24)));
        assert_eq!(logs[5].estimated_completion_at, Some(t0() + Duration::hours(180)));
        assert!(logs.iter().all(|l| l.status == StageLogStatus::Pending));
    }

    #[test]
    fn test_complete_stage_activates_next() {
        let mut state = tracked(t0());
        let next = state.complete_stage(0, t0() + Duration::hours(20), None).unwrap();
        assert_eq!(next.as_deref(), Some("Cutting & Shaping"));
        assert_eq!(state.current_stage, "Cutting & Shaping");
        assert_eq!(state.overall_progress.to_string(), "16.67");
        assert_eq!(state.stages[0].actual_duration_hours, Some(20));
        assert_eq!(state.stages[1].status, StageLogStatus::InProgress);
    }

    #[test]
    fn test_completing_last_stage_closes_production() {
        let mut state = tracked(t0());
        for i in 0..6 {
            state.complete_stage(i, t0() + Duration::hours(i as i64 + 1), None).unwrap();
        }
        assert_eq!(state.status, ProductionStatus::Completed);
        assert_eq!(state.current_stage, STAGE_COMPLETED);
        assert_eq!(state.overall_progress, Decimal::ONE_HUNDRED);
        assert!(state.actual_completion_date.is_some());
    }

    #[test]
    fn test_out_of_order_completion_rejected() {
        let mut state = tracked(t0());
        let err = state.complete_stage(2, t0(), None).unwrap_err();
        assert!(matches!(err, ProgressionError::OutOfOrder { .. }));
    }

    #[test]
    fn test_start_requires_pending() {
        let mut state = tracked(t0());
        let err = state.start_stage(0, t0()).unwrap_err();
        assert!(matches!(err, ProgressionError::InvalidTransition { action: "start", .. }));
    }

    #[test]
    fn test_manual_progress_never_decreases() {
        let mut state = tracked(t0());
        assert_eq!(state.update_stage_progress(0, Decimal::from(40)).unwrap(), Decimal::from(40));
        assert_eq!(state.update_stage_progress(0, Decimal::from(10)).unwrap(), Decimal::from(40));
        assert_eq!(state.update_stage_progress(0, Decimal::from(250)).unwrap(), Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_auto_advance_progress_then_completion() {
        let mut state = tracked(t0());
        let outcome = state.auto_advance(t0() + Duration::hours(12));
        assert_eq!(
            outcome,
            AdvanceOutcome::Progressed {
                stage: "Material Preparation".to_string(),
                progress: Decimal::from(50)
            }
        );

        let outcome = state.auto_advance(t0() + Duration::hours(24));
        assert_eq!(
            outcome,
            AdvanceOutcome::Advanced {
                completed: "Material Preparation".to_string(),
                next: Some("Cutting & Shaping".to_string())
            }
        );
    }

    #[test]
    fn test_auto_advance_ignores_untracked() {
        let mut state = ProductionState::new(
            ProductionStatus::Completed,
            STAGE_READY_FOR_DELIVERY,
            Decimal::ONE_HUNDRED,
            false,
            Some(t0()),
            Vec::new(),
        );
        assert_eq!(state.auto_advance(t0()), AdvanceOutcome::Idle);
    }

    #[test]
    fn test_timeline_completes_in_progress_stage_at_eta() {
        let mut state = tracked(t0());
        assert!(!state.apply_timeline(t0() + Duration::hours(23), false));
        assert!(state.apply_timeline(t0() + Duration::hours(24), false));
        assert_eq!(state.stages[0].status, StageLogStatus::Completed);
        assert_eq!(state.stages[0].notes.as_deref(), Some(NOTE_TIMELINE_COMPLETION));
    }

    #[test]
    fn test_severe_delay_sweep_marks_issue() {
        let mut state = tracked(t0());
        let closed = state.sweep_severely_delayed(t0() + Duration::hours(36));
        assert_eq!(closed, 1);
        assert_eq!(state.stages[0].issues, vec![ISSUE_SEVERELY_DELAYED.to_string()]);
        assert_eq!(state.stages[1].status, StageLogStatus::InProgress);
    }

    #[test]
    fn test_product_type_from_name() {
        assert_eq!(ProductType::from_product_name("Alkansya Classic"), ProductType::Alkansya);
        assert_eq!(ProductType::from_product_name("Dining Table"), ProductType::Table);
        assert_eq!(ProductType::from_product_name("Wooden Chair"), ProductType::Chair);
        assert!(!ProductType::Alkansya.requires_tracking());
        assert!(ProductType::Table.requires_tracking());
    }

    #[test]
    fn test_batch_number_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(format_batch_number(date, 7), "PROD-20240301-0007");
    }
}
