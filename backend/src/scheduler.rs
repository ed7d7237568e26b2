//! Background scheduler
//!
//! A single task wakes once a minute and runs whatever jobs are due, one
//! after another, so scheduled jobs never overlap.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use tokio::sync::mpsc;

use crate::config::{Config, SchedulerConfig};
use crate::services::{ProductionService, ReportingService};
use shared::ReportPeriod;

/// Tick of the scheduler loop
const TICK: StdDuration = StdDuration::from_secs(60);

/// Usage window of the weekly inventory export
const WEEKLY_INVENTORY_WINDOW_DAYS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    AutoAdvance,
    UpdateStages { force: bool },
    ProductionReport(ReportPeriod),
    InventoryReports { window_days: u32 },
}

/// Wall-clock slot: fires once per day inside `hour`, from `minute` on
#[derive(Debug, Clone, Copy)]
struct Slot {
    key: &'static str,
    hour: u32,
    minute: u32,
    weekday: Option<Weekday>,
    day_of_month: Option<u32>,
}

impl Slot {
    fn matches(&self, now: DateTime<Utc>) -> bool {
        now.hour() == self.hour
            && now.minute() >= self.minute
            && self.weekday.map_or(true, |w| now.weekday() == w)
            && self.day_of_month.map_or(true, |d| now.day() == d)
    }
}

const PRODUCTION_DAILY: Slot = Slot { key: "production_daily", hour: 6, minute: 0, weekday: None, day_of_month: None };
const PRODUCTION_WEEKLY: Slot = Slot { key: "production_weekly", hour: 7, minute: 0, weekday: Some(Weekday::Mon), day_of_month: None };
const PRODUCTION_MONTHLY: Slot = Slot { key: "production_monthly", hour: 8, minute: 0, weekday: None, day_of_month: Some(1) };
const INVENTORY_DAILY: Slot = Slot { key: "inventory_daily", hour: 6, minute: 0, weekday: None, day_of_month: None };
const INVENTORY_WEEKLY: Slot = Slot { key: "inventory_weekly", hour: 6, minute: 30, weekday: Some(Weekday::Mon), day_of_month: None };

/// What has already run, used to decide what is due next
#[derive(Debug, Default)]
pub struct Schedule {
    last_auto_advance: Option<DateTime<Utc>>,
    last_stage_update: Option<DateTime<Utc>>,
    fired: HashSet<(&'static str, NaiveDate)>,
}

impl Schedule {
    fn every(last: Option<DateTime<Utc>>, secs: u64, now: DateTime<Utc>) -> bool {
        let interval = Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).max(1));
        last.map_or(true, |last| now - last >= interval)
    }

    fn once_today(&mut self, slot: Slot, now: DateTime<Utc>) -> bool {
        slot.matches(now) && self.fired.insert((slot.key, now.date_naive()))
    }

    /// Jobs due at `now`, in run order. Marks them as run.
    pub fn due(
        &mut self,
        now: DateTime<Utc>,
        config: &SchedulerConfig,
        inventory_window_days: u32,
    ) -> Vec<Job> {
        let mut jobs = Vec::new();

        if Self::every(self.last_auto_advance, config.auto_advance_interval_secs, now) {
            self.last_auto_advance = Some(now);
            jobs.push(Job::AutoAdvance);
        }

        let forced_slot = Slot {
            key: "forced_stage_update",
            hour: config.forced_update_hour,
            minute: 0,
            weekday: None,
            day_of_month: None,
        };
        if self.once_today(forced_slot, now) {
            self.last_stage_update = Some(now);
            jobs.push(Job::UpdateStages { force: true });
        } else if Self::every(self.last_stage_update, config.stage_update_interval_secs, now) {
            self.last_stage_update = Some(now);
            jobs.push(Job::UpdateStages { force: false });
        }

        if config.save_reports {
            if self.once_today(PRODUCTION_DAILY, now) {
                jobs.push(Job::ProductionReport(ReportPeriod::Daily));
            }
            if self.once_today(PRODUCTION_WEEKLY, now) {
                jobs.push(Job::ProductionReport(ReportPeriod::Weekly));
            }
            if self.once_today(PRODUCTION_MONTHLY, now) {
                jobs.push(Job::ProductionReport(ReportPeriod::Monthly));
            }
            if self.once_today(INVENTORY_DAILY, now) {
                jobs.push(Job::InventoryReports { window_days: inventory_window_days });
            }
            if self.once_today(INVENTORY_WEEKLY, now) {
                jobs.push(Job::InventoryReports { window_days: WEEKLY_INVENTORY_WINDOW_DAYS });
            }
        }

        // keep the fired set from growing without bound
        let yesterday = now.date_naive() - Duration::days(1);
        self.fired.retain(|(_, date)| *date >= yesterday);

        jobs
    }
}

/// Handle for stopping the scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).await.is_err() {
            tracing::debug!("Scheduler already stopped");
        }
    }
}

pub struct Scheduler {
    productions: ProductionService,
    reporting: ReportingService,
    config: Arc<Config>,
    schedule: Schedule,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Scheduler {
    pub fn new(db: sqlx::PgPool, config: Arc<Config>) -> (Self, SchedulerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let scheduler = Scheduler {
            productions: ProductionService::new(db.clone()),
            reporting: ReportingService::new(db),
            config,
            schedule: Schedule::default(),
            shutdown_rx,
        };
        (scheduler, SchedulerHandle { shutdown_tx })
    }

    /// Runs the scheduler loop; spawn as a background task.
    pub async fn run(mut self) {
        tracing::info!(
            auto_advance_secs = self.config.scheduler.auto_advance_interval_secs,
            stage_update_secs = self.config.scheduler.stage_update_interval_secs,
            save_reports = self.config.scheduler.save_reports,
            "Scheduler starting"
        );

        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Utc::now();
                    let jobs = self.schedule.due(
                        now,
                        &self.config.scheduler,
                        self.config.reports.inventory_window_days,
                    );
                    for job in jobs {
                        self.run_job(job, now).await;
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }

    async fn run_job(&self, job: Job, now: DateTime<Utc>) {
        let output_dir = PathBuf::from(&self.config.reports.output_dir);

        let result = match job {
            Job::AutoAdvance => self.productions.auto_advance_all(now).await.map(|_| ()),
            Job::UpdateStages { force } => self
                .productions
                .update_stages_all(now, force)
                .await
                .map(|_| ()),
            Job::ProductionReport(period) => self
                .reporting
                .save_production_report(period, &output_dir, now)
                .await
                .map(|_| ()),
            Job::InventoryReports { window_days } => self
                .reporting
                .save_inventory_reports(window_days, &output_dir, now)
                .await
                .map(|_| ()),
        };

        if let Err(e) = result {
            tracing::error!(?job, error = %e, "Scheduled job failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(save_reports: bool) -> SchedulerConfig {
        SchedulerConfig {
            enabled: true,
            auto_advance_interval_secs: 600,
            stage_update_interval_secs: 3600,
            forced_update_hour: 23,
            save_reports,
        }
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        // March 2024: the 4th is a Monday
        Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
    }

    #[test]
    fn test_first_tick_runs_interval_jobs() {
        let mut schedule = Schedule::default();
        let jobs = schedule.due(at(5, 10, 0), &config(false), 30);
        assert_eq!(jobs, vec![Job::AutoAdvance, Job::UpdateStages { force: false }]);
    }

    #[test]
    fn test_auto_advance_waits_for_interval() {
        let mut schedule = Schedule::default();
        schedule.due(at(5, 10, 0), &config(false), 30);
        assert!(schedule.due(at(5, 10, 5), &config(false), 30).is_empty());
        assert_eq!(schedule.due(at(5, 10, 10), &config(false), 30), vec![Job::AutoAdvance]);
    }

    #[test]
    fn test_forced_update_once_at_configured_hour() {
        let mut schedule = Schedule::default();
        schedule.due(at(5, 22, 50), &config(false), 30);
        let jobs = schedule.due(at(5, 23, 0), &config(false), 30);
        assert!(jobs.contains(&Job::UpdateStages { force: true }));

        let later = schedule.due(at(5, 23, 30), &config(false), 30);
        assert!(!later.iter().any(|j| matches!(j, Job::UpdateStages { .. })));
    }

    #[test]
    fn test_monday_morning_reports() {
        let mut schedule = Schedule::default();
        let six = schedule.due(at(4, 6, 0), &config(true), 30);
        assert!(six.contains(&Job::ProductionReport(ReportPeriod::Daily)));
        assert!(six.contains(&Job::InventoryReports { window_days: 30 }));
        assert!(!six.contains(&Job::InventoryReports { window_days: 60 }));

        let half_past = schedule.due(at(4, 6, 30), &config(true), 30);
        assert!(half_past.contains(&Job::InventoryReports { window_days: 60 }));
        assert!(!half_past.contains(&Job::ProductionReport(ReportPeriod::Daily)));

        let seven = schedule.due(at(4, 7, 0), &config(true), 30);
        assert!(seven.contains(&Job::ProductionReport(ReportPeriod::Weekly)));
    }

    #[test]
    fn test_reports_skipped_when_saving_disabled() {
        let mut schedule = Schedule::default();
        let jobs = schedule.due(at(1, 8, 0), &config(false), 30);
        assert!(!jobs.iter().any(|j| matches!(j, Job::ProductionReport(_))));
    }

    #[test]
    fn test_monthly_report_on_first_day() {
        let mut schedule = Schedule::default();
        let jobs = schedule.due(at(1, 8, 0), &config(true), 30);
        assert!(jobs.contains(&Job::ProductionReport(ReportPeriod::Monthly)));
    }
}
