//! Production report aggregation and text rendering

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::production::{
    is_production_delayed, ProductType, ProductionStatus, StageState, STAGE_CATALOG,
};
use crate::types::ReportPeriod;

/// Delay rate (percent) above which a stage is a bottleneck
pub const STAGE_BOTTLENECK_RATE: i64 = 20;
pub const STAGE_BOTTLENECK_HIGH_RATE: i64 = 40;
/// Average completion (hours) above which a product type is slow
pub const SLOW_PRODUCT_HOURS: i64 = 240;
pub const SLOW_PRODUCT_HIGH_HOURS: i64 = 360;
pub const LOW_COMPLETION_RATE: i64 = 70;
pub const STAGE_RECOMMENDATION_RATE: i64 = 25;

/// Everything the report needs about one production
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionSnapshot {
    pub id: Uuid,
    pub product_name: String,
    pub batch_number: Option<String>,
    pub product_type: ProductType,
    pub status: ProductionStatus,
    pub requires_tracking: bool,
    pub created_at: DateTime<Utc>,
    pub production_started_at: Option<DateTime<Utc>>,
    pub estimated_completion_date: Option<DateTime<Utc>>,
    pub actual_completion_date: Option<DateTime<Utc>>,
    pub resources_used: BTreeMap<String, Decimal>,
    pub stages: Vec<StageState>,
}

impl ProductionSnapshot {
    pub fn completion_hours(&self) -> Option<i64> {
        match (self.production_started_at, self.actual_completion_date) {
            (Some(start), Some(end)) => Some((end - start).num_hours()),
            _ => None,
        }
    }

    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        is_production_delayed(self.status, self.estimated_completion_date, now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportInfo {
    pub generated_at: DateTime<Utc>,
    pub period: ReportPeriod,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_productions: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub delayed: usize,
    pub completion_rate: Decimal,
    pub on_time_delivery_rate: Decimal,
    pub average_completion_time: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductTypeStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub completion_rate: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageEfficiency {
    pub stage: String,
    pub total_instances: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub delayed: usize,
    pub average_duration_hours: Decimal,
    pub completion_rate: Decimal,
    pub delay_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendBucket {
    pub date: chrono::NaiveDate,
    pub total: usize,
    pub completed: usize,
    pub completion_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityUtilization {
    pub current: usize,
    pub maximum: usize,
    pub utilization_rate: Decimal,
    pub available_capacity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub total_issues: usize,
    pub productions_with_issues: usize,
    pub quality_rate: Decimal,
    pub average_issues_per_production: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastCompletion {
    pub id: Uuid,
    pub product_name: String,
    pub batch_number: Option<String>,
    pub completion_time_hours: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Bottleneck {
    StageDelay {
        stage: String,
        delay_rate: Decimal,
        severity: Severity,
    },
    SlowProductType {
        product_type: ProductType,
        average_completion_hours: Decimal,
        severity: Severity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Productivity,
    Efficiency,
    Scheduling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub priority: RecommendationPriority,
    pub title: String,
    pub description: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionReport {
    pub report_info: ReportInfo,
    pub summary: ReportSummary,
    pub product_types: BTreeMap<ProductType, ProductTypeStats>,
    pub stage_efficiency: Vec<StageEfficiency>,
    pub resource_utilization: BTreeMap<String, Decimal>,
    pub performance_trends: Vec<TrendBucket>,
    pub capacity_utilization: CapacityUtilization,
    pub quality_metrics: QualityMetrics,
    pub top_performers: Vec<FastCompletion>,
    pub bottlenecks: Vec<Bottleneck>,
    pub recommendations: Vec<Recommendation>,
}

/// `part / whole` as a percentage rounded to one decimal, zero when empty
pub fn rate(part: usize, whole: usize) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part as u64) * Decimal::ONE_HUNDRED / Decimal::from(whole as u64)).round_dp(1)
}

fn average_hours<I: IntoIterator<Item = i64>>(values: I) -> Decimal {
    let values: Vec<i64> = values.into_iter().collect();
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let sum: i64 = values.iter().sum();
    (Decimal::from(sum) / Decimal::from(values.len() as u64)).round_dp(1)
}

/// Mean hours from start to completion across completed productions
pub fn average_completion_time(productions: &[&ProductionSnapshot]) -> Decimal {
    average_hours(
        productions
            .iter()
            .filter(|p| p.status == ProductionStatus::Completed)
            .filter_map(|p| p.completion_hours()),
    )
}

fn summarize(productions: &[&ProductionSnapshot], now: DateTime<Utc>) -> ReportSummary {
    let total = productions.len();
    let completed: Vec<&ProductionSnapshot> = productions
        .iter()
        .copied()
        .filter(|p| p.status == ProductionStatus::Completed)
        .collect();
    let in_progress = productions
        .iter()
        .filter(|p| p.status == ProductionStatus::InProgress)
        .count();
    let delayed = productions.iter().filter(|p| p.is_delayed(now)).count();
    let on_time = completed
        .iter()
        .filter(|p| match (p.actual_completion_date, p.estimated_completion_date) {
            (Some(actual), Some(eta)) => actual <= eta,
            _ => false,
        })
        .count();

    ReportSummary {
        total_productions: total,
        completed: completed.len(),
        in_progress,
        delayed,
        completion_rate: rate(completed.len(), total),
        on_time_delivery_rate: rate(on_time, completed.len()),
        average_completion_time: average_completion_time(&completed),
    }
}

fn product_type_breakdown(
    productions: &[&ProductionSnapshot],
) -> BTreeMap<ProductType, ProductTypeStats> {
    let mut grouped: BTreeMap<ProductType, ProductTypeStats> = BTreeMap::new();
    for p in productions {
        let entry = grouped.entry(p.product_type).or_default();
        entry.total += 1;
        match p.status {
            ProductionStatus::Completed => entry.completed += 1,
            ProductionStatus::InProgress => entry.in_progress += 1,
            _ => {}
        }
    }
    for stats in grouped.values_mut() {
        stats.completion_rate = rate(stats.completed, stats.total);
    }
    grouped
}

/// Per-stage counts across tracked productions, in catalog order
pub fn stage_efficiency(productions: &[&ProductionSnapshot], now: DateTime<Utc>) -> Vec<StageEfficiency> {
    STAGE_CATALOG
        .iter()
        .map(|def| {
            let logs: Vec<&StageState> = productions
                .iter()
                .filter(|p| p.requires_tracking)
                .flat_map(|p| p.stages.iter())
                .filter(|s| s.stage_name == def.name)
                .collect();
            let completed: Vec<&&StageState> = logs.iter().filter(|s| s.is_completed()).collect();
            let in_progress = logs.iter().filter(|s| s.status.is_active()).count();
            let delayed = logs.iter().filter(|s| s.is_delayed(now)).count();

            StageEfficiency {
                stage: def.name.to_string(),
                total_instances: logs.len(),
                completed: completed.len(),
                in_progress,
                delayed,
                average_duration_hours: average_hours(
                    completed
                        .iter()
                        .filter_map(|s| s.actual_duration_hours.map(i64::from)),
                ),
                completion_rate: rate(completed.len(), logs.len()),
                delay_rate: rate(delayed, logs.len()),
            }
        })
        .collect()
}

fn resource_utilization(productions: &[&ProductionSnapshot]) -> BTreeMap<String, Decimal> {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for p in productions {
        for (resource, amount) in &p.resources_used {
            *totals.entry(resource.clone()).or_default() += *amount;
        }
    }
    totals
}

/// Bucket productions by creation date: daily up to a month, weekly up to
/// half a year, monthly beyond
fn performance_trends(
    productions: &[&ProductionSnapshot],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<TrendBucket> {
    let span_days = (end - start).num_days();
    let interval = match span_days {
        d if d > 180 => 30,
        d if d > 31 => 7,
        _ => 1,
    };
    let mut buckets = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let bucket_end = (cursor + Duration::days(interval)).min(end + Duration::seconds(1));
        let in_bucket: Vec<&&ProductionSnapshot> = productions
            .iter()
            .filter(|p| p.created_at >= cursor && p.created_at < bucket_end)
            .collect();
        let completed = in_bucket
            .iter()
            .filter(|p| p.status == ProductionStatus::Completed)
            .count();
        buckets.push(TrendBucket {
            date: cursor.date_naive(),
            total: in_bucket.len(),
            completed,
            completion_rate: rate(completed, in_bucket.len()),
        });
        cursor += Duration::days(interval);
    }
    buckets
}

fn capacity_utilization(count: usize, period: ReportPeriod) -> CapacityUtilization {
    let maximum = period.capacity();
    CapacityUtilization {
        current: count,
        maximum,
        utilization_rate: rate(count, maximum),
        available_capacity: maximum as i64 - count as i64,
    }
}

fn quality_metrics(productions: &[&ProductionSnapshot]) -> QualityMetrics {
    let mut total_issues = 0;
    let mut with_issues = 0;
    for p in productions {
        let issues: usize = p.stages.iter().map(|s| s.issues.len()).sum();
        total_issues += issues;
        if issues > 0 {
            with_issues += 1;
        }
    }
    let total = productions.len();
    QualityMetrics {
        total_issues,
        productions_with_issues: with_issues,
        quality_rate: if total == 0 {
            Decimal::ONE_HUNDRED
        } else {
            rate(total - with_issues, total)
        },
        average_issues_per_production: if total == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(total_issues as u64) / Decimal::from(total as u64)).round_dp(2)
        },
    }
}

fn fastest_completions(productions: &[&ProductionSnapshot]) -> Vec<FastCompletion> {
    let mut completed: Vec<(&ProductionSnapshot, i64)> = productions
        .iter()
        .filter(|p| p.status == ProductionStatus::Completed)
        .filter_map(|p| p.completion_hours().map(|h| (*p, h)))
        .collect();
    completed.sort_by_key(|(_, hours)| *hours);
    completed
        .into_iter()
        .take(5)
        .map(|(p, hours)| FastCompletion {
            id: p.id,
            product_name: p.product_name.clone(),
            batch_number: p.batch_number.clone(),
            completion_time_hours: hours,
        })
        .collect()
}

/// Stages with high delay rates and product types that take too long
pub fn identify_bottlenecks(
    productions: &[&ProductionSnapshot],
    stages: &[StageEfficiency],
) -> Vec<Bottleneck> {
    let mut bottlenecks: Vec<Bottleneck> = stages
        .iter()
        .filter(|s| s.delay_rate > Decimal::from(STAGE_BOTTLENECK_RATE))
        .map(|s| Bottleneck::StageDelay {
            stage: s.stage.clone(),
            delay_rate: s.delay_rate,
            severity: if s.delay_rate > Decimal::from(STAGE_BOTTLENECK_HIGH_RATE) {
                Severity::High
            } else {
                Severity::Medium
            },
        })
        .collect();

    let mut by_type: BTreeMap<ProductType, Vec<&ProductionSnapshot>> = BTreeMap::new();
    for p in productions {
        by_type.entry(p.product_type).or_default().push(*p);
    }
    for (product_type, group) in by_type {
        let avg = average_completion_time(&group);
        if avg > Decimal::from(SLOW_PRODUCT_HOURS) {
            bottlenecks.push(Bottleneck::SlowProductType {
                product_type,
                average_completion_hours: avg,
                severity: if avg > Decimal::from(SLOW_PRODUCT_HIGH_HOURS) {
                    Severity::High
                } else {
                    Severity::Medium
                },
            });
        }
    }
    bottlenecks
}

pub fn generate_recommendations(
    summary: &ReportSummary,
    stages: &[StageEfficiency],
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if summary.completion_rate < Decimal::from(LOW_COMPLETION_RATE) {
        recommendations.push(Recommendation {
            category: RecommendationCategory::Productivity,
            priority: RecommendationPriority::High,
            title: "Low Completion Rate".to_string(),
            description: format!(
                "Current completion rate is {}%. Review workflow processes and resource allocation.",
                summary.completion_rate
            ),
            action: "Review bottlenecks and increase resource allocation to delayed stages."
                .to_string(),
        });
    }

    for stage in stages
        .iter()
        .filter(|s| s.delay_rate > Decimal::from(STAGE_RECOMMENDATION_RATE))
    {
        recommendations.push(Recommendation {
            category: RecommendationCategory::Efficiency,
            priority: RecommendationPriority::Medium,
            title: format!("High Delay Rate in {}", stage.stage),
            description: format!("The {} stage has a {}% delay rate.", stage.stage, stage.delay_rate),
            action: format!(
                "Optimize the {} process and allocate adequate resources to it.",
                stage.stage
            ),
        });
    }

    if summary.delayed > 0 {
        recommendations.push(Recommendation {
            category: RecommendationCategory::Scheduling,
            priority: RecommendationPriority::High,
            title: "Delayed Productions".to_string(),
            description: format!(
                "{} production(s) are past their estimated completion date.",
                summary.delayed
            ),
            action: "Reprioritize delayed productions and review estimated timelines.".to_string(),
        });
    }

    recommendations
}

/// Aggregate a production report over `[start, end]`.
///
/// `productions` should already be restricted to the window; `now` decides
/// which open productions and stages count as delayed.
pub fn build_production_report(
    period: ReportPeriod,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    productions: &[ProductionSnapshot],
    now: DateTime<Utc>,
) -> ProductionReport {
    let refs: Vec<&ProductionSnapshot> = productions.iter().collect();
    let summary = summarize(&refs, now);
    let stage_efficiency = stage_efficiency(&refs, now);
    let bottlenecks = identify_bottlenecks(&refs, &stage_efficiency);
    let recommendations = generate_recommendations(&summary, &stage_efficiency);

    ProductionReport {
        report_info: ReportInfo {
            generated_at: now,
            period,
            start,
            end,
        },
        product_types: product_type_breakdown(&refs),
        resource_utilization: resource_utilization(&refs),
        performance_trends: performance_trends(&refs, start, end),
        capacity_utilization: capacity_utilization(refs.len(), period),
        quality_metrics: quality_metrics(&refs),
        top_performers: fastest_completions(&refs),
        summary,
        stage_efficiency,
        bottlenecks,
        recommendations,
    }
}

impl ProductionReport {
    /// `Metric,Value` rows of the summary block
    pub fn summary_rows(&self) -> Vec<(&'static str, String)> {
        let s = &self.summary;
        vec![
            ("Total Productions", s.total_productions.to_string()),
            ("Completed", s.completed.to_string()),
            ("In Progress", s.in_progress.to_string()),
            ("Delayed", s.delayed.to_string()),
            ("Completion Rate (%)", s.completion_rate.to_string()),
            ("On-Time Delivery Rate (%)", s.on_time_delivery_rate.to_string()),
            ("Average Completion Time (hours)", s.average_completion_time.to_string()),
        ]
    }

    /// Plain-text rendering for saved reports and terminals
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "PRODUCTION REPORT - {}", self.report_info.period.as_str().to_uppercase());
        let _ = writeln!(
            out,
            "Period: {} to {}",
            self.report_info.start.format("%Y-%m-%d"),
            self.report_info.end.format("%Y-%m-%d")
        );
        let _ = writeln!(out, "Generated: {}", self.report_info.generated_at.to_rfc3339());
        let _ = writeln!(out, "{rule}\n");

        let _ = writeln!(out, "SUMMARY");
        let _ = writeln!(out, "{}", "-".repeat(20));
        for (metric, value) in self.summary_rows() {
            let _ = writeln!(out, "{metric}: {value}");
        }

        let _ = writeln!(out, "\nPRODUCT TYPE BREAKDOWN");
        let _ = writeln!(out, "{}", "-".repeat(20));
        for (product_type, stats) in &self.product_types {
            let _ = writeln!(
                out,
                "{}: {} total, {} completed ({}%)",
                product_type.as_str().to_uppercase(),
                stats.total,
                stats.completed,
                stats.completion_rate
            );
        }

        let _ = writeln!(out, "\nSTAGE EFFICIENCY");
        let _ = writeln!(out, "{}", "-".repeat(20));
        for stage in &self.stage_efficiency {
            let _ = writeln!(
                out,
                "{}: {}% completion, {}% delay rate, {}h avg",
                stage.stage, stage.completion_rate, stage.delay_rate, stage.average_duration_hours
            );
        }

        if !self.recommendations.is_empty() {
            let _ = writeln!(out, "\nRECOMMENDATIONS");
            let _ = writeln!(out, "{}", "-".repeat(20));
            for rec in &self.recommendations {
                let priority = match rec.priority {
                    RecommendationPriority::High => "HIGH",
                    RecommendationPriority::Medium => "MEDIUM",
                };
                let _ = writeln!(out, "[{priority}] {}", rec.title);
                let _ = writeln!(out, "  {}", rec.description);
                let _ = writeln!(out, "  Action: {}\n", rec.action);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::production::{plan_stage_logs, StageLogStatus};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn snapshot(status: ProductionStatus, started: DateTime<Utc>, finished: Option<DateTime<Utc>>) -> ProductionSnapshot {
        ProductionSnapshot {
            id: Uuid::new_v4(),
            product_name: "Dining Table".to_string(),
            batch_number: None,
            product_type: ProductType::Table,
            status,
            requires_tracking: true,
            created_at: started,
            production_started_at: Some(started),
            estimated_completion_date: Some(started + Duration::days(14)),
            actual_completion_date: finished,
            resources_used: BTreeMap::new(),
            stages: plan_stage_logs(started),
        }
    }

    #[test]
    fn test_rate_rounds_to_one_decimal() {
        assert_eq!(rate(1, 3).to_string(), "33.3");
        assert_eq!(rate(0, 0), Decimal::ZERO);
    }

    #[test]
    fn test_summary_and_recommendations() {
        let now = at(20, 0);
        let productions = vec![
            snapshot(ProductionStatus::Completed, at(1, 0), Some(at(5, 0))),
            snapshot(ProductionStatus::InProgress, at(2, 0), None),
        ];
        let report = build_production_report(ReportPeriod::Monthly, at(1, 0), at(31, 0), &productions, now);

        assert_eq!(report.summary.total_productions, 2);
        assert_eq!(report.summary.completion_rate, Decimal::from(50));
        assert_eq!(report.summary.delayed, 1);
        assert_eq!(report.summary.average_completion_time, Decimal::from(96));
        assert_eq!(report.summary.on_time_delivery_rate, Decimal::ONE_HUNDRED);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.category == RecommendationCategory::Productivity));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.category == RecommendationCategory::Scheduling));
        assert_eq!(report.capacity_utilization.maximum, 200);
    }

    #[test]
    fn test_stage_delay_bottleneck() {
        let now = at(20, 0);
        let mut p = snapshot(ProductionStatus::InProgress, at(1, 0), None);
        p.stages[0].status = StageLogStatus::InProgress;
        let report = build_production_report(ReportPeriod::Weekly, at(1, 0), at(7, 0), &[p], now);
        // every stage of the single production is past its estimate
        assert!(report.bottlenecks.iter().any(|b| matches!(
            b,
            Bottleneck::StageDelay { severity: Severity::High, .. }
        )));
    }

    #[test]
    fn test_slow_product_type_bottleneck() {
        let p = snapshot(ProductionStatus::Completed, at(1, 0), Some(at(16, 0)));
        let refs = vec![&p];
        let bottlenecks = identify_bottlenecks(&refs, &[]);
        assert_eq!(
            bottlenecks,
            vec![Bottleneck::SlowProductType {
                product_type: ProductType::Table,
                average_completion_hours: Decimal::from(360),
                severity: Severity::Medium,
            }]
        );
    }

    #[test]
    fn test_text_rendering_sections() {
        let report = build_production_report(ReportPeriod::Daily, at(1, 0), at(1, 23), &[], at(2, 0));
        let text = report.render_text();
        assert!(text.contains("PRODUCTION REPORT - DAILY"));
        assert!(text.contains("SUMMARY"));
        assert!(text.contains("STAGE EFFICIENCY"));
        assert_eq!(report.quality_metrics.quality_rate, Decimal::ONE_HUNDRED);
    }
}
