//! Common types used across the platform

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Date range for queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Inclusive range as UTC instants, start of `start` to end of `end`
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (start_of_day(self.start), end_of_day(self.end))
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::seconds(1)
}

/// Reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Daily => "daily",
            ReportPeriod::Weekly => "weekly",
            ReportPeriod::Monthly => "monthly",
            ReportPeriod::Custom => "custom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(ReportPeriod::Daily),
            "weekly" => Some(ReportPeriod::Weekly),
            "monthly" => Some(ReportPeriod::Monthly),
            "custom" => Some(ReportPeriod::Custom),
            _ => None,
        }
    }

    /// Maximum number of productions the workshop can take on in the period
    pub fn capacity(&self) -> usize {
        match self {
            ReportPeriod::Daily | ReportPeriod::Custom => 10,
            ReportPeriod::Weekly => 50,
            ReportPeriod::Monthly => 200,
        }
    }

    /// Calendar window containing `today`: the day, the Monday-based week,
    /// or the month
    pub fn window(&self, today: NaiveDate) -> DateRange {
        match self {
            ReportPeriod::Daily | ReportPeriod::Custom => DateRange {
                start: today,
                end: today,
            },
            ReportPeriod::Weekly => {
                let start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                DateRange {
                    start,
                    end: start + Duration::days(6),
                }
            }
            ReportPeriod::Monthly => {
                let start = today.with_day(1).unwrap_or(today);
                let next_month = if start.month() == 12 {
                    NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
                };
                let end = next_month
                    .map(|d| d - Duration::days(1))
                    .unwrap_or(today);
                DateRange { start, end }
            }
        }
    }
}

/// Output format for generated reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
    #[serde(alias = "text")]
    Txt,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Txt => "txt",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Json => "application/json",
            ReportFormat::Csv => "text/csv",
            ReportFormat::Txt => "text/plain; charset=utf-8",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekly_window_starts_monday() {
        let thursday = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let window = ReportPeriod::Weekly.window(thursday);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn test_monthly_window_handles_december() {
        let day = NaiveDate::from_ymd_opt(2024, 12, 15).unwrap();
        let window = ReportPeriod::Monthly.window(day);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }
}
