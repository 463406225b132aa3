//! Credit usage analytics.
//!
//! Builds the usage dashboard numbers from the ledger's spend entries:
//! window total, per-category breakdown, a zero-filled daily series and a
//! burn-rate projection.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tillwise_core::ActionKey;

use super::cost_table::CostCategory;

/// One credit spend from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub action_key: ActionKey,
    pub category: CostCategory,
    pub credits: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Credits spent in one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: CostCategory,
    pub credits: u64,
}

/// Credits spent on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub credits: u64,
}

/// Usage summary over a trailing window of days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    /// Days covered, including today.
    pub window_days: u32,
    /// Credits spent in the window.
    pub total_credits: u64,
    /// Per-category totals, largest first.
    pub by_category: Vec<CategoryTotal>,
    /// One entry per day in the window, oldest first.
    pub daily: Vec<DailyUsage>,
    /// Average credits per day, rounded to 2 places.
    pub average_daily_burn: Decimal,
    /// Whole days until `balance` runs out at the average burn.
    pub projected_days_remaining: Option<u64>,
}

impl UsageReport {
    /// Summarize `entries` over the `window_days` days ending today.
    ///
    /// Entries outside the window (or in the future) are ignored. A window
    /// of zero days is treated as one.
    #[must_use]
    pub fn build(entries: &[UsageEntry], window_days: u32, now: DateTime<Utc>, balance: i64) -> Self {
        let window_days = window_days.max(1);
        let today = now.date_naive();
        let start = today
            .checked_sub_days(Days::new(u64::from(window_days - 1)))
            .unwrap_or(NaiveDate::MIN);

        let mut daily: BTreeMap<NaiveDate, u64> = start
            .iter_days()
            .take_while(|d| *d <= today)
            .map(|d| (d, 0))
            .collect();
        let mut categories: HashMap<CostCategory, u64> = HashMap::new();
        let mut total_credits = 0_u64;

        for entry in entries.iter().filter(|e| e.occurred_at <= now) {
            let Some(day) = daily.get_mut(&entry.occurred_at.date_naive()) else {
                continue;
            };
            let credits = u64::from(entry.credits);
            *day += credits;
            *categories.entry(entry.category).or_default() += credits;
            total_credits += credits;
        }

        let mut by_category: Vec<CategoryTotal> = categories
            .into_iter()
            .map(|(category, credits)| CategoryTotal { category, credits })
            .collect();
        by_category.sort_by(|a, b| b.credits.cmp(&a.credits).then(a.category.cmp(&b.category)));

        let burn = Decimal::from(total_credits) / Decimal::from(window_days);
        let projected_days_remaining = if total_credits == 0 {
            None
        } else if balance <= 0 {
            Some(0)
        } else {
            (Decimal::from(balance) / burn).floor().to_u64()
        };

        Self {
            window_days,
            total_credits,
            by_category,
            daily: daily
                .into_iter()
                .map(|(date, credits)| DailyUsage { date, credits })
                .collect(),
            average_daily_burn: burn.round_dp(2),
            projected_days_remaining,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn entry(action: &str, category: CostCategory, credits: u32, at: DateTime<Utc>) -> UsageEntry {
        UsageEntry {
            action_key: ActionKey::parse(action).unwrap(),
            category,
            credits,
            occurred_at: at,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_report_totals_and_series() {
        let now = now();
        let entries = vec![
            entry("pos_sale", CostCategory::Pos, 1, now - Duration::hours(1)),
            entry("pos_sale", CostCategory::Pos, 1, now - Duration::days(1)),
            entry("export_report", CostCategory::Reports, 5, now - Duration::days(2)),
            entry("export_report", CostCategory::Reports, 5, now - Duration::days(30)),
        ];

        let report = UsageReport::build(&entries, 7, now, 21);

        assert_eq!(report.total_credits, 7);
        assert_eq!(report.daily.len(), 7);
        assert_eq!(report.daily.first().unwrap().date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(report.daily.last().unwrap().credits, 1);
        assert_eq!(report.daily.iter().filter(|d| d.credits == 0).count(), 4);

        assert_eq!(report.by_category[0].category, CostCategory::Reports);
        assert_eq!(report.by_category[0].credits, 5);
        assert_eq!(report.by_category[1].credits, 2);

        assert_eq!(report.average_daily_burn, Decimal::ONE);
        assert_eq!(report.projected_days_remaining, Some(21));
    }

    #[test]
    fn test_no_usage_has_no_projection() {
        let report = UsageReport::build(&[], 30, now(), 100);
        assert_eq!(report.total_credits, 0);
        assert_eq!(report.daily.len(), 30);
        assert_eq!(report.projected_days_remaining, None);
    }

    #[test]
    fn test_future_entries_ignored() {
        let now = now();
        let entries = vec![entry("pos_sale", CostCategory::Pos, 3, now + Duration::minutes(5))];
        assert_eq!(UsageReport::build(&entries, 1, now, 10).total_credits, 0);
    }

    #[test]
    fn test_empty_balance_projects_zero_days() {
        let now = now();
        let entries = vec![entry("pos_sale", CostCategory::Pos, 2, now)];
        assert_eq!(UsageReport::build(&entries, 1, now, 0).projected_days_remaining, Some(0));
    }
}
