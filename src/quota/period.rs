//! Billing period arithmetic (UTC).

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Timelike, Utc};

use crate::config::PeriodKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    kind: PeriodKind,
}

impl BillingPeriod {
    pub fn new(kind: PeriodKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> PeriodKind {
        self.kind
    }

    /// Counter key for the period containing `now`, e.g. `2026-10`,
    /// `2026-10-19` or `2026-10-19T14`.
    pub fn period_key(&self, now: DateTime<Utc>) -> String {
        match self.kind {
            PeriodKind::Monthly => now.format("%Y-%m").to_string(),
            PeriodKind::Daily => now.format("%Y-%m-%d").to_string(),
            PeriodKind::Hourly => now.format("%Y-%m-%dT%H").to_string(),
        }
    }

    /// First instant of the next period.
    pub fn period_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = now.date_naive();
        let end = match self.kind {
            PeriodKind::Monthly => {
                let (year, month) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
            }
            PeriodKind::Daily => date.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)),
            PeriodKind::Hourly => date
                .and_hms_opt(now.hour(), 0, 0)
                .map(|start| start + TimeDelta::hours(1)),
        };

        // Only unreachable at the edge of chrono's date range.
        end.map(|naive| naive.and_utc())
            .unwrap_or(now + TimeDelta::days(1))
    }
}
