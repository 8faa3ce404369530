use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::quote::{PaymentStatus, QuoteStatus};

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// January 1st of the current year up to now.
    pub fn current_year_to_date(now: DateTime<Utc>) -> Self {
        Self::new(month_start(now.year(), 1), now)
    }

    pub fn current_month(now: DateTime<Utc>) -> Self {
        Self::new(month_start(now.year(), now.month()), now)
    }

    /// The whole previous calendar month.
    pub fn previous_month(now: DateTime<Utc>) -> Self {
        let this_month = month_start(now.year(), now.month());
        let (year, month) = if now.month() == 1 {
            (now.year() - 1, 12)
        } else {
            (now.year(), now.month() - 1)
        };
        Self::new(month_start(year, month), this_month - Duration::milliseconds(1))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Quote filters kept in application state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub date_range: DateRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_rep_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<QuoteStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
}

impl FilterOptions {
    pub fn current_year(now: DateTime<Utc>) -> Self {
        Self {
            date_range: DateRange::current_year_to_date(now),
            sales_rep_id: None,
            status: None,
            company_name: None,
            payment_status: None,
        }
    }

    /// Merge a partial update. `Some(None)` clears a field.
    pub fn merge(&self, patch: FilterPatch) -> Self {
        Self {
            date_range: patch.date_range.unwrap_or(self.date_range),
            sales_rep_id: patch.sales_rep_id.unwrap_or_else(|| self.sales_rep_id.clone()),
            status: patch.status.unwrap_or(self.status),
            company_name: patch.company_name.unwrap_or_else(|| self.company_name.clone()),
            payment_status: patch.payment_status.unwrap_or(self.payment_status),
        }
    }
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self::current_year(Utc::now())
    }
}

/// Partial filter update carried by `Action::SetFilters`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPatch {
    pub date_range: Option<DateRange>,
    pub sales_rep_id: Option<Option<String>>,
    pub status: Option<Option<QuoteStatus>>,
    pub company_name: Option<Option<String>>,
    pub payment_status: Option<Option<PaymentStatus>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn previous_month_wraps_year() {
        let r = DateRange::previous_month(ts(2025, 1, 15));
        assert_eq!(r.start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert!(r.contains(ts(2024, 12, 31)));
        assert!(!r.contains(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn year_to_date_starts_in_january() {
        let now = ts(2025, 6, 10);
        let r = DateRange::current_year_to_date(now);
        assert!(r.contains(ts(2025, 1, 1)));
        assert!(!r.contains(ts(2024, 12, 31)));
        assert!(!r.contains(ts(2025, 6, 11)));
    }

    #[test]
    fn merge_overrides_and_clears() {
        let base = FilterOptions {
            company_name: Some("Acme".to_string()),
            ..FilterOptions::current_year(ts(2025, 6, 10))
        };
        let merged = base.merge(FilterPatch {
            status: Some(Some(QuoteStatus::Billed)),
            company_name: Some(None),
            ..FilterPatch::default()
        });
        assert_eq!(merged.status, Some(QuoteStatus::Billed));
        assert_eq!(merged.company_name, None);
        assert_eq!(merged.date_range, base.date_range);
    }
}
