//! Derived figures computed in memory from the quote collections.

mod commissions;
mod dashboard;
mod team;

pub use commissions::{
    commission_rows, overdue_billings, overdue_by_sales_rep, overdue_commissions,
    payable_commissions, CommissionQuery, CommissionRow, CommissionTab, OverdueGroup,
    OverdueQuote, Severity, DELETED_PROJECT, UNASSIGNED,
};
pub use dashboard::{dashboard, monthly_breakdown, Dashboard, MonthBucket, QuoteCounts};
pub use team::{
    commissions_by_project, sales_rep_performance, sales_rep_stats, ProjectCommissions,
    RepPerformance, RepStats,
};

use crate::model::{FilterOptions, Quote};
use crate::state::AppState;

/// Quotes matching the state's filter options. The sales rep filter goes
/// through the quote's project.
pub fn filter_quotes<'a>(state: &'a AppState, filters: &FilterOptions) -> Vec<&'a Quote> {
    state
        .quotes
        .iter()
        .filter(|q| filters.date_range.contains(q.created_at))
        .filter(|q| filters.status.map_or(true, |s| q.status == s))
        .filter(|q| filters.payment_status.map_or(true, |s| q.payment_status == s))
        .filter(|q| {
            filters
                .company_name
                .as_deref()
                .map_or(true, |name| q.company_name == name)
        })
        .filter(|q| match filters.sales_rep_id.as_deref() {
            Some(rep_id) => state
                .project(&q.project_id)
                .is_some_and(|p| p.sales_rep_id == rep_id),
            None => true,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{DateRange, PaymentStatus, Project, QuoteDraft, QuoteStatus};
    use chrono::{DateTime, TimeZone, Utc};

    pub(crate) fn march(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0).unwrap()
    }

    /// A 5 % / 40 % quote on project "p1", created on `day` of March 2025.
    pub(crate) fn quote(
        amount: f64,
        status: QuoteStatus,
        payment: PaymentStatus,
        day: u32,
    ) -> Quote {
        let mut q = Quote::create(
            QuoteDraft {
                project_id: "p1".to_string(),
                company_name: "Acme".to_string(),
                amount_ht: amount,
                status,
                equation_rate: 5.0,
                sales_rep_rate: 40.0,
                notes: None,
                date: Some(march(day)),
            },
            march(day),
        );
        q.payment_status = payment;
        q
    }

    #[test]
    fn filters_combine() {
        let project = Project::new("Villa", "1 rue A", Some("rep-1"), march(1));
        let mut state = AppState::new(march(1));

        let mut a = quote(1_000.0, QuoteStatus::Collected, PaymentStatus::Pending, 5);
        a.project_id = project.id.clone();
        let mut b = quote(2_000.0, QuoteStatus::Billed, PaymentStatus::Pending, 5);
        b.project_id = project.id.clone();
        b.company_name = "Other".to_string();
        let c = quote(3_000.0, QuoteStatus::Collected, PaymentStatus::Pending, 20);
        state.projects.push(project);
        state.quotes.extend([a.clone(), b, c]);

        let filters = FilterOptions {
            date_range: DateRange::new(march(1), march(10)),
            sales_rep_id: Some("rep-1".to_string()),
            status: None,
            company_name: Some("Acme".to_string()),
            payment_status: Some(PaymentStatus::Pending),
        };
        let hits = filter_quotes(&state, &filters);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a.id);
    }
}
