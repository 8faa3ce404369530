use serde::Serialize;

use crate::model::{DateRange, PaymentStatus, Project, Quote};
use crate::state::AppState;

fn quotes_of_rep<'a>(state: &'a AppState, rep_id: &'a str) -> impl Iterator<Item = &'a Quote> + 'a {
    state
        .quotes
        .iter()
        .filter(move |q| state.project(&q.project_id).is_some_and(|p| p.sales_rep_id == rep_id))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepPerformance {
    pub sales_rep_id: String,
    pub name: String,
    pub revenue: f64,
    pub commissions: f64,
    pub projects: usize,
    pub quotes: usize,
}

/// All-time figures per sales rep, best revenue first.
pub fn sales_rep_performance(state: &AppState) -> Vec<RepPerformance> {
    let mut rows: Vec<RepPerformance> = state
        .sales_reps
        .iter()
        .map(|rep| {
            let quotes: Vec<&Quote> = quotes_of_rep(state, &rep.id).collect();
            RepPerformance {
                sales_rep_id: rep.id.clone(),
                name: rep.name.clone(),
                revenue: quotes.iter().map(|q| q.amount_ht).sum(),
                commissions: quotes.iter().map(|q| q.sales_rep_commission_amount).sum(),
                projects: state.projects.iter().filter(|p| p.sales_rep_id == rep.id).count(),
                quotes: quotes.len(),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    rows
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepStats {
    pub projects_count: usize,
    pub quotes_count: usize,
    pub total_amount: f64,
    pub total_equation_commissions: f64,
    pub total_sales_rep_commissions: f64,
    pub paid_commissions: f64,
    /// Collected and unpaid only; billed quotes are not owed yet.
    pub pending_commissions: f64,
}

/// Figures for one rep over quotes created within `range`.
pub fn sales_rep_stats(state: &AppState, rep_id: &str, range: &DateRange) -> RepStats {
    let quotes: Vec<&Quote> = quotes_of_rep(state, rep_id)
        .filter(|q| range.contains(q.created_at))
        .collect();

    RepStats {
        projects_count: state.projects.iter().filter(|p| p.sales_rep_id == rep_id).count(),
        quotes_count: quotes.len(),
        total_amount: quotes.iter().map(|q| q.amount_ht).sum(),
        total_equation_commissions: quotes.iter().map(|q| q.equation_commission_amount).sum(),
        total_sales_rep_commissions: quotes.iter().map(|q| q.sales_rep_commission_amount).sum(),
        paid_commissions: quotes
            .iter()
            .filter(|q| q.payment_status == PaymentStatus::Paid)
            .map(|q| q.sales_rep_commission_amount)
            .sum(),
        pending_commissions: quotes
            .iter()
            .filter(|q| q.is_payable())
            .map(|q| q.sales_rep_commission_amount)
            .sum(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectCommissions<'a> {
    pub project: &'a Project,
    pub quotes: Vec<&'a Quote>,
    pub total_amount: f64,
    pub total_commissions: f64,
    pub paid_commissions: f64,
    pub pending_commissions: f64,
}

/// Rep commissions broken down by project, within `range`.
pub fn commissions_by_project<'a>(
    state: &'a AppState,
    rep_id: &str,
    range: &DateRange,
) -> Vec<ProjectCommissions<'a>> {
    state
        .projects
        .iter()
        .filter(|p| p.sales_rep_id == rep_id)
        .map(|project| {
            let quotes: Vec<&Quote> = state
                .quotes
                .iter()
                .filter(|q| q.project_id == project.id && range.contains(q.created_at))
                .collect();
            ProjectCommissions {
                project,
                total_amount: quotes.iter().map(|q| q.amount_ht).sum(),
                total_commissions: quotes.iter().map(|q| q.sales_rep_commission_amount).sum(),
                paid_commissions: quotes
                    .iter()
                    .filter(|q| q.payment_status == PaymentStatus::Paid)
                    .map(|q| q.sales_rep_commission_amount)
                    .sum(),
                pending_commissions: quotes
                    .iter()
                    .filter(|q| q.is_payable())
                    .map(|q| q.sales_rep_commission_amount)
                    .sum(),
                quotes,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuoteStatus, SalesRep};
    use crate::report::tests::{march, quote};

    fn team() -> (AppState, SalesRep, SalesRep) {
        let alice = SalesRep::new("Alice", None, None, march(1));
        let bruno = SalesRep::new("Bruno", None, None, march(1));
        let pa = Project::new("Villa", "1 rue A", Some(&alice.id), march(1));
        let pb = Project::new("Loft", "2 rue B", Some(&bruno.id), march(1));

        let mut state = AppState::new(march(1));
        state.sales_reps.extend([alice.clone(), bruno.clone()]);

        for (amount, status, payment, project) in [
            (10_000.0, QuoteStatus::Collected, PaymentStatus::Paid, &pa),
            (5_000.0, QuoteStatus::Collected, PaymentStatus::Pending, &pa),
            (8_000.0, QuoteStatus::Billed, PaymentStatus::Pending, &pa),
            (30_000.0, QuoteStatus::Billed, PaymentStatus::Pending, &pb),
        ] {
            let mut q = quote(amount, status, payment, 10);
            q.project_id = project.id.clone();
            state.quotes.push(q);
        }
        state.projects.extend([pa, pb]);
        (state, alice, bruno)
    }

    #[test]
    fn performance_sorted_by_revenue() {
        let (state, alice, bruno) = team();
        let perf = sales_rep_performance(&state);
        assert_eq!(perf[0].sales_rep_id, bruno.id);
        assert_eq!(perf[1].sales_rep_id, alice.id);
        assert_eq!(perf[1].revenue, 23_000.0);
        assert_eq!(perf[1].quotes, 3);
        assert_eq!(perf[1].projects, 1);
    }

    #[test]
    fn pending_excludes_billed_quotes() {
        let (state, alice, _) = team();
        let range = DateRange::new(march(1), march(31));
        let stats = sales_rep_stats(&state, &alice.id, &range);
        assert_eq!(stats.quotes_count, 3);
        assert_eq!(stats.paid_commissions, 200.0);
        assert_eq!(stats.pending_commissions, 100.0);
        assert!((stats.total_sales_rep_commissions - 460.0).abs() < 1e-9);
    }

    #[test]
    fn range_limits_quotes() {
        let (state, alice, _) = team();
        let range = DateRange::new(march(11), march(31));
        let stats = sales_rep_stats(&state, &alice.id, &range);
        assert_eq!(stats.quotes_count, 0);
        assert_eq!(stats.projects_count, 1);
    }

    #[test]
    fn breakdown_per_project() {
        let (state, alice, _) = team();
        let range = DateRange::new(march(1), march(31));
        let rows = commissions_by_project(&state, &alice.id, &range);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quotes.len(), 3);
        assert_eq!(rows[0].total_amount, 23_000.0);
        assert_eq!(rows[0].pending_commissions, 100.0);
    }
}
