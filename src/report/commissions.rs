use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::model::{PaymentStatus, Quote, QuoteStatus};
use crate::state::AppState;

/// Quotes whose rep commission can be paid now.
pub fn payable_commissions(quotes: &[Quote]) -> Vec<&Quote> {
    quotes.iter().filter(|q| q.is_payable()).collect()
}

fn whole_days_since(at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - at).num_days()
}

/// Payable commissions whose quote was collected more than `days` days ago.
pub fn overdue_commissions(quotes: &[Quote], now: DateTime<Utc>, days: i64) -> Vec<&Quote> {
    quotes
        .iter()
        .filter(|q| q.is_payable())
        .filter(|q| q.collection_date.is_some_and(|d| whole_days_since(d, now) > days))
        .collect()
}

/// Billed quotes still not collected more than `days` days after billing.
pub fn overdue_billings(quotes: &[Quote], now: DateTime<Utc>, days: i64) -> Vec<&Quote> {
    quotes
        .iter()
        .filter(|q| q.status == QuoteStatus::Billed)
        .filter(|q| q.billing_date.is_some_and(|d| whole_days_since(d, now) > days))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Moderate,
    Important,
    Critical,
}

impl Severity {
    pub fn of_delay(days: i64) -> Self {
        match days {
            d if d <= 30 => Severity::Moderate,
            d if d <= 45 => Severity::Important,
            _ => Severity::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Moderate => write!(f, "MODERATE"),
            Severity::Important => write!(f, "IMPORTANT"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueQuote {
    pub quote: Quote,
    pub project_name: String,
    pub days_since_billing: i64,
    pub severity: Severity,
}

/// Overdue billings of one sales rep.
#[derive(Debug, Clone, Serialize)]
pub struct OverdueGroup {
    pub sales_rep_id: String,
    pub sales_rep_name: String,
    pub quotes: Vec<OverdueQuote>,
    pub total_amount: f64,
    pub total_equation_commission: f64,
    pub total_sales_rep_commission: f64,
    pub average_days: i64,
}

/// Overdue billings grouped by the sales rep of their project. Quotes whose
/// project has no known rep are left out.
pub fn overdue_by_sales_rep(state: &AppState, now: DateTime<Utc>, days: i64) -> Vec<OverdueGroup> {
    let mut groups: Vec<OverdueGroup> = Vec::new();

    for quote in overdue_billings(&state.quotes, now, days) {
        let Some(rep) = state.sales_rep_for_quote(quote) else {
            continue;
        };
        let project_name = state
            .project(&quote.project_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        let days_since_billing = quote
            .billing_date
            .map(|d| whole_days_since(d, now))
            .unwrap_or_default();

        let idx = match groups.iter().position(|g| g.sales_rep_id == rep.id) {
            Some(idx) => idx,
            None => {
                groups.push(OverdueGroup {
                    sales_rep_id: rep.id.clone(),
                    sales_rep_name: rep.name.clone(),
                    quotes: Vec::new(),
                    total_amount: 0.0,
                    total_equation_commission: 0.0,
                    total_sales_rep_commission: 0.0,
                    average_days: 0,
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[idx];
        group.total_amount += quote.amount_ht;
        group.total_equation_commission += quote.equation_commission_amount;
        group.total_sales_rep_commission += quote.sales_rep_commission_amount;
        group.quotes.push(OverdueQuote {
            quote: quote.clone(),
            project_name,
            days_since_billing,
            severity: Severity::of_delay(days_since_billing),
        });
    }

    for group in &mut groups {
        let total: i64 = group.quotes.iter().map(|q| q.days_since_billing).sum();
        group.average_days = (total as f64 / group.quotes.len() as f64).round() as i64;
    }

    groups
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommissionTab {
    #[default]
    All,
    /// Payable: collected and not yet paid.
    Pending,
    Paid,
}

impl FromStr for CommissionTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(CommissionTab::All),
            "pending" => Ok(CommissionTab::Pending),
            "paid" => Ok(CommissionTab::Paid),
            _ => Err(format!("unknown tab '{s}' (use 'all', 'pending' or 'paid')")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommissionQuery {
    pub tab: CommissionTab,
    pub sales_rep_id: Option<String>,
    pub search: Option<String>,
}

pub const DELETED_PROJECT: &str = "Deleted project";
pub const UNASSIGNED: &str = "Unassigned";

/// One quote joined with its project and sales rep.
#[derive(Debug, Clone, Serialize)]
pub struct CommissionRow {
    pub quote_id: String,
    pub project_name: String,
    pub company_name: String,
    pub sales_rep_name: String,
    pub sales_rep_id: String,
    pub amount_ht: f64,
    pub equation_commission: f64,
    pub sales_rep_commission: f64,
    pub equation_rate: f64,
    pub sales_rep_rate: f64,
    pub status: QuoteStatus,
    pub payment_status: PaymentStatus,
    pub payment_date: Option<DateTime<Utc>>,
    pub can_be_paid: bool,
}

pub fn commission_rows(state: &AppState, query: &CommissionQuery) -> Vec<CommissionRow> {
    let search = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    state
        .quotes
        .iter()
        .map(|quote| {
            let project = state.project(&quote.project_id);
            let rep = state.sales_rep_for_quote(quote);
            CommissionRow {
                quote_id: quote.id.clone(),
                project_name: project.map_or(DELETED_PROJECT.to_string(), |p| p.name.clone()),
                company_name: quote.company_name.clone(),
                sales_rep_name: rep.map_or(UNASSIGNED.to_string(), |r| r.name.clone()),
                sales_rep_id: project.map(|p| p.sales_rep_id.clone()).unwrap_or_default(),
                amount_ht: quote.amount_ht,
                equation_commission: quote.equation_commission_amount,
                sales_rep_commission: quote.sales_rep_commission_amount,
                equation_rate: quote.equation_commission_rate,
                sales_rep_rate: quote.sales_rep_commission_rate,
                status: quote.status,
                payment_status: quote.payment_status,
                payment_date: quote.payment_date,
                can_be_paid: quote.can_be_paid(),
            }
        })
        .filter(|row| match query.tab {
            CommissionTab::All => true,
            CommissionTab::Pending => {
                row.payment_status == PaymentStatus::Pending && row.can_be_paid
            }
            CommissionTab::Paid => row.payment_status == PaymentStatus::Paid,
        })
        .filter(|row| {
            query
                .sales_rep_id
                .as_deref()
                .map_or(true, |id| row.sales_rep_id == id)
        })
        .filter(|row| match &search {
            Some(s) => {
                row.project_name.to_lowercase().contains(s)
                    || row.company_name.to_lowercase().contains(s)
                    || row.sales_rep_name.to_lowercase().contains(s)
            }
            None => true,
        })
        .collect()
}
