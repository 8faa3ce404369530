use chrono::Datelike;
use serde::Serialize;

use crate::model::{PaymentStatus, Quote, QuoteStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuoteCounts {
    pub total: usize,
    pub billed: usize,
    pub collected: usize,
    pub paid: usize,
}

/// Headline figures for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dashboard {
    pub total_ht: f64,
    pub collected_revenue: f64,
    pub pending_revenue: f64,
    /// Platform commissions on collected quotes.
    pub equation_commissions_collected: f64,
    pub sales_rep_commissions_paid: f64,
    /// Rep commissions on collected quotes not yet paid out.
    pub sales_rep_commissions_payable: f64,
    pub quotes_count: QuoteCounts,
    pub average_quote_amount: f64,
    pub average_equation_rate: f64,
}

pub fn dashboard(quotes: &[Quote]) -> Dashboard {
    let total_ht: f64 = quotes.iter().map(|q| q.amount_ht).sum();
    let collected = || quotes.iter().filter(|q| q.status == QuoteStatus::Collected);
    let paid = || quotes.iter().filter(|q| q.payment_status == PaymentStatus::Paid);

    let count = quotes.len();
    let (average_quote_amount, average_equation_rate) = if count > 0 {
        let rates: f64 = quotes.iter().map(|q| q.equation_commission_rate).sum();
        (total_ht / count as f64, rates / count as f64)
    } else {
        (0.0, 0.0)
    };

    Dashboard {
        total_ht,
        collected_revenue: collected().map(|q| q.amount_ht).sum(),
        pending_revenue: quotes
            .iter()
            .filter(|q| q.status == QuoteStatus::Billed)
            .map(|q| q.amount_ht)
            .sum(),
        equation_commissions_collected: collected().map(|q| q.equation_commission_amount).sum(),
        sales_rep_commissions_paid: paid().map(|q| q.sales_rep_commission_amount).sum(),
        sales_rep_commissions_payable: quotes
            .iter()
            .filter(|q| q.is_payable())
            .map(|q| q.sales_rep_commission_amount)
            .sum(),
        quotes_count: QuoteCounts {
            total: count,
            billed: quotes.iter().filter(|q| q.status == QuoteStatus::Billed).count(),
            collected: collected().count(),
            paid: paid().count(),
        },
        average_quote_amount,
        average_equation_rate,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthBucket {
    /// 1..=12
    pub month: u32,
    pub revenue: f64,
    pub collected: f64,
    pub commissions: f64,
}

/// Quotes of `year` bucketed by creation month.
pub fn monthly_breakdown(quotes: &[Quote], year: i32) -> Vec<MonthBucket> {
    let mut buckets: Vec<MonthBucket> = (1..=12)
        .map(|month| MonthBucket {
            month,
            ..MonthBucket::default()
        })
        .collect();

    for q in quotes.iter().filter(|q| q.created_at.year() == year) {
        let bucket = &mut buckets[q.created_at.month0() as usize];
        bucket.revenue += q.amount_ht;
        if q.status == QuoteStatus::Collected {
            bucket.collected += q.amount_ht;
        }
        bucket.commissions += q.equation_commission_amount;
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::quote;

    #[test]
    fn empty_dashboard_is_zero() {
        let d = dashboard(&[]);
        assert_eq!(d, Dashboard::default());
    }

    #[test]
    fn splits_by_status() {
        let quotes = vec![
            quote(10_000.0, QuoteStatus::Collected, PaymentStatus::Paid, 10),
            quote(4_000.0, QuoteStatus::Collected, PaymentStatus::Pending, 10),
            quote(6_000.0, QuoteStatus::Billed, PaymentStatus::Pending, 10),
        ];
        let d = dashboard(&quotes);
        assert_eq!(d.total_ht, 20_000.0);
        assert_eq!(d.collected_revenue, 14_000.0);
        assert_eq!(d.pending_revenue, 6_000.0);
        assert_eq!(d.equation_commissions_collected, 700.0);
        assert_eq!(d.sales_rep_commissions_paid, 200.0);
        assert_eq!(d.sales_rep_commissions_payable, 80.0);
        assert_eq!(
            d.quotes_count,
            QuoteCounts {
                total: 3,
                billed: 1,
                collected: 2,
                paid: 1
            }
        );
        assert!((d.average_quote_amount - 20_000.0 / 3.0).abs() < 1e-9);
        assert_eq!(d.average_equation_rate, 5.0);
    }

    #[test]
    fn billed_quotes_are_never_payable_even_when_marked_paid() {
        let quotes = vec![quote(6_000.0, QuoteStatus::Billed, PaymentStatus::Paid, 10)];
        assert_eq!(dashboard(&quotes).sales_rep_commissions_payable, 0.0);
    }

    #[test]
    fn buckets_by_creation_month() {
        let quotes = vec![
            quote(1_000.0, QuoteStatus::Collected, PaymentStatus::Pending, 10),
            quote(2_000.0, QuoteStatus::Billed, PaymentStatus::Pending, 10),
        ];
        let months = monthly_breakdown(&quotes, 2025);
        assert_eq!(months.len(), 12);
        let march = &months[2];
        assert_eq!(march.month, 3);
        assert_eq!(march.revenue, 3_000.0);
        assert_eq!(march.collected, 1_000.0);
        assert_eq!(march.commissions, 150.0);
        assert!(monthly_breakdown(&quotes, 2024).iter().all(|m| m.revenue == 0.0));
    }
}
