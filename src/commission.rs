//! Two-tier commission calculation.
//!
//! The platform ("equation") commission is a percentage of the pre-tax amount.
//! The sales rep commission is a percentage of the platform commission, not of
//! the quote amount.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Commissions {
    pub equation_amount: f64,
    pub sales_rep_amount: f64,
}

/// No rounding and no validation: callers check inputs, display formats output.
pub fn compute_commissions(
    amount_ht: f64,
    equation_rate_pct: f64,
    sales_rep_rate_pct: f64,
) -> Commissions {
    let equation_amount = amount_ht * (equation_rate_pct / 100.0);
    let sales_rep_amount = equation_amount * (sales_rep_rate_pct / 100.0);

    Commissions {
        equation_amount,
        sales_rep_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn rep_commission_compounds_on_platform_commission() {
        let c = compute_commissions(10_000.0, 5.0, 40.0);
        assert!(close(c.equation_amount, 500.0));
        assert!(close(c.sales_rep_amount, 200.0));
    }

    #[test]
    fn zero_rates_give_zero() {
        let c = compute_commissions(12_345.67, 0.0, 40.0);
        assert_eq!(c.equation_amount, 0.0);
        assert_eq!(c.sales_rep_amount, 0.0);
    }

    #[test]
    fn non_negative_for_inputs_in_range() {
        for amount in [0.0, 1.0, 999.99, 250_000.0] {
            for eq in [0.0, 2.5, 5.0, 100.0] {
                for rep in [0.0, 40.0, 100.0] {
                    let c = compute_commissions(amount, eq, rep);
                    assert!(close(c.equation_amount, amount * eq / 100.0));
                    assert!(close(c.sales_rep_amount, c.equation_amount * rep / 100.0));
                    assert!(c.equation_amount >= 0.0 && c.sales_rep_amount >= 0.0);
                }
            }
        }
    }

    #[test]
    fn accepts_negative_inputs_unchanged() {
        let c = compute_commissions(-1000.0, 10.0, 50.0);
        assert!(close(c.equation_amount, -100.0));
        assert!(close(c.sales_rep_amount, -50.0));
    }
}
