use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::commission::{compute_commissions, Commissions};
use crate::error::IntegrityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    Billed,
    Collected,
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteStatus::Billed => write!(f, "BILLED"),
            QuoteStatus::Collected => write!(f, "COLLECTED"),
        }
    }
}

impl FromStr for QuoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "billed" => Ok(QuoteStatus::Billed),
            "collected" => Ok(QuoteStatus::Collected),
            _ => Err(format!("unknown quote status '{s}' (use 'billed' or 'collected')")),
        }
    }
}

/// Whether the sales rep commission has been paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "PENDING"),
            PaymentStatus::Paid => write!(f, "PAID"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            _ => Err(format!("unknown payment status '{s}' (use 'pending' or 'paid')")),
        }
    }
}

/// A quote ("devis") on a project.
///
/// Commission amounts are snapshots taken when the quote is created or
/// revised; they are never recomputed from the rates elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: String,
    pub project_id: String,
    pub company_name: String,
    #[serde(rename = "amountHT")]
    pub amount_ht: f64,
    pub status: QuoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<DateTime<Utc>>,
    pub equation_commission_rate: f64,
    pub sales_rep_commission_rate: f64,
    pub equation_commission_amount: f64,
    pub sales_rep_commission_amount: f64,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User-entered fields of a quote, before commissions are computed.
#[derive(Debug, Clone)]
pub struct QuoteDraft {
    pub project_id: String,
    pub company_name: String,
    pub amount_ht: f64,
    pub status: QuoteStatus,
    pub equation_rate: f64,
    pub sales_rep_rate: f64,
    pub notes: Option<String>,
    /// Quote date; defaults to now for new quotes and to the existing
    /// creation date on revision.
    pub date: Option<DateTime<Utc>>,
}

impl Quote {
    pub fn create(draft: QuoteDraft, now: DateTime<Utc>) -> Self {
        let date = draft.date.unwrap_or(now);
        let c = compute_commissions(draft.amount_ht, draft.equation_rate, draft.sales_rep_rate);

        Self {
            id: super::new_id(),
            project_id: draft.project_id,
            company_name: draft.company_name.trim().to_string(),
            amount_ht: draft.amount_ht,
            status: draft.status,
            billing_date: (draft.status == QuoteStatus::Billed).then_some(date),
            collection_date: (draft.status == QuoteStatus::Collected).then_some(date),
            payment_date: None,
            equation_commission_rate: draft.equation_rate,
            sales_rep_commission_rate: draft.sales_rep_rate,
            equation_commission_amount: c.equation_amount,
            sales_rep_commission_amount: c.sales_rep_amount,
            payment_status: PaymentStatus::Pending,
            notes: super::non_blank(draft.notes.as_deref()),
            created_at: date,
            updated_at: now,
        }
    }

    /// Apply an edit. Both commission amounts are recomputed; payment state
    /// and the date belonging to the other status are carried over.
    pub fn revise(&self, draft: QuoteDraft, now: DateTime<Utc>) -> Self {
        let date = draft.date.unwrap_or(self.created_at);
        let c = compute_commissions(draft.amount_ht, draft.equation_rate, draft.sales_rep_rate);

        Self {
            id: self.id.clone(),
            project_id: draft.project_id,
            company_name: draft.company_name.trim().to_string(),
            amount_ht: draft.amount_ht,
            status: draft.status,
            billing_date: if draft.status == QuoteStatus::Billed {
                Some(date)
            } else {
                self.billing_date
            },
            collection_date: if draft.status == QuoteStatus::Collected {
                Some(date)
            } else {
                self.collection_date
            },
            payment_date: self.payment_date,
            equation_commission_rate: draft.equation_rate,
            sales_rep_commission_rate: draft.sales_rep_rate,
            equation_commission_amount: c.equation_amount,
            sales_rep_commission_amount: c.sales_rep_amount,
            payment_status: self.payment_status,
            notes: super::non_blank(draft.notes.as_deref()),
            created_at: date,
            updated_at: now,
        }
    }

    /// The draft that reproduces this quote, used as the base for partial edits.
    pub fn to_draft(&self) -> QuoteDraft {
        QuoteDraft {
            project_id: self.project_id.clone(),
            company_name: self.company_name.clone(),
            amount_ht: self.amount_ht,
            status: self.status,
            equation_rate: self.equation_commission_rate,
            sales_rep_rate: self.sales_rep_commission_rate,
            notes: self.notes.clone(),
            date: None,
        }
    }

    pub fn commissions(&self) -> Commissions {
        Commissions {
            equation_amount: self.equation_commission_amount,
            sales_rep_amount: self.sales_rep_commission_amount,
        }
    }

    /// Name of the first amount or rate that is NaN or infinite. JSON has no
    /// encoding for those, so such a quote cannot be stored.
    pub fn non_finite_field(&self) -> Option<&'static str> {
        [
            ("amountHT", self.amount_ht),
            ("equationCommissionRate", self.equation_commission_rate),
            ("salesRepCommissionRate", self.sales_rep_commission_rate),
            ("equationCommissionAmount", self.equation_commission_amount),
            ("salesRepCommissionAmount", self.sales_rep_commission_amount),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(name, _)| name)
    }

    /// Only collected quotes can have their rep commission paid.
    pub fn can_be_paid(&self) -> bool {
        self.status == QuoteStatus::Collected
    }

    /// Collected and not yet paid out.
    pub fn is_payable(&self) -> bool {
        self.can_be_paid() && self.payment_status == PaymentStatus::Pending
    }

    pub fn mark_paid(&self, now: DateTime<Utc>) -> Result<Self, IntegrityError> {
        if !self.can_be_paid() {
            return Err(IntegrityError::NotPayable(self.id.clone()));
        }
        Ok(Self {
            payment_status: PaymentStatus::Paid,
            payment_date: Some(now),
            updated_at: now,
            ..self.clone()
        })
    }

    pub fn cancel_payment(&self, now: DateTime<Utc>) -> Result<Self, IntegrityError> {
        if self.payment_status != PaymentStatus::Paid {
            return Err(IntegrityError::NotPaid(self.id.clone()));
        }
        Ok(Self {
            payment_status: PaymentStatus::Pending,
            payment_date: None,
            updated_at: now,
            ..self.clone()
        })
    }
}
