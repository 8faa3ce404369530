mod company;
mod filters;
mod project;
mod quote;
mod sales_rep;

pub use company::Company;
pub use filters::{DateRange, FilterOptions, FilterPatch};
pub use project::Project;
pub use quote::{PaymentStatus, Quote, QuoteDraft, QuoteStatus};
pub use sales_rep::SalesRep;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Trimmed value, or None when blank.
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
