//! Referential checks run before an action is dispatched.
//!
//! The reducer never fails; anything that would leave a dangling reference is
//! rejected here so the action is not dispatched at all.

use super::{Action, AppState};
use crate::error::IntegrityError;

pub fn check_delete_project(state: &AppState, project_id: &str) -> Result<(), IntegrityError> {
    let project = state
        .project(project_id)
        .ok_or_else(|| IntegrityError::ProjectNotFound(project_id.to_string()))?;
    if state.quotes.iter().any(|q| q.project_id == project_id) {
        return Err(IntegrityError::ProjectHasQuotes(project.name.clone()));
    }
    Ok(())
}

pub fn check_delete_sales_rep(state: &AppState, rep_id: &str) -> Result<(), IntegrityError> {
    let rep = state
        .sales_rep(rep_id)
        .ok_or_else(|| IntegrityError::SalesRepNotFound(rep_id.to_string()))?;
    if state.projects.iter().any(|p| p.sales_rep_id == rep_id) {
        return Err(IntegrityError::SalesRepHasProjects(rep.name.clone()));
    }
    Ok(())
}

/// Quotes point at companies by name, so the check matches on the name.
pub fn check_delete_company(state: &AppState, company_id: &str) -> Result<(), IntegrityError> {
    let company = state
        .company(company_id)
        .ok_or_else(|| IntegrityError::CompanyNotFound(company_id.to_string()))?;
    if state.quotes.iter().any(|q| q.company_name == company.name) {
        return Err(IntegrityError::CompanyHasQuotes(company.name.clone()));
    }
    Ok(())
}

/// `except_id` is the company being edited, which may keep its own name.
pub fn check_company_name(
    state: &AppState,
    name: &str,
    except_id: Option<&str>,
) -> Result<(), IntegrityError> {
    let taken = state
        .companies
        .iter()
        .any(|c| c.same_name(name) && Some(c.id.as_str()) != except_id);
    if taken {
        return Err(IntegrityError::DuplicateCompany(name.trim().to_string()));
    }
    Ok(())
}

pub fn check(state: &AppState, action: &Action) -> Result<(), IntegrityError> {
    match action {
        Action::DeleteProject(id) => check_delete_project(state, id),
        Action::DeleteSalesRep(id) => check_delete_sales_rep(state, id),
        Action::DeleteCompany(id) => check_delete_company(state, id),
        Action::DeleteQuote(id) => state
            .quote(id)
            .map(|_| ())
            .ok_or_else(|| IntegrityError::QuoteNotFound(id.clone())),
        Action::AddCompany(c) => check_company_name(state, &c.name, None),
        Action::UpdateCompany(c) => check_company_name(state, &c.name, Some(&c.id)),
        Action::AddQuote(q) | Action::UpdateQuote(q) => state
            .project(&q.project_id)
            .map(|_| ())
            .ok_or_else(|| IntegrityError::ProjectNotFound(q.project_id.clone())),
        Action::AddProject(p) | Action::UpdateProject(p) => match p.sales_rep() {
            Some(rep_id) if state.sales_rep(rep_id).is_none() => {
                Err(IntegrityError::SalesRepNotFound(rep_id.to_string()))
            }
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}
