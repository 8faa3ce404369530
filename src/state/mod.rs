//! Application state and the single transition function that mutates it.

pub mod guard;

use chrono::{DateTime, Utc};

use crate::backup::BackupEnvelope;
use crate::model::{Company, FilterOptions, FilterPatch, Project, Quote, SalesRep};

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub projects: Vec<Project>,
    pub quotes: Vec<Quote>,
    pub sales_reps: Vec<SalesRep>,
    pub companies: Vec<Company>,
    pub filters: FilterOptions,
    pub selected_project: Option<Project>,
    pub selected_quote: Option<Quote>,
    pub last_modified: DateTime<Utc>,
}

impl AppState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            projects: Vec::new(),
            quotes: Vec::new(),
            sales_reps: Vec::new(),
            companies: Vec::new(),
            filters: FilterOptions::current_year(now),
            selected_project: None,
            selected_quote: None,
            last_modified: now,
        }
    }

    /// True when at least one collection is non-empty.
    pub fn has_data(&self) -> bool {
        !self.projects.is_empty()
            || !self.quotes.is_empty()
            || !self.sales_reps.is_empty()
            || !self.companies.is_empty()
    }

    /// First quote holding a NaN or infinite number, with the field name.
    pub fn non_finite_quote(&self) -> Option<(&Quote, &'static str)> {
        self.quotes
            .iter()
            .find_map(|q| q.non_finite_field().map(|field| (q, field)))
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn quote(&self, id: &str) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.id == id)
    }

    pub fn sales_rep(&self, id: &str) -> Option<&SalesRep> {
        self.sales_reps.iter().find(|s| s.id == id)
    }

    pub fn company(&self, id: &str) -> Option<&Company> {
        self.companies.iter().find(|c| c.id == id)
    }

    /// Sales rep owning the quote's project, if any.
    pub fn sales_rep_for_quote(&self, quote: &Quote) -> Option<&SalesRep> {
        self.project(&quote.project_id)
            .and_then(|p| p.sales_rep())
            .and_then(|id| self.sales_rep(id))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    AddProject(Project),
    UpdateProject(Project),
    /// Also removes every quote of the project.
    DeleteProject(String),
    AddQuote(Quote),
    UpdateQuote(Quote),
    DeleteQuote(String),
    AddSalesRep(SalesRep),
    UpdateSalesRep(SalesRep),
    DeleteSalesRep(String),
    AddCompany(Company),
    UpdateCompany(Company),
    DeleteCompany(String),
    SetFilters(FilterPatch),
    SelectProject(Option<Project>),
    SelectQuote(Option<Quote>),
    RestoreBackup(BackupEnvelope),
    ClearAllData,
    /// State arriving from the remote store, applied as-is.
    LoadFromDatabase(Box<AppState>),
    ForceSave,
}

impl Action {
    /// Whether the action is a local change that must eventually be written
    /// back to the remote store.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Action::SelectProject(_)
                | Action::SelectQuote(_)
                | Action::LoadFromDatabase(_)
                | Action::ForceSave
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::AddProject(_) => "ADD_PROJECT",
            Action::UpdateProject(_) => "UPDATE_PROJECT",
            Action::DeleteProject(_) => "DELETE_PROJECT",
            Action::AddQuote(_) => "ADD_QUOTE",
            Action::UpdateQuote(_) => "UPDATE_QUOTE",
            Action::DeleteQuote(_) => "DELETE_QUOTE",
            Action::AddSalesRep(_) => "ADD_SALES_REP",
            Action::UpdateSalesRep(_) => "UPDATE_SALES_REP",
            Action::DeleteSalesRep(_) => "DELETE_SALES_REP",
            Action::AddCompany(_) => "ADD_COMPANY",
            Action::UpdateCompany(_) => "UPDATE_COMPANY",
            Action::DeleteCompany(_) => "DELETE_COMPANY",
            Action::SetFilters(_) => "SET_FILTERS",
            Action::SelectProject(_) => "SELECT_PROJECT",
            Action::SelectQuote(_) => "SELECT_QUOTE",
            Action::RestoreBackup(_) => "RESTORE_BACKUP",
            Action::ClearAllData => "CLEAR_ALL_DATA",
            Action::LoadFromDatabase(_) => "LOAD_FROM_DATABASE",
            Action::ForceSave => "FORCE_SAVE",
        }
    }
}

fn replace_by_id<T: Clone>(items: Vec<T>, updated: T, id_of: impl Fn(&T) -> &str) -> Vec<T> {
    let id = id_of(&updated).to_string();
    items
        .into_iter()
        .map(|item| if id_of(&item) == id { updated.clone() } else { item })
        .collect()
}

pub fn reduce(state: AppState, action: Action) -> AppState {
    reduce_at(state, action, Utc::now())
}

/// `reduce` with an explicit clock for `last_modified`.
pub fn reduce_at(state: AppState, action: Action, now: DateTime<Utc>) -> AppState {
    let mut next = match action {
        Action::LoadFromDatabase(loaded) => return *loaded,
        Action::SelectProject(project) => {
            return AppState {
                selected_project: project,
                ..state
            }
        }
        Action::SelectQuote(quote) => {
            return AppState {
                selected_quote: quote,
                ..state
            }
        }
        Action::ForceSave => return state,

        Action::AddProject(project) => {
            let mut state = state;
            state.projects.push(project);
            state
        }
        Action::UpdateProject(project) => AppState {
            projects: replace_by_id(state.projects, project, |p| p.id.as_str()),
            ..state
        },
        Action::DeleteProject(id) => AppState {
            projects: state.projects.into_iter().filter(|p| p.id != id).collect(),
            quotes: state.quotes.into_iter().filter(|q| q.project_id != id).collect(),
            ..state
        },

        Action::AddQuote(quote) => {
            let mut state = state;
            state.quotes.push(quote);
            state
        }
        Action::UpdateQuote(quote) => AppState {
            quotes: replace_by_id(state.quotes, quote, |q| q.id.as_str()),
            ..state
        },
        Action::DeleteQuote(id) => AppState {
            quotes: state.quotes.into_iter().filter(|q| q.id != id).collect(),
            ..state
        },

        Action::AddSalesRep(rep) => {
            let mut state = state;
            state.sales_reps.push(rep);
            state
        }
        Action::UpdateSalesRep(rep) => AppState {
            sales_reps: replace_by_id(state.sales_reps, rep, |s| s.id.as_str()),
            ..state
        },
        Action::DeleteSalesRep(id) => AppState {
            sales_reps: state.sales_reps.into_iter().filter(|s| s.id != id).collect(),
            ..state
        },

        Action::AddCompany(company) => {
            let mut state = state;
            state.companies.push(company);
            state
        }
        Action::UpdateCompany(company) => AppState {
            companies: replace_by_id(state.companies, company, |c| c.id.as_str()),
            ..state
        },
        Action::DeleteCompany(id) => AppState {
            companies: state.companies.into_iter().filter(|c| c.id != id).collect(),
            ..state
        },

        Action::SetFilters(patch) => AppState {
            filters: state.filters.merge(patch),
            ..state
        },
        Action::RestoreBackup(backup) => AppState {
            projects: backup.data.projects,
            quotes: backup.data.quotes,
            sales_reps: backup.data.sales_reps,
            companies: backup.data.companies,
            ..state
        },
        Action::ClearAllData => AppState {
            projects: Vec::new(),
            quotes: Vec::new(),
            sales_reps: Vec::new(),
            companies: Vec::new(),
            selected_project: None,
            selected_quote: None,
            ..state
        },
    };

    next.last_modified = now;
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup;
    use crate::model::{QuoteDraft, QuoteStatus};
    use chrono::TimeZone;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 10, minute, 0).unwrap()
    }

    fn quote_for(project_id: &str) -> Quote {
        Quote::create(
            QuoteDraft {
                project_id: project_id.to_string(),
                company_name: "Acme".to_string(),
                amount_ht: 1000.0,
                status: QuoteStatus::Billed,
                equation_rate: 5.0,
                sales_rep_rate: 40.0,
                notes: None,
                date: None,
            },
            t(0),
        )
    }

    #[test]
    fn delete_project_cascades_to_quotes() {
        let p1 = Project::new("Villa", "1 rue A", None, t(0));
        let p2 = Project::new("Loft", "2 rue B", None, t(0));
        let q1 = quote_for(&p1.id);
        let q2 = quote_for(&p2.id);

        let s = AppState::new(t(0));
        let s = reduce_at(s, Action::AddProject(p1.clone()), t(1));
        let s = reduce_at(s, Action::AddProject(p2.clone()), t(1));
        let s = reduce_at(s, Action::AddQuote(q1), t(2));
        let s = reduce_at(s, Action::AddQuote(q2.clone()), t(2));
        let s = reduce_at(s, Action::DeleteProject(p1.id.clone()), t(3));

        assert_eq!(s.projects, vec![p2]);
        assert_eq!(s.quotes, vec![q2]);
        assert_eq!(s.last_modified, t(3));
    }

    #[test]
    fn add_quote_then_delete_project_leaves_nothing() {
        let p1 = Project::new("Villa", "1 rue A", None, t(0));
        let q1 = quote_for(&p1.id);
        let s = reduce_at(AppState::new(t(0)), Action::AddProject(p1.clone()), t(1));
        let s = reduce_at(s, Action::AddQuote(q1), t(2));
        let s = reduce_at(s, Action::DeleteProject(p1.id), t(3));
        assert!(s.projects.is_empty());
        assert!(s.quotes.is_empty());
    }

    #[test]
    fn selection_does_not_touch_last_modified() {
        let p = Project::new("Villa", "1 rue A", None, t(0));
        let s = reduce_at(AppState::new(t(0)), Action::AddProject(p.clone()), t(1));
        let s = reduce_at(s, Action::SelectProject(Some(p.clone())), t(9));
        assert_eq!(s.selected_project, Some(p));
        assert_eq!(s.last_modified, t(1));
        assert!(!Action::SelectQuote(None).is_mutation());
    }

    #[test]
    fn update_replaces_matching_id_only() {
        let p = Project::new("Villa", "1 rue A", None, t(0));
        let other = Project::new("Loft", "2 rue B", None, t(0));
        let s = reduce_at(AppState::new(t(0)), Action::AddProject(p.clone()), t(1));
        let s = reduce_at(s, Action::AddProject(other.clone()), t(1));
        let renamed = Project {
            name: "Villa Rose".to_string(),
            ..p
        };
        let s = reduce_at(s, Action::UpdateProject(renamed.clone()), t(2));
        assert_eq!(s.projects, vec![renamed, other]);
    }

    #[test]
    fn load_from_database_is_applied_verbatim_and_idempotent() {
        let mut loaded = AppState::new(t(0));
        loaded.projects.push(Project::new("Villa", "1 rue A", None, t(0)));
        loaded.last_modified = t(7);

        let once = reduce_at(
            AppState::new(t(1)),
            Action::LoadFromDatabase(Box::new(loaded.clone())),
            t(30),
        );
        let twice = reduce_at(
            once.clone(),
            Action::LoadFromDatabase(Box::new(loaded.clone())),
            t(31),
        );
        assert_eq!(once, loaded);
        assert_eq!(twice, once);
        assert!(!Action::LoadFromDatabase(Box::new(loaded)).is_mutation());
    }

    #[test]
    fn restore_backup_replaces_collections_and_keeps_selection() {
        let p = Project::new("Villa", "1 rue A", None, t(0));
        let s = reduce_at(AppState::new(t(0)), Action::AddProject(p.clone()), t(1));
        let s = reduce_at(s, Action::SelectProject(Some(p)), t(1));

        let mut source = AppState::new(t(0));
        source.sales_reps.push(SalesRep::new("Jeanne", None, None, t(0)));
        let envelope = backup::encode(&source, t(2));

        let s = reduce_at(s, Action::RestoreBackup(envelope), t(3));
        assert!(s.projects.is_empty());
        assert_eq!(s.sales_reps, source.sales_reps);
        assert!(s.selected_project.is_some());
        assert_eq!(s.last_modified, t(3));
    }

    #[test]
    fn clear_all_data_empties_everything() {
        let p = Project::new("Villa", "1 rue A", None, t(0));
        let s = reduce_at(AppState::new(t(0)), Action::AddProject(p.clone()), t(1));
        let s = reduce_at(s, Action::SelectProject(Some(p)), t(1));
        let s = reduce_at(s, Action::ClearAllData, t(2));
        assert!(!s.has_data());
        assert!(s.selected_project.is_none());
        assert_eq!(s.last_modified, t(2));
    }

    #[test]
    fn force_save_changes_nothing() {
        let s = AppState::new(t(0));
        assert_eq!(reduce_at(s.clone(), Action::ForceSave, t(5)), s);
    }

    #[test]
    fn set_filters_counts_as_mutation() {
        let patch = FilterPatch {
            status: Some(Some(QuoteStatus::Collected)),
            ..FilterPatch::default()
        };
        assert!(Action::SetFilters(patch.clone()).is_mutation());
        let s = reduce_at(AppState::new(t(0)), Action::SetFilters(patch), t(4));
        assert_eq!(s.filters.status, Some(QuoteStatus::Collected));
        assert_eq!(s.last_modified, t(4));
    }
}
