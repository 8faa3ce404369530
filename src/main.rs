use chrono::{DateTime, Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use crm::config::{config_dir, init_config_dir, load_config, Backend, Config};
use crm::error::{CrmError, IntegrityError, Result};
use crm::model::{
    Company, DateRange, FilterOptions, FilterPatch, PaymentStatus, Project, Quote, QuoteDraft,
    QuoteStatus, SalesRep,
};
use crm::report::{
    commission_rows, commissions_by_project, dashboard, filter_quotes, monthly_breakdown,
    overdue_by_sales_rep, overdue_commissions, sales_rep_performance, sales_rep_stats,
    CommissionQuery, CommissionTab, Severity, DELETED_PROJECT,
};
use crm::state::{Action, AppState};
use crm::sync::{Gateway, StartupOutcome, SyncService};
use crm::{backup, init_tracing};

#[derive(Parser)]
#[command(name = "crm")]
#[command(version, about = "Construction CRM: projects, quotes and commissions", long_about = None)]
struct Cli {
    /// Path to config directory (default: ~/.crm or XDG config)
    #[arg(short = 'C', long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory with a template config.toml
    Init,

    /// Show connection, sync status and record counts
    Status,

    /// Show revenue and commission totals for the active filters
    Dashboard {
        /// Preset date range (default: year)
        #[arg(long, value_enum, conflicts_with_all = ["from", "to"])]
        period: Option<Period>,

        /// Start of a custom date range (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<String>,

        /// End of a custom date range, inclusive (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<String>,

        /// Only projects of this sales rep (index, id or name)
        #[arg(long)]
        rep: Option<String>,

        /// Only quotes for this company
        #[arg(long)]
        company: Option<String>,

        /// Only quotes with this status (billed, collected)
        #[arg(long)]
        status: Option<QuoteStatus>,

        /// Only quotes whose commission is pending or paid
        #[arg(long)]
        payment: Option<PaymentStatus>,

        /// Reset filters to the current year with no other criteria
        #[arg(long)]
        reset: bool,
    },

    /// Manage construction projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage quotes
    #[command(subcommand)]
    Quote(QuoteCommand),

    /// Manage sales reps
    #[command(subcommand)]
    Rep(RepCommand),

    /// Manage client companies
    #[command(subcommand)]
    Company(CompanyCommand),

    /// List sales rep commissions
    Commissions {
        /// Which commissions to show: all, pending (payable) or paid
        #[arg(long, default_value = "all")]
        tab: CommissionTab,

        /// Only this sales rep (index, id or name)
        #[arg(long)]
        rep: Option<String>,

        /// Match project, company or sales rep name
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Mark the sales rep commission of a collected quote as paid
    MarkPaid {
        /// Quote index from 'quote list', or id
        quote: String,
    },

    /// Undo a commission payment
    CancelPayment {
        /// Quote index from 'quote list', or id
        quote: String,
    },

    /// Show commissions and billings that have been waiting too long
    Overdue {
        /// Days after collection or billing (default: commission.overdue_days)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Sales rep performance, or one rep's figures with --rep
    Team {
        /// Show one sales rep in detail (index, id or name)
        #[arg(long)]
        rep: Option<String>,

        /// Date range for the detailed view
        #[arg(long, value_enum, default_value = "year")]
        period: Period,
    },

    /// Month by month revenue and commissions
    Monthly {
        /// Year to show (default: current year)
        #[arg(long)]
        year: Option<i32>,
    },

    /// Export or import a JSON backup
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Push the current data to the remote store and report the sync status
    Sync,

    /// Delete every project, quote, sales rep and company
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Add a project
    Add {
        name: String,

        #[arg(short, long)]
        address: String,

        /// Sales rep in charge (index, id or name)
        #[arg(long)]
        rep: Option<String>,
    },

    /// Change a project's details
    Edit {
        /// Project index from 'project list', id or name
        project: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        address: Option<String>,

        /// Sales rep in charge (index, id or name)
        #[arg(long, conflicts_with = "unassign")]
        rep: Option<String>,

        /// Remove the sales rep
        #[arg(long)]
        unassign: bool,
    },

    /// List projects
    List,

    /// Delete a project that has no quotes
    Delete {
        /// Project index from 'project list', id or name
        project: String,
    },
}

#[derive(Subcommand)]
enum QuoteCommand {
    /// Add a quote and compute its commissions
    Add {
        /// Project (index, id or name)
        #[arg(short, long)]
        project: String,

        /// Client company name
        #[arg(short, long)]
        company: String,

        /// Amount excluding tax
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,

        #[arg(long, default_value = "billed")]
        status: QuoteStatus,

        /// Quote date (default: today)
        #[arg(long)]
        date: Option<String>,

        /// Platform commission in %, 0 to 100 (default: commission.equation_rate)
        #[arg(long, allow_negative_numbers = true)]
        equation_rate: Option<f64>,

        /// Sales rep share of the platform commission in %, 0 to 100
        /// (default: commission.sales_rep_rate)
        #[arg(long, allow_negative_numbers = true)]
        rep_rate: Option<f64>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Change a quote; commissions are recomputed
    Edit {
        /// Quote index from 'quote list', or id
        quote: String,

        #[arg(short, long)]
        project: Option<String>,

        #[arg(short, long)]
        company: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        amount: Option<f64>,

        #[arg(long)]
        status: Option<QuoteStatus>,

        #[arg(long)]
        date: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        equation_rate: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        rep_rate: Option<f64>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List quotes, newest first
    List {
        /// Only quotes of this project (index, id or name)
        #[arg(short, long)]
        project: Option<String>,

        /// Only projects of this sales rep (index, id or name)
        #[arg(long)]
        rep: Option<String>,

        #[arg(long)]
        status: Option<QuoteStatus>,

        /// Match company, project or sales rep name
        #[arg(short, long)]
        search: Option<String>,

        /// Created on or after (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Created on or before (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },

    /// Delete a quote
    Delete {
        /// Quote index from 'quote list', or id
        quote: String,
    },
}

#[derive(Subcommand)]
enum RepCommand {
    /// Add a sales rep
    Add {
        name: String,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },

    /// List sales reps
    List,

    /// Delete a sales rep with no assigned projects
    Delete {
        /// Sales rep index from 'rep list', id or name
        rep: String,
    },
}

#[derive(Subcommand)]
enum CompanyCommand {
    /// Add a client company
    Add {
        name: String,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(short, long)]
        address: Option<String>,
    },

    /// List client companies
    List,

    /// Delete a company that no quote refers to
    Delete {
        /// Company index from 'company list', id or name
        company: String,
    },
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Write all data to a JSON file
    Export {
        /// Output file (default: ./crm-backup-YYYY-MM-DD.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace all data with the content of a backup file
    Import {
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Period {
    /// January 1st until now
    Year,
    /// Current month until now
    Month,
    /// The whole previous month
    PreviousMonth,
}

impl Period {
    fn range(self, now: DateTime<Utc>) -> DateRange {
        match self {
            Period::Year => DateRange::current_year_to_date(now),
            Period::Month => DateRange::current_month(now),
            Period::PreviousMonth => DateRange::previous_month(now),
        }
    }
}

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Determine config directory
    let cfg_dir = match cli.config_dir {
        Some(p) => p,
        None => config_dir()?,
    };

    if let Commands::Init = cli.command {
        return cmd_init(&cfg_dir);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_session(cli.command, &cfg_dir))
}

async fn run_session(command: Commands, cfg_dir: &Path) -> Result<()> {
    let session = Session::open(cfg_dir).await?;

    let result = match command {
        Commands::Init => Ok(()),
        Commands::Status => cmd_status(&session).await,
        Commands::Dashboard {
            period,
            from,
            to,
            rep,
            company,
            status,
            payment,
            reset,
        } => {
            let range = match (period, from, to) {
                (None, Some(from), Some(to)) => {
                    DateRange::new(parse_date(&from)?, end_of_day(parse_date(&to)?))
                }
                (period, _, _) => period.unwrap_or(Period::Year).range(Utc::now()),
            };
            let rep_id = rep
                .map(|r| find_rep(&session.service.state(), &r).map(|s| s.id.clone()))
                .transpose()?;
            let patch = if reset {
                FilterPatch {
                    date_range: Some(DateRange::current_year_to_date(Utc::now())),
                    sales_rep_id: Some(None),
                    status: Some(None),
                    company_name: Some(None),
                    payment_status: Some(None),
                }
            } else {
                FilterPatch {
                    date_range: None,
                    sales_rep_id: rep_id.map(Some),
                    status: status.map(Some),
                    company_name: company.map(Some),
                    payment_status: payment.map(Some),
                }
            };
            cmd_dashboard(&session, range, patch).await
        }
        Commands::Project(cmd) => cmd_project(&session, cmd).await,
        Commands::Quote(cmd) => cmd_quote(&session, cmd).await,
        Commands::Rep(cmd) => cmd_rep(&session, cmd).await,
        Commands::Company(cmd) => cmd_company(&session, cmd).await,
        Commands::Commissions { tab, rep, search } => {
            cmd_commissions(&session, tab, rep, search)
        }
        Commands::MarkPaid { quote } => cmd_payment(&session, &quote, true).await,
        Commands::CancelPayment { quote } => cmd_payment(&session, &quote, false).await,
        Commands::Overdue { days } => cmd_overdue(&session, days),
        Commands::Team { rep, period } => cmd_team(&session, rep, period),
        Commands::Monthly { year } => cmd_monthly(&session, year),
        Commands::Backup(BackupCommand::Export { output }) => cmd_backup_export(&session, output),
        Commands::Backup(BackupCommand::Import { file }) => {
            cmd_backup_import(&session, &file).await
        }
        Commands::Sync => cmd_sync(&session).await,
        Commands::Clear { yes } => cmd_clear(&session, yes).await,
    };

    session.close().await;
    result
}

/// A connected service for the duration of one command.
struct Session {
    cfg_dir: PathBuf,
    config: Config,
    service: SyncService,
    outcome: StartupOutcome,
}

impl Session {
    async fn open(cfg_dir: &Path) -> Result<Self> {
        if !cfg_dir.exists() {
            return Err(CrmError::ConfigNotFound(cfg_dir.to_path_buf()));
        }
        let config = load_config(cfg_dir)?;
        let store = config.build_store(cfg_dir)?;
        let service = SyncService::new(Gateway::new(store), config.sync_settings());
        let outcome = service.startup().await;
        if let StartupOutcome::Failed(msg) = &outcome {
            eprintln!("Warning: could not read the shared data: {msg}");
        }

        Ok(Self {
            cfg_dir: cfg_dir.to_path_buf(),
            config,
            service,
            outcome,
        })
    }

    /// Writing is refused unless the remote copy was read successfully, so an
    /// empty local state never replaces shared data.
    fn writable(&self) -> Result<()> {
        match &self.outcome {
            StartupOutcome::Loaded | StartupOutcome::Empty => Ok(()),
            StartupOutcome::Unreachable => Err(CrmError::Offline),
            StartupOutcome::Failed(msg) => Err(CrmError::LoadFailed(msg.clone())),
        }
    }

    /// Validate, apply and save one change.
    async fn commit(&self, action: Action) -> Result<()> {
        self.writable()?;
        self.service.try_dispatch(action)?;
        self.service.force_save().await?;
        Ok(())
    }

    async fn close(self) {
        if self.writable().is_ok() {
            self.service.shutdown().await;
        }
    }
}

/// Initialize config directory with template files
fn cmd_init(cfg_dir: &Path) -> Result<()> {
    let path = init_config_dir(cfg_dir)?;

    println!("Initialized crm config at: {}", cfg_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Point it at the shared store:  $EDITOR {}", path.display());
    println!("  2. Check the connection:          crm status");
    println!();
    println!("Then add your first project:");
    println!("  crm project add <name> --address <address>");

    Ok(())
}

// Table row structs for tabled
#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ADDRESS")]
    address: String,
    #[tabled(rename = "SALES REP")]
    sales_rep: String,
    #[tabled(rename = "QUOTES")]
    quotes: usize,
    #[tabled(rename = "TOTAL HT")]
    total: String,
}

#[derive(Tabled)]
struct QuoteRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "DATE")]
    date: String,
    #[tabled(rename = "PROJECT")]
    project: String,
    #[tabled(rename = "COMPANY")]
    company: String,
    #[tabled(rename = "AMOUNT HT")]
    amount: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PLATFORM")]
    equation: String,
    #[tabled(rename = "REP")]
    sales_rep: String,
    #[tabled(rename = "PAYMENT")]
    payment: String,
}

#[derive(Tabled)]
struct ContactRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "EMAIL")]
    email: String,
    #[tabled(rename = "PHONE")]
    phone: String,
    #[tabled(rename = "IN USE")]
    used_by: usize,
}

#[derive(Tabled)]
struct CommissionLine {
    #[tabled(rename = "QUOTE")]
    quote: String,
    #[tabled(rename = "PROJECT")]
    project: String,
    #[tabled(rename = "COMPANY")]
    company: String,
    #[tabled(rename = "SALES REP")]
    sales_rep: String,
    #[tabled(rename = "AMOUNT HT")]
    amount: String,
    #[tabled(rename = "COMMISSION")]
    commission: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PAYMENT")]
    payment: String,
}

#[derive(Tabled)]
struct OverdueLine {
    #[tabled(rename = "QUOTE")]
    quote: String,
    #[tabled(rename = "PROJECT")]
    project: String,
    #[tabled(rename = "COMPANY")]
    company: String,
    #[tabled(rename = "SINCE")]
    since: String,
    #[tabled(rename = "DAYS")]
    days: i64,
    #[tabled(rename = "SEVERITY")]
    severity: String,
    #[tabled(rename = "COMMISSION")]
    commission: String,
}

#[derive(Tabled)]
struct TeamLine {
    #[tabled(rename = "SALES REP")]
    name: String,
    #[tabled(rename = "PROJECTS")]
    projects: usize,
    #[tabled(rename = "QUOTES")]
    quotes: usize,
    #[tabled(rename = "REVENUE HT")]
    revenue: String,
    #[tabled(rename = "COMMISSIONS")]
    commissions: String,
}

#[derive(Tabled)]
struct ProjectCommissionLine {
    #[tabled(rename = "PROJECT")]
    project: String,
    #[tabled(rename = "QUOTES")]
    quotes: usize,
    #[tabled(rename = "AMOUNT HT")]
    amount: String,
    #[tabled(rename = "COMMISSIONS")]
    commissions: String,
    #[tabled(rename = "PAID")]
    paid: String,
    #[tabled(rename = "PENDING")]
    pending: String,
}

#[derive(Tabled)]
struct MonthLine {
    #[tabled(rename = "MONTH")]
    month: String,
    #[tabled(rename = "REVENUE HT")]
    revenue: String,
    #[tabled(rename = "COLLECTED")]
    collected: String,
    #[tabled(rename = "PLATFORM")]
    commissions: String,
}

fn print_table<T: Tabled>(rows: Vec<T>) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");
}

/// Amount with grouped thousands and cents, e.g. "12,345.50 €".
fn format_money(value: f64) -> String {
    let cents = (value * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{sign}{}.{:02} €", format_grouped_int(cents / 100), cents % 100)
}

fn format_grouped_int(value: i64) -> String {
    let negative = value < 0;
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let mut grouped: String = out.chars().rev().collect();
    if negative {
        grouped.insert(0, '-');
    }
    grouped
}

fn format_rate(value: f64) -> String {
    format!("{}%", (value * 100.0).round() / 100.0)
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| CrmError::InvalidDate(s.to_string()))
}

fn end_of_day(start: DateTime<Utc>) -> DateTime<Utc> {
    start + chrono::Duration::days(1) - chrono::Duration::milliseconds(1)
}

fn positive_amount(amount: f64) -> Result<f64> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(CrmError::InvalidAmount(amount.to_string()))
    }
}

/// A commission percentage. JSON cannot carry NaN or infinity, so those
/// must never reach the shared document.
fn percentage(rate: f64) -> Result<f64> {
    if rate.is_finite() && (0.0..=100.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(CrmError::InvalidRate(rate.to_string()))
    }
}

fn required(value: &str, field: &'static str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CrmError::MissingField(field));
    }
    Ok(value.to_string())
}

/// Look up an item by its 1-based position in a newest-first listing, its
/// id, a unique id prefix, or a unique case-insensitive name.
fn resolve<'a, T>(
    items: &'a [T],
    reference: &str,
    id_of: impl Fn(&T) -> &str,
    name_of: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    if let Ok(idx) = reference.parse::<usize>() {
        if (1..=items.len()).contains(&idx) {
            return items.get(items.len() - idx);
        }
    }
    if let Some(exact) = items.iter().find(|i| id_of(i) == reference) {
        return Some(exact);
    }

    let unique = |mut hits: Vec<&'a T>| if hits.len() == 1 { hits.pop() } else { None };
    unique(items.iter().filter(|i| id_of(i).starts_with(reference)).collect()).or_else(|| {
        unique(
            items
                .iter()
                .filter(|i| name_of(i).eq_ignore_ascii_case(reference))
                .collect(),
        )
    })
}

fn find_project<'a>(state: &'a AppState, reference: &str) -> Result<&'a Project> {
    resolve(&state.projects, reference, |p| p.id.as_str(), |p| p.name.as_str())
        .ok_or_else(|| IntegrityError::ProjectNotFound(reference.to_string()).into())
}

fn find_quote<'a>(state: &'a AppState, reference: &str) -> Result<&'a Quote> {
    resolve(&state.quotes, reference, |q| q.id.as_str(), |_| "")
        .ok_or_else(|| IntegrityError::QuoteNotFound(reference.to_string()).into())
}

fn find_rep<'a>(state: &'a AppState, reference: &str) -> Result<&'a SalesRep> {
    resolve(&state.sales_reps, reference, |s| s.id.as_str(), |s| s.name.as_str())
        .ok_or_else(|| IntegrityError::SalesRepNotFound(reference.to_string()).into())
}

fn find_company<'a>(state: &'a AppState, reference: &str) -> Result<&'a Company> {
    resolve(&state.companies, reference, |c| c.id.as_str(), |c| c.name.as_str())
        .ok_or_else(|| IntegrityError::CompanyNotFound(reference.to_string()).into())
}

fn project_name(state: &AppState, quote: &Quote) -> String {
    state
        .project(&quote.project_id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| DELETED_PROJECT.to_string())
}

/// Show connection and sync status
async fn cmd_status(session: &Session) -> Result<()> {
    let config = &session.config;
    let state = session.service.state();

    println!("CRM Status");
    println!("{}", "-".repeat(50));
    println!("Config directory: {}", session.cfg_dir.display());
    match config.remote.backend {
        Backend::Rest => println!(
            "Remote store:     {} (table {})",
            config.remote.url.as_deref().unwrap_or("-"),
            config.remote.table
        ),
        Backend::File => println!(
            "Remote store:     {}",
            config.store_path(&session.cfg_dir).display()
        ),
    }
    let connection = match &session.outcome {
        StartupOutcome::Loaded => "online, shared data loaded".to_string(),
        StartupOutcome::Empty => "online, no shared data yet".to_string(),
        StartupOutcome::Unreachable => "unreachable".to_string(),
        StartupOutcome::Failed(msg) => format!("online, unreadable data: {msg}"),
    };
    println!("Connection:       {connection}");

    let status = session.service.sync_status();
    println!("Sync:             {}", status.state);
    if let Some(at) = status.last_sync {
        println!("Last sync:        {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if state.has_data() {
        println!("Last modified:    {}", state.last_modified.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();
    println!("Projects:         {}", state.projects.len());
    println!("Quotes:           {}", state.quotes.len());
    println!("Sales reps:       {}", state.sales_reps.len());
    println!("Companies:        {}", state.companies.len());

    Ok(())
}

/// The date range always comes from the command line; the other criteria
/// are stored in the shared filters and persist between runs.
async fn cmd_dashboard(session: &Session, range: DateRange, patch: FilterPatch) -> Result<()> {
    let mut filters: FilterOptions = if patch == FilterPatch::default() {
        session.service.read(|s| s.filters.clone())
    } else if session.writable().is_ok() {
        session.commit(Action::SetFilters(patch)).await?;
        session.service.read(|s| s.filters.clone())
    } else {
        session.service.read(|s| s.filters.merge(patch))
    };
    filters.date_range = range;

    let state = session.service.state();
    let quotes: Vec<Quote> = filter_quotes(&state, &filters).into_iter().cloned().collect();
    let d = dashboard(&quotes);

    let mut criteria = vec![format!(
        "{} to {}",
        format_date(filters.date_range.start),
        format_date(filters.date_range.end)
    )];
    if let Some(rep) = filters.sales_rep_id.as_deref() {
        let name = state.sales_rep(rep).map_or(rep, |s| s.name.as_str());
        criteria.push(format!("rep {name}"));
    }
    if let Some(company) = &filters.company_name {
        criteria.push(format!("company {company}"));
    }
    if let Some(status) = filters.status {
        criteria.push(status.to_string());
    }
    if let Some(payment) = filters.payment_status {
        criteria.push(format!("commission {payment}"));
    }

    println!("Dashboard ({})", criteria.join(", "));
    println!("{}", "-".repeat(50));
    println!("Total HT:                   {}", format_money(d.total_ht));
    println!("Collected:                  {}", format_money(d.collected_revenue));
    println!("Billed, not collected:      {}", format_money(d.pending_revenue));
    println!("Platform commissions:       {}", format_money(d.equation_commissions_collected));
    println!("Rep commissions paid:       {}", format_money(d.sales_rep_commissions_paid));
    println!("Rep commissions payable:    {}", format_money(d.sales_rep_commissions_payable));
    println!();
    println!(
        "Quotes:                     {} ({} billed, {} collected, {} paid)",
        d.quotes_count.total, d.quotes_count.billed, d.quotes_count.collected, d.quotes_count.paid
    );
    println!("Average quote:              {}", format_money(d.average_quote_amount));
    println!("Average platform rate:      {}", format_rate(d.average_equation_rate));

    Ok(())
}

async fn cmd_project(session: &Session, cmd: ProjectCommand) -> Result<()> {
    let state = session.service.state();
    let now = Utc::now();

    match cmd {
        ProjectCommand::Add { name, address, rep } => {
            let rep_id = rep.map(|r| find_rep(&state, &r).map(|s| s.id.clone())).transpose()?;
            let project = Project::new(
                &required(&name, "Project name")?,
                &required(&address, "Address")?,
                rep_id.as_deref(),
                now,
            );
            let id = project.id.clone();
            session.commit(Action::AddProject(project)).await?;
            println!("Added project {} ({})", name.trim(), short_id(&id));
        }
        ProjectCommand::Edit {
            project,
            name,
            address,
            rep,
            unassign,
        } => {
            let current = find_project(&state, &project)?;
            let sales_rep_id = match (rep, unassign) {
                (_, true) => String::new(),
                (Some(r), false) => find_rep(&state, &r)?.id.clone(),
                (None, false) => current.sales_rep_id.clone(),
            };
            let updated = Project {
                name: match name {
                    Some(n) => required(&n, "Project name")?,
                    None => current.name.clone(),
                },
                address: match address {
                    Some(a) => required(&a, "Address")?,
                    None => current.address.clone(),
                },
                sales_rep_id,
                updated_at: now,
                ..current.clone()
            };
            let label = updated.name.clone();
            session.commit(Action::UpdateProject(updated)).await?;
            println!("Updated project {label}");
        }
        ProjectCommand::List => {
            if state.projects.is_empty() {
                println!("No projects yet.");
                println!("Add one with: crm project add <name> --address <address>");
                return Ok(());
            }
            let rows: Vec<ProjectRow> = state
                .projects
                .iter()
                .rev()
                .enumerate()
                .map(|(i, p)| {
                    let quotes: Vec<&Quote> =
                        state.quotes.iter().filter(|q| q.project_id == p.id).collect();
                    ProjectRow {
                        index: i + 1,
                        id: short_id(&p.id).to_string(),
                        name: p.name.clone(),
                        address: p.address.clone(),
                        sales_rep: p
                            .sales_rep()
                            .and_then(|id| state.sales_rep(id))
                            .map_or_else(|| "-".to_string(), |s| s.name.clone()),
                        quotes: quotes.len(),
                        total: format_money(quotes.iter().map(|q| q.amount_ht).sum()),
                    }
                })
                .collect();
            print_table(rows);
        }
        ProjectCommand::Delete { project } => {
            let target = find_project(&state, &project)?;
            let name = target.name.clone();
            session.commit(Action::DeleteProject(target.id.clone())).await?;
            println!("Deleted project {name}");
        }
    }

    Ok(())
}

async fn cmd_quote(session: &Session, cmd: QuoteCommand) -> Result<()> {
    let state = session.service.state();
    let rates = session.config.commission;
    let now = Utc::now();

    match cmd {
        QuoteCommand::Add {
            project,
            company,
            amount,
            status,
            date,
            equation_rate,
            rep_rate,
            notes,
        } => {
            let project = find_project(&state, &project)?;
            let draft = QuoteDraft {
                project_id: project.id.clone(),
                company_name: required(&company, "Company name")?,
                amount_ht: positive_amount(amount)?,
                status,
                equation_rate: percentage(equation_rate.unwrap_or(rates.equation_rate))?,
                sales_rep_rate: percentage(rep_rate.unwrap_or(rates.sales_rep_rate))?,
                notes,
                date: date.as_deref().map(parse_date).transpose()?,
            };
            let quote = Quote::create(draft, now);
            let summary = quote_summary(&quote);
            session.commit(Action::AddQuote(quote)).await?;
            println!("Added quote {summary}");
        }
        QuoteCommand::Edit {
            quote,
            project,
            company,
            amount,
            status,
            date,
            equation_rate,
            rep_rate,
            notes,
        } => {
            let current = find_quote(&state, &quote)?;
            let mut draft = current.to_draft();
            if let Some(p) = project {
                draft.project_id = find_project(&state, &p)?.id.clone();
            }
            if let Some(c) = company {
                draft.company_name = required(&c, "Company name")?;
            }
            if let Some(a) = amount {
                draft.amount_ht = positive_amount(a)?;
            }
            if let Some(s) = status {
                draft.status = s;
            }
            if let Some(r) = equation_rate {
                draft.equation_rate = percentage(r)?;
            }
            if let Some(r) = rep_rate {
                draft.sales_rep_rate = percentage(r)?;
            }
            if notes.is_some() {
                draft.notes = notes;
            }
            draft.date = date.as_deref().map(parse_date).transpose()?;

            let revised = current.revise(draft, now);
            let summary = quote_summary(&revised);
            session.commit(Action::UpdateQuote(revised)).await?;
            println!("Updated quote {summary}");
        }
        QuoteCommand::List {
            project,
            rep,
            status,
            search,
            from,
            to,
        } => {
            let project_id = project
                .map(|p| find_project(&state, &p).map(|p| p.id.clone()))
                .transpose()?;
            let rep_id = rep.map(|r| find_rep(&state, &r).map(|s| s.id.clone())).transpose()?;
            let from = from.as_deref().map(parse_date).transpose()?;
            let to = to.as_deref().map(parse_date).transpose()?.map(end_of_day);
            let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());

            let rows: Vec<QuoteRow> = state
                .quotes
                .iter()
                .rev()
                .enumerate()
                .filter(|(_, q)| project_id.as_ref().map_or(true, |id| &q.project_id == id))
                .filter(|(_, q)| status.map_or(true, |s| q.status == s))
                .filter(|(_, q)| from.map_or(true, |f| q.created_at >= f))
                .filter(|(_, q)| to.map_or(true, |t| q.created_at <= t))
                .filter(|(_, q)| {
                    rep_id.as_deref().map_or(true, |id| {
                        state.project(&q.project_id).is_some_and(|p| p.sales_rep_id == id)
                    })
                })
                .filter(|(_, q)| {
                    needle.as_deref().map_or(true, |n| {
                        q.company_name.to_lowercase().contains(n)
                            || state
                                .project(&q.project_id)
                                .is_some_and(|p| p.name.to_lowercase().contains(n))
                            || state
                                .sales_rep_for_quote(q)
                                .is_some_and(|s| s.name.to_lowercase().contains(n))
                    })
                })
                .map(|(i, q)| QuoteRow {
                    index: i + 1,
                    id: short_id(&q.id).to_string(),
                    date: format_date(q.created_at),
                    project: project_name(&state, q),
                    company: q.company_name.clone(),
                    amount: format_money(q.amount_ht),
                    status: q.status.to_string(),
                    equation: format_money(q.equation_commission_amount),
                    sales_rep: format_money(q.sales_rep_commission_amount),
                    payment: q.payment_status.to_string(),
                })
                .collect();

            if rows.is_empty() {
                println!("No quotes found.");
                return Ok(());
            }
            let total = rows.len();
            print_table(rows);
            println!();
            println!("Total: {total} quotes");
        }
        QuoteCommand::Delete { quote } => {
            let target = find_quote(&state, &quote)?;
            let id = target.id.clone();
            session.commit(Action::DeleteQuote(id.clone())).await?;
            println!("Deleted quote {}", short_id(&id));
        }
    }

    Ok(())
}

fn quote_summary(quote: &Quote) -> String {
    let c = quote.commissions();
    format!(
        "{} for {}: {} HT ({}), platform commission {}, sales rep commission {}",
        short_id(&quote.id),
        quote.company_name,
        format_money(quote.amount_ht),
        quote.status,
        format_money(c.equation_amount),
        format_money(c.sales_rep_amount),
    )
}

async fn cmd_rep(session: &Session, cmd: RepCommand) -> Result<()> {
    let state = session.service.state();

    match cmd {
        RepCommand::Add { name, email, phone } => {
            let rep = SalesRep::new(
                &required(&name, "Sales rep name")?,
                email.as_deref(),
                phone.as_deref(),
                Utc::now(),
            );
            let id = rep.id.clone();
            session.commit(Action::AddSalesRep(rep)).await?;
            println!("Added sales rep {} ({})", name.trim(), short_id(&id));
        }
        RepCommand::List => {
            if state.sales_reps.is_empty() {
                println!("No sales reps yet.");
                return Ok(());
            }
            let rows: Vec<ContactRow> = state
                .sales_reps
                .iter()
                .rev()
                .enumerate()
                .map(|(i, s)| ContactRow {
                    index: i + 1,
                    id: short_id(&s.id).to_string(),
                    name: s.name.clone(),
                    email: s.email.clone().unwrap_or_default(),
                    phone: s.phone.clone().unwrap_or_default(),
                    used_by: state.projects.iter().filter(|p| p.sales_rep_id == s.id).count(),
                })
                .collect();
            print_table(rows);
        }
        RepCommand::Delete { rep } => {
            let target = find_rep(&state, &rep)?;
            let name = target.name.clone();
            session.commit(Action::DeleteSalesRep(target.id.clone())).await?;
            println!("Deleted sales rep {name}");
        }
    }

    Ok(())
}

async fn cmd_company(session: &Session, cmd: CompanyCommand) -> Result<()> {
    let state = session.service.state();

    match cmd {
        CompanyCommand::Add {
            name,
            email,
            phone,
            address,
        } => {
            let company = Company::new(
                &required(&name, "Company name")?,
                email.as_deref(),
                phone.as_deref(),
                address.as_deref(),
                Utc::now(),
            );
            session.commit(Action::AddCompany(company)).await?;
            println!("Added company {}", name.trim());
        }
        CompanyCommand::List => {
            if state.companies.is_empty() {
                println!("No companies yet.");
                return Ok(());
            }
            let rows: Vec<ContactRow> = state
                .companies
                .iter()
                .rev()
                .enumerate()
                .map(|(i, c)| ContactRow {
                    index: i + 1,
                    id: short_id(&c.id).to_string(),
                    name: c.name.clone(),
                    email: c.email.clone().unwrap_or_default(),
                    phone: c.phone.clone().unwrap_or_default(),
                    used_by: state.quotes.iter().filter(|q| q.company_name == c.name).count(),
                })
                .collect();
            print_table(rows);
        }
        CompanyCommand::Delete { company } => {
            let target = find_company(&state, &company)?;
            let name = target.name.clone();
            session.commit(Action::DeleteCompany(target.id.clone())).await?;
            println!("Deleted company {name}");
        }
    }

    Ok(())
}

fn cmd_commissions(
    session: &Session,
    tab: CommissionTab,
    rep: Option<String>,
    search: Option<String>,
) -> Result<()> {
    let state = session.service.state();
    let query = CommissionQuery {
        tab,
        sales_rep_id: rep.map(|r| find_rep(&state, &r).map(|s| s.id.clone())).transpose()?,
        search,
    };
    let rows = commission_rows(&state, &query);
    if rows.is_empty() {
        println!("No commissions found.");
        return Ok(());
    }

    let payable: f64 = rows
        .iter()
        .filter(|r| r.can_be_paid && r.payment_status == PaymentStatus::Pending)
        .map(|r| r.sales_rep_commission)
        .sum();
    let paid: f64 = rows
        .iter()
        .filter(|r| r.payment_status == PaymentStatus::Paid)
        .map(|r| r.sales_rep_commission)
        .sum();
    let total = rows.len();

    let lines: Vec<CommissionLine> = rows
        .into_iter()
        .map(|r| CommissionLine {
            quote: short_id(&r.quote_id).to_string(),
            project: r.project_name,
            company: r.company_name,
            sales_rep: r.sales_rep_name,
            amount: format_money(r.amount_ht),
            commission: format!(
                "{} ({})",
                format_money(r.sales_rep_commission),
                format_rate(r.sales_rep_rate)
            ),
            status: r.status.to_string(),
            payment: match (r.payment_status, r.payment_date) {
                (PaymentStatus::Paid, Some(at)) => format!("PAID {}", format_date(at)),
                (status, _) if r.can_be_paid => status.to_string(),
                _ => "-".to_string(),
            },
        })
        .collect();
    print_table(lines);

    println!();
    println!("Total: {total} quotes");
    println!("Payable now: {}", format_money(payable));
    println!("Paid:        {}", format_money(paid));

    Ok(())
}

async fn cmd_payment(session: &Session, reference: &str, pay: bool) -> Result<()> {
    let state = session.service.state();
    let quote = find_quote(&state, reference)?;
    let now = Utc::now();
    let updated = if pay {
        quote.mark_paid(now)?
    } else {
        quote.cancel_payment(now)?
    };
    let amount = format_money(updated.sales_rep_commission_amount);
    let id = short_id(&updated.id).to_string();
    session.commit(Action::UpdateQuote(updated)).await?;

    if pay {
        println!("Marked commission of quote {id} as paid ({amount})");
    } else {
        println!("Cancelled commission payment of quote {id} ({amount})");
    }
    Ok(())
}

fn cmd_overdue(session: &Session, days: Option<i64>) -> Result<()> {
    let state = session.service.state();
    let days = days.unwrap_or(session.config.commission.overdue_days);
    let now = Utc::now();

    let commissions = overdue_commissions(&state.quotes, now, days);
    if commissions.is_empty() {
        println!("No commission unpaid for more than {days} days after collection.");
    } else {
        println!("Commissions unpaid {days} days after collection:");
        let lines: Vec<OverdueLine> = commissions
            .into_iter()
            .map(|q| {
                let waited = q.collection_date.map_or(0, |c| (now - c).num_days());
                OverdueLine {
                    quote: short_id(&q.id).to_string(),
                    project: project_name(&state, q),
                    company: q.company_name.clone(),
                    since: q.collection_date.map(format_date).unwrap_or_default(),
                    days: waited,
                    severity: Severity::of_delay(waited).to_string(),
                    commission: format_money(q.sales_rep_commission_amount),
                }
            })
            .collect();
        print_table(lines);
    }

    let groups = overdue_by_sales_rep(&state, now, days);
    for group in groups {
        println!();
        println!(
            "{}: {} quotes billed but not collected, {} HT, {} days on average",
            group.sales_rep_name,
            group.quotes.len(),
            format_money(group.total_amount),
            group.average_days
        );
        let lines: Vec<OverdueLine> = group
            .quotes
            .into_iter()
            .map(|o| OverdueLine {
                quote: short_id(&o.quote.id).to_string(),
                project: o.project_name,
                since: o.quote.billing_date.map(format_date).unwrap_or_default(),
                company: o.quote.company_name,
                days: o.days_since_billing,
                severity: o.severity.to_string(),
                commission: format_money(o.quote.sales_rep_commission_amount),
            })
            .collect();
        print_table(lines);
    }

    Ok(())
}

fn cmd_team(session: &Session, rep: Option<String>, period: Period) -> Result<()> {
    let state = session.service.state();

    let Some(reference) = rep else {
        let performance = sales_rep_performance(&state);
        if performance.is_empty() {
            println!("No sales reps yet.");
            return Ok(());
        }
        let lines: Vec<TeamLine> = performance
            .into_iter()
            .map(|p| TeamLine {
                name: p.name,
                projects: p.projects,
                quotes: p.quotes,
                revenue: format_money(p.revenue),
                commissions: format_money(p.commissions),
            })
            .collect();
        print_table(lines);
        return Ok(());
    };

    let rep = find_rep(&state, &reference)?;
    let range = period.range(Utc::now());
    let stats = sales_rep_stats(&state, &rep.id, &range);

    println!(
        "{} ({} to {})",
        rep.name,
        format_date(range.start),
        format_date(range.end)
    );
    println!("{}", "-".repeat(50));
    println!("Projects:              {}", stats.projects_count);
    println!("Quotes:                {}", stats.quotes_count);
    println!("Amount HT:             {}", format_money(stats.total_amount));
    println!("Platform commissions:  {}", format_money(stats.total_equation_commissions));
    println!("Rep commissions:       {}", format_money(stats.total_sales_rep_commissions));
    println!("  paid:                {}", format_money(stats.paid_commissions));
    println!("  payable:             {}", format_money(stats.pending_commissions));

    let by_project = commissions_by_project(&state, &rep.id, &range);
    if !by_project.is_empty() {
        println!();
        let lines: Vec<ProjectCommissionLine> = by_project
            .into_iter()
            .map(|p| ProjectCommissionLine {
                project: p.project.name.clone(),
                quotes: p.quotes.len(),
                amount: format_money(p.total_amount),
                commissions: format_money(p.total_commissions),
                paid: format_money(p.paid_commissions),
                pending: format_money(p.pending_commissions),
            })
            .collect();
        print_table(lines);
    }

    Ok(())
}

fn cmd_monthly(session: &Session, year: Option<i32>) -> Result<()> {
    let state = session.service.state();
    let year = year.unwrap_or_else(|| Utc::now().year());
    let buckets = monthly_breakdown(&state.quotes, year);

    let lines: Vec<MonthLine> = buckets
        .iter()
        .map(|b| MonthLine {
            month: format!("{year}-{:02}", b.month),
            revenue: format_money(b.revenue),
            collected: format_money(b.collected),
            commissions: format_money(b.commissions),
        })
        .collect();
    print_table(lines);

    println!();
    println!(
        "Year total: {} HT, {} collected",
        format_money(buckets.iter().map(|b| b.revenue).sum()),
        format_money(buckets.iter().map(|b| b.collected).sum())
    );
    Ok(())
}

fn cmd_backup_export(session: &Session, output: Option<PathBuf>) -> Result<()> {
    let state = session.service.state();
    let now = Utc::now();
    let envelope = backup::encode(&state, now);
    let path = output.unwrap_or_else(|| PathBuf::from(backup::backup_file_name(now.date_naive())));
    std::fs::write(&path, backup::to_json(&envelope)?)?;

    println!(
        "Exported {} projects, {} quotes, {} sales reps and {} companies to {}",
        state.projects.len(),
        state.quotes.len(),
        state.sales_reps.len(),
        state.companies.len(),
        path.display()
    );
    Ok(())
}

async fn cmd_backup_import(session: &Session, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)?;
    let envelope = backup::decode(&text)?;
    session.writable()?;

    let counts = (
        envelope.data.projects.len(),
        envelope.data.quotes.len(),
        envelope.data.sales_reps.len(),
        envelope.data.companies.len(),
    );
    let taken_at = envelope.timestamp;
    session.service.import_backup(envelope).await?;

    println!(
        "Imported backup from {}: {} projects, {} quotes, {} sales reps, {} companies",
        format_date(taken_at),
        counts.0,
        counts.1,
        counts.2,
        counts.3
    );
    Ok(())
}

async fn cmd_sync(session: &Session) -> Result<()> {
    session.writable()?;
    session.service.force_save().await?;

    let status = session.service.sync_status();
    println!("Sync: {}", status.state);
    if let Some(at) = status.last_sync {
        println!("Last sync: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

async fn cmd_clear(session: &Session, yes: bool) -> Result<()> {
    if !yes {
        return Err(CrmError::NotConfirmed("This deletes all shared data"));
    }
    session.commit(Action::ClearAllData).await?;
    println!("All data deleted.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_is_grouped_with_cents() {
        assert_eq!(format_money(10_000.0), "10,000.00 €");
        assert_eq!(format_money(200.0), "200.00 €");
        assert_eq!(format_money(1234567.891), "1,234,567.89 €");
        assert_eq!(format_money(-0.5), "-0.50 €");
    }

    #[test]
    fn resolve_by_index_id_prefix_and_name() {
        let now = Utc::now();
        let reps = vec![
            SalesRep::new("Jeanne", None, None, now),
            SalesRep::new("Marc", None, None, now),
        ];
        let by = |r: &str| {
            resolve(&reps, r, |s| s.id.as_str(), |s| s.name.as_str()).map(|s| s.name.as_str())
        };

        // Listings are newest first.
        assert_eq!(by("1"), Some("Marc"));
        assert_eq!(by("2"), Some("Jeanne"));
        assert_eq!(by("3"), None);
        assert_eq!(by(&reps[0].id), Some("Jeanne"));
        assert_eq!(by("marc"), Some("Marc"));
        assert_eq!(by(""), None);
    }

    #[test]
    fn dates_parse_as_utc_midnight() {
        let d = parse_date("2025-03-15").unwrap();
        assert_eq!(d.to_rfc3339(), "2025-03-15T00:00:00+00:00");
        assert_eq!(end_of_day(d).to_rfc3339(), "2025-03-15T23:59:59.999+00:00");
        assert!(matches!(parse_date("15/03/2025"), Err(CrmError::InvalidDate(_))));
    }

    #[test]
    fn rates_must_be_finite_percentages() {
        assert_eq!(percentage(0.0).unwrap(), 0.0);
        assert_eq!(percentage(100.0).unwrap(), 100.0);
        assert_eq!(percentage(12.5).unwrap(), 12.5);
        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -50.0, 100.5] {
            assert!(matches!(percentage(bad), Err(CrmError::InvalidRate(_))));
        }
    }
}
