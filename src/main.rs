use chrono::{Datelike, Local, Months};
use clap::{CommandFactory, Parser, Subcommand};
use comfy_table::{Cell, Table};
use inquire::{Confirm, CustomType, DateSelect, InquireError, MultiSelect, Select, Text};
use std::fs;
use std::path::Path;
use std::process::{Command, ExitCode};
use tracing_subscriber::EnvFilter;

use timecard_invoicer::billable::{self, GenerationMode, ServicePeriod, month_name};
use timecard_invoicer::config::{self, AppSettings, PricingOwner, ProjectDeletion};
use timecard_invoicer::engine::{BillingTerms, InvoiceInputs, assemble_invoice};
use timecard_invoicer::ledger::{self, ClientForm, CompanyForm, ProjectForm, TimecardForm};
use timecard_invoicer::model::{
    BankDetails, Client, FixedRate, Invoice, InvoiceStatus, Language, Project, RateType, Timecard,
};
use timecard_invoicer::rates::{self, BnrProvider, HttpFeed, RateProvider, is_home_currency};
use timecard_invoicer::render;
use timecard_invoicer::store::{DocumentStoreExt, JsonStore};
use timecard_invoicer::summary;

// ==========================================
// Constants
// ==========================================
const NEW_CLIENT_OPT: &str = "➕ Add New Client";
const NEW_PROJECT_OPT: &str = "➕ Add New Project";
const THEMES: [&str; 3] = ["classic", "modern", "minimal"];

// ==========================================
// Structs & Enums
// ==========================================

#[derive(Parser)]
#[command(name = "timecard-invoicer", about = "Track billable time and issue invoices")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new invoice
    New,
    /// Manage clients
    Client {
        #[command(subcommand)]
        action: ClientAction,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Log and manage timecards
    Timecard {
        #[command(subcommand)]
        action: TimecardAction,
    },
    /// Manage issued invoices
    Invoice {
        #[command(subcommand)]
        action: InvoiceAction,
    },
    /// Show today's exchange rate for a currency
    Rate { currency: String },
    /// Show summary of invoices
    Summary {
        /// Year to summarize (defaults to current year)
        year: Option<i32>,
    },
    /// Edit your company profile
    Profile,
    /// Configure data directory and billing policies
    Config,
}

#[derive(Subcommand)]
enum ClientAction {
    Add,
    List,
    Edit,
    /// Delete a client with all its projects, invoices and timecards
    Delete,
}

#[derive(Subcommand)]
enum ProjectAction {
    Add,
    List,
    Delete,
}

#[derive(Subcommand)]
enum TimecardAction {
    Log,
    List {
        /// Only show unbilled entries
        #[arg(long)]
        unbilled: bool,
    },
    Edit,
    Delete,
}

#[derive(Subcommand)]
enum InvoiceAction {
    /// Same as `new`
    New,
    List,
    /// Mark a created invoice as SENT
    Send,
    /// Mark a sent invoice as PAID
    Pay,
    /// Export an invoice to PDF
    Render,
    /// Delete an invoice (timecards stay billed)
    Delete,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    App(#[from] timecard_invoicer::Error),
    #[error("Cancelled")]
    Cancelled,
    #[error("Prompt failed: {0}")]
    Prompt(InquireError),
}

impl From<InquireError> for CliError {
    fn from(e: InquireError) -> Self {
        match e {
            InquireError::OperationCanceled | InquireError::OperationInterrupted => CliError::Cancelled,
            other => CliError::Prompt(other),
        }
    }
}

type CliResult<T> = Result<T, CliError>;

struct App {
    settings: AppSettings,
    store: JsonStore,
    rates: BnrProvider<HttpFeed>,
}

// ==========================================
// Main Function
// ==========================================

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help().ok();
        return ExitCode::SUCCESS;
    };

    match run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Cancelled) => {
            println!("Cancelled");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn run(command: Commands) -> CliResult<()> {
    let settings_path = config::config_path();
    let settings = match (&command, config::load_settings(&settings_path)?) {
        (Commands::Config, _) | (_, None) => setup_config_wizard(&settings_path)?,
        (_, Some(s)) => s,
    };
    if matches!(command, Commands::Config) {
        return Ok(());
    }

    fs::create_dir_all(settings.root()).map_err(timecard_invoicer::Error::from)?;
    let store = JsonStore::open(&settings.store_path())?;
    let rates = BnrProvider::new(HttpFeed::new(&settings.rate_feed_url)?);
    let app = App { settings, store, rates };

    // First run creates the placeholder profile
    ledger::ensure_company(&app.store)?;

    match command {
        Commands::New => new_invoice_wizard(&app),
        Commands::Client { action } => match action {
            ClientAction::Add => create_client_wizard(&app, None).map(|_| ()),
            ClientAction::List => list_clients(&app),
            ClientAction::Edit => edit_client(&app),
            ClientAction::Delete => delete_client(&app),
        },
        Commands::Project { action } => match action {
            ProjectAction::Add => {
                let client = select_or_create_client(&app)?;
                create_project_wizard(&app, &client).map(|_| ())
            }
            ProjectAction::List => list_projects(&app),
            ProjectAction::Delete => delete_project(&app),
        },
        Commands::Timecard { action } => match action {
            TimecardAction::Log => log_timecard(&app),
            TimecardAction::List { unbilled } => list_timecards(&app, unbilled),
            TimecardAction::Edit => edit_timecard(&app),
            TimecardAction::Delete => delete_timecard(&app),
        },
        Commands::Invoice { action } => match action {
            InvoiceAction::New => new_invoice_wizard(&app),
            InvoiceAction::List => list_invoices(&app),
            InvoiceAction::Send => change_invoice_status(&app, InvoiceStatus::Sent),
            InvoiceAction::Pay => change_invoice_status(&app, InvoiceStatus::Paid),
            InvoiceAction::Render => render_invoice(&app),
            InvoiceAction::Delete => delete_invoice(&app),
        },
        Commands::Rate { currency } => show_rate(&app, &currency),
        Commands::Summary { year } => show_summary(&app, year),
        Commands::Profile => edit_profile(&app),
        Commands::Config => Ok(()),
    }
}

// ==========================================
// 1. Client & Project Logic
// ==========================================

fn sorted_clients(app: &App) -> CliResult<Vec<Client>> {
    let mut clients = app.store.list::<Client>()?;
    clients.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
    Ok(clients)
}

fn pick<T>(message: &str, items: Vec<T>, labels: Vec<String>) -> CliResult<T> {
    let choice = Select::new(message, labels).with_page_size(10).raw_prompt()?;
    items.into_iter().nth(choice.index).ok_or(CliError::Cancelled)
}

fn select_client(app: &App) -> CliResult<Client> {
    let clients = sorted_clients(app)?;
    if clients.is_empty() {
        println!("❌ No clients yet. Run `client add` first.");
        return Err(CliError::Cancelled);
    }
    let labels = clients.iter().map(|c| c.name.clone()).collect();
    pick("Please Select Client (Type to Filter):", clients, labels)
}

fn select_or_create_client(app: &App) -> CliResult<Client> {
    let clients = sorted_clients(app)?;
    let mut labels = vec![NEW_CLIENT_OPT.to_string()];
    labels.extend(clients.iter().map(|c| c.name.clone()));

    let choice = Select::new("Please Select Client (Type to Filter):", labels).raw_prompt()?;
    match choice.index {
        0 => create_client_wizard(app, None),
        i => clients.into_iter().nth(i - 1).ok_or(CliError::Cancelled),
    }
}

fn select_or_create_project(app: &App, client: &Client) -> CliResult<Project> {
    let projects: Vec<Project> =
        app.store.list::<Project>()?.into_iter().filter(|p| p.client_id == client.id).collect();
    let mut labels = vec![NEW_PROJECT_OPT.to_string()];
    labels.extend(projects.iter().map(|p| format!("{} | {:.2} {} {}", p.name, p.rate, p.currency, rate_type_label(p.rate_type))));

    let choice = Select::new("Select Project:", labels).raw_prompt()?;
    match choice.index {
        0 => create_project_wizard(app, client),
        i => projects.into_iter().nth(i - 1).ok_or(CliError::Cancelled),
    }
}

fn select_project(app: &App) -> CliResult<(Client, Project)> {
    let client = select_client(app)?;
    let projects: Vec<Project> =
        app.store.list::<Project>()?.into_iter().filter(|p| p.client_id == client.id).collect();
    if projects.is_empty() {
        println!("❌ {} has no projects yet.", client.name);
        return Err(CliError::Cancelled);
    }
    let labels = projects.iter().map(|p| p.name.clone()).collect();
    let project = pick("Select Project:", projects, labels)?;
    Ok((client, project))
}

fn create_client_wizard(app: &App, current: Option<&Client>) -> CliResult<Client> {
    println!("\n--- {} ---", if current.is_some() { "Editing Client" } else { "Creating New Client" });

    let name = Text::new("Client Name:").with_default(current.map_or("", |c| c.name.as_str())).prompt()?;
    let address = Text::new("Address:").with_default(current.map_or("", |c| c.address.as_str())).prompt()?;
    let tax_id = Text::new("Tax ID:").with_default(current.map_or("", |c| c.tax_id.as_str())).prompt()?;
    let bank = ask_bank_details(current.map(|c| &c.bank))?;

    let languages = vec!["English", "Romanian"];
    let start = usize::from(current.is_some_and(|c| c.language == Language::Romanian));
    let language = match Select::new("Invoice Language:", languages).with_starting_cursor(start).prompt()? {
        "Romanian" => Language::Romanian,
        _ => Language::English,
    };

    let currency = Text::new("Default Currency:").with_default(current.map_or("EUR", |c| c.currency.as_str())).prompt()?;
    let has_vat = Confirm::new("Charge VAT?").with_default(current.is_none_or(|c| c.has_vat)).prompt()?;
    let max_exchange_rate = ask_fixed_rate(current.and_then(|c| c.max_exchange_rate))?;
    let invoice_prefix = ask_optional(
        "Invoice Number Prefix (Optional, initials by default):",
        current.and_then(|c| c.invoice_prefix.as_deref()),
    )?;

    let (rate, rate_type) = if app.settings.pricing_owner == PricingOwner::Client {
        let rate_type = ask_rate_type(current.and_then(|c| c.rate_type))?;
        let rate = CustomType::<f64>::new("Rate:")
            .with_default(current.and_then(|c| c.rate).unwrap_or(0.0))
            .with_error_message("Please type a number")
            .prompt()?;
        (Some(rate), Some(rate_type))
    } else {
        (current.and_then(|c| c.rate), current.and_then(|c| c.rate_type))
    };

    let form = ClientForm {
        name,
        address,
        tax_id,
        bank,
        language,
        currency,
        has_vat,
        max_exchange_rate,
        invoice_prefix,
        rate,
        rate_type,
    };
    let client = match current {
        Some(c) => ledger::update_client(&app.store, &c.id, form)?,
        None => ledger::create_client(&app.store, form)?,
    };
    println!("✅ Client saved: {}", client.name);
    Ok(client)
}

fn create_project_wizard(app: &App, client: &Client) -> CliResult<Project> {
    println!("\n--- Adding New Project for {} ---", client.name);

    let name = Text::new("Project Name:").prompt()?;
    let currency = Text::new("Currency:").with_default(&client.currency).prompt()?;
    let has_vat = Confirm::new("Charge VAT?").with_default(client.has_vat).prompt()?;
    let rate_type = ask_rate_type(client.rate_type)?;
    let rate = CustomType::<f64>::new(&format!("Rate per {}:", if rate_type == RateType::Daily { "day" } else { "hour" }))
        .with_error_message("Please type a number")
        .prompt()?;
    let max_exchange_rate = ask_fixed_rate(client.max_exchange_rate)?;
    let invoice_prefix = ask_optional("Invoice Number Prefix (Optional, initials by default):", None)?;
    let start = THEMES.iter().position(|t| *t == app.settings.default_theme).unwrap_or(0);
    let theme = Select::new("Invoice Theme:", THEMES.to_vec()).with_starting_cursor(start).prompt()?;

    let project = ledger::create_project(
        &app.store,
        ProjectForm {
            name,
            client_id: client.id.clone(),
            currency,
            has_vat,
            rate,
            rate_type,
            max_exchange_rate,
            invoice_prefix,
            theme: Some(theme.to_string()),
        },
    )?;
    println!("✅ Project added: {}", project.name);
    Ok(project)
}

fn edit_client(app: &App) -> CliResult<()> {
    let client = select_client(app)?;
    create_client_wizard(app, Some(&client)).map(|_| ())
}

fn delete_client(app: &App) -> CliResult<()> {
    let client = select_client(app)?;
    let confirmed = Confirm::new(&format!(
        "Delete {} with ALL of its projects, invoices and timecards? This cannot be undone.",
        client.name
    ))
    .with_default(false)
    .prompt()?;
    if confirmed {
        ledger::delete_client(&app.store, &client.id)?;
        println!("🗑️  Deleted {}", client.name);
    }
    Ok(())
}

fn delete_project(app: &App) -> CliResult<()> {
    let (_, project) = select_project(app)?;
    let effect = match app.settings.project_deletion {
        ProjectDeletion::KeepHistory => "Its invoices and billed timecards are kept.",
        ProjectDeletion::Cascade => "Its invoices and timecards are deleted too.",
    };
    let confirmed = Confirm::new(&format!("Delete {}? {}", project.name, effect)).with_default(false).prompt()?;
    if confirmed {
        ledger::delete_project(&app.store, &project.id, app.settings.project_deletion)?;
        println!("🗑️  Deleted {}", project.name);
    }
    Ok(())
}

fn list_clients(app: &App) -> CliResult<()> {
    let mut table = Table::new();
    table.set_header(vec!["Client", "Tax ID", "Currency", "VAT", "Language", "Fixed Rate"]);
    for c in sorted_clients(app)? {
        table.add_row(vec![
            c.name,
            c.tax_id,
            c.currency,
            yes_no(c.has_vat).to_string(),
            format!("{:?}", c.language),
            c.max_exchange_rate.map(|f| format!("{} ({})", f.rate, f.date)).unwrap_or_default(),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn list_projects(app: &App) -> CliResult<()> {
    let mut projects = app.store.list::<Project>()?;
    projects.sort_by(|a, b| a.client_name.cmp(&b.client_name).then_with(|| a.name.cmp(&b.name)));

    let mut table = Table::new();
    table.set_header(vec!["Client", "Project", "Rate", "VAT", "Fixed Rate", "Theme"]);
    for p in projects {
        table.add_row(vec![
            p.client_name,
            p.name,
            format!("{:.2} {} {}", p.rate, p.currency, rate_type_label(p.rate_type)),
            yes_no(p.has_vat).to_string(),
            p.max_exchange_rate.map(|f| format!("{} ({})", f.rate, f.date)).unwrap_or_default(),
            p.theme,
        ]);
    }
    println!("{table}");
    Ok(())
}

// ==========================================
// 2. Data Entry Helpers
// ==========================================

fn ask_optional(message: &str, default: Option<&str>) -> CliResult<Option<String>> {
    let answer = Text::new(message).with_default(default.unwrap_or("")).prompt()?;
    Ok(if answer.trim().is_empty() { None } else { Some(answer.trim().to_string()) })
}

fn ask_bank_details(current: Option<&BankDetails>) -> CliResult<BankDetails> {
    Ok(BankDetails {
        iban: ask_optional("IBAN (Optional):", current.and_then(|b| b.iban.as_deref()))?,
        bank_name: ask_optional("Bank Name (Optional):", current.and_then(|b| b.bank_name.as_deref()))?,
        swift: ask_optional("SWIFT (Optional):", current.and_then(|b| b.swift.as_deref()))?,
    })
}

fn ask_rate_type(current: Option<RateType>) -> CliResult<RateType> {
    let start = usize::from(current == Some(RateType::Daily));
    let choice = Select::new("Rate Type:", vec!["hourly", "daily"]).with_starting_cursor(start).prompt()?;
    Ok(if choice == "daily" { RateType::Daily } else { RateType::Hourly })
}

fn ask_fixed_rate(current: Option<FixedRate>) -> CliResult<Option<FixedRate>> {
    let fixed = Confirm::new("Use a fixed (contract) exchange rate?").with_default(current.is_some()).prompt()?;
    if !fixed {
        return Ok(None);
    }
    let rate = CustomType::<f64>::new("Fixed rate (RON per unit):")
        .with_default(current.map_or(1.0, |f| f.rate))
        .with_error_message("Please type a number")
        .prompt()?;
    let date = DateSelect::new("Rate fixed on:")
        .with_default(current.map_or_else(|| Local::now().date_naive(), |f| f.date))
        .prompt()?;
    Ok(Some(FixedRate { rate, date }))
}

fn ask_timecard_form(project: &Project, current: Option<&Timecard>) -> CliResult<TimecardForm> {
    let date = DateSelect::new("Date:")
        .with_default(current.map_or_else(|| Local::now().date_naive(), |t| t.date))
        .prompt()?;
    let end_date = if Confirm::new("Spans several days?").with_default(current.is_some_and(|t| t.end_date.is_some())).prompt()? {
        Some(DateSelect::new("End Date:").with_default(current.and_then(|t| t.end_date).unwrap_or(date)).prompt()?)
    } else {
        None
    };
    let hours = CustomType::<f64>::new("Hours:")
        .with_default(current.map_or(8.0, |t| t.hours))
        .with_error_message("Please type a number")
        .prompt()?;
    let description = ask_optional("Description (Optional):", current.and_then(|t| t.description.as_deref()))?;
    Ok(TimecardForm { project_id: project.id.clone(), date, end_date, hours, description })
}

fn rate_type_label(rate_type: RateType) -> &'static str {
    match rate_type {
        RateType::Hourly => "/h",
        RateType::Daily => "/day",
    }
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

// ==========================================
// 3. Timecards
// ==========================================

fn log_timecard(app: &App) -> CliResult<()> {
    let client = select_or_create_client(app)?;
    let project = select_or_create_project(app, &client)?;
    let form = ask_timecard_form(&project, None)?;
    let card = ledger::log_timecard(&app.store, form)?;
    println!("✅ Logged {}h on {} ({})", card.hours, card.project_name, card.date);
    Ok(())
}

fn timecard_label(t: &Timecard) -> String {
    format!(
        "{} | {} | {}h | {}",
        t.date,
        t.project_name,
        t.hours,
        t.description.as_deref().unwrap_or("-")
    )
}

fn unbilled_timecards(app: &App) -> CliResult<Vec<Timecard>> {
    let mut cards: Vec<Timecard> = app.store.list::<Timecard>()?.into_iter().filter(|t| !t.is_billed()).collect();
    cards.sort_by(|a, b| b.date.cmp(&a.date));
    if cards.is_empty() {
        println!("❌ No unbilled timecards.");
        return Err(CliError::Cancelled);
    }
    Ok(cards)
}

fn list_timecards(app: &App, unbilled_only: bool) -> CliResult<()> {
    let mut cards = app.store.list::<Timecard>()?;
    cards.retain(|t| !unbilled_only || !t.is_billed());
    cards.sort_by(|a, b| b.date.cmp(&a.date));

    let mut table = Table::new();
    table.set_header(vec!["Date", "Client", "Project", "Hours", "Status", "Description"]);
    for t in cards {
        let date = match t.end_date {
            Some(end) => format!("{} → {}", t.date, end),
            None => t.date.to_string(),
        };
        table.add_row(vec![
            Cell::new(date),
            Cell::new(t.client_name),
            Cell::new(t.project_name),
            Cell::new(t.hours),
            Cell::new(format!("{:?}", t.status)),
            Cell::new(t.description.unwrap_or_default()),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn edit_timecard(app: &App) -> CliResult<()> {
    let cards = unbilled_timecards(app)?;
    let labels = cards.iter().map(timecard_label).collect();
    let card = pick("Select Timecard to Edit:", cards, labels)?;
    let project: Project = app.store.fetch(&card.project_id)?;
    let form = ask_timecard_form(&project, Some(&card))?;
    ledger::edit_timecard(&app.store, &card.id, form)?;
    println!("✅ Timecard updated.");
    Ok(())
}

fn delete_timecard(app: &App) -> CliResult<()> {
    let cards = unbilled_timecards(app)?;
    let labels = cards.iter().map(timecard_label).collect();
    let card = pick("Select Timecard to Delete:", cards, labels)?;
    ledger::delete_timecard(&app.store, &card.id)?;
    println!("🗑️  Timecard deleted.");
    Ok(())
}

// ==========================================
// 4. Invoice Creation
// ==========================================

fn ask_period() -> CliResult<ServicePeriod> {
    let last_month = Local::now().date_naive().checked_sub_months(Months::new(1)).unwrap_or_else(|| Local::now().date_naive());
    let months: Vec<&str> = (1..=12).map(|m| month_name(m, Language::English)).collect();
    let choice = Select::new("Service Month:", months)
        .with_starting_cursor(last_month.month0() as usize)
        .raw_prompt()?;
    let year = CustomType::<i32>::new("Service Year:").with_default(last_month.year()).prompt()?;
    Ok(ServicePeriod { month: choice.index as u32 + 1, year })
}

fn ask_generation_mode(
    app: &App,
    project: &Project,
    unit: &str,
    period: ServicePeriod,
) -> CliResult<(GenerationMode, Vec<Timecard>)> {
    let timecards = app.store.list::<Timecard>()?;
    let modes = vec!["From timecards", "Manual quantity"];
    if Select::new("Generation Mode:", modes).raw_prompt()?.index == 1 {
        let quantity = CustomType::<f64>::new(&format!("Quantity ({unit}):"))
            .with_error_message("Please type a number")
            .prompt()?;
        return Ok((GenerationMode::Manual { quantity }, timecards));
    }

    let candidates = billable::candidate_timecards(&timecards, &project.id, period);
    if candidates.is_empty() {
        println!("❌ No unbilled timecards for {} in {} {}.", project.name, month_name(period.month, Language::English), period.year);
        return Ok((GenerationMode::Timecards { selected: Vec::new() }, timecards));
    }
    let labels: Vec<String> = candidates.iter().map(|t| timecard_label(t)).collect();
    let chosen = MultiSelect::new("Select Timecards:", labels)
        .with_help_message("space to toggle, → select all, ← clear")
        .with_page_size(15)
        .raw_prompt()?;
    let selected = chosen.iter().filter_map(|o| candidates.get(o.index)).map(|t| t.id.clone()).collect();
    Ok((GenerationMode::Timecards { selected }, timecards))
}

fn new_invoice_wizard(app: &App) -> CliResult<()> {
    let client = select_or_create_client(app)?;
    println!("✅ Selected Client: {}", client.name);
    let project = select_or_create_project(app, &client)?;
    println!("✅ Selected Project: {}", project.name);

    let owner = app.settings.pricing_owner;
    let terms = BillingTerms::resolve(owner, &client, &project);
    let period = ask_period()?;
    let (mode, timecards) = ask_generation_mode(app, &project, terms.unit(), period)?;
    let quantity = billable::resolve(&mode, terms.pricing(&client, &project), period, &timecards);

    let currency = Text::new("Currency:").with_default(terms.currency).prompt()?.trim().to_uppercase();
    let today = Local::now().date_naive();
    let mut exchange = rates::select_exchange_rate(&currency, terms.fixed_rate, &app.rates, today);
    while exchange.rate.is_none() {
        println!("⚠️  No exchange rate available for {}.", currency);
        if !Confirm::new("Retry fetching the rate?").with_default(true).prompt()? {
            break;
        }
        exchange = rates::select_exchange_rate(&currency, terms.fixed_rate, &app.rates, today);
    }

    let company = ledger::ensure_company(&app.store)?;
    let history = app.store.list::<Invoice>()?;
    let issue_date = DateSelect::new("Invoice Date:").with_default(today).prompt()?;

    let inputs = InvoiceInputs {
        client: Some(&client),
        project: Some(&project),
        company: Some(&company),
        owner,
        billable: quantity.as_ref(),
        currency: Some(currency.as_str()),
        exchange,
        period,
        issue_date,
        history: &history,
    };
    let draft = match assemble_invoice(&inputs) {
        Ok(draft) => draft,
        Err(reason) => {
            println!("❌ Cannot create invoice: {}", reason);
            return Ok(());
        }
    };

    print_draft(&draft);
    if !Confirm::new(&format!("Save invoice {}?", draft.invoice_number)).with_default(true).prompt()? {
        println!("❌ Invoice not saved.");
        return Ok(());
    }

    let number = draft.invoice_number.clone();
    let id = loop {
        match ledger::save_invoice(&app.store, draft.clone()) {
            Ok(id) => break id,
            Err(e) => {
                println!("❌ Saving failed, nothing was written: {}", e);
                if !Confirm::new("Retry?").with_default(true).prompt()? {
                    return Ok(());
                }
            }
        }
    };
    println!("✅ Invoice {} saved.", number);

    if Confirm::new("Render PDF now?").with_default(true).prompt()? {
        let invoice: Invoice = app.store.fetch(&id)?;
        export_and_open(app, &invoice)?;
    }
    Ok(())
}

fn print_draft(draft: &timecard_invoicer::model::InvoiceData) {
    let mut table = Table::new();
    table.set_header(vec!["Invoice", draft.invoice_number.as_str()]);
    for item in &draft.items {
        table.add_row(vec![
            item.description.clone(),
            format!("{} {} × {:.2} = {:.2} {}", item.quantity, item.unit, item.rate, item.amount, draft.currency),
        ]);
    }
    table.add_row(vec!["Subtotal".to_string(), format!("{:.2} {}", draft.subtotal, draft.currency)]);
    if let Some(rate) = draft.vat_rate {
        table.add_row(vec![format!("VAT {}%", (rate * 1000.0).round() / 10.0), format!("{:.2} {}", draft.vat_amount, draft.currency)]);
    }
    table.add_row(vec!["Total".to_string(), format!("{:.2} {}", draft.total, draft.currency)]);
    if let (Some(total_ron), Some(rate)) = (draft.total_ron, draft.exchange_rate) {
        if !is_home_currency(&draft.currency) {
            let source = if draft.used_max_exchange_rate { "fixed" } else { "BNR" };
            table.add_row(vec![
                format!("Total RON ({} rate {:.4})", source, rate),
                format!("{:.2} RON", total_ron),
            ]);
        }
    }
    table.add_row(vec!["Due".to_string(), draft.due_date.to_string()]);
    println!("{table}");
}

// ==========================================
// 5. Invoice Status, Listing & Export
// ==========================================

fn invoice_label(i: &Invoice) -> String {
    format!(
        "{} | {} | {} | {:.2} {} | {}",
        i.data.invoice_number, i.data.client.name, i.data.issue_date, i.data.total, i.data.currency, i.status
    )
}

fn select_invoice(app: &App, message: &str, filter: impl Fn(&Invoice) -> bool) -> CliResult<Invoice> {
    let mut invoices: Vec<Invoice> = app.store.list::<Invoice>()?.into_iter().filter(|i| filter(i)).collect();
    if invoices.is_empty() {
        println!("❌ No matching invoices found.");
        return Err(CliError::Cancelled);
    }
    invoices.sort_by(|a, b| b.data.issue_date.cmp(&a.data.issue_date));
    let labels = invoices.iter().map(invoice_label).collect();
    pick(message, invoices, labels)
}

fn change_invoice_status(app: &App, target: InvoiceStatus) -> CliResult<()> {
    // Only invoices one step behind the target are offered
    let invoice = select_invoice(app, &format!("Select Invoice to mark as {}:", target), |i| i.status.next() == Some(target))?;
    ledger::advance_invoice_status(&app.store, &invoice.id, target)?;
    println!("✅ {} is now {}.", invoice.data.invoice_number, target);
    Ok(())
}

fn list_invoices(app: &App) -> CliResult<()> {
    let mut invoices = app.store.list::<Invoice>()?;
    invoices.sort_by(|a, b| b.data.issue_date.cmp(&a.data.issue_date));

    let mut table = Table::new();
    table.set_header(vec!["Number", "Client", "Project", "Issued", "Total", "Total RON", "Status"]);
    for i in invoices {
        table.add_row(vec![
            i.data.invoice_number,
            i.data.client.name,
            i.data.project_name,
            i.data.issue_date.to_string(),
            format!("{:.2} {}", i.data.total, i.data.currency),
            i.data.total_ron.map(|v| format!("{v:.2}")).unwrap_or_default(),
            i.status.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn render_invoice(app: &App) -> CliResult<()> {
    let invoice = select_invoice(app, "Select Invoice to Export:", |_| true)?;
    export_and_open(app, &invoice)
}

fn export_and_open(app: &App, invoice: &Invoice) -> CliResult<()> {
    println!("\n🔨 Compiling PDF...");
    let pdf = render::export_pdf(invoice, &app.settings.templates_dir(), &app.settings.output_dir())?;
    println!("✅ PDF Generated: {:?}", pdf);
    open_and_reveal(&pdf);
    Ok(())
}

fn delete_invoice(app: &App) -> CliResult<()> {
    let invoice = select_invoice(app, "Select Invoice to DELETE:", |_| true)?;
    let mut warning = format!("Delete invoice {}? This cannot be undone.", invoice.data.invoice_number);
    if !invoice.data.billed_timecard_ids.is_empty() {
        warning.push_str(" Its timecards stay billed.");
    }
    if Confirm::new(&warning).with_default(false).prompt()? {
        ledger::delete_invoice(&app.store, &invoice.id)?;
        println!("🗑️  Deleted {}", invoice.data.invoice_number);
    }
    Ok(())
}

// ==========================================
// 6. Rates, Summary & Profile
// ==========================================

fn show_rate(app: &App, currency: &str) -> CliResult<()> {
    let rate = app.rates.get_rate(currency);
    match (rate.rate, rate.date) {
        (Some(r), Some(d)) => println!("💱 1 {} = {:.4} RON (published {})", currency.to_uppercase(), r, d),
        _ => return Err(timecard_invoicer::Error::RateUnavailable(currency.to_uppercase()).into()),
    }
    Ok(())
}

fn show_summary(app: &App, year: Option<i32>) -> CliResult<()> {
    let invoices = app.store.list::<Invoice>()?;
    if invoices.is_empty() {
        println!("No invoices found.");
        return Ok(());
    }
    let target_year = year.unwrap_or_else(|| Local::now().year());

    println!("\n--- Monthly Invoice Summary ({}) ---", target_year);
    println!("{}", summary::monthly_table(&invoices, target_year));
    println!("\n--- Client Summary ({}) ---", target_year);
    println!("{}", summary::client_table(&invoices, target_year));
    Ok(())
}

fn edit_profile(app: &App) -> CliResult<()> {
    let current = ledger::ensure_company(&app.store)?;
    println!("\n--- Company Profile ---");
    let name = Text::new("Company Name:").with_default(&current.name).prompt()?;
    let address = Text::new("Address:").with_default(&current.address).prompt()?;
    let tax_id = Text::new("Tax ID:").with_default(&current.tax_id).prompt()?;
    let bank = ask_bank_details(Some(&current.bank))?;
    let vat_percent = CustomType::<f64>::new("VAT Rate % (e.g. 19):")
        .with_default(current.vat_rate * 100.0)
        .with_error_message("Please type a number")
        .prompt()?;
    let payment_terms_days = CustomType::<u32>::new("Payment Terms (days):")
        .with_default(current.payment_terms_days)
        .prompt()?;
    let email = ask_optional("Email (Optional):", current.email.as_deref())?;
    let phone = ask_optional("Phone (Optional):", current.phone.as_deref())?;

    let company = ledger::update_company(
        &app.store,
        CompanyForm { name, address, tax_id, bank, vat_rate: vat_percent / 100.0, payment_terms_days, email, phone },
    )?;
    println!("✅ Profile saved: {}", company.name);
    Ok(())
}

// ==========================================
// 7. Config & Utilities
// ==========================================

fn setup_config_wizard(path: &Path) -> CliResult<AppSettings> {
    println!("\n⚙️  --- Configuration Setup ---");
    let current = config::load_settings(path)?;
    let default_root = current.as_ref().map_or("~/Documents/Business", |s| s.data_root.as_str()).to_string();

    println!("📂 Opening folder picker...");
    let picked_path = rfd::FileDialog::new().set_title("Select Root Data Directory").pick_folder();

    let data_root = match picked_path {
        Some(path) => path.to_string_lossy().to_string(),
        None => {
            println!("❌ No folder selected. Falling back to manual input.");
            Text::new("Enter Root Data Directory:").with_default(&default_root).prompt()?
        }
    };

    let mut settings = current.unwrap_or_else(|| AppSettings::new(&data_root));
    settings.data_root = data_root;

    let owners = vec!["project", "client"];
    let start = usize::from(settings.pricing_owner == PricingOwner::Client);
    settings.pricing_owner = match Select::new("Rates, VAT and currency are set per:", owners).with_starting_cursor(start).prompt()? {
        "client" => PricingOwner::Client,
        _ => PricingOwner::Project,
    };

    let policies = vec!["keep invoice history", "delete everything"];
    let start = usize::from(settings.project_deletion == ProjectDeletion::Cascade);
    settings.project_deletion = match Select::new("When a project is deleted:", policies).with_starting_cursor(start).raw_prompt()?.index {
        1 => ProjectDeletion::Cascade,
        _ => ProjectDeletion::KeepHistory,
    };

    config::save_settings(&settings, path)?;
    println!("✅ Settings saved.");
    Ok(settings)
}

// Helper: Open file and reveal in Finder/Explorer
fn open_and_reveal(path: &Path) {
    #[cfg(target_os = "macos")]
    Command::new("open").arg("-R").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(format!("/select,{}", path.to_string_lossy())).spawn().ok();

    #[cfg(target_os = "macos")]
    Command::new("open").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(path).spawn().ok();

    #[cfg(target_os = "linux")]
    Command::new("xdg-open").arg(path).spawn().ok();
}
