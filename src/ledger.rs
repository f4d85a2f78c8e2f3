//! Every write the application makes, each one a single atomic batch.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::info;
use validator::{Validate, ValidationError};

use crate::config::ProjectDeletion;
use crate::error::{Error, Result};
use crate::model::{
    BankDetails, Client, Company, FixedRate, Invoice, InvoiceData, InvoiceStatus, Language, MY_COMPANY_ID,
    Project, RateType, Timecard, TimecardStatus, default_theme,
};
use crate::store::{Batch, DocumentStore, DocumentStoreExt, new_id};

// ==========================================
// Forms
// ==========================================

#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "validate_client_form"))]
pub struct ClientForm {
    #[validate(length(min = 1, message = "Client name is required"))]
    pub name: String,
    pub address: String,
    pub tax_id: String,
    pub bank: BankDetails,
    pub language: Language,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: String,
    pub has_vat: bool,
    pub max_exchange_rate: Option<FixedRate>,
    pub invoice_prefix: Option<String>,
    #[validate(range(min = 0.0, message = "Rate cannot be negative"))]
    pub rate: Option<f64>,
    pub rate_type: Option<RateType>,
}

fn validate_client_form(form: &ClientForm) -> std::result::Result<(), ValidationError> {
    check_fixed_rate(form.max_exchange_rate.as_ref())
}

#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "validate_project_form"))]
pub struct ProjectForm {
    #[validate(length(min = 1, message = "Project name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Client is required"))]
    pub client_id: String,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: String,
    pub has_vat: bool,
    #[validate(range(min = 0.0, message = "Rate cannot be negative"))]
    pub rate: f64,
    pub rate_type: RateType,
    pub max_exchange_rate: Option<FixedRate>,
    pub invoice_prefix: Option<String>,
    pub theme: Option<String>,
}

fn validate_project_form(form: &ProjectForm) -> std::result::Result<(), ValidationError> {
    check_fixed_rate(form.max_exchange_rate.as_ref())
}

fn check_fixed_rate(fixed: Option<&FixedRate>) -> std::result::Result<(), ValidationError> {
    match fixed {
        Some(f) if !(f.rate.is_finite() && f.rate > 0.0) => {
            Err(ValidationError::new("fixed_rate").with_message("Fixed exchange rate must be positive".into()))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "validate_timecard_dates"))]
pub struct TimecardForm {
    #[validate(length(min = 1, message = "Project is required"))]
    pub project_id: String,
    pub date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[validate(range(exclusive_min = 0.0, max = 1000.0, message = "Hours must be above 0 and at most 1000"))]
    pub hours: f64,
    pub description: Option<String>,
}

fn validate_timecard_dates(form: &TimecardForm) -> std::result::Result<(), ValidationError> {
    match form.end_date {
        Some(end) if end < form.date => {
            Err(ValidationError::new("end_date").with_message("End date is before start date".into()))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompanyForm {
    #[validate(length(min = 1, message = "Company name is required"))]
    pub name: String,
    pub address: String,
    pub tax_id: String,
    pub bank: BankDetails,
    #[validate(range(min = 0.0, max = 1.0, message = "VAT rate is a fraction between 0 and 1"))]
    pub vat_rate: f64,
    pub payment_terms_days: u32,
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// ==========================================
// Company profile
// ==========================================

/// Company profile, created with placeholders the first time it is asked for.
pub fn ensure_company<S: DocumentStore + ?Sized>(store: &S) -> Result<Company> {
    if let Some(company) = store.get::<Company>(MY_COMPANY_ID)? {
        return Ok(company);
    }
    let company = Company::placeholder();
    store.put(&company)?;
    info!("created default company profile");
    Ok(company)
}

pub fn update_company<S: DocumentStore + ?Sized>(store: &S, form: CompanyForm) -> Result<Company> {
    form.validate()?;
    let mut batch = Batch::new();
    let mut fields = serde_json::to_value(&form)?;
    fields["id"] = json!(MY_COMPANY_ID);
    batch.merge::<Company>(MY_COMPANY_ID, fields)?;
    store.commit(batch)?;
    store.fetch(MY_COMPANY_ID)
}

// ==========================================
// Clients & projects
// ==========================================

pub fn create_client<S: DocumentStore + ?Sized>(store: &S, form: ClientForm) -> Result<Client> {
    form.validate()?;
    let order = store.list::<Client>()?.len() as u32;
    let client = Client {
        id: new_id(),
        name: form.name.trim().to_string(),
        address: form.address,
        tax_id: form.tax_id,
        bank: form.bank,
        language: form.language,
        currency: form.currency.to_uppercase(),
        has_vat: form.has_vat,
        max_exchange_rate: form.max_exchange_rate,
        invoice_prefix: blank_to_none(form.invoice_prefix),
        order,
        rate: form.rate,
        rate_type: form.rate_type,
    };
    store.put(&client)?;
    info!(client = %client.id, name = %client.name, "created client");
    Ok(client)
}

/// Replace a client's details. A rename is copied onto its projects and
/// unbilled timecards in the same batch.
pub fn update_client<S: DocumentStore + ?Sized>(store: &S, id: &str, form: ClientForm) -> Result<Client> {
    form.validate()?;
    let current: Client = store.fetch(id)?;
    let client = Client {
        id: current.id.clone(),
        name: form.name.trim().to_string(),
        address: form.address,
        tax_id: form.tax_id,
        bank: form.bank,
        language: form.language,
        currency: form.currency.to_uppercase(),
        has_vat: form.has_vat,
        max_exchange_rate: form.max_exchange_rate,
        invoice_prefix: blank_to_none(form.invoice_prefix),
        order: current.order,
        rate: form.rate,
        rate_type: form.rate_type,
    };

    let mut batch = Batch::new();
    batch.set(&client)?;
    if client.name != current.name {
        let projects: Vec<Project> =
            store.list::<Project>()?.into_iter().filter(|p| p.client_id == client.id).collect();
        let project_ids: HashSet<&str> = projects.iter().map(|p| p.id.as_str()).collect();
        for project in &projects {
            batch.update::<Project>(&project.id, json!({ "clientName": client.name }))?;
        }
        for card in store.list::<Timecard>()? {
            if project_ids.contains(card.project_id.as_str()) && !card.is_billed() {
                batch.update::<Timecard>(&card.id, json!({ "clientName": client.name }))?;
            }
        }
    }
    store.commit(batch)?;
    Ok(client)
}

/// Delete a client with all of its projects, invoices and timecards.
///
/// Timecards are matched through the client's projects and through the
/// invoices being deleted, so billed timecards of already deleted projects
/// go too.
pub fn delete_client<S: DocumentStore + ?Sized>(store: &S, id: &str) -> Result<()> {
    let client: Client = store.fetch(id)?;

    let project_ids: HashSet<String> = store
        .list::<Project>()?
        .into_iter()
        .filter(|p| p.client_id == client.id)
        .map(|p| p.id)
        .collect();

    let mut batch = Batch::new();
    for project_id in &project_ids {
        batch.delete::<Project>(project_id);
    }

    let mut invoice_ids = HashSet::new();
    let mut billed_ids = HashSet::new();
    for invoice in store.list::<Invoice>()? {
        if invoice.data.client_id == client.id {
            batch.delete::<Invoice>(&invoice.id);
            billed_ids.extend(invoice.data.billed_timecard_ids);
            invoice_ids.insert(invoice.id);
        }
    }
    for card in store.list::<Timecard>()? {
        let billed_here = card.invoice_id.as_ref().is_some_and(|i| invoice_ids.contains(i));
        if project_ids.contains(&card.project_id) || billed_here || billed_ids.contains(&card.id) {
            batch.delete::<Timecard>(&card.id);
        }
    }
    batch.delete::<Client>(&client.id);

    let writes = batch.len();
    store.commit(batch)?;
    info!(client = %client.id, writes, "deleted client");
    Ok(())
}

pub fn create_project<S: DocumentStore + ?Sized>(store: &S, form: ProjectForm) -> Result<Project> {
    form.validate()?;
    let client: Client = store.fetch(&form.client_id)?;
    let project = Project {
        id: new_id(),
        name: form.name.trim().to_string(),
        client_id: client.id,
        client_name: client.name,
        currency: form.currency.to_uppercase(),
        has_vat: form.has_vat,
        rate: form.rate,
        rate_type: form.rate_type,
        max_exchange_rate: form.max_exchange_rate,
        invoice_prefix: blank_to_none(form.invoice_prefix),
        theme: blank_to_none(form.theme).unwrap_or_else(default_theme),
    };
    store.put(&project)?;
    info!(project = %project.id, name = %project.name, "created project");
    Ok(project)
}

/// Delete a project. Invoices and billed timecards survive unless the policy
/// says to cascade.
pub fn delete_project<S: DocumentStore + ?Sized>(store: &S, id: &str, policy: ProjectDeletion) -> Result<()> {
    let project: Project = store.fetch(id)?;

    let mut batch = Batch::new();
    for card in store.list::<Timecard>()? {
        if card.project_id != project.id {
            continue;
        }
        if policy == ProjectDeletion::Cascade || !card.is_billed() {
            batch.delete::<Timecard>(&card.id);
        }
    }
    if policy == ProjectDeletion::Cascade {
        for invoice in store.list::<Invoice>()? {
            if invoice.data.project_id == project.id {
                batch.delete::<Invoice>(&invoice.id);
            }
        }
    }
    batch.delete::<Project>(&project.id);

    let writes = batch.len();
    store.commit(batch)?;
    info!(project = %project.id, ?policy, writes, "deleted project");
    Ok(())
}

// ==========================================
// Timecards
// ==========================================

pub fn log_timecard<S: DocumentStore + ?Sized>(store: &S, form: TimecardForm) -> Result<Timecard> {
    form.validate()?;
    let project: Project = store.fetch(&form.project_id)?;
    let card = Timecard {
        id: new_id(),
        project_id: project.id,
        project_name: project.name,
        client_name: project.client_name,
        date: form.date,
        end_date: form.end_date,
        hours: form.hours,
        description: blank_to_none(form.description),
        status: TimecardStatus::Unbilled,
        invoice_id: None,
    };
    store.put(&card)?;
    Ok(card)
}

pub fn edit_timecard<S: DocumentStore + ?Sized>(store: &S, id: &str, form: TimecardForm) -> Result<Timecard> {
    let current: Timecard = store.fetch(id)?;
    if current.is_billed() {
        return Err(Error::Immutable(format!("timecard {id}")));
    }
    form.validate()?;
    let project: Project = store.fetch(&form.project_id)?;
    let card = Timecard {
        project_id: project.id,
        project_name: project.name,
        client_name: project.client_name,
        date: form.date,
        end_date: form.end_date,
        hours: form.hours,
        description: blank_to_none(form.description),
        ..current
    };
    store.put(&card)?;
    Ok(card)
}

pub fn delete_timecard<S: DocumentStore + ?Sized>(store: &S, id: &str) -> Result<()> {
    let current: Timecard = store.fetch(id)?;
    if current.is_billed() {
        return Err(Error::Immutable(format!("timecard {id}")));
    }
    store.remove::<Timecard>(id)
}

// ==========================================
// Invoices
// ==========================================

/// Store a new invoice and mark every timecard it consumed as billed, in one
/// batch. On failure nothing is written and the draft can be retried.
pub fn save_invoice<S: DocumentStore + ?Sized>(store: &S, draft: InvoiceData) -> Result<String> {
    for card_id in &draft.billed_timecard_ids {
        let card: Timecard = store.fetch(card_id)?;
        if card.is_billed() {
            return Err(Error::Immutable(format!("timecard {card_id}")));
        }
    }

    let invoice = Invoice { id: new_id(), status: InvoiceStatus::Created, data: draft };

    let mut batch = Batch::new();
    batch.set(&invoice)?;
    for card_id in &invoice.data.billed_timecard_ids {
        batch.update::<Timecard>(card_id, json!({ "status": TimecardStatus::Billed, "invoiceId": invoice.id }))?;
    }
    store.commit(batch)?;

    info!(
        invoice = %invoice.id,
        number = %invoice.data.invoice_number,
        timecards = invoice.data.billed_timecard_ids.len(),
        "saved invoice"
    );
    Ok(invoice.id)
}

/// Move an invoice one step along Created -> Sent -> Paid.
pub fn advance_invoice_status<S: DocumentStore + ?Sized>(
    store: &S,
    id: &str,
    to: InvoiceStatus,
) -> Result<Invoice> {
    let mut invoice: Invoice = store.fetch(id)?;
    if invoice.status.next() != Some(to) {
        return Err(Error::InvalidTransition { from: invoice.status.to_string(), to: to.to_string() });
    }
    store.update::<Invoice>(id, json!({ "status": to }))?;
    invoice.status = to;
    info!(invoice = %id, status = %to, "invoice status changed");
    Ok(invoice)
}

/// Irreversible. Timecards billed by the invoice stay billed.
pub fn delete_invoice<S: DocumentStore + ?Sized>(store: &S, id: &str) -> Result<()> {
    let invoice: Invoice = store.fetch(id)?;
    store.remove::<Invoice>(&invoice.id)?;
    info!(invoice = %id, number = %invoice.data.invoice_number, "deleted invoice");
    Ok(())
}
