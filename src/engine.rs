//! Invoice computation. Pure: same inputs, same invoice.

use chrono::{Days, NaiveDate};
use thiserror::Error;
use tracing::debug;

use crate::billable::{BillableQuantity, Pricing, ServicePeriod, unit_for};
use crate::config::PricingOwner;
use crate::model::{
    Client, Company, FixedRate, Invoice, InvoiceData, LineItem, PartySnapshot, Project, RateType,
};
use crate::numbering::next_invoice_number;
use crate::rates::{RateSelection, is_home_currency};

/// Rate, VAT and currency terms, read from whichever entity owns them.
#[derive(Debug, Clone, Copy)]
pub struct BillingTerms<'a> {
    pub owner: PricingOwner,
    pub scope_name: &'a str,
    pub prefix_override: Option<&'a str>,
    pub currency: &'a str,
    pub has_vat: bool,
    pub rate: Option<f64>,
    pub rate_type: RateType,
    pub fixed_rate: Option<&'a FixedRate>,
}

impl<'a> BillingTerms<'a> {
    pub fn resolve(owner: PricingOwner, client: &'a Client, project: &'a Project) -> Self {
        match owner {
            PricingOwner::Project => BillingTerms {
                owner,
                scope_name: &project.name,
                prefix_override: project.invoice_prefix.as_deref(),
                currency: &project.currency,
                has_vat: project.has_vat,
                rate: Some(project.rate),
                rate_type: project.rate_type,
                fixed_rate: project.max_exchange_rate.as_ref(),
            },
            PricingOwner::Client => BillingTerms {
                owner,
                scope_name: &client.name,
                prefix_override: client.invoice_prefix.as_deref(),
                currency: &client.currency,
                has_vat: client.has_vat,
                rate: client.rate,
                rate_type: client.rate_type.unwrap_or_default(),
                fixed_rate: client.max_exchange_rate.as_ref(),
            },
        }
    }

    pub fn pricing(&self, client: &'a Client, project: &'a Project) -> Pricing<'a> {
        Pricing {
            project_id: &project.id,
            project_name: &project.name,
            rate: self.rate,
            rate_type: self.rate_type,
            language: client.language,
        }
    }

    /// Unit a quantity is entered and billed in under these terms.
    pub fn unit(&self) -> &'static str {
        unit_for(self.rate_type)
    }

    /// Whether an existing invoice counts towards this scope's numbering.
    fn in_scope(&self, invoice: &Invoice, client: &Client, project: &Project) -> bool {
        match self.owner {
            PricingOwner::Project => invoice.data.project_id == project.id,
            PricingOwner::Client => invoice.data.client_id == client.id,
        }
    }
}

/// Why no invoice can be assembled yet.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Incomplete {
    #[error("no client selected")]
    Client,
    #[error("no project selected")]
    Project,
    #[error("project does not belong to the selected client")]
    ProjectClientMismatch,
    #[error("company profile missing")]
    Company,
    #[error("nothing billable: enter a quantity or select timecards, and set a rate")]
    Billable,
    #[error("no exchange rate for {0}")]
    ExchangeRate(String),
}

pub struct InvoiceInputs<'a> {
    pub client: Option<&'a Client>,
    pub project: Option<&'a Project>,
    pub company: Option<&'a Company>,
    pub owner: PricingOwner,
    pub billable: Option<&'a BillableQuantity>,
    /// Explicit currency choice; the owner's default when `None`.
    pub currency: Option<&'a str>,
    pub exchange: RateSelection,
    pub period: ServicePeriod,
    pub issue_date: NaiveDate,
    pub history: &'a [Invoice],
}

/// Build the complete invoice record, or say which input is missing.
pub fn assemble_invoice(inputs: &InvoiceInputs<'_>) -> Result<InvoiceData, Incomplete> {
    let client = inputs.client.ok_or(Incomplete::Client)?;
    let project = inputs.project.ok_or(Incomplete::Project)?;
    if project.client_id != client.id {
        return Err(Incomplete::ProjectClientMismatch);
    }
    let company = inputs.company.ok_or(Incomplete::Company)?;
    let billable = inputs.billable.ok_or(Incomplete::Billable)?;

    let terms = BillingTerms::resolve(inputs.owner, client, project);
    let rate = terms.rate.filter(|r| *r > 0.0).ok_or(Incomplete::Billable)?;
    if !billable.quantity.is_finite() || billable.quantity <= 0.0 {
        return Err(Incomplete::Billable);
    }

    let currency = inputs.currency.unwrap_or(terms.currency).trim().to_uppercase();
    let (exchange_rate, exchange_rate_date, used_max_exchange_rate) = if is_home_currency(&currency) {
        (1.0, inputs.issue_date, false)
    } else {
        let (Some(rate), Some(date)) = (inputs.exchange.rate, inputs.exchange.date) else {
            return Err(Incomplete::ExchangeRate(currency));
        };
        (rate, date, inputs.exchange.used_fixed)
    };

    let amount = billable.quantity * rate;
    let (vat_rate, vat_amount) = if terms.has_vat {
        (Some(company.vat_rate), amount * company.vat_rate)
    } else {
        (None, 0.0)
    };
    let subtotal = amount;
    let total = subtotal + vat_amount;

    let history = inputs
        .history
        .iter()
        .filter(|inv| terms.in_scope(inv, client, project))
        .map(|inv| inv.data.invoice_number.as_str());
    let invoice_number = next_invoice_number(terms.scope_name, terms.prefix_override, history);

    let due_date = inputs
        .issue_date
        .checked_add_days(Days::new(u64::from(company.payment_terms_days)))
        .unwrap_or(inputs.issue_date);

    debug!(%invoice_number, amount, vat_amount, total, "assembled invoice");

    Ok(InvoiceData {
        invoice_number,
        company: PartySnapshot::from(company),
        client: PartySnapshot::from(client),
        client_id: client.id.clone(),
        project_id: project.id.clone(),
        project_name: project.name.clone(),
        issue_date: inputs.issue_date,
        due_date,
        invoiced_month: inputs.period.month,
        invoiced_year: inputs.period.year,
        currency,
        language: client.language,
        items: vec![LineItem {
            description: billable.description.clone(),
            quantity: billable.quantity,
            unit: billable.unit.clone(),
            rate,
            amount,
        }],
        subtotal,
        vat_amount,
        vat_rate,
        total,
        total_ron: Some(total * exchange_rate),
        exchange_rate: Some(exchange_rate),
        exchange_rate_date: Some(exchange_rate_date),
        used_max_exchange_rate,
        billed_timecard_ids: billable.timecard_ids.clone(),
        theme: project.theme.clone(),
    })
}
