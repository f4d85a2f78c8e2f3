use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::Record;

/// Id of the company profile created on first run. Never deleted, only merged.
pub const MY_COMPANY_ID: &str = "my-company";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    Romanian,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
    #[default]
    Hourly,
    Daily,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimecardStatus {
    #[default]
    Unbilled,
    Billed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvoiceStatus {
    #[default]
    Created,
    Sent,
    Paid,
}

impl InvoiceStatus {
    /// The only status this one may move to, if any.
    pub fn next(self) -> Option<InvoiceStatus> {
        match self {
            InvoiceStatus::Created => Some(InvoiceStatus::Sent),
            InvoiceStatus::Sent => Some(InvoiceStatus::Paid),
            InvoiceStatus::Paid => None,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceStatus::Created => "Created",
            InvoiceStatus::Sent => "Sent",
            InvoiceStatus::Paid => "Paid",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    pub iban: Option<String>,
    pub bank_name: Option<String>,
    pub swift: Option<String>,
}

/// Contractually agreed rate that overrides the daily market rate.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct FixedRate {
    pub rate: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub address: String,
    pub tax_id: String,
    #[serde(default)]
    pub bank: BankDetails,
    #[serde(default)]
    pub language: Language,
    pub currency: String,
    pub has_vat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_exchange_rate: Option<FixedRate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_prefix: Option<String>,
    #[serde(default)]
    pub order: u32,
    // Only read when billing terms are owned by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_type: Option<RateType>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_name: String,
    pub currency: String,
    pub has_vat: bool,
    pub rate: f64,
    #[serde(default)]
    pub rate_type: RateType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_exchange_rate: Option<FixedRate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_prefix: Option<String>,
    #[serde(default = "default_theme")]
    pub theme: String,
}

pub fn default_theme() -> String {
    "classic".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timecard {
    pub id: String,
    pub project_id: String,
    pub project_name: String,
    pub client_name: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TimecardStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
}

impl Timecard {
    pub fn is_billed(&self) -> bool {
        self.status == TimecardStatus::Billed
    }
}

/// The issuing company. Stored once, under [`MY_COMPANY_ID`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
    pub address: String,
    pub tax_id: String,
    #[serde(default)]
    pub bank: BankDetails,
    pub vat_rate: f64,
    #[serde(default = "default_payment_terms")]
    pub payment_terms_days: u32,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

fn default_payment_terms() -> u32 {
    30
}

impl Company {
    /// Profile written on first run; the user fills the placeholders in later.
    pub fn placeholder() -> Self {
        Company {
            id: MY_COMPANY_ID.to_string(),
            name: "My Company".to_string(),
            address: "Company address".to_string(),
            tax_id: "RO00000000".to_string(),
            bank: BankDetails::default(),
            vat_rate: 0.19,
            payment_terms_days: default_payment_terms(),
            email: None,
            phone: None,
        }
    }
}

/// Identity and bank fields copied onto an invoice at creation time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartySnapshot {
    pub name: String,
    pub address: String,
    pub tax_id: String,
    #[serde(default)]
    pub bank: BankDetails,
}

impl From<&Client> for PartySnapshot {
    fn from(c: &Client) -> Self {
        PartySnapshot {
            name: c.name.clone(),
            address: c.address.clone(),
            tax_id: c.tax_id.clone(),
            bank: c.bank.clone(),
        }
    }
}

impl From<&Company> for PartySnapshot {
    fn from(c: &Company) -> Self {
        PartySnapshot {
            name: c.name.clone(),
            address: c.address.clone(),
            tax_id: c.tax_id.clone(),
            bank: c.bank.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit: String,
    pub rate: f64,
    pub amount: f64,
}

/// Everything the computation engine derives. Immutable once saved.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceData {
    pub invoice_number: String,
    pub company: PartySnapshot,
    pub client: PartySnapshot,
    pub client_id: String,
    pub project_id: String,
    pub project_name: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub invoiced_month: u32,
    pub invoiced_year: i32,
    pub currency: String,
    pub language: Language,
    pub items: Vec<LineItem>,
    pub subtotal: f64,
    pub vat_amount: f64,
    // Absent means VAT does not apply; Some(0.0) is reverse charge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_rate: Option<f64>,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_ron: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate_date: Option<NaiveDate>,
    pub used_max_exchange_rate: bool,
    #[serde(default)]
    pub billed_timecard_ids: Vec<String>,
    pub theme: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(flatten)]
    pub data: InvoiceData,
}

impl Record for Client {
    const COLLECTION: &'static str = "clients";
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Project {
    const COLLECTION: &'static str = "projects";
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Timecard {
    const COLLECTION: &'static str = "timecards";
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Invoice {
    const COLLECTION: &'static str = "invoices";
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Company {
    const COLLECTION: &'static str = "profile";
    fn id(&self) -> &str {
        &self.id
    }
}
