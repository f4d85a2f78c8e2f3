//! Invoice documents: Tera fills a Typst source file, `typst` compiles it.

use serde::Serialize;
use slug::slugify;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tera::{Context, Tera};
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{Invoice, Language};
use crate::rates::is_home_currency;

// Embed template at compile time so a fresh data root can be initialised
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/invoice.tera");
const TEMPLATE_NAME: &str = "invoice.tera";

#[derive(Debug, Serialize)]
struct Labels {
    invoice: &'static str,
    tax_id: &'static str,
    bill_to: &'static str,
    issue_date: &'static str,
    due_date: &'static str,
    status: &'static str,
    description: &'static str,
    quantity: &'static str,
    unit: &'static str,
    rate: &'static str,
    amount: &'static str,
    subtotal: &'static str,
    total: &'static str,
    total_home: &'static str,
    reverse_charge: &'static str,
}

const LABELS_EN: Labels = Labels {
    invoice: "INVOICE",
    tax_id: "Tax ID",
    bill_to: "Bill to",
    issue_date: "Issue date",
    due_date: "Due date",
    status: "Status",
    description: "Description",
    quantity: "Qty",
    unit: "Unit",
    rate: "Rate",
    amount: "Amount",
    subtotal: "Subtotal",
    total: "Total",
    total_home: "Total (RON)",
    reverse_charge: "Reverse charge: VAT to be accounted for by the recipient.",
};

const LABELS_RO: Labels = Labels {
    invoice: "FACTURĂ",
    tax_id: "CUI",
    bill_to: "Cumpărător",
    issue_date: "Data emiterii",
    due_date: "Scadență",
    status: "Stare",
    description: "Descriere",
    quantity: "Cant.",
    unit: "U.M.",
    rate: "Preț unitar",
    amount: "Valoare",
    subtotal: "Subtotal",
    total: "Total",
    total_home: "Total (RON)",
    reverse_charge: "Taxare inversă: TVA datorată de beneficiar.",
};

#[derive(Debug, Serialize)]
struct Theme {
    accent: &'static str,
    muted: &'static str,
    font: &'static str,
}

fn theme(name: &str) -> Theme {
    match name {
        "modern" => Theme { accent: "#0f766e", muted: "#64748b", font: "New Computer Modern" },
        "minimal" => Theme { accent: "#111827", muted: "#9ca3af", font: "DejaVu Sans Mono" },
        _ => Theme { accent: "#1d4ed8", muted: "#6b7280", font: "Libertinus Serif" },
    }
}

#[derive(Debug, Serialize)]
struct PartyView {
    name: String,
    address: String,
    tax_id: String,
    iban: Option<String>,
    bank_name: Option<String>,
    swift: Option<String>,
}

#[derive(Debug, Serialize)]
struct ItemView {
    description: String,
    quantity: String,
    unit: String,
    rate: String,
    amount: String,
}

#[derive(Debug, Serialize)]
struct DocumentView {
    number: String,
    labels: Labels,
    theme: Theme,
    company: PartyView,
    client: PartyView,
    issue_date: String,
    due_date: String,
    status: String,
    currency: String,
    items: Vec<ItemView>,
    subtotal: String,
    vat_label: Option<String>,
    vat_amount: String,
    total: String,
    total_ron: Option<String>,
    exchange_note: Option<String>,
    reverse_charge: bool,
}

/// Backslash-escape everything Typst markup would interpret.
fn typst_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '#' | '*' | '_' | '$' | '<' | '>' | '@' | '[' | ']' | '`' | '~' | '/' | '=' | '-' | '+') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn opt_escape(s: &Option<String>) -> Option<String> {
    s.as_deref().map(typst_escape)
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn quantity(value: f64) -> String {
    // 2 days, 7.5 hours, 1.125 days
    let s = format!("{value:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn unit_label(unit: &str, language: Language) -> String {
    match (language, unit) {
        (Language::Romanian, "hours") => "ore".to_string(),
        (Language::Romanian, "days") => "zile".to_string(),
        _ => unit.to_string(),
    }
}

fn party(p: &crate::model::PartySnapshot) -> PartyView {
    PartyView {
        name: typst_escape(&p.name),
        address: typst_escape(&p.address),
        tax_id: typst_escape(&p.tax_id),
        iban: opt_escape(&p.bank.iban),
        bank_name: opt_escape(&p.bank.bank_name),
        swift: opt_escape(&p.bank.swift),
    }
}

fn document_view(invoice: &Invoice) -> DocumentView {
    let data = &invoice.data;
    let language = data.language;
    let labels = match language {
        Language::English => LABELS_EN,
        Language::Romanian => LABELS_RO,
    };
    let vat_word = match language {
        Language::English => "VAT",
        Language::Romanian => "TVA",
    };

    let exchange_note = match (data.exchange_rate, data.exchange_rate_date) {
        (Some(rate), Some(date)) if !is_home_currency(&data.currency) => {
            let source = match (language, data.used_max_exchange_rate) {
                (Language::English, true) => "contract rate",
                (Language::English, false) => "BNR rate",
                (Language::Romanian, true) => "curs contractual",
                (Language::Romanian, false) => "curs BNR",
            };
            Some(format!("1 {} = {:.4} RON ({}, {})", data.currency, rate, source, date.format("%d.%m.%Y")))
        }
        _ => None,
    };

    DocumentView {
        number: typst_escape(&data.invoice_number),
        labels,
        theme: theme(&data.theme),
        company: party(&data.company),
        client: party(&data.client),
        issue_date: data.issue_date.format("%d.%m.%Y").to_string(),
        due_date: data.due_date.format("%d.%m.%Y").to_string(),
        status: invoice.status.to_string(),
        currency: typst_escape(&data.currency),
        items: data
            .items
            .iter()
            .map(|item| ItemView {
                description: typst_escape(&item.description),
                quantity: quantity(item.quantity),
                unit: typst_escape(&unit_label(&item.unit, language)),
                rate: money(item.rate),
                amount: money(item.amount),
            })
            .collect(),
        subtotal: money(data.subtotal),
        vat_label: data.vat_rate.map(|r| format!("{} {}%", vat_word, quantity(r * 100.0))),
        vat_amount: money(data.vat_amount),
        total: money(data.total),
        total_ron: data.total_ron.map(money),
        exchange_note,
        reverse_charge: data.vat_rate == Some(0.0),
    }
}

/// Typst source for the invoice. Uses `templates/invoice.tera` under
/// `template_dir` when present, the built-in template otherwise.
pub fn render_source(invoice: &Invoice, template_dir: Option<&Path>) -> Result<String> {
    let mut tera = Tera::default();
    match template_dir.map(|d| d.join(TEMPLATE_NAME)).filter(|p| p.exists()) {
        Some(path) => tera.add_template_file(&path, Some(TEMPLATE_NAME))?,
        None => tera.add_raw_template(TEMPLATE_NAME, DEFAULT_TEMPLATE)?,
    }
    let context = Context::from_serialize(document_view(invoice))?;
    Ok(tera.render(TEMPLATE_NAME, &context)?)
}

pub fn pdf_file_name(invoice: &Invoice) -> String {
    format!("invoice-{}.pdf", invoice.data.invoice_number)
}

/// Where an invoice's files go: `<output>/<year>/<client-slug>/`.
pub fn output_dir_for(output_root: &Path, invoice: &Invoice) -> PathBuf {
    output_root
        .join(invoice.data.issue_date.format("%Y").to_string())
        .join(slugify(&invoice.data.client.name))
}

/// Write the default template into `template_dir` if the user has none yet.
pub fn init_template(template_dir: &Path) -> Result<()> {
    let path = template_dir.join(TEMPLATE_NAME);
    if !path.exists() {
        fs::create_dir_all(template_dir)?;
        fs::write(&path, DEFAULT_TEMPLATE)?;
        info!(path = %path.display(), "initialised default template");
    }
    Ok(())
}

/// Render and compile the invoice to `invoice-{number}.pdf`. Returns the PDF path.
pub fn export_pdf(invoice: &Invoice, template_dir: &Path, output_root: &Path) -> Result<PathBuf> {
    if Command::new("typst").arg("--version").output().is_err() {
        return Err(Error::Render("'typst' is not installed (brew install typst)".to_string()));
    }
    init_template(template_dir)?;
    let source = render_source(invoice, Some(template_dir))?;

    let output_dir = output_dir_for(output_root, invoice);
    fs::create_dir_all(&output_dir)?;
    let pdf_path = output_dir.join(pdf_file_name(invoice));
    let typ_path = pdf_path.with_extension("typ");
    fs::write(&typ_path, source)?;

    let status = Command::new("typst").arg("compile").arg(&typ_path).arg(&pdf_path).status()?;
    if !status.success() {
        return Err(Error::Render(format!("typst exited with {status}")));
    }
    info!(path = %pdf_path.display(), "rendered invoice");
    Ok(pdf_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BankDetails, InvoiceData, InvoiceStatus, LineItem, PartySnapshot};
    use chrono::NaiveDate;

    fn party(name: &str) -> PartySnapshot {
        PartySnapshot {
            name: name.into(),
            address: "Str. Lunga 1".into(),
            tax_id: "RO1".into(),
            bank: BankDetails { iban: Some("RO49AAAA1B31007593840000".into()), bank_name: None, swift: None },
        }
    }

    fn invoice(vat_rate: Option<f64>, language: Language) -> Invoice {
        let d = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        Invoice {
            id: "i1".into(),
            status: InvoiceStatus::Created,
            data: InvoiceData {
                invoice_number: "DP001".into(),
                company: party("My Company"),
                client: party("Innovate Inc."),
                client_id: "c1".into(),
                project_id: "p1".into(),
                project_name: "Data Platform".into(),
                issue_date: d,
                due_date: d,
                invoiced_month: 5,
                invoiced_year: 2024,
                currency: "EUR".into(),
                language,
                items: vec![LineItem {
                    description: "Data Platform services for May 2024".into(),
                    quantity: 10.0,
                    unit: "days".into(),
                    rate: 500.0,
                    amount: 5000.0,
                }],
                subtotal: 5000.0,
                vat_amount: vat_rate.map_or(0.0, |r| 5000.0 * r),
                vat_rate,
                total: 5000.0 + vat_rate.map_or(0.0, |r| 5000.0 * r),
                total_ron: Some(29571.5),
                exchange_rate: Some(4.97),
                exchange_rate_date: Some(d),
                used_max_exchange_rate: false,
                billed_timecard_ids: vec![],
                theme: "classic".into(),
            },
        }
    }

    #[test]
    fn vat_line_follows_rate_presence() {
        let with = render_source(&invoice(Some(0.19), Language::English), None).unwrap();
        assert!(with.contains("VAT 19%"));
        assert!(with.contains("5950.00 EUR"));
        assert!(!with.contains("Reverse charge"));

        let without = render_source(&invoice(None, Language::English), None).unwrap();
        assert!(!without.contains("VAT "));

        let reverse = render_source(&invoice(Some(0.0), Language::English), None).unwrap();
        assert!(reverse.contains("VAT 0%"));
        assert!(reverse.contains("Reverse charge"));
    }

    #[test]
    fn romanian_labels_and_units() {
        let src = render_source(&invoice(Some(0.19), Language::Romanian), None).unwrap();
        assert!(src.contains("FACTURĂ"));
        assert!(src.contains("TVA 19%"));
        assert!(src.contains("zile"));
        assert!(src.contains("29571.50 RON"));
    }

    #[test]
    fn escapes_typst_markup() {
        assert_eq!(typst_escape("A #1 *deal*"), "A \\#1 \\*deal\\*");
    }

    #[test]
    fn file_name_and_location() {
        let inv = invoice(None, Language::English);
        assert_eq!(pdf_file_name(&inv), "invoice-DP001.pdf");
        assert_eq!(output_dir_for(Path::new("/out"), &inv), PathBuf::from("/out/2024/innovate-inc"));
    }

    #[test]
    fn quantities_drop_trailing_zeros() {
        assert_eq!(quantity(2.0), "2");
        assert_eq!(quantity(7.5), "7.5");
        assert_eq!(quantity(1.125), "1.125");
    }

    #[test]
    fn user_template_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(TEMPLATE_NAME), "custom {{ number }}").unwrap();
        let src = render_source(&invoice(None, Language::English), Some(dir.path())).unwrap();
        assert_eq!(src, "custom DP001");
    }
}
