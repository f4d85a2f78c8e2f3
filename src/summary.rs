use chrono::{Datelike, NaiveDate};
use comfy_table::{Attribute, Cell, Color, Table};
use std::collections::BTreeMap;

use crate::model::{Invoice, InvoiceStatus};

const RED: Color = Color::Rgb { r: 185, g: 28, b: 28 };
const GREEN: Color = Color::Rgb { r: 4, g: 120, b: 87 };

/// (paid, outstanding) amounts in the home currency.
pub type Split = (f64, f64);

fn home_amount(invoice: &Invoice) -> f64 {
    invoice.data.total_ron.unwrap_or(invoice.data.total)
}

fn add(split: &mut Split, invoice: &Invoice) {
    if invoice.status == InvoiceStatus::Paid {
        split.0 += home_amount(invoice);
    } else {
        split.1 += home_amount(invoice);
    }
}

pub fn monthly_totals(invoices: &[Invoice], year: i32) -> BTreeMap<(i32, u32), Split> {
    let mut totals: BTreeMap<(i32, u32), Split> = BTreeMap::new();
    for invoice in invoices.iter().filter(|i| i.data.issue_date.year() == year) {
        let key = (invoice.data.issue_date.year(), invoice.data.issue_date.month());
        add(totals.entry(key).or_insert((0.0, 0.0)), invoice);
    }
    totals
}

/// Per-client totals for the year, largest first.
pub fn client_totals(invoices: &[Invoice], year: i32) -> Vec<(String, Split)> {
    let mut totals: BTreeMap<String, Split> = BTreeMap::new();
    for invoice in invoices.iter().filter(|i| i.data.issue_date.year() == year) {
        add(totals.entry(invoice.data.client.name.clone()).or_insert((0.0, 0.0)), invoice);
    }
    let mut out: Vec<(String, Split)> = totals.into_iter().collect();
    out.sort_by(|a, b| (b.1.0 + b.1.1).total_cmp(&(a.1.0 + a.1.1)));
    out
}

fn amount_cell(value: f64, color: Color) -> Cell {
    let cell = Cell::new(format!("{value:.2} RON"));
    if value > 0.0 { cell.fg(color) } else { cell }
}

fn header() -> Vec<Cell> {
    vec![Cell::new("Paid"), Cell::new("Outstanding"), Cell::new("Total")]
}

pub fn monthly_table(invoices: &[Invoice], year: i32) -> Table {
    let mut table = Table::new();
    let mut head = vec![Cell::new("Month")];
    head.extend(header());
    table.set_header(head);

    let mut total_paid = 0.0;
    let mut total_open = 0.0;
    for ((y, m), (paid, open)) in monthly_totals(invoices, year).iter().rev() {
        let month = NaiveDate::from_ymd_opt(*y, *m, 1).map(|d| d.format("%B %Y").to_string()).unwrap_or_default();
        table.add_row(vec![
            Cell::new(month),
            amount_cell(*paid, GREEN),
            amount_cell(*open, RED),
            Cell::new(format!("{:.2} RON", paid + open)),
        ]);
        total_paid += paid;
        total_open += open;
    }

    table.add_row(vec![
        Cell::new(format!("Total ({year})")).add_attribute(Attribute::Bold),
        amount_cell(total_paid, GREEN).add_attribute(Attribute::Bold),
        amount_cell(total_open, RED).add_attribute(Attribute::Bold),
        Cell::new(format!("{:.2} RON", total_paid + total_open)).add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn client_table(invoices: &[Invoice], year: i32) -> Table {
    let mut table = Table::new();
    let mut head = vec![Cell::new("Client")];
    head.extend(header());
    table.set_header(head);

    for (client, (paid, open)) in client_totals(invoices, year) {
        table.add_row(vec![
            Cell::new(client),
            amount_cell(paid, GREEN),
            amount_cell(open, RED),
            Cell::new(format!("{:.2} RON", paid + open)),
        ]);
    }
    table
}
