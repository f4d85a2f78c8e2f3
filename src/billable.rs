use chrono::Datelike;
use serde::Serialize;

use crate::model::{Language, RateType, Timecard, TimecardStatus};

/// Fixed workday used to turn logged hours into billable days.
pub const HOURS_PER_DAY: f64 = 8.0;

const MONTHS_EN: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];
const MONTHS_RO: [&str; 12] = [
    "ianuarie", "februarie", "martie", "aprilie", "mai", "iunie",
    "iulie", "august", "septembrie", "octombrie", "noiembrie", "decembrie",
];

pub fn month_name(month: u32, language: Language) -> &'static str {
    let names = match language {
        Language::English => &MONTHS_EN,
        Language::Romanian => &MONTHS_RO,
    };
    month.checked_sub(1).and_then(|i| names.get(i as usize)).copied().unwrap_or("")
}

/// The service month an invoice covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServicePeriod {
    pub month: u32,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationMode {
    /// Hours or days typed in by hand, matching the rate type.
    Manual { quantity: f64 },
    /// Sum of the chosen unbilled timecards.
    Timecards { selected: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillableQuantity {
    pub quantity: f64,
    pub unit: String,
    pub description: String,
    pub timecard_ids: Vec<String>,
}

/// What the resolver needs to know about the priced scope.
#[derive(Debug, Clone, Copy)]
pub struct Pricing<'a> {
    pub project_id: &'a str,
    pub project_name: &'a str,
    pub rate: Option<f64>,
    pub rate_type: RateType,
    pub language: Language,
}

pub fn unit_for(rate_type: RateType) -> &'static str {
    match rate_type {
        RateType::Hourly => "hours",
        RateType::Daily => "days",
    }
}

pub fn line_description(project_name: &str, period: ServicePeriod, language: Language) -> String {
    let month = month_name(period.month, language);
    match language {
        Language::English => format!("{} services for {} {}", project_name, month, period.year),
        Language::Romanian => format!("Servicii {} pentru luna {} {}", project_name, month, period.year),
    }
}

/// Unbilled timecards of the project dated inside the service month.
pub fn candidate_timecards<'a>(
    timecards: &'a [Timecard],
    project_id: &str,
    period: ServicePeriod,
) -> Vec<&'a Timecard> {
    let mut out: Vec<&Timecard> = timecards
        .iter()
        .filter(|t| t.status == TimecardStatus::Unbilled)
        .filter(|t| t.project_id == project_id)
        .filter(|t| t.date.month() == period.month && t.date.year() == period.year)
        .collect();
    out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    out
}

/// Resolve the billable quantity, or `None` when no invoice is possible.
pub fn resolve(
    mode: &GenerationMode,
    pricing: Pricing<'_>,
    period: ServicePeriod,
    timecards: &[Timecard],
) -> Option<BillableQuantity> {
    // NaN and negative rates fail closed too
    if !pricing.rate.is_some_and(|r| r > 0.0) {
        return None;
    }
    let description = line_description(pricing.project_name, period, pricing.language);
    let unit = unit_for(pricing.rate_type).to_string();

    match mode {
        GenerationMode::Manual { quantity } => {
            if !quantity.is_finite() || *quantity <= 0.0 {
                return None;
            }
            Some(BillableQuantity { quantity: *quantity, unit, description, timecard_ids: Vec::new() })
        }
        GenerationMode::Timecards { selected } => {
            let chosen: Vec<&Timecard> = candidate_timecards(timecards, pricing.project_id, period)
                .into_iter()
                .filter(|t| selected.contains(&t.id))
                .collect();
            if chosen.is_empty() {
                return None;
            }
            let hours: f64 = chosen.iter().map(|t| t.hours).sum();
            let quantity = match pricing.rate_type {
                RateType::Hourly => hours,
                RateType::Daily => hours / HOURS_PER_DAY,
            };
            let timecard_ids = chosen.iter().map(|t| t.id.clone()).collect();
            Some(BillableQuantity { quantity, unit, description, timecard_ids })
        }
    }
}
