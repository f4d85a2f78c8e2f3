//! Daily exchange rates against the home currency.
//!
//! Rates come from the National Bank of Romania reference feed, a single XML
//! snapshot listing every currency for one day. Some currencies are quoted per
//! N units through a `multiplier` attribute.

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::FixedRate;

pub const HOME_CURRENCY: &str = "RON";
pub const BNR_FEED_URL: &str = "https://www.bnr.ro/nbrfxrates.xml";

pub fn is_home_currency(currency: &str) -> bool {
    currency.trim().eq_ignore_ascii_case(HOME_CURRENCY)
}

/// A per-unit rate to the home currency and the day it was published.
/// Both fields are `None` when the rate could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ExchangeRate {
    pub rate: Option<f64>,
    pub date: Option<NaiveDate>,
}

impl ExchangeRate {
    pub fn unavailable() -> Self {
        ExchangeRate { rate: None, date: None }
    }

    pub fn is_available(&self) -> bool {
        self.rate.is_some()
    }
}

pub trait RateProvider {
    fn get_rate(&self, currency: &str) -> ExchangeRate;
}

/// Source of the raw feed document.
pub trait RateFeed {
    fn fetch(&self) -> Result<String>;
}

pub struct HttpFeed {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpFeed {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(HttpFeed { url: url.to_string(), client })
    }
}

impl RateFeed for HttpFeed {
    fn fetch(&self) -> Result<String> {
        let body = self.client.get(&self.url).send()?.error_for_status()?.text()?;
        Ok(body)
    }
}

/// Fetches the feed on every call; the snapshot is never cached between currencies.
pub struct BnrProvider<F: RateFeed> {
    feed: F,
}

impl<F: RateFeed> BnrProvider<F> {
    pub fn new(feed: F) -> Self {
        BnrProvider { feed }
    }
}

impl<F: RateFeed> RateProvider for BnrProvider<F> {
    fn get_rate(&self, currency: &str) -> ExchangeRate {
        if is_home_currency(currency) {
            return ExchangeRate { rate: Some(1.0), date: Some(Local::now().date_naive()) };
        }
        let xml = match self.feed.fetch() {
            Ok(xml) => xml,
            Err(e) => {
                warn!(currency, error = %e, "exchange rate feed unavailable");
                return ExchangeRate::unavailable();
            }
        };
        let parsed = parse_feed(&xml, currency);
        if !parsed.is_available() {
            warn!(currency, "currency missing from exchange rate feed");
        }
        parsed
    }
}

/// Pull the normalized per-unit rate for `currency` out of a BNR feed document.
pub fn parse_feed(xml: &str, currency: &str) -> ExchangeRate {
    let code = currency.trim().to_uppercase();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return ExchangeRate::unavailable();
    }

    let rate_pattern = format!(
        r#"<Rate\s+currency="{code}"(?:\s+multiplier="(\d+)")?\s*>\s*([0-9]+(?:\.[0-9]+)?)\s*</Rate>"#
    );
    let Ok(rate_re) = Regex::new(&rate_pattern) else {
        return ExchangeRate::unavailable();
    };
    let Some(caps) = rate_re.captures(xml) else {
        return ExchangeRate::unavailable();
    };

    let multiplier: f64 = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(1.0);
    let Ok(quoted) = caps[2].parse::<f64>() else {
        return ExchangeRate::unavailable();
    };
    if multiplier <= 0.0 {
        return ExchangeRate::unavailable();
    }

    // A rate without its publication date is no rate at all
    let Some(date) = Regex::new(r#"<Cube\s+date="(\d{4}-\d{2}-\d{2})""#)
        .ok()
        .and_then(|re| re.captures(xml))
        .and_then(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok())
    else {
        return ExchangeRate::unavailable();
    };

    ExchangeRate { rate: Some(quoted / multiplier), date: Some(date) }
}

/// Exchange rate chosen for an invoice draft.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSelection {
    pub rate: Option<f64>,
    pub date: Option<NaiveDate>,
    pub used_fixed: bool,
}

/// Decide which rate applies, in order: home currency is always 1, a fixed
/// rate is used verbatim, anything else is asked of the provider.
///
/// Call once per client/project selection and once per explicit currency
/// change; never because some unrelated data changed.
pub fn select_exchange_rate(
    currency: &str,
    fixed: Option<&FixedRate>,
    provider: &dyn RateProvider,
    today: NaiveDate,
) -> RateSelection {
    if is_home_currency(currency) {
        return RateSelection { rate: Some(1.0), date: Some(today), used_fixed: false };
    }
    if let Some(fixed) = fixed {
        debug!(currency, rate = fixed.rate, "using fixed exchange rate");
        return RateSelection { rate: Some(fixed.rate), date: Some(fixed.date), used_fixed: true };
    }
    let fetched = provider.get_rate(currency);
    debug!(currency, rate = ?fetched.rate, "fetched exchange rate");
    RateSelection { rate: fetched.rate, date: fetched.date, used_fixed: false }
}
