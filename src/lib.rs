//! Time tracking and invoicing for freelancers billing in foreign currencies.

pub mod billable;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod model;
pub mod numbering;
pub mod rates;
pub mod render;
pub mod store;
pub mod summary;

pub use error::{Error, Result};
