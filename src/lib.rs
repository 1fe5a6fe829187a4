//! Reconciliation of construction-project exports: matching BOQ activities
//! and KPI records to projects, aggregating planned vs. actual progress and
//! deriving project lifecycle statuses.
pub mod aggregate;
pub mod codes;
pub mod config;
pub mod dates;
pub mod error;
pub mod loader;
pub mod output;
pub mod reports;
pub mod status;
pub mod store;
pub mod types;
pub mod util;
pub mod zones;
