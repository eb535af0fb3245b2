//! Reconciliation of multi-source metric data.
//!
//! Two layers: [`engine`] applies the full staleness/trust ladder to typed
//! candidates and grades the outcome, while [`cross_check`] offers quick
//! numeric agreement checks for composite records.

pub mod cross_check;
pub mod engine;

pub use cross_check::{composite_confidence, cross_validate, CrossCheck};
pub use engine::{ReconcileConfig, ReconciliationEngine};
