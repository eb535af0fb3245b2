//! Data models for metric reconciliation
//!
//! This module contains the core data types flowing through the crate:
//! - `candidate` - One source's observation of a metric (Candidate)
//! - `observation` - The validated adapter response (SourceObservation)
//! - `provenance` - Audit records of ingested observations (ProvenanceRecord)
//! - `result` - Reconciliation outcomes (ReconciliationResult, Confidence,
//!   Issue, Diagnostics, ProvenanceEntry)

mod candidate;
mod observation;
mod provenance;
mod result;

pub use candidate::Candidate;
pub use observation::SourceObservation;
pub use provenance::ProvenanceRecord;
pub use result::{Confidence, Diagnostics, Issue, ProvenanceEntry, ReconciliationResult};
