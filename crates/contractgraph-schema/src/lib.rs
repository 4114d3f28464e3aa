//! Schema registry for the contract knowledge graph.
//!
//! This crate is the shared vocabulary consumed by every other crate:
//!
//! - [`ClauseType`]: the closed, process-wide set of 30 clause categories.
//!   Never created or deleted at runtime; validated at the ingestion
//!   boundary.
//! - [`FieldValue`]: the three-way value model for agreement attributes
//!   (an absolute ISO date, explicitly unparsed free text, or the
//!   "Not specified" sentinel).
//! - The canonical document model ([`CanonicalDocument`] and friends)
//!   that the normalizer produces and the graph writer persists.

pub mod clause_type;
pub mod document;
pub mod field_value;

pub use clause_type::{ClauseType, UnknownClauseType, CLAUSE_TYPE_COUNT};
pub use document::{
    AgreementFacts, CanonicalDocument, ClauseInstance, GoverningLaw, InvariantViolation, Party,
};
pub use field_value::FieldValue;
