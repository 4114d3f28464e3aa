//! Extraction normalizer.
//!
//! Raw extraction output is untrusted: the upstream language model may emit
//! inconsistent field names, impossible exists/excerpt combinations, dates
//! in arbitrary formats, or clause types outside the taxonomy. This crate
//! turns one document's raw payload into a [`CanonicalDocument`], or
//! quarantines it with the list of violations, so no partial write can ever
//! reach the graph.
//!
//! Rules of the boundary:
//! - unknown clause types are a [`SchemaViolation`], never silently dropped;
//! - recoverable inconsistencies are coerced and recorded as [`Coercion`]s;
//! - date-like fields are normalized to ISO-8601 only when an absolute date
//!   is recoverable, otherwise carried as explicitly-unparsed text;
//! - missing clause entries are backfilled as `exists=false`, so every
//!   canonical document covers all 30 clause types.

pub mod dates;
pub mod jurisdiction;
mod normalize;
mod raw;

pub use normalize::{
    normalize_document, Coercion, NormalizeOutcome, NormalizedDocument, Quarantined,
    SchemaViolation,
};
pub use raw::{RawClause, RawDocument, RawGoverningLaw, RawParty};
