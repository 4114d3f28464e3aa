//! The graph-store seam.

use contractgraph_schema::{AgreementFacts, CanonicalDocument, ClauseInstance, ClauseType, GoverningLaw, Party};
use serde::{Deserialize, Serialize};

/// Errors surfaced by a graph store.
///
/// The split matters to the writer: `Unavailable` is transient and retried
/// with backoff; `Rejected` is the caller's fault and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("graph store unavailable: {0}")]
    Unavailable(String),
    #[error("graph store rejected the write: {0}")]
    Rejected(String),
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertReceipt {
    Created,
    Replaced,
}

/// One agreement's subgraph, read back through the relationship
/// traversals. Parties and clauses come back in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementView {
    pub source_id: String,
    pub facts: AgreementFacts,
    pub parties: Vec<Party>,
    pub governing_law: GoverningLaw,
    pub clauses: Vec<ClauseInstance>,
}

impl AgreementView {
    pub fn clause(&self, clause_type: ClauseType) -> Option<&ClauseInstance> {
        self.clauses.iter().find(|c| c.clause_type == clause_type)
    }
}

/// A reference to one excerpt, used to build the similarity index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcerptRef {
    pub source_id: String,
    pub clause_type: ClauseType,
    pub text: String,
}

/// Corpus-level counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub agreements: u64,
    pub parties: u64,
    pub clause_instances: u64,
    pub clauses_present: u64,
    pub excerpts: u64,
    pub countries: u64,
}

/// Interface to the graph engine.
///
/// Writes are document-scoped and atomic: `upsert_document` either merges
/// the whole subgraph (replacing any prior subgraph for the same source)
/// or changes nothing. Reads are side-effect-free and may run unbounded.
pub trait GraphStore: Send + Sync {
    /// Merge one canonical document under a single per-document
    /// transaction. `digest` is an opaque content fingerprint stored on
    /// the agreement for idempotence checks.
    fn upsert_document(
        &self,
        doc: &CanonicalDocument,
        digest: &str,
    ) -> Result<UpsertReceipt, StoreError>;

    /// Content digest recorded for a source document, when present.
    fn document_digest(&self, source_id: &str) -> Option<String>;

    /// Direct lookup by the agreement identity key.
    fn agreement(&self, source_id: &str) -> Option<AgreementView>;

    /// All agreements, ordered by identity key ascending.
    fn agreements(&self) -> Vec<AgreementView>;

    /// Agreements with a party of exactly this name (case-insensitive).
    fn agreements_by_party(&self, party_name: &str) -> Vec<AgreementView>;

    /// Agreements whose instance of `clause_type` has the given `exists`
    /// flag.
    fn agreements_by_clause(&self, clause_type: ClauseType, exists: bool) -> Vec<AgreementView>;

    /// Agreements governed by the named country (case-insensitive).
    fn agreements_by_governing_country(&self, country: &str) -> Vec<AgreementView>;

    /// Every excerpt of every `exists=true` clause, ordered by agreement
    /// identity key then clause order then excerpt order.
    fn existing_excerpts(&self) -> Vec<ExcerptRef>;

    /// Corpus-level counts.
    fn stats(&self) -> GraphStats;
}
