//! Canonical document model.
//!
//! A [`CanonicalDocument`] is what the normalizer produces and the graph
//! writer persists: one agreement, its parties, its governing law, and a
//! complete clause instance per member of the taxonomy.

use crate::clause_type::{ClauseType, CLAUSE_TYPE_COUNT};
use crate::field_value::FieldValue;
use serde::{Deserialize, Serialize};

/// Agreement-level attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementFacts {
    pub name: String,
    pub agreement_type: String,
    pub effective_date: FieldValue,
    pub expiration_date: FieldValue,
    pub renewal_term: FieldValue,
    pub notice_period_to_terminate_renewal: FieldValue,
}

/// One party occurrence, scoped to its agreement.
///
/// The same real-world organization appearing in two agreements is two
/// independent records; no cross-document identity resolution is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    /// Free-text role label ("Licensor", "Service Provider", ...).
    pub role: String,
    pub incorporation_country: Option<String>,
    pub incorporation_state: Option<String>,
}

/// Governing law for one agreement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoverningLaw {
    /// Countries named in the governing-law clause, insertion order.
    pub countries: Vec<String>,
    pub state: Option<String>,
    /// Always a member of `countries` when present.
    pub most_favored_country: Option<String>,
}

/// Per-agreement, per-clause-type record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseInstance {
    pub clause_type: ClauseType,
    pub exists: bool,
    /// Verbatim text spans from the source contract. Empty iff `exists`
    /// is false.
    pub excerpts: Vec<String>,
}

impl ClauseInstance {
    pub fn absent(clause_type: ClauseType) -> Self {
        Self {
            clause_type,
            exists: false,
            excerpts: Vec::new(),
        }
    }
}

/// The canonical shape of one ingested source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    /// Stable identity key: the source document identifier. Re-ingesting
    /// the same source replaces this document's subgraph in place.
    pub source_id: String,
    pub agreement: AgreementFacts,
    pub parties: Vec<Party>,
    pub governing_law: GoverningLaw,
    /// Exactly one instance per clause type, in canonical taxonomy order.
    pub clauses: Vec<ClauseInstance>,
}

/// A structural invariant broken by a (would-be) canonical document.
///
/// The normalizer guarantees these never hold for its output; the check is
/// re-run by the graph writer as a last line of defense before a write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("expected {CLAUSE_TYPE_COUNT} clause instances, found {0}")]
    ClauseCount(usize),
    #[error("clause set does not cover the taxonomy (missing or duplicated: {0})")]
    ClauseCoverage(ClauseType),
    #[error("clause {0}: exists flag and excerpt presence disagree")]
    ExistsExcerptMismatch(ClauseType),
    #[error("most_favored_country {0:?} is not among the named governing countries")]
    MostFavoredCountry(String),
    #[error("source_id is empty")]
    EmptySourceId,
}

impl CanonicalDocument {
    /// Verify invariants 1, 2 and 4 of the data model.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.source_id.trim().is_empty() {
            return Err(InvariantViolation::EmptySourceId);
        }
        if self.clauses.len() != CLAUSE_TYPE_COUNT {
            return Err(InvariantViolation::ClauseCount(self.clauses.len()));
        }
        for (expected, clause) in ClauseType::ALL.iter().zip(&self.clauses) {
            if clause.clause_type != *expected {
                return Err(InvariantViolation::ClauseCoverage(*expected));
            }
            if clause.exists == clause.excerpts.is_empty() {
                return Err(InvariantViolation::ExistsExcerptMismatch(clause.clause_type));
            }
        }
        if let Some(mfc) = &self.governing_law.most_favored_country {
            if !self.governing_law.countries.iter().any(|c| c == mfc) {
                return Err(InvariantViolation::MostFavoredCountry(mfc.clone()));
            }
        }
        Ok(())
    }

    /// The instance for one clause type. Present by construction on any
    /// document that passes [`check_invariants`](Self::check_invariants).
    pub fn clause(&self, clause_type: ClauseType) -> Option<&ClauseInstance> {
        self.clauses.iter().find(|c| c.clause_type == clause_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_doc() -> CanonicalDocument {
        CanonicalDocument {
            source_id: "acme_msa.pdf".into(),
            agreement: AgreementFacts {
                name: "Master Services Agreement".into(),
                agreement_type: "Service".into(),
                ..Default::default()
            },
            parties: vec![],
            governing_law: GoverningLaw {
                countries: vec!["United States".into()],
                state: Some("New York".into()),
                most_favored_country: Some("United States".into()),
            },
            clauses: ClauseType::ALL.iter().map(|ct| ClauseInstance::absent(*ct)).collect(),
        }
    }

    #[test]
    fn full_backfilled_doc_passes() {
        assert_eq!(minimal_doc().check_invariants(), Ok(()));
    }

    #[test]
    fn missing_clause_is_caught() {
        let mut doc = minimal_doc();
        doc.clauses.pop();
        assert_eq!(
            doc.check_invariants(),
            Err(InvariantViolation::ClauseCount(CLAUSE_TYPE_COUNT - 1))
        );
    }

    #[test]
    fn exists_without_excerpts_is_caught() {
        let mut doc = minimal_doc();
        doc.clauses[0].exists = true;
        assert_eq!(
            doc.check_invariants(),
            Err(InvariantViolation::ExistsExcerptMismatch(
                ClauseType::CompetitiveRestrictionException
            ))
        );
    }

    #[test]
    fn foreign_most_favored_country_is_caught() {
        let mut doc = minimal_doc();
        doc.governing_law.most_favored_country = Some("France".into());
        assert!(matches!(
            doc.check_invariants(),
            Err(InvariantViolation::MostFavoredCountry(_))
        ));
    }
}
