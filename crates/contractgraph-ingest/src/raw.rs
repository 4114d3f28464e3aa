//! Wire shapes of the extraction collaborator's output.
//!
//! Deliberately lenient: every field is optional and the aliases the
//! extraction prompt has historically produced (`agreement_name` vs `name`,
//! `clause_type` vs `type`) are accepted. Strictness lives in the
//! normalizer, where a violation can be reported instead of a bare serde
//! error.

use serde::Deserialize;

/// One document's raw extraction payload.
///
/// The collaborator nests `parties`/`governing_law`/`clauses` inside the
/// `agreement` object; older payloads put them at the top level. Both are
/// accepted, with the nested form taking precedence when present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub agreement: RawAgreement,
    #[serde(default)]
    pub parties: Vec<RawParty>,
    #[serde(default)]
    pub governing_law: Option<RawGoverningLaw>,
    #[serde(default)]
    pub clauses: Vec<RawClause>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAgreement {
    #[serde(default, alias = "agreement_name")]
    pub name: Option<String>,
    #[serde(default, alias = "type")]
    pub agreement_type: Option<String>,
    #[serde(default)]
    pub effective_date: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub renewal_term: Option<String>,
    #[serde(default, alias = "notice_period")]
    pub notice_period_to_terminate_renewal: Option<String>,
    // Nested form of the sibling blocks.
    #[serde(default)]
    pub parties: Vec<RawParty>,
    #[serde(default)]
    pub governing_law: Option<RawGoverningLaw>,
    #[serde(default)]
    pub clauses: Vec<RawClause>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawParty {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub incorporation_country: Option<String>,
    #[serde(default)]
    pub incorporation_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGoverningLaw {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub most_favored_country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClause {
    #[serde(default, alias = "type")]
    pub clause_type: Option<String>,
    /// Absent in some payloads; the normalizer infers it from the excerpt
    /// list and flags the inference.
    #[serde(default)]
    pub exists: Option<bool>,
    #[serde(default)]
    pub excerpts: Vec<String>,
}

impl RawDocument {
    /// Resolve the nested-vs-top-level placement of the sibling blocks.
    pub(crate) fn parties(&self) -> &[RawParty] {
        if !self.agreement.parties.is_empty() {
            &self.agreement.parties
        } else {
            &self.parties
        }
    }

    pub(crate) fn governing_law(&self) -> Option<&RawGoverningLaw> {
        self.agreement.governing_law.as_ref().or(self.governing_law.as_ref())
    }

    pub(crate) fn clauses(&self) -> &[RawClause] {
        if !self.agreement.clauses.is_empty() {
            &self.agreement.clauses
        } else {
            &self.clauses
        }
    }
}
