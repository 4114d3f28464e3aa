//! Validation and coercion of one raw extraction payload.

use crate::dates::normalize_date_field;
use crate::jurisdiction;
use crate::raw::{RawClause, RawDocument, RawGoverningLaw};
use chrono::{DateTime, Utc};
use contractgraph_schema::{
    AgreementFacts, CanonicalDocument, ClauseInstance, ClauseType, FieldValue, GoverningLaw,
    Party,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A fatal defect in the raw payload. Any one of these quarantines the
/// whole document; nothing is written to the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum SchemaViolation {
    #[error("payload is not a recognizable extraction object: {0}")]
    MalformedPayload(String),
    #[error("clause type {0:?} is not a member of the clause taxonomy")]
    UnknownClauseType(String),
    #[error("agreement block carries no name and no attributes")]
    EmptyAgreement,
}

/// A recoverable inconsistency that was repaired rather than rejected.
/// Recorded so operators can audit what the normalizer changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Coercion {
    /// `exists=false` arrived with excerpts attached; excerpts cleared.
    ExcerptsCleared { clause_type: ClauseType, dropped: usize },
    /// `exists=true` arrived with no excerpts; demoted to absent.
    ExistsWithoutExcerpts { clause_type: ClauseType },
    /// The `exists` flag was missing; inferred from excerpt presence.
    ExistsInferred { clause_type: ClauseType, inferred: bool },
    /// The same clause type appeared more than once; first occurrence kept.
    DuplicateClause { clause_type: ClauseType },
    /// Clause type matched the taxonomy only after case folding.
    ClauseTypeCaseFolded { given: String, clause_type: ClauseType },
    /// A party entry without a usable name was dropped.
    UnnamedPartyDropped { index: usize },
    /// most_favored_country named a country absent from the clause;
    /// replaced with a named one.
    MostFavoredCountryReplaced { given: String, replaced_with: Option<String> },
    /// A governing-law entry named a state; resolved to its country.
    StateResolvedToCountry { state: String, country: String },
}

impl fmt::Display for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coercion::ExcerptsCleared { clause_type, dropped } => {
                write!(f, "{clause_type}: cleared {dropped} excerpt(s) on an absent clause")
            }
            Coercion::ExistsWithoutExcerpts { clause_type } => {
                write!(f, "{clause_type}: exists=true without excerpts, demoted to absent")
            }
            Coercion::ExistsInferred { clause_type, inferred } => {
                write!(f, "{clause_type}: missing exists flag, inferred {inferred}")
            }
            Coercion::DuplicateClause { clause_type } => {
                write!(f, "{clause_type}: duplicate entry ignored")
            }
            Coercion::ClauseTypeCaseFolded { given, clause_type } => {
                write!(f, "clause type {given:?} canonicalized to {clause_type:?}")
            }
            Coercion::UnnamedPartyDropped { index } => {
                write!(f, "party #{index} had no name and was dropped")
            }
            Coercion::MostFavoredCountryReplaced { given, replaced_with } => match replaced_with {
                Some(c) => write!(f, "most_favored_country {given:?} replaced with {c:?}"),
                None => write!(f, "most_favored_country {given:?} dropped (not a named country)"),
            },
            Coercion::StateResolvedToCountry { state, country } => {
                write!(f, "governing-law state {state:?} resolved to country {country:?}")
            }
        }
    }
}

/// Successful normalization: a canonical document plus the audit trail of
/// repairs applied on the way.
#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    pub document: CanonicalDocument,
    pub coercions: Vec<Coercion>,
}

/// A rejected payload, held for operator inspection. Carries the original
/// JSON untouched; quarantining never writes to the graph.
#[derive(Debug, Clone, Serialize)]
pub struct Quarantined {
    pub id: Uuid,
    pub source_id: String,
    pub received_at: DateTime<Utc>,
    pub violations: Vec<SchemaViolation>,
    pub payload: serde_json::Value,
}

/// Outcome of normalizing one document.
#[derive(Debug, Clone)]
pub enum NormalizeOutcome {
    Normalized(Box<NormalizedDocument>),
    Quarantined(Box<Quarantined>),
}

/// Normalize one document's raw extraction payload.
///
/// `source_id` is the stable identity key of the source document (its
/// filename in the original pipeline); it survives re-ingestion unchanged.
pub fn normalize_document(source_id: &str, payload: &serde_json::Value) -> NormalizeOutcome {
    let mut violations = Vec::new();
    let mut coercions = Vec::new();

    let raw: RawDocument = match serde_json::from_value(payload.clone()) {
        Ok(raw) => raw,
        Err(err) => {
            violations.push(SchemaViolation::MalformedPayload(err.to_string()));
            return quarantine(source_id, payload, violations);
        }
    };

    let agreement = normalize_agreement(&raw);
    if agreement.name.is_empty() && !has_any_attribute(&agreement) {
        violations.push(SchemaViolation::EmptyAgreement);
    }

    let parties = normalize_parties(&raw, &mut coercions);
    let governing_law = normalize_governing_law(raw.governing_law(), &mut coercions);
    let clauses = normalize_clauses(raw.clauses(), &mut violations, &mut coercions);

    if !violations.is_empty() {
        return quarantine(source_id, payload, violations);
    }

    for c in &coercions {
        tracing::warn!(source_id, coercion = %c, "normalizer repaired extraction output");
    }

    let document = CanonicalDocument {
        source_id: source_id.to_string(),
        agreement,
        parties,
        governing_law,
        clauses,
    };
    debug_assert_eq!(document.check_invariants(), Ok(()));

    NormalizeOutcome::Normalized(Box::new(NormalizedDocument { document, coercions }))
}

fn quarantine(
    source_id: &str,
    payload: &serde_json::Value,
    violations: Vec<SchemaViolation>,
) -> NormalizeOutcome {
    tracing::warn!(source_id, count = violations.len(), "document quarantined");
    NormalizeOutcome::Quarantined(Box::new(Quarantined {
        id: Uuid::new_v4(),
        source_id: source_id.to_string(),
        received_at: Utc::now(),
        violations,
        payload: payload.clone(),
    }))
}

fn normalize_agreement(raw: &RawDocument) -> AgreementFacts {
    let a = &raw.agreement;
    AgreementFacts {
        name: a.name.as_deref().unwrap_or("").trim().to_string(),
        agreement_type: a.agreement_type.as_deref().unwrap_or("").trim().to_string(),
        effective_date: normalize_date_field(a.effective_date.as_deref()),
        expiration_date: normalize_date_field(a.expiration_date.as_deref()),
        renewal_term: text_field(a.renewal_term.as_deref()),
        notice_period_to_terminate_renewal: text_field(
            a.notice_period_to_terminate_renewal.as_deref(),
        ),
    }
}

/// Term-description fields: a date is still recognized when the model emits
/// one, but free text is the expected shape.
fn text_field(raw: Option<&str>) -> FieldValue {
    normalize_date_field(raw)
}

fn has_any_attribute(a: &AgreementFacts) -> bool {
    !a.agreement_type.is_empty()
        || a.effective_date.is_specified()
        || a.expiration_date.is_specified()
        || a.renewal_term.is_specified()
        || a.notice_period_to_terminate_renewal.is_specified()
}

fn normalize_parties(raw: &RawDocument, coercions: &mut Vec<Coercion>) -> Vec<Party> {
    let mut parties = Vec::new();
    for (index, p) in raw.parties().iter().enumerate() {
        let name = p.name.as_deref().unwrap_or("").trim().to_string();
        if name.is_empty() {
            coercions.push(Coercion::UnnamedPartyDropped { index });
            continue;
        }
        parties.push(Party {
            name,
            role: p.role.as_deref().unwrap_or("").trim().to_string(),
            incorporation_country: non_empty(p.incorporation_country.as_deref()),
            incorporation_state: non_empty(p.incorporation_state.as_deref()),
        });
    }
    parties
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("Not specified"))
        .map(str::to_string)
}

/// Split a governing-law name field into individual jurisdiction names.
fn jurisdiction_names(field: Option<&str>) -> Vec<String> {
    field
        .unwrap_or("")
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("Not specified"))
        .map(str::to_string)
        .collect()
}

fn normalize_governing_law(
    raw: Option<&RawGoverningLaw>,
    coercions: &mut Vec<Coercion>,
) -> GoverningLaw {
    let Some(raw) = raw else {
        return GoverningLaw::default();
    };

    let mut countries: Vec<String> = Vec::new();
    let mut state: Option<String> = None;

    // Both the country and state fields may name either kind of
    // jurisdiction; extraction output is not reliable about the split.
    let named = jurisdiction_names(raw.country.as_deref())
        .into_iter()
        .chain(jurisdiction_names(raw.state.as_deref()));
    for name in named {
        if let Some(country) = jurisdiction::country_for_state(&name) {
            coercions.push(Coercion::StateResolvedToCountry {
                state: name.clone(),
                country: country.to_string(),
            });
            if state.is_none() {
                state = Some(name);
            }
            push_unique(&mut countries, country.to_string());
        } else {
            push_unique(&mut countries, name);
        }
    }

    let most_favored_country = resolve_most_favored(
        raw.most_favored_country.as_deref(),
        &countries,
        coercions,
    );

    GoverningLaw {
        countries,
        state,
        most_favored_country,
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
        list.push(value);
    }
}

/// most_favored_country must be one of the countries the clause names.
/// A single-country clause defaults to that country; a supplied value
/// outside the named set is replaced (and flagged), never kept.
fn resolve_most_favored(
    given: Option<&str>,
    countries: &[String],
    coercions: &mut Vec<Coercion>,
) -> Option<String> {
    let given = given
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("Not specified"));

    match given {
        Some(g) => {
            if let Some(member) = countries.iter().find(|c| c.eq_ignore_ascii_case(g)) {
                return Some(member.clone());
            }
            // The model may answer with a state here too.
            if let Some(country) = jurisdiction::country_for_state(g) {
                if let Some(member) = countries.iter().find(|c| *c == country) {
                    coercions.push(Coercion::MostFavoredCountryReplaced {
                        given: g.to_string(),
                        replaced_with: Some(member.clone()),
                    });
                    return Some(member.clone());
                }
            }
            let fallback = (countries.len() == 1).then(|| countries[0].clone());
            coercions.push(Coercion::MostFavoredCountryReplaced {
                given: g.to_string(),
                replaced_with: fallback.clone(),
            });
            fallback
        }
        None => (countries.len() == 1).then(|| countries[0].clone()),
    }
}

fn normalize_clauses(
    raw: &[RawClause],
    violations: &mut Vec<SchemaViolation>,
    coercions: &mut Vec<Coercion>,
) -> Vec<ClauseInstance> {
    let mut by_type: BTreeMap<ClauseType, ClauseInstance> = BTreeMap::new();

    for clause in raw {
        let Some(given) = clause.clause_type.as_deref().map(str::trim) else {
            violations.push(SchemaViolation::UnknownClauseType(String::new()));
            continue;
        };
        let clause_type = match given.parse::<ClauseType>() {
            Ok(ct) => ct,
            Err(_) => match ClauseType::parse_ci(given) {
                Some(ct) => {
                    coercions.push(Coercion::ClauseTypeCaseFolded {
                        given: given.to_string(),
                        clause_type: ct,
                    });
                    ct
                }
                None => {
                    violations.push(SchemaViolation::UnknownClauseType(given.to_string()));
                    continue;
                }
            },
        };

        if by_type.contains_key(&clause_type) {
            coercions.push(Coercion::DuplicateClause { clause_type });
            continue;
        }

        let excerpts: Vec<String> = clause
            .excerpts
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        let exists = match clause.exists {
            Some(e) => e,
            None => {
                let inferred = !excerpts.is_empty();
                coercions.push(Coercion::ExistsInferred { clause_type, inferred });
                inferred
            }
        };

        let instance = match (exists, excerpts.is_empty()) {
            (true, true) => {
                coercions.push(Coercion::ExistsWithoutExcerpts { clause_type });
                ClauseInstance::absent(clause_type)
            }
            (false, false) => {
                coercions.push(Coercion::ExcerptsCleared {
                    clause_type,
                    dropped: excerpts.len(),
                });
                ClauseInstance::absent(clause_type)
            }
            _ => ClauseInstance {
                clause_type,
                exists,
                excerpts,
            },
        };
        by_type.insert(clause_type, instance);
    }

    // Backfill: every canonical document covers the full taxonomy.
    ClauseType::ALL
        .iter()
        .map(|ct| by_type.remove(ct).unwrap_or_else(|| ClauseInstance::absent(*ct)))
        .collect()
}
