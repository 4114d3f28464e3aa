//! Answer composition.
//!
//! Retrieval strategies hand back agreement views, similarity hits, or
//! aggregation rows; the composer turns them into one `Answer` shape.
//! Parties and excerpts reached via multiple traversal paths are
//! deduplicated with insertion order preserved, and an empty result is an
//! explicit `NoMatches`, never an error.

use crate::index::SimilarityHit;
use crate::text2query::QueryOutput;
use contractgraph_graph::AgreementView;
use contractgraph_schema::{ClauseType, FieldValue, Party};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    Found,
    /// Zero matching records. Distinguishable from a failed query, which
    /// is an error, not an answer.
    NoMatches,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClauseSummary {
    pub clause_type: ClauseType,
    pub excerpts: Vec<String>,
    /// Similarity score when this clause was reached through the
    /// embedding index.
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgreementSummary {
    pub source_id: String,
    pub name: String,
    pub agreement_type: String,
    pub effective_date: FieldValue,
    pub expiration_date: FieldValue,
    pub parties: Vec<Party>,
    /// Clauses with `exists=true` only, in taxonomy order (or hit order
    /// for similarity answers).
    pub clauses: Vec<ClauseSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub agreements: Vec<AgreementSummary>,
    /// Natural-language summary, present for aggregation answers.
    pub summary: Option<String>,
    pub outcome: AnswerOutcome,
}

fn dedup_parties(parties: &[Party]) -> Vec<Party> {
    let mut seen = std::collections::HashSet::new();
    parties
        .iter()
        .filter(|p| seen.insert((p.name.to_lowercase(), p.role.to_lowercase())))
        .cloned()
        .collect()
}

fn dedup_excerpts(excerpts: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    excerpts
        .iter()
        .filter(|e| seen.insert(e.as_str()))
        .cloned()
        .collect()
}

fn summarize_view(view: &AgreementView) -> AgreementSummary {
    AgreementSummary {
        source_id: view.source_id.clone(),
        name: view.facts.name.clone(),
        agreement_type: view.facts.agreement_type.clone(),
        effective_date: view.facts.effective_date.clone(),
        expiration_date: view.facts.expiration_date.clone(),
        parties: dedup_parties(&view.parties),
        clauses: view
            .clauses
            .iter()
            .filter(|c| c.exists)
            .map(|c| ClauseSummary {
                clause_type: c.clause_type,
                excerpts: dedup_excerpts(&c.excerpts),
                score: None,
            })
            .collect(),
    }
}

impl Answer {
    pub fn from_views(views: Vec<AgreementView>) -> Self {
        let agreements: Vec<AgreementSummary> = views.iter().map(summarize_view).collect();
        let outcome = if agreements.is_empty() {
            AnswerOutcome::NoMatches
        } else {
            AnswerOutcome::Found
        };
        Self {
            agreements,
            summary: None,
            outcome,
        }
    }

    /// Group similarity hits by agreement, preserving hit order both
    /// across and within agreements.
    pub fn from_hits(hits: Vec<SimilarityHit>, views: Vec<AgreementView>) -> Self {
        let mut agreements: Vec<AgreementSummary> = Vec::new();
        for hit in &hits {
            let idx = match agreements
                .iter()
                .position(|a| a.source_id == hit.excerpt.source_id)
            {
                Some(i) => i,
                None => {
                    let Some(view) = views.iter().find(|v| v.source_id == hit.excerpt.source_id)
                    else {
                        continue;
                    };
                    let mut s = summarize_view(view);
                    s.clauses.clear();
                    agreements.push(s);
                    agreements.len() - 1
                }
            };
            let summary = &mut agreements[idx];
            match summary
                .clauses
                .iter_mut()
                .find(|c| c.clause_type == hit.excerpt.clause_type)
            {
                Some(clause) => {
                    if !clause.excerpts.contains(&hit.excerpt.text) {
                        clause.excerpts.push(hit.excerpt.text.clone());
                    }
                }
                None => summary.clauses.push(ClauseSummary {
                    clause_type: hit.excerpt.clause_type,
                    excerpts: vec![hit.excerpt.text.clone()],
                    score: Some(hit.score),
                }),
            }
        }
        let outcome = if agreements.is_empty() {
            AnswerOutcome::NoMatches
        } else {
            AnswerOutcome::Found
        };
        Self {
            agreements,
            summary: None,
            outcome,
        }
    }

    /// Aggregation answer: the generated summary plus, for agreement-
    /// valued results, the matching agreements themselves.
    pub fn from_aggregation(output: &QueryOutput, summary: String) -> Self {
        let agreements = match output {
            QueryOutput::Agreements(views) => views.iter().map(summarize_view).collect(),
            _ => Vec::new(),
        };
        let outcome = match output {
            QueryOutput::Agreements(views) if views.is_empty() => AnswerOutcome::NoMatches,
            QueryOutput::Count(0) => AnswerOutcome::NoMatches,
            QueryOutput::Groups(groups) if groups.is_empty() => AnswerOutcome::NoMatches,
            _ => AnswerOutcome::Found,
        };
        Self {
            agreements,
            summary: Some(summary),
            outcome,
        }
    }

    pub fn no_matches() -> Self {
        Self {
            agreements: Vec::new(),
            summary: None,
            outcome: AnswerOutcome::NoMatches,
        }
    }
}
