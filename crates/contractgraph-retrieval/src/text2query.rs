//! Aggregation query programs.
//!
//! Cross-contract questions ("how many contracts are governed by Delaware
//! law?") cannot be answered by a single traversal. The question, together
//! with a fixed schema description, is sent to the completion provider,
//! which must reply with a JSON query program: a small IR of select /
//! filters / group_by / limit. The program is validated and executed
//! deterministically against the store; the LLM never touches the graph
//! directly.
//!
//! A parse or execution failure triggers exactly one repair round-trip
//! carrying the error text. When no provider is configured, a deterministic
//! pattern fallback covers the common question shapes.

use crate::providers::{CompletionProvider, LlmError};
use contractgraph_graph::{AgreementView, GraphStore};
use contractgraph_schema::ClauseType;
use serde::{Deserialize, Serialize};

// ============================================================================
// IR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Select {
    /// Matching agreements themselves.
    Agreements,
    /// The number of matching agreements.
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    /// Instance of `clause_type` has the given exists flag.
    ClauseExists { clause_type: ClauseType, exists: bool },
    /// A party with this exact name (case-insensitive).
    Party { name: String },
    /// Governing country or state matches (case-insensitive), so
    /// "Delaware" and "United States" both work.
    Jurisdiction { name: String },
    /// Agreement type label (case-insensitive).
    AgreementType { value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    PartyName,
    GoverningCountry,
    AgreementType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryProgram {
    pub select: Select,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group_by: Option<GroupBy>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Executed result rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutput {
    Agreements(Vec<AgreementView>),
    Count(u64),
    /// (group key, count) pairs, count descending then key ascending.
    Groups(Vec<(String, u64)>),
}

// ============================================================================
// Execution
// ============================================================================

fn matches_filter(view: &AgreementView, filter: &Filter) -> bool {
    match filter {
        Filter::ClauseExists {
            clause_type,
            exists,
        } => view
            .clause(*clause_type)
            .map(|c| c.exists == *exists)
            .unwrap_or(false),
        Filter::Party { name } => view
            .parties
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name.trim())),
        Filter::Jurisdiction { name } => {
            let name = name.trim();
            view.governing_law
                .countries
                .iter()
                .any(|c| c.eq_ignore_ascii_case(name))
                || view
                    .governing_law
                    .state
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(name))
        }
        Filter::AgreementType { value } => {
            view.facts.agreement_type.eq_ignore_ascii_case(value.trim())
        }
    }
}

/// Run a program against the store. Deterministic, read-only.
pub fn execute(program: &QueryProgram, store: &dyn GraphStore) -> Result<QueryOutput, String> {
    let matched: Vec<AgreementView> = store
        .agreements()
        .into_iter()
        .filter(|view| program.filters.iter().all(|f| matches_filter(view, f)))
        .collect();

    match (program.select, program.group_by) {
        (Select::Count, None) => Ok(QueryOutput::Count(matched.len() as u64)),
        (Select::Count, Some(group_by)) => {
            let mut counts: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
            for view in &matched {
                match group_by {
                    GroupBy::PartyName => {
                        for p in &view.parties {
                            *counts.entry(p.name.clone()).or_default() += 1;
                        }
                    }
                    GroupBy::GoverningCountry => {
                        for c in &view.governing_law.countries {
                            *counts.entry(c.clone()).or_default() += 1;
                        }
                    }
                    GroupBy::AgreementType => {
                        *counts.entry(view.facts.agreement_type.clone()).or_default() += 1;
                    }
                }
            }
            let mut groups: Vec<(String, u64)> = counts.into_iter().collect();
            groups.sort_by(|(ka, ca), (kb, cb)| cb.cmp(ca).then_with(|| ka.cmp(kb)));
            if let Some(limit) = program.limit {
                groups.truncate(limit);
            }
            Ok(QueryOutput::Groups(groups))
        }
        (Select::Agreements, None) => {
            let mut matched = matched;
            if let Some(limit) = program.limit {
                matched.truncate(limit);
            }
            Ok(QueryOutput::Agreements(matched))
        }
        (Select::Agreements, Some(_)) => {
            Err("group_by requires select = \"count\"".to_string())
        }
    }
}

// ============================================================================
// Translation
// ============================================================================

const SCHEMA_PROMPT: &str = r#"You translate questions about a contract knowledge graph into a JSON query program. The graph holds Agreements (name, agreement_type, dates), their Parties (name, role, incorporation country/state), GoverningLaw (countries, state, most_favored_country), and one ClauseInstance per agreement for each of 30 clause types (exists flag plus excerpts).

Reply with a single JSON object, no prose:
{
  "select": "agreements" | "count",
  "filters": [
    {"kind": "clause_exists", "clause_type": "<canonical clause name>", "exists": true|false},
    {"kind": "party", "name": "<exact party name>"},
    {"kind": "jurisdiction", "name": "<governing country or state>"},
    {"kind": "agreement_type", "value": "<agreement type>"}
  ],
  "group_by": null | "party_name" | "governing_country" | "agreement_type",
  "limit": null | <integer>
}

"group_by" may only be combined with "select": "count". Example: "How many contracts are governed by Delaware law?" becomes {"select":"count","filters":[{"kind":"jurisdiction","name":"Delaware"}],"group_by":null,"limit":null}"#;

/// Strip a Markdown code fence if the model wrapped its JSON in one.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn parse_program(text: &str) -> Result<QueryProgram, String> {
    serde_json::from_str(strip_fence(text)).map_err(|e| e.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum Text2QueryError {
    #[error("query generation failed: {0}")]
    QueryGenerationFailed(String),
    #[error(transparent)]
    Provider(#[from] LlmError),
}

/// Translate and execute, with one repair round-trip on failure.
pub async fn translate_and_execute(
    question: &str,
    provider: &dyn CompletionProvider,
    store: &dyn GraphStore,
) -> Result<(QueryProgram, QueryOutput), Text2QueryError> {
    let first = provider.complete(SCHEMA_PROMPT, question).await?;
    let failure = match parse_program(&first).and_then(|p| execute(&p, store).map(|o| (p, o))) {
        Ok(out) => return Ok(out),
        Err(e) => e,
    };

    tracing::warn!(error = %failure, "query program rejected, attempting one repair");
    let repair_user = format!(
        "{question}\n\nYour previous reply was rejected: {failure}\nPrevious reply:\n{first}\nReply again with a single corrected JSON object."
    );
    let second = provider.complete(SCHEMA_PROMPT, &repair_user).await?;
    parse_program(&second)
        .and_then(|p| execute(&p, store).map(|o| (p, o)))
        .map_err(Text2QueryError::QueryGenerationFailed)
}

// ============================================================================
// Deterministic fallback
// ============================================================================

/// Pattern fallback for when no completion provider is configured. Covers
/// the common aggregation shapes; anything else is a generation failure.
pub fn fallback_program(question: &str) -> Option<QueryProgram> {
    let q = question.trim().to_lowercase();
    let wants_count = q.starts_with("how many") || q.contains("count");

    if q.contains("which parties") || q.contains("top parties") || q.contains("top organizations")
    {
        return Some(QueryProgram {
            select: Select::Count,
            filters: Vec::new(),
            group_by: Some(GroupBy::PartyName),
            limit: Some(10),
        });
    }

    let jurisdiction_re = regex::Regex::new(r"governed by ([a-z .'-]+?)(?: law)?[?.!]*$").ok()?;
    if let Some(caps) = jurisdiction_re.captures(&q) {
        let mut name = caps[1].trim().to_string();
        // Restore simple title case for display; matching is
        // case-insensitive anyway.
        name = name
            .split_whitespace()
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        return Some(QueryProgram {
            select: if wants_count {
                Select::Count
            } else {
                Select::Agreements
            },
            filters: vec![Filter::Jurisdiction { name }],
            group_by: None,
            limit: None,
        });
    }

    if let Some(ct) = ClauseType::ALL
        .iter()
        .find(|ct| q.contains(&ct.name().to_lowercase()))
    {
        let exists = !q.contains("without");
        return Some(QueryProgram {
            select: if wants_count {
                Select::Count
            } else {
                Select::Agreements
            },
            filters: vec![Filter::ClauseExists {
                clause_type: *ct,
                exists,
            }],
            group_by: None,
            limit: None,
        });
    }

    if wants_count {
        return Some(QueryProgram {
            select: Select::Count,
            filters: Vec::new(),
            group_by: None,
            limit: None,
        });
    }
    None
}

/// Plain-text rendering of a result, used when summarization fails or no
/// provider is configured.
pub fn render_output(output: &QueryOutput) -> String {
    match output {
        QueryOutput::Count(n) => format!("{n} matching agreement(s)"),
        QueryOutput::Groups(groups) => groups
            .iter()
            .map(|(k, n)| format!("{k}: {n}"))
            .collect::<Vec<_>>()
            .join("\n"),
        QueryOutput::Agreements(views) => views
            .iter()
            .map(|v| format!("{} ({})", v.facts.name, v.source_id))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
