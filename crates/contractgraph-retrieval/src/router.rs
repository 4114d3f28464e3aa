//! The retrieval router.
//!
//! Maps a query onto one of four strategies, in priority order: exact
//! lookup, clause-type filter, excerpt similarity, aggregation. Structured
//! calls name their strategy directly; a free-form `Ask` is classified
//! deterministically from its shape, with similarity as the fallback so a
//! question never dies with "unsupported" while there are excerpts to
//! search.

use crate::compose::Answer;
use crate::index::ExcerptIndex;
use crate::providers::{CompletionProvider, EmbeddingProvider, LlmError};
use crate::text2query::{self, Text2QueryError};
use contractgraph_graph::GraphStore;
use contractgraph_schema::ClauseType;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRequest {
    /// Strategy 1: direct lookup by agreement identity key.
    GetById(String),
    /// Strategy 1: all agreements naming this party.
    GetByParty(String),
    /// Strategy 2: agreements where this clause exists, with excerpts.
    GetByClauseType(ClauseType),
    /// Strategy 2 complement: agreements where this clause is absent.
    GetWithoutClauseType(ClauseType),
    /// Strategy 3: ranked excerpt similarity.
    SimilaritySearch { text: String, limit: usize },
    /// Strategy 4: cross-contract aggregation.
    AggregationQuestion(String),
    /// Free-form question, classified by shape.
    Ask(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("query generation failed: {0}")]
    QueryGenerationFailed(String),
    #[error("no completion provider configured for aggregation questions")]
    NoCompletionProvider,
    #[error(transparent)]
    Provider(#[from] LlmError),
}

impl From<Text2QueryError> for RetrievalError {
    fn from(e: Text2QueryError) -> Self {
        match e {
            Text2QueryError::QueryGenerationFailed(msg) => {
                RetrievalError::QueryGenerationFailed(msg)
            }
            Text2QueryError::Provider(e) => RetrievalError::Provider(e),
        }
    }
}

const DEFAULT_SIMILARITY_LIMIT: usize = 10;

const SUMMARY_PROMPT: &str = "You summarize structured query results over a contract knowledge \
graph. Answer the user's question in one or two sentences using only the result rows given. \
Do not invent facts.";

pub struct RetrievalRouter {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Option<Arc<dyn CompletionProvider>>,
    // Lazily built, dropped on refresh_index so re-ingestion is visible.
    index: RwLock<Option<Arc<ExcerptIndex>>>,
}

impl RetrievalRouter {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        Self {
            store,
            embedder,
            completion,
            index: RwLock::new(None),
        }
    }

    /// Drop the cached similarity index; it is rebuilt on next use.
    pub fn refresh_index(&self) {
        *self.index.write() = None;
    }

    async fn index(&self) -> Result<Arc<ExcerptIndex>, LlmError> {
        if let Some(index) = self.index.read().clone() {
            return Ok(index);
        }
        let built = Arc::new(ExcerptIndex::build(self.store.as_ref(), self.embedder.as_ref()).await?);
        *self.index.write() = Some(built.clone());
        Ok(built)
    }

    /// Answer one query. Read-only: no strategy ever writes to the store.
    pub async fn answer(&self, request: QueryRequest) -> Result<Answer, RetrievalError> {
        match request {
            QueryRequest::GetById(source_id) => {
                Ok(Answer::from_views(
                    self.store.agreement(source_id.trim()).into_iter().collect(),
                ))
            }
            QueryRequest::GetByParty(name) => {
                Ok(Answer::from_views(self.store.agreements_by_party(&name)))
            }
            QueryRequest::GetByClauseType(ct) => {
                Ok(Answer::from_views(self.store.agreements_by_clause(ct, true)))
            }
            QueryRequest::GetWithoutClauseType(ct) => {
                Ok(Answer::from_views(self.store.agreements_by_clause(ct, false)))
            }
            QueryRequest::SimilaritySearch { text, limit } => {
                self.similarity(&text, limit).await
            }
            QueryRequest::AggregationQuestion(question) => self.aggregation(&question).await,
            QueryRequest::Ask(text) => {
                let classified = self.classify(&text);
                tracing::debug!(query = %text, ?classified, "routed free-form question");
                Box::pin(self.answer(classified)).await
            }
        }
    }

    /// Deterministic shape classification for free-form questions,
    /// checked in strategy priority order.
    fn classify(&self, text: &str) -> QueryRequest {
        let trimmed = text.trim();

        // 1. Exact agreement id or party name.
        if self.store.agreement(trimmed).is_some() {
            return QueryRequest::GetById(trimmed.to_string());
        }
        if !self.store.agreements_by_party(trimmed).is_empty() {
            return QueryRequest::GetByParty(trimmed.to_string());
        }

        // 2. The whole query names a clause type.
        if let Some(ct) = ClauseType::parse_ci(trimmed) {
            return QueryRequest::GetByClauseType(ct);
        }

        // 4. Aggregation verbs. Checked before the similarity fallback;
        // counting questions are never answerable by excerpt ranking.
        if is_aggregation_shape(trimmed) {
            return QueryRequest::AggregationQuestion(trimmed.to_string());
        }

        // 3. Similarity is the fallback.
        QueryRequest::SimilaritySearch {
            text: trimmed.to_string(),
            limit: DEFAULT_SIMILARITY_LIMIT,
        }
    }

    async fn similarity(&self, text: &str, limit: usize) -> Result<Answer, RetrievalError> {
        let index = self.index().await?;
        let hits = index.search(text, limit, self.embedder.as_ref()).await?;
        if hits.is_empty() {
            return Ok(Answer::no_matches());
        }
        let mut views = Vec::new();
        for hit in &hits {
            if views.iter().all(|v: &contractgraph_graph::AgreementView| {
                v.source_id != hit.excerpt.source_id
            }) {
                if let Some(view) = self.store.agreement(&hit.excerpt.source_id) {
                    views.push(view);
                }
            }
        }
        Ok(Answer::from_hits(hits, views))
    }

    async fn aggregation(&self, question: &str) -> Result<Answer, RetrievalError> {
        match self.completion.as_deref() {
            Some(provider) => {
                let (program, output) =
                    text2query::translate_and_execute(question, provider, self.store.as_ref())
                        .await?;
                tracing::debug!(?program, "aggregation program executed");
                let rendered = text2query::render_output(&output);
                let summary = match self.summarize(provider, question, &output).await {
                    Ok(s) => s,
                    Err(e) => {
                        // A failed summary does not lose the result.
                        tracing::warn!(error = %e, "summarization failed, returning raw result");
                        rendered
                    }
                };
                Ok(Answer::from_aggregation(&output, summary))
            }
            None => {
                let program = text2query::fallback_program(question).ok_or_else(|| {
                    RetrievalError::QueryGenerationFailed(
                        "question shape not recognized and no completion provider configured"
                            .to_string(),
                    )
                })?;
                let output = text2query::execute(&program, self.store.as_ref())
                    .map_err(RetrievalError::QueryGenerationFailed)?;
                let summary = text2query::render_output(&output);
                Ok(Answer::from_aggregation(&output, summary))
            }
        }
    }

    async fn summarize(
        &self,
        provider: &dyn CompletionProvider,
        question: &str,
        output: &text2query::QueryOutput,
    ) -> Result<String, LlmError> {
        let rows = serde_json::to_string(output)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let user = format!("Question: {question}\nResult rows: {rows}");
        provider.complete(SUMMARY_PROMPT, &user).await
    }
}

fn is_aggregation_shape(text: &str) -> bool {
    let q = text.to_lowercase();
    q.starts_with("how many")
        || q.starts_with("count")
        || q.contains("number of")
        || q.contains(" per ")
        || q.contains("most contracts")
        || q.contains("top parties")
        || q.contains("top organizations")
        || q.contains("compare")
        || (q.starts_with("which") && (q.contains("most") || q.contains("fewest")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::AnswerOutcome;
    use crate::providers::{MockCompletion, TokenHashEmbedder};
    use contractgraph_graph::MemoryGraph;
    use contractgraph_schema::{
        AgreementFacts, CanonicalDocument, ClauseInstance, GoverningLaw, Party,
    };

    fn doc(
        source_id: &str,
        party: &str,
        state: Option<&str>,
        clause: Option<(ClauseType, &str)>,
    ) -> CanonicalDocument {
        CanonicalDocument {
            source_id: source_id.into(),
            agreement: AgreementFacts {
                name: format!("Agreement {source_id}"),
                agreement_type: "Service".into(),
                ..Default::default()
            },
            parties: vec![Party {
                name: party.into(),
                role: "Supplier".into(),
                incorporation_country: None,
                incorporation_state: None,
            }],
            governing_law: GoverningLaw {
                countries: vec!["United States".into()],
                state: state.map(String::from),
                most_favored_country: Some("United States".into()),
            },
            clauses: ClauseType::ALL
                .iter()
                .map(|ct| match clause {
                    Some((c, excerpt)) if c == *ct => ClauseInstance {
                        clause_type: *ct,
                        exists: true,
                        excerpts: vec![excerpt.to_string()],
                    },
                    _ => ClauseInstance::absent(*ct),
                })
                .collect(),
        }
    }

    fn router_over(store: MemoryGraph) -> RetrievalRouter {
        RetrievalRouter::new(Arc::new(store), Arc::new(TokenHashEmbedder), None)
    }

    fn corpus() -> MemoryGraph {
        let store = MemoryGraph::new();
        store
            .upsert_document(
                &doc(
                    "msa.pdf",
                    "Acme Corp",
                    Some("Delaware"),
                    Some((ClauseType::ChangeOfControl, "upon a change of control either party may terminate")),
                ),
                "d1",
            )
            .unwrap();
        store
            .upsert_document(&doc("nda.pdf", "Beta LLC", Some("Delaware"), None), "d2")
            .unwrap();
        store
            .upsert_document(&doc("sow.pdf", "Gamma Inc", Some("New York"), None), "d3")
            .unwrap();
        store
    }

    #[tokio::test]
    async fn ask_with_exact_id_routes_to_lookup() {
        let router = router_over(corpus());
        let answer = router.answer(QueryRequest::Ask("msa.pdf".into())).await.unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::Found);
        assert_eq!(answer.agreements.len(), 1);
        assert_eq!(answer.agreements[0].source_id, "msa.pdf");
    }

    #[tokio::test]
    async fn ask_with_party_name_routes_to_party_lookup() {
        let router = router_over(corpus());
        let answer = router.answer(QueryRequest::Ask("Acme Corp".into())).await.unwrap();
        assert_eq!(answer.agreements.len(), 1);
        assert_eq!(answer.agreements[0].source_id, "msa.pdf");
    }

    #[tokio::test]
    async fn ask_naming_a_clause_type_routes_to_filter() {
        let router = router_over(corpus());
        let answer = router
            .answer(QueryRequest::Ask("change of control".into()))
            .await
            .unwrap();
        assert_eq!(answer.agreements.len(), 1);
        assert_eq!(answer.agreements[0].clauses[0].clause_type, ClauseType::ChangeOfControl);
        assert!(!answer.agreements[0].clauses[0].excerpts.is_empty());
    }

    #[tokio::test]
    async fn clause_filter_with_no_existing_instances_is_empty_not_error() {
        let router = router_over(corpus());
        let answer = router
            .answer(QueryRequest::GetByClauseType(ClauseType::Insurance))
            .await
            .unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::NoMatches);
    }

    #[tokio::test]
    async fn without_clause_returns_the_complement() {
        let router = router_over(corpus());
        let answer = router
            .answer(QueryRequest::GetWithoutClauseType(ClauseType::ChangeOfControl))
            .await
            .unwrap();
        let ids: Vec<&str> = answer.agreements.iter().map(|a| a.source_id.as_str()).collect();
        assert_eq!(ids, vec!["nda.pdf", "sow.pdf"]);
    }

    #[tokio::test]
    async fn aggregation_question_without_provider_uses_fallback() {
        let router = router_over(corpus());
        let answer = router
            .answer(QueryRequest::Ask(
                "How many contracts are governed by Delaware law?".into(),
            ))
            .await
            .unwrap();
        assert_eq!(answer.summary.as_deref(), Some("2 matching agreement(s)"));
    }

    #[tokio::test]
    async fn aggregation_with_provider_summarizes_executed_result() {
        let completion = Arc::new(MockCompletion::replying(&[
            r#"{"select":"count","filters":[{"kind":"jurisdiction","name":"Delaware"}]}"#,
            "Two of the three contracts are governed by Delaware law.",
        ]));
        let router = RetrievalRouter::new(
            Arc::new(corpus()),
            Arc::new(TokenHashEmbedder),
            Some(completion.clone()),
        );
        let answer = router
            .answer(QueryRequest::AggregationQuestion(
                "How many contracts are governed by Delaware law?".into(),
            ))
            .await
            .unwrap();
        assert_eq!(
            answer.summary.as_deref(),
            Some("Two of the three contracts are governed by Delaware law.")
        );
        assert_eq!(completion.calls(), 2);
    }

    #[tokio::test]
    async fn failed_summarization_still_returns_raw_result() {
        let completion = Arc::new(MockCompletion::new(vec![
            Ok(r#"{"select":"count","filters":[{"kind":"jurisdiction","name":"Delaware"}]}"#.into()),
            Err(LlmError::Api("model overloaded".into())),
        ]));
        let router = RetrievalRouter::new(
            Arc::new(corpus()),
            Arc::new(TokenHashEmbedder),
            Some(completion),
        );
        let answer = router
            .answer(QueryRequest::AggregationQuestion(
                "How many contracts are governed by Delaware law?".into(),
            ))
            .await
            .unwrap();
        assert_eq!(answer.summary.as_deref(), Some("2 matching agreement(s)"));
    }

    #[tokio::test]
    async fn free_text_falls_back_to_similarity() {
        let router = router_over(corpus());
        let answer = router
            .answer(QueryRequest::Ask("terminate upon change of control events".into()))
            .await
            .unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::Found);
        assert_eq!(answer.agreements[0].source_id, "msa.pdf");
        assert!(answer.agreements[0].clauses[0].score.is_some());
    }

    #[tokio::test]
    async fn unknown_id_is_no_matches() {
        let router = router_over(corpus());
        let answer = router
            .answer(QueryRequest::GetById("missing.pdf".into()))
            .await
            .unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::NoMatches);
    }
}
