//! Integration tests for the complete contractgraph pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - raw extraction JSON → Normalizer → Graph Writer → store
//! - store → Retrieval Router (all four strategies) → Answer
//! - snapshot persistence round-trips
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;

use contractgraph_graph::{GraphStore, GraphWriter, MemoryGraph, UpsertOutcome};
use contractgraph_ingest::{normalize_document, NormalizeOutcome};
use contractgraph_retrieval::{
    AnswerOutcome, MockCompletion, QueryRequest, RetrievalRouter, TokenHashEmbedder,
};
use contractgraph_schema::ClauseType;
use tempfile::tempdir;

// ============================================================================
// Fixtures
// ============================================================================

/// Extraction payload shaped like the upstream collaborator's output:
/// partial clause list, nested parties, state-level governing law.
fn payload(
    name: &str,
    party: &str,
    state: &str,
    clauses: serde_json::Value,
) -> serde_json::Value {
    serde_json::json!({
        "agreement": {
            "agreement_name": name,
            "agreement_type": "Service Agreement",
            "effective_date": "2024-03-01",
            "expiration_date": "Not specified",
            "renewal_term": "successive one year terms",
            "notice_period_to_terminate_renewal": "Not specified",
            "governing_law": {
                "country": state,
                "most_favored_country": "Not specified"
            },
            "parties": [
                {"name": party, "role": "Supplier", "incorporation_country": "United States", "incorporation_state": state},
                {"name": "Omega Holdings", "role": "Customer"}
            ]
        },
        "clauses": clauses
    })
}

fn ingest(writer: &GraphWriter<MemoryGraph>, source_id: &str, payload: &serde_json::Value) -> UpsertOutcome {
    match normalize_document(source_id, payload) {
        NormalizeOutcome::Normalized(n) => writer.ingest(&n.document).expect("ingest"),
        NormalizeOutcome::Quarantined(q) => panic!("unexpected quarantine: {:?}", q.violations),
    }
}

fn corpus() -> Arc<MemoryGraph> {
    let store = Arc::new(MemoryGraph::new());
    let writer = GraphWriter::new(store.clone());

    ingest(
        &writer,
        "msa.pdf",
        &payload(
            "Master Services Agreement",
            "Acme Corp",
            "Delaware",
            serde_json::json!([
                {"clause_type": "Change Of Control", "exists": true,
                 "excerpts": ["Either party may terminate upon a change of control of the other party."]},
                {"clause_type": "Revenue/Profit Sharing", "exists": true,
                 "excerpts": ["Payment of all invoices is due within thirty days; late payment accrues interest."]}
            ]),
        ),
    );
    ingest(
        &writer,
        "nda.pdf",
        &payload(
            "Mutual NDA",
            "Beta LLC",
            "Delaware",
            serde_json::json!([
                {"clause_type": "Insurance", "exists": true,
                 "excerpts": ["The supplier shall maintain commercial general liability insurance."]}
            ]),
        ),
    );
    ingest(
        &writer,
        "sow.pdf",
        &payload("Statement of Work", "Gamma Inc", "New York", serde_json::json!([])),
    );
    store
}

fn router(store: Arc<MemoryGraph>, completion: Option<Arc<MockCompletion>>) -> RetrievalRouter {
    RetrievalRouter::new(
        store,
        Arc::new(TokenHashEmbedder),
        completion.map(|c| c as _),
    )
}

// ============================================================================
// Ingestion pipeline
// ============================================================================

#[test]
fn test_ingested_agreements_satisfy_clause_invariants() {
    let store = corpus();
    for view in store.agreements() {
        assert_eq!(view.clauses.len(), 30);
        for clause in &view.clauses {
            assert_eq!(clause.exists, !clause.excerpts.is_empty());
        }
    }
}

#[test]
fn test_state_governing_law_resolves_to_country() {
    let store = corpus();
    let msa = store.agreement("msa.pdf").expect("msa.pdf");
    assert_eq!(msa.governing_law.countries, vec!["United States"]);
    assert_eq!(msa.governing_law.state.as_deref(), Some("Delaware"));
    // Single governing country: most favored defaults to it.
    assert_eq!(msa.governing_law.most_favored_country.as_deref(), Some("United States"));
}

#[test]
fn test_reingestion_is_idempotent() {
    let store = Arc::new(MemoryGraph::new());
    let writer = GraphWriter::new(store.clone());
    let doc = payload("Master Services Agreement", "Acme Corp", "Delaware", serde_json::json!([]));

    assert_eq!(ingest(&writer, "msa.pdf", &doc), UpsertOutcome::Created);
    let first = store.agreement("msa.pdf");
    let first_stats = store.stats();

    // Identical content: digest fast path, no write.
    assert_eq!(ingest(&writer, "msa.pdf", &doc), UpsertOutcome::Unchanged);
    assert_eq!(store.agreement("msa.pdf"), first);
    assert_eq!(store.stats(), first_stats);

    // Changed content: replaced in place, still one subgraph.
    let amended = payload("Amended Services Agreement", "Acme Corp", "Delaware", serde_json::json!([]));
    assert_eq!(ingest(&writer, "msa.pdf", &amended), UpsertOutcome::Replaced);
    assert_eq!(store.stats().agreements, 1);
    assert_eq!(store.stats().parties, first_stats.parties);
}

#[test]
fn test_quarantined_payload_never_writes() {
    let store = Arc::new(MemoryGraph::new());
    let bad = serde_json::json!({
        "agreement": {"agreement_name": "Bad Deal", "agreement_type": "Service"},
        "clauses": [{"clause_type": "Force Majeure", "exists": true, "excerpts": ["x"]}]
    });
    match normalize_document("bad.pdf", &bad) {
        NormalizeOutcome::Quarantined(q) => {
            assert!(!q.violations.is_empty());
        }
        NormalizeOutcome::Normalized(_) => panic!("unknown clause type must quarantine"),
    }
    assert_eq!(store.stats().agreements, 0);
}

#[test]
fn test_snapshot_round_trip_preserves_graph() {
    let store = corpus();
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("graph.snapshot");
    store.save(&path).expect("save");

    let restored = MemoryGraph::load(&path).expect("load");
    assert_eq!(restored.stats(), store.stats());
    assert_eq!(restored.agreement("msa.pdf"), store.agreement("msa.pdf"));
    assert_eq!(restored.existing_excerpts(), store.existing_excerpts());
}

// ============================================================================
// Retrieval strategies
// ============================================================================

#[tokio::test]
async fn test_get_by_id_returns_full_excerpts() {
    let router = router(corpus(), None);
    let answer = router
        .answer(QueryRequest::GetById("msa.pdf".into()))
        .await
        .expect("answer");
    assert_eq!(answer.outcome, AnswerOutcome::Found);
    assert_eq!(answer.agreements.len(), 1);
    let a = &answer.agreements[0];
    assert_eq!(a.name, "Master Services Agreement");
    assert_eq!(a.parties.len(), 2);
    assert_eq!(a.clauses.len(), 2);
}

#[tokio::test]
async fn test_clause_type_filter_exists_and_absent() {
    let router = router(corpus(), None);

    let found = router
        .answer(QueryRequest::GetByClauseType(ClauseType::ChangeOfControl))
        .await
        .expect("answer");
    assert_eq!(found.agreements.len(), 1);
    assert_eq!(found.agreements[0].source_id, "msa.pdf");
    assert!(found.agreements[0]
        .clauses
        .iter()
        .any(|c| c.clause_type == ClauseType::ChangeOfControl && !c.excerpts.is_empty()));

    // Same clause, absent everywhere else in the corpus.
    let absent = router
        .answer(QueryRequest::GetWithoutClauseType(ClauseType::ChangeOfControl))
        .await
        .expect("answer");
    let ids: Vec<&str> = absent.agreements.iter().map(|a| a.source_id.as_str()).collect();
    assert_eq!(ids, vec!["nda.pdf", "sow.pdf"]);
}

#[tokio::test]
async fn test_clause_filter_on_empty_store_is_no_matches() {
    let router = router(Arc::new(MemoryGraph::new()), None);
    let answer = router
        .answer(QueryRequest::GetByClauseType(ClauseType::ChangeOfControl))
        .await
        .expect("answer");
    assert_eq!(answer.outcome, AnswerOutcome::NoMatches);
}

#[tokio::test]
async fn test_similarity_ranks_invoicing_over_insurance() {
    let router = router(corpus(), None);
    let answer = router
        .answer(QueryRequest::SimilaritySearch {
            text: "payment terms".into(),
            limit: 5,
        })
        .await
        .expect("answer");
    assert_eq!(answer.outcome, AnswerOutcome::Found);
    // The invoicing excerpt lives in msa.pdf; the insurance one in nda.pdf.
    assert_eq!(answer.agreements[0].source_id, "msa.pdf");
}

#[tokio::test]
async fn test_aggregation_counts_delaware_contracts() {
    let completion = Arc::new(MockCompletion::replying(&[
        r#"{"select":"count","filters":[{"kind":"jurisdiction","name":"Delaware"}]}"#,
        "2 of the 3 contracts are governed by Delaware law.",
    ]));
    let router = router(corpus(), Some(completion));
    let answer = router
        .answer(QueryRequest::AggregationQuestion(
            "How many contracts are governed by Delaware law?".into(),
        ))
        .await
        .expect("answer");
    assert_eq!(
        answer.summary.as_deref(),
        Some("2 of the 3 contracts are governed by Delaware law.")
    );
}

#[tokio::test]
async fn test_ask_routes_each_documented_shape() {
    let router = router(corpus(), None);

    // Exact party name -> strategy 1.
    let by_party = router
        .answer(QueryRequest::Ask("Acme Corp".into()))
        .await
        .expect("answer");
    assert_eq!(by_party.agreements[0].source_id, "msa.pdf");

    // Clause-type name, case-folded -> strategy 2.
    let by_clause = router
        .answer(QueryRequest::Ask("change of control".into()))
        .await
        .expect("answer");
    assert_eq!(by_clause.agreements.len(), 1);

    // Aggregation verbs -> strategy 4 (pattern fallback without provider).
    let count = router
        .answer(QueryRequest::Ask(
            "How many contracts are governed by Delaware law?".into(),
        ))
        .await
        .expect("answer");
    assert_eq!(count.summary.as_deref(), Some("2 matching agreement(s)"));

    // Anything else -> strategy 3.
    let free = router
        .answer(QueryRequest::Ask("late payment of invoices".into()))
        .await
        .expect("answer");
    assert_eq!(free.agreements[0].source_id, "msa.pdf");
}

#[tokio::test]
async fn test_reingestion_then_refresh_is_visible_to_similarity() {
    let store = Arc::new(MemoryGraph::new());
    let writer = GraphWriter::new(store.clone());
    ingest(
        &writer,
        "msa.pdf",
        &payload(
            "Master Services Agreement",
            "Acme Corp",
            "Delaware",
            serde_json::json!([
                {"clause_type": "Insurance", "exists": true,
                 "excerpts": ["The supplier shall maintain commercial general liability insurance."]}
            ]),
        ),
    );
    let router = router(store.clone(), None);
    let before = router
        .answer(QueryRequest::SimilaritySearch { text: "liability insurance".into(), limit: 5 })
        .await
        .expect("answer");
    assert_eq!(before.outcome, AnswerOutcome::Found);

    // Replace the document with one that has no clauses at all.
    ingest(
        &writer,
        "msa.pdf",
        &payload("Master Services Agreement", "Acme Corp", "Delaware", serde_json::json!([])),
    );
    router.refresh_index();
    let after = router
        .answer(QueryRequest::SimilaritySearch { text: "liability insurance".into(), limit: 5 })
        .await
        .expect("answer");
    assert_eq!(after.outcome, AnswerOutcome::NoMatches);
}
