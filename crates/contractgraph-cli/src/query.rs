//! Query commands: build a router over the snapshot and render answers.

use anyhow::{anyhow, Result};
use colored::Colorize;
use contractgraph_graph::MemoryGraph;
use contractgraph_retrieval::{
    Answer, AnswerOutcome, OpenAiClient, ProviderConfig, QueryRequest, RetrievalRouter, Retrying,
    TokenHashEmbedder,
};
use contractgraph_schema::ClauseType;
use std::sync::Arc;

/// Wire a router from the environment. With `OPENAI_API_KEY` set, one
/// client serves both embeddings and completions, each behind
/// transient-failure retry; otherwise the local
/// token-hash embedder covers similarity and aggregation falls back to
/// the deterministic pattern parser.
fn build_router(store: Arc<MemoryGraph>) -> Result<RetrievalRouter> {
    match ProviderConfig::from_env() {
        Some(config) => {
            let client = Arc::new(
                OpenAiClient::new(config).map_err(|e| anyhow!("provider setup: {e}"))?,
            );
            Ok(RetrievalRouter::new(
                store,
                Arc::new(Retrying::new(client.clone())),
                Some(Arc::new(Retrying::new(client))),
            ))
        }
        None => {
            tracing::debug!("no provider configured, using local embedder and pattern fallback");
            Ok(RetrievalRouter::new(store, Arc::new(TokenHashEmbedder), None))
        }
    }
}

fn parse_clause_type(name: &str) -> Result<ClauseType> {
    ClauseType::parse_ci(name).ok_or_else(|| {
        anyhow!(
            "unknown clause type {name:?}; expected one of the 30 canonical names, e.g. \"Non-Compete\""
        )
    })
}

fn render(answer: &Answer) {
    if let Some(summary) = &answer.summary {
        println!("{summary}");
    }
    if answer.outcome == AnswerOutcome::NoMatches {
        println!("{}", "no matching records".yellow());
        return;
    }
    for agreement in &answer.agreements {
        println!(
            "{} {}",
            agreement.name.bold(),
            format!("[{}]", agreement.source_id).dimmed()
        );
        println!(
            "  type: {}  effective: {}  expires: {}",
            agreement.agreement_type, agreement.effective_date, agreement.expiration_date
        );
        for party in &agreement.parties {
            println!("  party: {} ({})", party.name, party.role);
        }
        for clause in &agreement.clauses {
            match clause.score {
                Some(score) => println!(
                    "  {} {}",
                    clause.clause_type.name().cyan(),
                    format!("(score {score:.3})").dimmed()
                ),
                None => println!("  {}", clause.clause_type.name().cyan()),
            }
            for excerpt in &clause.excerpts {
                println!("    \"{excerpt}\"");
            }
        }
    }
}

pub async fn cmd_get_by_id(store: Arc<MemoryGraph>, id: &str) -> Result<()> {
    let router = build_router(store)?;
    let answer = router.answer(QueryRequest::GetById(id.to_string())).await?;
    render(&answer);
    Ok(())
}

pub async fn cmd_by_party(store: Arc<MemoryGraph>, name: &str) -> Result<()> {
    let router = build_router(store)?;
    let answer = router.answer(QueryRequest::GetByParty(name.to_string())).await?;
    render(&answer);
    Ok(())
}

pub async fn cmd_by_clause_type(store: Arc<MemoryGraph>, name: &str, exists: bool) -> Result<()> {
    let ct = parse_clause_type(name)?;
    let router = build_router(store)?;
    let request = if exists {
        QueryRequest::GetByClauseType(ct)
    } else {
        QueryRequest::GetWithoutClauseType(ct)
    };
    let answer = router.answer(request).await?;
    render(&answer);
    Ok(())
}

pub async fn cmd_similar(store: Arc<MemoryGraph>, text: &str, limit: usize) -> Result<()> {
    let router = build_router(store)?;
    let answer = router
        .answer(QueryRequest::SimilaritySearch {
            text: text.to_string(),
            limit,
        })
        .await?;
    render(&answer);
    Ok(())
}

pub async fn cmd_ask(store: Arc<MemoryGraph>, question: &str) -> Result<()> {
    let router = build_router(store)?;
    let answer = router.answer(QueryRequest::Ask(question.to_string())).await?;
    render(&answer);
    Ok(())
}
