//! Excerpt similarity index.
//!
//! Embeds every `exists=true` excerpt in the store and answers free-text
//! queries with HNSW ANN search followed by an exact cosine rerank over
//! the candidate set. Ties break by agreement id ascending, so rankings
//! are reproducible.

use crate::providers::{EmbeddingProvider, LlmError};
use contractgraph_graph::{ExcerptRef, GraphStore};
use hnsw_rs::prelude::{DistCosine, Hnsw};

pub struct SimilarityHit {
    pub excerpt: ExcerptRef,
    pub score: f32,
}

pub struct ExcerptIndex {
    refs: Vec<ExcerptRef>,
    // Vectors aligned with `refs`, L2-normalized at build time.
    vectors: Vec<Vec<f32>>,
    // ANN structure (search-only after build). Empty corpus -> None.
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl ExcerptIndex {
    /// Embed every existing excerpt in the store and build the ANN
    /// structure over the vectors.
    pub async fn build(
        store: &dyn GraphStore,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self, LlmError> {
        let refs = store.existing_excerpts();
        if refs.is_empty() {
            return Ok(Self {
                refs,
                vectors: Vec::new(),
                hnsw: None,
            });
        }

        let texts: Vec<String> = refs.iter().map(|r| r.text.clone()).collect();
        let mut vectors = embedder.embed(&texts).await?;
        for v in &mut vectors {
            normalize(v);
        }

        // HNSW params (conservative defaults):
        // - `m`: max connections per layer
        // - `ef_construction`: construction search width
        let m: usize = 16;
        let ef_construction: usize = 200;
        let nb_elem = refs.len();
        let max_layer = 16.min((nb_elem as f32).ln().trunc() as usize).max(1);

        let hnsw = Hnsw::<f32, DistCosine>::new(m, nb_elem, max_layer, ef_construction, DistCosine {});
        for (i, v) in vectors.iter().enumerate() {
            hnsw.insert((&v[..], i));
        }

        tracing::debug!(excerpts = nb_elem, "similarity index built");
        Ok(Self {
            refs,
            vectors,
            hnsw: Some(hnsw),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Top `limit` excerpts by cosine similarity to the query text.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<SimilarityHit>, LlmError> {
        let Some(hnsw) = self.hnsw.as_ref() else {
            return Ok(Vec::new());
        };
        let mut qv = embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("empty embedding batch".to_string()))?;
        normalize(&mut qv);

        // Over-fetch candidates, then rerank exactly.
        let k = (limit.saturating_mul(4)).clamp(1, 200).min(self.refs.len());
        let ef_search = 64;
        let neighbours = hnsw.search(&qv, k, ef_search);

        let mut scored: Vec<(f32, usize)> = neighbours
            .into_iter()
            .filter(|n| n.d_id < self.refs.len())
            .map(|n| (dot(&qv, &self.vectors[n.d_id]), n.d_id))
            .collect();
        scored.sort_by(|(sa, ia), (sb, ib)| {
            sb.total_cmp(sa)
                .then_with(|| self.refs[*ia].source_id.cmp(&self.refs[*ib].source_id))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, i)| SimilarityHit {
                excerpt: self.refs[i].clone(),
                score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::TokenHashEmbedder;
    use contractgraph_graph::MemoryGraph;
    use contractgraph_schema::{
        AgreementFacts, CanonicalDocument, ClauseInstance, ClauseType, GoverningLaw,
    };

    fn doc(source_id: &str, clause: ClauseType, excerpt: &str) -> CanonicalDocument {
        CanonicalDocument {
            source_id: source_id.into(),
            agreement: AgreementFacts {
                name: source_id.into(),
                agreement_type: "Service".into(),
                ..Default::default()
            },
            parties: Vec::new(),
            governing_law: GoverningLaw::default(),
            clauses: ClauseType::ALL
                .iter()
                .map(|ct| {
                    if *ct == clause {
                        ClauseInstance {
                            clause_type: *ct,
                            exists: true,
                            excerpts: vec![excerpt.to_string()],
                        }
                    } else {
                        ClauseInstance::absent(*ct)
                    }
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn empty_store_yields_empty_index_and_no_hits() {
        let store = MemoryGraph::new();
        let index = ExcerptIndex::build(&store, &TokenHashEmbedder).await.unwrap();
        assert!(index.is_empty());
        let hits = index.search("anything", 5, &TokenHashEmbedder).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn on_topic_excerpt_ranks_first() {
        let store = MemoryGraph::new();
        store
            .upsert_document(
                &doc(
                    "invoicing.pdf",
                    ClauseType::RevenueProfitSharing,
                    "Payment of all invoices is due within thirty days; late payment accrues interest",
                ),
                "d1",
            )
            .unwrap();
        store
            .upsert_document(
                &doc(
                    "insurance.pdf",
                    ClauseType::Insurance,
                    "The supplier shall maintain commercial general liability insurance",
                ),
                "d2",
            )
            .unwrap();

        let index = ExcerptIndex::build(&store, &TokenHashEmbedder).await.unwrap();
        assert_eq!(index.len(), 2);
        let hits = index.search("payment terms", 2, &TokenHashEmbedder).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].excerpt.source_id, "invoicing.pdf");
        assert!(hits[0].score > hits[1].score);
    }
}
