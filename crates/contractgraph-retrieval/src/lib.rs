//! Retrieval over the clause knowledge graph.
//!
//! A query, structured call or free-form question, is routed onto
//! one of four strategies, in priority order:
//!
//! 1. exact lookup by agreement id or party name (graph traversal),
//! 2. clause-type filter over the clause index,
//! 3. text similarity over excerpt embeddings (HNSW + exact cosine rerank),
//! 4. cross-contract aggregation via an LLM-generated query program.
//!
//! Empty results from strategies 1-3 are valid answers, never errors.
//! Retrieval is read-only throughout; nothing here writes to the store.

pub mod compose;
pub mod index;
pub mod providers;
pub mod router;
pub mod text2query;

pub use compose::{AgreementSummary, Answer, AnswerOutcome, ClauseSummary};
pub use index::{ExcerptIndex, SimilarityHit};
pub use providers::{
    with_backoff, BackoffPolicy, CompletionProvider, EmbeddingProvider, LlmError, MockCompletion,
    OpenAiClient, ProviderConfig, Retrying, TokenHashEmbedder,
};
pub use router::{QueryRequest, RetrievalError, RetrievalRouter};
pub use text2query::{Filter, GroupBy, QueryOutput, QueryProgram, Select};
