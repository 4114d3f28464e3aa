//! The clause knowledge graph.
//!
//! Two layers:
//!
//! - [`GraphStore`]: the seam to the underlying graph engine. The engine's
//!   storage and transaction internals are assumed, not reimplemented; the
//!   trait captures exactly the operations this system needs (atomic
//!   per-document upsert plus the read traversals the retrieval router
//!   uses). [`MemoryGraph`] is the indexed in-memory reference
//!   implementation, with snapshot persistence for the CLI.
//! - [`GraphWriter`]: the upsert engine. Validates invariants, dedups
//!   parties within a document, serializes re-ingestion of the same source,
//!   skips unchanged documents via content digest, and retries transient
//!   store failures with bounded exponential backoff.

mod memory;
mod store;
mod writer;

pub use memory::MemoryGraph;
pub use store::{
    AgreementView, ExcerptRef, GraphStats, GraphStore, StoreError, UpsertReceipt,
};
pub use writer::{document_digest, GraphWriter, IngestError, RetryPolicy, UpsertOutcome};
