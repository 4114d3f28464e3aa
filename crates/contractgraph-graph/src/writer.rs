//! The upsert engine.
//!
//! Sits between the normalizer and a [`GraphStore`]:
//!
//! - re-checks document invariants before anything touches the store
//! - dedups parties within a document on (name, role)
//! - serializes concurrent ingestion of the same source id
//! - skips the write entirely when the content digest is unchanged
//! - retries transient store failures with bounded exponential backoff

use crate::store::{GraphStore, StoreError, UpsertReceipt};
use contractgraph_schema::{CanonicalDocument, InvariantViolation};
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("document failed validation: {0}")]
    Validation(#[from] InvariantViolation),
    #[error("could not fingerprint document: {0}")]
    Fingerprint(#[from] serde_json::Error),
    #[error("ingestion failed for {source_id} after {attempts} attempt(s): {last}")]
    IngestionFailed {
        source_id: String,
        attempts: u32,
        #[source]
        last: StoreError,
    },
}

/// What `ingest` did with the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Replaced,
    /// Content digest matched the stored one; the store was not written.
    Unchanged,
}

/// Retry schedule for transient store failures. Attempt `n` (1-based)
/// sleeps `base_delay * 2^(n-1)` before retrying.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

/// Content fingerprint of a canonical document: SHA-256 over its JSON
/// serialization, hex-encoded. Field order is fixed by the struct
/// definitions, so equal documents always produce equal digests.
pub fn document_digest(doc: &CanonicalDocument) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(doc)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub struct GraphWriter<S: GraphStore> {
    store: Arc<S>,
    policy: RetryPolicy,
    /// Per-source-id write locks. Concurrent ingestion of distinct
    /// documents proceeds in parallel; same source id is serialized.
    source_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: GraphStore> GraphWriter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: Arc<S>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            source_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Ingest one normalized document. Idempotent: re-ingesting identical
    /// content is a no-op, re-ingesting changed content replaces the
    /// document's whole subgraph.
    pub fn ingest(&self, doc: &CanonicalDocument) -> Result<UpsertOutcome, IngestError> {
        doc.check_invariants()?;
        let doc = dedup_parties(doc);
        let digest = document_digest(&doc)?;

        let lock = self
            .source_locks
            .entry(doc.source_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        if self.store.document_digest(&doc.source_id).as_deref() == Some(digest.as_str()) {
            tracing::debug!(source_id = %doc.source_id, "content unchanged, skipping write");
            return Ok(UpsertOutcome::Unchanged);
        }

        let receipt = self.upsert_with_retry(&doc, &digest)?;
        Ok(match receipt {
            UpsertReceipt::Created => UpsertOutcome::Created,
            UpsertReceipt::Replaced => UpsertOutcome::Replaced,
        })
    }

    fn upsert_with_retry(
        &self,
        doc: &CanonicalDocument,
        digest: &str,
    ) -> Result<UpsertReceipt, IngestError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.store.upsert_document(doc, digest) {
                Ok(receipt) => return Ok(receipt),
                Err(err @ StoreError::Rejected(_)) => {
                    return Err(IngestError::IngestionFailed {
                        source_id: doc.source_id.clone(),
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err @ StoreError::Unavailable(_)) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(IngestError::IngestionFailed {
                            source_id: doc.source_id.clone(),
                            attempts: attempt,
                            last: err,
                        });
                    }
                    let delay = self.policy.base_delay * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        source_id = %doc.source_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "store unavailable, retrying"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

/// Drop repeated parties, keeping the first occurrence. Identity is
/// (name, role), case-insensitive.
fn dedup_parties(doc: &CanonicalDocument) -> CanonicalDocument {
    let mut seen = std::collections::HashSet::new();
    let mut out = doc.clone();
    out.parties
        .retain(|p| seen.insert((p.name.to_lowercase(), p.role.to_lowercase())));
    out
}
