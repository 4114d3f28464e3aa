//! Indexed in-memory reference store.
//!
//! Row tables plus bitmap secondary indexes, in the same shape a
//! path-indexed graph engine would maintain them: a clause-type index over
//! `exists=true` agreements, a party-name index, and a governing-country
//! index, all keyed by compact agreement ids. Snapshots serialize the whole
//! table set with bincode.

use crate::store::{
    AgreementView, ExcerptRef, GraphStats, GraphStore, StoreError, UpsertReceipt,
};
use contractgraph_schema::{CanonicalDocument, ClauseInstance, ClauseType, GoverningLaw, Party};
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgreementRow {
    source_id: String,
    facts: contractgraph_schema::AgreementFacts,
    governing_law: GoverningLaw,
    digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PartyRow {
    agreement: u32,
    party: Party,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClauseRow {
    agreement: u32,
    clause: ClauseInstance,
}

/// All tables and indexes. Mutated only as a whole, under one write lock,
/// so a per-document upsert is atomic with respect to every reader.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    /// Agreement id -> row. BTreeMap keeps id iteration stable.
    agreements: BTreeMap<u32, AgreementRow>,
    /// Identity key -> agreement id.
    by_source: HashMap<String, u32>,
    parties: Vec<PartyRow>,
    clauses: Vec<ClauseRow>,
    /// Clause type -> agreements where the clause exists.
    clause_index: HashMap<ClauseType, RoaringBitmap>,
    /// Case-folded party name -> agreements.
    party_index: HashMap<String, RoaringBitmap>,
    /// Case-folded governing country -> agreements.
    country_index: HashMap<String, RoaringBitmap>,
    next_id: u32,
}

impl Tables {
    fn remove_subgraph(&mut self, id: u32) {
        self.parties.retain(|p| p.agreement != id);
        self.clauses.retain(|c| c.agreement != id);
        for bitmap in self.clause_index.values_mut() {
            bitmap.remove(id);
        }
        for bitmap in self.party_index.values_mut() {
            bitmap.remove(id);
        }
        for bitmap in self.country_index.values_mut() {
            bitmap.remove(id);
        }
    }

    fn insert_subgraph(&mut self, id: u32, doc: &CanonicalDocument) {
        for party in &doc.parties {
            self.party_index
                .entry(party.name.to_lowercase())
                .or_default()
                .insert(id);
            self.parties.push(PartyRow {
                agreement: id,
                party: party.clone(),
            });
        }
        for country in &doc.governing_law.countries {
            self.country_index
                .entry(country.to_lowercase())
                .or_default()
                .insert(id);
        }
        for clause in &doc.clauses {
            if clause.exists {
                self.clause_index
                    .entry(clause.clause_type)
                    .or_default()
                    .insert(id);
            }
            self.clauses.push(ClauseRow {
                agreement: id,
                clause: clause.clone(),
            });
        }
    }

    fn view(&self, id: u32) -> Option<AgreementView> {
        let row = self.agreements.get(&id)?;
        Some(AgreementView {
            source_id: row.source_id.clone(),
            facts: row.facts.clone(),
            parties: self
                .parties
                .iter()
                .filter(|p| p.agreement == id)
                .map(|p| p.party.clone())
                .collect(),
            governing_law: row.governing_law.clone(),
            clauses: self
                .clauses
                .iter()
                .filter(|c| c.agreement == id)
                .map(|c| c.clause.clone())
                .collect(),
        })
    }

    /// Materialize a bitmap of agreement ids as views, ordered by
    /// identity key ascending.
    fn views(&self, ids: &RoaringBitmap) -> Vec<AgreementView> {
        let mut views: Vec<AgreementView> = ids.iter().filter_map(|id| self.view(id)).collect();
        views.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        views
    }
}

/// In-memory graph store.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    tables: RwLock<Tables>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the full table set.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(&*self.tables.read())
            .map_err(|e| StoreError::Unavailable(format!("snapshot encode: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let tables: Tables = bincode::deserialize(bytes)
            .map_err(|e| StoreError::Rejected(format!("snapshot decode: {e}")))?;
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
            .map_err(|e| StoreError::Unavailable(format!("snapshot write: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path)
            .map_err(|e| StoreError::Unavailable(format!("snapshot read: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl GraphStore for MemoryGraph {
    fn upsert_document(
        &self,
        doc: &CanonicalDocument,
        digest: &str,
    ) -> Result<UpsertReceipt, StoreError> {
        let mut tables = self.tables.write();

        let (id, receipt) = match tables.by_source.get(&doc.source_id).copied() {
            Some(id) => {
                // Replace-in-place: the prior subgraph goes away entirely
                // before the new one lands, inside this one lock scope.
                tables.remove_subgraph(id);
                (id, UpsertReceipt::Replaced)
            }
            None => {
                let id = tables.next_id;
                tables.next_id += 1;
                tables.by_source.insert(doc.source_id.clone(), id);
                (id, UpsertReceipt::Created)
            }
        };

        tables.agreements.insert(
            id,
            AgreementRow {
                source_id: doc.source_id.clone(),
                facts: doc.agreement.clone(),
                governing_law: doc.governing_law.clone(),
                digest: digest.to_string(),
            },
        );
        tables.insert_subgraph(id, doc);

        tracing::debug!(source_id = %doc.source_id, ?receipt, "document upserted");
        Ok(receipt)
    }

    fn document_digest(&self, source_id: &str) -> Option<String> {
        let tables = self.tables.read();
        let id = tables.by_source.get(source_id)?;
        tables.agreements.get(id).map(|row| row.digest.clone())
    }

    fn agreement(&self, source_id: &str) -> Option<AgreementView> {
        let tables = self.tables.read();
        let id = *tables.by_source.get(source_id)?;
        tables.view(id)
    }

    fn agreements(&self) -> Vec<AgreementView> {
        let tables = self.tables.read();
        let all: RoaringBitmap = tables.agreements.keys().copied().collect();
        tables.views(&all)
    }

    fn agreements_by_party(&self, party_name: &str) -> Vec<AgreementView> {
        let tables = self.tables.read();
        match tables.party_index.get(&party_name.trim().to_lowercase()) {
            Some(ids) => tables.views(ids),
            None => Vec::new(),
        }
    }

    fn agreements_by_clause(&self, clause_type: ClauseType, exists: bool) -> Vec<AgreementView> {
        let tables = self.tables.read();
        let with: RoaringBitmap = tables
            .clause_index
            .get(&clause_type)
            .cloned()
            .unwrap_or_default();
        if exists {
            tables.views(&with)
        } else {
            let all: RoaringBitmap = tables.agreements.keys().copied().collect();
            tables.views(&(all - with))
        }
    }

    fn agreements_by_governing_country(&self, country: &str) -> Vec<AgreementView> {
        let tables = self.tables.read();
        match tables.country_index.get(&country.trim().to_lowercase()) {
            Some(ids) => tables.views(ids),
            None => Vec::new(),
        }
    }

    fn existing_excerpts(&self) -> Vec<ExcerptRef> {
        let tables = self.tables.read();
        let mut out = Vec::new();
        for view in tables.views(&tables.agreements.keys().copied().collect()) {
            for clause in &view.clauses {
                if !clause.exists {
                    continue;
                }
                for text in &clause.excerpts {
                    out.push(ExcerptRef {
                        source_id: view.source_id.clone(),
                        clause_type: clause.clause_type,
                        text: text.clone(),
                    });
                }
            }
        }
        out
    }

    fn stats(&self) -> GraphStats {
        let tables = self.tables.read();
        let countries: HashSet<&str> = tables
            .agreements
            .values()
            .flat_map(|row| row.governing_law.countries.iter().map(String::as_str))
            .chain(
                tables
                    .parties
                    .iter()
                    .filter_map(|p| p.party.incorporation_country.as_deref()),
            )
            .collect();
        GraphStats {
            agreements: tables.agreements.len() as u64,
            parties: tables.parties.len() as u64,
            clause_instances: tables.clauses.len() as u64,
            clauses_present: tables.clause_index.values().map(|b| b.len()).sum(),
            excerpts: tables
                .clauses
                .iter()
                .map(|c| c.clause.excerpts.len() as u64)
                .sum(),
            countries: countries.len() as u64,
        }
    }
}
