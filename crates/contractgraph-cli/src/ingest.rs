//! Ingestion command: extraction JSON -> normalizer -> graph writer.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use contractgraph_graph::{GraphWriter, UpsertOutcome};
use contractgraph_ingest::{normalize_document, NormalizeOutcome, Quarantined};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if input.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(input)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        return Ok(files);
    }
    Err(anyhow!("input not found: {}", input.display()))
}

fn source_id_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn write_quarantine(dir: &Path, quarantined: &Quarantined) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating quarantine dir {}", dir.display()))?;
    let file = dir.join(format!("{}.{}.json", quarantined.source_id, quarantined.id));
    let body = serde_json::to_string_pretty(quarantined)?;
    std::fs::write(&file, body)
        .with_context(|| format!("writing quarantine file {}", file.display()))?;
    Ok(file)
}

pub fn cmd_ingest(store_path: &Path, input: &Path, quarantine_dir: &Path) -> Result<()> {
    let store = Arc::new(super::load_store(store_path)?);
    let writer = GraphWriter::new(store.clone());
    let files = collect_inputs(input)?;
    if files.is_empty() {
        println!("{}", "no *.json inputs found".yellow());
        return Ok(());
    }

    let mut created = 0usize;
    let mut replaced = 0usize;
    let mut unchanged = 0usize;
    let mut quarantined = 0usize;
    let mut failed = 0usize;

    for file in &files {
        let source_id = source_id_for(file);

        let payload: serde_json::Value = match std::fs::read_to_string(file)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str(&text).map_err(anyhow::Error::from))
        {
            Ok(v) => v,
            Err(e) => {
                failed += 1;
                println!("{} {}: {e}", "unreadable".red(), source_id);
                continue;
            }
        };

        match normalize_document(&source_id, &payload) {
            NormalizeOutcome::Quarantined(q) => {
                // A quarantine-write failure is this document's problem;
                // siblings keep going.
                match write_quarantine(quarantine_dir, &q) {
                    Ok(dest) => {
                        quarantined += 1;
                        println!(
                            "{} {}: {} violation(s), payload kept at {}",
                            "quarantined".red(),
                            source_id,
                            q.violations.len(),
                            dest.display()
                        );
                        for v in &q.violations {
                            println!("    {v}");
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        println!("{} {source_id}: quarantine write failed: {e:#}", "failed".red());
                    }
                }
            }
            NormalizeOutcome::Normalized(normalized) => {
                for coercion in &normalized.coercions {
                    println!("  {} {}: {coercion}", "coerced".yellow(), source_id);
                }
                match writer.ingest(&normalized.document) {
                    Ok(UpsertOutcome::Created) => {
                        created += 1;
                        println!("{} {source_id}", "created".green());
                    }
                    Ok(UpsertOutcome::Replaced) => {
                        replaced += 1;
                        println!("{} {source_id}", "replaced".blue());
                    }
                    Ok(UpsertOutcome::Unchanged) => {
                        unchanged += 1;
                        println!("{} {source_id}", "unchanged".dimmed());
                    }
                    Err(e) => {
                        // Per-document failure; siblings keep going.
                        failed += 1;
                        println!("{} {source_id}: {e}", "failed".red());
                    }
                }
            }
        }
    }

    store
        .save(store_path)
        .map_err(|e| anyhow!("saving snapshot {}: {e}", store_path.display()))?;

    println!(
        "\n{}: {created} created, {replaced} replaced, {unchanged} unchanged, {quarantined} quarantined, {failed} failed",
        "done".bold()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contractgraph_graph::{GraphStore, MemoryGraph};

    #[test]
    fn unwritable_quarantine_dir_does_not_block_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("graph.snapshot");
        let input_dir = dir.path().join("in");
        std::fs::create_dir(&input_dir).unwrap();
        // Sorted before good.json, so the quarantine-write failure comes
        // first.
        std::fs::write(
            input_dir.join("bad.json"),
            r#"{"agreement":{"name":"Bad","clauses":[{"clause_type":"Force Majeure","exists":true,"excerpts":["x"]}]}}"#,
        )
        .unwrap();
        std::fs::write(
            input_dir.join("good.json"),
            r#"{"agreement":{"name":"Good Agreement","agreement_type":"Service"}}"#,
        )
        .unwrap();
        // Quarantine path routed through a regular file, so creating the
        // directory fails.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let quarantine = blocker.join("q");

        cmd_ingest(&store_path, &input_dir, &quarantine).unwrap();

        let store = MemoryGraph::load(&store_path).unwrap();
        assert!(store.agreement("good.json").is_some());
        assert!(store.agreement("bad.json").is_none());
        assert_eq!(store.stats().agreements, 1);
    }
}
