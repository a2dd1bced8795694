//src/reference.rs

use std::path::Path;

use ahash::AHashSet;

use crate::errors::InsertionError;
use crate::tree::{read_maybe_gz, Tree};

/// Harvest the sequence identifiers of a (possibly aligned) FASTA file.
/// Residues are opaque payload here; only the ID set matters to validation.
/// Supports `.gz`. The ID is the first whitespace-delimited token of the
/// header line.
pub fn read_alignment_ids<P: AsRef<Path>>(path: P) -> Result<AHashSet<String>, InsertionError> {
    let text = read_maybe_gz(path.as_ref())?;

    let mut ids = AHashSet::new();
    for line in text.lines() {
        if let Some(header) = line.strip_prefix('>') {
            let id = header.split_whitespace().next().unwrap_or("").to_string();
            if !id.is_empty() {
                ids.insert(id);
            }
        }
    }
    Ok(ids)
}

/// Like [`read_alignment_ids`] but keeps the file order (first occurrence
/// wins), so classification output rows are reproducible run to run.
pub fn read_fragment_ids<P: AsRef<Path>>(path: P) -> Result<Vec<String>, InsertionError> {
    let text = read_maybe_gz(path.as_ref())?;

    let mut seen = AHashSet::new();
    let mut ids = Vec::new();
    for line in text.lines() {
        if let Some(header) = line.strip_prefix('>') {
            let id = header.split_whitespace().next().unwrap_or("");
            if !id.is_empty() && seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        }
    }
    Ok(ids)
}

/// Cross-validation support: remove the query IDs from a reference tree so
/// the queries can be re-inserted into a reference that does not know them.
/// Queries absent from the reference are only reported, never fatal; the
/// shear itself collapses any internal node left with one child.
pub fn crossvalidation_shear(
    tree: &Tree,
    query_ids: &AHashSet<String>,
) -> Result<Tree, InsertionError> {
    let tips = tree.tip_name_set();

    let missing: Vec<&String> = query_ids.difference(&tips).collect();
    if !missing.is_empty() {
        let mut names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
        names.sort_unstable();
        log::warn!(
            "{} query IDs not present in reference and thus not removed: {}",
            names.len(),
            names.join(", ")
        );
    }

    let keep: AHashSet<String> = tips.difference(query_ids).cloned().collect();
    log::info!(
        "cross-validate: removing {} / {} tips from reference",
        tips.len() - keep.len(),
        tips.len()
    );
    tree.shear(&keep)
}

/// Check that an alignment and a phylogeny describe exactly the same
/// sequences: the alignment's ID set must equal the tree's tip-name set.
///
/// On mismatch the error carries both one-sided differences as sorted lists.
/// Empty-vs-empty compares equal (degenerate but valid); one empty side shows
/// up as a full one-sided mismatch.
pub fn validate_reference(
    alignment_ids: &AHashSet<String>,
    tree: &Tree,
) -> Result<(), InsertionError> {
    let tip_names = tree.tip_name_set();

    let mut alignment_only: Vec<String> =
        alignment_ids.difference(&tip_names).cloned().collect();
    let mut tree_only: Vec<String> = tip_names.difference(alignment_ids).cloned().collect();

    if alignment_only.is_empty() && tree_only.is_empty() {
        return Ok(());
    }

    alignment_only.sort_unstable();
    tree_only.sort_unstable();
    log::warn!(
        "reference bundle mismatch: {} alignment-only IDs, {} tree-only IDs",
        alignment_only.len(),
        tree_only.len()
    );

    Err(InsertionError::Consistency {
        alignment_only,
        tree_only,
    })
}
