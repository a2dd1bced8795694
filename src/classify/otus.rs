//src/classify/otus.rs

use ahash::AHashSet;

use crate::errors::InsertionError;
use crate::taxonomy::{consensus_lineage, LineageMap};
use crate::tree::Tree;
use crate::types::TaxonomyAssignment;

use super::ensure_any_lineage;

/// OTU-based lineage propagation ("nearest enclosing labeled clade").
///
/// Every reference tip (a tip that is not one of the inserted fragments) must
/// have a taxonomy entry; the check runs up front over the whole tree so one
/// run reports every gap at once. For each fragment the search starts at its
/// tip and widens upward: the subtree under the current ancestor is scanned
/// in post-order for nodes whose name is a taxonomy key, and the walk stops
/// at the first ancestor whose subtree yields at least one hit.
///
/// One hit: that OTU's lineage, verbatim. Several hits: the rank-wise longest
/// common prefix of their lineages. A fragment absent from the tree is
/// skipped entirely, contributing no row.
pub fn classify_otus_experimental(
    fragment_ids: &[String],
    tree: &Tree,
    taxonomy: &LineageMap,
) -> Result<Vec<TaxonomyAssignment>, InsertionError> {
    check_reference_coverage(fragment_ids, tree, taxonomy)?;

    let mut rows = Vec::with_capacity(fragment_ids.len());
    for fragment_id in fragment_ids {
        let Some(tip) = tree.find_tip(fragment_id) else {
            // routine: the fragment simply failed to place
            continue;
        };

        let mut current = tip;
        let mut found: Vec<&str> = Vec::new();
        loop {
            for id in tree.postorder_from(current) {
                if let Some(name) = &tree.node(id).name {
                    if taxonomy.contains_key(name) {
                        found.push(name.as_str());
                    }
                }
            }
            if !found.is_empty() {
                break;
            }
            match tree.node(current).parent {
                Some(parent) => current = parent,
                None => break, // reached the root with nothing labeled
            }
        }

        let lineage = match found.as_slice() {
            [] => None,
            [only] => Some(taxonomy[*only].clone()),
            many => {
                let candidates: Vec<&str> =
                    many.iter().map(|name| taxonomy[*name].as_str()).collect();
                consensus_lineage(&candidates)
            }
        };
        rows.push(TaxonomyAssignment {
            fragment_id: fragment_id.clone(),
            lineage,
        });
    }

    if rows.is_empty() {
        return Err(InsertionError::EmptyResult(
            "none of the fragments were found in the insertion tree".to_string(),
        ));
    }
    ensure_any_lineage(&rows, "otus")?;
    Ok(rows)
}

/// Precondition of the OTU strategy: every non-fragment tip needs a lineage.
/// The mismatch count goes to the log before the error is raised, and the
/// full identity list is logged too, so a huge gap list never bloats the
/// error message itself.
fn check_reference_coverage(
    fragment_ids: &[String],
    tree: &Tree,
    taxonomy: &LineageMap,
) -> Result<(), InsertionError> {
    let fragment_set: AHashSet<&str> = fragment_ids.iter().map(String::as_str).collect();

    let mut missing: Vec<String> = tree
        .tips()
        .filter_map(|id| tree.node(id).name.as_ref())
        .filter(|name| !fragment_set.contains(name.as_str()) && !taxonomy.contains_key(*name))
        .cloned()
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    missing.sort_unstable();
    log::info!(
        "{} reference tips without taxonomy entry out of {} tips total",
        missing.len(),
        tree.tip_count()
    );
    log::warn!("unmapped reference tips: {}", missing.join(", "));
    Err(InsertionError::MappingGap { missing })
}
