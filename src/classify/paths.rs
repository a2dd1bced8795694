//src/classify/paths.rs

use crate::errors::InsertionError;
use crate::taxonomy::RANK_MARKER;
use crate::tree::Tree;
use crate::types::TaxonomyAssignment;

use super::ensure_any_lineage;

/// Path-based lineage propagation.
///
/// For each inserted fragment, walk from its tip strictly toward the root and
/// collect every ancestor label carrying the `"__"` rank marker (Greengenes
/// style, e.g. `g__Foo`). The labels are emitted root-most first, joined with
/// `"; "`. A fragment missing from the tree gets a null lineage, not an
/// error; only an all-null result is fatal.
pub fn classify_paths(
    fragment_ids: &[String],
    tree: &Tree,
) -> Result<Vec<TaxonomyAssignment>, InsertionError> {
    let mut rows = Vec::with_capacity(fragment_ids.len());

    for fragment_id in fragment_ids {
        let lineage = tree.find_tip(fragment_id).map(|tip| {
            let mut ranks: Vec<&str> = Vec::new();
            // ancestors() runs tipward to root; the lineage reads the other way
            for ancestor in tree.ancestors(tip) {
                if let Some(name) = &tree.node(ancestor).name {
                    if name.contains(RANK_MARKER) {
                        ranks.push(name.as_str());
                    }
                }
            }
            ranks.reverse();
            ranks.join("; ")
        });
        rows.push(TaxonomyAssignment {
            fragment_id: fragment_id.clone(),
            lineage,
        });
    }

    ensure_any_lineage(&rows, "path")?;
    Ok(rows)
}
