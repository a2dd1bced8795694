// src/lib.rs
pub mod classify;
pub mod errors;
pub mod feature_table;
pub mod placements;
pub mod reference;
pub mod sepp;
pub mod taxonomy;
pub mod tree;
pub mod types;

use std::path::Path;

pub use classify::{classify_otus_experimental, classify_paths};
pub use errors::InsertionError;
pub use feature_table::{filter_features, FeatureTable};
pub use placements::{read_placements_file, validate_placements_json};
pub use reference::{read_alignment_ids, read_fragment_ids, validate_reference};
pub use sepp::{run_sepp, ReferenceBundle, SeppConfig, SeppOutputs};
pub use taxonomy::{parse_taxonomy_table, LineageMap};
pub use tree::Tree;
pub use types::{FeatureFilterStats, TaxonomyAssignment};

/// Everything one insertion run produces: the IDs of the fragments that were
/// sent to the external tool (in input order) plus its harvested outputs.
pub struct InsertionRun {
    pub fragment_ids: Vec<String>,
    pub outputs: SeppOutputs,
}

/// Insert fragment sequences into a reference phylogeny via the external
/// placement tool.
///
/// Reads the fragment IDs, validates the reference bundle when one is given,
/// runs the blocking subprocess, and hands back the branch-length-repaired
/// insertion tree together with the validated placement record. The returned
/// fragment IDs are the ones to feed into [`classify_paths`] or
/// [`classify_otus_experimental`].
pub fn sepp<P: AsRef<Path>>(
    fragments_fasta: P,
    config: &SeppConfig,
) -> Result<InsertionRun, InsertionError> {
    let fragment_ids = read_fragment_ids(fragments_fasta.as_ref())?;
    if fragment_ids.is_empty() {
        return Err(InsertionError::EmptyResult(
            "fragment file contains no sequences".to_string(),
        ));
    }
    let outputs = run_sepp(fragments_fasta.as_ref(), config)?;
    Ok(InsertionRun {
        fragment_ids,
        outputs,
    })
}

/// Serialize classification rows in the two-column taxonomy table shape
/// (`#OTU ID`, `taxonomy`), plus the constant confidence/hit columns the
/// benchmarking harnesses expect. Null lineages become empty cells.
pub fn assignments_to_tsv(rows: &[TaxonomyAssignment]) -> String {
    let mut out = String::from("#OTU ID\ttaxonomy\tconfidence\tnum hits\n");
    for row in rows {
        out.push_str(&format!(
            "{}\t{}\t1.0\t1\n",
            row.fragment_id,
            row.lineage.as_deref().unwrap_or("")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A small post-insertion tree: reference tips A..D with rank-labeled
    /// internals, fragments f1/f2 inserted among them.
    fn insertion_tree() -> Tree {
        let mut tree = Tree::parse_newick(
            "(((f1:0.01,A:0.1)g__Foo:0.2,(f2:0.02,B:0.1)g__Bar:0.2)k__Bacteria:0.3,\
             (C:0.1,D:0.1)k__Archaea:0.3)root;",
        )
        .unwrap();
        tree.fill_missing_lengths();
        tree
    }

    fn taxonomy() -> LineageMap {
        [
            ("A", "k__Bacteria; g__Foo"),
            ("B", "k__Bacteria; g__Bar"),
            ("C", "k__Archaea"),
            ("D", "k__Archaea"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_full_classification_pipeline() {
        let tree = insertion_tree();
        let fragments = vec!["f1".to_string(), "f2".to_string()];

        // the reference bundle that produced this tree must be self-consistent
        let reference_ids = ["A", "B", "C", "D", "f1", "f2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        validate_reference(&reference_ids, &tree).unwrap();

        // path-based lineages come from the rank-marked ancestors
        let by_path = classify_paths(&fragments, &tree).unwrap();
        assert_eq!(
            by_path[0].lineage.as_deref(),
            Some("k__Bacteria; g__Foo")
        );
        assert_eq!(by_path[1].lineage.as_deref(), Some("k__Bacteria; g__Bar"));

        // OTU-based agrees here: each fragment's first labeled clade holds
        // exactly one mapped reference tip
        let by_otus = classify_otus_experimental(&fragments, &tree, &taxonomy()).unwrap();
        assert_eq!(by_otus, by_path);

        // reconcile an abundance table against the same tree
        let table = FeatureTable::parse_tsv(
            "#OTU ID\ts1\ts2\nf1\t5\t0\nf2\t0\t7\nunplaced\t1\t1\n",
        )
        .unwrap();
        let (retained, rejected, stats) = filter_features(&table, &tree).unwrap();
        assert_eq!(retained.feature_ids(), ["f1", "f2"]);
        assert_eq!(rejected.feature_ids(), ["unplaced"]);
        assert_eq!(stats.total_rejected(), 2.0);

        // and the placement record that came with the tree passes its check
        let doc = json!({
            "tree": tree.to_newick(),
            "placements": [{"p": [[0, -1234.5]], "nm": [["f1", 1]]}],
            "metadata": {"invocation": "run-sepp.sh"},
            "version": 3,
            "fields": ["edge_num", "likelihood"],
        });
        validate_placements_json(&doc).unwrap();

        let tsv = assignments_to_tsv(&by_path);
        assert!(tsv.starts_with("#OTU ID\ttaxonomy\tconfidence\tnum hits\n"));
        assert!(tsv.contains("f1\tk__Bacteria; g__Foo\t1.0\t1\n"));
    }

    #[test]
    fn test_classifiers_disagree_on_missing_fragments_by_design() {
        let tree = insertion_tree();
        let fragments = vec!["f1".to_string(), "ghost".to_string()];

        // path-based: null row for the missing fragment
        let by_path = classify_paths(&fragments, &tree).unwrap();
        assert_eq!(by_path.len(), 2);
        assert!(by_path[1].lineage.is_none());

        // OTU-based: the missing fragment is skipped entirely
        let by_otus = classify_otus_experimental(&fragments, &tree, &taxonomy()).unwrap();
        assert_eq!(by_otus.len(), 1);
        assert_eq!(by_otus[0].fragment_id, "f1");
    }
}
