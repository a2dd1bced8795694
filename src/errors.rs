//src/errors.rs

use thiserror::Error;

/// All fatal failure modes of the insertion core.
///
/// Per-item misses (a fragment that did not make it into the tree) are *not*
/// errors; they surface as `None` lineages or skipped rows. Everything here
/// aborts the whole operation.
#[derive(Debug, Error)]
pub enum InsertionError {
    /// The alignment's ID set and the tree's tip-name set differ, or a
    /// table/tree reconciliation retained nothing. Carries the offending IDs,
    /// sorted, so messages are deterministic.
    #[error(
        "reference alignment and phylogeny are out of sync: \
         {} IDs only in alignment ({}), {} IDs only in tree ({})",
        .alignment_only.len(),
        preview(.alignment_only),
        .tree_only.len(),
        preview(.tree_only)
    )]
    Consistency {
        alignment_only: Vec<String>,
        tree_only: Vec<String>,
    },

    /// Malformed input: newick syntax, placement JSON with a wrong top-level
    /// key set, or an info file missing a required signature.
    #[error("format error: {0}")]
    Format(String),

    /// Reference tips without a taxonomy entry. The message carries the count
    /// and the first few names; the full list goes to the log.
    #[error(
        "{} reference tips have no taxonomy entry, e.g. {}",
        .missing.len(),
        preview(.missing)
    )]
    MappingGap { missing: Vec<String> },

    /// A classification or reconciliation produced no usable rows. Almost
    /// always means the fragment set and the tree are from different runs.
    #[error("no usable rows produced: {0}")]
    EmptyResult(String),

    /// The external placement tool exited non-zero. Its exit status is the
    /// only signal we get; nothing is retried.
    #[error("external placement tool failed: {0}")]
    Subprocess(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// First few entries of a sorted ID list, for embedding in error messages.
fn preview(ids: &[String]) -> String {
    const SHOWN: usize = 5;
    if ids.is_empty() {
        return "-".to_string();
    }
    let head: Vec<&str> = ids.iter().take(SHOWN).map(String::as_str).collect();
    if ids.len() > SHOWN {
        format!("{}, ...", head.join(", "))
    } else {
        head.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_message_counts_both_sides() {
        let err = InsertionError::Consistency {
            alignment_only: vec!["a1".into(), "a2".into()],
            tree_only: vec!["t1".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 IDs only in alignment"));
        assert!(msg.contains("1 IDs only in tree"));
        assert!(msg.contains("a1, a2"));
        assert!(msg.contains("t1"));
    }

    #[test]
    fn mapping_gap_message_truncates_long_lists() {
        let missing: Vec<String> = (0..20).map(|i| format!("otu{}", i)).collect();
        let err = InsertionError::MappingGap { missing };
        let msg = err.to_string();
        assert!(msg.contains("20 reference tips"));
        assert!(msg.contains("..."));
        assert!(!msg.contains("otu19"));
    }
}
