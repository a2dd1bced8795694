//src/taxonomy.rs

use std::path::Path;

use ahash::AHashMap;

use crate::errors::InsertionError;
use crate::tree::read_maybe_gz;

/// OTU id -> semicolon-delimited lineage string, e.g.
/// `"k__Bacteria; p__Firmicutes; ...; s__"`.
pub type LineageMap = AHashMap<String, String>;

/// Greengenes-style rank delimiter; a node label carrying this infix is a
/// taxonomic rank label (`g__Foo`), not a sequence identifier.
pub const RANK_MARKER: &str = "__";

/// Parses a two-column taxonomy table:
/// ```text
/// <otu id>\t<lineage>
/// ```
/// Supports `.gz`. IDs stay strings even when they look numeric, because tree
/// tip names are strings and `42` must not silently equal `"42"` elsewhere.
/// Malformed lines are skipped, matching how the rest of the crate treats
/// tabular reference inputs.
pub fn parse_taxonomy_table<P: AsRef<Path>>(path: P) -> Result<LineageMap, InsertionError> {
    let text = read_maybe_gz(path.as_ref())?;

    let mut lineages: LineageMap = AHashMap::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 2 {
            continue;
        }
        let otu_id = parts[0].trim();
        let lineage = parts[1].trim();
        if otu_id.is_empty() || otu_id.starts_with('#') {
            continue;
        }
        lineages.insert(otu_id.to_string(), lineage.to_string());
    }

    log::info!("loaded taxonomy table with {} OTU lineages", lineages.len());
    Ok(lineages)
}

/// Split a lineage string into rank tokens, trimming the per-segment
/// whitespace that reference tables routinely carry (`"k__X; p__Y"`).
pub fn lineage_ranks(lineage: &str) -> Vec<String> {
    lineage.split(';').map(|rank| rank.trim().to_string()).collect()
}

/// Rank-wise longest common prefix of several lineages, rejoined with `"; "`.
///
/// Each rank is an atomic token: `g__Streptococcus` and `g__Streptomyces`
/// share zero ranks at that depth even though the strings share characters.
/// Character-wise prefixing would fabricate taxa like `g__Strept`.
pub fn consensus_lineage(candidates: &[&str]) -> Option<String> {
    let first = candidates.first()?;
    let mut common = lineage_ranks(first);

    for lineage in &candidates[1..] {
        let ranks = lineage_ranks(lineage);
        let shared = common
            .iter()
            .zip(ranks.iter())
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
        if common.is_empty() {
            break;
        }
    }

    if common.is_empty() {
        None
    } else {
        Some(common.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn consensus_of_one_is_verbatim_ranks() {
        assert_eq!(
            consensus_lineage(&["k__X; p__Y"]).as_deref(),
            Some("k__X; p__Y")
        );
    }

    #[test]
    fn consensus_stops_at_first_diverging_rank() {
        let got = consensus_lineage(&[
            "k__X; p__Y; g__Streptococcus",
            "k__X; p__Y; g__Streptomyces",
        ]);
        // the shared "g__Strept" characters must not extend the prefix
        assert_eq!(got.as_deref(), Some("k__X; p__Y"));
    }

    #[test]
    fn consensus_trims_segment_whitespace() {
        let got = consensus_lineage(&["k__X ;p__Y", " k__X; p__Y; c__Z"]);
        assert_eq!(got.as_deref(), Some("k__X; p__Y"));
    }

    #[test]
    fn consensus_with_nothing_shared_is_none() {
        assert_eq!(consensus_lineage(&["k__A", "k__B"]), None);
        assert_eq!(consensus_lineage(&[]), None);
    }

    #[test]
    fn parses_table_and_keeps_ids_as_strings() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "#OTU ID\ttaxonomy").unwrap();
        writeln!(f, "4479944\tk__Bacteria; p__Firmicutes").unwrap();
        writeln!(f, "otuA\tk__Archaea").unwrap();
        writeln!(f, "broken_line_without_tab").unwrap();

        let map = parse_taxonomy_table(f.path()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get("4479944").map(String::as_str),
            Some("k__Bacteria; p__Firmicutes")
        );
    }
}
