//src/feature_table.rs

use std::fmt::Write as FmtWrite;
use std::path::Path;

use ahash::AHashMap;

use crate::errors::InsertionError;
use crate::tree::{read_maybe_gz, Tree};
use crate::types::{FeatureFilterStats, SampleFilterStats};

/// A sparse nonnegative abundance matrix: features (tree tip candidates) by
/// samples. Rows are feature-major lists of `(sample index, value)`; zero
/// cells are never stored.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    sample_ids: Vec<String>,
    feature_ids: Vec<String>,
    rows: Vec<Vec<(usize, f64)>>,
}

impl FeatureTable {
    pub fn new(sample_ids: Vec<String>) -> Self {
        FeatureTable {
            sample_ids,
            feature_ids: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Append one feature row. `values` must line up with `sample_ids`;
    /// zeroes are dropped on the way in.
    pub fn push_feature(&mut self, feature_id: &str, values: &[f64]) {
        let row: Vec<(usize, f64)> = values
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(i, &v)| (i, v))
            .collect();
        self.feature_ids.push(feature_id.to_string());
        self.rows.push(row);
    }

    /// Parse the tab-separated interchange form: a header row of sample IDs
    /// (first cell is the feature-ID column label), then one row per feature.
    /// Leading `#`-comment lines (the usual `# Constructed from ...` banner)
    /// are skipped; the header itself may start with `#OTU ID`. Supports `.gz`.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self, InsertionError> {
        let text = read_maybe_gz(path.as_ref())?;
        Self::parse_tsv(&text)
    }

    pub fn parse_tsv(text: &str) -> Result<Self, InsertionError> {
        let mut lines = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .skip_while(|l| l.starts_with('#') && !l.contains('\t'));

        let header = lines
            .next()
            .ok_or_else(|| InsertionError::Format("feature table is empty".to_string()))?;
        let sample_ids: Vec<String> = header
            .split('\t')
            .skip(1)
            .map(|s| s.trim().to_string())
            .collect();
        if sample_ids.is_empty() {
            return Err(InsertionError::Format(
                "feature table header has no sample columns".to_string(),
            ));
        }

        let mut table = FeatureTable::new(sample_ids);
        for line in lines {
            let mut cells = line.split('\t');
            let feature_id = match cells.next() {
                Some(id) if !id.trim().is_empty() => id.trim().to_string(),
                _ => continue,
            };
            let mut values = Vec::with_capacity(table.sample_ids.len());
            for cell in cells {
                let v: f64 = cell.trim().parse().map_err(|_| {
                    InsertionError::Format(format!(
                        "feature table: non-numeric abundance '{}' in row '{}'",
                        cell.trim(),
                        feature_id
                    ))
                })?;
                values.push(v);
            }
            if values.len() != table.sample_ids.len() {
                return Err(InsertionError::Format(format!(
                    "feature table: row '{}' has {} values for {} samples",
                    feature_id,
                    values.len(),
                    table.sample_ids.len()
                )));
            }
            table.push_feature(&feature_id, &values);
        }
        Ok(table)
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn feature_count(&self) -> usize {
        self.feature_ids.len()
    }

    /// Abundance of one cell (0 for anything not stored).
    pub fn value(&self, feature_id: &str, sample_id: &str) -> f64 {
        let Some(f) = self.feature_ids.iter().position(|id| id == feature_id) else {
            return 0.0;
        };
        let Some(s) = self.sample_ids.iter().position(|id| id == sample_id) else {
            return 0.0;
        };
        self.rows[f]
            .iter()
            .find(|(i, _)| *i == s)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }

    /// Sum of every stored abundance.
    pub fn total_sum(&self) -> f64 {
        self.rows.iter().flatten().map(|(_, v)| v).sum()
    }

    /// Serialize back to the dense tab-separated form.
    pub fn to_tsv(&self) -> String {
        let mut out = String::from("#OTU ID");
        for sample in &self.sample_ids {
            let _ = write!(out, "\t{}", sample);
        }
        out.push('\n');
        for (f, feature) in self.feature_ids.iter().enumerate() {
            let dense: AHashMap<usize, f64> = self.rows[f].iter().copied().collect();
            out.push_str(feature);
            for s in 0..self.sample_ids.len() {
                let _ = write!(out, "\t{}", dense.get(&s).copied().unwrap_or(0.0));
            }
            out.push('\n');
        }
        out
    }

    fn subset(&self, keep: &[usize]) -> FeatureTable {
        FeatureTable {
            sample_ids: self.sample_ids.clone(),
            feature_ids: keep.iter().map(|&f| self.feature_ids[f].clone()).collect(),
            rows: keep.iter().map(|&f| self.rows[f].clone()).collect(),
        }
    }
}

/// Partition a feature table by tree tip membership.
///
/// Returns `(retained, rejected, stats)`: features present as tips of the
/// post-insertion tree versus features the tree does not know, both over the
/// full original sample set with abundances untouched. Fatal when nothing is
/// retained, since the retained table would be useless downstream. The
/// per-sample breakdown is diagnostic output only and is also logged.
pub fn filter_features(
    table: &FeatureTable,
    tree: &Tree,
) -> Result<(FeatureTable, FeatureTable, FeatureFilterStats), InsertionError> {
    let tips = tree.tip_name_set();

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for (f, feature_id) in table.feature_ids.iter().enumerate() {
        if tips.contains(feature_id) {
            kept.push(f);
        } else {
            dropped.push(f);
        }
    }

    if kept.is_empty() {
        return Err(InsertionError::EmptyResult(format!(
            "none of the {} table features exist as tree tips; \
             was the table paired with the right insertion tree?",
            table.feature_count()
        )));
    }

    let mut retained_reads = vec![0.0; table.sample_ids.len()];
    let mut rejected_reads = vec![0.0; table.sample_ids.len()];
    for &f in &kept {
        for &(s, v) in &table.rows[f] {
            retained_reads[s] += v;
        }
    }
    for &f in &dropped {
        for &(s, v) in &table.rows[f] {
            rejected_reads[s] += v;
        }
    }

    let stats = FeatureFilterStats {
        samples: table
            .sample_ids
            .iter()
            .enumerate()
            .map(|(s, sample_id)| SampleFilterStats {
                sample_id: sample_id.clone(),
                retained_reads: retained_reads[s],
                rejected_reads: rejected_reads[s],
            })
            .collect(),
        retained_features: kept.len(),
        rejected_features: dropped.len(),
    };

    log::info!(
        "feature filter: kept {} / {} features, overall rejected ratio {:.4}",
        stats.retained_features,
        table.feature_count(),
        stats.rejected_ratio()
    );
    for sample in &stats.samples {
        log::info!(
            "  sample {}: retained {} reads, rejected {} reads ({:.4})",
            sample.sample_id,
            sample.retained_reads,
            sample.rejected_reads,
            sample.rejected_ratio()
        );
    }

    Ok((table.subset(&kept), table.subset(&dropped), stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "# Constructed from biom file\n\
                       #OTU ID\ts1\ts2\n\
                       X\t1\t0\n\
                       Y\t2\t3\n\
                       Z\t0\t5\n";

    #[test]
    fn parses_sparse_tsv() {
        let table = FeatureTable::parse_tsv(TSV).unwrap();
        assert_eq!(table.sample_ids(), ["s1", "s2"]);
        assert_eq!(table.feature_ids(), ["X", "Y", "Z"]);
        assert_eq!(table.value("X", "s2"), 0.0);
        assert_eq!(table.value("Z", "s2"), 5.0);
        assert_eq!(table.total_sum(), 11.0);
    }

    #[test]
    fn rejects_ragged_rows_and_bad_numbers() {
        assert!(FeatureTable::parse_tsv("#OTU ID\ts1\nX\t1\t2\n").is_err());
        assert!(FeatureTable::parse_tsv("#OTU ID\ts1\nX\tabc\n").is_err());
    }

    #[test]
    fn partition_is_exact_and_sum_preserving() {
        let table = FeatureTable::parse_tsv(TSV).unwrap();
        let tree = Tree::parse_newick("((X,Y),W);").unwrap();
        let (retained, rejected, stats) = filter_features(&table, &tree).unwrap();

        assert_eq!(retained.feature_ids(), ["X", "Y"]);
        assert_eq!(rejected.feature_ids(), ["Z"]);
        // same sample set on both sides, original values intact
        assert_eq!(retained.sample_ids(), table.sample_ids());
        assert_eq!(rejected.sample_ids(), table.sample_ids());
        assert_eq!(retained.value("Y", "s2"), 3.0);
        assert_eq!(rejected.value("Z", "s2"), 5.0);

        assert_eq!(
            retained.total_sum() + rejected.total_sum(),
            table.total_sum()
        );
        assert_eq!(stats.retained_features, 2);
        assert_eq!(stats.rejected_features, 1);
        assert_eq!(stats.total_rejected(), 5.0);
    }

    #[test]
    fn nothing_retained_is_fatal() {
        let table = FeatureTable::parse_tsv(TSV).unwrap();
        let tree = Tree::parse_newick("(P,Q);").unwrap();
        assert!(matches!(
            filter_features(&table, &tree),
            Err(InsertionError::EmptyResult(_))
        ));
    }

    #[test]
    fn per_sample_stats_add_up() {
        let table = FeatureTable::parse_tsv(TSV).unwrap();
        let tree = Tree::parse_newick("((X,Y),W);").unwrap();
        let (_, _, stats) = filter_features(&table, &tree).unwrap();

        let s2 = stats.samples.iter().find(|s| s.sample_id == "s2").unwrap();
        assert_eq!(s2.retained_reads, 3.0);
        assert_eq!(s2.rejected_reads, 5.0);
        assert!((s2.rejected_ratio() - 5.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn tsv_round_trip_keeps_values() {
        let table = FeatureTable::parse_tsv(TSV).unwrap();
        let again = FeatureTable::parse_tsv(&table.to_tsv()).unwrap();
        assert_eq!(again.value("Y", "s1"), 2.0);
        assert_eq!(again.total_sum(), table.total_sum());
    }
}
