//src/types.rs

/// One row of a fragment classification result.
///
/// `lineage` is `None` when the fragment never made it into the insertion
/// tree (routine, not an error) or when no labeled ancestor/clade was found.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyAssignment {
    pub fragment_id: String,
    pub lineage: Option<String>,
}

/// Per-sample breakdown of a feature-table reconciliation.
#[derive(Debug, Clone)]
pub struct SampleFilterStats {
    pub sample_id: String,
    /// Sum of abundances over features kept (present as tree tips).
    pub retained_reads: f64,
    /// Sum of abundances over features dropped (absent from the tree).
    pub rejected_reads: f64,
}

impl SampleFilterStats {
    /// Fraction of this sample's reads that were rejected.
    pub fn rejected_ratio(&self) -> f64 {
        let total = self.retained_reads + self.rejected_reads;
        if total == 0.0 {
            0.0
        } else {
            self.rejected_reads / total
        }
    }
}

/// Diagnostic summary returned next to the retained/rejected tables.
/// QC reporting only; nothing downstream should branch on it.
#[derive(Debug, Clone, Default)]
pub struct FeatureFilterStats {
    pub samples: Vec<SampleFilterStats>,
    pub retained_features: usize,
    pub rejected_features: usize,
}

impl FeatureFilterStats {
    pub fn total_retained(&self) -> f64 {
        self.samples.iter().map(|s| s.retained_reads).sum()
    }

    pub fn total_rejected(&self) -> f64 {
        self.samples.iter().map(|s| s.rejected_reads).sum()
    }

    /// Overall rejected-to-total read ratio.
    pub fn rejected_ratio(&self) -> f64 {
        let total = self.total_retained() + self.total_rejected();
        if total == 0.0 {
            0.0
        } else {
            self.total_rejected() / total
        }
    }
}
