pub mod otus;
pub mod paths;

pub use otus::classify_otus_experimental;
pub use paths::classify_paths;

use crate::errors::InsertionError;
use crate::types::TaxonomyAssignment;

/// Whole-run guard shared by both strategies: a classification where not a
/// single fragment got a lineage means the fragment set and the tree almost
/// certainly come from different placement runs, and is fatal. Partial
/// success (some nulls) is fine.
fn ensure_any_lineage(rows: &[TaxonomyAssignment], method: &str) -> Result<(), InsertionError> {
    if rows.iter().any(|row| row.lineage.is_some()) {
        Ok(())
    } else {
        Err(InsertionError::EmptyResult(format!(
            "{} classification produced no lineage for any fragment; \
             do the fragments and the insertion tree belong to the same run?",
            method
        )))
    }
}
