//src/placements.rs

use std::path::Path;

use serde_json::Value;

use crate::errors::InsertionError;
use crate::tree::read_maybe_gz;

/// The exact top-level key set a placement record must carry. The `tree` and
/// `placements` subtrees can be huge and are never deep-validated here.
pub const PLACEMENT_KEYS: [&str; 5] = ["fields", "metadata", "placements", "tree", "version"];

/// Signatures the external tool's info file must contain: version banner,
/// base-frequency section and final likelihood section. Absence of any one
/// means the file is not a usable RAxML info file.
pub const RAXML_INFO_SIGNATURES: [&str; 3] = [
    "This is RAxML version",
    "Base frequencies:",
    "Final GAMMA-based Score of best tree",
];

/// Shallow validation of a placement record already parsed into JSON: the
/// top-level key set must match [`PLACEMENT_KEYS`] exactly. Messages list
/// expected and found keys sorted, so they are deterministic.
pub fn validate_placements_json(doc: &Value) -> Result<(), InsertionError> {
    let obj = doc.as_object().ok_or_else(|| {
        InsertionError::Format("placement record is not a JSON object".to_string())
    })?;

    let mut found: Vec<&str> = obj.keys().map(String::as_str).collect();
    found.sort_unstable();

    if found != PLACEMENT_KEYS {
        return Err(InsertionError::Format(format!(
            "placement record has wrong top-level keys: expected [{}], found [{}]",
            PLACEMENT_KEYS.join(", "),
            found.join(", ")
        )));
    }
    Ok(())
}

/// Parse and validate a placement JSON file.
pub fn read_placements_file<P: AsRef<Path>>(path: P) -> Result<Value, InsertionError> {
    let text = read_maybe_gz(path.as_ref())?;
    let doc: Value = serde_json::from_str(&text)
        .map_err(|e| InsertionError::Format(format!("placement record is not valid JSON: {}", e)))?;
    validate_placements_json(&doc)?;
    log::info!(
        "placement record validated ({} placements)",
        doc["placements"].as_array().map(Vec::len).unwrap_or(0)
    );
    Ok(doc)
}

/// Check an info/log file of the external tool for the required structured
/// substrings. The first missing signature is named in the error.
pub fn validate_info_text(text: &str) -> Result<(), InsertionError> {
    for signature in RAXML_INFO_SIGNATURES {
        if !text.contains(signature) {
            return Err(InsertionError::Format(format!(
                "reference info file is missing required signature '{}'",
                signature
            )));
        }
    }
    Ok(())
}

/// File-backed variant of [`validate_info_text`].
pub fn validate_info_file<P: AsRef<Path>>(path: P) -> Result<(), InsertionError> {
    let text = read_maybe_gz(path.as_ref())?;
    validate_info_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_exact_key_set() {
        let doc = json!({
            "tree": "((A,B));",
            "placements": [],
            "metadata": {"invocation": "run-sepp.sh"},
            "version": 3,
            "fields": ["edge_num", "likelihood"],
        });
        assert!(validate_placements_json(&doc).is_ok());
    }

    #[test]
    fn names_expected_vs_found_keys_sorted() {
        let doc = json!({"tree": "x", "placements": [], "foo": 1});
        let msg = validate_placements_json(&doc).unwrap_err().to_string();
        assert!(msg.contains("expected [fields, metadata, placements, tree, version]"));
        assert!(msg.contains("found [foo, placements, tree]"));
    }

    #[test]
    fn rejects_extra_keys_even_with_all_required_present() {
        let doc = json!({
            "tree": "x", "placements": [], "metadata": {}, "version": 3,
            "fields": [], "extra": true,
        });
        assert!(validate_placements_json(&doc).is_err());
    }

    #[test]
    fn rejects_non_object_documents() {
        assert!(validate_placements_json(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn info_file_needs_every_signature() {
        let ok = "This is RAxML version 8.2.11\n\
                  Base frequencies: 0.24 0.26 0.25 0.25\n\
                  Final GAMMA-based Score of best tree -124.3\n";
        assert!(validate_info_text(ok).is_ok());

        let missing_likelihood = "This is RAxML version 8.2.11\nBase frequencies: 0.2\n";
        let msg = validate_info_text(missing_likelihood).unwrap_err().to_string();
        assert!(msg.contains("Final GAMMA-based Score of best tree"));
    }
}
