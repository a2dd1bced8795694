//src/sepp.rs

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use crate::errors::InsertionError;
use crate::placements::{read_placements_file, validate_info_file};
use crate::reference::{read_alignment_ids, validate_reference};
use crate::tree::Tree;

/// Run name passed to the wrapper; it prefixes every output file.
const RUN_NAME: &str = "q2-fragment-insertion";

/// A user-supplied reference bundle: aligned sequences, the matching rooted
/// phylogeny and the tool info/log file of the run that built the phylogeny.
#[derive(Debug, Clone)]
pub struct ReferenceBundle {
    pub alignment: PathBuf,
    pub phylogeny: PathBuf,
    pub info: PathBuf,
}

impl ReferenceBundle {
    /// Gate a bundle before it is handed to the external tool: the info file
    /// must carry its structured signatures and the alignment/phylogeny must
    /// describe exactly the same sequences.
    pub fn validate(&self) -> Result<(), InsertionError> {
        validate_info_file(&self.info)?;
        let ids = read_alignment_ids(&self.alignment)?;
        let tree = Tree::from_file(&self.phylogeny)?;
        validate_reference(&ids, &tree)
    }
}

/// What the external tool left behind, read back from the filesystem after
/// the subprocess exited successfully.
#[derive(Debug)]
pub struct SeppOutputs {
    /// The insertion tree, reparsed and branch-length repaired.
    pub tree: Tree,
    /// The validated placement record. Opaque beyond its key set.
    pub placements: Value,
}

/// Configuration for one wrapper invocation.
#[derive(Debug, Clone)]
pub struct SeppConfig {
    /// Thread count handed to the tool with `-x`. The core itself stays
    /// single-threaded; this is the only place parallelism exists.
    pub threads: u32,
    /// Alternative reference bundle (`-a`/`-t`/`-r`); the tool falls back to
    /// its bundled default reference when absent.
    pub reference: Option<ReferenceBundle>,
    /// Explicit path to `run-sepp.sh`; otherwise it is searched on PATH.
    pub sepp_script: Option<PathBuf>,
}

impl Default for SeppConfig {
    fn default() -> Self {
        SeppConfig {
            threads: 1,
            reference: None,
            sepp_script: None,
        }
    }
}

/// Check the machinery is present before doing any work: the wrapper script
/// itself and a `java` binary somewhere on PATH (the tool is a Java pipeline
/// under the hood).
fn sanity(script: &Path) -> Result<(), InsertionError> {
    if !script.exists() {
        return Err(InsertionError::Format(format!(
            "cannot find run-sepp.sh, expected it at: {}",
            script.display()
        )));
    }
    if which("java").is_none() {
        return Err(InsertionError::Format(
            "java does not appear in $PATH".to_string(),
        ));
    }
    Ok(())
}

fn which(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

fn resolve_script(config: &SeppConfig) -> Result<PathBuf, InsertionError> {
    if let Some(script) = &config.sepp_script {
        return Ok(script.clone());
    }
    which("run-sepp.sh").ok_or_else(|| {
        InsertionError::Format("cannot find run-sepp.sh on $PATH".to_string())
    })
}

/// Invoke the external placement tool on a fragment FASTA, blocking until it
/// exits, then harvest tree and placement record from the scratch directory.
///
/// The subprocess runs to completion or fails; its exit status is the sole
/// failure signal and nothing is retried. No output streams.
pub fn run_sepp(fragments_fasta: &Path, config: &SeppConfig) -> Result<SeppOutputs, InsertionError> {
    let script = resolve_script(config)?;
    sanity(&script)?;
    if let Some(bundle) = &config.reference {
        bundle.validate()?;
    }

    let scratch = tempfile::tempdir()?;
    let fragments = fragments_fasta.canonicalize()?;

    let mut cmd = Command::new(&script);
    cmd.arg(&fragments)
        .arg(RUN_NAME)
        .arg("-x")
        .arg(config.threads.to_string())
        .current_dir(scratch.path());
    if let Some(bundle) = &config.reference {
        cmd.arg("-a").arg(&bundle.alignment);
        cmd.arg("-t").arg(&bundle.phylogeny);
        cmd.arg("-r").arg(&bundle.info);
    }

    log::info!(
        "running {} on {} with {} thread(s)",
        script.display(),
        fragments.display(),
        config.threads
    );
    let status = cmd.status()?;
    if !status.success() {
        return Err(InsertionError::Subprocess(format!(
            "{} exited with {}",
            script.display(),
            status
        )));
    }

    let tree_file = scratch
        .path()
        .join(format!("{}_placement.tog.relabelled.tre", RUN_NAME));
    let placements_file = scratch.path().join(format!("{}_placement.json", RUN_NAME));

    let mut tree = Tree::from_file(&tree_file)?;
    tree.fill_missing_lengths();
    let placements = read_placements_file(&placements_file)?;

    Ok(SeppOutputs { tree, placements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_script_fails_sanity() {
        let err = sanity(Path::new("/definitely/not/run-sepp.sh")).unwrap_err();
        assert!(err.to_string().contains("run-sepp.sh"));
    }

    #[test]
    fn bundle_validation_catches_out_of_sync_reference() {
        let dir = tempfile::tempdir().unwrap();

        let alignment = dir.path().join("aligned.fasta");
        std::fs::write(&alignment, ">A\nACGT\n>B\nACGT\n>EXTRA\nACGT\n").unwrap();

        let phylogeny = dir.path().join("tree.nwk");
        std::fs::write(&phylogeny, "(A:0.1,B:0.2);").unwrap();

        let info = dir.path().join("info.txt");
        let mut f = std::fs::File::create(&info).unwrap();
        writeln!(f, "This is RAxML version 8.2.11").unwrap();
        writeln!(f, "Base frequencies: 0.25 0.25 0.25 0.25").unwrap();
        writeln!(f, "Final GAMMA-based Score of best tree -12.0").unwrap();

        let bundle = ReferenceBundle {
            alignment,
            phylogeny,
            info,
        };
        match bundle.validate() {
            Err(InsertionError::Consistency { alignment_only, .. }) => {
                assert_eq!(alignment_only, vec!["EXTRA".to_string()]);
            }
            other => panic!("expected Consistency error, got {:?}", other),
        }
    }
}
