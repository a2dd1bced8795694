use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::fs;

use fragment_insertion_rs::{
    assignments_to_tsv, classify_otus_experimental, classify_paths, parse_taxonomy_table,
    read_fragment_ids, Tree,
};

fn usage() -> ! {
    eprintln!(
        "usage: fragment-insertion-rs <fragments.fasta> <insertion-tree.nwk> <output.tsv> \
         [--method path|otus] [--taxonomy <table.tsv>]"
    );
    std::process::exit(2);
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 {
        usage();
    }
    let fragments_fp = &args[0];
    let tree_fp = &args[1];
    let output_fp = &args[2];

    let mut method = "path".to_string();
    let mut taxonomy_fp: Option<String> = None;
    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--method" => {
                method = args.get(i + 1).cloned().unwrap_or_else(|| usage());
                i += 2;
            }
            "--taxonomy" => {
                taxonomy_fp = Some(args.get(i + 1).cloned().unwrap_or_else(|| usage()));
                i += 2;
            }
            _ => usage(),
        }
    }

    // 1. Spinner for loading inputs
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template("{spinner:.blue} {msg}")
            .expect("Invalid spinner template"),
    );
    spinner.set_message(format!("Loading insertion tree from '{}'...", tree_fp));

    let mut tree = Tree::from_file(tree_fp).expect("Cannot parse insertion tree");
    let filled = tree.fill_missing_lengths();

    let fragment_ids = read_fragment_ids(fragments_fp).expect("Cannot read fragment FASTA");

    spinner.finish_with_message(format!(
        "Loaded tree with {} tips ({} branch lengths repaired), {} fragment(s).",
        tree.tip_count(),
        filled,
        fragment_ids.len()
    ));

    // 2. Spinner for classification
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template("{spinner:.green} {msg}")
            .expect("Invalid spinner template"),
    );
    spinner.set_message(format!("Classifying fragments ({}-based)...", method));

    let rows = match method.as_str() {
        "path" => classify_paths(&fragment_ids, &tree).expect("Classification failed"),
        "otus" => {
            let taxonomy_fp = taxonomy_fp
                .expect("--taxonomy <table.tsv> is required for the otus method");
            let taxonomy =
                parse_taxonomy_table(&taxonomy_fp).expect("Cannot read taxonomy table");
            classify_otus_experimental(&fragment_ids, &tree, &taxonomy)
                .expect("Classification failed")
        }
        _ => usage(),
    };

    spinner.finish_with_message(format!("Classified {} fragment(s).", rows.len()));

    // 3. Spinner for writing the result table
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template("{spinner:.yellow} {msg}")
            .expect("Invalid spinner template"),
    );
    spinner.set_message(format!("Writing '{}'...", output_fp));

    fs::write(output_fp, assignments_to_tsv(&rows)).expect("Could not write output table");

    spinner.finish_with_message(format!("Wrote results to '{}'.", output_fp));
}
