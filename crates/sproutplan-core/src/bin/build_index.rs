//! build-index CLI: embed the activity corpus and write the index files.
//!
//! Usage:
//!   cargo run -p sproutplan-core --bin build-index -- --corpus activities.csv [--out ./index] [--dimension 384]
//!
//! Reads the activity CSV, embeds every record's text representation, and
//! writes activity_vectors.json + activity_metadata.json to the output
//! directory for the recommendation engine to load at startup.

use sproutplan_core::{load_corpus, ActivityIndex, HashingEmbedder, DEFAULT_DIMENSION};
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let mut corpus_path: Option<PathBuf> = None;
    let mut out_dir = PathBuf::from("./index");
    let mut dimension = DEFAULT_DIMENSION;

    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "--corpus" => {
                corpus_path = args.next().map(PathBuf::from);
            }
            "--out" => {
                if let Some(o) = args.next() {
                    out_dir = PathBuf::from(o);
                }
            }
            "--dimension" => {
                if let Some(d) = args.next() {
                    dimension = d.parse().unwrap_or(DEFAULT_DIMENSION);
                }
            }
            _ => {}
        }
    }

    let Some(corpus_path) = corpus_path else {
        eprintln!("build-index - Activity corpus indexer");
        eprintln!("  --corpus FILE      Activity CSV to index (required)");
        eprintln!("  --out DIR          Output directory (default ./index)");
        eprintln!("  --dimension N      Embedding width (default {DEFAULT_DIMENSION})");
        return Ok(());
    };

    let records = load_corpus(&corpus_path)?;
    info!("Loaded {} activities from {}", records.len(), corpus_path.display());

    let embedder = HashingEmbedder::new(dimension);
    let index = ActivityIndex::build(records, &embedder);

    std::fs::create_dir_all(&out_dir)?;
    index.save(&out_dir)?;
    info!(
        "Wrote index ({} vectors, dimension {dimension}) to {}",
        index.len(),
        out_dir.display()
    );
    Ok(())
}
