//! Status command - show store status and statistics.

use crate::app::App;
use quarry_core::Config;
use std::path::PathBuf;

const RECENT_QUERIES: usize = 5;
const TOP_DOCUMENTS: usize = 5;

/// Run the status command.
pub fn run(config: Config, db: Option<PathBuf>) -> anyhow::Result<()> {
    let app = App::new(config, db)?;
    let store = &app.store;

    println!("Quarry Store Status");
    println!("===================");
    println!();

    if store.document_count() == 0 {
        println!("Store is empty. Run 'quarry index <path>' to add documents.");
        println!();
        println!("Data directory: {}", app.data_dir.display());
        return Ok(());
    }

    println!("Summary:");
    println!("  Documents:         {}", store.document_count());
    println!("  Terms:             {}", store.term_count());
    println!("  Highest doc id:    {}", store.max_allocated_doc_id());
    println!("  Avg word count:    {:.1}", store.avg_word_count());

    println!();
    println!("Document Types:");
    let mut histogram: Vec<_> = store.type_histogram().into_iter().collect();
    histogram.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.to_string().cmp(&b.0.to_string())));
    for (doc_type, count) in histogram {
        println!("  {:<10} {}", doc_type, count);
    }

    let telemetry = store.telemetry();
    let queries = telemetry.query_statistics();
    if !queries.is_empty() {
        println!();
        println!("Recent Queries:");
        for record in queries.iter().rev().take(RECENT_QUERIES) {
            println!(
                "  {}  {:>6} hits  {:>8}us  {}",
                record.at.format("%Y-%m-%d %H:%M:%S"),
                record.result_count,
                record.elapsed_micros,
                record.query
            );
        }
    }

    let frequencies = telemetry.document_frequencies();
    if !frequencies.is_empty() {
        println!();
        println!("Most Accessed Documents:");
        for (id, freq) in frequencies.into_iter().take(TOP_DOCUMENTS) {
            let path = store
                .find_document(id)
                .map(|doc| doc.path().display().to_string())
                .unwrap_or_else(|| "<deleted>".to_string());
            println!(
                "  [{}] {} ({} downloads, {} queries)",
                id, path, freq.download, freq.query
            );
        }
    }

    // Show data directory
    println!();
    println!("Data directory: {}", app.data_dir.display());

    Ok(())
}
