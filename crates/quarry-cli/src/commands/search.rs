//! Search command - run a query against the store.

use crate::app::App;
use quarry_core::{Config, SearchHit};
use std::path::PathBuf;
use std::time::Instant;

/// Run the search command.
pub fn run(config: Config, db: Option<PathBuf>, query: &str, json: bool) -> anyhow::Result<()> {
    let app = App::new(config, db)?;

    if app.store.document_count() == 0 {
        eprintln!("Store is empty. Run 'quarry index <path>' first.");
        return Ok(());
    }

    search_in(&app, query, json)?;
    // keep the telemetry of this query
    app.save()
}

/// Run `query` on an opened store and print the hits.
pub fn search_in(app: &App, query: &str, json: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let hits = app.searcher().search(query)?;
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    for hit in &hits {
        print_hit(hit);
    }
    eprintln!();
    eprintln!(
        "Found {} results in {:.3}ms",
        hits.len(),
        elapsed.as_secs_f64() * 1000.0
    );
    Ok(())
}

fn print_hit(hit: &SearchHit) {
    println!("{:>10.4}  [{}] {}", hit.score, hit.id, hit.path.display());
    for highlight in &hit.highlights {
        let text = highlight.text.replace(['\n', '\r'], " ");
        if highlight.term.is_empty() {
            println!("            {}", text);
        } else {
            println!("            @{:<8} {}", highlight.offset, text);
        }
    }
}
