//! Index command - add a file or directory to the store.

use crate::app::App;
use quarry_core::Config;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Run the index command.
pub fn run(config: Config, db: Option<PathBuf>, path: &Path) -> anyhow::Result<()> {
    let app = App::new(config, db)?;
    index_into(&app, path)
}

/// Index `path` into an opened store and flush it.
pub fn index_into(app: &App, path: &Path) -> anyhow::Result<()> {
    let start = Instant::now();
    let ids = app.indexer().index(path)?;
    app.save()?;
    let elapsed = start.elapsed();

    println!("Indexed {} documents from {}", ids.len(), path.display());
    println!("  Documents:   {}", app.store.document_count());
    println!("  Terms:       {}", app.store.term_count());
    println!("  Time:        {:.2}s", elapsed.as_secs_f64());

    Ok(())
}
