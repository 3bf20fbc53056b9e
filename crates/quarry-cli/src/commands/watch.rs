//! Watch command - keep paths in sync with the store.

use crate::app::App;
use quarry_core::{Config, DaemonHandle, FileSystemDaemon};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Run the watch command.
pub fn run(
    config: Config,
    db: Option<PathBuf>,
    paths: Vec<PathBuf>,
    interval: Option<u64>,
) -> anyhow::Result<()> {
    let app = App::new(config, db)?;
    let interval = Duration::from_secs(interval.unwrap_or(app.config.daemon.interval_secs).max(1));

    let daemon = Arc::new(FileSystemDaemon::new(Arc::clone(&app.store), &app.config));
    for path in &paths {
        let report = daemon.add_path(path)?;
        if !path.exists() {
            warn!(path = %path.display(), "Path does not exist yet, watching anyway");
        }
        println!(
            "✓ Watching {} ({} added, {} capped)",
            path.display(),
            report.added,
            report.capped
        );
    }
    app.save()?;

    println!();
    println!("Syncing every {}s. Close stdin (Ctrl+D) or type 'q' to stop.", interval.as_secs());

    let mut handle = DaemonHandle::spawn(Arc::clone(&daemon), interval)?;
    for line in io::stdin().lock().lines() {
        let line = line?;
        match line.trim() {
            "q" | "quit" => break,
            "rebuild" => {
                let report = daemon.rebuild_all_paths()?;
                println!("Rebuilt: {} documents", report.added);
            }
            "" => {}
            other => println!("Unknown command '{}'. Use 'rebuild' or 'q'.", other),
        }
    }
    handle.stop();

    info!(
        skipped_ticks = daemon.skipped_ticks(),
        documents = app.store.document_count(),
        "Watch finished"
    );
    app.save()?;

    println!("Monitoring stopped.");
    for (ext, count) in daemon.type_statistics() {
        let ext = if ext.is_empty() { "(none)" } else { ext.as_str() };
        println!("  {:<10} {}", ext, count);
    }
    Ok(())
}
