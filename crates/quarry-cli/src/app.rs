//! Application state management.

use quarry_core::{Config, Indexer, Searcher, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// Directory holding the store
    pub data_dir: PathBuf,

    /// The opened store
    pub store: Arc<Store>,
}

impl App {
    /// Open the store at `db`, or the configured data directory, creating
    /// it if needed.
    pub fn new(config: Config, db: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = match db {
            Some(dir) => dir,
            None => config.data_dir()?,
        };
        let store = match Store::open_or_create(&data_dir) {
            Ok(store) => Arc::new(store),
            Err(e) if e.requires_rebuild() => anyhow::bail!(
                "{}: {}. Remove the directory and index again.",
                data_dir.display(),
                e
            ),
            Err(e) => return Err(e.into()),
        };

        info!(
            data_dir = %data_dir.display(),
            documents = store.document_count(),
            "Application initialized"
        );

        Ok(App {
            config,
            data_dir,
            store,
        })
    }

    pub fn indexer(&self) -> Indexer {
        Indexer::new(Arc::clone(&self.store), self.config.extensions.clone())
    }

    pub fn searcher(&self) -> Searcher {
        Searcher::new(Arc::clone(&self.store), &self.config)
    }

    /// Write the store to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        self.store.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_index_search_and_reopen() {
        let dir = TempDir::new().unwrap();
        let corpus = dir.path().join("corpus");
        std::fs::create_dir_all(&corpus).unwrap();
        std::fs::write(corpus.join("a.txt"), "granite quarry").unwrap();
        let db = dir.path().join("db");

        {
            let app = App::new(Config::default(), Some(db.clone())).unwrap();
            app.indexer().index(&corpus).unwrap();
            app.save().unwrap();
        }

        let app = App::new(Config::default(), Some(db)).unwrap();
        assert_eq!(app.store.document_count(), 1);
        assert_eq!(app.searcher().search("'granite'").unwrap().len(), 1);
    }
}
