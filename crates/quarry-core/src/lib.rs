//! # Quarry Core Library
//!
//! Indexing, querying and ranking for the Quarry full-text search engine.
//!
//! ## Architecture
//!
//! - **Store** (`store`): Inverted index and document map, persisted to a
//!   single metadata file with the `codec` module
//! - **Extraction** (`extract`): Turns files into words with byte offsets,
//!   plus flattened metadata for JSON
//! - **Indexer** (`indexer`): Registers extracted files in the store
//! - **Query language** (`query`): Lexer, parser and AST
//! - **Execution** (`exec`): The terms, HAVING, BM25 and limit stages
//! - **Searcher** (`searcher`): Runs queries and builds snippets
//! - **Daemon** (`daemon`): Keeps watched paths in sync with the store
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use quarry_core::{Config, Indexer, Searcher, Store};
//! use std::sync::Arc;
//!
//! let config = Config::load()?;
//! let store = Arc::new(Store::open_or_create(config.data_dir()?)?);
//! Indexer::new(Arc::clone(&store), config.extensions.clone()).index("articles".as_ref())?;
//!
//! let searcher = Searcher::new(store, &config);
//! for hit in searcher.search("'fall' AND NOT 'memory' LIMIT 10")? {
//!     println!("{:.3} {}", hit.score, hit.path.display());
//! }
//! ```

pub mod bitset;
pub mod codec;
pub mod config;
pub mod daemon;
pub mod document;
pub mod error;
pub mod exec;
pub mod extract;
pub mod indexer;
pub mod query;
pub mod searcher;
pub mod store;
pub mod telemetry;
pub mod term;
pub mod trie;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use config::Config;
pub use daemon::{DaemonHandle, FileSystemDaemon, SyncReport};
pub use document::{Document, DocumentInfo, KvMap};
pub use error::{QuarryError, Result};
pub use indexer::Indexer;
pub use query::{parse, ParseOutcome, Query};
pub use searcher::{Highlight, SearchHit, Searcher};
pub use store::Store;
pub use telemetry::{DocumentFreq, QueryRecord, Telemetry};
pub use term::Term;
pub use types::{DocId, DocumentType};
pub use value::{Key, Value};
