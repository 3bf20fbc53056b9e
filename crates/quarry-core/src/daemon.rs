//! Keeping the store in sync with watched filesystem paths.
//!
//! The daemon remembers which document each file under a watched path was
//! indexed into. A sync compares that against the filesystem: new files are
//! indexed, vanished files are deleted from the store, and files modified
//! since they were indexed are deleted and indexed again under a new id.
//!
//! Tracking state is held in memory only. A restarted process re-adds its
//! paths and rebuilds.

use crate::config::{extension_of, Config, DaemonConfig};
use crate::error::{QuarryError, Result};
use crate::indexer::{collect_files, Indexer};
use crate::store::Store;
use crate::types::{to_local_seconds, DocId};
use crossbeam_channel::{select, Sender};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Indexed file path to the document it produced.
pub type FileToDocId = BTreeMap<PathBuf, DocId>;

/// Sync state of one watched path.
#[derive(Debug, Default)]
struct WatchedPath {
    files: FileToDocId,
    /// Files left out by the file cap. They are not retried until they
    /// vanish from disk or the path is re-added.
    capped: BTreeSet<PathBuf>,
}

/// What one sync changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Files indexed for the first time
    pub added: usize,
    /// Files gone from disk whose documents were deleted
    pub removed: usize,
    /// Modified files deleted and indexed again
    pub updated: usize,
    /// Files left out because the path reached its file cap
    pub capped: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        *self == SyncReport::default()
    }
}

impl AddAssign for SyncReport {
    fn add_assign(&mut self, other: SyncReport) {
        self.added += other.added;
        self.removed += other.removed;
        self.updated += other.updated;
        self.capped += other.capped;
    }
}

pub struct FileSystemDaemon {
    indexer: Indexer,
    config: DaemonConfig,
    /// Watched path to the files indexed below it
    paths: Mutex<BTreeMap<PathBuf, WatchedPath>>,
    skipped_ticks: AtomicU64,
}

impl FileSystemDaemon {
    pub fn new(store: Arc<Store>, config: &Config) -> Self {
        FileSystemDaemon {
            indexer: Indexer::new(store, config.extensions.clone()),
            config: config.daemon.clone(),
            paths: Mutex::new(BTreeMap::new()),
            skipped_ticks: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        self.indexer.store()
    }

    /// Start watching `path` and sync it right away.
    ///
    /// The path does not need to exist yet. Adding a path twice resyncs it
    /// and gives files skipped by the cap another chance. A path whose
    /// first sync fails is not watched.
    pub fn add_path(&self, path: &Path) -> Result<SyncReport> {
        let mut paths = self.paths.lock();
        let is_new = !paths.contains_key(path);
        let watched = paths.entry(path.to_path_buf()).or_default();
        watched.capped.clear();
        match self.sync_path(path, watched) {
            Ok(report) => {
                info!(path = %path.display(), files = watched.files.len(), "Watching path");
                Ok(report)
            }
            Err(e) => {
                if is_new {
                    paths.remove(path);
                }
                Err(e)
            }
        }
    }

    /// Stop watching `path`. Documents already indexed from it stay in the
    /// store.
    pub fn remove_path(&self, path: &Path) -> bool {
        let removed = self.paths.lock().remove(path).is_some();
        if removed {
            info!(path = %path.display(), "Stopped watching path");
        }
        removed
    }

    /// Snapshot of every watched path and its tracked files.
    pub fn paths(&self) -> BTreeMap<PathBuf, FileToDocId> {
        self.paths
            .lock()
            .iter()
            .map(|(path, watched)| (path.clone(), watched.files.clone()))
            .collect()
    }

    /// Clear the whole store and index every watched path from scratch.
    #[instrument(skip(self))]
    pub fn rebuild_all_paths(&self) -> Result<SyncReport> {
        let mut paths = self.paths.lock();
        self.store().clear();
        for watched in paths.values_mut() {
            *watched = WatchedPath::default();
        }
        let report = self.sync_each(&mut paths);
        info!(paths = paths.len(), added = report.added, "Rebuilt all paths");
        Ok(report)
    }

    /// Sync every watched path, waiting for any sync already in progress.
    pub fn tick(&self) -> Result<SyncReport> {
        let mut paths = self.paths.lock();
        self.sync_all(&mut paths)
    }

    /// Sync every watched path unless a sync is already in progress.
    ///
    /// Returns `None` when the tick was skipped.
    pub fn try_tick(&self) -> Option<Result<SyncReport>> {
        let Some(mut paths) = self.paths.try_lock() else {
            let skipped = self.skipped_ticks.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(skipped, "Daemon busy, skipping tick");
            return None;
        };
        Some(self.sync_all(&mut paths))
    }

    /// Number of scheduled ticks skipped so far.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    /// Tracked files per extension, across all watched paths.
    pub fn type_statistics(&self) -> BTreeMap<String, usize> {
        let paths = self.paths.lock();
        let mut histogram = BTreeMap::new();
        for file in paths.values().flat_map(|watched| watched.files.keys()) {
            *histogram.entry(extension_of(file)).or_insert(0) += 1;
        }
        histogram
    }

    #[instrument(skip(self, paths))]
    fn sync_all(&self, paths: &mut BTreeMap<PathBuf, WatchedPath>) -> Result<SyncReport> {
        let report = self.sync_each(paths);
        if !report.is_empty() {
            info!(
                added = report.added,
                removed = report.removed,
                updated = report.updated,
                capped = report.capped,
                "Synced watched paths"
            );
        }
        Ok(report)
    }

    /// Sync every path, logging and skipping the ones that fail.
    fn sync_each(&self, paths: &mut BTreeMap<PathBuf, WatchedPath>) -> SyncReport {
        let mut report = SyncReport::default();
        for (path, watched) in paths.iter_mut() {
            match self.sync_path(path, watched) {
                Ok(synced) => report += synced,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to sync path"),
            }
        }
        report
    }

    /// Bring `watched` and the store up to date with the files under `root`.
    fn sync_path(&self, root: &Path, watched: &mut WatchedPath) -> Result<SyncReport> {
        let WatchedPath { files: tracked, capped } = watched;
        let store = self.store();
        let existing: BTreeSet<PathBuf> = if root.exists() {
            collect_files(root, self.indexer.extensions())?
                .into_iter()
                .collect()
        } else {
            debug!(path = %root.display(), "Watched path does not exist");
            BTreeSet::new()
        };

        capped.retain(|file| existing.contains(file));

        let mut report = SyncReport::default();
        let mut queue: Vec<PathBuf> = existing
            .iter()
            .filter(|file| !tracked.contains_key(*file) && !capped.contains(*file))
            .cloned()
            .collect();

        let mut stale = Vec::new();
        let mut reindex = BTreeSet::new();
        for (file, &id) in tracked.iter() {
            if !existing.contains(file) {
                store.delete_document(id);
                stale.push(file.clone());
                report.removed += 1;
                continue;
            }
            let modified = match store.find_document(id) {
                Some(doc) => match fs::metadata(file).and_then(|m| m.modified()) {
                    Ok(mtime) => to_local_seconds(mtime) > doc.modify_time(),
                    Err(e) => {
                        warn!(path = %file.display(), error = %e, "Failed to read modify time");
                        false
                    }
                },
                // deleted behind our back, e.g. by a store clear
                None => true,
            };
            if modified {
                store.delete_document(id);
                stale.push(file.clone());
                reindex.insert(file.clone());
            }
        }
        for file in &stale {
            tracked.remove(file);
        }
        queue.extend(reindex.iter().cloned());
        queue.sort();

        let cap = self.config.max_files_per_path;
        if cap > 0 {
            let room = cap.saturating_sub(tracked.len());
            if queue.len() > room {
                report.capped = queue.len() - room;
                warn!(
                    path = %root.display(),
                    cap,
                    skipped = report.capped,
                    "File cap reached, skipping files"
                );
                capped.extend(queue.drain(room..));
            }
        }

        for (file, id) in self.indexer.index_files(&queue) {
            if reindex.contains(&file) {
                report.updated += 1;
            } else {
                report.added += 1;
            }
            tracked.insert(file, id);
        }
        Ok(report)
    }
}

impl fmt::Debug for FileSystemDaemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemDaemon")
            .field("config", &self.config)
            .field("paths", &self.paths.lock().len())
            .field("skipped_ticks", &self.skipped_ticks())
            .finish()
    }
}

/// A background thread running daemon ticks on a fixed interval.
///
/// The first tick runs immediately. Dropping the handle stops the thread.
pub struct DaemonHandle {
    thread: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
}

impl DaemonHandle {
    pub fn spawn(daemon: Arc<FileSystemDaemon>, interval: Duration) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let ticker = crossbeam_channel::tick(interval);

        let thread = thread::Builder::new()
            .name("quarry-daemon".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "Daemon started");
                run_tick(&daemon);
                loop {
                    select! {
                        recv(ticker) -> _ => run_tick(&daemon),
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                info!("Daemon stopped");
            })
            .map_err(|e| QuarryError::internal(format!("failed to spawn daemon thread: {}", e)))?;

        Ok(DaemonHandle {
            thread: Some(thread),
            shutdown: Some(shutdown_tx),
        })
    }

    /// Signal the thread to stop and wait for the current tick to finish.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_tick(daemon: &FileSystemDaemon) {
    match daemon.try_tick() {
        Some(Err(e)) if e.is_recoverable() => warn!(error = %e, "Daemon tick failed, retrying next tick"),
        Some(Err(e)) => error!(error = %e, "Daemon tick failed"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn make_daemon(dir: &TempDir) -> FileSystemDaemon {
        let store = Arc::new(Store::open(dir.path().join("db"), true).unwrap());
        FileSystemDaemon::new(store, &Config::default())
    }

    fn make_corpus(dir: &TempDir, files: &[(&str, &str)]) -> PathBuf {
        let root = dir.path().join("corpus");
        for (name, text) in files {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        root
    }

    fn touch_future(path: &Path) {
        let later = SystemTime::now() + Duration::from_secs(120);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(later)
            .unwrap();
    }

    #[test]
    fn test_add_path_indexes_everything() {
        let dir = TempDir::new().unwrap();
        let root = make_corpus(
            &dir,
            &[("a.txt", "alpha"), ("sub/b.md", "beta"), ("c.png", "binary")],
        );
        let daemon = make_daemon(&dir);

        let report = daemon.add_path(&root).unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(daemon.store().document_count(), 2);

        let report = daemon.tick().unwrap();
        assert!(report.is_empty());
        assert_eq!(daemon.store().max_allocated_doc_id(), 2);

        let stats = daemon.type_statistics();
        assert_eq!(stats.get("txt"), Some(&1));
        assert_eq!(stats.get("md"), Some(&1));
    }

    #[test]
    fn test_differential_sync() {
        let dir = TempDir::new().unwrap();
        let root = make_corpus(&dir, &[("a.txt", "alpha"), ("b.txt", "beta")]);
        let daemon = make_daemon(&dir);
        daemon.add_path(&root).unwrap();
        let before = daemon.paths()[&root].clone();

        fs::write(root.join("c.txt"), "gamma").unwrap();
        let report = daemon.tick().unwrap();
        assert_eq!(report.added, 1);
        let after = daemon.paths()[&root].clone();
        assert_eq!(after[&root.join("a.txt")], before[&root.join("a.txt")]);
        assert_eq!(after[&root.join("c.txt")], DocId(3));

        fs::remove_file(root.join("b.txt")).unwrap();
        let report = daemon.tick().unwrap();
        assert_eq!(report.removed, 1);
        assert!(daemon.store().find_document(DocId(2)).is_none());

        fs::write(root.join("a.txt"), "alpha again").unwrap();
        touch_future(&root.join("a.txt"));
        let report = daemon.tick().unwrap();
        assert_eq!(report.updated, 1);
        assert!(daemon.store().find_document(DocId(1)).is_none());
        assert_eq!(daemon.paths()[&root][&root.join("a.txt")], DocId(4));
        assert_eq!(daemon.store().document_count(), 2);
    }

    #[test]
    fn test_file_root_and_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = make_corpus(&dir, &[("notes.unknownext", "plain words")]);
        let daemon = make_daemon(&dir);

        // a file root is taken even without an allowed extension
        let file = root.join("notes.unknownext");
        assert_eq!(daemon.add_path(&file).unwrap().added, 1);

        let missing = dir.path().join("later");
        assert!(daemon.add_path(&missing).unwrap().is_empty());
        fs::create_dir_all(&missing).unwrap();
        fs::write(missing.join("x.txt"), "late arrival").unwrap();
        assert_eq!(daemon.tick().unwrap().added, 1);
        assert_eq!(daemon.paths().len(), 2);
    }

    #[test]
    fn test_remove_path_keeps_documents() {
        let dir = TempDir::new().unwrap();
        let root = make_corpus(&dir, &[("a.txt", "alpha")]);
        let daemon = make_daemon(&dir);
        daemon.add_path(&root).unwrap();

        assert!(daemon.remove_path(&root));
        assert!(!daemon.remove_path(&root));
        fs::write(root.join("b.txt"), "beta").unwrap();
        assert!(daemon.tick().unwrap().is_empty());
        assert_eq!(daemon.store().document_count(), 1);
    }

    #[test]
    fn test_file_cap() {
        let dir = TempDir::new().unwrap();
        let root = make_corpus(&dir, &[("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c")]);
        let store = Arc::new(Store::open(dir.path().join("db"), true).unwrap());
        let mut config = Config::default();
        config.daemon.max_files_per_path = 2;
        let daemon = FileSystemDaemon::new(store, &config);

        let report = daemon.add_path(&root).unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.capped, 1);
        assert_eq!(daemon.store().document_count(), 2);
        assert!(!daemon.paths()[&root].contains_key(&root.join("c.txt")));

        // room frees up, but the capped file stays skipped
        fs::remove_file(root.join("a.txt")).unwrap();
        let report = daemon.tick().unwrap();
        assert_eq!((report.added, report.removed, report.capped), (0, 1, 0));
        assert!(!daemon.paths()[&root].contains_key(&root.join("c.txt")));
        assert!(daemon.tick().unwrap().is_empty());

        // re-adding the path retries it
        let report = daemon.add_path(&root).unwrap();
        assert_eq!(report.added, 1);
        assert!(daemon.paths()[&root].contains_key(&root.join("c.txt")));
    }

    #[test]
    fn test_capped_file_forgotten_once_gone() {
        let dir = TempDir::new().unwrap();
        let root = make_corpus(&dir, &[("a.txt", "a"), ("b.txt", "b")]);
        let store = Arc::new(Store::open(dir.path().join("db"), true).unwrap());
        let mut config = Config::default();
        config.daemon.max_files_per_path = 1;
        let daemon = FileSystemDaemon::new(store, &config);
        assert_eq!(daemon.add_path(&root).unwrap().capped, 1);

        fs::remove_file(root.join("a.txt")).unwrap();
        fs::remove_file(root.join("b.txt")).unwrap();
        assert_eq!(daemon.tick().unwrap().removed, 1);

        fs::write(root.join("b.txt"), "b again").unwrap();
        let report = daemon.tick().unwrap();
        assert_eq!(report.added, 1);
        assert!(daemon.paths()[&root].contains_key(&root.join("b.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_odd_path_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        let root = make_corpus(&dir, &[("a.txt", "alpha")]);
        let daemon = make_daemon(&dir);
        daemon.add_path(&root).unwrap();

        let report = daemon.add_path(Path::new("/dev/null")).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(daemon.paths().len(), 2);

        fs::write(root.join("b.txt"), "beta").unwrap();
        let report = daemon.tick().unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(daemon.store().document_count(), 2);
    }

    #[test]
    fn test_rebuild_all_paths() {
        let dir = TempDir::new().unwrap();
        let root = make_corpus(&dir, &[("a.txt", "alpha"), ("b.txt", "beta")]);
        let daemon = make_daemon(&dir);
        daemon.add_path(&root).unwrap();

        let report = daemon.rebuild_all_paths().unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(daemon.store().document_count(), 2);
        let ids: Vec<DocId> = daemon.paths()[&root].values().copied().collect();
        assert_eq!(ids, vec![DocId(3), DocId(4)]);
    }

    #[test]
    fn test_busy_tick_is_skipped() {
        let dir = TempDir::new().unwrap();
        let daemon = make_daemon(&dir);
        let guard = daemon.paths.lock();
        assert!(daemon.try_tick().is_none());
        assert_eq!(daemon.skipped_ticks(), 1);
        drop(guard);
        assert!(daemon.try_tick().is_some());
    }

    #[test]
    fn test_handle_runs_and_stops() {
        let dir = TempDir::new().unwrap();
        let root = make_corpus(&dir, &[("a.txt", "alpha")]);
        let daemon = Arc::new(make_daemon(&dir));
        daemon.add_path(&root).unwrap();

        let mut handle = DaemonHandle::spawn(Arc::clone(&daemon), Duration::from_millis(20)).unwrap();
        fs::write(root.join("b.txt"), "beta").unwrap();
        let mut waited = 0;
        while daemon.store().document_count() < 2 && waited < 100 {
            thread::sleep(Duration::from_millis(20));
            waited += 1;
        }
        handle.stop();
        assert_eq!(daemon.store().document_count(), 2);
    }
}
