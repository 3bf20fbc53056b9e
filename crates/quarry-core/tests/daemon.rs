//! Differential sync driven through the daemon and observed through search.

use quarry_core::{Config, DaemonHandle, DocId, FileSystemDaemon, Searcher, Store};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn setup(dir: &TempDir) -> (Arc<FileSystemDaemon>, Searcher) {
    let config = Config::default();
    let store = Arc::new(Store::open(dir.path().join("db"), true).unwrap());
    let daemon = Arc::new(FileSystemDaemon::new(Arc::clone(&store), &config));
    (daemon, Searcher::new(store, &config))
}

fn rewrite(path: &Path, text: &str) {
    fs::write(path, text).unwrap();
    // mtimes only count in whole seconds
    let later = SystemTime::now() + Duration::from_secs(60);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(later)
        .unwrap();
}

#[test]
fn test_sync_follows_the_filesystem() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("articles");
    fs::create_dir_all(root.join("nested")).unwrap();
    for i in 0..10 {
        fs::write(root.join(format!("{}.txt", i)), format!("article number{}", i)).unwrap();
    }
    fs::write(root.join("nested/deep.md"), "deep alpha").unwrap();
    let (daemon, searcher) = setup(&dir);

    daemon.add_path(&root).unwrap();
    let store = searcher.store();
    assert_eq!(store.document_count(), 11);
    assert_eq!(store.max_allocated_doc_id(), 11);
    assert_eq!(searcher.search("'article'").unwrap().len(), 10);

    // new file
    fs::write(root.join("hello.txt"), "hello world").unwrap();
    let report = daemon.tick().unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(store.max_allocated_doc_id(), 12);
    assert_eq!(searcher.search("'hello'").unwrap().len(), 1);

    // modified file gets a new id
    rewrite(&root.join("hello.txt"), "goodbye world");
    let report = daemon.tick().unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(store.max_allocated_doc_id(), 13);
    assert!(store.find_document(DocId(12)).is_none());
    assert!(searcher.search("'hello'").unwrap().is_empty());
    assert_eq!(searcher.search("'goodbye'").unwrap()[0].id, DocId(13));

    // deleted file
    fs::remove_file(root.join("hello.txt")).unwrap();
    let report = daemon.tick().unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(store.max_allocated_doc_id(), 13);
    assert!(searcher.search("'world'").unwrap().is_empty());

    // no longer watched
    assert!(daemon.remove_path(&root));
    fs::write(root.join("late.txt"), "late arrival").unwrap();
    assert!(daemon.tick().unwrap().is_empty());
    assert_eq!(store.max_allocated_doc_id(), 13);
    assert!(daemon.paths().is_empty());
}

#[test]
fn test_rebuild_reindexes_everything() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("articles");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.txt"), "alpha").unwrap();
    fs::write(root.join("b.txt"), "beta").unwrap();
    let (daemon, searcher) = setup(&dir);

    daemon.add_path(&root).unwrap();
    searcher.search("'alpha'").unwrap();
    daemon.rebuild_all_paths().unwrap();

    let store = searcher.store();
    assert_eq!(store.document_count(), 2);
    assert!(store.find_document(DocId(1)).is_none());
    assert_eq!(searcher.search("'alpha'").unwrap()[0].id, DocId(3));
    // clearing the store also resets telemetry
    assert_eq!(store.telemetry().query_statistics().len(), 1);
}

#[test]
fn test_background_ticks() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("articles");
    fs::create_dir_all(&root).unwrap();
    let (daemon, searcher) = setup(&dir);
    daemon.add_path(&root).unwrap();

    let handle = DaemonHandle::spawn(Arc::clone(&daemon), Duration::from_millis(10)).unwrap();
    fs::write(root.join("a.txt"), "background alpha").unwrap();

    let mut found = false;
    for _ in 0..200 {
        if !searcher.search("'background'").unwrap().is_empty() {
            found = true;
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    drop(handle);
    assert!(found);
}
