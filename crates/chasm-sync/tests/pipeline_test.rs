//! Add/delete pipeline behavior against recording stores
//!
//! The recording store keeps every call it receives, and the labelled scheme
//! stamps each piece with its index, so share placement can be checked
//! without any real storage.

use async_trait::async_trait;
use chasm_core::{ChasmError, Share, ShareId};
use chasm_shares::ShareScheme;
use chasm_storage::CloudStore;
use chasm_sync::{ChasmState, Coordinator, PathFailure};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Upload { share_id: String, data: Vec<u8> },
    Delete(String),
}

#[derive(Clone)]
struct RecordingStore {
    index: usize,
    calls: Arc<Mutex<Vec<Call>>>,
    fail_uploads: bool,
}

impl RecordingStore {
    fn new(index: usize) -> Self {
        Self {
            index,
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_uploads: false,
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn uploads_of(&self, share_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Upload { share_id: s, .. } if s == share_id))
            .count()
    }
}

#[async_trait]
impl CloudStore for RecordingStore {
    async fn upload(&self, share: &Share) -> anyhow::Result<()> {
        if self.fail_uploads {
            anyhow::bail!("store {} is offline", self.index);
        }
        self.calls.lock().unwrap().push(Call::Upload {
            share_id: share.share_id.to_string(),
            data: share.data.clone(),
        });
        Ok(())
    }

    async fn delete(&self, share_id: &ShareId) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(share_id.to_string()));
        Ok(())
    }

    async fn restore_to_staging(&self) -> anyhow::Result<PathBuf> {
        anyhow::bail!("recording store cannot restore")
    }

    async fn clean(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn description(&self) -> String {
        format!("Recording store #{}", self.index)
    }

    fn short_description(&self) -> String {
        format!("recording:{}", self.index)
    }
}

/// Piece `i` is `[i, data...]`.
struct Labelled;

impl ShareScheme for Labelled {
    fn split(&self, data: &[u8], n: usize) -> anyhow::Result<Vec<Vec<u8>>> {
        Ok((0..n)
            .map(|i| {
                let mut piece = vec![i as u8];
                piece.extend_from_slice(data);
                piece
            })
            .collect())
    }

    fn combine(&self, shares: &[Vec<u8>]) -> anyhow::Result<Vec<u8>> {
        Ok(shares[0][1..].to_vec())
    }
}

fn coordinator(tmp: &TempDir, stores: &[RecordingStore]) -> Coordinator {
    let state = ChasmState::init_or_load(&tmp.path().join("root")).unwrap();
    let boxed: Vec<Box<dyn CloudStore>> = stores
        .iter()
        .cloned()
        .map(|s| Box::new(s) as Box<dyn CloudStore>)
        .collect();
    Coordinator::from_parts(state, boxed, Box::new(Labelled))
}

fn recording(n: usize) -> Vec<RecordingStore> {
    (0..n).map(RecordingStore::new).collect()
}

fn paths_of(entries: &[PathFailure]) -> Vec<PathBuf> {
    entries.iter().map(|e| e.path.clone()).collect()
}

fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn share_i_goes_to_store_i() {
    let tmp = TempDir::new().unwrap();
    let stores = recording(3);
    let mut c = coordinator(&tmp, &stores);

    let a = write(tmp.path(), "data/a.txt", b"alpha");
    let b = write(tmp.path(), "data/b.txt", b"beta");
    c.add(&a).await.unwrap();
    c.add(&b).await.unwrap();
    c.add(&a).await.unwrap();

    for store in &stores {
        let uploads: Vec<Call> = store.calls();
        assert!(!uploads.is_empty());
        for call in uploads {
            let Call::Upload { data, .. } = call else {
                panic!("unexpected call on store {}", store.index);
            };
            assert_eq!(data[0] as usize, store.index, "piece landed on wrong store");
        }
    }
}

#[tokio::test]
async fn setup_gate_refuses_with_fewer_than_two_stores() {
    for n in 0..2 {
        let tmp = TempDir::new().unwrap();
        let stores = recording(n);
        let mut c = coordinator(&tmp, &stores);
        let f = write(tmp.path(), "f.txt", b"x");

        for err in [
            c.add(&f).await.unwrap_err(),
            c.delete(&f).await.unwrap_err(),
            c.restore().await.unwrap_err(),
        ] {
            assert!(
                matches!(err, ChasmError::SetupIncomplete { registered } if registered == n),
                "got {err:?}"
            );
        }
        assert!(c.state().file(&f).is_none());
        assert!(stores.iter().all(|s| s.calls().is_empty()));
    }
}

#[tokio::test]
async fn readding_keeps_the_share_id() {
    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);
    let f = write(tmp.path(), "notes.md", b"v1");

    let first = c.add(&f).await.unwrap();
    std::fs::write(&f, b"v2, longer").unwrap();
    let second = c.add(&f).await.unwrap();

    assert_eq!(first.files[0].share_id, second.files[0].share_id);
    assert_ne!(first.files[0].fingerprint, second.files[0].fingerprint);
    let id = first.files[0].share_id.to_string();
    assert_eq!(stores[0].uploads_of(&id), 2);
    assert_eq!(stores[1].uploads_of(&id), 2);
}

#[tokio::test]
async fn directory_add_then_delete() {
    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);

    let d = tmp.path().join("D");
    let a = write(&d, "a.txt", b"aaa");
    let b = write(&d, "b.txt", b"bbb");

    let added = c.add(&d).await.unwrap();
    assert!(added.is_clean());
    assert_eq!(added.dirs, vec![d.clone()]);
    assert!(c.state().is_dir(&d));
    let id_a = c.state().file(&a).unwrap().share_id.clone();
    let id_b = c.state().file(&b).unwrap().share_id.clone();
    assert_ne!(id_a, id_b);

    let deleted = c.delete(&d).await.unwrap();
    assert!(deleted.is_clean());
    assert_eq!(deleted.deleted.len(), 2);
    assert!(!c.state().is_dir(&d));
    assert!(c.state().file(&a).is_none());
    assert!(c.state().file(&b).is_none());

    for store in &stores {
        let calls = store.calls();
        assert!(calls.contains(&Call::Delete(id_a.to_string())));
        assert!(calls.contains(&Call::Delete(id_b.to_string())));
    }
    // the local files are left alone
    assert!(a.exists() && b.exists());
}

#[tokio::test]
async fn directory_delete_covers_nested_subdirectories() {
    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);

    let d = tmp.path().join("tree");
    let top = write(&d, "top.txt", b"1");
    let deep = write(&d, "x/y/deep.txt", b"2");
    c.add(&d).await.unwrap();
    assert!(c.state().is_dir(&d.join("x/y")));

    let report = c.delete(&d).await.unwrap();
    assert_eq!(report.deleted.len(), 2);
    assert_eq!(report.dirs.len(), 3);
    assert!(c.state().file(&top).is_none());
    assert!(c.state().file(&deep).is_none());
    assert!(!c.state().is_dir(&d.join("x")));
    assert_eq!(c.state().tracked_files(), 0);
}

#[tokio::test]
async fn ignored_paths_are_never_tracked() {
    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);

    let junk = write(tmp.path(), "photos/.DS_Store", b"finder");
    let keep = write(tmp.path(), "photos/cat.jpg", b"meow");

    for _ in 0..3 {
        let report = c.add(&junk).await.unwrap();
        assert_eq!(paths_of(&report.ignored), vec![junk.clone()]);
        assert!(matches!(report.ignored[0].error, ChasmError::IgnoredPath(_)));
        assert!(report.files.is_empty());
    }
    let report = c.add(&tmp.path().join("photos")).await.unwrap();
    assert_eq!(paths_of(&report.ignored), vec![junk.clone()]);

    assert!(c.state().file(&junk).is_none());
    assert!(c.state().file(&keep).is_some());

    let report = c.delete(&junk).await.unwrap();
    assert_eq!(paths_of(&report.ignored), vec![junk]);
}

#[tokio::test]
async fn failing_store_does_not_stop_the_others() {
    let tmp = TempDir::new().unwrap();
    let mut stores = recording(3);
    stores[1].fail_uploads = true;
    let mut c = coordinator(&tmp, &stores);
    let f = write(tmp.path(), "ledger.csv", b"1,2,3");

    let report = c.add(&f).await.unwrap();
    assert_eq!(report.files.len(), 1);
    let failures = &report.files[0].store_failures;
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        ChasmError::BackendUpload { store, .. } if store == "recording:1"
    ));
    assert_eq!(report.metadata_failures.len(), 1);
    assert!(!report.is_clean());

    let id = report.files[0].share_id.to_string();
    assert_eq!(stores[0].uploads_of(&id), 1);
    assert_eq!(stores[2].uploads_of(&id), 1);
    assert!(c.state().file(&f).is_some());
}

#[tokio::test]
async fn state_is_distributed_after_each_operation() {
    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);
    let f = write(tmp.path(), "a.txt", b"a");

    c.add(&f).await.unwrap();
    assert_eq!(stores[0].uploads_of(".chasm"), 1);
    c.delete(&f).await.unwrap();
    assert_eq!(stores[0].uploads_of(".chasm"), 2);

    // untracked delete changes nothing and is not persisted
    let report = c.delete(&f).await.unwrap();
    assert_eq!(paths_of(&report.not_tracked), vec![f.clone()]);
    assert!(matches!(
        &report.not_tracked[0].error,
        ChasmError::NotTracked(p) if *p == f
    ));
    assert_eq!(stores[0].uploads_of(".chasm"), 2);
}

#[tokio::test]
async fn adding_the_state_file_does_not_persist_again() {
    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);
    let meta = c.state().metadata_path();

    let report = c.add(&meta).await.unwrap();
    assert_eq!(report.files[0].share_id, ShareId::metadata());
    assert_eq!(report.files[0].fingerprint, "");
    assert_eq!(stores[0].uploads_of(".chasm"), 1);
    assert_eq!(stores[1].uploads_of(".chasm"), 1);
}

#[tokio::test]
async fn ignore_rules_file_uses_its_reserved_id() {
    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);
    let rules = c.state().ignore_path();

    let report = c.add(&rules).await.unwrap();
    assert_eq!(report.files[0].share_id, ShareId::ignore_rules());
    assert!(!report.files[0].fingerprint.is_empty());
}

#[tokio::test]
async fn state_file_cannot_be_untracked() {
    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);
    let meta = c.state().metadata_path();

    let report = c.delete(&meta).await.unwrap();
    assert!(matches!(report.failures[0].error, ChasmError::Reserved(_)));
    assert!(c.state().file(&meta).is_some());
    assert!(stores[0].calls().is_empty());
}

#[tokio::test]
async fn unreadable_path_is_reported_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);

    let report = c.add(&tmp.path().join("missing.txt")).await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].error,
        ChasmError::NotAccessible { .. }
    ));
    assert_eq!(c.state().tracked_files(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinks_are_followed_under_their_own_name() {
    use std::os::unix::fs::symlink;

    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);

    let real = write(tmp.path(), "dotfiles/bashrc", b"export EDITOR=vi");
    let link = tmp.path().join("home/.bashrc");
    std::fs::create_dir_all(link.parent().unwrap()).unwrap();
    symlink(&real, &link).unwrap();

    let report = c.add(&link).await.unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].path, link);
    assert!(c.state().file(&link).is_some());
    assert!(c.state().file(&real).is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_directories_are_walked_once() {
    use std::os::unix::fs::symlink;

    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);

    let d = tmp.path().join("project");
    let a = write(&d, "a.txt", b"a");
    let outside = tmp.path().join("shared");
    write(&outside, "b.txt", b"b");
    symlink(&outside, d.join("shared")).unwrap();
    // points back at its own parent
    symlink(&d, d.join("loop")).unwrap();

    let report = c.add(&d).await.unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    let mut files: Vec<PathBuf> = report.files.iter().map(|f| f.path.clone()).collect();
    files.sort();
    assert_eq!(files, vec![a, d.join("shared/b.txt")]);
    assert!(c.state().is_dir(&d.join("shared")));
    assert!(!c.state().is_dir(&d.join("loop")));
}

#[cfg(unix)]
#[tokio::test]
async fn dangling_symlink_is_not_accessible() {
    use std::os::unix::fs::symlink;

    let tmp = TempDir::new().unwrap();
    let stores = recording(2);
    let mut c = coordinator(&tmp, &stores);
    let link = tmp.path().join("gone");
    symlink(tmp.path().join("nowhere"), &link).unwrap();

    let report = c.add(&link).await.unwrap();
    assert!(report.files.is_empty());
    assert!(matches!(
        report.failures[0].error,
        ChasmError::NotAccessible { .. }
    ));
    assert_eq!(stores[0].uploads_of(".chasm"), 0);
}
