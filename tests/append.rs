//! End-to-end append and list tests against real files.

use std::path::{Path, PathBuf};

use tar_stream::parsing::block_align;
use tar_stream::{
    append_sync, list_sync, update_sync, AppendOptions, EntryKind, ListOptions, MtimeCache,
    RawHeader, TarError, TypeFlag,
};

fn write_inputs(dir: &Path) {
    std::fs::write(dir.join("one.txt"), b"first file").unwrap();
    std::fs::write(dir.join("two.txt"), vec![b'2'; 1300]).unwrap();
    std::fs::create_dir_all(dir.join("tree/inner")).unwrap();
    std::fs::write(dir.join("tree/inner/leaf.txt"), b"leaf").unwrap();
}

fn options<'a>(dir: &Path, target: &Path, inputs: &[&str]) -> AppendOptions<'a> {
    AppendOptions {
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        cwd: Some(dir.to_path_buf()),
        ..AppendOptions::new(target)
    }
}

fn paths(target: &Path) -> Vec<String> {
    list_sync(ListOptions::new(target))
        .unwrap()
        .into_iter()
        .map(|e| e.path.trim_end_matches('/').to_string())
        .collect()
}

#[test]
fn test_append_twice_keeps_existing_entries() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let target = dir.path().join("out.tar");

    let first = append_sync(options(dir.path(), &target, &["one.txt"])).unwrap();
    assert_eq!(first, 0);
    let second = append_sync(options(dir.path(), &target, &["two.txt"])).unwrap();
    assert_eq!(second, 512 + block_align(10));

    assert_eq!(paths(&target), vec!["one.txt", "two.txt"]);
    let len = std::fs::metadata(&target).unwrap().len();
    assert_eq!(len, second + 512 + block_align(1300) + 1024);
}

#[test]
fn test_directory_inputs_are_walked() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let target = dir.path().join("tree.tar");

    append_sync(options(dir.path(), &target, &["tree"])).unwrap();

    let entries = list_sync(ListOptions::new(&target)).unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.path.trim_end_matches('/')).collect();
    assert_eq!(names, vec!["tree", "tree/inner", "tree/inner/leaf.txt"]);
    assert_eq!(entries[0].kind, EntryKind::Directory);
    assert_eq!(entries[2].size, 4);
}

#[test]
fn test_archive_inputs_are_copied_through() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let source = dir.path().join("source.tar");
    let target = dir.path().join("target.tar");

    append_sync(options(dir.path(), &source, &["one.txt", "two.txt"])).unwrap();
    append_sync(options(dir.path(), &target, &["tree/inner/leaf.txt", "@source.tar"])).unwrap();

    assert_eq!(paths(&target), vec!["tree/inner/leaf.txt", "one.txt", "two.txt"]);

    let source_entries = list_sync(ListOptions::new(&source)).unwrap();
    let target_entries = list_sync(ListOptions::new(&target)).unwrap();
    assert_eq!(source_entries[1].size, target_entries[2].size);
    assert_eq!(source_entries[1].mtime, target_entries[2].mtime);
}

#[test]
fn test_interrupted_write_is_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let target = dir.path().join("broken.tar");

    append_sync(options(dir.path(), &target, &["one.txt"])).unwrap();
    let good_end = 512 + block_align(10);

    // simulate a crash: a header promising 5000 bytes, only some of them written
    let mut data = std::fs::read(&target).unwrap();
    data.truncate(good_end as usize);
    let header = RawHeader {
        path: Some("partial.bin".to_string()),
        size: Some(5000),
        mtime: Some(0),
        typeflag: TypeFlag::File,
        ..Default::default()
    };
    data.extend_from_slice(&header.encode().block);
    data.extend_from_slice(&[9u8; 700]);
    std::fs::write(&target, &data).unwrap();

    let offset = append_sync(options(dir.path(), &target, &["two.txt"])).unwrap();
    assert_eq!(offset, good_end);
    assert_eq!(paths(&target), vec!["one.txt", "two.txt"]);
}

#[test]
fn test_mtime_cache_filled_during_scan() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let target = dir.path().join("cache.tar");
    append_sync(options(dir.path(), &target, &["one.txt", "two.txt"])).unwrap();

    let mut cache = MtimeCache::new();
    append_sync(AppendOptions {
        mtime_cache: Some(&mut cache),
        ..options(dir.path(), &target, &["tree/inner/leaf.txt"])
    })
    .unwrap();

    let mut keys: Vec<_> = cache.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["one.txt", "two.txt"]);
}

#[test]
fn test_update_adds_only_newer_files() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let target = dir.path().join("update.tar");
    append_sync(options(dir.path(), &target, &["one.txt"])).unwrap();

    // push one.txt's archived mtime into the past so the file on disk is newer
    let mut data = std::fs::read(&target).unwrap();
    let mut header = RawHeader::decode(data[..512].try_into().unwrap());
    header.mtime = Some(1);
    data[..512].copy_from_slice(&header.encode().block);
    std::fs::write(&target, &data).unwrap();

    update_sync(options(dir.path(), &target, &["one.txt", "two.txt"])).unwrap();
    assert_eq!(paths(&target), vec!["one.txt", "one.txt", "two.txt"]);

    // nothing changed since: a second update adds nothing
    let len = std::fs::metadata(&target).unwrap().len();
    update_sync(options(dir.path(), &target, &["one.txt", "two.txt"])).unwrap();
    assert_eq!(std::fs::metadata(&target).unwrap().len(), len);
}

#[test]
fn test_missing_input_fails_with_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("missing.tar");
    let err = append_sync(options(dir.path(), &target, &["does-not-exist"])).unwrap_err();
    assert!(matches!(err, TarError::Io(_)));
}

#[cfg(feature = "async")]
#[tokio::test]
async fn test_sync_and_async_append_match() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let sync_target: PathBuf = dir.path().join("sync.tar");
    let async_target: PathBuf = dir.path().join("async.tar");

    for (target, is_async) in [(&sync_target, false), (&async_target, true)] {
        let seed = options(dir.path(), target, &["one.txt"]);
        let more = options(dir.path(), target, &["two.txt", "tree"]);
        if is_async {
            tar_stream::append(seed).await.unwrap();
            tar_stream::append(more).await.unwrap();
        } else {
            append_sync(seed).unwrap();
            append_sync(more).unwrap();
        }
    }

    assert_eq!(paths(&sync_target), paths(&async_target));
    assert_eq!(
        std::fs::metadata(&sync_target).unwrap().len(),
        std::fs::metadata(&async_target).unwrap().len()
    );
    let listed = tar_stream::list(ListOptions::new(&async_target)).await.unwrap();
    assert_eq!(listed.len(), 5);
}
