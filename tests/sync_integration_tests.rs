//! Integration tests for the synchronization engine

use filetime::FileTime;
use std::ffi::CString;
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;
use zerocp::cli::CopyMethod;
use zerocp::{sync, SyncOptions};

fn write_file(path: &Path, content: &[u8]) {
    File::create(path).unwrap().write_all(content).unwrap();
}

fn sync_opts() -> SyncOptions {
    SyncOptions {
        sync: true,
        ..SyncOptions::default()
    }
}

#[test]
fn round_trip_preserves_content_and_size() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("input.bin");
    // larger than one transfer chunk so the loop has to re-issue
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    write_file(&src, &payload);

    let dst = tmp.path().join("output.bin");
    let stats = sync(&[src.clone()], &dst, &SyncOptions::default()).unwrap();

    assert_eq!(stats.files_copied, 1);
    assert_eq!(stats.bytes_copied, payload.len() as u64);
    assert_eq!(fs::read(&dst).unwrap(), payload);
    assert_eq!(
        fs::metadata(&dst).unwrap().len(),
        fs::metadata(&src).unwrap().len()
    );
}

#[test]
fn round_trip_preserves_content_for_every_method() {
    for method in [
        CopyMethod::Auto,
        CopyMethod::Sendfile,
        CopyMethod::Splice,
        CopyMethod::ReadWrite,
    ] {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("in");
        let dst = tmp.path().join("out");
        write_file(&src, b"method payload");

        let opts = SyncOptions {
            method,
            ..SyncOptions::default()
        };
        sync(&[src], &dst, &opts).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"method payload");
    }
}

#[test]
fn second_sync_run_skips_every_file() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("src");
    fs::create_dir_all(root.join("nested")).unwrap();
    write_file(&root.join("a.txt"), b"alpha");
    write_file(&root.join("nested/b.txt"), b"beta");

    let dest = tmp.path().join("dst");
    let first = sync(&[root.clone()], &dest, &sync_opts()).unwrap();
    assert_eq!(first.files_copied, 2);
    assert_eq!(first.files_skipped, 0);

    let second = sync(&[root], &dest, &sync_opts()).unwrap();
    assert_eq!(second.files_copied, 0);
    assert_eq!(second.files_skipped, 2);
    assert_eq!(second.errors, 0);
}

#[test]
fn touched_source_is_recopied_on_sync() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("src");
    fs::create_dir(&root).unwrap();
    let file = root.join("a.txt");
    write_file(&file, b"v1");

    let dest = tmp.path().join("dst");
    sync(&[root.clone()], &dest, &sync_opts()).unwrap();

    write_file(&file, b"v2");
    // age the destination so it is strictly older than the source
    filetime::set_file_mtime(dest.join("a.txt"), FileTime::from_unix_time(1_000_000, 0)).unwrap();

    let stats = sync(&[root], &dest, &sync_opts()).unwrap();
    assert_eq!(stats.files_copied, 1);
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"v2");
}

#[test]
fn tree_structure_is_preserved() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("tree");
    fs::create_dir_all(root.join("sub")).unwrap();
    write_file(&root.join("sub/file.txt"), b"content");
    symlink("sub/file.txt", root.join("link")).unwrap();
    fs::set_permissions(&root.join("sub"), fs::Permissions::from_mode(0o750)).unwrap();
    fs::set_permissions(root.join("sub/file.txt"), fs::Permissions::from_mode(0o604)).unwrap();

    let dest = tmp.path().join("copy");
    let stats = sync(&[root.clone()], &dest, &SyncOptions::default()).unwrap();
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.symlinks_created, 1);

    // matching relative paths and kinds
    let collect = |base: &Path| -> Vec<(String, bool, bool)> {
        WalkDir::new(base)
            .sort_by_file_name()
            .into_iter()
            .skip(1)
            .map(|e| {
                let e = e.unwrap();
                let rel = e
                    .path()
                    .strip_prefix(base)
                    .unwrap()
                    .to_string_lossy()
                    .into_owned();
                let ft = e.path().symlink_metadata().unwrap().file_type();
                (rel, ft.is_dir(), ft.is_symlink())
            })
            .collect()
    };
    assert_eq!(collect(&root), collect(&dest));

    // identical symlink target string
    assert_eq!(
        fs::read_link(dest.join("link")).unwrap(),
        Path::new("sub/file.txt")
    );

    // matching permission bits
    let mode = |p: &Path| fs::symlink_metadata(p).unwrap().permissions().mode() & 0o7777;
    assert_eq!(mode(&dest.join("sub")), 0o750);
    assert_eq!(mode(&dest.join("sub/file.txt")), 0o604);
}

#[test]
fn fifo_is_reported_and_siblings_still_copy() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("src");
    fs::create_dir(&root).unwrap();
    write_file(&root.join("regular.txt"), b"kept");

    let fifo = root.join("queue.fifo");
    let c_path = CString::new(fifo.as_os_str().as_bytes()).unwrap();
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) };
    assert_eq!(rc, 0, "mkfifo failed");

    let dest = tmp.path().join("dst");
    let stats = sync(&[root], &dest, &SyncOptions::default()).unwrap();

    assert_eq!(stats.entries_unsupported, 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.files_copied, 1);
    assert_eq!(fs::read(dest.join("regular.txt")).unwrap(), b"kept");
    assert!(!dest.join("queue.fifo").exists());
}

#[test]
fn mtime_is_carried_onto_the_destination() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("stamped");
    write_file(&src, b"stamped content");
    filetime::set_file_mtime(&src, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let dst = tmp.path().join("out");
    sync(&[src], &dst, &SyncOptions::default()).unwrap();

    let mtime = FileTime::from_last_modification_time(&fs::metadata(&dst).unwrap());
    assert_eq!(mtime.unix_seconds(), 1_600_000_000);
}

#[test]
fn multiple_sources_land_under_directory_destination() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("a.txt");
    let b = tmp.path().join("b.txt");
    write_file(&a, b"aaa");
    write_file(&b, b"bbb");

    let dest = tmp.path().join("dst");
    fs::create_dir(&dest).unwrap();
    let stats = sync(&[a, b], &dest, &SyncOptions::default()).unwrap();

    assert_eq!(stats.files_copied, 2);
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"aaa");
    assert_eq!(fs::read(dest.join("b.txt")).unwrap(), b"bbb");
}
