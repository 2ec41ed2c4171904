//! End-to-end tests for archive creation, restore and retention

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use snapvault::backup::walker::archive_entry_name;
use snapvault::backup::{
    cleanup_old_backups, create_archive, inspect_archive, restore_archive, CreateOptions,
    RestoreOptions,
};
use snapvault::crypto::key_derivation::MIN_KDF_ITERATIONS;
use snapvault::crypto::{SealWriter, SecureString, StreamHeader};
use snapvault::ErrorKind;
use tempfile::TempDir;

fn fast_options() -> CreateOptions {
    CreateOptions {
        kdf_iterations: MIN_KDF_ITERATIONS,
        ..Default::default()
    }
}

/// `etc/app/config.yml` plus `var/lib/app/db/` with nested files
fn app_tree(root: &Path) -> (PathBuf, PathBuf) {
    let config = root.join("etc/app/config.yml");
    let db = root.join("var/lib/app/db");
    fs::create_dir_all(config.parent().unwrap()).unwrap();
    fs::create_dir_all(db.join("wal")).unwrap();

    fs::write(&config, "listen: 0.0.0.0:8080\nworkers: 4\n").unwrap();
    fs::write(db.join("users.tbl"), b"alice\nbob\n").unwrap();
    fs::write(db.join("wal/000001.log"), pseudo_random(200_000)).unwrap();
    (config, db)
}

fn pseudo_random(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

fn restored(target: &Path, original: &Path) -> PathBuf {
    target.join(archive_entry_name(original).unwrap())
}

fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn encrypted_round_trip_restores_every_file() {
    let temp = TempDir::new().unwrap();
    let (config, db) = app_tree(&temp.path().join("src"));
    let archive = temp.path().join("backups/b1.tar.zst");
    let passphrase = SecureString::new("correct horse battery staple");

    let report = create_archive(&archive, &[&config, &db], Some(&passphrase), &fast_options())
        .unwrap();
    assert_eq!(report.file_count, 3);
    assert!(report.metadata.encrypted);

    let target = temp.path().join("restore");
    let restore = restore_archive(
        &archive,
        Some(&passphrase),
        &RestoreOptions::into_dir(&target),
    )
    .unwrap();

    assert_eq!(restore.files_restored.len(), 3);
    assert_eq!(
        fs::read(restored(&target, &config)).unwrap(),
        fs::read(&config).unwrap()
    );
    assert_eq!(
        fs::read(restored(&target, &db.join("users.tbl"))).unwrap(),
        b"alice\nbob\n"
    );
    assert_eq!(
        fs::read(restored(&target, &db.join("wal/000001.log"))).unwrap(),
        pseudo_random(200_000)
    );
    assert_eq!(
        restore.metadata.files,
        vec![
            config.to_string_lossy().into_owned(),
            db.to_string_lossy().into_owned()
        ]
    );
}

#[test]
fn plain_round_trip() {
    let temp = TempDir::new().unwrap();
    let (config, db) = app_tree(&temp.path().join("src"));
    let archive = temp.path().join("plain.tar.zst");

    create_archive(&archive, &[&config, &db], None, &fast_options()).unwrap();

    let metadata = inspect_archive(&archive, None).unwrap();
    assert!(!metadata.encrypted);
    assert!(metadata.compressed);

    let target = temp.path().join("restore");
    restore_archive(&archive, None, &RestoreOptions::into_dir(&target)).unwrap();
    assert_eq!(
        fs::read_to_string(restored(&target, &config)).unwrap(),
        "listen: 0.0.0.0:8080\nworkers: 4\n"
    );
}

#[test]
fn empty_passphrase_means_unencrypted() {
    let temp = TempDir::new().unwrap();
    let (config, _) = app_tree(&temp.path().join("src"));
    let archive = temp.path().join("b.tar.zst");
    let empty = SecureString::new("");

    let report = create_archive(&archive, &[&config], Some(&empty), &fast_options()).unwrap();
    assert!(!report.metadata.encrypted);
    assert!(inspect_archive(&archive, None).is_ok());
}

#[test]
fn wrong_passphrase_fails_and_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let (config, db) = app_tree(&temp.path().join("src"));
    let archive = temp.path().join("b.tar.zst");

    create_archive(
        &archive,
        &[&config, &db],
        Some(&SecureString::new("right")),
        &fast_options(),
    )
    .unwrap();

    let target = temp.path().join("restore");
    fs::create_dir(&target).unwrap();

    let err = restore_archive(
        &archive,
        Some(&SecureString::new("wrong")),
        &RestoreOptions::into_dir(&target),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(list_dir(&target).is_empty());
}

#[test]
fn flipped_ciphertext_byte_is_authentication_failure() {
    let temp = TempDir::new().unwrap();
    let (config, db) = app_tree(&temp.path().join("src"));
    let archive = temp.path().join("b.tar.zst");
    let passphrase = SecureString::new("pw");

    create_archive(&archive, &[&config, &db], Some(&passphrase), &fast_options()).unwrap();

    let mut bytes = fs::read(&archive).unwrap();
    // Inside the final frame's tag
    let last = bytes.len() - 5;
    bytes[last] ^= 0x01;
    fs::write(&archive, &bytes).unwrap();

    let target = temp.path().join("restore");
    let err = restore_archive(&archive, Some(&passphrase), &RestoreOptions::into_dir(&target))
        .unwrap_err();
    assert!(err.is_authentication());
}

#[test]
fn truncated_archive_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (config, db) = app_tree(&temp.path().join("src"));
    let passphrase = SecureString::new("pw");

    let sealed = temp.path().join("sealed.tar.zst");
    create_archive(&sealed, &[&config, &db], Some(&passphrase), &fast_options()).unwrap();
    let bytes = fs::read(&sealed).unwrap();
    fs::write(&sealed, &bytes[..bytes.len() / 2]).unwrap();

    let err = restore_archive(
        &sealed,
        Some(&passphrase),
        &RestoreOptions::into_dir(temp.path().join("r1")),
    )
    .unwrap_err();
    assert!(err.is_authentication());

    let plain = temp.path().join("plain.tar.zst");
    create_archive(&plain, &[&config, &db], None, &fast_options()).unwrap();
    let bytes = fs::read(&plain).unwrap();
    fs::write(&plain, &bytes[..bytes.len() / 2]).unwrap();

    let err = restore_archive(&plain, None, &RestoreOptions::into_dir(temp.path().join("r2")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

/// Seal `body` so it fills exactly one frame, leaving an empty final frame
fn seal_single_frame(body: &[u8], passphrase: &SecureString) -> Vec<u8> {
    let header = StreamHeader::generate(MIN_KDF_ITERATIONS, body.len()).unwrap();
    let mut writer = SealWriter::new(Vec::new(), passphrase.as_str(), header).unwrap();
    writer.write_all(body).unwrap();
    writer.finish().unwrap()
}

#[test]
fn stream_end_is_authenticated_after_last_entry() {
    let temp = TempDir::new().unwrap();
    let (config, _) = app_tree(&temp.path().join("src"));
    let passphrase = SecureString::new("pw");

    let plain = temp.path().join("plain.tar.zst");
    create_archive(&plain, &[&config], None, &fast_options()).unwrap();
    let sealed = seal_single_frame(&fs::read(&plain).unwrap(), &passphrase);

    let archive = temp.path().join("sealed.tar.zst");
    fs::write(&archive, &sealed).unwrap();
    restore_archive(
        &archive,
        Some(&passphrase),
        &RestoreOptions::into_dir(temp.path().join("ok")),
    )
    .unwrap();

    // Empty final frame: 4 byte length word plus 16 byte tag
    fs::write(&archive, &sealed[..sealed.len() - 20]).unwrap();
    let err = restore_archive(
        &archive,
        Some(&passphrase),
        &RestoreOptions::into_dir(temp.path().join("r1")),
    )
    .unwrap_err();
    assert!(err.is_authentication());
    assert!(inspect_archive(&archive, Some(&passphrase))
        .unwrap_err()
        .is_authentication());

    let mut extended = sealed.clone();
    extended.extend_from_slice(b"GARBAGE");
    fs::write(&archive, &extended).unwrap();
    let err = restore_archive(
        &archive,
        Some(&passphrase),
        &RestoreOptions::into_dir(temp.path().join("r2")),
    )
    .unwrap_err();
    assert!(err.is_authentication());
}

#[test]
fn failed_create_leaves_destination_and_directory_untouched() {
    let temp = TempDir::new().unwrap();
    let (config, _) = app_tree(&temp.path().join("src"));
    let backups = temp.path().join("backups");
    let archive = backups.join("b.tar.zst");

    create_archive(&archive, &[&config], None, &fast_options()).unwrap();
    let before = fs::read(&archive).unwrap();

    let missing = temp.path().join("src/does-not-exist");
    let err = create_archive(&archive, &[&config, &missing], None, &fast_options()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceUnreadable);

    assert_eq!(fs::read(&archive).unwrap(), before);
    assert_eq!(list_dir(&backups), vec!["b.tar.zst".to_string()]);
}

#[test]
fn staged_restore_replaces_target_wholesale() {
    let temp = TempDir::new().unwrap();
    let (config, _) = app_tree(&temp.path().join("src"));
    let archive = temp.path().join("b.tar.zst");
    create_archive(&archive, &[&config], None, &fast_options()).unwrap();

    let target = temp.path().join("restore");
    fs::create_dir(&target).unwrap();
    fs::write(target.join("stale.txt"), "old").unwrap();

    let report = restore_archive(&archive, None, &RestoreOptions::staged(&target)).unwrap();

    assert!(!target.join("stale.txt").exists());
    assert!(restored(&target, &config).exists());
    assert!(report.files_restored[0].starts_with(&target));
    // No scratch or holder directories left beside the target
    assert_eq!(
        list_dir(temp.path()),
        vec!["b.tar.zst".to_string(), "restore".to_string(), "src".to_string()]
    );
}

#[test]
fn staged_restore_with_wrong_passphrase_keeps_target() {
    let temp = TempDir::new().unwrap();
    let (config, _) = app_tree(&temp.path().join("src"));
    let archive = temp.path().join("b.tar.zst");
    create_archive(
        &archive,
        &[&config],
        Some(&SecureString::new("right")),
        &fast_options(),
    )
    .unwrap();

    let target = temp.path().join("restore");
    fs::create_dir(&target).unwrap();
    fs::write(target.join("keep.txt"), "mine").unwrap();

    let err = restore_archive(
        &archive,
        Some(&SecureString::new("wrong")),
        &RestoreOptions::staged(&target),
    )
    .unwrap_err();

    assert!(err.is_authentication());
    assert_eq!(fs::read_to_string(target.join("keep.txt")).unwrap(), "mine");
}

#[test]
fn default_iteration_count_round_trip() {
    let temp = TempDir::new().unwrap();
    let (config, _) = app_tree(&temp.path().join("src"));
    let archive = temp.path().join("b.tar.zst");
    let passphrase = SecureString::new("slow but standard");

    create_archive(&archive, &[&config], Some(&passphrase), &CreateOptions::default()).unwrap();

    let metadata = inspect_archive(&archive, Some(&passphrase)).unwrap();
    assert!(metadata.encrypted);
}

fn age(path: &Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(secs))
        .unwrap();
}

#[test]
fn cleanup_bounds_archive_count_and_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let (config, _) = app_tree(&temp.path().join("src"));
    let backups = temp.path().join("backups");

    let names: Vec<String> = (0..5)
        .map(|i| format!("backup-20250101-00000{}-000.tar.zst", i))
        .collect();
    for (i, name) in names.iter().enumerate() {
        let path = backups.join(name);
        create_archive(&path, &[&config], None, &fast_options()).unwrap();
        age(&path, 1000 - (i as u64) * 100);
    }
    fs::write(backups.join("README"), "not an archive").unwrap();

    let deleted = cleanup_old_backups(&backups, 2).unwrap();
    assert_eq!(deleted.len(), 3);

    let mut expected = vec![
        "README".to_string(),
        names[3].clone(),
        names[4].clone(),
    ];
    expected.sort();
    assert_eq!(list_dir(&backups), expected);

    assert!(cleanup_old_backups(&backups, 2).unwrap().is_empty());
    assert_eq!(list_dir(&backups), expected);

    assert!(cleanup_old_backups(&temp.path().join("missing"), 2)
        .unwrap()
        .is_empty());
}

#[test]
fn cleanup_sweeps_abandoned_temp_files() {
    let temp = TempDir::new().unwrap();
    let backups = temp.path().join("backups");
    fs::create_dir(&backups).unwrap();

    let abandoned = backups.join(".snapvault-x1y2z3.tmp");
    fs::write(&abandoned, "partial archive").unwrap();
    age(&abandoned, 3 * 60 * 60);

    cleanup_old_backups(&backups, 10).unwrap();
    assert!(!abandoned.exists());
}
