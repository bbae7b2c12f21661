#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TEST_KEY: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

fn cfcrypt(store: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cfcrypt").unwrap();
    cmd.env("CFCRYPT_STORE", store.path())
        .env("CFCRYPT_KEY", TEST_KEY)
        .env("CFCRYPT_BLOCK_SIZE", "64")
        .env_remove("CFCRYPT_CIPHER")
        .env_remove("RUST_LOG");
    cmd
}

fn put(store: &TempDir, path: &str, content: &[u8]) {
    cfcrypt(store)
        .args(["put", path])
        .write_stdin(content)
        .assert()
        .success();
}

// ============================================================================
// Basic CLI tests
// ============================================================================

#[test]
fn test_help() {
    Command::cargo_bin("cfcrypt")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cfcrypt encrypted stores"))
        .stdout(predicate::str::contains("put"))
        .stdout(predicate::str::contains("write-at"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn test_missing_key() {
    let store = TempDir::new().unwrap();
    Command::cargo_bin("cfcrypt")
        .unwrap()
        .env_remove("CFCRYPT_KEY")
        .env("CFCRYPT_STORE", store.path())
        .args(["cat", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--key is required"));
}

#[test]
fn test_invalid_block_size() {
    let store = TempDir::new().unwrap();
    cfcrypt(&store)
        .args(["--block-size", "0", "cat", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid store configuration"));
}

// ============================================================================
// Content commands
// ============================================================================

#[test]
fn test_put_cat_roundtrip() {
    let store = TempDir::new().unwrap();
    let content = "line of text\n".repeat(40);
    put(&store, "notes/today.txt", content.as_bytes());

    cfcrypt(&store)
        .args(["cat", "/notes/today.txt"])
        .assert()
        .success()
        .stdout(content.clone());

    let on_disk = std::fs::read(store.path().join("notes/today.txt")).unwrap();
    assert!(!on_disk.windows(12).any(|w| w == b"line of text"));
}

#[test]
fn test_put_append() {
    let store = TempDir::new().unwrap();
    put(&store, "log", b"first ");
    cfcrypt(&store)
        .args(["put", "--append", "log"])
        .write_stdin("second")
        .assert()
        .success();

    cfcrypt(&store)
        .args(["cat", "log"])
        .assert()
        .success()
        .stdout("first second");
}

#[test]
fn test_read_range() {
    let store = TempDir::new().unwrap();
    put(&store, "alphabet", b"abcdefghijklmnopqrstuvwxyz");

    cfcrypt(&store)
        .args(["read", "alphabet", "--offset", "10", "--length", "5"])
        .assert()
        .success()
        .stdout("klmno");

    cfcrypt(&store)
        .args(["read", "alphabet", "--offset", "20"])
        .assert()
        .success()
        .stdout("uvwxyz");
}

#[test]
fn test_write_at_and_truncate() {
    let store = TempDir::new().unwrap();
    put(&store, "f", b"hello world");

    cfcrypt(&store)
        .args(["write-at", "f", "--offset", "6"])
        .write_stdin("there")
        .assert()
        .success();
    cfcrypt(&store)
        .args(["cat", "f"])
        .assert()
        .success()
        .stdout("hello there");

    cfcrypt(&store)
        .args(["truncate", "f", "5"])
        .assert()
        .success();
    cfcrypt(&store)
        .args(["cat", "f"])
        .assert()
        .success()
        .stdout("hello");

    cfcrypt(&store)
        .args(["write-at", "--no-create", "missing", "--offset", "0"])
        .write_stdin("x")
        .assert()
        .failure();
}

#[test]
fn test_stat_reports_sizes() {
    let store = TempDir::new().unwrap();
    put(&store, "sized", &[b'z'; 100]);

    // 18-byte header, one full block of 64 + 28, one block of 36 + 28.
    cfcrypt(&store)
        .args(["stat", "sized"])
        .assert()
        .success()
        .stdout(predicate::str::contains("size:       100"))
        .stdout(predicate::str::contains("backing:    174"))
        .stdout(predicate::str::contains("blocks:     2"))
        .stdout(predicate::str::contains("aes-256-gcm"));
}

#[test]
fn test_rm() {
    let store = TempDir::new().unwrap();
    put(&store, "doomed", b"bye");

    cfcrypt(&store).args(["rm", "doomed"]).assert().success();
    assert!(!store.path().join("doomed").exists());

    cfcrypt(&store)
        .args(["rm", "doomed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not found"));
    cfcrypt(&store).args(["rm", "-f", "doomed"]).assert().success();
}

// ============================================================================
// Integrity
// ============================================================================

#[test]
fn test_verify_detects_tampering() {
    let store = TempDir::new().unwrap();
    put(&store, "good", &[1u8; 200]);
    put(&store, "bad", &[2u8; 200]);

    let bad_path = store.path().join("bad");
    let mut raw = std::fs::read(&bad_path).unwrap();
    raw[40] ^= 0x01;
    std::fs::write(&bad_path, raw).unwrap();

    cfcrypt(&store)
        .args(["verify", "good"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok      good (200 bytes, 4 blocks, 0 holes)"));

    cfcrypt(&store)
        .args(["verify", "good", "bad"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED  bad"))
        .stderr(predicate::str::contains("1 file(s) failed verification"));

    cfcrypt(&store).args(["cat", "bad"]).assert().failure();
}

#[test]
fn test_wrong_cipher_fails_closed() {
    let store = TempDir::new().unwrap();
    cfcrypt(&store)
        .args(["--cipher", "xchacha20-poly1305", "put", "x"])
        .write_stdin("chacha content")
        .assert()
        .success();

    cfcrypt(&store)
        .args(["--cipher", "xchacha", "cat", "x"])
        .assert()
        .success()
        .stdout("chacha content");

    cfcrypt(&store).args(["cat", "x"]).assert().failure();
}
