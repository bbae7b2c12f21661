//! Byte-range semantics of the encrypted file layer.
//!
//! Covers sequential and out-of-order writes, rewrites, EOF reporting,
//! holes and truncation, for every cipher suite, plus a model-based
//! property test against a plain in-memory buffer.

mod common;

use std::path::Path;

use cfcrypt_core::fs::HEADER_SIZE;
use cfcrypt_core::{CipherSuite, CryptConfig, OpenOptions};
use common::*;
use proptest::prelude::*;
use rand::Rng;
use rand::seq::SliceRandom;

#[test]
fn test_sequential_write_read_back() {
    init_tracing();
    for suite in SUITES {
        let (_store, fs) = memory_fs(test_config(suite));
        let writer = fs
            .open(
                Path::new("seq"),
                OpenOptions::new().read(false).write(true).create(true),
            )
            .unwrap();
        let reader = open_ro(&fs, "seq");

        let text = random_bytes(&mut rng(1), 10240 + 520);
        assert_eq!(fs.write(writer, 0, &text).unwrap(), text.len());
        fs.close(writer).unwrap();

        let out = fs.read(reader, 0, text.len()).unwrap();
        assert_eq!(out.data, text, "{suite}: content mismatch");
        assert!(!out.eof);
    }
}

#[test]
fn test_chunked_sequential_writes() {
    let (_store, fs) = memory_fs(test_config(CipherSuite::Aes256Gcm));
    let h = open_rw(&fs, "chunked");
    let text = random_bytes(&mut rng(2), 10240 + 520);

    // Odd chunk size so most writes straddle a block boundary.
    let mut offset = 0usize;
    for chunk in text.chunks(333) {
        fs.write(h, offset as i64, chunk).unwrap();
        offset += chunk.len();
    }
    assert_eq!(read_all(&fs, h), text);
}

#[test]
fn test_random_order_writes_converge() {
    for suite in SUITES {
        let mut rng = rng(3);
        for _ in 0..5 {
            let (_store, fs) = memory_fs(test_config(suite));
            let h = open_rw(&fs, "random");

            let bs = rng.random_range(1..=TEST_BLOCK_SIZE);
            let cnt = 12;
            let text = random_bytes(&mut rng, bs * cnt);
            let mut order: Vec<usize> = (0..cnt).collect();
            order.shuffle(&mut rng);

            for j in order {
                let begin = bs * j;
                fs.write(h, begin as i64, &text[begin..begin + bs]).unwrap();
            }

            assert_eq!(read_all(&fs, h), text, "{suite}: chunk size {bs}");
        }
    }
}

#[test]
fn test_rewrite_middle() {
    let (_store, fs) = memory_fs(test_config(CipherSuite::Aes256Gcm));
    let h = open_rw(&fs, "rewrite");
    let mut rng = rng(4);
    let mut text = random_bytes(&mut rng, 10240 + 520);
    fs.write(h, 0, &text).unwrap();

    let part = random_bytes(&mut rng, 100);
    text[500..600].copy_from_slice(&part);
    fs.write(h, 500, &part).unwrap();

    assert_eq!(read_all(&fs, h), text);
    assert_eq!(fs.file_size(h).unwrap(), 10240 + 520);
}

#[test]
fn test_short_read_at_eof() {
    let (_store, fs) = memory_fs(test_config(CipherSuite::Aes256Gcm));
    let length = 2048 + 128;
    let text = random_bytes(&mut rng(5), length);

    let h = fs
        .open(
            Path::new("eof"),
            OpenOptions::read_write_create().truncate(true),
        )
        .unwrap();
    fs.write(h, 0, &text).unwrap();
    fs.close(h).unwrap();

    let h = open_ro(&fs, "eof");
    let mut buf = vec![0u8; length];
    let out = fs.read_into(h, &mut buf, 1).unwrap();
    assert!(out.eof);
    assert_eq!(out.n, length - 1);
    assert_eq!(&buf[..length - 1], &text[1..]);

    let out = fs.read_into(h, &mut buf, length as i64).unwrap();
    assert_eq!((out.n, out.eof), (0, true));

    let out = fs.read_into(h, &mut buf, length as i64 + 1000).unwrap();
    assert_eq!((out.n, out.eof), (0, true));

    let out = fs.read(h, 0, length).unwrap();
    assert_eq!(out.data, text);
    assert!(!out.eof);
}

#[test]
fn test_sparse_file_reads_zeros() {
    for suite in SUITES {
        let (store, fs) = memory_fs(test_config(suite));
        let h = open_rw(&fs, "sparse");

        let far = 100 * TEST_BLOCK_SIZE + 7;
        fs.write(h, 3, b"start").unwrap();
        fs.write(h, far as i64, b"end").unwrap();
        assert_eq!(fs.file_size(h).unwrap(), (far + 3) as u64);

        let data = read_all(&fs, h);
        assert_eq!(&data[3..8], b"start");
        assert!(data[..3].iter().all(|&b| b == 0));
        assert!(data[8..far].iter().all(|&b| b == 0));
        assert_eq!(&data[far..], b"end");

        // Interior blocks of the gap were never encrypted.
        let report = fs.verify(Path::new("sparse")).unwrap();
        assert_eq!(report.blocks, 2, "{suite}");
        assert_eq!(report.holes, 99, "{suite}");

        let ebs = TEST_BLOCK_SIZE + suite.overhead();
        let raw = store.raw(Path::new("sparse")).unwrap();
        assert_eq!(raw.len(), HEADER_SIZE + 100 * ebs + 10 + suite.overhead());
    }
}

#[test]
fn test_truncate_sequence() {
    let (store, fs) = memory_fs(test_config(CipherSuite::XChaCha20Poly1305));
    let h = open_rw(&fs, "trunc");
    let text = sized_content(5 * TEST_BLOCK_SIZE + 100);
    fs.write(h, 0, &text).unwrap();

    fs.truncate(h, 1000).unwrap();
    assert_eq!(read_all(&fs, h), &text[..1000]);

    fs.truncate(h, 4000).unwrap();
    let data = read_all(&fs, h);
    assert_eq!(&data[..1000], &text[..1000]);
    assert!(data[1000..].iter().all(|&b| b == 0));
    assert_eq!(data.len(), 4000);

    let len = store.raw(Path::new("trunc")).unwrap().len() as u64;
    assert_eq!(
        len,
        fs.config()
            .layout()
            .encrypted_size(fs.file_size(h).unwrap())
    );

    fs.truncate(h, 0).unwrap();
    assert!(store.raw(Path::new("trunc")).unwrap().is_empty());
    assert!(fs.read(h, 0, 10).unwrap().eof);
}

#[test]
fn test_reopen_after_close_preserves_content() {
    let (_store, fs) = memory_fs(test_config(CipherSuite::Aes256Gcm));
    let text = sized_content(3 * TEST_BLOCK_SIZE - 1);

    let h = open_rw(&fs, "persist");
    fs.write(h, 0, &text).unwrap();
    fs.close(h).unwrap();
    assert_eq!(fs.open_files(), 0);

    let h = open_ro(&fs, "persist");
    assert_eq!(read_all(&fs, h), text);
    assert_eq!(
        fs.plaintext_len(Path::new("persist")).unwrap(),
        text.len() as u64
    );
}

#[test]
fn test_block_sizes_one_and_large() {
    for block_size in [1usize, 7, 4096, 65536] {
        let (_store, fs) = memory_fs(CryptConfig::default().plain_block_size(block_size));
        let h = open_rw(&fs, "bs");
        let text = random_bytes(&mut rng(block_size as u64), 5000);
        fs.write(h, 0, &text).unwrap();
        fs.write(h, 4999, b"!!").unwrap();
        let mut expected = text.clone();
        apply_write(&mut expected, 4999, b"!!");
        assert_eq!(read_all(&fs, h), expected, "block size {block_size}");
    }
}

#[derive(Debug, Clone)]
enum Op {
    Write { offset: usize, data: Vec<u8> },
    Truncate { size: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..400, prop::collection::vec(any::<u8>(), 0..120))
            .prop_map(|(offset, data)| Op::Write { offset, data }),
        1 => (0usize..450).prop_map(|size| Op::Truncate { size }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any sequence of writes and truncates matches a plain buffer model.
    #[test]
    fn prop_matches_plain_model(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let (_store, fs) = memory_fs(CryptConfig::default().plain_block_size(16));
        let h = open_rw(&fs, "model");
        let mut model: Vec<u8> = Vec::new();

        for op in &ops {
            match op {
                Op::Write { offset, data } => {
                    fs.write(h, *offset as i64, data).unwrap();
                    if !data.is_empty() {
                        apply_write(&mut model, *offset, data);
                    }
                }
                Op::Truncate { size } => {
                    fs.truncate(h, *size as i64).unwrap();
                    model.resize(*size, 0);
                }
            }
            prop_assert_eq!(fs.file_size(h).unwrap(), model.len() as u64);
        }

        prop_assert_eq!(read_all(&fs, h), model.clone());
        fs.close(h).unwrap();

        // Size and content survive a reopen from the backing bytes alone.
        let h = open_ro(&fs, "model");
        prop_assert_eq!(read_all(&fs, h), model);
        prop_assert!(fs.verify(Path::new("model")).is_ok());
    }
}
