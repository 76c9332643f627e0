//! End-to-end exercise of both variants against a regular file standing in
//! for a block device (buffered-mode fallback, since `O_DIRECT` on a
//! tmpfs-backed test file is unreliable across CI filesystems).
//!
//! Grounded on the teacher's `tests/scan_fixture.rs`: a real fixture file
//! built in a temp directory, driven through the public API, asserted on
//! observable side effects rather than internals.

use std::fs;
use std::io::Write;

use diskwarmer::config::Config;
use diskwarmer::progress::NullSink;

fn write_file(path: &std::path::Path, bytes: &[u8]) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(bytes).unwrap();
}

#[test]
fn warms_a_small_directory_tree_against_a_regular_file_device() {
    let tree = tempfile::tempdir().unwrap();
    write_file(&tree.path().join("a.bin"), &vec![1u8; 256 * 1024]);
    write_file(&tree.path().join("b.bin"), &vec![2u8; 256 * 1024]);

    let mut device = tempfile::NamedTempFile::new().unwrap();
    device.write_all(&vec![0u8; 4 * 1024 * 1024]).unwrap();

    let config = Config {
        directories: vec![tree.path().to_str().unwrap().to_string()],
        device: Some(device.path().to_str().unwrap().to_string()),
        read_size_kb: 64,
        stride_kb: 64,
        queue_depth: 4,
        full_disk: true,
        merge_extents: true,
        syslog: false,
        silent: true,
        debug: false,
        max_depth: -1,
        threads: 2,
        phase1_throttle: 0,
        phase2_throttle: 0,
    };

    let sink = NullSink;
    diskwarmer::run_block_device(&config, &sink).expect("warming run should succeed");
}

#[test]
fn page_cache_variant_reads_every_file_under_the_tree() {
    let tree = tempfile::tempdir().unwrap();
    write_file(&tree.path().join("one.bin"), &vec![7u8; 4096]);
    let nested = tree.path().join("nested");
    fs::create_dir_all(&nested).unwrap();
    write_file(&nested.join("two.bin"), &vec![8u8; 4096]);

    let config = Config {
        directories: vec![tree.path().to_str().unwrap().to_string()],
        device: None,
        read_size_kb: 4,
        stride_kb: 4,
        queue_depth: 4,
        full_disk: false,
        merge_extents: false,
        syslog: false,
        silent: true,
        debug: false,
        max_depth: -1,
        threads: 1,
        phase1_throttle: 0,
        phase2_throttle: 0,
    };

    let sink = NullSink;
    diskwarmer::run_page_cache(&config, &sink).expect("page cache warming should succeed");
}

#[test]
fn rejects_invalid_configuration_before_touching_the_device() {
    let config = Config {
        directories: vec![],
        device: Some("/dev/null".to_string()),
        read_size_kb: 64,
        stride_kb: 64,
        queue_depth: 4,
        full_disk: false,
        merge_extents: false,
        syslog: false,
        silent: true,
        debug: false,
        max_depth: -1,
        threads: 1,
        phase1_throttle: 0,
        phase2_throttle: 0,
    };

    let sink = NullSink;
    assert!(diskwarmer::run_block_device(&config, &sink).is_err());
}
