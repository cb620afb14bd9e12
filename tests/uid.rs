use std::fs;

use stem_refinery_core::export::uid::{format_uid, parse_uid_number};
use stem_refinery_core::{FixedUidSequence, ScanningUidSequence, UidSequence};
use tempfile::tempdir;

#[test]
fn uid_formatting() {
    assert_eq!(format_uid("GP", 1, 5), "GP_00001");
    assert_eq!(format_uid("GP", 123_456, 5), "GP_123456");
    assert_eq!(format_uid("XX", 7, 3), "XX_007");
}

#[test]
fn uid_parsing() {
    assert_eq!(parse_uid_number("GP_00007_house_128bpm_cmin", "GP"), Some(7));
    assert_eq!(parse_uid_number("GP_00012", "GP"), Some(12));
    assert_eq!(parse_uid_number("GPX_00012", "GP"), None);
    assert_eq!(parse_uid_number("GP_abc", "GP"), None);
    assert_eq!(parse_uid_number("Batch_2024-01-01", "GP"), None);
}

#[test]
fn empty_root_starts_at_one() {
    let dir = tempdir().unwrap();
    let mut seq = ScanningUidSequence::new(dir.path(), "GP", 5);
    assert_eq!(seq.next_uid().unwrap(), "GP_00001");
}

#[test]
fn missing_root_starts_at_one() {
    let dir = tempdir().unwrap();
    let mut seq = ScanningUidSequence::new(dir.path().join("nope"), "GP", 5);
    assert_eq!(seq.next_uid().unwrap(), "GP_00001");
}

#[test]
fn continues_after_highest_track_in_any_batch() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("Batch_2024-01-01/GP_00003_house_124bpm_amin")).unwrap();
    fs::create_dir_all(root.join("Batch_2024-01-02/GP_00007_techno_130bpm_fmin")).unwrap();
    fs::create_dir_all(root.join("Batch_2024-01-02/XX_00099_other_100bpm_c")).unwrap();
    // Plain files never count
    fs::write(root.join("Batch_2024-01-02/GP_00050.txt"), b"").unwrap();

    let mut seq = ScanningUidSequence::new(root, "GP", 5);
    assert_eq!(seq.scan_max().unwrap(), 7);
    assert_eq!(seq.next_uid().unwrap(), "GP_00008");
    assert_eq!(seq.next_uid().unwrap(), "GP_00009");
}

#[test]
fn track_dirs_directly_under_root_count() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("GP_00041_house_120bpm_cmin")).unwrap();
    let mut seq = ScanningUidSequence::new(dir.path(), "GP", 5);
    assert_eq!(seq.next_uid().unwrap(), "GP_00042");
}

#[test]
fn fixed_sequence_counts_up() {
    let mut seq = FixedUidSequence::new("GP", 100, 5);
    assert_eq!(seq.next_uid().unwrap(), "GP_00100");
    assert_eq!(seq.next_uid().unwrap(), "GP_00101");
}
