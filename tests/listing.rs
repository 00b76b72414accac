//! Prefix enumeration and delimiter listing with rollup, marker and limit.

use radixstore::{ListEntryKind, Tree, TreeError};
use tempfile::tempdir;

fn open_tree(dir: &tempfile::TempDir) -> Tree {
    Tree::builder()
        .path(dir.path().join("db"))
        .tick_interval(std::time::Duration::from_secs(3600))
        .open()
        .unwrap()
}

const LIST_SET: &[&str] = &[
    "test",
    "slow",
    "water",
    "slower",
    "tester",
    "team",
    "toast",
    "te",
    "test123/1",
    "test123/2",
    "test123//2",
];

fn seeded_tree(dir: &tempfile::TempDir) -> Tree {
    let tree = open_tree(dir);
    for key in LIST_SET {
        tree.put(key.as_bytes(), key.as_bytes()).unwrap();
    }
    tree
}

#[test]
fn prefix_returns_all_keys_under_prefix() {
    let dir = tempdir().unwrap();
    let tree = seeded_tree(&dir);

    let mut keys = tree.prefix(b"t").unwrap();
    keys.sort();
    let mut expected: Vec<Vec<u8>> = [
        "te", "team", "test", "test123/1", "test123/2", "test123//2", "tester", "toast",
    ]
    .iter()
    .map(|s| s.as_bytes().to_vec())
    .collect();
    expected.sort();
    assert_eq!(keys, expected);

    assert_eq!(tree.prefix(b"w").unwrap(), vec![b"water".to_vec()]);
    assert_eq!(tree.prefix(b"slower").unwrap(), vec![b"slower".to_vec()]);
    assert_eq!(tree.prefix(b"zzz").unwrap(), Vec::<Vec<u8>>::new());
}

#[test]
fn delimiter_listing_rolls_up_common_prefixes() {
    let dir = tempdir().unwrap();
    let tree = seeded_tree(&dir);

    let entries = tree.list(b"t", b"/", 100, 64, b"").unwrap();
    assert_eq!(entries.len(), 6, "{entries:?}");

    let mut keys: Vec<Vec<u8>> = entries.iter().map(|e| e.key.clone()).collect();
    keys.sort();
    let mut expected: Vec<Vec<u8>> = ["te", "team", "test", "test123/", "tester", "toast"]
        .iter()
        .map(|s| s.as_bytes().to_vec())
        .collect();
    expected.sort();
    assert_eq!(keys, expected);

    for entry in &entries {
        if entry.key == b"test123/" {
            assert_eq!(entry.kind, ListEntryKind::CommonPrefix);
            assert!(entry.value.is_empty());
        } else {
            assert_eq!(entry.kind, ListEntryKind::Content, "{:?}", entry.key);
            assert_eq!(entry.value, entry.key, "content carries the stored value");
        }
    }
}

#[test]
fn limit_truncates_the_ordered_result() {
    let dir = tempdir().unwrap();
    let tree = seeded_tree(&dir);

    let full = tree.list(b"t", b"/", 100, 64, b"").unwrap();
    let limited = tree.list(b"t", b"/", 2, 64, b"").unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited.as_slice(), &full[..2], "limited run is a prefix of the full run");
}

#[test]
fn empty_delimiter_degenerates_to_prefix_enumeration() {
    let dir = tempdir().unwrap();
    let tree = seeded_tree(&dir);

    let entries = tree.list(b"t", b"", 100, 64, b"").unwrap();
    assert!(entries
        .iter()
        .all(|entry| entry.kind == ListEntryKind::Content));

    let mut listed: Vec<Vec<u8>> = entries.into_iter().map(|e| e.key).collect();
    listed.sort();
    let mut prefixed = tree.prefix(b"t").unwrap();
    prefixed.sort();
    assert_eq!(listed, prefixed);
}

#[test]
fn marker_is_an_exclusive_lower_bound() {
    let dir = tempdir().unwrap();
    let tree = seeded_tree(&dir);

    // Marker on an existing key: that key is excluded, its sub-tree kept.
    let entries = tree.list(b"t", b"/", 100, 64, b"te").unwrap();
    let keys: Vec<&[u8]> = entries.iter().map(|e| e.key.as_slice()).collect();
    assert!(!keys.contains(&b"te".as_ref()));
    assert!(keys.contains(&b"test".as_ref()));
    assert!(keys.contains(&b"tester".as_ref()));
    assert!(keys.contains(&b"test123/".as_ref()));
    for entry in &entries {
        assert!(entry.key.as_slice() > b"te".as_ref(), "{:?}", entry.key);
    }
}

#[test]
fn zero_limit_is_invalid() {
    let dir = tempdir().unwrap();
    let tree = seeded_tree(&dir);

    let err = tree.list(b"t", b"/", 0, 64, b"").unwrap_err();
    assert!(matches!(
        TreeError::from_report(&err),
        Some(TreeError::InvalidArgument(_))
    ));
}

#[test]
fn max_levels_caps_descent() {
    let dir = tempdir().unwrap();
    let tree = open_tree(&dir);
    tree.put(b"a", b"a").unwrap();
    tree.put(b"ab", b"ab").unwrap();
    tree.put(b"abc", b"abc").unwrap();
    tree.put(b"abcd", b"abcd").unwrap();

    let shallow = tree.list(b"a", b"", 100, 1, b"").unwrap();
    let keys: Vec<&[u8]> = shallow.iter().map(|e| e.key.as_slice()).collect();
    assert_eq!(keys, vec![b"a".as_ref(), b"ab".as_ref()]);

    let deep = tree.list(b"a", b"", 100, 64, b"").unwrap();
    assert_eq!(deep.len(), 4);
}

#[test]
fn listing_missing_prefix_is_empty() {
    let dir = tempdir().unwrap();
    let tree = seeded_tree(&dir);
    assert!(tree.list(b"zzz", b"/", 100, 64, b"").unwrap().is_empty());
}

#[test]
fn multibyte_delimiter_rolls_up_through_occurrence() {
    let dir = tempdir().unwrap();
    let tree = open_tree(&dir);
    tree.put(b"log::2024::a", b"1").unwrap();
    tree.put(b"log::2024::b", b"2").unwrap();
    tree.put(b"log", b"3").unwrap();

    let entries = tree.list(b"log", b"::", 100, 64, b"").unwrap();
    let mut keys: Vec<Vec<u8>> = entries.iter().map(|e| e.key.clone()).collect();
    keys.sort();
    assert_eq!(keys, vec![b"log".to_vec(), b"log::".to_vec()]);
}
