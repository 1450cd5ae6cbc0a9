use spantree::{QTree, QTreeMap, Rect};

#[test]
fn test_overlapping_rectangles_query() {
    let map = QTreeMap::new();
    map.put(1u64, Rect::new(0, 0, 10, 10), "a");
    map.put(2u64, Rect::new(20, 20, 30, 30), "b");
    map.put(3u64, Rect::new(5, 5, 25, 25), "c");

    let mut hits: Vec<u64> = map.query(Rect::new(8, 8, 9, 9)).map(|(k, _, _)| k).collect();
    hits.sort_unstable();
    assert_eq!(hits, vec![1, 3]);
}

#[test]
fn test_put_get_round_trip() {
    let map = QTreeMap::new();
    for k in 0..200u64 {
        let (x, y) = (k % 20, k / 20);
        let r = Rect::new(x * 8, y * 8, x * 8 + 4, y * 8 + 4);
        assert_eq!(map.put(k, r, k * 2), None);
    }
    assert_eq!(map.len(), 200);
    for k in 0..200u64 {
        let (x, y) = (k % 20, k / 20);
        let r = Rect::new(x * 8, y * 8, x * 8 + 4, y * 8 + 4);
        assert_eq!(map.get(&k, &r), Some(k * 2));
    }
    // Same key at a different rectangle is a different entry.
    assert_eq!(map.get(&0, &Rect::new(1, 1, 2, 2)), None);
}

#[test]
fn test_previous_value_and_no_op() {
    let map = QTreeMap::new();
    let r = Rect::new(0, 0, 5, 5);
    assert_eq!(map.put(1u64, r, 10), None);
    assert_eq!(map.put(1, r, 20), Some(10));
    assert_eq!(map.put(1, r, 20), Some(20)); // equal value, no-op
    assert_eq!(map.len(), 1);
    assert_eq!(map.remove(&1, &r), Some(20));
    assert_eq!(map.remove(&1, &r), None);
    assert!(map.is_empty());
}

#[test]
fn test_query_returns_each_intersecting_entry_exactly_once() {
    let map = QTreeMap::new();
    let mut entries = Vec::new();
    for k in 0..300u64 {
        let x = (k * 37) % 500;
        let y = (k * 91) % 500;
        let r = Rect::new(x, y, x + 20, y + 20);
        entries.push((k, r));
        map.put(k, r, k);
    }
    let query = Rect::new(100, 100, 260, 260);

    let mut hits: Vec<u64> = map.query(query).map(|(k, _, _)| k).collect();
    hits.sort_unstable();
    let mut expected: Vec<u64> = entries
        .iter()
        .filter(|(_, r)| r.intersects(&query))
        .map(|(k, _)| *k)
        .collect();
    expected.sort_unstable();

    assert!(!expected.is_empty(), "query region must not be trivial");
    assert_eq!(hits, expected);
    // Exactly once: no duplicates survived the sort-compare above, and
    // every yielded rectangle really intersects the query.
    for (_, r, _) in map.query(query) {
        assert!(r.intersects(&query));
    }
}

#[test]
fn test_unfiltered_iterator_visits_everything_once() {
    let map = QTreeMap::new();
    for k in 0..150u64 {
        let r = Rect::new(k * 3, k * 5 % 100, k * 3 + 10, k * 5 % 100 + 10);
        map.put(k, r, k);
    }
    let mut seen: Vec<u64> = map.iter().map(|(k, _, _)| k).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..150).collect::<Vec<_>>());
}

#[test]
fn test_move_entry_relocates() {
    let map = QTreeMap::new();
    let old = Rect::new(0, 0, 10, 10);
    let new = Rect::new(200, 200, 210, 210);
    map.put(7u64, old, "payload");

    assert_eq!(map.move_entry(&7, &old, new, "payload"), Some("payload"));
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&7, &old), None);
    assert_eq!(map.get(&7, &new), Some("payload"));

    assert_eq!(map.query(Rect::new(5, 5, 6, 6)).count(), 0);
    assert_eq!(map.query(Rect::new(205, 205, 206, 206)).count(), 1);
}

#[test]
fn test_move_entry_of_absent_key_still_inserts() {
    let map = QTreeMap::new();
    let old = Rect::new(0, 0, 1, 1);
    let new = Rect::new(50, 50, 60, 60);
    assert_eq!(map.move_entry(&9u64, &old, new, 99), None);
    assert_eq!(map.get(&9, &new), Some(99));
    assert_eq!(map.len(), 1);
}

#[test]
fn test_bulk_insert_and_removal_stay_balanced() {
    let map = QTreeMap::new();
    let rect_for = |k: u64| {
        let x = (k * 13) % 1000;
        let y = (k * 29) % 1000;
        Rect::new(x, y, x + 6, y + 6)
    };
    for k in 0..1000u64 {
        map.put(k, rect_for(k), k);
    }
    assert!(map.check_invariants());
    for k in 0..500u64 {
        assert_eq!(map.remove(&k, &rect_for(k)), Some(k));
    }
    assert!(map.check_invariants());
    assert_eq!(map.len(), 500);
    for k in 500..1000u64 {
        assert_eq!(map.get(&k, &rect_for(k)), Some(k));
    }
}

#[test]
fn test_snapshots_are_isolated_from_later_writes() {
    let map = QTreeMap::new();
    let r1 = Rect::new(0, 0, 10, 10);
    let r2 = Rect::new(30, 30, 40, 40);
    map.put(1u64, r1, "one");
    map.put(2u64, r2, "two");
    let snap = map.snapshot();

    map.remove(&1, &r1);
    map.put(3u64, Rect::new(70, 70, 80, 80), "three");

    assert_eq!(snap.len(), 2);
    assert_eq!(snap.get(&1, &r1), Some(&"one"));
    assert_eq!(snap.query(Rect::new(75, 75, 76, 76)).count(), 0);
    assert_eq!(map.len(), 2);
}

#[test]
fn test_persistent_tree_versions() {
    let v1: QTree<u64, u64> = (0..50)
        .map(|k| (k, Rect::new(k, k, k + 5, k + 5), k))
        .collect();
    let r = Rect::new(10, 10, 15, 15);
    let v2 = v1.updated(10, r, 999);
    let v3 = v2.removed(&20, &Rect::new(20, 20, 25, 25));

    assert_eq!(v1.get(&10, &r), Some(&10));
    assert_eq!(v2.get(&10, &r), Some(&999));
    assert_eq!(v2.len(), 50);
    assert_eq!(v3.len(), 49);
    assert!(v1.check_invariants() && v2.check_invariants() && v3.check_invariants());
}

#[test]
fn test_query_restart_re_iterates_from_the_start() {
    let tree: QTree<u64, u64> = (0..40)
        .map(|k| (k, Rect::new(k * 2, 0, k * 2 + 1, 10), k))
        .collect();
    let mut q = tree.query(Rect::new(0, 0, 30, 10));
    let first: Vec<u64> = q.by_ref().map(|(k, _, _)| *k).collect();
    assert_eq!(q.next(), None);
    q.restart();
    let second: Vec<u64> = q.map(|(k, _, _)| *k).collect();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn test_query_on_empty_region_yields_nothing() {
    let map = QTreeMap::new();
    for k in 0..50u64 {
        map.put(k, Rect::new(k, k, k + 2, k + 2), k);
    }
    assert_eq!(map.query(Rect::new(5000, 5000, 5100, 5100)).count(), 0);
}

#[test]
fn test_spatial_cursor_is_bidirectional() {
    let tree: QTree<u64, u64> = (0..100)
        .map(|k| (k, Rect::new(k * 4, k % 7, k * 4 + 3, k % 7 + 3), k))
        .collect();
    let mut c = tree.cursor();
    assert_eq!(c.next_index(), 0);
    let (k1, _, _) = c.next().unwrap();
    let (k2, _, _) = c.next().unwrap();
    let (back, _, _) = c.previous().unwrap();
    assert_eq!(k2, back);
    let _ = k1;

    c.skip(50);
    assert_eq!(c.next_index(), 51);
    let mut remaining = 0;
    while c.next().is_some() {
        remaining += 1;
    }
    assert_eq!(remaining, 49);
}

#[test]
fn test_fold_matches_linear_scan() {
    let map: QTreeMap<u64, u64, u64> = QTreeMap::default();
    for k in 0..200u64 {
        map.put(k, Rect::new(k, k, k + 3, k + 3), k * k);
    }
    let folded = map.reduced(0, |acc, v| acc + v, |a, b| a + b);
    let scanned: u64 = map.iter().map(|(_, _, v)| v).sum();
    assert_eq!(folded, scanned);
}

#[test]
fn test_clear() {
    let map = QTreeMap::new();
    for k in 0..30u64 {
        map.put(k, Rect::new(k, k, k + 1, k + 1), k);
    }
    map.clear();
    assert!(map.is_empty());
    assert_eq!(map.iter().count(), 0);
    assert_eq!(map.query(Rect::new(0, 0, 100, 100)).count(), 0);
}
