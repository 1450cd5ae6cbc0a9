//! Property tests: the trees must agree with reference models

use std::collections::HashMap;

use proptest::prelude::*;
use spantree::{BTreeMap, QTreeMap, Rect, Span};

proptest! {
    #[test]
    fn ordered_map_matches_std_btreemap(
        ops in proptest::collection::vec((0u8..4, 0u64..64, 0u64..1000), 1..300),
    ) {
        let map = BTreeMap::new();
        let mut model = std::collections::BTreeMap::new();
        for (op, k, v) in ops {
            match op {
                0..=2 => {
                    prop_assert_eq!(map.put(k, v), model.insert(k, v));
                }
                _ => {
                    prop_assert_eq!(map.remove(&k), model.remove(&k));
                }
            }
            prop_assert_eq!(map.len(), model.len());
        }
        prop_assert!(map.check_invariants());
        let got: Vec<(u64, u64)> = map.iter().collect();
        let want: Vec<(u64, u64)> = model.into_iter().collect();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn drop_and_take_agree_with_sorted_truncation(
        keys in proptest::collection::btree_set(0u64..10_000, 0..200),
        cut in 0usize..250,
    ) {
        let map = BTreeMap::new();
        for &k in &keys {
            map.put(k, k);
        }
        let sorted: Vec<u64> = keys.iter().copied().collect();

        let dropped = map.snapshot().drop(cut);
        let kept: Vec<u64> = dropped.keys().copied().collect();
        prop_assert_eq!(&kept[..], &sorted[cut.min(sorted.len())..]);
        prop_assert!(dropped.check_invariants());

        let taken = map.snapshot().take(cut);
        let head: Vec<u64> = taken.keys().copied().collect();
        prop_assert_eq!(&head[..], &sorted[..cut.min(sorted.len())]);
        prop_assert!(taken.check_invariants());
    }

    #[test]
    fn rank_access_agrees_with_sorted_order(
        keys in proptest::collection::btree_set(0u64..10_000, 1..150),
    ) {
        let map = BTreeMap::new();
        for &k in &keys {
            map.put(k, k);
        }
        for (i, &k) in keys.iter().enumerate() {
            prop_assert_eq!(map.index_of(&k), Some(i));
            prop_assert_eq!(map.get_index(i), Some((k, k)));
        }
        prop_assert_eq!(map.get_index(keys.len()), None);
    }

    #[test]
    fn span_covers_its_inputs(a in 0u64..(1 << 50), b in 0u64..(1 << 50)) {
        let s = Span::of(a, b);
        prop_assert!(s.base() <= a.min(b));
        prop_assert!(s.end() > a.max(b));
        prop_assert!(s.len().is_power_of_two());
        prop_assert_eq!(s.base() % s.len(), 0);
    }

    #[test]
    fn span_containment_is_bound_compatible(
        a in 0u64..1024, b in 0u64..1024, c in 0u64..1024, d in 0u64..1024,
    ) {
        let s = Span::of(a, b);
        let t = Span::of(c, d);
        if s.contains(t) {
            prop_assert!(s.base() <= t.base() && t.end() <= s.end());
            // Containers sort before (or equal to) what they contain.
            prop_assert!(s <= t);
        }
        // Dyadic intervals nest or are disjoint.
        prop_assert_eq!(s.intersects(t), s.contains(t) || t.contains(s));
        let u = s.union(t);
        prop_assert!(u.contains(s) && u.contains(t));
    }

    #[test]
    fn spatial_query_agrees_with_brute_force(
        entries in proptest::collection::vec(
            (0u64..16, 0u64..200, 0u64..200, 0u64..30, 0u64..30),
            1..120,
        ),
        probe in (0u64..200, 0u64..200, 0u64..80, 0u64..80),
    ) {
        let map = QTreeMap::new();
        let mut model: HashMap<(u64, Rect), u64> = HashMap::new();
        for (i, &(k, x, y, w, h)) in entries.iter().enumerate() {
            let r = Rect::new(x, y, x + w, y + h);
            prop_assert_eq!(map.put(k, r, i as u64), model.insert((k, r), i as u64));
        }
        prop_assert!(map.check_invariants());
        prop_assert_eq!(map.len(), model.len());

        let query = Rect::new(probe.0, probe.1, probe.0 + probe.2, probe.1 + probe.3);
        let mut got: Vec<(u64, Rect, u64)> = map.query(query).collect();
        got.sort();
        let mut want: Vec<(u64, Rect, u64)> = model
            .iter()
            .filter(|((_, r), _)| r.intersects(&query))
            .map(|(&(k, r), &v)| (k, r, v))
            .collect();
        want.sort();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn spatial_removal_returns_to_the_model(
        entries in proptest::collection::vec((0u64..8, 0u64..100, 0u64..100), 1..80),
    ) {
        let map = QTreeMap::new();
        let mut model: HashMap<(u64, Rect), u64> = HashMap::new();
        for &(k, x, y) in &entries {
            let r = Rect::new(x, y, x + 4, y + 4);
            map.put(k, r, x + y);
            model.insert((k, r), x + y);
        }
        // Remove every other model entry and compare what survives.
        let victims: Vec<(u64, Rect)> = model.keys().copied().step_by(2).collect();
        for (k, r) in victims {
            let expect = model.remove(&(k, r));
            prop_assert_eq!(map.remove(&k, &r), expect);
            prop_assert!(map.check_invariants());
        }
        prop_assert_eq!(map.len(), model.len());
        for ((k, r), v) in model {
            prop_assert_eq!(map.get(&k, &r), Some(v));
        }
    }
}
