//! Immutable ordered pages: copy-on-write B-tree nodes with cached folds

use std::sync::{Arc, OnceLock};

use crate::{MAX_ARITY, MIN_ARITY};

// === Core Types ===

/// Tree node - either a leaf with sorted slots or a branch over child pages.
/// Pages are never mutated after construction; every operation that changes
/// content builds a new page sharing untouched children with the original.
pub(crate) enum Page<K, V, U> {
    Leaf(Leaf<K, V, U>),
    Branch(Branch<K, V, U>),
}

pub(crate) struct Leaf<K, V, U> {
    /// Entries sorted strictly by key.
    pub slots: Vec<(K, V)>,
    fold: OnceLock<U>,
}

pub(crate) struct Branch<K, V, U> {
    pub children: Vec<Arc<Page<K, V, U>>>,
    /// Largest key in each child's subtree; sorted strictly ascending.
    pub keys: Vec<K>,
    /// Cumulative cardinality: `sizes[i]` counts entries in `children[0..=i]`.
    pub sizes: Vec<usize>,
    fold: OnceLock<U>,
}

impl<K, V, U> Page<K, V, U> {
    pub fn empty() -> Arc<Self> {
        Self::leaf(Vec::new())
    }

    pub fn leaf(slots: Vec<(K, V)>) -> Arc<Self> {
        Arc::new(Page::Leaf(Leaf {
            slots,
            fold: OnceLock::new(),
        }))
    }

    /// Total entries in this subtree.
    pub fn len(&self) -> usize {
        match self {
            Page::Leaf(l) => l.slots.len(),
            Page::Branch(b) => *b.sizes.last().expect("branch is never empty"),
        }
    }

    /// Slot or child count of this page alone.
    pub fn width(&self) -> usize {
        match self {
            Page::Leaf(l) => l.slots.len(),
            Page::Branch(b) => b.children.len(),
        }
    }

    fn max_key(&self) -> Option<&K> {
        match self {
            Page::Leaf(l) => l.slots.last().map(|(k, _)| k),
            Page::Branch(b) => b.keys.last(),
        }
    }
}

// === Construction ===

impl<K: Clone, V, U> Page<K, V, U> {
    fn branch(children: Vec<Arc<Self>>) -> Arc<Self> {
        debug_assert!(!children.is_empty());
        let mut keys = Vec::with_capacity(children.len());
        let mut sizes = Vec::with_capacity(children.len());
        let mut total = 0;
        for child in &children {
            total += child.len();
            keys.push(child.max_key().expect("branch child is never empty").clone());
            sizes.push(total);
        }
        Arc::new(Page::Branch(Branch {
            children,
            keys,
            sizes,
            fold: OnceLock::new(),
        }))
    }
}

// === Lookup ===

impl<K: Ord, V, U> Page<K, V, U> {
    pub fn get<'a>(page: &'a Self, key: &K) -> Option<&'a V> {
        match page {
            Page::Leaf(l) => l
                .slots
                .binary_search_by(|(k, _)| k.cmp(key))
                .ok()
                .map(|i| &l.slots[i].1),
            Page::Branch(b) => {
                let i = b.keys.partition_point(|m| m < key);
                if i == b.children.len() {
                    return None;
                }
                Self::get(&b.children[i], key)
            }
        }
    }

    pub fn first(page: &Self) -> Option<(&K, &V)> {
        match page {
            Page::Leaf(l) => l.slots.first().map(|(k, v)| (k, v)),
            Page::Branch(b) => Self::first(&b.children[0]),
        }
    }

    pub fn last(page: &Self) -> Option<(&K, &V)> {
        match page {
            Page::Leaf(l) => l.slots.last().map(|(k, v)| (k, v)),
            Page::Branch(b) => Self::last(b.children.last().expect("branch is never empty")),
        }
    }

    /// Smallest entry strictly greater than `key`.
    pub fn next_entry<'a>(page: &'a Self, key: &K) -> Option<(&'a K, &'a V)> {
        match page {
            Page::Leaf(l) => {
                let i = l.slots.partition_point(|(k, _)| k <= key);
                l.slots.get(i).map(|(k, v)| (k, v))
            }
            Page::Branch(b) => {
                let i = b.keys.partition_point(|m| m <= key);
                if i == b.children.len() {
                    return None;
                }
                Self::next_entry(&b.children[i], key)
            }
        }
    }

    /// Largest entry strictly less than `key`.
    pub fn previous_entry<'a>(page: &'a Self, key: &K) -> Option<(&'a K, &'a V)> {
        match page {
            Page::Leaf(l) => {
                let i = l.slots.partition_point(|(k, _)| k < key);
                if i == 0 {
                    None
                } else {
                    l.slots.get(i - 1).map(|(k, v)| (k, v))
                }
            }
            Page::Branch(b) => {
                let i = b.keys.partition_point(|m| m < key);
                if i < b.children.len() {
                    if let Some(hit) = Self::previous_entry(&b.children[i], key) {
                        return Some(hit);
                    }
                }
                if i == 0 {
                    return None;
                }
                Self::last(&b.children[i - 1])
            }
        }
    }

    /// Rank of `key` within the subtree, if present.
    pub fn index_of(page: &Self, key: &K) -> Option<usize> {
        match page {
            Page::Leaf(l) => l.slots.binary_search_by(|(k, _)| k.cmp(key)).ok(),
            Page::Branch(b) => {
                let i = b.keys.partition_point(|m| m < key);
                if i == b.children.len() {
                    return None;
                }
                let before = if i > 0 { b.sizes[i - 1] } else { 0 };
                Self::index_of(&b.children[i], key).map(|r| before + r)
            }
        }
    }

    /// Entry at rank `index`, descending by cumulative cardinality.
    pub fn get_index(page: &Self, index: usize) -> Option<(&K, &V)> {
        match page {
            Page::Leaf(l) => l.slots.get(index).map(|(k, v)| (k, v)),
            Page::Branch(b) => {
                let j = b.sizes.partition_point(|&s| s <= index);
                if j == b.children.len() {
                    return None;
                }
                let before = if j > 0 { b.sizes[j - 1] } else { 0 };
                Self::get_index(&b.children[j], index - before)
            }
        }
    }

    /// Structural self-check: ordering, occupancy, separator keys,
    /// cumulative sizes, and uniform child height. Returns the height.
    fn check(page: &Self, is_root: bool) -> Option<usize> {
        match page {
            Page::Leaf(l) => {
                let sorted = l.slots.windows(2).all(|w| w[0].0 < w[1].0);
                let fits = if is_root {
                    l.slots.len() <= MAX_ARITY
                } else {
                    (MIN_ARITY..=MAX_ARITY).contains(&l.slots.len())
                };
                (sorted && fits).then_some(0)
            }
            Page::Branch(b) => {
                let width = b.children.len();
                let fits = if is_root {
                    (2..=MAX_ARITY).contains(&width)
                } else {
                    (MIN_ARITY..=MAX_ARITY).contains(&width)
                };
                if !fits || b.keys.len() != width || b.sizes.len() != width {
                    return None;
                }
                if !b.keys.windows(2).all(|w| w[0] < w[1]) {
                    return None;
                }
                let mut total = 0;
                let mut height = None;
                for (i, child) in b.children.iter().enumerate() {
                    let h = Self::check(child, false)?;
                    if *height.get_or_insert(h) != h {
                        return None;
                    }
                    total += child.len();
                    if b.sizes[i] != total || child.max_key() != Some(&b.keys[i]) {
                        return None;
                    }
                }
                Some(height.unwrap_or(0) + 1)
            }
        }
    }

    pub fn well_formed(page: &Self) -> bool {
        Self::check(page, true).is_some()
    }
}

// === Mutation ===

impl<K: Ord + Clone, V: Clone + PartialEq, U> Page<K, V, U> {
    /// Insert or replace. Returns the new page and the previous value;
    /// replacing a value with an equal one returns the input page itself,
    /// so callers can detect no-ops by reference identity.
    pub fn updated(page: &Arc<Self>, key: &K, value: &V) -> (Arc<Self>, Option<V>) {
        match &**page {
            Page::Leaf(l) => match l.slots.binary_search_by(|(k, _)| k.cmp(key)) {
                Ok(i) => {
                    let old = l.slots[i].1.clone();
                    if old == *value {
                        return (page.clone(), Some(old));
                    }
                    let mut slots = l.slots.clone();
                    slots[i].1 = value.clone();
                    (Self::leaf(slots), Some(old))
                }
                Err(i) => {
                    let mut slots = l.slots.clone();
                    slots.insert(i, (key.clone(), value.clone()));
                    (Self::leaf(slots), None)
                }
            },
            Page::Branch(b) => {
                let i = b.keys.partition_point(|m| m < key).min(b.children.len() - 1);
                let (child, prev) = Self::updated(&b.children[i], key, value);
                if Arc::ptr_eq(&child, &b.children[i]) {
                    return (page.clone(), prev);
                }
                (Self::with_child(b, i, child), prev)
            }
        }
    }

    /// Remove. Absent keys return the input page itself.
    pub fn removed(page: &Arc<Self>, key: &K) -> (Arc<Self>, Option<V>) {
        match &**page {
            Page::Leaf(l) => match l.slots.binary_search_by(|(k, _)| k.cmp(key)) {
                Ok(i) => {
                    let mut slots = l.slots.clone();
                    let (_, old) = slots.remove(i);
                    (Self::leaf(slots), Some(old))
                }
                Err(_) => (page.clone(), None),
            },
            Page::Branch(b) => {
                let i = b.keys.partition_point(|m| m < key);
                if i == b.children.len() {
                    return (page.clone(), None);
                }
                let (child, prev) = Self::removed(&b.children[i], key);
                if Arc::ptr_eq(&child, &b.children[i]) {
                    return (page.clone(), prev);
                }
                (Self::with_child(b, i, child), prev)
            }
        }
    }

    /// Drop the first `n` entries in key order. Out-of-range `n` clamps.
    /// The survivors are rebuilt bottom-up into a packed tree.
    pub fn drop(page: &Arc<Self>, n: usize) -> Arc<Self> {
        if n == 0 {
            return page.clone();
        }
        if n >= page.len() {
            return Self::empty();
        }
        let mut slots = Vec::with_capacity(page.len() - n);
        Self::collect_from(page, n, &mut slots);
        Self::built(slots)
    }

    /// Keep only the first `n` entries in key order. Out-of-range `n` clamps.
    pub fn take(page: &Arc<Self>, n: usize) -> Arc<Self> {
        if n == 0 {
            return Self::empty();
        }
        if n >= page.len() {
            return page.clone();
        }
        let mut slots = Vec::with_capacity(n);
        Self::collect_to(page, n, &mut slots);
        Self::built(slots)
    }

    fn collect_from(page: &Self, skip: usize, out: &mut Vec<(K, V)>) {
        match page {
            Page::Leaf(l) => out.extend(l.slots.iter().skip(skip).cloned()),
            Page::Branch(b) => {
                let j = b.sizes.partition_point(|&s| s <= skip);
                let before = if j > 0 { b.sizes[j - 1] } else { 0 };
                Self::collect_from(&b.children[j], skip - before, out);
                for child in &b.children[j + 1..] {
                    Self::collect_from(child, 0, out);
                }
            }
        }
    }

    fn collect_to(page: &Self, limit: usize, out: &mut Vec<(K, V)>) {
        match page {
            Page::Leaf(l) => out.extend(l.slots.iter().take(limit).cloned()),
            Page::Branch(b) => {
                let j = b.sizes.partition_point(|&s| s < limit);
                for child in &b.children[..j] {
                    Self::collect_from(child, 0, out);
                }
                let before = if j > 0 { b.sizes[j - 1] } else { 0 };
                Self::collect_to(&b.children[j], limit - before, out);
            }
        }
    }

    /// Build a packed page tree bottom-up from sorted slots: chunk into
    /// evenly sized leaves, then stack branch levels until one remains.
    fn built(slots: Vec<(K, V)>) -> Arc<Self> {
        if slots.len() <= MAX_ARITY {
            return Self::leaf(slots);
        }
        let mut level: Vec<Arc<Self>> = Self::chunked(slots).into_iter().map(Self::leaf).collect();
        while level.len() > MAX_ARITY {
            level = Self::chunked(level).into_iter().map(Self::branch).collect();
        }
        Self::branch(level)
    }

    /// Split into `ceil(len / MAX_ARITY)` runs whose sizes differ by at
    /// most one, so every run lands within the fan-out bounds.
    fn chunked<T>(items: Vec<T>) -> Vec<Vec<T>> {
        let len = items.len();
        let groups = len.div_ceil(MAX_ARITY);
        let base = len / groups;
        let extra = len % groups;
        let mut out = Vec::with_capacity(groups);
        let mut iter = items.into_iter();
        for g in 0..groups {
            let run = base + usize::from(g < extra);
            out.push(iter.by_ref().take(run).collect());
        }
        out
    }

    /// Rebuild a branch with child `i` replaced, restoring fan-out bounds:
    /// oversized children split, undersized ones merge with a sibling,
    /// emptied ones disappear.
    fn with_child(branch: &Branch<K, V, U>, i: usize, child: Arc<Self>) -> Arc<Self> {
        let mut children = branch.children.clone();
        if child.width() == 0 {
            children.remove(i);
            if children.is_empty() {
                return Self::empty();
            }
        } else if child.width() > MAX_ARITY {
            let (left, right) = Self::split(&child);
            children[i] = left;
            children.insert(i + 1, right);
        } else if child.width() < MIN_ARITY && children.len() > 1 {
            children[i] = child;
            let j = if i + 1 < children.len() { i + 1 } else { i - 1 };
            let (a, b) = (i.min(j), i.max(j));
            let merged = Self::merged(&children[a], &children[b]);
            children.splice(a..=b, merged);
        } else {
            children[i] = child;
        }
        Self::branch(children)
    }

    /// Midpoint split of an oversized page into two siblings.
    fn split(page: &Arc<Self>) -> (Arc<Self>, Arc<Self>) {
        match &**page {
            Page::Leaf(l) => {
                let mid = l.slots.len() / 2;
                (
                    Self::leaf(l.slots[..mid].to_vec()),
                    Self::leaf(l.slots[mid..].to_vec()),
                )
            }
            Page::Branch(b) => {
                let mid = b.children.len() / 2;
                (
                    Self::branch(b.children[..mid].to_vec()),
                    Self::branch(b.children[mid..].to_vec()),
                )
            }
        }
    }

    /// Combine two adjacent siblings into one page, or redistribute into
    /// two halves when the combination would overflow.
    fn merged(a: &Arc<Self>, b: &Arc<Self>) -> Vec<Arc<Self>> {
        match (&**a, &**b) {
            (Page::Leaf(x), Page::Leaf(y)) => {
                let mut slots = x.slots.clone();
                slots.extend_from_slice(&y.slots);
                if slots.len() <= MAX_ARITY {
                    vec![Self::leaf(slots)]
                } else {
                    let right = slots.split_off(slots.len() / 2);
                    vec![Self::leaf(slots), Self::leaf(right)]
                }
            }
            (Page::Branch(x), Page::Branch(y)) => {
                let mut children = x.children.clone();
                children.extend(y.children.iter().cloned());
                if children.len() <= MAX_ARITY {
                    vec![Self::branch(children)]
                } else {
                    let right = children.split_off(children.len() / 2);
                    vec![Self::branch(children), Self::branch(right)]
                }
            }
            _ => unreachable!("siblings always share a height"),
        }
    }

    /// Root-level fixup after a mutation: grow a new level when the root
    /// overflows, collapse single-child roots so height stays minimal.
    pub fn balanced(page: Arc<Self>) -> Arc<Self> {
        let mut root = page;
        if root.width() > MAX_ARITY {
            let (left, right) = Self::split(&root);
            root = Self::branch(vec![left, right]);
        }
        loop {
            let only = match &*root {
                Page::Branch(b) if b.children.len() == 1 => b.children[0].clone(),
                _ => break,
            };
            root = only;
        }
        root
    }
}

// === Fold Cache ===

impl<K, V, U: Clone> Page<K, V, U> {
    /// Combined fold over the subtree's values, in key order. Each page
    /// caches its result; pages rebuilt by a mutation start unfilled, so
    /// only the fresh ancestor chain ever recomputes.
    pub fn reduced<A, C>(page: &Self, identity: &U, accumulate: &A, combine: &C) -> U
    where
        A: Fn(&U, &V) -> U,
        C: Fn(&U, &U) -> U,
    {
        match page {
            Page::Leaf(l) => l
                .fold
                .get_or_init(|| {
                    l.slots
                        .iter()
                        .fold(identity.clone(), |acc, (_, v)| accumulate(&acc, v))
                })
                .clone(),
            Page::Branch(b) => b
                .fold
                .get_or_init(|| {
                    let mut acc = Self::reduced(&b.children[0], identity, accumulate, combine);
                    for child in &b.children[1..] {
                        let sub = Self::reduced(child, identity, accumulate, combine);
                        acc = combine(&acc, &sub);
                    }
                    acc
                })
                .clone(),
        }
    }
}
