//! Immutable spatial pages: copy-on-write R-tree nodes over dyadic tiles

use std::sync::{Arc, OnceLock};

use crate::interval::{Rect, Tile};
use crate::{MAX_ARITY, MIN_ARITY};

// === Core Types ===

/// One spatial entry. Identity is the `(key, rect)` pair; the tile is the
/// rectangle's dyadic cover and doubles as the leaf sort key.
pub(crate) struct QSlot<K, V> {
    pub key: K,
    pub rect: Rect,
    pub tile: Tile,
    pub value: V,
}

impl<K: Clone, V: Clone> Clone for QSlot<K, V> {
    fn clone(&self) -> Self {
        QSlot {
            key: self.key.clone(),
            rect: self.rect,
            tile: self.tile,
            value: self.value.clone(),
        }
    }
}

/// Spatial tree node. Branches annotate each child with its covering tile,
/// recomputed tightly on every rebuild so query pruning stays sharp.
pub(crate) enum QPage<K, V, U> {
    Leaf(QLeaf<K, V, U>),
    Branch(QBranch<K, V, U>),
}

pub(crate) struct QLeaf<K, V, U> {
    /// Slots sorted by `(tile, key)`.
    pub slots: Vec<QSlot<K, V>>,
    fold: OnceLock<U>,
}

pub(crate) struct QBranch<K, V, U> {
    /// Children sorted by covering tile.
    pub children: Vec<Arc<QPage<K, V, U>>>,
    /// Tight covering tile of each child.
    pub tiles: Vec<Tile>,
    /// Cumulative cardinality, as in the ordered pages.
    pub sizes: Vec<usize>,
    fold: OnceLock<U>,
}

impl<K, V, U> QPage<K, V, U> {
    pub fn empty() -> Arc<Self> {
        Self::leaf(Vec::new())
    }

    fn leaf(slots: Vec<QSlot<K, V>>) -> Arc<Self> {
        Arc::new(QPage::Leaf(QLeaf {
            slots,
            fold: OnceLock::new(),
        }))
    }

    fn branch(mut children: Vec<Arc<Self>>) -> Arc<Self> {
        debug_assert!(!children.is_empty());
        children.sort_by_key(|c| c.tile().expect("branch child is never empty"));
        let mut tiles = Vec::with_capacity(children.len());
        let mut sizes = Vec::with_capacity(children.len());
        let mut total = 0;
        for child in &children {
            total += child.len();
            tiles.push(child.tile().expect("branch child is never empty"));
            sizes.push(total);
        }
        Arc::new(QPage::Branch(QBranch {
            children,
            tiles,
            sizes,
            fold: OnceLock::new(),
        }))
    }

    pub fn len(&self) -> usize {
        match self {
            QPage::Leaf(l) => l.slots.len(),
            QPage::Branch(b) => *b.sizes.last().expect("branch is never empty"),
        }
    }

    pub fn width(&self) -> usize {
        match self {
            QPage::Leaf(l) => l.slots.len(),
            QPage::Branch(b) => b.children.len(),
        }
    }

    /// Covering tile of the whole subtree; `None` only for the empty root.
    pub fn tile(&self) -> Option<Tile> {
        match self {
            QPage::Leaf(l) => l.slots.iter().map(|s| s.tile).reduce(Tile::union),
            QPage::Branch(b) => b.tiles.iter().copied().reduce(Tile::union),
        }
    }
}

// === Lookup ===

impl<K: Ord, V, U> QPage<K, V, U> {
    /// Exact-entry lookup. Unlike the ordered tree a rectangle can sit in
    /// any child whose cover swallows it, so every such child is probed.
    pub fn get<'a>(page: &'a Self, key: &K, rect: &Rect) -> Option<&'a V> {
        Self::find(page, key, rect, rect.tile())
    }

    fn find<'a>(page: &'a Self, key: &K, rect: &Rect, tile: Tile) -> Option<&'a V> {
        match page {
            QPage::Leaf(l) => Self::slot_index(l, key, rect, tile).map(|i| &l.slots[i].value),
            QPage::Branch(b) => {
                for (i, t) in b.tiles.iter().enumerate() {
                    if !t.contains(tile) {
                        continue;
                    }
                    if let Some(v) = Self::find(&b.children[i], key, rect, tile) {
                        return Some(v);
                    }
                }
                None
            }
        }
    }

    fn slot_index(leaf: &QLeaf<K, V, U>, key: &K, rect: &Rect, tile: Tile) -> Option<usize> {
        let start = leaf
            .slots
            .partition_point(|s| (s.tile, &s.key) < (tile, key));
        for (i, s) in leaf.slots.iter().enumerate().skip(start) {
            if s.tile != tile || s.key != *key {
                break;
            }
            if s.rect == *rect {
                return Some(i);
            }
        }
        None
    }

    fn check(page: &Self, is_root: bool) -> Option<usize> {
        match page {
            QPage::Leaf(l) => {
                let fits = if is_root {
                    l.slots.len() <= MAX_ARITY
                } else {
                    (MIN_ARITY..=MAX_ARITY).contains(&l.slots.len())
                };
                let sorted = l.slots.windows(2).all(|w| {
                    (w[0].tile, &w[0].key) <= (w[1].tile, &w[1].key)
                        && !(w[0].key == w[1].key && w[0].rect == w[1].rect)
                });
                let tiled = l.slots.iter().all(|s| s.tile == s.rect.tile());
                (fits && sorted && tiled).then_some(0)
            }
            QPage::Branch(b) => {
                let width = b.children.len();
                let fits = if is_root {
                    (2..=MAX_ARITY).contains(&width)
                } else {
                    (MIN_ARITY..=MAX_ARITY).contains(&width)
                };
                if !fits || b.tiles.len() != width || b.sizes.len() != width {
                    return None;
                }
                if !b.tiles.windows(2).all(|w| w[0] <= w[1]) {
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
                    if b.sizes[i] != total || child.tile() != Some(b.tiles[i]) {
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

impl<K: Ord + Clone, V: Clone + PartialEq, U> QPage<K, V, U> {
    /// Insert or replace the `(key, rect)` entry. Replacing with an equal
    /// value returns the input page itself.
    pub fn updated(page: &Arc<Self>, key: &K, rect: &Rect, value: &V) -> (Arc<Self>, Option<V>) {
        let tile = rect.tile();
        match Self::replaced(page, key, rect, tile, value) {
            Some(done) => done,
            None => (Self::inserted(page, key, rect, tile, value), None),
        }
    }

    fn replaced(
        page: &Arc<Self>,
        key: &K,
        rect: &Rect,
        tile: Tile,
        value: &V,
    ) -> Option<(Arc<Self>, Option<V>)> {
        match &**page {
            QPage::Leaf(l) => {
                let i = Self::slot_index(l, key, rect, tile)?;
                let old = l.slots[i].value.clone();
                if old == *value {
                    return Some((page.clone(), Some(old)));
                }
                let mut slots = l.slots.clone();
                slots[i].value = value.clone();
                Some((Self::leaf(slots), Some(old)))
            }
            QPage::Branch(b) => {
                for (i, t) in b.tiles.iter().enumerate() {
                    if !t.contains(tile) {
                        continue;
                    }
                    if let Some((child, old)) = Self::replaced(&b.children[i], key, rect, tile, value)
                    {
                        if Arc::ptr_eq(&child, &b.children[i]) {
                            return Some((page.clone(), old));
                        }
                        return Some((Self::with_child(b, i, child), old));
                    }
                }
                None
            }
        }
    }

    fn inserted(page: &Arc<Self>, key: &K, rect: &Rect, tile: Tile, value: &V) -> Arc<Self> {
        match &**page {
            QPage::Leaf(l) => {
                let mut slots = l.slots.clone();
                let i = slots.partition_point(|s| (s.tile, &s.key) < (tile, key));
                slots.insert(
                    i,
                    QSlot {
                        key: key.clone(),
                        rect: *rect,
                        tile,
                        value: value.clone(),
                    },
                );
                Self::leaf(slots)
            }
            QPage::Branch(b) => {
                let i = Self::choose_child(b, tile);
                let child = Self::inserted(&b.children[i], key, rect, tile, value);
                Self::with_child(b, i, child)
            }
        }
    }

    /// Least-enlargement descent; ties break toward the smaller cover.
    fn choose_child(branch: &QBranch<K, V, U>, tile: Tile) -> usize {
        let mut best = 0;
        let mut best_growth = u128::MAX;
        let mut best_area = u128::MAX;
        for (i, t) in branch.tiles.iter().enumerate() {
            let area = t.area();
            let growth = t.union(tile).area() - area;
            if growth < best_growth || (growth == best_growth && area < best_area) {
                best = i;
                best_growth = growth;
                best_area = area;
            }
        }
        best
    }

    /// Remove the `(key, rect)` entry. Absent entries return the input
    /// page itself.
    pub fn removed(page: &Arc<Self>, key: &K, rect: &Rect) -> (Arc<Self>, Option<V>) {
        Self::removed_inner(page, key, rect, rect.tile())
    }

    fn removed_inner(
        page: &Arc<Self>,
        key: &K,
        rect: &Rect,
        tile: Tile,
    ) -> (Arc<Self>, Option<V>) {
        match &**page {
            QPage::Leaf(l) => match Self::slot_index(l, key, rect, tile) {
                Some(i) => {
                    let mut slots = l.slots.clone();
                    let old = slots.remove(i).value;
                    (Self::leaf(slots), Some(old))
                }
                None => (page.clone(), None),
            },
            QPage::Branch(b) => {
                for (i, t) in b.tiles.iter().enumerate() {
                    if !t.contains(tile) {
                        continue;
                    }
                    let (child, old) = Self::removed_inner(&b.children[i], key, rect, tile);
                    if old.is_some() {
                        return (Self::with_child(b, i, child), old);
                    }
                }
                (page.clone(), None)
            }
        }
    }

    /// Rebuild a branch with child `i` replaced, restoring fan-out bounds
    /// and retightening covering tiles.
    fn with_child(branch: &QBranch<K, V, U>, i: usize, child: Arc<Self>) -> Arc<Self> {
        let mut children = branch.children.clone();
        if child.width() == 0 {
            children.remove(i);
            if children.is_empty() {
                return Self::empty();
            }
        } else if child.width() > MAX_ARITY {
            let (left, right) = Self::split(&child);
            children[i] = left;
            children.push(right);
        } else if child.width() < MIN_ARITY && children.len() > 1 {
            children[i] = child;
            let j = Self::merge_partner(&children, i);
            let (a, b) = (i.min(j), i.max(j));
            let merged = Self::merged(&children[a], &children[b]);
            children.splice(a..=b, merged);
        } else {
            children[i] = child;
        }
        Self::branch(children)
    }

    /// Sibling whose cover grows least when united with child `i`.
    fn merge_partner(children: &[Arc<Self>], i: usize) -> usize {
        let tile = children[i].tile().expect("underfull child still has entries");
        let mut best = usize::MAX;
        let mut best_area = u128::MAX;
        for (j, sibling) in children.iter().enumerate() {
            if j == i {
                continue;
            }
            let cover = sibling
                .tile()
                .expect("branch child is never empty")
                .union(tile)
                .area();
            if cover < best_area {
                best = j;
                best_area = cover;
            }
        }
        best
    }

    /// Split an oversized page into two siblings. Both axes are tried with
    /// a center-ordered midpoint cut; the axis with the smaller summed
    /// cover area wins.
    fn split(page: &Arc<Self>) -> (Arc<Self>, Arc<Self>) {
        match &**page {
            QPage::Leaf(l) => {
                let (left, right) = Self::split_parts(&l.slots, |s| s.tile);
                (Self::leaf_sorted(left), Self::leaf_sorted(right))
            }
            QPage::Branch(b) => {
                let (left, right) = Self::split_parts(&b.children, |c| {
                    c.tile().expect("branch child is never empty")
                });
                (Self::branch(left), Self::branch(right))
            }
        }
    }

    fn split_parts<T: Clone, F: Fn(&T) -> Tile>(parts: &[T], tile_of: F) -> (Vec<T>, Vec<T>) {
        let mid = parts.len() / 2;
        let cover = |xs: &[T]| {
            xs.iter()
                .map(&tile_of)
                .reduce(Tile::union)
                .expect("split halves are non-empty")
                .area()
        };
        let mut by_x = parts.to_vec();
        by_x.sort_by_key(|p| tile_of(p).center().0);
        let mut by_y = parts.to_vec();
        by_y.sort_by_key(|p| tile_of(p).center().1);
        let cost_x = cover(&by_x[..mid]) + cover(&by_x[mid..]);
        let cost_y = cover(&by_y[..mid]) + cover(&by_y[mid..]);
        let mut left = if cost_x <= cost_y { by_x } else { by_y };
        let right = left.split_off(mid);
        (left, right)
    }

    fn leaf_sorted(mut slots: Vec<QSlot<K, V>>) -> Arc<Self> {
        slots.sort_by(|a, b| a.tile.cmp(&b.tile).then_with(|| a.key.cmp(&b.key)));
        Self::leaf(slots)
    }

    /// Combine two siblings into one page, or redistribute when the
    /// combination would overflow.
    fn merged(a: &Arc<Self>, b: &Arc<Self>) -> Vec<Arc<Self>> {
        match (&**a, &**b) {
            (QPage::Leaf(x), QPage::Leaf(y)) => {
                let mut slots = x.slots.clone();
                slots.extend(y.slots.iter().cloned());
                if slots.len() <= MAX_ARITY {
                    vec![Self::leaf_sorted(slots)]
                } else {
                    let (left, right) = Self::split_parts(&slots, |s| s.tile);
                    vec![Self::leaf_sorted(left), Self::leaf_sorted(right)]
                }
            }
            (QPage::Branch(x), QPage::Branch(y)) => {
                let mut children = x.children.clone();
                children.extend(y.children.iter().cloned());
                if children.len() <= MAX_ARITY {
                    vec![Self::branch(children)]
                } else {
                    let (left, right) = Self::split_parts(&children, |c| {
                        c.tile().expect("branch child is never empty")
                    });
                    vec![Self::branch(left), Self::branch(right)]
                }
            }
            _ => unreachable!("siblings always share a height"),
        }
    }

    /// Root-level fixup after a mutation, as in the ordered tree.
    pub fn balanced(page: Arc<Self>) -> Arc<Self> {
        let mut root = page;
        if root.width() > MAX_ARITY {
            let (left, right) = Self::split(&root);
            root = Self::branch(vec![left, right]);
        }
        loop {
            let only = match &*root {
                QPage::Branch(b) if b.children.len() == 1 => b.children[0].clone(),
                _ => break,
            };
            root = only;
        }
        root
    }
}

// === Fold Cache ===

impl<K, V, U: Clone> QPage<K, V, U> {
    /// Cached subtree fold, mirroring the ordered pages.
    pub fn reduced<A, C>(page: &Self, identity: &U, accumulate: &A, combine: &C) -> U
    where
        A: Fn(&U, &V) -> U,
        C: Fn(&U, &U) -> U,
    {
        match page {
            QPage::Leaf(l) => l
                .fold
                .get_or_init(|| {
                    l.slots
                        .iter()
                        .fold(identity.clone(), |acc, s| accumulate(&acc, &s.value))
                })
                .clone(),
            QPage::Branch(b) => b
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

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: u64, y0: u64, x1: u64, y1: u64) -> Rect {
        Rect::new(x0, y0, x1, y1)
    }

    fn grid(n: u64) -> Arc<QPage<u64, u64, u64>> {
        let mut root = QPage::empty();
        for k in 0..n {
            let (x, y) = (k % 16, k / 16);
            let r = rect(x * 10, y * 10, x * 10 + 5, y * 10 + 5);
            let (page, _) = QPage::updated(&root, &k, &r, &k);
            root = QPage::balanced(page);
        }
        root
    }

    #[test]
    fn test_grid_inserts_stay_balanced() {
        let root = grid(200);
        assert!(QPage::well_formed(&root));
        assert_eq!(root.len(), 200);
        for k in 0..200 {
            let (x, y) = (k % 16, k / 16);
            let r = rect(x * 10, y * 10, x * 10 + 5, y * 10 + 5);
            assert_eq!(QPage::get(&root, &k, &r), Some(&k));
        }
    }

    #[test]
    fn test_equal_value_update_is_identity() {
        let root = grid(50);
        let r = rect(70, 0, 75, 5);
        let (same, prev) = QPage::updated(&root, &7, &r, &7);
        assert!(Arc::ptr_eq(&same, &root));
        assert_eq!(prev, Some(7));
    }

    #[test]
    fn test_removals_retighten_and_rebalance() {
        let mut root = grid(200);
        for k in 0..150 {
            let (x, y) = (k % 16, k / 16);
            let r = rect(x * 10, y * 10, x * 10 + 5, y * 10 + 5);
            let (page, prev) = QPage::removed(&root, &k, &r);
            assert_eq!(prev, Some(k));
            root = QPage::balanced(page);
            assert!(QPage::well_formed(&root));
        }
        assert_eq!(root.len(), 50);
    }

    #[test]
    fn test_same_key_distinct_rects_coexist() {
        let mut root: Arc<QPage<u64, u64, u64>> = QPage::empty();
        let a = rect(0, 0, 10, 10);
        let b = rect(100, 100, 110, 110);
        root = QPage::balanced(QPage::updated(&root, &1, &a, &11).0);
        root = QPage::balanced(QPage::updated(&root, &1, &b, &22).0);
        assert_eq!(root.len(), 2);
        assert_eq!(QPage::get(&root, &1, &a), Some(&11));
        assert_eq!(QPage::get(&root, &1, &b), Some(&22));
        let (rest, old) = QPage::removed(&root, &1, &a);
        assert_eq!(old, Some(11));
        assert_eq!(QPage::get(&rest, &1, &b), Some(&22));
    }
}
