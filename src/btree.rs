//! Ordered index: persistent `BTree` values and the lock-free `BTreeMap`

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cursor::{Cursor, Entries, IntoEntries, Keys, Values};
use crate::page::Page;

// === Persistent Value ===

/// An immutable ordered map. Every mutating operation returns a new tree
/// sharing unchanged pages with the original, so old versions stay valid
/// and cheap to keep.
pub struct BTree<K, V, U = ()> {
    pub(crate) root: Arc<Page<K, V, U>>,
}

impl<K, V, U> Clone for BTree<K, V, U> {
    fn clone(&self) -> Self {
        BTree {
            root: self.root.clone(),
        }
    }
}

impl<K, V> BTree<K, V> {
    pub fn new() -> Self {
        BTree {
            root: Page::empty(),
        }
    }
}

impl<K, V, U> BTree<K, V, U> {
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Entries<'_, K, V, U> {
        Entries::new(&self.root)
    }

    pub fn keys(&self) -> Keys<'_, K, V, U> {
        Keys(Entries::new(&self.root))
    }

    pub fn values(&self) -> Values<'_, K, V, U> {
        Values(Entries::new(&self.root))
    }

    /// Cursor parked before the first entry.
    pub fn cursor(&self) -> Cursor<'_, K, V, U> {
        Cursor::new(&self.root)
    }

    /// Cursor parked before the entry at rank `index`.
    pub fn cursor_at(&self, index: usize) -> Cursor<'_, K, V, U> {
        Cursor::at(&self.root, index)
    }
}

impl<K: Ord, V, U> BTree<K, V, U> {
    pub fn get(&self, key: &K) -> Option<&V> {
        Page::get(&self.root, key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn first(&self) -> Option<(&K, &V)> {
        Page::first(&self.root)
    }

    pub fn last(&self) -> Option<(&K, &V)> {
        Page::last(&self.root)
    }

    /// Smallest entry strictly greater than `key`.
    pub fn next_entry(&self, key: &K) -> Option<(&K, &V)> {
        Page::next_entry(&self.root, key)
    }

    /// Largest entry strictly less than `key`.
    pub fn previous_entry(&self, key: &K) -> Option<(&K, &V)> {
        Page::previous_entry(&self.root, key)
    }

    /// Rank of `key` in sort order, if present.
    pub fn index_of(&self, key: &K) -> Option<usize> {
        Page::index_of(&self.root, key)
    }

    /// Entry at rank `index`.
    pub fn get_index(&self, index: usize) -> Option<(&K, &V)> {
        Page::get_index(&self.root, index)
    }

    /// Structural health check used by tests and debug assertions.
    pub fn check_invariants(&self) -> bool {
        Page::well_formed(&self.root)
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq, U> BTree<K, V, U> {
    /// New tree with `key` bound to `value`. Binding an equal value
    /// returns a tree sharing the same root.
    pub fn updated(&self, key: K, value: V) -> Self {
        let (page, _) = Page::updated(&self.root, &key, &value);
        let root = Page::balanced(page);
        debug_assert!(Page::well_formed(&root));
        BTree { root }
    }

    /// New tree without `key`. Removing an absent key returns a tree
    /// sharing the same root.
    pub fn removed(&self, key: &K) -> Self {
        let (page, _) = Page::removed(&self.root, key);
        let root = Page::balanced(page);
        debug_assert!(Page::well_formed(&root));
        BTree { root }
    }

    /// New tree without the first `n` entries; clamps past the end.
    pub fn drop(&self, n: usize) -> Self {
        let root = Page::balanced(Page::drop(&self.root, n));
        debug_assert!(Page::well_formed(&root));
        BTree { root }
    }

    /// New tree keeping only the first `n` entries; clamps past the end.
    pub fn take(&self, n: usize) -> Self {
        let root = Page::balanced(Page::take(&self.root, n));
        debug_assert!(Page::well_formed(&root));
        BTree { root }
    }
}

impl<K, V, U: Clone> BTree<K, V, U> {
    /// Fold over all values in key order. Per-page caches make repeated
    /// reductions O(log n) after a mutation rather than O(n); use one
    /// consistent fold per tree.
    pub fn reduced<A, C>(&self, identity: U, accumulate: A, combine: C) -> U
    where
        A: Fn(&U, &V) -> U,
        C: Fn(&U, &U) -> U,
    {
        Page::reduced(&self.root, &identity, &accumulate, &combine)
    }
}

impl<K, V, U> Default for BTree<K, V, U> {
    fn default() -> Self {
        BTree {
            root: Page::empty(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, U> fmt::Debug for BTree<K, V, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: PartialEq, V: PartialEq, U> PartialEq for BTree<K, V, U> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq, U> FromIterator<(K, V)> for BTree<K, V, U> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = BTree::default();
        for (k, v) in iter {
            tree = tree.updated(k, v);
        }
        tree
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq, U> Extend<(K, V)> for BTree<K, V, U> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            *self = self.updated(k, v);
        }
    }
}

impl<'a, K, V, U> IntoIterator for &'a BTree<K, V, U> {
    type Item = (&'a K, &'a V);
    type IntoIter = Entries<'a, K, V, U>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Clone, V: Clone, U> IntoIterator for BTree<K, V, U> {
    type Item = (K, V);
    type IntoIter = IntoEntries<K, V, U>;

    fn into_iter(self) -> Self::IntoIter {
        IntoEntries::new(self.root)
    }
}

// === Concurrent Wrapper ===

/// Thread-safe ordered map over an atomically swapped root page.
///
/// Readers never block: every read loads one consistent snapshot. Writers
/// never block either; they rebuild the path to the root functionally and
/// install it with a compare-and-swap, retrying from a fresh root if
/// another writer got there first.
pub struct BTreeMap<K, V, U = ()> {
    root: ArcSwap<Page<K, V, U>>,
}

impl<K, V> BTreeMap<K, V> {
    pub fn new() -> Self {
        BTreeMap {
            root: ArcSwap::new(Page::empty()),
        }
    }
}

impl<K, V, U> BTreeMap<K, V, U> {
    pub fn len(&self) -> usize {
        self.root.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time immutable view; unaffected by later writes.
    pub fn snapshot(&self) -> BTree<K, V, U> {
        BTree {
            root: self.root.load_full(),
        }
    }

    pub fn clear(&self) {
        self.root.store(Page::empty());
    }

    /// Entry iterator over a snapshot taken at the call.
    pub fn iter(&self) -> IntoEntries<K, V, U> {
        IntoEntries::new(self.root.load_full())
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq, U> BTreeMap<K, V, U> {
    pub fn get(&self, key: &K) -> Option<V> {
        Page::get(&self.root.load(), key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        Page::get(&self.root.load(), key).is_some()
    }

    /// Bind `key` to `value`, returning the previous value. Binding an
    /// equal value touches nothing: no new pages, no root swap.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        loop {
            let old = self.root.load_full();
            let (page, prev) = Page::updated(&old, &key, &value);
            if Arc::ptr_eq(&page, &old) {
                return prev;
            }
            let root = Page::balanced(page);
            debug_assert!(Page::well_formed(&root));
            let witness = self.root.compare_and_swap(&old, root);
            if Arc::ptr_eq(&witness, &old) {
                return prev;
            }
        }
    }

    /// Unbind `key`, returning the previous value. Absent keys touch
    /// nothing.
    pub fn remove(&self, key: &K) -> Option<V> {
        loop {
            let old = self.root.load_full();
            let (page, prev) = Page::removed(&old, key);
            if Arc::ptr_eq(&page, &old) {
                return prev;
            }
            let root = Page::balanced(page);
            debug_assert!(Page::well_formed(&root));
            let witness = self.root.compare_and_swap(&old, root);
            if Arc::ptr_eq(&witness, &old) {
                return prev;
            }
        }
    }

    /// Discard the first `n` entries in key order; clamps past the end.
    pub fn drop(&self, n: usize) {
        loop {
            let old = self.root.load_full();
            let page = Page::drop(&old, n);
            if Arc::ptr_eq(&page, &old) {
                return;
            }
            let root = Page::balanced(page);
            debug_assert!(Page::well_formed(&root));
            let witness = self.root.compare_and_swap(&old, root);
            if Arc::ptr_eq(&witness, &old) {
                return;
            }
        }
    }

    /// Keep only the first `n` entries in key order; clamps past the end.
    pub fn take(&self, n: usize) {
        loop {
            let old = self.root.load_full();
            let page = Page::take(&old, n);
            if Arc::ptr_eq(&page, &old) {
                return;
            }
            let root = Page::balanced(page);
            debug_assert!(Page::well_formed(&root));
            let witness = self.root.compare_and_swap(&old, root);
            if Arc::ptr_eq(&witness, &old) {
                return;
            }
        }
    }

    pub fn first(&self) -> Option<(K, V)> {
        Page::first(&self.root.load()).map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn last(&self) -> Option<(K, V)> {
        Page::last(&self.root.load()).map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn next_entry(&self, key: &K) -> Option<(K, V)> {
        Page::next_entry(&self.root.load(), key).map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn previous_entry(&self, key: &K) -> Option<(K, V)> {
        Page::previous_entry(&self.root.load(), key).map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn index_of(&self, key: &K) -> Option<usize> {
        Page::index_of(&self.root.load(), key)
    }

    pub fn get_index(&self, index: usize) -> Option<(K, V)> {
        Page::get_index(&self.root.load(), index).map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn check_invariants(&self) -> bool {
        Page::well_formed(&self.root.load())
    }
}

impl<K, V, U: Clone> BTreeMap<K, V, U> {
    /// Fold over a snapshot's values in key order; see [`BTree::reduced`].
    pub fn reduced<A, C>(&self, identity: U, accumulate: A, combine: C) -> U
    where
        A: Fn(&U, &V) -> U,
        C: Fn(&U, &U) -> U,
    {
        Page::reduced(&self.root.load(), &identity, &accumulate, &combine)
    }
}

impl<K, V, U> Default for BTreeMap<K, V, U> {
    fn default() -> Self {
        BTreeMap {
            root: ArcSwap::new(Page::empty()),
        }
    }
}

impl<K: fmt::Debug + Clone, V: fmt::Debug + Clone, U> fmt::Debug for BTreeMap<K, V, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, U> From<BTree<K, V, U>> for BTreeMap<K, V, U> {
    fn from(tree: BTree<K, V, U>) -> Self {
        BTreeMap {
            root: ArcSwap::new(tree.root),
        }
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq, U> FromIterator<(K, V)> for BTreeMap<K, V, U> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        BTree::from_iter(iter).into()
    }
}
