//! Spatial index: persistent `QTree` values and the lock-free `QTreeMap`

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::interval::Rect;
use crate::qcursor::{IntoQEntries, IntoQuery, QCursor, QEntries, Query};
use crate::qpage::QPage;

// === Persistent Value ===

/// An immutable spatial map keyed by `(key, rectangle)` pairs. Mutations
/// return new trees sharing unchanged pages with the original.
pub struct QTree<K, V, U = ()> {
    pub(crate) root: Arc<QPage<K, V, U>>,
}

impl<K, V, U> Clone for QTree<K, V, U> {
    fn clone(&self) -> Self {
        QTree {
            root: self.root.clone(),
        }
    }
}

impl<K, V> QTree<K, V> {
    pub fn new() -> Self {
        QTree {
            root: QPage::empty(),
        }
    }
}

impl<K, V, U> QTree<K, V, U> {
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry, in page order.
    pub fn iter(&self) -> QEntries<'_, K, V, U> {
        QEntries::new(&self.root)
    }

    pub fn cursor(&self) -> QCursor<'_, K, V, U> {
        QCursor::new(&self.root)
    }

    pub fn cursor_at(&self, index: usize) -> QCursor<'_, K, V, U> {
        QCursor::at(&self.root, index)
    }

    /// Entries whose rectangle intersects `rect`, lazily.
    pub fn query(&self, rect: Rect) -> Query<'_, K, V, U> {
        Query::new(&self.root, rect)
    }
}

impl<K: Ord, V, U> QTree<K, V, U> {
    pub fn get(&self, key: &K, rect: &Rect) -> Option<&V> {
        QPage::get(&self.root, key, rect)
    }

    pub fn contains_key(&self, key: &K, rect: &Rect) -> bool {
        self.get(key, rect).is_some()
    }

    /// Structural health check used by tests and debug assertions.
    pub fn check_invariants(&self) -> bool {
        QPage::well_formed(&self.root)
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq, U> QTree<K, V, U> {
    /// New tree with `(key, rect)` bound to `value`.
    pub fn updated(&self, key: K, rect: Rect, value: V) -> Self {
        let (page, _) = QPage::updated(&self.root, &key, &rect, &value);
        let root = QPage::balanced(page);
        debug_assert!(QPage::well_formed(&root));
        QTree { root }
    }

    /// New tree without the `(key, rect)` entry.
    pub fn removed(&self, key: &K, rect: &Rect) -> Self {
        let (page, _) = QPage::removed(&self.root, key, rect);
        let root = QPage::balanced(page);
        debug_assert!(QPage::well_formed(&root));
        QTree { root }
    }

    /// Relocate an entry: remove it at `old_rect`, then insert it at
    /// `new_rect` with `value`. The two steps rebalance independently.
    pub fn moved(&self, key: &K, old_rect: &Rect, new_rect: Rect, value: V) -> Self {
        self.removed(key, old_rect)
            .updated(key.clone(), new_rect, value)
    }
}

impl<K, V, U: Clone> QTree<K, V, U> {
    /// Fold over all values; see [`crate::BTree::reduced`].
    pub fn reduced<A, C>(&self, identity: U, accumulate: A, combine: C) -> U
    where
        A: Fn(&U, &V) -> U,
        C: Fn(&U, &U) -> U,
    {
        QPage::reduced(&self.root, &identity, &accumulate, &combine)
    }
}

impl<K, V, U> Default for QTree<K, V, U> {
    fn default() -> Self {
        QTree {
            root: QPage::empty(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, U> fmt::Debug for QTree<K, V, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq, U> FromIterator<(K, Rect, V)> for QTree<K, V, U> {
    fn from_iter<I: IntoIterator<Item = (K, Rect, V)>>(iter: I) -> Self {
        let mut tree = QTree::default();
        for (k, r, v) in iter {
            tree = tree.updated(k, r, v);
        }
        tree
    }
}

impl<'a, K, V, U> IntoIterator for &'a QTree<K, V, U> {
    type Item = (&'a K, &'a Rect, &'a V);
    type IntoIter = QEntries<'a, K, V, U>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// === Concurrent Wrapper ===

/// Thread-safe spatial map over an atomically swapped root page, with the
/// same read/write discipline as [`crate::BTreeMap`].
pub struct QTreeMap<K, V, U = ()> {
    root: ArcSwap<QPage<K, V, U>>,
}

impl<K, V> QTreeMap<K, V> {
    pub fn new() -> Self {
        QTreeMap {
            root: ArcSwap::new(QPage::empty()),
        }
    }
}

impl<K, V, U> QTreeMap<K, V, U> {
    pub fn len(&self) -> usize {
        self.root.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time immutable view; unaffected by later writes.
    pub fn snapshot(&self) -> QTree<K, V, U> {
        QTree {
            root: self.root.load_full(),
        }
    }

    pub fn clear(&self) {
        self.root.store(QPage::empty());
    }

    /// Entry iterator over a snapshot taken at the call.
    pub fn iter(&self) -> IntoQEntries<K, V, U> {
        IntoQEntries::new(self.root.load_full())
    }

    /// Lazy rectangle query over a snapshot taken at the call.
    pub fn query(&self, rect: Rect) -> IntoQuery<K, V, U> {
        IntoQuery::new(self.root.load_full(), rect)
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq, U> QTreeMap<K, V, U> {
    pub fn get(&self, key: &K, rect: &Rect) -> Option<V> {
        QPage::get(&self.root.load(), key, rect).cloned()
    }

    pub fn contains_key(&self, key: &K, rect: &Rect) -> bool {
        QPage::get(&self.root.load(), key, rect).is_some()
    }

    /// Bind `(key, rect)` to `value`, returning the previous value. An
    /// equal value touches nothing: no new pages, no root swap.
    pub fn put(&self, key: K, rect: Rect, value: V) -> Option<V> {
        loop {
            let old = self.root.load_full();
            let (page, prev) = QPage::updated(&old, &key, &rect, &value);
            if Arc::ptr_eq(&page, &old) {
                return prev;
            }
            let root = QPage::balanced(page);
            debug_assert!(QPage::well_formed(&root));
            let witness = self.root.compare_and_swap(&old, root);
            if Arc::ptr_eq(&witness, &old) {
                return prev;
            }
        }
    }

    /// Unbind `(key, rect)`, returning the previous value.
    pub fn remove(&self, key: &K, rect: &Rect) -> Option<V> {
        loop {
            let old = self.root.load_full();
            let (page, prev) = QPage::removed(&old, key, rect);
            if Arc::ptr_eq(&page, &old) {
                return prev;
            }
            let root = QPage::balanced(page);
            debug_assert!(QPage::well_formed(&root));
            let witness = self.root.compare_and_swap(&old, root);
            if Arc::ptr_eq(&witness, &old) {
                return prev;
            }
        }
    }

    /// Relocate an entry in one atomic step: readers observe either the
    /// old position or the new one, never both and never neither. Returns
    /// the value previously stored at `(key, old_rect)`.
    pub fn move_entry(
        &self,
        key: &K,
        old_rect: &Rect,
        new_rect: Rect,
        value: V,
    ) -> Option<V> {
        loop {
            let old = self.root.load_full();
            let (page, prev) = QPage::removed(&old, key, old_rect);
            let page = QPage::balanced(page);
            let (page, _) = QPage::updated(&page, key, &new_rect, &value);
            let root = QPage::balanced(page);
            if Arc::ptr_eq(&root, &old) {
                return prev;
            }
            debug_assert!(QPage::well_formed(&root));
            let witness = self.root.compare_and_swap(&old, root);
            if Arc::ptr_eq(&witness, &old) {
                return prev;
            }
        }
    }

    pub fn check_invariants(&self) -> bool {
        QPage::well_formed(&self.root.load())
    }
}

impl<K, V, U: Clone> QTreeMap<K, V, U> {
    /// Fold over a snapshot's values; see [`crate::BTree::reduced`].
    pub fn reduced<A, C>(&self, identity: U, accumulate: A, combine: C) -> U
    where
        A: Fn(&U, &V) -> U,
        C: Fn(&U, &U) -> U,
    {
        QPage::reduced(&self.root.load(), &identity, &accumulate, &combine)
    }
}

impl<K, V, U> Default for QTreeMap<K, V, U> {
    fn default() -> Self {
        QTreeMap {
            root: ArcSwap::new(QPage::empty()),
        }
    }
}

impl<K: fmt::Debug + Clone, V: fmt::Debug + Clone, U> fmt::Debug for QTreeMap<K, V, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K, V, U> From<QTree<K, V, U>> for QTreeMap<K, V, U> {
    fn from(tree: QTree<K, V, U>) -> Self {
        QTreeMap {
            root: ArcSwap::new(tree.root),
        }
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq, U> FromIterator<(K, Rect, V)> for QTreeMap<K, V, U> {
    fn from_iter<I: IntoIterator<Item = (K, Rect, V)>>(iter: I) -> Self {
        QTree::from_iter(iter).into()
    }
}
