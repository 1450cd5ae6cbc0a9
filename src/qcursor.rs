//! Spatial traversal: snapshot cursors and rectangle-filtered queries

use std::sync::Arc;

use crate::interval::{Rect, Tile};
use crate::qpage::{QBranch, QLeaf, QPage};

// === Cursor ===

/// Bidirectional cursor over a spatial snapshot, in page order. Page order
/// is deterministic for a given snapshot but carries no geometric meaning.
pub struct QCursor<'a, K, V, U> {
    root: &'a QPage<K, V, U>,
    stack: Vec<(&'a QBranch<K, V, U>, usize)>,
    leaf: &'a QLeaf<K, V, U>,
    slot: usize,
    index: usize,
    len: usize,
}

impl<'a, K, V, U> QCursor<'a, K, V, U> {
    pub(crate) fn new(root: &'a QPage<K, V, U>) -> Self {
        Self::at(root, 0)
    }

    pub(crate) fn at(root: &'a QPage<K, V, U>, index: usize) -> Self {
        let mut cursor = QCursor {
            root,
            stack: Vec::new(),
            leaf: Self::leftmost(root),
            slot: 0,
            index: 0,
            len: root.len(),
        };
        cursor.seek(index);
        cursor
    }

    fn leftmost(mut page: &'a QPage<K, V, U>) -> &'a QLeaf<K, V, U> {
        loop {
            match page {
                QPage::Leaf(l) => return l,
                QPage::Branch(b) => page = &b.children[0],
            }
        }
    }

    fn seek(&mut self, index: usize) {
        let index = index.min(self.len);
        self.stack.clear();
        self.index = index;
        let mut node = self.root;
        let mut target = index;
        loop {
            match node {
                QPage::Leaf(l) => {
                    self.leaf = l;
                    self.slot = target;
                    return;
                }
                QPage::Branch(b) => {
                    let mut j = b.sizes.partition_point(|&s| s <= target);
                    if j == b.children.len() {
                        j -= 1;
                    }
                    let before = if j > 0 { b.sizes[j - 1] } else { 0 };
                    self.stack.push((b, j));
                    target -= before;
                    node = &b.children[j];
                }
            }
        }
    }

    pub fn has_next(&self) -> bool {
        self.index < self.len
    }

    pub fn has_previous(&self) -> bool {
        self.index > 0
    }

    pub fn next_index(&self) -> usize {
        self.index
    }

    pub fn previous_index(&self) -> Option<usize> {
        self.index.checked_sub(1)
    }

    pub fn skip(&mut self, n: usize) {
        self.seek(self.index.saturating_add(n));
    }

    pub fn next(&mut self) -> Option<(&'a K, &'a Rect, &'a V)> {
        if self.index >= self.len {
            return None;
        }
        if self.slot >= self.leaf.slots.len() {
            self.advance_leaf();
        }
        let s = &self.leaf.slots[self.slot];
        self.slot += 1;
        self.index += 1;
        Some((&s.key, &s.rect, &s.value))
    }

    pub fn previous(&mut self) -> Option<(&'a K, &'a Rect, &'a V)> {
        if self.index == 0 {
            return None;
        }
        if self.slot == 0 {
            self.retreat_leaf();
        }
        self.slot -= 1;
        self.index -= 1;
        let s = &self.leaf.slots[self.slot];
        Some((&s.key, &s.rect, &s.value))
    }

    fn advance_leaf(&mut self) {
        while let Some(&(b, j)) = self.stack.last() {
            if j + 1 < b.children.len() {
                self.stack.last_mut().expect("just checked").1 = j + 1;
                self.descend_first(&b.children[j + 1]);
                return;
            }
            self.stack.pop();
        }
        debug_assert!(false, "advanced past the last leaf");
    }

    fn retreat_leaf(&mut self) {
        while let Some(&(b, j)) = self.stack.last() {
            if j > 0 {
                self.stack.last_mut().expect("just checked").1 = j - 1;
                self.descend_last(&b.children[j - 1]);
                return;
            }
            self.stack.pop();
        }
        debug_assert!(false, "retreated before the first leaf");
    }

    fn descend_first(&mut self, mut node: &'a QPage<K, V, U>) {
        loop {
            match node {
                QPage::Leaf(l) => {
                    self.leaf = l;
                    self.slot = 0;
                    return;
                }
                QPage::Branch(b) => {
                    self.stack.push((b, 0));
                    node = &b.children[0];
                }
            }
        }
    }

    fn descend_last(&mut self, mut node: &'a QPage<K, V, U>) {
        loop {
            match node {
                QPage::Leaf(l) => {
                    self.leaf = l;
                    self.slot = l.slots.len();
                    return;
                }
                QPage::Branch(b) => {
                    let last = b.children.len() - 1;
                    self.stack.push((b, last));
                    node = &b.children[last];
                }
            }
        }
    }
}

// === Unfiltered Iterators ===

/// Forward/reverse iterator over every entry of a spatial snapshot.
pub struct QEntries<'a, K, V, U> {
    front: QCursor<'a, K, V, U>,
    back: QCursor<'a, K, V, U>,
}

impl<'a, K, V, U> QEntries<'a, K, V, U> {
    pub(crate) fn new(root: &'a QPage<K, V, U>) -> Self {
        QEntries {
            front: QCursor::at(root, 0),
            back: QCursor::at(root, root.len()),
        }
    }
}

impl<'a, K, V, U> Iterator for QEntries<'a, K, V, U> {
    type Item = (&'a K, &'a Rect, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.front.index >= self.back.index {
            return None;
        }
        self.front.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back.index - self.front.index;
        (remaining, Some(remaining))
    }
}

impl<K, V, U> DoubleEndedIterator for QEntries<'_, K, V, U> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front.index >= self.back.index {
            return None;
        }
        self.back.previous()
    }
}

impl<K, V, U> ExactSizeIterator for QEntries<'_, K, V, U> {}

/// Owning counterpart handed out by the concurrent map.
pub struct IntoQEntries<K, V, U> {
    stack: Vec<(Arc<QPage<K, V, U>>, usize)>,
    remaining: usize,
}

impl<K, V, U> IntoQEntries<K, V, U> {
    pub(crate) fn new(root: Arc<QPage<K, V, U>>) -> Self {
        let remaining = root.len();
        IntoQEntries {
            stack: vec![(root, 0)],
            remaining,
        }
    }
}

impl<K: Clone, V: Clone, U> Iterator for IntoQEntries<K, V, U> {
    type Item = (K, Rect, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (page, idx) = match self.stack.last() {
                None => return None,
                Some((p, i)) => (p.clone(), *i),
            };
            match &*page {
                QPage::Leaf(l) => {
                    if idx < l.slots.len() {
                        self.stack.last_mut().expect("non-empty stack").1 += 1;
                        self.remaining -= 1;
                        let s = &l.slots[idx];
                        return Some((s.key.clone(), s.rect, s.value.clone()));
                    }
                    self.stack.pop();
                }
                QPage::Branch(b) => {
                    if idx < b.children.len() {
                        self.stack.last_mut().expect("non-empty stack").1 += 1;
                        self.stack.push((b.children[idx].clone(), 0));
                    } else {
                        self.stack.pop();
                    }
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: Clone, V: Clone, U> ExactSizeIterator for IntoQEntries<K, V, U> {}

// === Filtered Query ===

/// Lazy rectangle query over a snapshot. Branches are descended only when
/// their covering tile intersects the query's tile; entries are yielded
/// only when their exact rectangle intersects the query rectangle, so
/// nothing outside the query is ever materialized.
pub struct Query<'a, K, V, U> {
    root: &'a QPage<K, V, U>,
    rect: Rect,
    tile: Tile,
    stack: Vec<(&'a QPage<K, V, U>, usize)>,
}

impl<'a, K, V, U> Query<'a, K, V, U> {
    pub(crate) fn new(root: &'a QPage<K, V, U>, rect: Rect) -> Self {
        Query {
            root,
            rect,
            tile: rect.tile(),
            stack: vec![(root, 0)],
        }
    }

    /// Rewind to the first match; the query is re-iterable, not resumable.
    pub fn restart(&mut self) {
        self.stack.clear();
        self.stack.push((self.root, 0));
    }
}

impl<'a, K, V, U> Iterator for Query<'a, K, V, U> {
    type Item = (&'a K, &'a Rect, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let &(page, idx) = self.stack.last()?;
            match page {
                QPage::Leaf(l) => {
                    if idx < l.slots.len() {
                        self.stack.last_mut().expect("non-empty stack").1 += 1;
                        let s = &l.slots[idx];
                        if s.rect.intersects(&self.rect) {
                            return Some((&s.key, &s.rect, &s.value));
                        }
                    } else {
                        self.stack.pop();
                    }
                }
                QPage::Branch(b) => {
                    if idx < b.children.len() {
                        self.stack.last_mut().expect("non-empty stack").1 += 1;
                        if b.tiles[idx].intersects(self.tile) {
                            self.stack.push((&b.children[idx], 0));
                        }
                    } else {
                        self.stack.pop();
                    }
                }
            }
        }
    }
}

impl<K, V, U> std::iter::FusedIterator for Query<'_, K, V, U> {}

/// Owning rectangle query handed out by the concurrent map.
pub struct IntoQuery<K, V, U> {
    root: Arc<QPage<K, V, U>>,
    rect: Rect,
    tile: Tile,
    stack: Vec<(Arc<QPage<K, V, U>>, usize)>,
}

impl<K, V, U> IntoQuery<K, V, U> {
    pub(crate) fn new(root: Arc<QPage<K, V, U>>, rect: Rect) -> Self {
        IntoQuery {
            stack: vec![(root.clone(), 0)],
            rect,
            tile: rect.tile(),
            root,
        }
    }

    /// Rewind to the first match against the same snapshot.
    pub fn restart(&mut self) {
        self.stack.clear();
        self.stack.push((self.root.clone(), 0));
    }
}

impl<K: Clone, V: Clone, U> Iterator for IntoQuery<K, V, U> {
    type Item = (K, Rect, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (page, idx) = match self.stack.last() {
                None => return None,
                Some((p, i)) => (p.clone(), *i),
            };
            match &*page {
                QPage::Leaf(l) => {
                    if idx < l.slots.len() {
                        self.stack.last_mut().expect("non-empty stack").1 += 1;
                        let s = &l.slots[idx];
                        if s.rect.intersects(&self.rect) {
                            return Some((s.key.clone(), s.rect, s.value.clone()));
                        }
                    } else {
                        self.stack.pop();
                    }
                }
                QPage::Branch(b) => {
                    if idx < b.children.len() {
                        self.stack.last_mut().expect("non-empty stack").1 += 1;
                        if b.tiles[idx].intersects(self.tile) {
                            self.stack.push((b.children[idx].clone(), 0));
                        }
                    } else {
                        self.stack.pop();
                    }
                }
            }
        }
    }
}

impl<K: Clone, V: Clone, U> std::iter::FusedIterator for IntoQuery<K, V, U> {}
