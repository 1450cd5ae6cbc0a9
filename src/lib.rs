//! Persistent ordered and spatial index trees with lock-free snapshots
//!
//! Both indexes are built from the same design: immutable copy-on-write
//! pages behind an atomically swapped root reference. Readers load one
//! consistent root and never synchronize; writers rebuild the path to the
//! root functionally and install it with a compare-and-swap, retrying on
//! contention. Old roots stay valid for as long as anything holds them,
//! which is all a snapshot is.
//!
//! - [`BTree`] / [`BTreeMap`]: ordered key/value index with rank access,
//!   range truncation, and cached subtree folds.
//! - [`QTree`] / [`QTreeMap`]: spatial key/rectangle/value index over
//!   dyadic [`Span`] covers, with rectangle-filtered queries.

mod btree;
mod cursor;
mod interval;
mod page;
mod qcursor;
mod qpage;
mod qtree;

pub use btree::{BTree, BTreeMap};
pub use cursor::{Cursor, Entries, IntoEntries, Keys, Values};
pub use interval::{Rect, Span, Tile};
pub use qcursor::{IntoQEntries, IntoQuery, QCursor, QEntries, Query};
pub use qtree::{QTree, QTreeMap};

/// Maximum slots or children per page (tuned for cache line)
pub(crate) const MAX_ARITY: usize = 16;

/// Minimum occupancy for non-root pages
pub(crate) const MIN_ARITY: usize = MAX_ARITY / 4;
