// ── pwsafe3 / handle ─────────────────────────────────────────────────────────
//
// Non-owning back-reference from a collection or entry to its owning
// Document (§9, §10.4). The teacher crate avoids reference cycles by
// addressing relatives through a `String` id resolved back through the
// owning service's map (e.g. `parent_uuid: Option<String>` in
// `KeePassGroup`); this crate's collections are plain vectors rather than
// id-keyed maps, so the equivalent here is a small shared cell rather than
// an id lookup. Either way nothing holds a strong reference to the
// Document's data — only to two shared flags — so no cycle is possible.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug)]
struct Inner {
    has_changed: Cell<bool>,
    read_only: Cell<bool>,
}

/// A cheap, `Clone`-able handle shared between a Document and every
/// collection/entry it owns. Carries exactly two bits of shared state:
/// whether the owning document has unsaved changes, and whether it is
/// read-only. Mutating operations on a collection or entry call
/// `mark_changed()`; the Document is the only thing that ever clears it.
#[derive(Debug, Clone)]
pub struct DocHandle {
    inner: Rc<Inner>,
}

impl DocHandle {
    pub fn new(read_only: bool) -> Self {
        DocHandle {
            inner: Rc::new(Inner {
                has_changed: Cell::new(false),
                read_only: Cell::new(read_only),
            }),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only.get()
    }

    pub fn set_read_only(&self, value: bool) {
        self.inner.read_only.set(value);
    }

    /// Signals that something reachable from the Document changed. A
    /// no-op bookkeeping-wise beyond setting the flag: propagation is
    /// "upward" only in the sense that every collection/entry shares the
    /// same cell, so there is nothing further to walk.
    pub fn mark_changed(&self) {
        self.inner.has_changed.set(true);
    }

    pub fn has_changed(&self) -> bool {
        self.inner.has_changed.get()
    }

    pub fn clear_changed(&self) {
        self.inner.has_changed.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_handles_observe_each_others_changes() {
        let a = DocHandle::new(false);
        let b = a.clone();
        assert!(!b.has_changed());
        a.mark_changed();
        assert!(b.has_changed());
    }

    #[test]
    fn clear_changed_is_visible_to_clones() {
        let a = DocHandle::new(false);
        let b = a.clone();
        a.mark_changed();
        b.clear_changed();
        assert!(!a.has_changed());
    }
}
