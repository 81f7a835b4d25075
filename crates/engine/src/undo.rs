//! Undo/redo with caret anchoring
//!
//! Wraps a `yrs` undo manager that tracks only the local identity's
//! transactions. Each stack item is stamped with a sequence number when it
//! is pushed; the coordinator keeps a mirror of both stacks mapping those
//! numbers to the caret selection current at push time, and reports which
//! selection to restore when an item is popped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use blocksync_protocol::Selection;
use yrs::undo::{EventKind, UndoManager};
use yrs::{ArrayRef, Origin};

use crate::document::ReplicatedDoc;
use crate::origin::ChangeOrigin;

/// Caret selection shared between the session and the undo callbacks
pub type SharedCaret = Arc<Mutex<Option<Selection>>>;

type Anchor = (u64, Option<Selection>);

#[derive(Debug, Default)]
struct AnchorBook {
    next_seq: u64,
    undo: Vec<Anchor>,
    redo: Vec<Anchor>,
    /// Set while a redo runs, so the undo item it pushes keeps the redo stack
    redoing: bool,
    /// Selection produced by the last pop
    restore: Option<Selection>,
}

impl AnchorBook {
    fn truncate_at(stack: &mut Vec<Anchor>, seq: u64) -> Option<Anchor> {
        let position = stack.iter().position(|(entry, _)| *entry == seq)?;
        let popped = stack.drain(position..).next();
        popped
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Restorable selection: one with a start caret
fn restorable(selection: Option<Selection>) -> Option<Selection> {
    selection.filter(Selection::has_start)
}

pub struct UndoCoordinator {
    manager: UndoManager<u64>,
    book: Arc<Mutex<AnchorBook>>,
    _added: yrs::Subscription,
    _popped: yrs::Subscription,
}

impl UndoCoordinator {
    /// Track `identity`'s changes to the document roots
    pub fn new(doc: &ReplicatedDoc, identity: &str, caret: SharedCaret) -> Self {
        let [blocks, meta, comments] = doc.roots();
        let mut manager = UndoManager::<u64>::new(doc.doc(), &blocks);
        manager.expand_scope(&meta);
        manager.expand_scope(&comments);
        if let Some(origin) = ChangeOrigin::Local(identity.to_string()).to_origin() {
            manager.include_origin(origin);
        }

        let book = Arc::new(Mutex::new(AnchorBook::default()));

        let added_book = Arc::clone(&book);
        let added = manager.observe_item_added(move |_, event| {
            let mut book = lock(&added_book);
            let seq = book.next_seq;
            book.next_seq += 1;
            *event.meta_mut() = seq;

            // A fresh edit or a redo pushes onto the undo stack and reports
            // `Redo`; an undo pushes onto the redo stack and reports `Undo`.
            let selection = lock(&caret).clone();
            match event.kind() {
                EventKind::Redo => {
                    if !book.redoing {
                        book.redo.clear();
                    }
                    book.undo.push((seq, selection));
                }
                EventKind::Undo => book.redo.push((seq, selection)),
            }
        });

        let popped_book = Arc::clone(&book);
        let popped = manager.observe_item_popped(move |_, event| {
            let mut book = lock(&popped_book);
            let seq = *event.meta_mut();
            let restore = match event.kind() {
                EventKind::Undo => {
                    AnchorBook::truncate_at(&mut book.undo, seq);
                    book.undo.last().and_then(|(_, selection)| selection.clone())
                }
                EventKind::Redo => {
                    AnchorBook::truncate_at(&mut book.redo, seq).and_then(|(_, selection)| selection)
                }
            };
            book.restore = restorable(restore);
        });

        Self {
            manager,
            book,
            _added: added,
            _popped: popped,
        }
    }

    /// Origin the manager stamps on its own transactions
    pub fn origin(&self) -> Origin {
        self.manager.as_origin()
    }

    /// Bring order lists into the tracked scope
    pub fn track(&mut self, arrays: &[ArrayRef]) {
        for array in arrays {
            self.manager.expand_scope(array);
        }
    }

    /// Close the current stack item so the next change starts a new one
    pub fn stop_capturing(&mut self) {
        self.manager.reset();
    }

    /// Undo the latest item; returns the selection to restore
    pub fn undo(&mut self) -> Option<Selection> {
        lock(&self.book).restore = None;
        let changed = self.manager.undo_blocking();
        tracing::debug!(changed, "undo");
        self.settle()
    }

    /// Redo the latest undone item; returns the selection to restore
    pub fn redo(&mut self) -> Option<Selection> {
        {
            let mut book = lock(&self.book);
            book.restore = None;
            book.redoing = true;
        }
        let changed = self.manager.redo_blocking();
        lock(&self.book).redoing = false;
        tracing::debug!(changed, "redo");
        self.settle()
    }

    /// More than the baseline item is on the undo stack
    pub fn has_undo(&self) -> bool {
        lock(&self.book).undo.len() > 1
    }

    pub fn has_redo(&self) -> bool {
        !lock(&self.book).redo.is_empty()
    }

    fn settle(&self) -> Option<Selection> {
        let mut book = lock(&self.book);
        // Items the manager discarded without an event leave the mirror.
        if !self.manager.can_undo() {
            book.undo.clear();
        }
        if !self.manager.can_redo() {
            book.redo.clear();
        }
        book.restore.take()
    }
}

impl std::fmt::Debug for UndoCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let book = lock(&self.book);
        f.debug_struct("UndoCoordinator")
            .field("undo", &book.undo.len())
            .field("redo", &book.redo.len())
            .finish_non_exhaustive()
    }
}
