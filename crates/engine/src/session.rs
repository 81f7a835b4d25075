//! Sync protocol state machine
//!
//! A [`SyncSession`] owns one replicated document and the connection state
//! of one client. It consumes [`DocMessage`]s and queues the envelopes the
//! transport should deliver; it never performs I/O itself.
//!
//! Handshake: a connecting peer broadcasts `sync1` with its state vector.
//! Every peer answers with a `sync2` carrying the updates the sender lacks,
//! plus its own `sync1` (flagged as a reply) so the exchange is symmetric.
//! Merging a `sync2` brings the connecting peer `On`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, PoisonError};

use blocksync_protocol::{DocMessage, Envelope, Selection, SyncMessage};

use crate::codec;
use crate::config::PendingEdits;
use crate::document::ReplicatedDoc;
use crate::error::{SyncError, SyncResult};
use crate::listeners::{Listeners, Subscription};
use crate::model::Document;
use crate::origin::ChangeOrigin;
use crate::undo::{SharedCaret, UndoCoordinator};

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Off,
    /// Handshake outstanding
    Connecting,
    On,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Connecting => "connecting",
            Self::On => "on",
        })
    }
}

/// Undo availability, derived from the connection state
///
/// The coordinator is built when the session turns `On` and torn down on
/// disconnect.
enum UndoPhase {
    Dormant,
    Active(UndoCoordinator),
}

impl fmt::Debug for UndoPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dormant => f.write_str("Dormant"),
            Self::Active(undo) => f.debug_tuple("Active").field(undo).finish(),
        }
    }
}

#[derive(Debug)]
pub struct SyncSession {
    identity: String,
    doc: ReplicatedDoc,
    state: ConnectionState,
    pending_edits: PendingEdits,
    undo: UndoPhase,
    caret: SharedCaret,
    outgoing: VecDeque<Envelope>,
    remote_changes: Listeners<Document>,
    state_changes: Listeners<ConnectionState>,
}

impl SyncSession {
    /// Create a session with a fresh random identity
    pub fn new() -> SyncResult<Self> {
        Self::with_identity(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_identity(identity: impl Into<String>) -> SyncResult<Self> {
        Ok(Self {
            identity: identity.into(),
            doc: ReplicatedDoc::new()?,
            state: ConnectionState::Off,
            pending_edits: PendingEdits::default(),
            undo: UndoPhase::Dormant,
            caret: SharedCaret::default(),
            outgoing: VecDeque::new(),
            remote_changes: Listeners::new(),
            state_changes: Listeners::new(),
        })
    }

    #[must_use]
    pub fn with_pending_edits(mut self, policy: PendingEdits) -> Self {
        self.pending_edits = policy;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Decode the current replicated document
    pub fn content(&self) -> Document {
        self.doc.content()
    }

    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.state_vector()
    }

    /// Share `initial` as the first peer of a channel
    pub fn start_sharing(&mut self, initial: &Document) -> SyncResult<()> {
        self.require_not_on("start_sharing")?;
        self.set_state(ConnectionState::On);
        self.commit_local(initial);
        self.flush();
        Ok(())
    }

    /// Broadcast a handshake request to every peer
    pub fn connect(&mut self) -> SyncResult<()> {
        self.connect_to(None, false)
    }

    /// Send a handshake request, optionally to a single peer
    pub fn connect_to(&mut self, dest: Option<&str>, is_reply: bool) -> SyncResult<()> {
        self.require_not_on("connect")?;
        self.set_state(ConnectionState::Connecting);
        self.queue_sync1(dest, is_reply);
        Ok(())
    }

    /// Apply an edit made in the editor
    ///
    /// Returns whether the edit reached the replicated document. Before the
    /// session is `On` the pending-edits policy decides: retained edits are
    /// stored locally and reach peers through the handshake.
    pub fn apply_local_change(&mut self, content: &Document) -> SyncResult<bool> {
        if self.state != ConnectionState::On && self.pending_edits == PendingEdits::Discard {
            tracing::debug!(state = %self.state, "local change discarded before handshake");
            return Ok(false);
        }
        self.commit_local(content);
        self.flush();
        Ok(true)
    }

    /// Handle a document message from the transport
    ///
    /// Messages for another protocol, another peer, or from this session
    /// itself are dropped. A payload the CRDT layer cannot decode fails
    /// with [`SyncError::MalformedPayload`] and leaves the document as is.
    pub fn receive(&mut self, message: &DocMessage) -> SyncResult<()> {
        if !message.has_expected_protocol() {
            tracing::debug!(protocol = %message.protocol, "dropping message for another protocol");
            return Ok(());
        }
        if message.origin == self.identity {
            tracing::debug!("dropping loopback message");
            return Ok(());
        }
        if !message.is_addressed_to(&self.identity) {
            tracing::debug!(
                kind = message.payload.kind(),
                dest = ?message.dest,
                "dropping message addressed to another peer"
            );
            return Ok(());
        }

        let sender = message.origin.as_str();
        match &message.payload {
            SyncMessage::SyncStep1 { state_vector } => {
                let update = self.doc.encode_diff(state_vector)?;
                self.send(DocMessage::new(&self.identity, SyncMessage::SyncStep2 { update }).to_peer(sender));
                if !message.is_reply {
                    self.queue_sync1(Some(sender), true);
                }
            }
            SyncMessage::SyncStep2 { update } => {
                if self.state == ConnectionState::Off {
                    tracing::debug!(from = %sender, "ignoring sync2 while off");
                    return Ok(());
                }
                self.doc
                    .apply_update(update, &ChangeOrigin::Remote(sender.to_string()))?;
                self.set_state(ConnectionState::On);
            }
            SyncMessage::Update { update } => {
                self.doc
                    .apply_update(update, &ChangeOrigin::Remote(sender.to_string()))?;
            }
        }
        self.flush();
        Ok(())
    }

    /// Return to `Off` immediately, whatever the current state
    pub fn disconnect(&mut self) {
        self.set_state(ConnectionState::Off);
    }

    /// Undo the latest local change; returns the selection to restore
    pub fn undo(&mut self) -> Option<Selection> {
        let selection = match &mut self.undo {
            UndoPhase::Active(undo) if undo.has_undo() => undo.undo(),
            _ => return None,
        };
        self.flush();
        selection
    }

    /// Redo the latest undone change; returns the selection to restore
    pub fn redo(&mut self) -> Option<Selection> {
        let selection = match &mut self.undo {
            UndoPhase::Active(undo) if undo.has_redo() => undo.redo(),
            _ => return None,
        };
        self.flush();
        selection
    }

    pub fn has_undo(&self) -> bool {
        matches!(&self.undo, UndoPhase::Active(undo) if undo.has_undo())
    }

    pub fn has_redo(&self) -> bool {
        matches!(&self.undo, UndoPhase::Active(undo) if undo.has_redo())
    }

    /// Record the editor's caret, anchored to the next undo item
    pub fn set_caret(&self, selection: Option<Selection>) {
        *self.caret.lock().unwrap_or_else(PoisonError::into_inner) = selection;
    }

    /// Drain the envelopes queued for the transport
    pub fn take_outgoing(&mut self) -> Vec<Envelope> {
        self.outgoing.drain(..).collect()
    }

    /// Put envelopes the transport did not accept back at the head of the queue
    pub fn requeue_outgoing(&mut self, envelopes: impl IntoIterator<Item = Envelope>) {
        let newer = std::mem::take(&mut self.outgoing);
        self.outgoing.extend(envelopes);
        self.outgoing.extend(newer);
    }

    /// Called with the decoded document after every non-local change
    pub fn on_remote_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Document) + Send + Sync + 'static,
    {
        self.remote_changes.subscribe(callback)
    }

    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.state_changes.subscribe(callback)
    }

    fn require_not_on(&self, operation: &'static str) -> SyncResult<()> {
        if self.state == ConnectionState::On {
            return Err(SyncError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::info!(identity = %self.identity, from = %self.state, to = %next, "connection state changed");
        self.state = next;

        match next {
            ConnectionState::On if matches!(self.undo, UndoPhase::Dormant) => {
                self.undo = UndoPhase::Active(UndoCoordinator::new(
                    &self.doc,
                    &self.identity,
                    Arc::clone(&self.caret),
                ));
            }
            ConnectionState::Off => self.undo = UndoPhase::Dormant,
            _ => {}
        }

        self.state_changes.emit(&next);
    }

    fn commit_local(&mut self, content: &Document) {
        if let UndoPhase::Active(undo) = &mut self.undo {
            // Deleting blocks received from peers empties their order lists,
            // so the stored tree's lists must be in scope as well.
            let mut keys = self.doc.stored_order_keys();
            keys.extend(codec::order_keys(content));
            keys.sort_unstable();
            keys.dedup();
            undo.track(&self.doc.prepare_order_lists(&keys));
        }
        self.doc
            .commit(&ChangeOrigin::Local(self.identity.clone()), content);
        if let UndoPhase::Active(undo) = &mut self.undo {
            undo.stop_capturing();
        }
    }

    fn queue_sync1(&mut self, dest: Option<&str>, is_reply: bool) {
        let mut message = DocMessage::new(
            &self.identity,
            SyncMessage::SyncStep1 {
                state_vector: self.doc.state_vector(),
            },
        );
        if let Some(dest) = dest {
            message = message.to_peer(dest);
        }
        if is_reply {
            message = message.as_reply();
        }
        self.send(message);
    }

    fn send(&mut self, message: DocMessage) {
        self.outgoing.push_back(Envelope::Doc {
            identity: self.identity.clone(),
            message,
        });
    }

    /// Route the updates committed since the last flush
    ///
    /// Changes made for this session are broadcast while `On`. Any change
    /// that is not a plain local edit republishes the decoded document.
    fn flush(&mut self) {
        let events = self.doc.take_events();
        if events.is_empty() {
            return;
        }

        let undo_origin = match &self.undo {
            UndoPhase::Active(undo) => Some(undo.origin()),
            UndoPhase::Dormant => None,
        };

        let mut publish = false;
        for record in events {
            let origin = ChangeOrigin::classify(record.origin.as_ref(), undo_origin.as_ref());
            tracing::trace!(%origin, bytes = record.update.len(), "document update");

            if origin.acts_for(&self.identity) && self.state == ConnectionState::On {
                self.send(DocMessage::new(
                    &self.identity,
                    SyncMessage::Update {
                        update: record.update,
                    },
                ));
            }
            if !origin.is_local_edit_of(&self.identity) {
                publish = true;
            }
        }

        if publish {
            self.remote_changes.emit(&self.doc.content());
        }
    }
}
