//! Replicated document instance
//!
//! Wraps the one `yrs::Doc` a session owns. Every write runs in a single
//! attributed transaction; the update observer only queues the produced
//! `(update, origin)` pair so callers drain it after the commit without
//! re-entering the document.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{ArrayRef, Doc, MapRef, Origin, ReadTxn, StateVector, Transact, Update};

use crate::codec;
use crate::error::{SyncError, SyncResult};
use crate::model::Document;
use crate::origin::ChangeOrigin;

/// Update produced by one committed transaction
#[derive(Debug, Clone)]
pub struct UpdateRecord {
    /// Incremental v1 update
    pub update: Vec<u8>,
    /// Raw origin of the transaction
    pub origin: Option<Origin>,
}

type EventQueue = Arc<Mutex<VecDeque<UpdateRecord>>>;

/// The replicated document of one session
pub struct ReplicatedDoc {
    doc: Doc,
    events: EventQueue,
    _observer: yrs::Subscription,
}

impl ReplicatedDoc {
    pub fn new() -> SyncResult<Self> {
        let doc = Doc::new();
        // Pre-create the root collections so every replica shares them.
        let _ = doc.get_or_insert_map(codec::BLOCKS);
        let _ = doc.get_or_insert_map(codec::META);
        let _ = doc.get_or_insert_map(codec::COMMENTS);

        let events: EventQueue = Arc::default();
        let queue = Arc::clone(&events);
        let observer = doc
            .observe_update_v1(move |txn, event| {
                queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_back(UpdateRecord {
                        update: event.update.clone(),
                        origin: txn.origin().cloned(),
                    });
            })
            .map_err(|e| SyncError::Observer(e.to_string()))?;

        Ok(Self {
            doc,
            events,
            _observer: observer,
        })
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// Root maps an undo manager scopes to
    pub fn roots(&self) -> [MapRef; 3] {
        [
            self.doc.get_or_insert_map(codec::BLOCKS),
            self.doc.get_or_insert_map(codec::META),
            self.doc.get_or_insert_map(codec::COMMENTS),
        ]
    }

    /// Create the named order lists ahead of a transaction
    pub fn prepare_order_lists(&self, keys: &[String]) -> Vec<ArrayRef> {
        keys.iter()
            .map(|key| self.doc.get_or_insert_array(key.as_str()))
            .collect()
    }

    /// Encode `document` in one transaction attributed to `origin`
    pub fn commit(&self, origin: &ChangeOrigin, document: &Document) {
        let mut txn = match origin.to_origin() {
            Some(origin) => self.doc.transact_mut_with(origin),
            None => self.doc.transact_mut(),
        };
        codec::encode(&mut txn, document);
    }

    /// Merge a remote v1 update attributed to `origin`
    ///
    /// The document is untouched when the payload cannot be decoded.
    pub fn apply_update(&self, update: &[u8], origin: &ChangeOrigin) -> SyncResult<()> {
        let update = Update::decode_v1(update).map_err(|e| SyncError::MalformedPayload {
            what: "update",
            reason: e.to_string(),
        })?;
        let mut txn = match origin.to_origin() {
            Some(origin) => self.doc.transact_mut_with(origin),
            None => self.doc.transact_mut(),
        };
        txn.apply_update(update)
            .map_err(|e| SyncError::Apply(e.to_string()))
    }

    /// Get the current state vector for sync
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Compute the updates a peer with `state_vector` is missing
    pub fn encode_diff(&self, state_vector: &[u8]) -> SyncResult<Vec<u8>> {
        let sv = StateVector::decode_v1(state_vector).map_err(|e| SyncError::MalformedPayload {
            what: "state vector",
            reason: e.to_string(),
        })?;
        let txn = self.doc.transact();
        Ok(txn.encode_diff_v1(&sv))
    }

    /// Encode full state as update
    pub fn encode_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Order lists of the tree as it is stored now
    pub fn stored_order_keys(&self) -> Vec<String> {
        codec::stored_order_keys(&self.doc.transact())
    }

    /// Decode the current document
    pub fn content(&self) -> Document {
        codec::decode(&self.doc.transact())
    }

    /// Drain the updates committed since the last call
    pub fn take_events(&self) -> Vec<UpdateRecord> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

impl std::fmt::Debug for ReplicatedDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedDoc")
            .field("client_id", &self.doc.client_id())
            .finish_non_exhaustive()
    }
}
