//! Shared wire types for blocksync
//!
//! Defines the JSON envelopes exchanged between peers: CRDT handshake and
//! update messages, and ephemeral caret selections.

pub mod envelope;
pub mod payload;
pub mod selection;
pub mod sync;

pub use envelope::{Envelope, ProtocolError};
pub use selection::{Caret, Selection};
pub use sync::{DocMessage, SyncMessage, PROTOCOL_TAG};
