// blocksync-engine library
// Block-tree CRDT synchronization on top of yrs

// Document model and its replicated encoding
pub mod codec;
pub mod diff;
pub mod model;

// Sync protocol state machine
pub mod document;
pub mod error;
pub mod origin;
pub mod session;

// Undo/redo with caret anchoring
pub mod undo;

// Presence and transport seam
pub mod presence;
pub mod transport;

// Editor-facing client
pub mod client;
pub mod listeners;

// Configuration
pub mod config;

pub use blocksync_protocol as protocol;
pub use client::CollabClient;
pub use config::{Config, PendingEdits};
pub use error::{SyncError, SyncResult};
pub use model::{Block, Comment, Document, Reply};
pub use session::{ConnectionState, SyncSession};
