//! Transport-agnostic wire envelope
//!
//! Every frame a transport carries is one JSON envelope: either a
//! replicated-document message or an ephemeral selection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::selection::Selection;
use crate::sync::DocMessage;

/// Errors produced while decoding a frame
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// CRDT handshake or update
    Doc {
        identity: String,
        message: DocMessage,
    },
    /// Caret selection, never merged into the document
    Selection {
        identity: String,
        selection: Selection,
    },
}

impl Envelope {
    /// Identity of the sending peer
    pub fn identity(&self) -> &str {
        match self {
            Self::Doc { identity, .. } | Self::Selection { identity, .. } => identity,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }
}
