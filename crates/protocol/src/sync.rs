use serde::{Deserialize, Serialize};

/// Protocol tag carried by every document message.
///
/// Messages tagged with anything else are dropped by the receiver.
pub const PROTOCOL_TAG: &str = "blocksync/1";

/// Sync message types for CRDT collaboration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncMessage {
    /// Step 1: a peer sends its state vector
    #[serde(rename = "sync1", rename_all = "camelCase")]
    SyncStep1 {
        #[serde(with = "crate::payload")]
        state_vector: Vec<u8>,
    },

    /// Step 2: the addressed peer responds with the updates the sender lacks
    #[serde(rename = "sync2")]
    SyncStep2 {
        #[serde(with = "crate::payload")]
        update: Vec<u8>,
    },

    /// Incremental update broadcast to every peer
    #[serde(rename = "update")]
    Update {
        #[serde(with = "crate::payload")]
        update: Vec<u8>,
    },
}

impl SyncMessage {
    /// Wire name of the message type
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SyncStep1 { .. } => "sync1",
            Self::SyncStep2 { .. } => "sync2",
            Self::Update { .. } => "update",
        }
    }
}

/// Protocol-tagged document message with routing information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocMessage {
    /// Protocol tag, expected to equal [`PROTOCOL_TAG`]
    #[serde(default)]
    pub protocol: String,
    /// Identity of the peer that produced the message
    pub origin: String,
    /// Single recipient; `None` addresses every peer in the channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    /// Set on a sync1 sent in answer to another peer's sync1
    #[serde(default)]
    pub is_reply: bool,
    pub payload: SyncMessage,
}

impl DocMessage {
    /// Create a broadcast message tagged with the current protocol
    pub fn new(origin: impl Into<String>, payload: SyncMessage) -> Self {
        Self {
            protocol: PROTOCOL_TAG.to_string(),
            origin: origin.into(),
            dest: None,
            is_reply: false,
            payload,
        }
    }

    /// Address the message to a single peer
    #[must_use]
    pub fn to_peer(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    /// Mark the message as a reply
    #[must_use]
    pub fn as_reply(mut self) -> Self {
        self.is_reply = true;
        self
    }

    /// Whether the protocol tag matches this build
    pub fn has_expected_protocol(&self) -> bool {
        self.protocol == PROTOCOL_TAG
    }

    /// Whether `identity` should handle this message
    pub fn is_addressed_to(&self, identity: &str) -> bool {
        self.dest.as_deref().map_or(true, |dest| dest == identity)
    }
}
