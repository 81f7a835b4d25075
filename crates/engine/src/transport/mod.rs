//! Transport abstraction layer
//!
//! The engine never owns sockets. A [`Transport`] joins a channel, delivers
//! envelopes to the other peers in it, and streams back inbound frames and
//! peer-list updates as [`TransportEvent`]s.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use blocksync_protocol::Envelope;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use memory::{MemoryHub, MemoryTransport};

/// A peer as announced on a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    /// Session identity
    pub id: String,
    /// Display name
    pub name: String,
    /// CSS color; empty lets the receiver pick one
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl PeerInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: String::new(),
            avatar: None,
        }
    }
}

/// Everything a transport needs to join a channel
#[derive(Debug, Clone)]
pub struct JoinInfo {
    pub peer: PeerInfo,
    pub channel: String,
}

/// Inbound traffic from a joined channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One serialized envelope
    Frame(String),
    /// Current members of the channel, this peer included
    Peers(Vec<PeerInfo>),
    /// The channel is gone; no further events follow
    Closed,
}

/// Result of joining a channel
#[derive(Debug)]
pub struct Joined {
    /// No other peer was in the channel
    pub is_first_in_channel: bool,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Message delivery between the peers of a channel
#[async_trait]
pub trait Transport: Send + Sync {
    /// Join the channel described by `join`
    async fn connect(&self, join: JoinInfo) -> anyhow::Result<Joined>;

    /// Deliver an envelope to the other peers of the joined channel
    async fn send_message(&self, envelope: &Envelope) -> anyhow::Result<()>;

    /// Leave the channel, abandoning anything in flight
    async fn disconnect(&self) -> anyhow::Result<()>;

    /// Get transport type identifier
    fn transport_type(&self) -> &'static str;
}

/// Shared transport reference
pub type SharedTransport = Arc<dyn Transport>;
