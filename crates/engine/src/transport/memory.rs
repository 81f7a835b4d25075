//! In-process transport
//!
//! A [`MemoryHub`] plays the role of a signalling server for peers living
//! in the same process: frames sent by one member reach every other member
//! of its channel, and membership changes are pushed as peer lists.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use blocksync_protocol::Envelope;
use tokio::sync::mpsc;

use super::{JoinInfo, Joined, PeerInfo, Transport, TransportEvent};

struct Member {
    peer: PeerInfo,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

#[derive(Default)]
struct HubState {
    channels: HashMap<String, Vec<Member>>,
}

impl HubState {
    fn announce(&self, channel: &str) {
        let Some(members) = self.channels.get(channel) else {
            return;
        };
        let peers: Vec<PeerInfo> = members.iter().map(|m| m.peer.clone()).collect();
        for member in members {
            let _ = member.tx.send(TransportEvent::Peers(peers.clone()));
        }
    }
}

/// Channel registry shared by every [`MemoryTransport`] it creates
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a transport attached to this hub
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            membership: Mutex::new(None),
        }
    }

    /// Current members of `channel`
    pub fn members(&self, channel: &str) -> Vec<PeerInfo> {
        self.lock()
            .channels
            .get(channel)
            .map(|members| members.iter().map(|m| m.peer.clone()).collect())
            .unwrap_or_default()
    }

    /// Deliver a raw frame to every member of `channel`
    pub fn inject(&self, channel: &str, frame: impl Into<String>) {
        let frame = frame.into();
        if let Some(members) = self.lock().channels.get(channel) {
            for member in members {
                let _ = member.tx.send(TransportEvent::Frame(frame.clone()));
            }
        }
    }

    fn join(&self, channel: &str, peer: PeerInfo, tx: mpsc::UnboundedSender<TransportEvent>) -> bool {
        let mut state = self.lock();
        let members = state.channels.entry(channel.to_string()).or_default();
        members.retain(|m| m.peer.id != peer.id);
        let is_first = members.is_empty();
        members.push(Member { peer, tx });
        state.announce(channel);
        is_first
    }

    fn leave(&self, channel: &str, id: &str) {
        let mut state = self.lock();
        let Some(members) = state.channels.get_mut(channel) else {
            return;
        };
        if let Some(position) = members.iter().position(|m| m.peer.id == id) {
            let member = members.remove(position);
            let _ = member.tx.send(TransportEvent::Closed);
        }
        if members.is_empty() {
            state.channels.remove(channel);
        } else {
            state.announce(channel);
        }
    }

    fn broadcast(&self, channel: &str, from: &str, frame: &str) -> usize {
        let state = self.lock();
        let Some(members) = state.channels.get(channel) else {
            return 0;
        };
        members
            .iter()
            .filter(|m| m.peer.id != from)
            .filter(|m| m.tx.send(TransportEvent::Frame(frame.to_string())).is_ok())
            .count()
    }
}

impl std::fmt::Debug for MemoryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHub")
            .field("channels", &self.lock().channels.len())
            .finish()
    }
}

/// One peer's connection to a [`MemoryHub`]
#[derive(Debug)]
pub struct MemoryTransport {
    hub: MemoryHub,
    /// Joined channel and peer id
    membership: Mutex<Option<(String, String)>>,
}

impl MemoryTransport {
    fn membership(&self) -> MutexGuard<'_, Option<(String, String)>> {
        self.membership.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, join: JoinInfo) -> anyhow::Result<Joined> {
        if self.membership().is_some() {
            anyhow::bail!("transport already joined a channel");
        }
        let (tx, events) = mpsc::unbounded_channel();
        let id = join.peer.id.clone();
        let is_first_in_channel = self.hub.join(&join.channel, join.peer, tx);
        tracing::debug!(channel = %join.channel, peer = %id, is_first_in_channel, "joined channel");
        *self.membership() = Some((join.channel, id));

        Ok(Joined {
            is_first_in_channel,
            events,
        })
    }

    async fn send_message(&self, envelope: &Envelope) -> anyhow::Result<()> {
        let Some((channel, id)) = self.membership().clone() else {
            anyhow::bail!("transport is not connected");
        };
        let frame = envelope.to_json()?;
        let delivered = self.hub.broadcast(&channel, &id, &frame);
        tracing::trace!(channel = %channel, delivered, "frame sent");
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        if let Some((channel, id)) = self.membership().take() {
            self.hub.leave(&channel, &id);
            tracing::debug!(channel = %channel, peer = %id, "left channel");
        }
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}
