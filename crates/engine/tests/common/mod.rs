//! Common test utilities
#![allow(dead_code)] // Helpers may not be used in all test files

use std::sync::Arc;

use blocksync_engine::protocol::{DocMessage, Envelope};
use blocksync_engine::transport::{MemoryHub, SharedTransport};
use blocksync_engine::{Block, CollabClient, Config, Document, SyncSession};

pub fn paragraph(id: &str, text: &str) -> Block {
    Block::new(id, "core/paragraph").with_attribute("content", text)
}

pub fn doc_of(blocks: Vec<Block>) -> Document {
    Document::with_blocks(blocks)
}

/// Document messages queued by `session`
pub fn outgoing(session: &mut SyncSession) -> Vec<DocMessage> {
    session
        .take_outgoing()
        .into_iter()
        .filter_map(|envelope| match envelope {
            Envelope::Doc { message, .. } => Some(message),
            Envelope::Selection { .. } => None,
        })
        .collect()
}

/// Broadcast every queued message to every other session until all are idle
pub fn exchange(sessions: &mut [&mut SyncSession]) {
    loop {
        let batches: Vec<Vec<DocMessage>> = sessions.iter_mut().map(|s| outgoing(s)).collect();
        if batches.iter().all(Vec::is_empty) {
            break;
        }
        for (from, batch) in batches.iter().enumerate() {
            for (to, session) in sessions.iter_mut().enumerate() {
                if from == to {
                    continue;
                }
                for message in batch {
                    session.receive(message).expect("receive");
                }
            }
        }
    }
}

/// Two sessions that completed the handshake over `initial`
pub fn synced_pair(initial: &Document) -> (SyncSession, SyncSession) {
    let mut a = SyncSession::with_identity("peer-a").expect("session");
    let mut b = SyncSession::with_identity("peer-b").expect("session");
    a.start_sharing(initial).expect("start sharing");
    b.connect().expect("connect");
    exchange(&mut [&mut a, &mut b]);
    (a, b)
}

/// Clients attached to one in-process hub
pub struct TestHarness {
    pub hub: MemoryHub,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            hub: MemoryHub::new(),
            config: Config::default(),
        }
    }

    pub fn client(&self, name: &str) -> CollabClient {
        let mut config = self.config.clone();
        config.user.name = name.to_string();
        let transport: SharedTransport = Arc::new(self.hub.transport());
        CollabClient::new(transport, &config).expect("client")
    }

    /// Pump every client until no events remain
    pub async fn settle(&self, clients: &mut [&mut CollabClient]) {
        loop {
            let mut handled = 0;
            for client in clients.iter_mut() {
                handled += client.pump_pending().await.expect("pump");
            }
            if handled == 0 {
                break;
            }
        }
    }
}
