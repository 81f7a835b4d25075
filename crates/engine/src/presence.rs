//! Presence relay
//!
//! Tracks the peers sharing a channel and the latest caret selection each
//! of them announced. Selections travel as ephemeral envelopes and are
//! never merged into the replicated document.

use std::collections::HashMap;

use blocksync_protocol::{Envelope, Selection};

use crate::listeners::{Listeners, Subscription};
use crate::transport::PeerInfo;

/// Presence change published to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// The channel's peer list changed
    PeersChanged(Vec<PeerInfo>),
    /// A peer moved its caret
    SelectionChanged {
        identity: String,
        selection: Selection,
    },
}

/// Peer registry for one session
#[derive(Debug)]
pub struct PresenceRegistry {
    identity: String,
    /// Remote peers in join order
    peers: Vec<PeerInfo>,
    selections: HashMap<String, Selection>,
    /// Peers seen so far, used to pick palette colors
    joined: usize,
    events: Listeners<PresenceEvent>,
}

impl PresenceRegistry {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            peers: Vec::new(),
            selections: HashMap::new(),
            joined: 0,
            events: Listeners::new(),
        }
    }

    /// Envelope announcing this session's selection
    pub fn selection_envelope(&self, selection: Selection) -> Envelope {
        Envelope::Selection {
            identity: self.identity.clone(),
            selection,
        }
    }

    /// Replace the peer list pushed by the transport
    ///
    /// Known peers keep their position and color; departed peers lose their
    /// selection. This session's own entry is skipped.
    pub fn set_peers(&mut self, peers: Vec<PeerInfo>) {
        let mut next: Vec<PeerInfo> = Vec::with_capacity(peers.len());
        for known in &self.peers {
            if let Some(update) = peers.iter().find(|peer| peer.id == known.id) {
                next.push(PeerInfo {
                    color: known.color.clone(),
                    ..update.clone()
                });
            }
        }
        for mut peer in peers {
            if peer.id == self.identity || next.iter().any(|p| p.id == peer.id) {
                continue;
            }
            if peer.color.is_empty() {
                peer.color = Self::assign_color(self.joined);
            }
            self.joined += 1;
            tracing::debug!(peer = %peer.id, name = %peer.name, "peer joined");
            next.push(peer);
        }

        self.selections
            .retain(|id, _| next.iter().any(|peer| &peer.id == id));
        if next != self.peers {
            self.peers = next;
            self.events.emit(&PresenceEvent::PeersChanged(self.peers.clone()));
        }
    }

    /// Record a selection announced by `identity`
    ///
    /// Returns `false` for this session's own echo.
    pub fn apply_selection(&mut self, identity: &str, selection: Selection) -> bool {
        if identity == self.identity {
            return false;
        }
        self.selections
            .insert(identity.to_string(), selection.clone());
        self.events.emit(&PresenceEvent::SelectionChanged {
            identity: identity.to_string(),
            selection,
        });
        true
    }

    pub fn peers(&self) -> &[PeerInfo] {
        &self.peers
    }

    pub fn selection_of(&self, identity: &str) -> Option<&Selection> {
        self.selections.get(identity)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Assign a color based on join order
    fn assign_color(index: usize) -> String {
        const COLORS: &[&str] = &[
            "#ff6b6b", // red
            "#4ecdc4", // teal
            "#ffe66d", // yellow
            "#95e1d3", // mint
            "#f38181", // coral
            "#aa96da", // lavender
            "#fcbad3", // pink
            "#a8d8ea", // sky blue
        ];
        COLORS[index % COLORS.len()].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksync_protocol::Caret;
    use std::sync::{Arc, Mutex};

    fn peer(id: &str) -> PeerInfo {
        PeerInfo::new(id, format!("user {id}"))
    }

    fn caret(offset: u32) -> Selection {
        Selection::collapsed(Caret::new("b1", offset))
    }

    #[test]
    fn test_colors_follow_join_order() {
        let mut registry = PresenceRegistry::new("me");
        registry.set_peers(vec![peer("me"), peer("a"), peer("b")]);

        let peers = registry.peers();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].color, "#ff6b6b");
        assert_eq!(peers[1].color, "#4ecdc4");

        // A later list keeps colors of known peers.
        registry.set_peers(vec![peer("b"), peer("c")]);
        let peers = registry.peers();
        assert_eq!(peers[0].id, "b");
        assert_eq!(peers[0].color, "#4ecdc4");
        assert_eq!(peers[1].color, "#ffe66d");
    }

    #[test]
    fn test_announced_color_is_kept() {
        let mut registry = PresenceRegistry::new("me");
        registry.set_peers(vec![PeerInfo {
            color: "#123456".to_string(),
            ..peer("a")
        }]);
        assert_eq!(registry.peers()[0].color, "#123456");
    }

    #[test]
    fn test_departed_peers_lose_selection() {
        let mut registry = PresenceRegistry::new("me");
        registry.set_peers(vec![peer("a"), peer("b")]);
        assert!(registry.apply_selection("a", caret(1)));
        assert!(registry.apply_selection("b", caret(2)));

        registry.set_peers(vec![peer("b")]);
        assert!(registry.selection_of("a").is_none());
        assert_eq!(registry.selection_of("b"), Some(&caret(2)));
    }

    #[test]
    fn test_own_selection_is_ignored() {
        let mut registry = PresenceRegistry::new("me");
        assert!(!registry.apply_selection("me", caret(0)));
        assert!(registry.selection_of("me").is_none());
    }

    #[test]
    fn test_events_published() {
        let mut registry = PresenceRegistry::new("me");
        let events: Arc<Mutex<Vec<PresenceEvent>>> = Arc::default();
        let sink = Arc::clone(&events);
        let _sub = registry.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        registry.set_peers(vec![peer("a")]);
        // Same list again: nothing changed.
        registry.set_peers(vec![peer("a")]);
        registry.apply_selection("a", caret(3));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], PresenceEvent::PeersChanged(peers) if peers.len() == 1));
        assert_eq!(
            events[1],
            PresenceEvent::SelectionChanged {
                identity: "a".to_string(),
                selection: caret(3),
            }
        );
    }

    #[test]
    fn test_selection_envelope() {
        let registry = PresenceRegistry::new("me");
        let envelope = registry.selection_envelope(caret(4));
        assert_eq!(envelope.identity(), "me");
        assert!(matches!(envelope, Envelope::Selection { .. }));
    }
}
