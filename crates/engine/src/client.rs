//! Editor-facing collaboration client
//!
//! [`CollabClient`] drives one [`SyncSession`] and one [`PresenceRegistry`]
//! over a [`Transport`]: it joins the channel, feeds inbound frames to the
//! session, and ships whatever the session queues.

use tokio::sync::mpsc;

use blocksync_protocol::{Envelope, Selection};

use crate::config::{Config, UserConfig};
use crate::listeners::Subscription;
use crate::model::Document;
use crate::presence::{PresenceEvent, PresenceRegistry};
use crate::session::{ConnectionState, SyncSession};
use crate::transport::{JoinInfo, PeerInfo, SharedTransport, TransportEvent};

pub struct CollabClient {
    session: SyncSession,
    presence: PresenceRegistry,
    transport: SharedTransport,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    user: UserConfig,
    channel: String,
}

impl CollabClient {
    /// Create a client with a fresh session configured by `config`
    pub fn new(transport: SharedTransport, config: &Config) -> anyhow::Result<Self> {
        let session = SyncSession::new()?.with_pending_edits(config.sync.pending_edits);
        Ok(Self::with_session(transport, session, config))
    }

    pub fn with_session(transport: SharedTransport, session: SyncSession, config: &Config) -> Self {
        Self {
            presence: PresenceRegistry::new(session.identity()),
            session,
            transport,
            events: None,
            user: config.user.clone(),
            channel: config.sync.channel.clone(),
        }
    }

    pub fn identity(&self) -> &str {
        self.session.identity()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Decode the current replicated document
    pub fn content(&self) -> Document {
        self.session.content()
    }

    pub fn peers(&self) -> &[PeerInfo] {
        self.presence.peers()
    }

    pub fn selection_of(&self, identity: &str) -> Option<&Selection> {
        self.presence.selection_of(identity)
    }

    /// Join the configured channel
    ///
    /// The first peer in an empty channel shares `initial`; everyone else
    /// starts the handshake and receives the channel's document. Returns
    /// whether this client was first.
    pub async fn join(&mut self, initial: &Document) -> anyhow::Result<bool> {
        let join = JoinInfo {
            peer: PeerInfo {
                id: self.session.identity().to_string(),
                name: self.user.name.clone(),
                color: self.user.color.clone(),
                avatar: self.user.avatar.clone(),
            },
            channel: self.channel.clone(),
        };
        let joined = self.transport.connect(join).await?;
        tracing::info!(
            channel = %self.channel,
            transport = self.transport.transport_type(),
            first = joined.is_first_in_channel,
            "joined"
        );
        self.events = Some(joined.events);

        if joined.is_first_in_channel {
            self.session.start_sharing(initial)?;
        } else {
            self.session.connect()?;
        }
        self.flush_outgoing().await?;
        Ok(joined.is_first_in_channel)
    }

    /// Wait for the next transport event and handle it
    ///
    /// Returns `false` once the channel is closed or was never joined.
    pub async fn pump(&mut self) -> anyhow::Result<bool> {
        let event = match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => return Ok(false),
        };
        match event {
            Some(event) => self.handle_event(event).await,
            None => {
                self.closed();
                Ok(false)
            }
        }
    }

    /// Handle every event already queued without waiting for more
    pub async fn pump_pending(&mut self) -> anyhow::Result<usize> {
        let mut handled = 0;
        loop {
            let event = match self.events.as_mut().map(mpsc::UnboundedReceiver::try_recv) {
                Some(Ok(event)) => event,
                _ => return Ok(handled),
            };
            handled += 1;
            if !self.handle_event(event).await? {
                return Ok(handled);
            }
        }
    }

    /// Submit the editor's current document
    pub async fn submit_change(&mut self, content: &Document) -> anyhow::Result<bool> {
        let applied = self.session.apply_local_change(content)?;
        self.flush_outgoing().await?;
        Ok(applied)
    }

    /// Announce the local caret and anchor it to the next undo step
    pub async fn send_selection(&mut self, selection: Selection) -> anyhow::Result<()> {
        self.session.set_caret(Some(selection.clone()));
        if self.events.is_some() {
            let envelope = self.presence.selection_envelope(selection);
            self.transport.send_message(&envelope).await?;
        }
        Ok(())
    }

    pub async fn undo(&mut self) -> anyhow::Result<Option<Selection>> {
        let selection = self.session.undo();
        self.flush_outgoing().await?;
        Ok(selection)
    }

    pub async fn redo(&mut self) -> anyhow::Result<Option<Selection>> {
        let selection = self.session.redo();
        self.flush_outgoing().await?;
        Ok(selection)
    }

    pub fn has_undo(&self) -> bool {
        self.session.has_undo()
    }

    pub fn has_redo(&self) -> bool {
        self.session.has_redo()
    }

    /// Leave the channel immediately
    pub async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.session.disconnect();
        self.events = None;
        self.transport.disconnect().await
    }

    /// Called with the decoded document whenever a non-local change lands
    pub fn on_remote_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Document) + Send + Sync + 'static,
    {
        self.session.on_remote_change(callback)
    }

    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.session.on_state_change(callback)
    }

    pub fn on_presence<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.presence.subscribe(callback)
    }

    async fn handle_event(&mut self, event: TransportEvent) -> anyhow::Result<bool> {
        match event {
            TransportEvent::Frame(frame) => match Envelope::from_json(&frame) {
                Ok(Envelope::Doc { message, .. }) => {
                    if let Err(e) = self.session.receive(&message) {
                        tracing::warn!(error = %e, from = %message.origin, "dropping document message");
                    }
                }
                Ok(Envelope::Selection {
                    identity,
                    selection,
                }) => {
                    self.presence.apply_selection(&identity, selection);
                }
                Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
            },
            TransportEvent::Peers(peers) => self.presence.set_peers(peers),
            TransportEvent::Closed => {
                self.closed();
                return Ok(false);
            }
        }
        self.flush_outgoing().await?;
        Ok(true)
    }

    fn closed(&mut self) {
        tracing::info!(channel = %self.channel, "channel closed");
        self.events = None;
        self.session.disconnect();
    }

    /// Send queued envelopes in order
    ///
    /// On a transport error the unsent envelopes stay queued for the next flush.
    async fn flush_outgoing(&mut self) -> anyhow::Result<()> {
        let mut pending = self.session.take_outgoing().into_iter();
        while let Some(envelope) = pending.next() {
            if let Err(e) = self.transport.send_message(&envelope).await {
                tracing::warn!(error = %e, unsent = pending.len() + 1, "send failed, keeping envelopes queued");
                self.session
                    .requeue_outgoing(std::iter::once(envelope).chain(pending));
                return Err(e);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CollabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollabClient")
            .field("identity", &self.session.identity())
            .field("state", &self.session.state())
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::model::Block;
    use crate::transport::{Joined, Transport};

    /// Transport that refuses to send while `down` is set
    #[derive(Default)]
    struct FlakyTransport {
        down: AtomicBool,
        sent: Mutex<Vec<Envelope>>,
        events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn connect(&self, _join: JoinInfo) -> anyhow::Result<Joined> {
            let (tx, events) = mpsc::unbounded_channel();
            *self.events.lock().unwrap() = Some(tx);
            Ok(Joined {
                is_first_in_channel: true,
                events,
            })
        }

        async fn send_message(&self, envelope: &Envelope) -> anyhow::Result<()> {
            if self.down.load(Ordering::SeqCst) {
                anyhow::bail!("link down");
            }
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(())
        }

        async fn disconnect(&self) -> anyhow::Result<()> {
            self.events.lock().unwrap().take();
            Ok(())
        }

        fn transport_type(&self) -> &'static str {
            "flaky"
        }
    }

    fn text(value: &str) -> Document {
        Document::with_blocks(vec![
            Block::new("b1", "core/paragraph").with_attribute("content", value)
        ])
    }

    #[tokio::test]
    async fn test_failed_send_keeps_envelopes_queued() {
        let transport = Arc::new(FlakyTransport::default());
        transport.down.store(true, Ordering::SeqCst);
        let shared: SharedTransport = transport.clone();
        let mut client = CollabClient::new(shared, &Config::default()).unwrap();

        assert!(client.join(&text("")).await.is_err());
        assert!(client.submit_change(&text("a")).await.is_err());
        assert!(transport.sent.lock().unwrap().is_empty());

        transport.down.store(false, Ordering::SeqCst);
        client.submit_change(&text("ab")).await.unwrap();

        // Every update reaches a fresh replica in order.
        let mut replica = SyncSession::with_identity("replica").unwrap();
        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 3);
        for envelope in sent {
            if let Envelope::Doc { message, .. } = envelope {
                replica.receive(&message).unwrap();
            }
        }
        assert_eq!(replica.content(), text("ab"));
    }
}
