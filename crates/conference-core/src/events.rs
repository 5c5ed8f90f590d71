//! Canonical event contract
//!
//! Every adapter re-emits its vendor's events as [`SessionEvent`]s through an
//! [`EventSink`]. The facade consumes them in order, filters the roster, and
//! forwards them to the installed [`SessionEventHandler`].

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::SessionError;
use crate::types::{
    ConnectionChange, LocalIdentity, MediaKind, NetworkQualitySample, ParticipantId,
    RemoteParticipant,
};

/// The single canonical event set shared by all providers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A remote participant entered the session
    ParticipantJoined(RemoteParticipant),
    /// A remote participant left the session
    ParticipantLeft(ParticipantId),
    /// A participant started publishing a media kind
    MediaPublished {
        participant: ParticipantId,
        media: MediaKind,
    },
    /// A participant stopped publishing a media kind
    MediaUnpublished {
        participant: ParticipantId,
        media: MediaKind,
    },
    /// Link quality changed
    NetworkQualityChanged(NetworkQualitySample),
    /// Provider connection state changed
    ConnectionStateChanged(ConnectionChange),
    /// Error after a successful join
    Error(SessionError),
    /// Join completed with the resolved local identity
    JoinSuccess(LocalIdentity),
    /// Provider-specific forced restart is under way
    Failover { reason: String },
}

impl SessionEvent {
    /// Participant this event refers to, if any
    pub fn participant(&self) -> Option<&ParticipantId> {
        match self {
            SessionEvent::ParticipantJoined(p) => Some(&p.id),
            SessionEvent::ParticipantLeft(id) => Some(id),
            SessionEvent::MediaPublished { participant, .. } => Some(participant),
            SessionEvent::MediaUnpublished { participant, .. } => Some(participant),
            _ => None,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::ParticipantJoined(_) => "participant-joined",
            SessionEvent::ParticipantLeft(_) => "participant-left",
            SessionEvent::MediaPublished { .. } => "media-published",
            SessionEvent::MediaUnpublished { .. } => "media-unpublished",
            SessionEvent::NetworkQualityChanged(_) => "network-quality-changed",
            SessionEvent::ConnectionStateChanged(_) => "connection-state-changed",
            SessionEvent::Error(_) => "error",
            SessionEvent::JoinSuccess(_) => "join-success",
            SessionEvent::Failover { .. } => "failover",
        }
    }
}

/// Callback set installed by the UI layer
///
/// Every method has a no-op default so implementors only override what they
/// care about. [`on_event`](SessionEventHandler::on_event) fans a
/// [`SessionEvent`] out to the typed methods.
#[async_trait]
pub trait SessionEventHandler: Send + Sync {
    async fn on_participant_joined(&self, _participant: RemoteParticipant) {}

    async fn on_participant_left(&self, _participant: ParticipantId) {}

    async fn on_media_published(&self, _participant: ParticipantId, _media: MediaKind) {}

    async fn on_media_unpublished(&self, _participant: ParticipantId, _media: MediaKind) {}

    async fn on_network_quality_changed(&self, _sample: NetworkQualitySample) {}

    async fn on_connection_state_changed(&self, _change: ConnectionChange) {}

    async fn on_error(&self, _error: SessionError) {}

    async fn on_join_success(&self, _local: LocalIdentity) {}

    async fn on_failover(&self, _reason: String) {}

    /// Dispatch a canonical event to the typed handler methods
    async fn on_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::ParticipantJoined(p) => self.on_participant_joined(p).await,
            SessionEvent::ParticipantLeft(id) => self.on_participant_left(id).await,
            SessionEvent::MediaPublished { participant, media } => {
                self.on_media_published(participant, media).await
            }
            SessionEvent::MediaUnpublished { participant, media } => {
                self.on_media_unpublished(participant, media).await
            }
            SessionEvent::NetworkQualityChanged(sample) => {
                self.on_network_quality_changed(sample).await
            }
            SessionEvent::ConnectionStateChanged(change) => {
                self.on_connection_state_changed(change).await
            }
            SessionEvent::Error(err) => self.on_error(err).await,
            SessionEvent::JoinSuccess(local) => self.on_join_success(local).await,
            SessionEvent::Failover { reason } => self.on_failover(reason).await,
        }
    }
}

/// Sending half handed to an adapter at construction
///
/// Emission never blocks; events are consumed in order by the facade's
/// dispatcher task. Emitting after the dispatcher has gone away is silently
/// dropped, which only happens once the session is being torn down.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the dispatcher drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: SessionEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            trace!(event = name, "event dropped, dispatcher closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl SessionEventHandler for Recorder {
        async fn on_participant_left(&self, _participant: ParticipantId) {
            self.seen.lock().unwrap().push("left");
        }

        async fn on_failover(&self, _reason: String) {
            self.seen.lock().unwrap().push("failover");
        }
    }

    #[tokio::test]
    async fn on_event_routes_to_typed_methods() {
        let recorder = Recorder::default();
        recorder.on_event(SessionEvent::ParticipantLeft("7".into())).await;
        recorder
            .on_event(SessionEvent::Failover { reason: "failover".into() })
            .await;
        // defaulted methods are silent
        recorder
            .on_event(SessionEvent::MediaPublished {
                participant: "7".into(),
                media: MediaKind::Video,
            })
            .await;
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["left", "failover"]);
    }

    #[tokio::test]
    async fn sink_preserves_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(SessionEvent::ParticipantLeft("a".into()));
        sink.emit(SessionEvent::ParticipantLeft("b".into()));
        assert_eq!(rx.recv().await.unwrap().participant().unwrap().as_str(), "a");
        assert_eq!(rx.recv().await.unwrap().participant().unwrap().as_str(), "b");
        drop(rx);
        assert!(sink.is_closed());
        sink.emit(SessionEvent::ParticipantLeft("c".into()));
    }
}
