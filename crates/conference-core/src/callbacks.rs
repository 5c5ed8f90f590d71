//! Callback tiers installed on the session facade
//!
//! - [`BasicCallbacks`] only mirror events into the [`StateStore`]; safe to
//!   install before any UI is mounted.
//! - [`ExtendedCallbacks`] additionally surface errors to the user and project
//!   network quality onto a simple good/fair/poor scale for display.
//!
//! The facade can swap between tiers at any time without re-joining.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::SessionError;
use crate::events::SessionEventHandler;
use crate::store::{StateStore, StoreAction};
use crate::types::{
    ConnectionChange, LocalIdentity, MediaKind, NetworkQualitySample, ParticipantId, QualityLevel,
    RemoteParticipant,
};

/// Which callback tier is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackTier {
    Basic,
    Extended,
    Custom,
}

/// Simplified network quality for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkQuality {
    Good,
    Fair,
    Poor,
    Unknown,
}

impl NetworkQuality {
    /// Project a sample onto the display scale; the worse direction wins
    pub fn from_sample(sample: &NetworkQualitySample) -> Self {
        let levels: Vec<QualityLevel> = [sample.uplink, sample.downlink]
            .into_iter()
            .filter(QualityLevel::is_known)
            .collect();
        match levels.iter().max().map(QualityLevel::value) {
            None => NetworkQuality::Unknown,
            Some(1..=2) => NetworkQuality::Good,
            Some(3..=4) => NetworkQuality::Fair,
            Some(_) => NetworkQuality::Poor,
        }
    }
}

/// User-facing surface the extended tier reports into
#[async_trait]
pub trait UiNotifier: Send + Sync {
    async fn show_error(&self, message: String, error: SessionError);

    async fn network_quality(&self, quality: NetworkQuality);

    async fn show_notice(&self, _message: String) {}
}

/// Store-only callbacks
pub struct BasicCallbacks {
    store: Arc<dyn StateStore>,
}

impl BasicCallbacks {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionEventHandler for BasicCallbacks {
    async fn on_participant_joined(&self, participant: RemoteParticipant) {
        self.store.dispatch(StoreAction::ParticipantUpserted(participant));
    }

    async fn on_participant_left(&self, participant: ParticipantId) {
        self.store.dispatch(StoreAction::ParticipantRemoved(participant));
    }

    async fn on_media_published(&self, participant: ParticipantId, media: MediaKind) {
        self.store.dispatch(StoreAction::MediaChanged {
            participant,
            media,
            active: true,
        });
    }

    async fn on_media_unpublished(&self, participant: ParticipantId, media: MediaKind) {
        self.store.dispatch(StoreAction::MediaChanged {
            participant,
            media,
            active: false,
        });
    }

    async fn on_network_quality_changed(&self, sample: NetworkQualitySample) {
        self.store.dispatch(StoreAction::NetworkQuality(sample));
    }

    async fn on_connection_state_changed(&self, change: ConnectionChange) {
        self.store.dispatch(StoreAction::ConnectionChanged(change));
    }

    async fn on_error(&self, error: SessionError) {
        self.store.dispatch(StoreAction::Error(error));
    }

    async fn on_join_success(&self, local: LocalIdentity) {
        self.store.dispatch(StoreAction::LocalIdentity(local));
    }

    async fn on_failover(&self, reason: String) {
        self.store.dispatch(StoreAction::FailoverStarted { reason });
    }
}

/// Store updates plus user-facing error and quality surfacing
pub struct ExtendedCallbacks {
    basic: BasicCallbacks,
    notifier: Arc<dyn UiNotifier>,
}

impl ExtendedCallbacks {
    pub fn new(store: Arc<dyn StateStore>, notifier: Arc<dyn UiNotifier>) -> Self {
        Self {
            basic: BasicCallbacks::new(store),
            notifier,
        }
    }
}

#[async_trait]
impl SessionEventHandler for ExtendedCallbacks {
    async fn on_participant_joined(&self, participant: RemoteParticipant) {
        self.basic.on_participant_joined(participant).await;
    }

    async fn on_participant_left(&self, participant: ParticipantId) {
        self.basic.on_participant_left(participant).await;
    }

    async fn on_media_published(&self, participant: ParticipantId, media: MediaKind) {
        self.basic.on_media_published(participant, media).await;
    }

    async fn on_media_unpublished(&self, participant: ParticipantId, media: MediaKind) {
        self.basic.on_media_unpublished(participant, media).await;
    }

    async fn on_network_quality_changed(&self, sample: NetworkQualitySample) {
        let quality = NetworkQuality::from_sample(&sample);
        self.basic.on_network_quality_changed(sample).await;
        self.notifier.network_quality(quality).await;
    }

    async fn on_connection_state_changed(&self, change: ConnectionChange) {
        self.basic.on_connection_state_changed(change).await;
    }

    async fn on_error(&self, error: SessionError) {
        warn!(category = error.category(), error = %error, "Session error surfaced to UI");
        self.basic.on_error(error.clone()).await;
        self.notifier.show_error(error.to_string(), error).await;
    }

    async fn on_join_success(&self, local: LocalIdentity) {
        self.basic.on_join_success(local).await;
    }

    async fn on_failover(&self, reason: String) {
        info!(reason = %reason, "Failover notice surfaced to UI");
        self.basic.on_failover(reason.clone()).await;
        self.notifier
            .show_notice(format!("Connection lost ({}), restarting session", reason))
            .await;
    }
}
