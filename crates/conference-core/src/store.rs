//! Minimal shared state store contract
//!
//! The facade and the callback tiers only ever *dispatch* into the store; how
//! the host renders that state is outside this crate. [`MemoryStore`] is a
//! complete in-process implementation used by default and in tests.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::devices::DeviceList;
use crate::error::SessionError;
use crate::types::{
    ConnectionChange, LocalIdentity, MediaKind, NetworkQualitySample, ParticipantId, ProviderKind,
    RemoteParticipant, RemoteVideoStats, VideoStats,
};

/// Actions the session layer dispatches into the host's state store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreAction {
    SessionStarted { provider: ProviderKind },
    LocalIdentity(LocalIdentity),
    ParticipantUpserted(RemoteParticipant),
    ParticipantRemoved(ParticipantId),
    MediaChanged {
        participant: ParticipantId,
        media: MediaKind,
        active: bool,
    },
    ConnectionChanged(ConnectionChange),
    NetworkQuality(NetworkQualitySample),
    LocalVideoStats(Option<VideoStats>),
    RemoteVideoStats(Option<RemoteVideoStats>),
    Devices(DeviceList),
    LocalMedia { video: bool, audio: bool },
    Error(SessionError),
    FailoverStarted { reason: String },
    /// Drop all session-scoped state
    Reset,
}

/// Dispatch-only state store
pub trait StateStore: Send + Sync {
    fn dispatch(&self, action: StoreAction);
}

/// Session-scoped state as held by [`MemoryStore`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub provider: Option<ProviderKind>,
    pub local: Option<LocalIdentity>,
    pub participants: BTreeMap<ParticipantId, RemoteParticipant>,
    pub connection: Option<ConnectionChange>,
    pub network_quality: Option<NetworkQualitySample>,
    pub local_video_stats: Option<VideoStats>,
    pub remote_video_stats: Option<RemoteVideoStats>,
    pub devices: Option<DeviceList>,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub last_error: Option<SessionError>,
    pub failover_reason: Option<String>,
}

/// In-memory [`StateStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<SessionSnapshot>,
    dispatched: RwLock<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.read().clone()
    }

    /// Number of actions dispatched since creation
    pub fn dispatch_count(&self) -> usize {
        *self.dispatched.read()
    }
}

impl StateStore for MemoryStore {
    fn dispatch(&self, action: StoreAction) {
        *self.dispatched.write() += 1;
        let mut state = self.state.write();
        match action {
            StoreAction::SessionStarted { provider } => {
                *state = SessionSnapshot {
                    provider: Some(provider),
                    ..Default::default()
                };
            }
            StoreAction::LocalIdentity(local) => state.local = Some(local),
            StoreAction::ParticipantUpserted(participant) => {
                state.participants.insert(participant.id.clone(), participant);
            }
            StoreAction::ParticipantRemoved(id) => {
                state.participants.remove(&id);
            }
            StoreAction::MediaChanged {
                participant,
                media,
                active,
            } => {
                if let Some(p) = state.participants.get_mut(&participant) {
                    match media {
                        MediaKind::Audio => p.audio_active = active,
                        MediaKind::Video => p.video_active = active,
                        MediaKind::ScreenShare => {}
                    }
                }
            }
            StoreAction::ConnectionChanged(change) => state.connection = Some(change),
            StoreAction::NetworkQuality(sample) => state.network_quality = Some(sample),
            StoreAction::LocalVideoStats(stats) => state.local_video_stats = stats,
            StoreAction::RemoteVideoStats(stats) => state.remote_video_stats = stats,
            StoreAction::Devices(devices) => state.devices = Some(devices),
            StoreAction::LocalMedia { video, audio } => {
                state.video_enabled = video;
                state.audio_enabled = audio;
            }
            StoreAction::Error(err) => state.last_error = Some(err),
            StoreAction::FailoverStarted { reason } => state.failover_reason = Some(reason),
            StoreAction::Reset => *state = SessionSnapshot::default(),
        }
    }
}
