//! Core data model shared by adapters, the facade and the UI layer
//!
//! These types are provider-neutral: each adapter translates its vendor's
//! native shapes into them before anything leaves the adapter.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

// ===== PROVIDERS =====

/// The three conferencing providers the session layer unifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Zoom,
    Agora,
    Trtc,
}

impl ProviderKind {
    /// All supported providers, in a stable order
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Zoom, ProviderKind::Agora, ProviderKind::Trtc];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Zoom => "zoom",
            ProviderKind::Agora => "agora",
            ProviderKind::Trtc => "trtc",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered.strip_suffix("-like").unwrap_or(&lowered);
        match name {
            "zoom" => Ok(ProviderKind::Zoom),
            "agora" => Ok(ProviderKind::Agora),
            "trtc" => Ok(ProviderKind::Trtc),
            _ => Err(SessionError::invalid_configuration(
                "provider",
                format!("unknown provider '{}'", s),
            )),
        }
    }
}

// ===== IDENTITY AND ROSTER =====

/// Provider-assigned participant identifier
///
/// Zoom assigns numeric ids, Agora and TRTC string ids; all are carried as
/// strings once they leave the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u32> for ParticipantId {
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

/// The identity the local user was admitted under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub id: ParticipantId,
    pub display_name: String,
}

/// A remote participant as tracked in the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParticipant {
    pub id: ParticipantId,
    pub display_name: Option<String>,
    pub audio_active: bool,
    pub video_active: bool,
}

impl RemoteParticipant {
    pub fn new(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            audio_active: false,
            video_active: false,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Participant role; serialized as 0 (participant) or 1 (host)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Participant,
    Host,
}

impl Role {
    pub fn as_number(&self) -> u8 {
        match self {
            Role::Participant => 0,
            Role::Host => 1,
        }
    }

    pub fn from_number(value: u8) -> Option<Self> {
        match value {
            0 => Some(Role::Participant),
            1 => Some(Role::Host),
            _ => None,
        }
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" | "1" => Ok(Role::Host),
            "participant" | "attendee" | "0" => Ok(Role::Participant),
            other => Err(SessionError::invalid_configuration(
                "role",
                format!("expected host/participant or 1/0, got '{}'", other),
            )),
        }
    }
}

// ===== MEDIA =====

/// Kind of media a participant can publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
    ScreenShare,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
            MediaKind::ScreenShare => f.write_str("screen-share"),
        }
    }
}

/// Device categories the session layer can switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Camera,
    Microphone,
    Speaker,
    /// File-based playback source used in place of a live microphone
    File,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Camera => f.write_str("camera"),
            DeviceKind::Microphone => f.write_str("microphone"),
            DeviceKind::Speaker => f.write_str("speaker"),
            DeviceKind::File => f.write_str("file"),
        }
    }
}

// ===== CONNECTION AND QUALITY =====

/// Canonical connection state, ordered by lifecycle position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Failed,
}

/// A provider connection-state report
///
/// `raw` carries the provider's own state string verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionChange {
    pub state: ConnectionState,
    pub raw: String,
    pub reason: Option<String>,
}

/// Canonical link quality: 0 unknown, 1 excellent through 6 down
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct QualityLevel(u8);

impl QualityLevel {
    pub const UNKNOWN: QualityLevel = QualityLevel(0);
    pub const EXCELLENT: QualityLevel = QualityLevel(1);
    pub const DOWN: QualityLevel = QualityLevel(6);

    /// Clamp a value already on the 0..=6 scale
    pub fn new(level: u8) -> Self {
        Self(level.min(6))
    }

    /// Map a 0..=5 "higher is better" score onto the canonical scale
    pub fn from_higher_is_better(score: u8) -> Self {
        match score {
            5 => Self(1),
            4 => Self(2),
            3 => Self(3),
            2 => Self(4),
            1 => Self(5),
            _ => Self(6),
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_known(&self) -> bool {
        self.0 != 0
    }
}

/// Bandwidth/latency/loss for one media kind in both directions
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DirectionalStats {
    pub send_bandwidth_kbps: Option<u32>,
    pub recv_bandwidth_kbps: Option<u32>,
    pub send_latency_ms: Option<u32>,
    pub recv_latency_ms: Option<u32>,
    pub send_loss_pct: Option<f32>,
    pub recv_loss_pct: Option<f32>,
}

/// Directional network quality, optionally with per-media sub-stats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkQualitySample {
    pub uplink: QualityLevel,
    pub downlink: QualityLevel,
    pub audio: Option<DirectionalStats>,
    pub video: Option<DirectionalStats>,
    pub sampled_at: DateTime<Utc>,
}

impl NetworkQualitySample {
    pub fn new(uplink: QualityLevel, downlink: QualityLevel) -> Self {
        Self {
            uplink,
            downlink,
            audio: None,
            video: None,
            sampled_at: Utc::now(),
        }
    }
}

/// Statistics snapshot for one video stream
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoStats {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
    pub packet_loss_pct: f32,
    pub rtt_ms: Option<u32>,
}

/// Remote video statistics keyed by participant
pub type RemoteVideoStats = HashMap<ParticipantId, VideoStats>;

/// Opaque handle to a UI surface a remote video is rendered into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh unique surface id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a provider adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterState {
    Uninitialized,
    Joining,
    Joined,
    Leaving,
}

/// A virtual background preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundPreset {
    pub id: String,
    /// Image to composite; `None` means blur
    pub image_url: Option<String>,
}

impl BackgroundPreset {
    pub fn blur(id: impl Into<String>) -> Self {
        Self { id: id.into(), image_url: None }
    }

    pub fn image(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image_url: Some(url.into()),
        }
    }
}
