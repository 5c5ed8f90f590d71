//! Join and session configuration
//!
//! [`JoinConfig`] describes one join request; [`SessionSettings`] tunes the
//! facade itself (timers, rejoin origin). Both are plain serde structs with
//! `with_*` builders.
//!
//! ```rust
//! use confbench_conference_core::{JoinConfig, ProviderKind, Role};
//!
//! let config = JoinConfig::new(ProviderKind::Zoom, "standup", "alice")
//!     .with_role(Role::Host)
//!     .with_password("s3cret")
//!     .with_video_enabled(true);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.role.as_number(), 1);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::types::{ProviderKind, Role};

/// Default statistics polling interval
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Default network-online polling interval while failover waits
pub const DEFAULT_FAILOVER_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default origin the rejoin URL is built against
pub const DEFAULT_REJOIN_ORIGIN: &str = "http://localhost:3000/";

/// Provider credential pair (SDK key/secret, app id/certificate, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub key: Option<String>,
    pub secret: Option<String>,
}

/// Local media intent for the join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaOptions {
    pub video_mode: String,
    pub audio_mode: String,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    /// Provider media-feature hash, passed through untouched
    pub media_features: Option<String>,
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            video_mode: "default".to_string(),
            audio_mode: "default".to_string(),
            video_enabled: false,
            audio_enabled: true,
            media_features: None,
        }
    }
}

/// UI layout flags carried through a failover restart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutFlags {
    pub self_fullscreen: bool,
    pub remote_fullscreen: bool,
    pub enforce_gallery_view: bool,
}

/// Audio processing toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggles {
    pub noise_suppression: bool,
    pub original_sound: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            noise_suppression: true,
            original_sound: false,
        }
    }
}

/// Preferred device names applied during device reconciliation
///
/// Each name is matched as a case-insensitive substring of device labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoJoinPreferences {
    pub camera: Option<String>,
    pub microphone: Option<String>,
    pub speaker: Option<String>,
}

/// A single join request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinConfig {
    pub provider: ProviderKind,
    pub topic: String,
    pub user_name: String,
    pub role: Role,
    pub password: Option<String>,
    pub credentials: Credentials,
    /// Pre-issued signature/token; fetched automatically when absent
    pub signature: Option<String>,
    pub session_key: Option<String>,
    pub user_identity: Option<String>,
    pub web_endpoint: Option<String>,
    pub media: MediaOptions,
    pub layout: LayoutFlags,
    pub features: FeatureToggles,
    pub auto_join: Option<AutoJoinPreferences>,
}

impl JoinConfig {
    pub fn new(provider: ProviderKind, topic: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            provider,
            topic: topic.into(),
            user_name: user_name.into(),
            role: Role::default(),
            password: None,
            credentials: Credentials::default(),
            signature: None,
            session_key: None,
            user_identity: None,
            web_endpoint: None,
            media: MediaOptions::default(),
            layout: LayoutFlags::default(),
            features: FeatureToggles::default(),
            auto_join: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_credentials(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.credentials = Credentials {
            key: Some(key.into()),
            secret: Some(secret.into()),
        };
        self
    }

    pub fn with_app_id(mut self, key: impl Into<String>) -> Self {
        self.credentials.key = Some(key.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    pub fn with_user_identity(mut self, identity: impl Into<String>) -> Self {
        self.user_identity = Some(identity.into());
        self
    }

    pub fn with_web_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.web_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_media(mut self, media: MediaOptions) -> Self {
        self.media = media;
        self
    }

    pub fn with_video_enabled(mut self, enabled: bool) -> Self {
        self.media.video_enabled = enabled;
        self
    }

    pub fn with_audio_enabled(mut self, enabled: bool) -> Self {
        self.media.audio_enabled = enabled;
        self
    }

    pub fn with_layout(mut self, layout: LayoutFlags) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_features(mut self, features: FeatureToggles) -> Self {
        self.features = features;
        self
    }

    pub fn with_auto_join(mut self, preferences: AutoJoinPreferences) -> Self {
        self.auto_join = Some(preferences);
        self
    }

    /// Check required identity/topic fields and provider credentials
    pub fn validate(&self) -> SessionResult<()> {
        if self.topic.trim().is_empty() {
            return Err(SessionError::missing_configuration("topic"));
        }
        if self.user_name.trim().is_empty() {
            return Err(SessionError::missing_configuration("user_name"));
        }

        match self.provider {
            ProviderKind::Zoom => {}
            ProviderKind::Agora => {
                if self.credentials.key.as_deref().map_or(true, str::is_empty) {
                    return Err(SessionError::missing_configuration("credentials.key (app id)"));
                }
            }
            ProviderKind::Trtc => {
                let key = self
                    .credentials
                    .key
                    .as_deref()
                    .ok_or_else(|| SessionError::missing_configuration("credentials.key (sdk app id)"))?;
                if key.parse::<u32>().is_err() {
                    return Err(SessionError::invalid_configuration(
                        "credentials.key",
                        "sdk app id must be numeric",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Identity the local user asks to join under
    pub fn requested_identity(&self) -> &str {
        self.user_identity.as_deref().unwrap_or(&self.user_name)
    }

    pub fn preferred_camera(&self) -> Option<&str> {
        self.auto_join.as_ref().and_then(|p| p.camera.as_deref())
    }

    pub fn preferred_microphone(&self) -> Option<&str> {
        self.auto_join.as_ref().and_then(|p| p.microphone.as_deref())
    }

    pub fn preferred_speaker(&self) -> Option<&str> {
        self.auto_join.as_ref().and_then(|p| p.speaker.as_deref())
    }
}

/// Facade-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub stats_interval: Duration,
    pub failover_poll_interval: Duration,
    /// Origin (scheme, host, path) the rejoin URL is appended to
    pub rejoin_origin: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            stats_interval: DEFAULT_STATS_INTERVAL,
            failover_poll_interval: DEFAULT_FAILOVER_POLL_INTERVAL,
            rejoin_origin: DEFAULT_REJOIN_ORIGIN.to_string(),
        }
    }
}

impl SessionSettings {
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    pub fn with_failover_poll_interval(mut self, interval: Duration) -> Self {
        self.failover_poll_interval = interval;
        self
    }

    pub fn with_rejoin_origin(mut self, origin: impl Into<String>) -> Self {
        self.rejoin_origin = origin.into();
        self
    }

    /// Both timers must tick and the rejoin origin must be an absolute URL
    pub fn validate(&self) -> SessionResult<()> {
        if self.stats_interval.is_zero() {
            return Err(SessionError::invalid_configuration("stats_interval", "must be non-zero"));
        }
        if self.failover_poll_interval.is_zero() {
            return Err(SessionError::invalid_configuration(
                "failover_poll_interval",
                "must be non-zero",
            ));
        }
        url::Url::parse(&self.rejoin_origin)
            .map_err(|e| SessionError::invalid_configuration("rejoin_origin", e.to_string()))?;
        Ok(())
    }
}
