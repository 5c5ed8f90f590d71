//! Provider-forced restart
//!
//! When a provider reports a reconnect it cannot resume from in place, the
//! session is restarted cold: the controller waits for the network to come
//! back, tears the session down, and navigates the host to its own origin
//! with every join parameter encoded in the query string. The restarted host
//! decodes the query with [`FailoverSnapshot::from_url`] and joins again with
//! [`FailoverSnapshot::to_join_config`].
//!
//! ```rust
//! use confbench_conference_core::{FailoverSnapshot, JoinConfig, ProviderKind, Role};
//!
//! let config = JoinConfig::new(ProviderKind::Zoom, "t1", "42").with_role(Role::Host);
//! let snapshot = FailoverSnapshot::from_config(&config);
//! let url = snapshot.to_rejoin_url("https://app.example/meet").unwrap();
//! assert_eq!(FailoverSnapshot::from_url(url.as_str()).unwrap(), snapshot);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::capability::ProviderAdapter;
use crate::config::{AutoJoinPreferences, Credentials, FeatureToggles, JoinConfig, LayoutFlags, MediaOptions};
use crate::error::{SessionError, SessionResult};
use crate::types::{DeviceKind, ProviderKind, Role};

mod keys {
    pub const PROVIDER: &str = "provider";
    pub const SDK_KEY: &str = "sdkKey";
    pub const SDK_SECRET: &str = "sdkSecret";
    pub const WEB_ENDPOINT: &str = "webEndpoint";
    pub const ENFORCE_GALLERY_VIEW: &str = "enforceGalleryView";
    pub const SESSION_PASSWORD: &str = "sessionPassword";
    pub const SIGNATURE: &str = "signature";
    pub const SESSION_KEY: &str = "sessionKey";
    pub const USER_IDENTITY: &str = "userIdentity";
    pub const TOPIC: &str = "topic";
    pub const NAME: &str = "name";
    pub const MEDIA_FEATURES: &str = "mediaFeatures";
    pub const NOISE_SUPPRESSION: &str = "noiseSuppression";
    pub const ORIGINAL_SOUND: &str = "originalSound";
    pub const ROLE: &str = "role";
    pub const VIDEO_MODE: &str = "videoMode";
    pub const AUDIO_MODE: &str = "audioMode";
    pub const SELF_FULLSCREEN: &str = "selfFullscreen";
    pub const REMOTE_FULLSCREEN: &str = "remoteFullscreen";
    pub const VIDEO_ENABLED: &str = "videoEnabled";
    pub const AUDIO_ENABLED: &str = "audioEnabled";
    pub const CAMERA_LABEL: &str = "cameraLabel";
    pub const MIC_LABEL: &str = "micLabel";
    pub const SPEAKER_LABEL: &str = "speakerLabel";
}

/// Everything needed to rejoin after a cold restart
///
/// Captured once at trigger time and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverSnapshot {
    provider: ProviderKind,
    sdk_key: Option<String>,
    sdk_secret: Option<String>,
    web_endpoint: Option<String>,
    enforce_gallery_view: bool,
    session_password: Option<String>,
    signature: Option<String>,
    session_key: Option<String>,
    user_identity: Option<String>,
    topic: String,
    name: String,
    media_features: Option<String>,
    noise_suppression: bool,
    original_sound: bool,
    role: Role,
    video_mode: String,
    audio_mode: String,
    self_fullscreen: bool,
    remote_fullscreen: bool,
    video_enabled: bool,
    audio_enabled: bool,
    camera_label: Option<String>,
    mic_label: Option<String>,
    speaker_label: Option<String>,
}

impl FailoverSnapshot {
    /// Snapshot of a join request; device labels come from its preferences
    pub fn from_config(config: &JoinConfig) -> Self {
        Self {
            provider: config.provider,
            sdk_key: config.credentials.key.clone(),
            sdk_secret: config.credentials.secret.clone(),
            web_endpoint: config.web_endpoint.clone(),
            enforce_gallery_view: config.layout.enforce_gallery_view,
            session_password: config.password.clone(),
            signature: config.signature.clone(),
            session_key: config.session_key.clone(),
            user_identity: config.user_identity.clone(),
            topic: config.topic.clone(),
            name: config.user_name.clone(),
            media_features: config.media.media_features.clone(),
            noise_suppression: config.features.noise_suppression,
            original_sound: config.features.original_sound,
            role: config.role,
            video_mode: config.media.video_mode.clone(),
            audio_mode: config.media.audio_mode.clone(),
            self_fullscreen: config.layout.self_fullscreen,
            remote_fullscreen: config.layout.remote_fullscreen,
            video_enabled: config.media.video_enabled,
            audio_enabled: config.media.audio_enabled,
            camera_label: config.preferred_camera().map(str::to_string),
            mic_label: config.preferred_microphone().map(str::to_string),
            speaker_label: config.preferred_speaker().map(str::to_string),
        }
    }

    /// Snapshot of a live session: current media flags and device labels win
    /// over what the join request asked for
    pub fn capture(config: &JoinConfig, adapter: &dyn ProviderAdapter) -> Self {
        let mut snapshot = Self::from_config(config);
        snapshot.video_enabled = adapter.is_video_enabled();
        snapshot.audio_enabled = adapter.is_audio_enabled();
        if let Some(label) = adapter.current_device_label(DeviceKind::Camera) {
            snapshot.camera_label = Some(label);
        }
        if let Some(label) = adapter.current_device_label(DeviceKind::Microphone) {
            snapshot.mic_label = Some(label);
        }
        if let Some(label) = adapter.current_device_label(DeviceKind::Speaker) {
            snapshot.speaker_label = Some(label);
        }
        snapshot
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn sdk_key(&self) -> Option<&str> {
        self.sdk_key.as_deref()
    }

    pub fn sdk_secret(&self) -> Option<&str> {
        self.sdk_secret.as_deref()
    }

    pub fn web_endpoint(&self) -> Option<&str> {
        self.web_endpoint.as_deref()
    }

    pub fn enforce_gallery_view(&self) -> bool {
        self.enforce_gallery_view
    }

    pub fn session_password(&self) -> Option<&str> {
        self.session_password.as_deref()
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    pub fn user_identity(&self) -> Option<&str> {
        self.user_identity.as_deref()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_features(&self) -> Option<&str> {
        self.media_features.as_deref()
    }

    pub fn noise_suppression(&self) -> bool {
        self.noise_suppression
    }

    pub fn original_sound(&self) -> bool {
        self.original_sound
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn video_mode(&self) -> &str {
        &self.video_mode
    }

    pub fn audio_mode(&self) -> &str {
        &self.audio_mode
    }

    pub fn self_fullscreen(&self) -> bool {
        self.self_fullscreen
    }

    pub fn remote_fullscreen(&self) -> bool {
        self.remote_fullscreen
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn camera_label(&self) -> Option<&str> {
        self.camera_label.as_deref()
    }

    pub fn mic_label(&self) -> Option<&str> {
        self.mic_label.as_deref()
    }

    pub fn speaker_label(&self) -> Option<&str> {
        self.speaker_label.as_deref()
    }

    /// Key/value pairs in encoding order; `None` values are omitted
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(24);
        let mut push = |key: &'static str, value: Option<&String>| {
            if let Some(v) = value {
                pairs.push((key, v.clone()));
            }
        };

        push(keys::PROVIDER, Some(&self.provider.to_string()));
        push(keys::SDK_KEY, self.sdk_key.as_ref());
        push(keys::SDK_SECRET, self.sdk_secret.as_ref());
        push(keys::WEB_ENDPOINT, self.web_endpoint.as_ref());
        push(keys::ENFORCE_GALLERY_VIEW, Some(&self.enforce_gallery_view.to_string()));
        push(keys::SESSION_PASSWORD, self.session_password.as_ref());
        push(keys::SIGNATURE, self.signature.as_ref());
        push(keys::SESSION_KEY, self.session_key.as_ref());
        push(keys::USER_IDENTITY, self.user_identity.as_ref());
        push(keys::TOPIC, Some(&self.topic));
        push(keys::NAME, Some(&self.name));
        push(keys::MEDIA_FEATURES, self.media_features.as_ref());
        push(keys::NOISE_SUPPRESSION, Some(&self.noise_suppression.to_string()));
        push(keys::ORIGINAL_SOUND, Some(&self.original_sound.to_string()));
        push(keys::ROLE, Some(&self.role.as_number().to_string()));
        push(keys::VIDEO_MODE, Some(&self.video_mode));
        push(keys::AUDIO_MODE, Some(&self.audio_mode));
        push(keys::SELF_FULLSCREEN, Some(&self.self_fullscreen.to_string()));
        push(keys::REMOTE_FULLSCREEN, Some(&self.remote_fullscreen.to_string()));
        push(keys::VIDEO_ENABLED, Some(&self.video_enabled.to_string()));
        push(keys::AUDIO_ENABLED, Some(&self.audio_enabled.to_string()));
        push(keys::CAMERA_LABEL, self.camera_label.as_ref());
        push(keys::MIC_LABEL, self.mic_label.as_ref());
        push(keys::SPEAKER_LABEL, self.speaker_label.as_ref());
        pairs
    }

    /// Append the encoded snapshot to `origin`, replacing any existing query
    pub fn to_rejoin_url(&self, origin: &str) -> SessionResult<Url> {
        let mut url = Url::parse(origin)?;
        url.set_fragment(None);
        url.query_pairs_mut().clear().extend_pairs(self.to_pairs());
        Ok(url)
    }

    /// Decode a full rejoin URL
    pub fn from_url(url: &str) -> SessionResult<Self> {
        let url = Url::parse(url)?;
        Self::from_query(url.query().unwrap_or_default())
    }

    /// Decode a query string (without the leading `?`)
    ///
    /// Unknown keys are ignored. A missing required key or a malformed
    /// boolean, role or provider is a configuration error.
    pub fn from_query(query: &str) -> SessionResult<Self> {
        let mut map: HashMap<String, String> = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            map.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
        let fields = Fields(map);

        Ok(Self {
            provider: fields.required(keys::PROVIDER)?.parse()?,
            sdk_key: fields.optional(keys::SDK_KEY),
            sdk_secret: fields.optional(keys::SDK_SECRET),
            web_endpoint: fields.optional(keys::WEB_ENDPOINT),
            enforce_gallery_view: fields.flag(keys::ENFORCE_GALLERY_VIEW)?,
            session_password: fields.optional(keys::SESSION_PASSWORD),
            signature: fields.optional(keys::SIGNATURE),
            session_key: fields.optional(keys::SESSION_KEY),
            user_identity: fields.optional(keys::USER_IDENTITY),
            topic: fields.required(keys::TOPIC)?.to_string(),
            name: fields.required(keys::NAME)?.to_string(),
            media_features: fields.optional(keys::MEDIA_FEATURES),
            noise_suppression: fields.flag(keys::NOISE_SUPPRESSION)?,
            original_sound: fields.flag(keys::ORIGINAL_SOUND)?,
            role: fields.role()?,
            video_mode: fields.required(keys::VIDEO_MODE)?.to_string(),
            audio_mode: fields.required(keys::AUDIO_MODE)?.to_string(),
            self_fullscreen: fields.flag(keys::SELF_FULLSCREEN)?,
            remote_fullscreen: fields.flag(keys::REMOTE_FULLSCREEN)?,
            video_enabled: fields.flag(keys::VIDEO_ENABLED)?,
            audio_enabled: fields.flag(keys::AUDIO_ENABLED)?,
            camera_label: fields.optional(keys::CAMERA_LABEL),
            mic_label: fields.optional(keys::MIC_LABEL),
            speaker_label: fields.optional(keys::SPEAKER_LABEL),
        })
    }

    /// Rebuild the auto-join request; device labels become preferred names
    pub fn to_join_config(&self) -> JoinConfig {
        let auto_join = (self.camera_label.is_some() || self.mic_label.is_some() || self.speaker_label.is_some())
            .then(|| AutoJoinPreferences {
                camera: self.camera_label.clone(),
                microphone: self.mic_label.clone(),
                speaker: self.speaker_label.clone(),
            });

        JoinConfig {
            provider: self.provider,
            topic: self.topic.clone(),
            user_name: self.name.clone(),
            role: self.role,
            password: self.session_password.clone(),
            credentials: Credentials {
                key: self.sdk_key.clone(),
                secret: self.sdk_secret.clone(),
            },
            signature: self.signature.clone(),
            session_key: self.session_key.clone(),
            user_identity: self.user_identity.clone(),
            web_endpoint: self.web_endpoint.clone(),
            media: MediaOptions {
                video_mode: self.video_mode.clone(),
                audio_mode: self.audio_mode.clone(),
                video_enabled: self.video_enabled,
                audio_enabled: self.audio_enabled,
                media_features: self.media_features.clone(),
            },
            layout: LayoutFlags {
                self_fullscreen: self.self_fullscreen,
                remote_fullscreen: self.remote_fullscreen,
                enforce_gallery_view: self.enforce_gallery_view,
            },
            features: FeatureToggles {
                noise_suppression: self.noise_suppression,
                original_sound: self.original_sound,
            },
            auto_join,
        }
    }
}

struct Fields(HashMap<String, String>);

impl Fields {
    fn required(&self, key: &str) -> SessionResult<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SessionError::missing_configuration(key))
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn flag(&self, key: &str) -> SessionResult<bool> {
        match self.required(key)? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(SessionError::invalid_configuration(
                key,
                format!("expected true or false, got '{}'", other),
            )),
        }
    }

    fn role(&self) -> SessionResult<Role> {
        let raw = self.required(keys::ROLE)?;
        raw.parse::<u8>()
            .ok()
            .and_then(Role::from_number)
            .ok_or_else(|| SessionError::invalid_configuration(keys::ROLE, format!("expected 0 or 1, got '{}'", raw)))
    }
}

// ===== CONTROLLER =====

/// Reports whether the host currently has network connectivity
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Performs the full navigation that restarts the host
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, url: Url) -> SessionResult<()>;
}

/// Tears down the current session before navigation
#[async_trait]
pub trait FailoverHost: Send + Sync {
    async fn teardown(&self) -> SessionResult<()>;
}

/// Monitor that always reports online
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl NetworkMonitor for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Navigator that only logs the target; for hosts that restart themselves
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

#[async_trait]
impl Navigator for LogNavigator {
    async fn navigate(&self, url: Url) -> SessionResult<()> {
        info!(url = %url, "Rejoin navigation requested");
        Ok(())
    }
}

/// Runs at most one failover cycle at a time
pub struct FailoverController {
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    origin: String,
    monitor: Arc<dyn NetworkMonitor>,
    navigator: Arc<dyn Navigator>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FailoverController {
    pub fn new(
        monitor: Arc<dyn NetworkMonitor>,
        navigator: Arc<dyn Navigator>,
        origin: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            poll_interval,
            origin: origin.into(),
            monitor,
            navigator,
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a failover cycle; returns false if one is already running
    ///
    /// The network is first checked one poll interval after the trigger, then
    /// every interval until it reports online.
    pub fn trigger(&self, snapshot: FailoverSnapshot, host: Arc<dyn FailoverHost>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Failover already running, ignoring trigger");
            return false;
        }

        info!(provider = %snapshot.provider(), topic = %snapshot.topic(), "Failover started");

        let running = Arc::clone(&self.running);
        let monitor = Arc::clone(&self.monitor);
        let navigator = Arc::clone(&self.navigator);
        let origin = self.origin.clone();
        let poll_interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            let mut poll = interval_at(Instant::now() + poll_interval, poll_interval);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                poll.tick().await;
                if monitor.is_online().await {
                    break;
                }
                debug!("Network still offline, waiting to restart session");
            }
            drop(poll);

            if let Err(e) = host.teardown().await {
                warn!(error = %e, "Session teardown during failover failed");
            }

            match snapshot.to_rejoin_url(&origin) {
                Ok(url) => {
                    info!(url = %url, "Navigating to rejoin");
                    if let Err(e) = navigator.navigate(url).await {
                        error!(error = %e, "Rejoin navigation failed");
                    }
                }
                Err(e) => error!(error = %e, origin = %origin, "Cannot build rejoin URL"),
            }
            running.store(false, Ordering::SeqCst);
        });

        *self.task.lock() = Some(handle);
        true
    }

    /// Abort a pending cycle; idempotent
    pub fn cancel(&self) {
        if let Some(handle) = self.task.lock().take() {
            if !handle.is_finished() {
                debug!("Cancelling failover poll");
            }
            handle.abort();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for FailoverController {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> JoinConfig {
        JoinConfig::new(ProviderKind::Agora, "room & co", "Zoë")
            .with_role(Role::Host)
            .with_credentials("app-id", "")
            .with_password("p@ss=1")
            .with_signature("sig/+=")
            .with_session_key("sk")
            .with_user_identity("uid-9")
            .with_web_endpoint("zoom.us")
            .with_media(MediaOptions {
                video_mode: "hd".into(),
                audio_mode: "music".into(),
                video_enabled: true,
                audio_enabled: false,
                media_features: Some("a1b2".into()),
            })
            .with_layout(LayoutFlags {
                self_fullscreen: true,
                remote_fullscreen: false,
                enforce_gallery_view: true,
            })
            .with_features(FeatureToggles {
                noise_suppression: false,
                original_sound: true,
            })
            .with_auto_join(AutoJoinPreferences {
                camera: Some("FaceTime HD".into()),
                microphone: Some("USB Mic".into()),
                speaker: None,
            })
    }

    #[test]
    fn every_field_survives_the_round_trip() {
        let snapshot = FailoverSnapshot::from_config(&full_config());
        let url = snapshot.to_rejoin_url("https://app.example/session?stale=1#frag").unwrap();
        assert!(url.query().unwrap().starts_with("provider=agora"));
        assert!(url.fragment().is_none());

        let decoded = FailoverSnapshot::from_query(url.query().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.to_pairs(), snapshot.to_pairs());
    }

    #[test]
    fn empty_strings_are_kept_and_none_is_omitted() {
        let snapshot = FailoverSnapshot::from_config(&full_config());
        let url = snapshot.to_rejoin_url("http://localhost:3000/").unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("sdkSecret=&"));
        assert!(!query.contains("speakerLabel"));
        assert_eq!(FailoverSnapshot::from_url(url.as_str()).unwrap().sdk_secret(), Some(""));
    }

    #[test]
    fn role_and_booleans_use_fixed_spellings() {
        let snapshot = FailoverSnapshot::from_config(&full_config());
        let pairs: HashMap<_, _> = snapshot.to_pairs().into_iter().collect();
        assert_eq!(pairs["role"], "1");
        assert_eq!(pairs["videoEnabled"], "true");
        assert_eq!(pairs["audioEnabled"], "false");
    }

    #[test]
    fn malformed_values_are_rejected() {
        let good = FailoverSnapshot::from_config(&full_config()).to_rejoin_url("http://h/").unwrap();
        let query = good.query().unwrap().to_string();

        let bad_role = query.replace("role=1", "role=host");
        assert!(matches!(
            FailoverSnapshot::from_query(&bad_role),
            Err(SessionError::InvalidConfiguration { .. })
        ));

        let bad_flag = query.replace("videoEnabled=true", "videoEnabled=yes");
        assert!(matches!(
            FailoverSnapshot::from_query(&bad_flag),
            Err(SessionError::InvalidConfiguration { .. })
        ));

        let missing = query.replace("topic=", "other=");
        assert_eq!(
            FailoverSnapshot::from_query(&missing).unwrap_err(),
            SessionError::missing_configuration("topic")
        );
    }

    #[test]
    fn join_config_reuses_labels_as_preferences() {
        let config = full_config();
        let rebuilt = FailoverSnapshot::from_config(&config).to_join_config();
        assert_eq!(rebuilt, config);
        assert_eq!(rebuilt.preferred_microphone(), Some("USB Mic"));
    }

    #[test]
    fn like_suffixed_provider_decodes() {
        let snapshot = FailoverSnapshot::from_config(&JoinConfig::new(ProviderKind::Zoom, "t1", "42"));
        let query = snapshot
            .to_rejoin_url("http://h/")
            .unwrap()
            .query()
            .unwrap()
            .replace("provider=zoom", "provider=zoom-like");
        assert_eq!(FailoverSnapshot::from_query(&query).unwrap().provider(), ProviderKind::Zoom);
    }
}
