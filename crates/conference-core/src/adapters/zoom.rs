//! Zoom-style provider
//!
//! Native traits of this transport:
//!
//! - numeric user ids, and user-added/updated/removed events that include the
//!   local user (the roster filters it)
//! - join requires a signature; when the join config has none, the configured
//!   [`TokenProvider`] is asked for one
//! - the audio pipeline must be started ([`PreJoinAudio`]) before unmute
//! - network quality is reported per user and direction on a 0..=5 scale where
//!   higher is better
//! - a reconnect with reason `"failover"` cannot be resumed in place

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::common::{spawn_pump, AdapterCore};
use super::TransportResult;
use crate::capability::{PreJoinAudio, ProviderAdapter, VirtualBackground};
use crate::config::JoinConfig;
use crate::devices::{DeviceList, MediaDevice, RawDevices};
use crate::error::{SessionError, SessionResult};
use crate::events::{EventSink, SessionEvent};
use crate::token::{TokenProvider, TokenRequest};
use crate::types::{
    AdapterState, BackgroundPreset, ConnectionChange, ConnectionState, DeviceKind, LocalIdentity,
    MediaKind, ParticipantId, ProviderKind, QualityLevel, RemoteParticipant, RemoteVideoStats,
    SurfaceId, VideoStats,
};

/// Reconnect reason after which the session must be restarted
pub const FAILOVER_REASON: &str = "failover";

/// A user as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoomUser {
    pub user_id: u32,
    pub display_name: String,
    pub video_on: bool,
    /// `None` while the user has no audio connected
    pub muted: Option<bool>,
}

impl ZoomUser {
    fn audio_active(&self) -> bool {
        self.muted == Some(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomVideoAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomQualityDirection {
    Uplink,
    Downlink,
}

/// Native events
#[derive(Debug, Clone, PartialEq)]
pub enum ZoomEvent {
    UserAdded(Vec<ZoomUser>),
    UserUpdated(Vec<ZoomUser>),
    UserRemoved(Vec<ZoomUser>),
    PeerVideoStateChange { action: ZoomVideoAction, user_id: u32 },
    ActiveShareChange { active: bool, user_id: u32 },
    /// `state` is one of `Connected`, `Reconnecting`, `Closed`, `Fail`
    ConnectionChange { state: String, reason: Option<String> },
    NetworkQualityChange {
        user_id: u32,
        direction: ZoomQualityDirection,
        /// 0..=5, higher is better
        level: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoomDevice {
    pub device_id: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoomVideoStatistic {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Bytes per second
    pub bandwidth: u32,
    pub avg_loss: f32,
    pub rtt: u32,
}

impl From<ZoomVideoStatistic> for VideoStats {
    fn from(s: ZoomVideoStatistic) -> Self {
        VideoStats {
            width: s.width,
            height: s.height,
            fps: s.fps,
            bitrate_kbps: s.bandwidth.saturating_mul(8) / 1000,
            packet_loss_pct: s.avg_loss,
            rtt_ms: Some(s.rtt),
        }
    }
}

/// Host binding for the Zoom-style SDK
#[async_trait]
pub trait ZoomTransport: Send + Sync {
    /// Native event stream; yields `Some` exactly once
    fn events(&self) -> Option<mpsc::UnboundedReceiver<ZoomEvent>>;

    async fn join(&self, topic: &str, signature: &str, user_name: &str, password: Option<&str>) -> TransportResult<()>;

    async fn leave(&self) -> TransportResult<()>;

    /// The local user once joined
    fn current_user(&self) -> Option<ZoomUser>;

    async fn start_video(&self, camera_id: Option<&str>) -> TransportResult<()>;

    async fn stop_video(&self) -> TransportResult<()>;

    /// Connect the audio pipeline (joins muted)
    async fn start_audio(&self) -> TransportResult<()>;

    async fn mute_audio(&self) -> TransportResult<()>;

    async fn unmute_audio(&self) -> TransportResult<()>;

    async fn camera_list(&self) -> TransportResult<Vec<ZoomDevice>>;

    async fn microphone_list(&self) -> TransportResult<Vec<ZoomDevice>>;

    async fn speaker_list(&self) -> TransportResult<Vec<ZoomDevice>>;

    async fn switch_camera(&self, device_id: &str) -> TransportResult<()>;

    async fn switch_microphone(&self, device_id: &str) -> TransportResult<()>;

    async fn switch_speaker(&self, device_id: &str) -> TransportResult<()>;

    async fn local_video_statistic(&self) -> TransportResult<Option<ZoomVideoStatistic>>;

    async fn remote_video_statistics(&self) -> TransportResult<Vec<(u32, ZoomVideoStatistic)>>;

    async fn render_video(&self, user_id: u32, surface: &str) -> TransportResult<()>;

    async fn stop_render_video(&self, user_id: u32, surface: &str) -> TransportResult<()>;

    async fn is_support_virtual_background(&self) -> bool;

    /// `None` blurs instead of compositing an image
    async fn update_virtual_background(&self, image_url: Option<&str>) -> TransportResult<()>;

    async fn remove_virtual_background(&self) -> TransportResult<()>;

    async fn enable_noise_suppression(&self, enabled: bool) -> TransportResult<()>;
}

pub struct ZoomAdapter {
    core: Arc<AdapterCore>,
    transport: Arc<dyn ZoomTransport>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    audio_ready: AtomicBool,
}

impl ZoomAdapter {
    /// Build the adapter and start forwarding native events into `sink`
    pub fn new(
        transport: Arc<dyn ZoomTransport>,
        sink: EventSink,
        token_provider: Option<Arc<dyn TokenProvider>>,
    ) -> SessionResult<Self> {
        let events = transport
            .events()
            .ok_or_else(|| SessionError::internal_error("zoom event stream already taken"))?;
        let core = AdapterCore::new(ProviderKind::Zoom, sink);
        spawn_pump(&core, events, translate);
        Ok(Self {
            core,
            transport,
            token_provider,
            audio_ready: AtomicBool::new(false),
        })
    }

    async fn resolve_signature(&self, config: &JoinConfig) -> SessionResult<String> {
        if let Some(signature) = config.signature.as_deref().filter(|s| !s.is_empty()) {
            return Ok(signature.to_string());
        }
        let provider = self
            .token_provider
            .as_ref()
            .ok_or_else(|| SessionError::missing_configuration("signature"))?;

        let mut request = TokenRequest::new(&config.topic, &config.user_name, config.role);
        request.session_key = config.session_key.clone();
        debug!(topic = %config.topic, "No signature supplied, fetching one");

        provider.fetch(&request).await.map_err(|e| match e {
            SessionError::TokenAcquisitionFailed { .. } => e,
            other => SessionError::token_acquisition_failed(other.to_string()),
        })
    }

    async fn connect(&self, config: &JoinConfig) -> SessionResult<LocalIdentity> {
        let signature = self.resolve_signature(config).await?;
        self.transport
            .join(&config.topic, &signature, &config.user_name, config.password.as_deref())
            .await
            .map_err(|e| e.into_session(ProviderKind::Zoom, "join"))?;

        // The transport is in the session from here on; a failure must leave it.
        let Some(user) = self.transport.current_user() else {
            if let Err(e) = self.transport.leave().await {
                warn!(error = %e, "Leave after incomplete join failed");
            }
            return Err(SessionError::provider_error(
                ProviderKind::Zoom,
                "join",
                -1,
                "no current user after join",
            ));
        };
        Ok(LocalIdentity {
            id: user.user_id.into(),
            display_name: user.display_name,
        })
    }

    fn user_id(participant: &ParticipantId) -> SessionResult<u32> {
        participant.as_str().parse().map_err(|_| {
            SessionError::invalid_configuration("participant", format!("'{}' is not a numeric user id", participant))
        })
    }
}

impl Drop for ZoomAdapter {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

#[async_trait]
impl ProviderAdapter for ZoomAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Zoom
    }

    fn state(&self) -> AdapterState {
        self.core.state()
    }

    async fn join(&self, config: &JoinConfig) -> SessionResult<LocalIdentity> {
        self.core.begin_join(config.auto_join.as_ref())?;
        let result = self.connect(config).await;
        self.core.finish_join(result)
    }

    async fn leave(&self) -> SessionResult<()> {
        if !self.core.begin_leave() {
            return Ok(());
        }
        let result = self.transport.leave().await;
        self.audio_ready.store(false, Ordering::SeqCst);
        self.core.finish_leave();
        result.map_err(|e| e.into_session(ProviderKind::Zoom, "leave"))
    }

    async fn destroy(&self) -> SessionResult<()> {
        if let Err(e) = self.leave().await {
            warn!(error = %e, "Leave failed during destroy");
        }
        self.core.shutdown();
        Ok(())
    }

    async fn start_video(&self, enable: bool, device_id: Option<&str>) -> SessionResult<()> {
        let _serial = self.core.video_lock.lock().await;
        self.core.ensure_joined()?;
        if enable == self.core.video_enabled() {
            return Ok(());
        }

        if enable {
            let _switch = self.core.claim_explicit_device(DeviceKind::Camera, device_id)?;
            let camera = device_id.map(str::to_string).or_else(|| self.core.current_device_id(DeviceKind::Camera));
            self.transport
                .start_video(camera.as_deref())
                .await
                .map_err(|e| e.into_session(ProviderKind::Zoom, "start_video"))?;
            if let Some(id) = camera.as_deref() {
                self.core.record_device(DeviceKind::Camera, id);
            }
        } else {
            self.transport
                .stop_video()
                .await
                .map_err(|e| e.into_session(ProviderKind::Zoom, "stop_video"))?;
        }
        self.core.set_video_enabled(enable);
        Ok(())
    }

    async fn start_audio(&self, enable: bool, device_id: Option<&str>) -> SessionResult<()> {
        let _serial = self.core.audio_lock.lock().await;
        self.core.ensure_joined()?;
        if enable == self.core.audio_enabled() {
            return Ok(());
        }

        if enable {
            if !self.is_audio_ready() {
                return Err(SessionError::invalid_state("audio started", "audio pipeline not started"));
            }
            let _switch = self.core.claim_explicit_device(DeviceKind::Microphone, device_id)?;
            if let Some(id) = device_id {
                self.transport
                    .switch_microphone(id)
                    .await
                    .map_err(|e| e.into_session(ProviderKind::Zoom, "switch_microphone"))?;
                self.core.record_device(DeviceKind::Microphone, id);
            }
            self.transport
                .unmute_audio()
                .await
                .map_err(|e| e.into_session(ProviderKind::Zoom, "unmute_audio"))?;
        } else {
            self.transport
                .mute_audio()
                .await
                .map_err(|e| e.into_session(ProviderKind::Zoom, "mute_audio"))?;
        }
        self.core.set_audio_enabled(enable);
        Ok(())
    }

    fn is_video_enabled(&self) -> bool {
        self.core.video_enabled()
    }

    fn is_audio_enabled(&self) -> bool {
        self.core.audio_enabled()
    }

    async fn device_list(&self) -> SessionResult<DeviceList> {
        let map = |list: Vec<ZoomDevice>| -> Vec<MediaDevice> {
            list.into_iter().map(|d| MediaDevice::new(d.device_id, d.label)).collect()
        };
        let err = |e: super::TransportError| e.into_session(ProviderKind::Zoom, "enumerate_devices");

        let raw = RawDevices {
            cameras: map(self.transport.camera_list().await.map_err(err)?),
            microphones: map(self.transport.microphone_list().await.map_err(err)?),
            speakers: map(self.transport.speaker_list().await.map_err(err)?),
        };
        Ok(self.core.reconcile_devices(raw))
    }

    async fn set_device(&self, kind: DeviceKind, device_id: &str) -> SessionResult<()> {
        if kind == DeviceKind::File {
            return Err(SessionError::UnsupportedDevice {
                provider: ProviderKind::Zoom,
                kind,
            });
        }
        let _switch = self.core.begin_device_switch(kind)?;
        self.core.check_known_device(kind, device_id)?;

        let result = match kind {
            DeviceKind::Camera => self.transport.switch_camera(device_id).await,
            DeviceKind::Microphone => self.transport.switch_microphone(device_id).await,
            _ => self.transport.switch_speaker(device_id).await,
        };
        result.map_err(|e| e.into_session(ProviderKind::Zoom, "switch_device"))?;

        self.core.record_device(kind, device_id);
        debug!(kind = %kind, device_id, "Switched device");
        Ok(())
    }

    fn current_device_label(&self, kind: DeviceKind) -> Option<String> {
        self.core.current_device_label(kind)
    }

    fn local_video_stats(&self) -> Option<VideoStats> {
        self.core.local_stats()
    }

    fn remote_video_stats(&self) -> Option<RemoteVideoStats> {
        self.core.remote_stats()
    }

    async fn refresh_stats(&self) -> SessionResult<()> {
        self.core.ensure_joined()?;
        let local = self
            .transport
            .local_video_statistic()
            .await
            .map_err(|e| e.into_session(ProviderKind::Zoom, "video_statistic"))?;
        let remote = self
            .transport
            .remote_video_statistics()
            .await
            .map_err(|e| e.into_session(ProviderKind::Zoom, "video_statistic"))?;

        self.core.set_local_stats(local.map(VideoStats::from));
        let remote: RemoteVideoStats = remote
            .into_iter()
            .map(|(user_id, stat)| (ParticipantId::from(user_id), VideoStats::from(stat)))
            .collect();
        self.core.set_remote_stats((!remote.is_empty()).then_some(remote));
        Ok(())
    }

    async fn render_remote_video(&self, participant: &ParticipantId, surface: &SurfaceId) -> SessionResult<()> {
        let user_id = Self::user_id(participant)?;
        self.transport
            .render_video(user_id, surface.as_str())
            .await
            .map_err(|e| e.into_session(ProviderKind::Zoom, "render_video"))
    }

    async fn stop_remote_video(&self, participant: &ParticipantId, surface: &SurfaceId) -> SessionResult<()> {
        let user_id = Self::user_id(participant)?;
        self.transport
            .stop_render_video(user_id, surface.as_str())
            .await
            .map_err(|e| e.into_session(ProviderKind::Zoom, "stop_render_video"))
    }

    fn failover_reason(&self) -> Option<&'static str> {
        Some(FAILOVER_REASON)
    }

    fn pre_join_audio(&self) -> Option<&dyn PreJoinAudio> {
        Some(self)
    }

    fn virtual_background(&self) -> Option<&dyn VirtualBackground> {
        Some(self)
    }

    async fn set_noise_suppression(&self, enabled: bool) -> SessionResult<()> {
        self.transport
            .enable_noise_suppression(enabled)
            .await
            .map_err(|e| e.into_session(ProviderKind::Zoom, "noise_suppression"))
    }
}

#[async_trait]
impl PreJoinAudio for ZoomAdapter {
    async fn bring_up_audio(&self) -> SessionResult<()> {
        if self.is_audio_ready() {
            return Ok(());
        }
        self.transport
            .start_audio()
            .await
            .map_err(|e| e.into_session(ProviderKind::Zoom, "start_audio"))?;
        self.audio_ready.store(true, Ordering::SeqCst);
        info!("Audio pipeline started");
        Ok(())
    }

    fn is_audio_ready(&self) -> bool {
        self.audio_ready.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VirtualBackground for ZoomAdapter {
    async fn is_supported(&self) -> bool {
        self.transport.is_support_virtual_background().await
    }

    async fn apply(&self, preset: &BackgroundPreset) -> SessionResult<()> {
        self.transport
            .update_virtual_background(preset.image_url.as_deref())
            .await
            .map_err(|e| e.into_session(ProviderKind::Zoom, "virtual_background"))
    }

    async fn clear(&self) -> SessionResult<()> {
        self.transport
            .remove_virtual_background()
            .await
            .map_err(|e| e.into_session(ProviderKind::Zoom, "virtual_background"))
    }
}

fn connection_state(state: &str) -> ConnectionState {
    match state {
        "Connected" => ConnectionState::Connected,
        "Reconnecting" => ConnectionState::Reconnecting,
        "Closed" => ConnectionState::Disconnected,
        "Fail" => ConnectionState::Failed,
        _ => ConnectionState::Connecting,
    }
}

fn translate(core: &AdapterCore, event: ZoomEvent) -> Vec<SessionEvent> {
    match event {
        ZoomEvent::UserAdded(users) => users
            .into_iter()
            .map(|user| {
                let mut participant = RemoteParticipant::new(user.user_id).with_display_name(&user.display_name);
                participant.audio_active = user.audio_active();
                participant.video_active = user.video_on;
                SessionEvent::ParticipantJoined(participant)
            })
            .collect(),
        ZoomEvent::UserUpdated(users) => users
            .into_iter()
            .flat_map(|user| {
                let participant = ParticipantId::from(user.user_id);
                let audio = media_event(participant.clone(), MediaKind::Audio, user.audio_active());
                let video = media_event(participant, MediaKind::Video, user.video_on);
                [audio, video]
            })
            .collect(),
        ZoomEvent::UserRemoved(users) => users
            .into_iter()
            .map(|user| SessionEvent::ParticipantLeft(user.user_id.into()))
            .collect(),
        ZoomEvent::PeerVideoStateChange { action, user_id } => {
            vec![media_event(user_id.into(), MediaKind::Video, action == ZoomVideoAction::Start)]
        }
        ZoomEvent::ActiveShareChange { active, user_id } => {
            vec![media_event(user_id.into(), MediaKind::ScreenShare, active)]
        }
        ZoomEvent::ConnectionChange { state, reason } => {
            let canonical = connection_state(&state);
            let failure = (canonical == ConnectionState::Failed).then(|| {
                SessionEvent::Error(SessionError::connectivity_error(format!(
                    "connection failed: {}",
                    reason.as_deref().unwrap_or("no reason given")
                )))
            });
            let mut events = vec![SessionEvent::ConnectionStateChanged(ConnectionChange {
                state: canonical,
                raw: state,
                reason,
            })];
            events.extend(failure);
            events
        }
        ZoomEvent::NetworkQualityChange {
            user_id,
            direction,
            level,
        } => {
            // Only the local user's link is reported upward.
            if !core.is_local(&ParticipantId::from(user_id)) {
                return Vec::new();
            }
            let level = QualityLevel::from_higher_is_better(level);
            let sample = match direction {
                ZoomQualityDirection::Uplink => core.merge_quality(Some(level), None),
                ZoomQualityDirection::Downlink => core.merge_quality(None, Some(level)),
            };
            vec![SessionEvent::NetworkQualityChanged(sample)]
        }
    }
}

fn media_event(participant: ParticipantId, media: MediaKind, active: bool) -> SessionEvent {
    if active {
        SessionEvent::MediaPublished { participant, media }
    } else {
        SessionEvent::MediaUnpublished { participant, media }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> Arc<AdapterCore> {
        let (sink, _rx) = EventSink::channel();
        AdapterCore::new(ProviderKind::Zoom, sink)
    }

    #[test]
    fn user_added_carries_media_flags() {
        let events = translate(
            &core(),
            ZoomEvent::UserAdded(vec![ZoomUser {
                user_id: 16778240,
                display_name: "Ann".into(),
                video_on: true,
                muted: Some(true),
            }]),
        );
        match &events[..] {
            [SessionEvent::ParticipantJoined(p)] => {
                assert_eq!(p.id.as_str(), "16778240");
                assert!(p.video_active);
                assert!(!p.audio_active);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn connection_states_keep_raw_value_and_reason() {
        let events = translate(
            &core(),
            ZoomEvent::ConnectionChange {
                state: "Reconnecting".into(),
                reason: Some(FAILOVER_REASON.into()),
            },
        );
        assert_eq!(
            events,
            vec![SessionEvent::ConnectionStateChanged(ConnectionChange {
                state: ConnectionState::Reconnecting,
                raw: "Reconnecting".into(),
                reason: Some("failover".into()),
            })]
        );
    }

    #[test]
    fn failed_connection_also_reports_an_error() {
        let events = translate(
            &core(),
            ZoomEvent::ConnectionChange {
                state: "Fail".into(),
                reason: None,
            },
        );
        match &events[..] {
            [SessionEvent::ConnectionStateChanged(change), SessionEvent::Error(err)] => {
                assert_eq!(change.state, ConnectionState::Failed);
                assert_eq!(err.category(), "connectivity");
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn remote_quality_reports_are_ignored() {
        let core = core();
        core.begin_join(None).unwrap();
        core.finish_join(Ok(LocalIdentity {
            id: 1u32.into(),
            display_name: "me".into(),
        }))
        .unwrap();

        let remote = translate(
            &core,
            ZoomEvent::NetworkQualityChange {
                user_id: 2,
                direction: ZoomQualityDirection::Uplink,
                level: 5,
            },
        );
        assert!(remote.is_empty());

        let local = translate(
            &core,
            ZoomEvent::NetworkQualityChange {
                user_id: 1,
                direction: ZoomQualityDirection::Downlink,
                level: 1,
            },
        );
        match &local[..] {
            [SessionEvent::NetworkQualityChanged(sample)] => {
                assert_eq!(sample.downlink, QualityLevel::new(5));
                assert_eq!(sample.uplink, QualityLevel::UNKNOWN);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn statistic_bandwidth_converts_to_kbps() {
        let stats = VideoStats::from(ZoomVideoStatistic {
            width: 640,
            height: 360,
            fps: 24,
            bandwidth: 125_000,
            avg_loss: 0.5,
            rtt: 40,
        });
        assert_eq!(stats.bitrate_kbps, 1000);
        assert_eq!(stats.rtt_ms, Some(40));
    }
}
