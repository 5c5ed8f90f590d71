//! Agora-style provider
//!
//! String uids, no self events, remote media announced through
//! published/unpublished events, and a single combined device enumeration.
//! Network quality already uses the canonical 0..=6 scale.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::common::{spawn_pump, AdapterCore};
use super::{TransportError, TransportResult};
use crate::capability::{ProviderAdapter, VirtualBackground};
use crate::config::JoinConfig;
use crate::devices::{DeviceList, MediaDevice, RawDevices};
use crate::error::{SessionError, SessionResult};
use crate::events::{EventSink, SessionEvent};
use crate::types::{
    AdapterState, BackgroundPreset, ConnectionChange, ConnectionState, DeviceKind, LocalIdentity,
    MediaKind, ParticipantId, ProviderKind, QualityLevel, RemoteParticipant, RemoteVideoStats,
    SurfaceId, VideoStats,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgoraMediaType {
    Audio,
    Video,
}

impl From<AgoraMediaType> for MediaKind {
    fn from(media: AgoraMediaType) -> Self {
        match media {
            AgoraMediaType::Audio => MediaKind::Audio,
            AgoraMediaType::Video => MediaKind::Video,
        }
    }
}

/// Native events
#[derive(Debug, Clone, PartialEq)]
pub enum AgoraEvent {
    UserJoined { uid: String },
    UserLeft { uid: String, reason: String },
    UserPublished { uid: String, media_type: AgoraMediaType },
    UserUnpublished { uid: String, media_type: AgoraMediaType },
    /// States are `CONNECTING`, `CONNECTED`, `RECONNECTING`, `DISCONNECTING`, `DISCONNECTED`
    ConnectionStateChange {
        current: String,
        previous: String,
        reason: Option<String>,
    },
    /// Both on 0..=6: 0 unknown, 1 excellent, 6 down
    NetworkQuality { uplink: u8, downlink: u8 },
    Exception { code: i32, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgoraDeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgoraDeviceInfo {
    pub kind: AgoraDeviceKind,
    pub device_id: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgoraVideoStats {
    pub resolution_width: u32,
    pub resolution_height: u32,
    pub frame_rate: u32,
    /// Bits per second
    pub bitrate: u32,
    pub packet_loss_rate: f32,
    pub end_to_end_delay: Option<u32>,
}

impl From<AgoraVideoStats> for VideoStats {
    fn from(s: AgoraVideoStats) -> Self {
        VideoStats {
            width: s.resolution_width,
            height: s.resolution_height,
            fps: s.frame_rate,
            bitrate_kbps: s.bitrate / 1000,
            packet_loss_pct: s.packet_loss_rate,
            rtt_ms: s.end_to_end_delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgoraBackgroundSource {
    Blur,
    Image(String),
}

/// Host binding for the Agora-style SDK
#[async_trait]
pub trait AgoraTransport: Send + Sync {
    /// Native event stream; yields `Some` exactly once
    fn events(&self) -> Option<mpsc::UnboundedReceiver<AgoraEvent>>;

    /// Returns the uid the user was admitted under
    async fn join(&self, app_id: &str, channel: &str, token: Option<&str>, uid: Option<&str>) -> TransportResult<String>;

    async fn leave(&self) -> TransportResult<()>;

    async fn publish_camera(&self, device_id: Option<&str>) -> TransportResult<()>;

    async fn unpublish_camera(&self) -> TransportResult<()>;

    async fn publish_microphone(&self, device_id: Option<&str>) -> TransportResult<()>;

    async fn unpublish_microphone(&self) -> TransportResult<()>;

    /// Publish a file-backed audio source in place of the microphone
    async fn publish_file_audio(&self, source: &str) -> TransportResult<()>;

    async fn devices(&self) -> TransportResult<Vec<AgoraDeviceInfo>>;

    async fn set_device(&self, kind: AgoraDeviceKind, device_id: &str) -> TransportResult<()>;

    async fn local_video_stats(&self) -> TransportResult<Option<AgoraVideoStats>>;

    async fn remote_video_stats(&self) -> TransportResult<HashMap<String, AgoraVideoStats>>;

    async fn play_remote_video(&self, uid: &str, surface: &str) -> TransportResult<()>;

    async fn stop_remote_video(&self, uid: &str) -> TransportResult<()>;

    async fn check_virtual_background_compatibility(&self) -> bool;

    async fn set_virtual_background(&self, source: AgoraBackgroundSource) -> TransportResult<()>;

    async fn disable_virtual_background(&self) -> TransportResult<()>;

    async fn enable_denoiser(&self, enabled: bool) -> TransportResult<()>;
}

pub struct AgoraAdapter {
    core: Arc<AdapterCore>,
    transport: Arc<dyn AgoraTransport>,
}

impl AgoraAdapter {
    pub fn new(transport: Arc<dyn AgoraTransport>, sink: EventSink) -> SessionResult<Self> {
        let events = transport
            .events()
            .ok_or_else(|| SessionError::internal_error("agora event stream already taken"))?;
        let core = AdapterCore::new(ProviderKind::Agora, sink);
        spawn_pump(&core, events, translate);
        Ok(Self { core, transport })
    }

    async fn connect(&self, config: &JoinConfig) -> SessionResult<LocalIdentity> {
        let app_id = config
            .credentials
            .key
            .as_deref()
            .ok_or_else(|| SessionError::missing_configuration("credentials.key (app id)"))?;
        let uid = self
            .transport
            .join(
                app_id,
                &config.topic,
                config.signature.as_deref(),
                config.user_identity.as_deref(),
            )
            .await
            .map_err(|e| e.into_session(ProviderKind::Agora, "join"))?;
        Ok(LocalIdentity {
            id: uid.into(),
            display_name: config.user_name.clone(),
        })
    }

    fn err(operation: &'static str) -> impl Fn(TransportError) -> SessionError {
        move |e| e.into_session(ProviderKind::Agora, operation)
    }
}

impl Drop for AgoraAdapter {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

#[async_trait]
impl ProviderAdapter for AgoraAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Agora
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
        self.core.finish_leave();
        result.map_err(Self::err("leave"))
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
                .publish_camera(camera.as_deref())
                .await
                .map_err(Self::err("publish_camera"))?;
            if let Some(id) = camera.as_deref() {
                self.core.record_device(DeviceKind::Camera, id);
            }
        } else {
            self.transport.unpublish_camera().await.map_err(Self::err("unpublish_camera"))?;
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
            let _switch = self.core.claim_explicit_device(DeviceKind::Microphone, device_id)?;
            let mic = device_id
                .map(str::to_string)
                .or_else(|| self.core.current_device_id(DeviceKind::Microphone));
            self.transport
                .publish_microphone(mic.as_deref())
                .await
                .map_err(Self::err("publish_microphone"))?;
            if let Some(id) = mic.as_deref() {
                self.core.record_device(DeviceKind::Microphone, id);
            }
        } else {
            self.transport
                .unpublish_microphone()
                .await
                .map_err(Self::err("unpublish_microphone"))?;
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
        let mut raw = RawDevices::default();
        for info in self.transport.devices().await.map_err(Self::err("enumerate_devices"))? {
            let device = MediaDevice::new(info.device_id, info.label);
            match info.kind {
                AgoraDeviceKind::VideoInput => raw.cameras.push(device),
                AgoraDeviceKind::AudioInput => raw.microphones.push(device),
                AgoraDeviceKind::AudioOutput => raw.speakers.push(device),
            }
        }
        Ok(self.core.reconcile_devices(raw))
    }

    async fn set_device(&self, kind: DeviceKind, device_id: &str) -> SessionResult<()> {
        let _switch = self.core.begin_device_switch(kind)?;

        if kind == DeviceKind::File {
            self.core.ensure_joined()?;
            self.transport
                .publish_file_audio(device_id)
                .await
                .map_err(Self::err("publish_file_audio"))?;
            self.core.record_device(kind, device_id);
            self.core.set_audio_enabled(true);
            debug!(source = device_id, "Publishing file audio source");
            return Ok(());
        }

        self.core.check_known_device(kind, device_id)?;
        let native = match kind {
            DeviceKind::Camera => AgoraDeviceKind::VideoInput,
            DeviceKind::Microphone => AgoraDeviceKind::AudioInput,
            _ => AgoraDeviceKind::AudioOutput,
        };
        self.transport
            .set_device(native, device_id)
            .await
            .map_err(Self::err("set_device"))?;
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
        let local = self.transport.local_video_stats().await.map_err(Self::err("stats"))?;
        let remote = self.transport.remote_video_stats().await.map_err(Self::err("stats"))?;

        self.core.set_local_stats(local.map(VideoStats::from));
        let remote: RemoteVideoStats = remote
            .into_iter()
            .map(|(uid, stats)| (ParticipantId::from(uid), VideoStats::from(stats)))
            .collect();
        self.core.set_remote_stats((!remote.is_empty()).then_some(remote));
        Ok(())
    }

    async fn render_remote_video(&self, participant: &ParticipantId, surface: &SurfaceId) -> SessionResult<()> {
        self.transport
            .play_remote_video(participant.as_str(), surface.as_str())
            .await
            .map_err(Self::err("play_remote_video"))
    }

    async fn stop_remote_video(&self, participant: &ParticipantId, _surface: &SurfaceId) -> SessionResult<()> {
        self.transport
            .stop_remote_video(participant.as_str())
            .await
            .map_err(Self::err("stop_remote_video"))
    }

    fn virtual_background(&self) -> Option<&dyn VirtualBackground> {
        Some(self)
    }

    async fn set_noise_suppression(&self, enabled: bool) -> SessionResult<()> {
        self.transport.enable_denoiser(enabled).await.map_err(Self::err("denoiser"))
    }
}

#[async_trait]
impl VirtualBackground for AgoraAdapter {
    async fn is_supported(&self) -> bool {
        self.transport.check_virtual_background_compatibility().await
    }

    async fn apply(&self, preset: &BackgroundPreset) -> SessionResult<()> {
        let source = match &preset.image_url {
            Some(url) => AgoraBackgroundSource::Image(url.clone()),
            None => AgoraBackgroundSource::Blur,
        };
        self.transport
            .set_virtual_background(source)
            .await
            .map_err(Self::err("virtual_background"))
    }

    async fn clear(&self) -> SessionResult<()> {
        self.transport
            .disable_virtual_background()
            .await
            .map_err(Self::err("virtual_background"))
    }
}

fn connection_state(state: &str) -> ConnectionState {
    match state {
        "CONNECTED" => ConnectionState::Connected,
        "RECONNECTING" => ConnectionState::Reconnecting,
        "DISCONNECTING" | "DISCONNECTED" => ConnectionState::Disconnected,
        _ => ConnectionState::Connecting,
    }
}

fn translate(core: &AdapterCore, event: AgoraEvent) -> Vec<SessionEvent> {
    let event = match event {
        AgoraEvent::UserJoined { uid } => SessionEvent::ParticipantJoined(RemoteParticipant::new(uid)),
        AgoraEvent::UserLeft { uid, reason } => {
            debug!(uid = %uid, reason = %reason, "Remote user left");
            SessionEvent::ParticipantLeft(uid.into())
        }
        AgoraEvent::UserPublished { uid, media_type } => SessionEvent::MediaPublished {
            participant: uid.into(),
            media: media_type.into(),
        },
        AgoraEvent::UserUnpublished { uid, media_type } => SessionEvent::MediaUnpublished {
            participant: uid.into(),
            media: media_type.into(),
        },
        AgoraEvent::ConnectionStateChange {
            current,
            previous,
            reason,
        } => {
            debug!(from = %previous, to = %current, "Connection state change");
            SessionEvent::ConnectionStateChanged(ConnectionChange {
                state: connection_state(&current),
                raw: current,
                reason,
            })
        }
        AgoraEvent::NetworkQuality { uplink, downlink } => SessionEvent::NetworkQualityChanged(
            core.merge_quality(Some(QualityLevel::new(uplink)), Some(QualityLevel::new(downlink))),
        ),
        AgoraEvent::Exception { code, message } => {
            SessionEvent::Error(SessionError::provider_error(ProviderKind::Agora, "exception", code, message))
        }
    };
    vec![event]
}
