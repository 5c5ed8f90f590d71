//! TRTC-style provider
//!
//! Enter/exit room events with separate audio and video availability, three
//! per-kind device lists, and statistics pushed by the transport rather than
//! polled. Connection state changes carry no reason.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::common::{spawn_pump, AdapterCore};
use super::{TransportError, TransportResult};
use crate::capability::ProviderAdapter;
use crate::config::JoinConfig;
use crate::devices::{DeviceList, MediaDevice, RawDevices};
use crate::error::{SessionError, SessionResult};
use crate::events::{EventSink, SessionEvent};
use crate::types::{
    AdapterState, ConnectionChange, ConnectionState, DeviceKind, LocalIdentity, MediaKind,
    ParticipantId, ProviderKind, QualityLevel, RemoteParticipant, RemoteVideoStats, Role, SurfaceId,
    VideoStats,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrtcRole {
    Anchor,
    Audience,
}

impl From<Role> for TrtcRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Host => TrtcRole::Anchor,
            Role::Participant => TrtcRole::Audience,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrtcStreamStatistics {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Kilobits per second
    pub video_bitrate: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrtcRemoteStatistics {
    pub user_id: String,
    pub stream: TrtcStreamStatistics,
    pub final_loss: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrtcStatistics {
    pub rtt: u32,
    pub up_loss: u32,
    pub down_loss: u32,
    pub local: Option<TrtcStreamStatistics>,
    pub remote: Vec<TrtcRemoteStatistics>,
}

/// Native events
#[derive(Debug, Clone, PartialEq)]
pub enum TrtcEvent {
    RemoteUserEnterRoom { user_id: String },
    RemoteUserLeaveRoom { user_id: String, reason: i32 },
    UserVideoAvailable { user_id: String, available: bool },
    UserAudioAvailable { user_id: String, available: bool },
    /// States are `DISCONNECTED`, `CONNECTING`, `RECONNECTING`, `CONNECTED`
    ConnectionStateChanged { prev: String, cur: String },
    /// Local quality and per-remote quality, 0..=6
    NetworkQuality {
        local_quality: u8,
        remote_quality: Vec<(String, u8)>,
    },
    Statistics(TrtcStatistics),
    Error { code: i32, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrtcDeviceInfo {
    pub device_id: String,
    pub device_name: String,
}

/// Host binding for the TRTC-style SDK
#[async_trait]
pub trait TrtcTransport: Send + Sync {
    /// Native event stream; yields `Some` exactly once
    fn events(&self) -> Option<mpsc::UnboundedReceiver<TrtcEvent>>;

    async fn enter_room(
        &self,
        sdk_app_id: u32,
        room_id: &str,
        user_id: &str,
        user_sig: &str,
        role: TrtcRole,
    ) -> TransportResult<()>;

    async fn exit_room(&self) -> TransportResult<()>;

    async fn start_local_video(&self, camera_id: Option<&str>) -> TransportResult<()>;

    async fn stop_local_video(&self) -> TransportResult<()>;

    async fn start_local_audio(&self, mic_id: Option<&str>) -> TransportResult<()>;

    async fn stop_local_audio(&self) -> TransportResult<()>;

    /// Publish a local file as the outgoing stream
    async fn start_local_file(&self, path: &str) -> TransportResult<()>;

    async fn camera_devices(&self) -> TransportResult<Vec<TrtcDeviceInfo>>;

    async fn mic_devices(&self) -> TransportResult<Vec<TrtcDeviceInfo>>;

    async fn speaker_devices(&self) -> TransportResult<Vec<TrtcDeviceInfo>>;

    async fn set_current_camera(&self, device_id: &str) -> TransportResult<()>;

    async fn set_current_mic(&self, device_id: &str) -> TransportResult<()>;

    async fn set_current_speaker(&self, device_id: &str) -> TransportResult<()>;

    async fn start_remote_view(&self, user_id: &str, surface: &str) -> TransportResult<()>;

    async fn stop_remote_view(&self, user_id: &str) -> TransportResult<()>;
}

pub struct TrtcAdapter {
    core: Arc<AdapterCore>,
    transport: Arc<dyn TrtcTransport>,
}

impl TrtcAdapter {
    pub fn new(transport: Arc<dyn TrtcTransport>, sink: EventSink) -> SessionResult<Self> {
        let events = transport
            .events()
            .ok_or_else(|| SessionError::internal_error("trtc event stream already taken"))?;
        let core = AdapterCore::new(ProviderKind::Trtc, sink);
        spawn_pump(&core, events, translate);
        Ok(Self { core, transport })
    }

    async fn connect(&self, config: &JoinConfig) -> SessionResult<LocalIdentity> {
        let sdk_app_id = config
            .credentials
            .key
            .as_deref()
            .and_then(|k| k.parse::<u32>().ok())
            .ok_or_else(|| SessionError::invalid_configuration("credentials.key", "sdk app id must be numeric"))?;
        let user_sig = config
            .signature
            .as_deref()
            .ok_or_else(|| SessionError::missing_configuration("signature (user sig)"))?;
        let user_id = config.requested_identity().to_string();

        self.transport
            .enter_room(sdk_app_id, &config.topic, &user_id, user_sig, config.role.into())
            .await
            .map_err(Self::err("enter_room"))?;
        Ok(LocalIdentity {
            id: user_id.into(),
            display_name: config.user_name.clone(),
        })
    }

    fn err(operation: &'static str) -> impl Fn(TransportError) -> SessionError {
        move |e| e.into_session(ProviderKind::Trtc, operation)
    }
}

impl Drop for TrtcAdapter {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

#[async_trait]
impl ProviderAdapter for TrtcAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Trtc
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
        let result = self.transport.exit_room().await;
        self.core.finish_leave();
        result.map_err(Self::err("exit_room"))
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
                .start_local_video(camera.as_deref())
                .await
                .map_err(Self::err("start_local_video"))?;
            if let Some(id) = camera.as_deref() {
                self.core.record_device(DeviceKind::Camera, id);
            }
        } else {
            self.transport.stop_local_video().await.map_err(Self::err("stop_local_video"))?;
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
                .start_local_audio(mic.as_deref())
                .await
                .map_err(Self::err("start_local_audio"))?;
            if let Some(id) = mic.as_deref() {
                self.core.record_device(DeviceKind::Microphone, id);
            }
        } else {
            self.transport.stop_local_audio().await.map_err(Self::err("stop_local_audio"))?;
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
        let map = |list: Vec<TrtcDeviceInfo>| -> Vec<MediaDevice> {
            list.into_iter().map(|d| MediaDevice::new(d.device_id, d.device_name)).collect()
        };
        let raw = RawDevices {
            cameras: map(self.transport.camera_devices().await.map_err(Self::err("enumerate_devices"))?),
            microphones: map(self.transport.mic_devices().await.map_err(Self::err("enumerate_devices"))?),
            speakers: map(self.transport.speaker_devices().await.map_err(Self::err("enumerate_devices"))?),
        };
        Ok(self.core.reconcile_devices(raw))
    }

    async fn set_device(&self, kind: DeviceKind, device_id: &str) -> SessionResult<()> {
        let _switch = self.core.begin_device_switch(kind)?;

        if kind == DeviceKind::File {
            self.core.ensure_joined()?;
            self.transport
                .start_local_file(device_id)
                .await
                .map_err(Self::err("start_local_file"))?;
            self.core.record_device(kind, device_id);
            debug!(path = device_id, "Publishing local file stream");
            return Ok(());
        }

        self.core.check_known_device(kind, device_id)?;
        let result = match kind {
            DeviceKind::Camera => self.transport.set_current_camera(device_id).await,
            DeviceKind::Microphone => self.transport.set_current_mic(device_id).await,
            _ => self.transport.set_current_speaker(device_id).await,
        };
        result.map_err(Self::err("set_device"))?;
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

    /// Statistics arrive through the event stream; nothing to pull
    async fn refresh_stats(&self) -> SessionResult<()> {
        self.core.ensure_joined()
    }

    async fn render_remote_video(&self, participant: &ParticipantId, surface: &SurfaceId) -> SessionResult<()> {
        self.transport
            .start_remote_view(participant.as_str(), surface.as_str())
            .await
            .map_err(Self::err("start_remote_view"))
    }

    async fn stop_remote_video(&self, participant: &ParticipantId, _surface: &SurfaceId) -> SessionResult<()> {
        self.transport
            .stop_remote_view(participant.as_str())
            .await
            .map_err(Self::err("stop_remote_view"))
    }
}

fn connection_state(state: &str) -> ConnectionState {
    match state {
        "CONNECTED" => ConnectionState::Connected,
        "RECONNECTING" => ConnectionState::Reconnecting,
        "DISCONNECTED" => ConnectionState::Disconnected,
        _ => ConnectionState::Connecting,
    }
}

fn stream_stats(stream: TrtcStreamStatistics, loss: u32, rtt: u32) -> VideoStats {
    VideoStats {
        width: stream.width,
        height: stream.height,
        fps: stream.frame_rate,
        bitrate_kbps: stream.video_bitrate,
        packet_loss_pct: loss as f32,
        rtt_ms: Some(rtt),
    }
}

fn translate(core: &AdapterCore, event: TrtcEvent) -> Vec<SessionEvent> {
    match event {
        TrtcEvent::RemoteUserEnterRoom { user_id } => {
            vec![SessionEvent::ParticipantJoined(RemoteParticipant::new(user_id))]
        }
        TrtcEvent::RemoteUserLeaveRoom { user_id, reason } => {
            debug!(user_id = %user_id, reason, "Remote user left room");
            vec![SessionEvent::ParticipantLeft(user_id.into())]
        }
        TrtcEvent::UserVideoAvailable { user_id, available } => vec![availability(user_id, MediaKind::Video, available)],
        TrtcEvent::UserAudioAvailable { user_id, available } => vec![availability(user_id, MediaKind::Audio, available)],
        TrtcEvent::ConnectionStateChanged { prev, cur } => {
            debug!(from = %prev, to = %cur, "Connection state change");
            vec![SessionEvent::ConnectionStateChanged(ConnectionChange {
                state: connection_state(&cur),
                raw: cur,
                reason: None,
            })]
        }
        TrtcEvent::NetworkQuality {
            local_quality,
            remote_quality,
        } => {
            // Downlink is the worst known remote stream.
            let downlink = remote_quality
                .iter()
                .map(|(_, q)| QualityLevel::new(*q))
                .filter(QualityLevel::is_known)
                .max()
                .unwrap_or(QualityLevel::UNKNOWN);
            let sample = core.merge_quality(Some(QualityLevel::new(local_quality)), Some(downlink));
            vec![SessionEvent::NetworkQualityChanged(sample)]
        }
        TrtcEvent::Statistics(stats) => {
            let rtt = stats.rtt;
            core.set_local_stats(stats.local.map(|s| stream_stats(s, stats.up_loss, rtt)));
            let remote: RemoteVideoStats = stats
                .remote
                .into_iter()
                .map(|r| (ParticipantId::from(r.user_id), stream_stats(r.stream, r.final_loss, rtt)))
                .collect();
            core.set_remote_stats((!remote.is_empty()).then_some(remote));
            Vec::new()
        }
        TrtcEvent::Error { code, message } => vec![SessionEvent::Error(SessionError::provider_error(
            ProviderKind::Trtc,
            "runtime",
            code,
            message,
        ))],
    }
}

fn availability(user_id: String, media: MediaKind, available: bool) -> SessionEvent {
    let participant = ParticipantId::from(user_id);
    if available {
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
        AdapterCore::new(ProviderKind::Trtc, sink)
    }

    #[test]
    fn statistics_events_fill_the_cache_silently() {
        let core = core();
        let events = translate(
            &core,
            TrtcEvent::Statistics(TrtcStatistics {
                rtt: 35,
                up_loss: 1,
                down_loss: 0,
                local: Some(TrtcStreamStatistics {
                    width: 1280,
                    height: 720,
                    frame_rate: 30,
                    video_bitrate: 1500,
                }),
                remote: vec![TrtcRemoteStatistics {
                    user_id: "peer".into(),
                    stream: TrtcStreamStatistics::default(),
                    final_loss: 3,
                }],
            }),
        );
        assert!(events.is_empty());
        assert_eq!(core.local_stats().unwrap().bitrate_kbps, 1500);
        let remote = core.remote_stats().unwrap();
        assert_eq!(remote[&ParticipantId::from("peer")].packet_loss_pct, 3.0);
    }

    #[test]
    fn downlink_uses_worst_remote_quality() {
        let events = translate(
            &core(),
            TrtcEvent::NetworkQuality {
                local_quality: 1,
                remote_quality: vec![("a".into(), 2), ("b".into(), 4), ("c".into(), 0)],
            },
        );
        match &events[..] {
            [SessionEvent::NetworkQualityChanged(sample)] => {
                assert_eq!(sample.uplink, QualityLevel::EXCELLENT);
                assert_eq!(sample.downlink.value(), 4);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn connection_changes_have_no_reason() {
        let events = translate(
            &core(),
            TrtcEvent::ConnectionStateChanged {
                prev: "CONNECTED".into(),
                cur: "RECONNECTING".into(),
            },
        );
        assert_eq!(
            events,
            vec![SessionEvent::ConnectionStateChanged(ConnectionChange {
                state: ConnectionState::Reconnecting,
                raw: "RECONNECTING".into(),
                reason: None,
            })]
        );
    }

    #[test]
    fn host_role_enters_as_anchor() {
        assert_eq!(TrtcRole::from(Role::Host), TrtcRole::Anchor);
        assert_eq!(TrtcRole::from(Role::Participant), TrtcRole::Audience);
    }
}
