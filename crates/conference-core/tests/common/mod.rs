//! Shared fixtures for the session integration tests: scripted provider
//! transports, a recording callback handler and an in-memory surface host.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use confbench_conference_core::adapters::agora::{
    AgoraBackgroundSource, AgoraDeviceInfo, AgoraDeviceKind, AgoraEvent, AgoraVideoStats,
};
use confbench_conference_core::adapters::trtc::{TrtcDeviceInfo, TrtcEvent, TrtcRole};
use confbench_conference_core::adapters::zoom::{ZoomDevice, ZoomEvent, ZoomUser, ZoomVideoStatistic};
use confbench_conference_core::failover::{Navigator, NetworkMonitor};
use confbench_conference_core::*;

/// Counts transports that are currently inside a session
///
/// The switches apply to every transport built through the harness.
#[derive(Default)]
pub struct Live {
    joined: AtomicUsize,
    created: AtomicUsize,
    /// Vendor refuses the join outright
    pub reject_join: AtomicBool,
    /// Zoom joins but reports no current user
    pub omit_current_user: AtomicBool,
}

impl Live {
    pub fn joined(&self) -> usize {
        self.joined.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        self.joined.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.joined.fetch_sub(1, Ordering::SeqCst);
    }
}

fn transport_error() -> TransportError {
    TransportError::new(-5, "device busy")
}

fn join_rejected() -> TransportError {
    TransportError::new(3001, "session not started")
}

/// Poll `condition` until it holds or roughly twenty seconds have passed
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..2000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ===== ZOOM =====

pub struct MockZoom {
    live: Arc<Live>,
    tx: mpsc::UnboundedSender<ZoomEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<ZoomEvent>>>,
    user_id: u32,
    joined_as: Mutex<Option<ZoomUser>>,
    in_session: AtomicBool,
    pub fail_switch: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl MockZoom {
    pub fn new(live: Arc<Live>, user_id: u32) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        live.created.fetch_add(1, Ordering::SeqCst);
        Self {
            live,
            tx,
            rx: Mutex::new(Some(rx)),
            user_id,
            joined_as: Mutex::new(None),
            in_session: AtomicBool::new(false),
            fail_switch: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: ZoomEvent) {
        let _ = self.tx.send(event);
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    fn devices(prefix: &str, labels: &[&str]) -> Vec<ZoomDevice> {
        let mut list = vec![ZoomDevice {
            device_id: "default".to_string(),
            label: "System default".to_string(),
        }];
        list.extend(labels.iter().enumerate().map(|(i, label)| ZoomDevice {
            device_id: format!("{}-{}", prefix, i + 1),
            label: label.to_string(),
        }));
        list
    }

    fn switch(&self, call: &str, device_id: &str) -> TransportResult<()> {
        if self.fail_switch.load(Ordering::SeqCst) {
            return Err(transport_error());
        }
        self.record(format!("{}:{}", call, device_id));
        Ok(())
    }
}

#[async_trait]
impl ZoomTransport for MockZoom {
    fn events(&self) -> Option<mpsc::UnboundedReceiver<ZoomEvent>> {
        self.rx.lock().take()
    }

    async fn join(&self, topic: &str, signature: &str, user_name: &str, _password: Option<&str>) -> TransportResult<()> {
        self.record(format!("join:{}:{}", topic, signature));
        if self.live.reject_join.load(Ordering::SeqCst) {
            return Err(join_rejected());
        }
        if !self.live.omit_current_user.load(Ordering::SeqCst) {
            *self.joined_as.lock() = Some(ZoomUser {
                user_id: self.user_id,
                display_name: user_name.to_string(),
                video_on: false,
                muted: None,
            });
        }
        self.in_session.store(true, Ordering::SeqCst);
        self.live.enter();
        Ok(())
    }

    async fn leave(&self) -> TransportResult<()> {
        self.record("leave");
        if self.in_session.swap(false, Ordering::SeqCst) {
            self.live.exit();
        }
        Ok(())
    }

    fn current_user(&self) -> Option<ZoomUser> {
        self.joined_as.lock().clone()
    }

    async fn start_video(&self, camera_id: Option<&str>) -> TransportResult<()> {
        self.record(format!("start_video:{}", camera_id.unwrap_or("-")));
        Ok(())
    }

    async fn stop_video(&self) -> TransportResult<()> {
        self.record("stop_video");
        Ok(())
    }

    async fn start_audio(&self) -> TransportResult<()> {
        self.record("start_audio");
        Ok(())
    }

    async fn mute_audio(&self) -> TransportResult<()> {
        self.record("mute_audio");
        Ok(())
    }

    async fn unmute_audio(&self) -> TransportResult<()> {
        self.record("unmute_audio");
        Ok(())
    }

    async fn camera_list(&self) -> TransportResult<Vec<ZoomDevice>> {
        Ok(Self::devices("cam", &["Front Camera", "USB Camera"]))
    }

    async fn microphone_list(&self) -> TransportResult<Vec<ZoomDevice>> {
        Ok(Self::devices("mic", &["Built-in Microphone", "Headset Microphone"]))
    }

    async fn speaker_list(&self) -> TransportResult<Vec<ZoomDevice>> {
        Ok(Self::devices("spk", &["Built-in Speakers", "Headphones"]))
    }

    async fn switch_camera(&self, device_id: &str) -> TransportResult<()> {
        self.switch("switch_camera", device_id)
    }

    async fn switch_microphone(&self, device_id: &str) -> TransportResult<()> {
        self.switch("switch_microphone", device_id)
    }

    async fn switch_speaker(&self, device_id: &str) -> TransportResult<()> {
        self.switch("switch_speaker", device_id)
    }

    async fn local_video_statistic(&self) -> TransportResult<Option<ZoomVideoStatistic>> {
        Ok(Some(ZoomVideoStatistic {
            width: 1280,
            height: 720,
            fps: 30,
            bandwidth: 250_000,
            avg_loss: 0.0,
            rtt: 30,
        }))
    }

    async fn remote_video_statistics(&self) -> TransportResult<Vec<(u32, ZoomVideoStatistic)>> {
        Ok(Vec::new())
    }

    async fn render_video(&self, user_id: u32, surface: &str) -> TransportResult<()> {
        self.record(format!("render:{}:{}", user_id, surface));
        Ok(())
    }

    async fn stop_render_video(&self, user_id: u32, surface: &str) -> TransportResult<()> {
        self.record(format!("stop_render:{}:{}", user_id, surface));
        Ok(())
    }

    async fn is_support_virtual_background(&self) -> bool {
        true
    }

    async fn update_virtual_background(&self, image_url: Option<&str>) -> TransportResult<()> {
        self.record(format!("vb:{}", image_url.unwrap_or("blur")));
        Ok(())
    }

    async fn remove_virtual_background(&self) -> TransportResult<()> {
        self.record("vb:off");
        Ok(())
    }

    async fn enable_noise_suppression(&self, enabled: bool) -> TransportResult<()> {
        self.record(format!("noise_suppression:{}", enabled));
        Ok(())
    }
}

// ===== AGORA =====

pub struct MockAgora {
    live: Arc<Live>,
    tx: mpsc::UnboundedSender<AgoraEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<AgoraEvent>>>,
    uid: String,
    in_session: AtomicBool,
    pub fail_switch: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl MockAgora {
    pub fn new(live: Arc<Live>, uid: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        live.created.fetch_add(1, Ordering::SeqCst);
        Self {
            live,
            tx,
            rx: Mutex::new(Some(rx)),
            uid: uid.into(),
            in_session: AtomicBool::new(false),
            fail_switch: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: AgoraEvent) {
        let _ = self.tx.send(event);
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

#[async_trait]
impl AgoraTransport for MockAgora {
    fn events(&self) -> Option<mpsc::UnboundedReceiver<AgoraEvent>> {
        self.rx.lock().take()
    }

    async fn join(&self, app_id: &str, channel: &str, _token: Option<&str>, uid: Option<&str>) -> TransportResult<String> {
        self.record(format!("join:{}:{}", app_id, channel));
        if self.live.reject_join.load(Ordering::SeqCst) {
            return Err(join_rejected());
        }
        self.in_session.store(true, Ordering::SeqCst);
        self.live.enter();
        Ok(uid.map(str::to_string).unwrap_or_else(|| self.uid.clone()))
    }

    async fn leave(&self) -> TransportResult<()> {
        self.record("leave");
        if self.in_session.swap(false, Ordering::SeqCst) {
            self.live.exit();
        }
        Ok(())
    }

    async fn publish_camera(&self, device_id: Option<&str>) -> TransportResult<()> {
        self.record(format!("publish_camera:{}", device_id.unwrap_or("-")));
        Ok(())
    }

    async fn unpublish_camera(&self) -> TransportResult<()> {
        self.record("unpublish_camera");
        Ok(())
    }

    async fn publish_microphone(&self, device_id: Option<&str>) -> TransportResult<()> {
        self.record(format!("publish_microphone:{}", device_id.unwrap_or("-")));
        Ok(())
    }

    async fn unpublish_microphone(&self) -> TransportResult<()> {
        self.record("unpublish_microphone");
        Ok(())
    }

    async fn publish_file_audio(&self, source: &str) -> TransportResult<()> {
        self.record(format!("publish_file_audio:{}", source));
        Ok(())
    }

    async fn devices(&self) -> TransportResult<Vec<AgoraDeviceInfo>> {
        let device = |kind, id: &str, label: &str| AgoraDeviceInfo {
            kind,
            device_id: id.to_string(),
            label: label.to_string(),
        };
        Ok(vec![
            device(AgoraDeviceKind::VideoInput, "cam-a", "Integrated Webcam"),
            device(AgoraDeviceKind::VideoInput, "cam-b", "Studio Camera"),
            device(AgoraDeviceKind::AudioInput, "communications", "Communications"),
            device(AgoraDeviceKind::AudioInput, "mic-a", "Array Microphone"),
            device(AgoraDeviceKind::AudioInput, "mic-b", "Podcast Microphone (default)"),
            device(AgoraDeviceKind::AudioOutput, "spk-a", "Monitor Speakers"),
        ])
    }

    async fn set_device(&self, kind: AgoraDeviceKind, device_id: &str) -> TransportResult<()> {
        if self.fail_switch.load(Ordering::SeqCst) {
            return Err(transport_error());
        }
        self.record(format!("set_device:{:?}:{}", kind, device_id));
        Ok(())
    }

    async fn local_video_stats(&self) -> TransportResult<Option<AgoraVideoStats>> {
        Ok(None)
    }

    async fn remote_video_stats(&self) -> TransportResult<HashMap<String, AgoraVideoStats>> {
        Ok(HashMap::new())
    }

    async fn play_remote_video(&self, uid: &str, surface: &str) -> TransportResult<()> {
        self.record(format!("play:{}:{}", uid, surface));
        Ok(())
    }

    async fn stop_remote_video(&self, uid: &str) -> TransportResult<()> {
        self.record(format!("stop:{}", uid));
        Ok(())
    }

    async fn check_virtual_background_compatibility(&self) -> bool {
        true
    }

    async fn set_virtual_background(&self, source: AgoraBackgroundSource) -> TransportResult<()> {
        self.record(format!("vb:{:?}", source));
        Ok(())
    }

    async fn disable_virtual_background(&self) -> TransportResult<()> {
        self.record("vb:off");
        Ok(())
    }

    async fn enable_denoiser(&self, enabled: bool) -> TransportResult<()> {
        self.record(format!("denoiser:{}", enabled));
        Ok(())
    }
}

// ===== TRTC =====

pub struct MockTrtc {
    live: Arc<Live>,
    tx: mpsc::UnboundedSender<TrtcEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<TrtcEvent>>>,
    in_session: AtomicBool,
    pub fail_switch: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl MockTrtc {
    pub fn new(live: Arc<Live>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        live.created.fetch_add(1, Ordering::SeqCst);
        Self {
            live,
            tx,
            rx: Mutex::new(Some(rx)),
            in_session: AtomicBool::new(false),
            fail_switch: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: TrtcEvent) {
        let _ = self.tx.send(event);
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    fn switch(&self, call: &str, device_id: &str) -> TransportResult<()> {
        if self.fail_switch.load(Ordering::SeqCst) {
            return Err(transport_error());
        }
        self.record(format!("{}:{}", call, device_id));
        Ok(())
    }
}

fn trtc_device(id: impl Into<String>, name: &str) -> TrtcDeviceInfo {
    TrtcDeviceInfo {
        device_id: id.into(),
        device_name: name.to_string(),
    }
}

#[async_trait]
impl TrtcTransport for MockTrtc {
    fn events(&self) -> Option<mpsc::UnboundedReceiver<TrtcEvent>> {
        self.rx.lock().take()
    }

    async fn enter_room(
        &self,
        sdk_app_id: u32,
        room_id: &str,
        user_id: &str,
        _user_sig: &str,
        role: TrtcRole,
    ) -> TransportResult<()> {
        self.record(format!("enter_room:{}:{}:{}:{:?}", sdk_app_id, room_id, user_id, role));
        if self.live.reject_join.load(Ordering::SeqCst) {
            return Err(join_rejected());
        }
        self.in_session.store(true, Ordering::SeqCst);
        self.live.enter();
        Ok(())
    }

    async fn exit_room(&self) -> TransportResult<()> {
        self.record("exit_room");
        if self.in_session.swap(false, Ordering::SeqCst) {
            self.live.exit();
        }
        Ok(())
    }

    async fn start_local_video(&self, camera_id: Option<&str>) -> TransportResult<()> {
        self.record(format!("start_local_video:{}", camera_id.unwrap_or("-")));
        Ok(())
    }

    async fn stop_local_video(&self) -> TransportResult<()> {
        self.record("stop_local_video");
        Ok(())
    }

    async fn start_local_audio(&self, mic_id: Option<&str>) -> TransportResult<()> {
        self.record(format!("start_local_audio:{}", mic_id.unwrap_or("-")));
        Ok(())
    }

    async fn stop_local_audio(&self) -> TransportResult<()> {
        self.record("stop_local_audio");
        Ok(())
    }

    async fn start_local_file(&self, path: &str) -> TransportResult<()> {
        self.record(format!("start_local_file:{}", path));
        Ok(())
    }

    async fn camera_devices(&self) -> TransportResult<Vec<TrtcDeviceInfo>> {
        Ok(vec![
            trtc_device("x".repeat(80), "Virtual Camera"),
            trtc_device("trtc-cam-1", "HD Camera"),
        ])
    }

    async fn mic_devices(&self) -> TransportResult<Vec<TrtcDeviceInfo>> {
        Ok(vec![trtc_device("", "Ghost Mic"), trtc_device("trtc-mic-1", "Desk Mic")])
    }

    async fn speaker_devices(&self) -> TransportResult<Vec<TrtcDeviceInfo>> {
        Ok(vec![trtc_device("trtc-spk-1", "Soundbar")])
    }

    async fn set_current_camera(&self, device_id: &str) -> TransportResult<()> {
        self.switch("set_current_camera", device_id)
    }

    async fn set_current_mic(&self, device_id: &str) -> TransportResult<()> {
        self.switch("set_current_mic", device_id)
    }

    async fn set_current_speaker(&self, device_id: &str) -> TransportResult<()> {
        self.switch("set_current_speaker", device_id)
    }

    async fn start_remote_view(&self, user_id: &str, surface: &str) -> TransportResult<()> {
        self.record(format!("start_remote_view:{}:{}", user_id, surface));
        Ok(())
    }

    async fn stop_remote_view(&self, user_id: &str) -> TransportResult<()> {
        self.record(format!("stop_remote_view:{}", user_id));
        Ok(())
    }
}

// ===== HARNESS =====

/// Registry over mock transports that remembers every transport it built
pub struct Harness {
    pub live: Arc<Live>,
    pub zoom: Arc<Mutex<Vec<Arc<MockZoom>>>>,
    pub agora: Arc<Mutex<Vec<Arc<MockAgora>>>>,
    pub trtc: Arc<Mutex<Vec<Arc<MockTrtc>>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            live: Arc::new(Live::default()),
            zoom: Arc::new(Mutex::new(Vec::new())),
            agora: Arc::new(Mutex::new(Vec::new())),
            trtc: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn registry(&self) -> ProviderRegistry {
        let (live, built) = (Arc::clone(&self.live), Arc::clone(&self.zoom));
        let next_id = Arc::new(AtomicU32::new(16_778_240));
        let registry = ProviderRegistry::new().with_zoom(move || {
            let mock = Arc::new(MockZoom::new(Arc::clone(&live), next_id.fetch_add(1, Ordering::SeqCst)));
            built.lock().push(Arc::clone(&mock));
            mock as Arc<dyn ZoomTransport>
        });

        let (live, built) = (Arc::clone(&self.live), Arc::clone(&self.agora));
        let registry = registry.with_agora(move || {
            let mock = Arc::new(MockAgora::new(Arc::clone(&live), "agora-local"));
            built.lock().push(Arc::clone(&mock));
            mock as Arc<dyn AgoraTransport>
        });

        let (live, built) = (Arc::clone(&self.live), Arc::clone(&self.trtc));
        registry.with_trtc(move || {
            let mock = Arc::new(MockTrtc::new(Arc::clone(&live)));
            built.lock().push(Arc::clone(&mock));
            mock as Arc<dyn TrtcTransport>
        })
    }

    pub fn last_zoom(&self) -> Arc<MockZoom> {
        Arc::clone(self.zoom.lock().last().expect("no zoom transport built"))
    }

    pub fn last_agora(&self) -> Arc<MockAgora> {
        Arc::clone(self.agora.lock().last().expect("no agora transport built"))
    }

    pub fn last_trtc(&self) -> Arc<MockTrtc> {
        Arc::clone(self.trtc.lock().last().expect("no trtc transport built"))
    }
}

/// A join config each mock provider accepts
pub fn config_for(provider: ProviderKind) -> JoinConfig {
    let config = JoinConfig::new(provider, "weekly-sync", "alice");
    match provider {
        ProviderKind::Zoom => config.with_signature("sig-zoom"),
        ProviderKind::Agora => config.with_app_id("agora-app"),
        ProviderKind::Trtc => config.with_app_id("1400000001").with_signature("sig-trtc"),
    }
}

// ===== CALLBACKS =====

/// Records every event delivered to it
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(SessionEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }
}

#[async_trait]
impl SessionEventHandler for RecordingHandler {
    async fn on_event(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub errors: Mutex<Vec<String>>,
    pub notices: Mutex<Vec<String>>,
    pub qualities: Mutex<Vec<NetworkQuality>>,
}

#[async_trait]
impl UiNotifier for RecordingNotifier {
    async fn show_error(&self, message: String, _error: SessionError) {
        self.errors.lock().push(message);
    }

    async fn network_quality(&self, quality: NetworkQuality) {
        self.qualities.lock().push(quality);
    }

    async fn show_notice(&self, message: String) {
        self.notices.lock().push(message);
    }
}

// ===== VIDEO SURFACES =====

/// Surface host that tracks live surfaces per participant
#[derive(Default)]
pub struct MockSurfaceHost {
    live: Mutex<HashMap<ParticipantId, usize>>,
    peak: AtomicUsize,
    created: AtomicUsize,
    pub delay: Option<Duration>,
}

impl MockSurfaceHost {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn live_for(&self, participant: &ParticipantId) -> usize {
        self.live.lock().get(participant).copied().unwrap_or(0)
    }

    /// Highest number of simultaneous surfaces seen for any one participant
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoSurfaceHost for MockSurfaceHost {
    async fn create_surface(&self, participant: &ParticipantId) -> SessionResult<SurfaceId> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let count = {
            let mut live = self.live.lock();
            let count = live.entry(participant.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.peak.fetch_max(count, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(SurfaceId::generate())
    }

    async fn remove_surface(&self, participant: &ParticipantId, _surface: &SurfaceId) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(count) = self.live.lock().get_mut(participant) {
            *count = count.saturating_sub(1);
        }
    }
}

// ===== FAILOVER =====

/// Network monitor driven by the test
pub struct SwitchableNetwork {
    online: AtomicBool,
}

impl SwitchableNetwork {
    pub fn offline() -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(false),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkMonitor for SwitchableNetwork {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub urls: Mutex<Vec<Url>>,
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn navigate(&self, url: Url) -> SessionResult<()> {
        self.urls.lock().push(url);
        Ok(())
    }
}
