//! Session facade
//!
//! [`ConferenceSession`] is the single entry point a host application talks
//! to. It resolves a provider to an adapter, owns the adapter's lifecycle,
//! runs the event dispatcher that keeps the roster and forwards events to the
//! installed callbacks, and wires in statistics polling and failover.
//!
//! A session is an ordinary value: build as many as needed, each with its own
//! collaborators.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use confbench_conference_core::*;
//! # async fn example(zoom: Arc<dyn ZoomTransport>) -> SessionResult<()> {
//! let registry = ProviderRegistry::new()
//!     .with_zoom(move || Arc::clone(&zoom))
//!     .with_token_provider(Arc::new(HttpTokenProvider::new("https://api.example/token")?));
//!
//! let session = SessionBuilder::new().registry(registry).build()?;
//! session.use_basic_callbacks().await;
//!
//! let config = JoinConfig::new(ProviderKind::Zoom, "standup", "alice").with_video_enabled(true);
//! let me = session.join(config).await?;
//! println!("joined as {}", me.id);
//!
//! session.leave().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::adapters::{AgoraAdapter, AgoraTransport, TrtcAdapter, TrtcTransport, ZoomAdapter, ZoomTransport};
use crate::callbacks::{BasicCallbacks, CallbackTier, ExtendedCallbacks, UiNotifier};
use crate::capability::ProviderAdapter;
use crate::config::{JoinConfig, SessionSettings};
use crate::devices::DeviceList;
use crate::error::{SessionError, SessionResult};
use crate::events::{EventSink, SessionEvent, SessionEventHandler};
use crate::failover::{AlwaysOnline, FailoverController, FailoverHost, FailoverSnapshot, LogNavigator, Navigator, NetworkMonitor};
use crate::prefs::{PreferenceStore, Preferences};
use crate::render::{AttachOutcome, VideoAttachments, VideoSurfaceHost};
use crate::roster::Roster;
use crate::stats::StatsMonitor;
use crate::store::{MemoryStore, StateStore, StoreAction};
use crate::token::TokenProvider;
use crate::types::{
    AdapterState, BackgroundPreset, ConnectionState, DeviceKind, LocalIdentity, ParticipantId,
    ProviderKind, RemoteParticipant, RemoteVideoStats, VideoStats,
};

// ===== ADAPTER RESOLUTION =====

/// Builds an adapter for a provider, wired to the given sink
pub trait AdapterFactory: Send + Sync {
    fn create(&self, provider: ProviderKind, sink: EventSink) -> SessionResult<Arc<dyn ProviderAdapter>>;
}

type TransportCtor<T> = Box<dyn Fn() -> Arc<T> + Send + Sync>;

/// [`AdapterFactory`] over host-supplied transport constructors
#[derive(Default)]
pub struct ProviderRegistry {
    zoom: Option<TransportCtor<dyn ZoomTransport>>,
    agora: Option<TransportCtor<dyn AgoraTransport>>,
    trtc: Option<TransportCtor<dyn TrtcTransport>>,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zoom<F>(mut self, ctor: F) -> Self
    where
        F: Fn() -> Arc<dyn ZoomTransport> + Send + Sync + 'static,
    {
        self.zoom = Some(Box::new(ctor));
        self
    }

    pub fn with_agora<F>(mut self, ctor: F) -> Self
    where
        F: Fn() -> Arc<dyn AgoraTransport> + Send + Sync + 'static,
    {
        self.agora = Some(Box::new(ctor));
        self
    }

    pub fn with_trtc<F>(mut self, ctor: F) -> Self
    where
        F: Fn() -> Arc<dyn TrtcTransport> + Send + Sync + 'static,
    {
        self.trtc = Some(Box::new(ctor));
        self
    }

    /// Signature source for providers that join with one
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn is_registered(&self, provider: ProviderKind) -> bool {
        match provider {
            ProviderKind::Zoom => self.zoom.is_some(),
            ProviderKind::Agora => self.agora.is_some(),
            ProviderKind::Trtc => self.trtc.is_some(),
        }
    }
}

impl AdapterFactory for ProviderRegistry {
    fn create(&self, provider: ProviderKind, sink: EventSink) -> SessionResult<Arc<dyn ProviderAdapter>> {
        let not_registered = || SessionError::ProviderNotRegistered {
            provider: provider.to_string(),
        };
        let adapter: Arc<dyn ProviderAdapter> = match provider {
            ProviderKind::Zoom => {
                let ctor = self.zoom.as_ref().ok_or_else(not_registered)?;
                Arc::new(ZoomAdapter::new(ctor(), sink, self.token_provider.clone())?)
            }
            ProviderKind::Agora => {
                let ctor = self.agora.as_ref().ok_or_else(not_registered)?;
                Arc::new(AgoraAdapter::new(ctor(), sink)?)
            }
            ProviderKind::Trtc => {
                let ctor = self.trtc.as_ref().ok_or_else(not_registered)?;
                Arc::new(TrtcAdapter::new(ctor(), sink)?)
            }
        };
        Ok(adapter)
    }
}

// ===== BUILDER =====

/// Fluent construction of a [`ConferenceSession`]
pub struct SessionBuilder {
    factory: Option<Arc<dyn AdapterFactory>>,
    store: Option<Arc<dyn StateStore>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    network: Option<Arc<dyn NetworkMonitor>>,
    navigator: Option<Arc<dyn Navigator>>,
    surfaces: Option<Arc<dyn VideoSurfaceHost>>,
    callbacks: Option<Arc<dyn SessionEventHandler>>,
    background_presets: Vec<BackgroundPreset>,
    settings: SessionSettings,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            factory: None,
            store: None,
            preferences: None,
            network: None,
            navigator: None,
            surfaces: None,
            callbacks: None,
            background_presets: Vec::new(),
            settings: SessionSettings::default(),
        }
    }

    pub fn factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn registry(self, registry: ProviderRegistry) -> Self {
        self.factory(Arc::new(registry))
    }

    /// Defaults to a [`MemoryStore`]
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to in-memory preferences
    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network = Some(monitor);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Required for remote video attach/detach
    pub fn surface_host(mut self, host: Arc<dyn VideoSurfaceHost>) -> Self {
        self.surfaces = Some(host);
        self
    }

    /// Callbacks installed before the first join
    pub fn callbacks(mut self, handler: Arc<dyn SessionEventHandler>) -> Self {
        self.callbacks = Some(handler);
        self
    }

    /// Presets a persisted virtual-background choice is resolved against
    pub fn background_presets(mut self, presets: Vec<BackgroundPreset>) -> Self {
        self.background_presets = presets;
        self
    }

    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> SessionResult<ConferenceSession> {
        let factory = self
            .factory
            .ok_or_else(|| SessionError::missing_configuration("adapter factory"))?;
        self.settings.validate()?;
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let preferences = self.preferences.map(Preferences::new).unwrap_or_default();
        let failover = FailoverController::new(
            self.network.unwrap_or_else(|| Arc::new(AlwaysOnline)),
            self.navigator.unwrap_or_else(|| Arc::new(LogNavigator)),
            self.settings.rejoin_origin.clone(),
            self.settings.failover_poll_interval,
        );
        let tier = self.callbacks.as_ref().map(|_| CallbackTier::Custom);

        Ok(ConferenceSession {
            inner: Arc::new(SessionInner {
                factory,
                store,
                preferences,
                settings: self.settings,
                handler: RwLock::new(self.callbacks),
                tier: parking_lot::RwLock::new(tier),
                active: Mutex::new(None),
                current: parking_lot::RwLock::new(None),
                roster: parking_lot::RwLock::new(Roster::new()),
                generation: AtomicU64::new(0),
                failover,
                attachments: self.surfaces.map(VideoAttachments::new),
                background_presets: self.background_presets,
            }),
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ===== SESSION =====

struct ActiveSession {
    adapter: Arc<dyn ProviderAdapter>,
    config: JoinConfig,
    sink: EventSink,
    stats: Option<StatsMonitor>,
}

struct SessionInner {
    factory: Arc<dyn AdapterFactory>,
    store: Arc<dyn StateStore>,
    preferences: Preferences,
    settings: SessionSettings,
    handler: RwLock<Option<Arc<dyn SessionEventHandler>>>,
    tier: parking_lot::RwLock<Option<CallbackTier>>,
    /// Held across join and leave so they never interleave
    active: Mutex<Option<ActiveSession>>,
    current: parking_lot::RwLock<Option<Arc<dyn ProviderAdapter>>>,
    roster: parking_lot::RwLock<Roster>,
    /// Bumped on every join and teardown; dispatchers of older sessions go quiet
    generation: AtomicU64,
    failover: FailoverController,
    attachments: Option<VideoAttachments>,
    background_presets: Vec<BackgroundPreset>,
}

/// A conference session over one of the supported providers
#[derive(Clone)]
pub struct ConferenceSession {
    inner: Arc<SessionInner>,
}

impl ConferenceSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    // ===== LIFECYCLE =====

    /// Join a session, replacing any adapter that is still alive
    ///
    /// A failed join destroys the new adapter and clears the installed
    /// callbacks before the error is returned; retry from a clean state.
    pub async fn join(&self, config: JoinConfig) -> SessionResult<LocalIdentity> {
        config.validate()?;
        let inner = &self.inner;
        let mut active = inner.active.lock().await;

        inner.failover.cancel();
        if let Some(previous) = active.take() {
            debug!(provider = %previous.adapter.kind(), "Destroying previous adapter before join");
            inner.teardown(previous).await;
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.roster.write().reset();
        inner.store.dispatch(StoreAction::SessionStarted {
            provider: config.provider,
        });

        let (sink, events) = EventSink::channel();
        let adapter = match inner.factory.create(config.provider, sink.clone()) {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!(provider = %config.provider, error = %e, "Adapter construction failed");
                inner.store.dispatch(StoreAction::Reset);
                self.clear_callbacks().await;
                return Err(e);
            }
        };
        *inner.current.write() = Some(Arc::clone(&adapter));
        tokio::spawn(run_dispatcher(
            Arc::downgrade(inner),
            events,
            Arc::downgrade(&adapter),
            config.clone(),
            generation,
        ));

        info!(provider = %config.provider, topic = %config.topic, "Joining session");
        let local = match adapter.join(&config).await {
            Ok(local) => local,
            Err(e) => {
                warn!(provider = %config.provider, error = %e, "Join failed, destroying adapter");
                if let Err(destroy_err) = adapter.destroy().await {
                    warn!(error = %destroy_err, "Destroy after failed join errored");
                }
                inner.generation.fetch_add(1, Ordering::SeqCst);
                *inner.current.write() = None;
                inner.store.dispatch(StoreAction::Reset);
                self.clear_callbacks().await;
                return Err(e);
            }
        };

        let mut session = ActiveSession {
            adapter,
            config,
            sink,
            stats: None,
        };
        inner.after_join(&mut session).await;
        *active = Some(session);
        Ok(local)
    }

    /// Leave and destroy the current adapter; idempotent
    pub async fn leave(&self) -> SessionResult<()> {
        self.inner.failover.cancel();
        self.inner.end_session().await;
        Ok(())
    }

    pub fn provider(&self) -> Option<ProviderKind> {
        self.inner.current.read().as_ref().map(|a| a.kind())
    }

    /// Whether an adapter is currently joined
    pub fn is_live(&self) -> bool {
        self.inner
            .current
            .read()
            .as_ref()
            .map_or(false, |a| a.state() == AdapterState::Joined)
    }

    pub fn local_identity(&self) -> Option<ParticipantId> {
        self.inner.roster.read().local().cloned()
    }

    /// Remote participants; never includes the local user
    pub fn roster(&self) -> Vec<RemoteParticipant> {
        self.inner.roster.read().participants()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn is_failover_running(&self) -> bool {
        self.inner.failover.is_running()
    }

    // ===== CALLBACKS =====

    /// Install a custom callback set
    pub async fn set_callbacks(&self, handler: Arc<dyn SessionEventHandler>) {
        *self.inner.handler.write().await = Some(handler);
        *self.inner.tier.write() = Some(CallbackTier::Custom);
    }

    /// Store-only callbacks
    pub async fn use_basic_callbacks(&self) {
        let handler = Arc::new(BasicCallbacks::new(Arc::clone(&self.inner.store)));
        *self.inner.handler.write().await = Some(handler);
        *self.inner.tier.write() = Some(CallbackTier::Basic);
        debug!("Installed basic callbacks");
    }

    /// Store updates plus user-facing notifications
    pub async fn use_extended_callbacks(&self, notifier: Arc<dyn UiNotifier>) {
        let handler = Arc::new(ExtendedCallbacks::new(Arc::clone(&self.inner.store), notifier));
        *self.inner.handler.write().await = Some(handler);
        *self.inner.tier.write() = Some(CallbackTier::Extended);
        debug!("Installed extended callbacks");
    }

    pub async fn clear_callbacks(&self) {
        *self.inner.handler.write().await = None;
        *self.inner.tier.write() = None;
    }

    pub fn callback_tier(&self) -> Option<CallbackTier> {
        *self.inner.tier.read()
    }

    // ===== MEDIA AND DEVICES =====

    pub async fn start_video(&self, enable: bool, device_id: Option<&str>) -> SessionResult<()> {
        let adapter = self.inner.adapter()?;
        adapter.start_video(enable, device_id).await?;
        self.inner.publish_local_media(adapter.as_ref());
        Ok(())
    }

    pub async fn start_audio(&self, enable: bool, device_id: Option<&str>) -> SessionResult<()> {
        let adapter = self.inner.adapter()?;
        adapter.start_audio(enable, device_id).await?;
        self.inner.publish_local_media(adapter.as_ref());
        Ok(())
    }

    /// Enumerate and reconcile devices without touching the store
    pub async fn device_list(&self) -> SessionResult<DeviceList> {
        self.inner.adapter()?.device_list().await
    }

    /// Enumerate, reconcile, and publish the result to the store
    pub async fn refresh_devices(&self) -> SessionResult<DeviceList> {
        let list = self.device_list().await?;
        self.inner.store.dispatch(StoreAction::Devices(list.clone()));
        Ok(list)
    }

    /// Switch a device; on failure the previous device stays active
    pub async fn set_device(&self, kind: DeviceKind, device_id: &str) -> SessionResult<()> {
        let adapter = self.inner.adapter()?;
        adapter.set_device(kind, device_id).await?;
        if kind != DeviceKind::File {
            if let Err(e) = self.refresh_devices().await {
                debug!(error = %e, "Device refresh after switch failed");
            }
        }
        Ok(())
    }

    pub fn current_device_label(&self, kind: DeviceKind) -> Option<String> {
        self.inner.adapter().ok()?.current_device_label(kind)
    }

    pub fn local_video_stats(&self) -> Option<VideoStats> {
        self.inner.adapter().ok()?.local_video_stats()
    }

    pub fn remote_video_stats(&self) -> Option<RemoteVideoStats> {
        self.inner.adapter().ok()?.remote_video_stats()
    }

    // ===== AUDIO PROCESSING AND BACKGROUND =====

    /// Persist the noise-suppression choice and apply it to a live adapter
    pub async fn set_noise_suppression_disabled(&self, disabled: bool) -> SessionResult<()> {
        self.inner.preferences.set_noise_suppression_disabled(disabled)?;
        if let Ok(adapter) = self.inner.adapter() {
            adapter.set_noise_suppression(!disabled).await?;
        }
        Ok(())
    }

    pub async fn virtual_background_supported(&self) -> bool {
        let Ok(adapter) = self.inner.adapter() else {
            return false;
        };
        match adapter.virtual_background() {
            Some(vb) => vb.is_supported().await,
            None => false,
        }
    }

    /// Apply a background preset and remember it for later sessions
    pub async fn apply_virtual_background(&self, preset: &BackgroundPreset) -> SessionResult<()> {
        let adapter = self.inner.adapter()?;
        let vb = adapter.virtual_background().ok_or(SessionError::CapabilityUnavailable {
            provider: adapter.kind(),
            capability: "virtual background".to_string(),
        })?;
        vb.apply(preset).await?;
        self.inner.preferences.set_virtual_background_preset(Some(&preset.id))?;
        info!(preset = %preset.id, "Applied virtual background");
        Ok(())
    }

    pub async fn clear_virtual_background(&self) -> SessionResult<()> {
        let adapter = self.inner.adapter()?;
        let vb = adapter.virtual_background().ok_or(SessionError::CapabilityUnavailable {
            provider: adapter.kind(),
            capability: "virtual background".to_string(),
        })?;
        vb.clear().await?;
        self.inner.preferences.set_virtual_background_preset(None)
    }

    // ===== REMOTE VIDEO =====

    /// Render a participant's video; concurrent requests converge, never duplicate
    pub async fn attach_remote_video(&self, participant: &ParticipantId) -> SessionResult<AttachOutcome> {
        let attachments = self.inner.attachments()?;
        let adapter = self.inner.adapter()?;
        Ok(attachments.attach(adapter.as_ref(), participant).await)
    }

    pub async fn detach_remote_video(&self, participant: &ParticipantId) -> SessionResult<AttachOutcome> {
        let attachments = self.inner.attachments()?;
        let adapter = self.inner.adapter()?;
        Ok(attachments.detach(adapter.as_ref(), participant).await)
    }

    /// Number of remote videos currently rendered
    pub fn attached_video_count(&self) -> usize {
        self.inner.attachments.as_ref().map_or(0, |a| a.attached_count())
    }
}

impl SessionInner {
    fn adapter(&self) -> SessionResult<Arc<dyn ProviderAdapter>> {
        self.current.read().clone().ok_or(SessionError::NotJoined)
    }

    fn attachments(&self) -> SessionResult<&VideoAttachments> {
        self.attachments
            .as_ref()
            .ok_or_else(|| SessionError::missing_configuration("video surface host"))
    }

    fn publish_local_media(&self, adapter: &dyn ProviderAdapter) {
        self.store.dispatch(StoreAction::LocalMedia {
            video: adapter.is_video_enabled(),
            audio: adapter.is_audio_enabled(),
        });
    }

    async fn deliver(&self, event: SessionEvent) {
        let handler = self.handler.read().await.clone();
        match handler {
            Some(handler) => handler.on_event(event).await,
            None => trace!(event = event.name(), "No callbacks installed, event dropped"),
        }
    }

    /// Post-join setup; failures here are reported as events, not returned
    async fn after_join(&self, session: &mut ActiveSession) {
        let adapter = Arc::clone(&session.adapter);
        let config = &session.config;
        let report = |e: SessionError| {
            warn!(category = e.category(), error = %e, "Post-join step failed");
            session.sink.emit(SessionEvent::Error(e));
        };

        if config.media.audio_enabled {
            if let Some(audio) = adapter.pre_join_audio() {
                if !audio.is_audio_ready() {
                    if let Err(e) = audio.bring_up_audio().await {
                        report(e);
                    }
                }
            }
        }

        let suppression = config.features.noise_suppression && !self.preferences.noise_suppression_disabled();
        if let Err(e) = adapter.set_noise_suppression(suppression).await {
            report(e);
        }

        match adapter.device_list().await {
            Ok(list) => self.store.dispatch(StoreAction::Devices(list)),
            Err(e) => report(e),
        }

        if config.media.video_enabled {
            if let Err(e) = adapter.start_video(true, None).await {
                report(e);
            }
        }
        if config.media.audio_enabled {
            if let Err(e) = adapter.start_audio(true, None).await {
                report(e);
            }
        }
        self.publish_local_media(adapter.as_ref());

        if let Some(preset_id) = self.preferences.virtual_background_preset() {
            if let (Some(vb), Some(preset)) = (
                adapter.virtual_background(),
                self.background_presets.iter().find(|p| p.id == preset_id),
            ) {
                if vb.is_supported().await {
                    if let Err(e) = vb.apply(preset).await {
                        report(e);
                    }
                }
            }
        }

        session.stats = Some(StatsMonitor::start(
            Arc::clone(&adapter),
            Arc::clone(&self.store),
            self.settings.stats_interval,
        ));
    }

    /// Tear down the active session, if any, and reset session-scoped state
    async fn end_session(&self) {
        let mut active = self.active.lock().await;
        if let Some(session) = active.take() {
            self.teardown(session).await;
            self.store.dispatch(StoreAction::Reset);
        }
    }

    async fn teardown(&self, mut session: ActiveSession) {
        if let Some(mut stats) = session.stats.take() {
            stats.stop();
        }
        if let Some(attachments) = &self.attachments {
            attachments.detach_all(session.adapter.as_ref()).await;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);

        let provider = session.adapter.kind();
        if let Err(e) = session.adapter.destroy().await {
            warn!(provider = %provider, error = %e, "Adapter teardown failed");
        }
        if let Some(attachments) = &self.attachments {
            attachments.abandon_all().await;
        }
        *self.current.write() = None;
        self.roster.write().reset();
        info!(provider = %provider, "Session ended");
    }
}

/// Tears the session down for a failover without cancelling it
struct FailoverTeardown {
    inner: Weak<SessionInner>,
}

#[async_trait]
impl FailoverHost for FailoverTeardown {
    async fn teardown(&self) -> SessionResult<()> {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.end_session().await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Consume one adapter's events in order until its sink is gone
async fn run_dispatcher(
    inner: Weak<SessionInner>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    adapter: Weak<dyn ProviderAdapter>,
    config: JoinConfig,
    generation: u64,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.generation.load(Ordering::SeqCst) != generation {
            trace!(event = event.name(), "Dropping event from a previous session");
            continue;
        }

        let failover_reason = match &event {
            SessionEvent::ConnectionStateChanged(change) if change.state == ConnectionState::Reconnecting => adapter
                .upgrade()
                .and_then(|a| a.failover_reason())
                .filter(|reason| change.reason.as_deref() == Some(*reason)),
            _ => None,
        };

        let forwarded = inner.roster.write().apply(event);
        for event in forwarded {
            if let SessionEvent::ParticipantLeft(id) = &event {
                if let (Some(attachments), Some(adapter)) = (&inner.attachments, adapter.upgrade()) {
                    attachments.detach(adapter.as_ref(), id).await;
                }
            }
            inner.deliver(event).await;
        }

        if let Some(reason) = failover_reason {
            let Some(live) = adapter.upgrade() else {
                continue;
            };
            let snapshot = FailoverSnapshot::capture(&config, live.as_ref());
            drop(live);
            let host = Arc::new(FailoverTeardown {
                inner: Arc::downgrade(&inner),
            });
            if inner.failover.trigger(snapshot, host) {
                warn!(reason, "Provider cannot resume, restarting session");
                inner.deliver(SessionEvent::Failover {
                    reason: reason.to_string(),
                })
                .await;
            }
        }
    }
    debug!(generation, "Dispatcher finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_rejects_every_provider() {
        let registry = ProviderRegistry::new();
        for provider in ProviderKind::ALL {
            assert!(!registry.is_registered(provider));
            let (sink, _rx) = EventSink::channel();
            match registry.create(provider, sink) {
                Err(SessionError::ProviderNotRegistered { provider: name }) => {
                    assert_eq!(name, provider.to_string())
                }
                other => panic!("unexpected result: {:?}", other.map(|a| a.kind())),
            }
        }
    }

    #[test]
    fn build_rejects_settings_that_cannot_run() {
        let zero_poll = SessionBuilder::new()
            .registry(ProviderRegistry::new())
            .settings(SessionSettings::default().with_failover_poll_interval(std::time::Duration::ZERO))
            .build();
        assert!(matches!(zero_poll, Err(SessionError::InvalidConfiguration { .. })));

        let bad_origin = SessionBuilder::new()
            .registry(ProviderRegistry::new())
            .settings(SessionSettings::default().with_rejoin_origin("not a url"))
            .build();
        assert!(matches!(bad_origin, Err(SessionError::InvalidConfiguration { .. })));
    }

    #[tokio::test]
    async fn fresh_session_is_idle() {
        let session = SessionBuilder::new().registry(ProviderRegistry::new()).build().unwrap();
        assert_eq!(session.provider(), None);
        assert!(!session.is_live());
        assert!(session.roster().is_empty());
        assert_eq!(session.callback_tier(), None);
        assert!(!session.is_failover_running());
        assert!(session.leave().await.is_ok());
    }
}
