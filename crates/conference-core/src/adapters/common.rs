//! State shared by every adapter implementation

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AutoJoinPreferences;
use crate::devices::{DeviceList, DevicePreferences, DeviceRules, RawDevices};
use crate::error::{SessionError, SessionResult};
use crate::events::{EventSink, SessionEvent};
use crate::types::{
    AdapterState, DeviceKind, LocalIdentity, NetworkQualitySample, ParticipantId, ProviderKind,
    QualityLevel, RemoteVideoStats, VideoStats,
};

/// Lifecycle, media flags, device selection and stats cache for one adapter
pub(crate) struct AdapterCore {
    provider: ProviderKind,
    instance_id: Uuid,
    state: RwLock<AdapterState>,
    destroyed: AtomicBool,
    local: RwLock<Option<LocalIdentity>>,
    video_enabled: AtomicBool,
    audio_enabled: AtomicBool,
    /// Serializes start_video calls
    pub(crate) video_lock: tokio::sync::Mutex<()>,
    /// Serializes start_audio calls
    pub(crate) audio_lock: tokio::sync::Mutex<()>,
    switching: Mutex<HashSet<DeviceKind>>,
    rules: DeviceRules,
    preferences: RwLock<AutoJoinPreferences>,
    devices: RwLock<DeviceList>,
    file_source: RwLock<Option<String>>,
    quality: Mutex<(QualityLevel, QualityLevel)>,
    local_stats: RwLock<Option<VideoStats>>,
    remote_stats: RwLock<Option<RemoteVideoStats>>,
    sink: EventSink,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl AdapterCore {
    pub(crate) fn new(provider: ProviderKind, sink: EventSink) -> Arc<Self> {
        let instance_id = Uuid::new_v4();
        debug!(provider = %provider, instance = %instance_id, "Adapter created");
        Arc::new(Self {
            provider,
            instance_id,
            state: RwLock::new(AdapterState::Uninitialized),
            destroyed: AtomicBool::new(false),
            local: RwLock::new(None),
            video_enabled: AtomicBool::new(false),
            audio_enabled: AtomicBool::new(false),
            video_lock: tokio::sync::Mutex::new(()),
            audio_lock: tokio::sync::Mutex::new(()),
            switching: Mutex::new(HashSet::new()),
            rules: DeviceRules::for_provider(provider),
            preferences: RwLock::new(AutoJoinPreferences::default()),
            devices: RwLock::new(DeviceList::default()),
            file_source: RwLock::new(None),
            quality: Mutex::new((QualityLevel::UNKNOWN, QualityLevel::UNKNOWN)),
            local_stats: RwLock::new(None),
            remote_stats: RwLock::new(None),
            sink,
            pump: Mutex::new(None),
        })
    }

    pub(crate) fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub(crate) fn state(&self) -> AdapterState {
        *self.state.read()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        self.sink.emit(event);
    }

    // ===== LIFECYCLE =====

    /// Move Uninitialized -> Joining, rejecting anything else
    pub(crate) fn begin_join(&self, preferences: Option<&AutoJoinPreferences>) -> SessionResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(SessionError::invalid_state("live adapter", "destroyed"));
        }
        let mut state = self.state.write();
        if *state != AdapterState::Uninitialized {
            return Err(SessionError::invalid_state("Uninitialized", *state));
        }
        *state = AdapterState::Joining;
        *self.preferences.write() = preferences.cloned().unwrap_or_default();
        Ok(())
    }

    /// Settle a join attempt: Joined plus `JoinSuccess`, or back to Uninitialized
    pub(crate) fn finish_join(&self, result: SessionResult<LocalIdentity>) -> SessionResult<LocalIdentity> {
        match result {
            Ok(local) => {
                *self.local.write() = Some(local.clone());
                *self.state.write() = AdapterState::Joined;
                info!(
                    provider = %self.provider,
                    instance = %self.instance_id,
                    local_id = %local.id,
                    "Joined session"
                );
                self.emit(SessionEvent::JoinSuccess(local.clone()));
                Ok(local)
            }
            Err(e) => {
                *self.state.write() = AdapterState::Uninitialized;
                debug!(provider = %self.provider, error = %e, "Join failed");
                Err(e)
            }
        }
    }

    /// Move to Leaving; false when there is nothing to leave
    pub(crate) fn begin_leave(&self) -> bool {
        let mut state = self.state.write();
        match *state {
            AdapterState::Joined | AdapterState::Joining => {
                *state = AdapterState::Leaving;
                true
            }
            AdapterState::Uninitialized | AdapterState::Leaving => false,
        }
    }

    /// Drop all session-scoped state and return to Uninitialized
    pub(crate) fn finish_leave(&self) {
        *self.local.write() = None;
        self.video_enabled.store(false, Ordering::SeqCst);
        self.audio_enabled.store(false, Ordering::SeqCst);
        *self.local_stats.write() = None;
        *self.remote_stats.write() = None;
        *self.file_source.write() = None;
        *self.quality.lock() = (QualityLevel::UNKNOWN, QualityLevel::UNKNOWN);
        *self.state.write() = AdapterState::Uninitialized;
        debug!(provider = %self.provider, instance = %self.instance_id, "Left session");
    }

    /// Stop the event pump; the adapter cannot be joined again
    pub(crate) fn shutdown(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        debug!(provider = %self.provider, instance = %self.instance_id, "Adapter destroyed");
    }

    pub(crate) fn ensure_joined(&self) -> SessionResult<()> {
        match self.state() {
            AdapterState::Joined => Ok(()),
            _ => Err(SessionError::NotJoined),
        }
    }

    pub(crate) fn local(&self) -> Option<LocalIdentity> {
        self.local.read().clone()
    }

    pub(crate) fn is_local(&self, id: &ParticipantId) -> bool {
        self.local.read().as_ref().map_or(false, |l| &l.id == id)
    }

    // ===== MEDIA FLAGS =====

    pub(crate) fn video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_video_enabled(&self, enabled: bool) {
        self.video_enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
    }

    // ===== DEVICES =====

    /// Claim the switch slot for a device kind until the guard drops
    pub(crate) fn begin_device_switch(&self, kind: DeviceKind) -> SessionResult<DeviceSwitchGuard<'_>> {
        if !self.switching.lock().insert(kind) {
            return Err(SessionError::DeviceSwitchInProgress { kind });
        }
        Ok(DeviceSwitchGuard { core: self, kind })
    }

    /// Switch slot for a device named explicitly by `start_video`/`start_audio`
    ///
    /// `None` when no id was given; otherwise the id must be a known candidate.
    pub(crate) fn claim_explicit_device(
        &self,
        kind: DeviceKind,
        device_id: Option<&str>,
    ) -> SessionResult<Option<DeviceSwitchGuard<'_>>> {
        let Some(id) = device_id else {
            return Ok(None);
        };
        let guard = self.begin_device_switch(kind)?;
        self.check_known_device(kind, id)?;
        Ok(Some(guard))
    }

    /// Filter raw enumeration output, keeping a still-present selection
    pub(crate) fn reconcile_devices(&self, raw: RawDevices) -> DeviceList {
        let preferences = self.preferences.read().clone();
        let mut fresh = self.rules.reconcile(
            raw,
            DevicePreferences {
                camera: preferences.camera.as_deref(),
                microphone: preferences.microphone.as_deref(),
                speaker: preferences.speaker.as_deref(),
            },
        );

        let mut devices = self.devices.write();
        for kind in [DeviceKind::Camera, DeviceKind::Microphone, DeviceKind::Speaker] {
            let previous = devices.get(kind).and_then(|d| d.current_id()).map(str::to_string);
            if let (Some(id), Some(descriptor)) = (previous, fresh.get_mut(kind)) {
                if descriptor.contains(&id) {
                    let _ = descriptor.select(&id);
                }
            }
        }
        *devices = fresh.clone();
        fresh
    }

    /// Fail with `DeviceNotFound` unless the id is among the known candidates
    ///
    /// Before the first enumeration nothing is known and every id passes.
    pub(crate) fn check_known_device(&self, kind: DeviceKind, device_id: &str) -> SessionResult<()> {
        let devices = self.devices.read();
        match devices.get(kind) {
            Some(d) if !d.candidates().is_empty() && !d.contains(device_id) => Err(SessionError::DeviceNotFound {
                device_id: device_id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn record_device(&self, kind: DeviceKind, device_id: &str) {
        if kind == DeviceKind::File {
            *self.file_source.write() = Some(device_id.to_string());
            return;
        }
        if let Some(descriptor) = self.devices.write().get_mut(kind) {
            if let Err(e) = descriptor.select(device_id) {
                debug!(provider = %self.provider, kind = %kind, error = %e, "Switched to a device outside the enumerated list");
            }
        }
    }

    pub(crate) fn current_device_id(&self, kind: DeviceKind) -> Option<String> {
        self.devices.read().get(kind).and_then(|d| d.current_id()).map(str::to_string)
    }

    pub(crate) fn current_device_label(&self, kind: DeviceKind) -> Option<String> {
        if kind == DeviceKind::File {
            return self.file_source.read().clone();
        }
        self.devices.read().get(kind).and_then(|d| d.current_label()).map(str::to_string)
    }

    // ===== QUALITY AND STATS =====

    /// Merge a one-direction quality report into the last known pair
    pub(crate) fn merge_quality(
        &self,
        uplink: Option<QualityLevel>,
        downlink: Option<QualityLevel>,
    ) -> NetworkQualitySample {
        let mut quality = self.quality.lock();
        if let Some(up) = uplink {
            quality.0 = up;
        }
        if let Some(down) = downlink {
            quality.1 = down;
        }
        NetworkQualitySample::new(quality.0, quality.1)
    }

    pub(crate) fn set_local_stats(&self, stats: Option<VideoStats>) {
        *self.local_stats.write() = stats;
    }

    pub(crate) fn set_remote_stats(&self, stats: Option<RemoteVideoStats>) {
        *self.remote_stats.write() = stats;
    }

    pub(crate) fn local_stats(&self) -> Option<VideoStats> {
        self.local_stats.read().clone()
    }

    pub(crate) fn remote_stats(&self) -> Option<RemoteVideoStats> {
        self.remote_stats.read().clone()
    }
}

/// Releases a device-kind switch slot on drop
pub(crate) struct DeviceSwitchGuard<'a> {
    core: &'a AdapterCore,
    kind: DeviceKind,
}

impl Drop for DeviceSwitchGuard<'_> {
    fn drop(&mut self) {
        self.core.switching.lock().remove(&self.kind);
    }
}

/// Forward a native event stream through a translator into the core's sink
///
/// The pump runs until the stream ends or the core is shut down.
pub(crate) fn spawn_pump<E, F>(core: &Arc<AdapterCore>, mut events: mpsc::UnboundedReceiver<E>, translate: F)
where
    E: Send + 'static,
    F: Fn(&AdapterCore, E) -> Vec<SessionEvent> + Send + 'static,
{
    let pump_core = Arc::clone(core);
    let handle = tokio::spawn(async move {
        while let Some(native) = events.recv().await {
            for event in translate(&pump_core, native) {
                pump_core.emit(event);
            }
        }
        debug!(provider = %pump_core.provider, "Native event stream ended");
    });
    *core.pump.lock() = Some(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::MediaDevice;

    #[tokio::test]
    async fn second_switch_of_same_kind_is_rejected() {
        let (sink, _rx) = EventSink::channel();
        let core = AdapterCore::new(ProviderKind::Agora, sink);
        let guard = core.begin_device_switch(DeviceKind::Camera).unwrap();
        assert!(matches!(
            core.begin_device_switch(DeviceKind::Camera),
            Err(SessionError::DeviceSwitchInProgress { kind: DeviceKind::Camera })
        ));
        assert!(core.begin_device_switch(DeviceKind::Microphone).is_ok());
        drop(guard);
        assert!(core.begin_device_switch(DeviceKind::Camera).is_ok());
    }

    #[tokio::test]
    async fn explicit_device_takes_the_switch_slot() {
        let (sink, _rx) = EventSink::channel();
        let core = AdapterCore::new(ProviderKind::Zoom, sink);
        core.reconcile_devices(RawDevices {
            microphones: vec![MediaDevice::new("m1", "Built-in"), MediaDevice::new("m2", "Headset")],
            ..Default::default()
        });

        assert!(core.claim_explicit_device(DeviceKind::Microphone, None).unwrap().is_none());
        assert!(matches!(
            core.claim_explicit_device(DeviceKind::Microphone, Some("m9")),
            Err(SessionError::DeviceNotFound { .. })
        ));

        let guard = core.claim_explicit_device(DeviceKind::Microphone, Some("m2")).unwrap();
        assert!(matches!(
            core.begin_device_switch(DeviceKind::Microphone),
            Err(SessionError::DeviceSwitchInProgress { .. })
        ));
        drop(guard);
        assert!(core.begin_device_switch(DeviceKind::Microphone).is_ok());
    }

    #[tokio::test]
    async fn join_state_machine() {
        let (sink, mut rx) = EventSink::channel();
        let core = AdapterCore::new(ProviderKind::Trtc, sink);
        core.begin_join(None).unwrap();
        assert!(core.begin_join(None).is_err());
        core.finish_join(Err(SessionError::NotJoined)).unwrap_err();
        assert_eq!(core.state(), AdapterState::Uninitialized);

        core.begin_join(None).unwrap();
        let local = LocalIdentity {
            id: "me".into(),
            display_name: "Me".into(),
        };
        core.finish_join(Ok(local.clone())).unwrap();
        assert_eq!(core.state(), AdapterState::Joined);
        assert_eq!(rx.recv().await, Some(SessionEvent::JoinSuccess(local)));

        assert!(core.begin_leave());
        core.finish_leave();
        assert!(!core.begin_leave());
        core.shutdown();
        assert!(core.begin_join(None).is_err());
    }

    #[tokio::test]
    async fn reconcile_keeps_a_still_present_selection() {
        let (sink, _rx) = EventSink::channel();
        let core = AdapterCore::new(ProviderKind::Zoom, sink);
        let raw = || RawDevices {
            cameras: vec![MediaDevice::new("c1", "Default Cam"), MediaDevice::new("c2", "USB Cam")],
            ..Default::default()
        };
        core.reconcile_devices(raw());
        core.record_device(DeviceKind::Camera, "c2");
        let list = core.reconcile_devices(raw());
        assert_eq!(list.camera.current_id(), Some("c2"));
        assert_eq!(core.current_device_label(DeviceKind::Camera).as_deref(), Some("USB Cam"));
    }
}
