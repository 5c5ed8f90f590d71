//! Capability interface every provider adapter satisfies
//!
//! The required surface is [`ProviderAdapter`]. Provider-specific extensions
//! are separate traits reached through accessor methods that return `None`
//! when the provider lacks the capability, so callers feature-detect instead
//! of downcasting:
//!
//! ```rust,no_run
//! # use confbench_conference_core::capability::ProviderAdapter;
//! # async fn example(adapter: &dyn ProviderAdapter) -> confbench_conference_core::SessionResult<()> {
//! if let Some(audio) = adapter.pre_join_audio() {
//!     if !audio.is_audio_ready() {
//!         audio.bring_up_audio().await?;
//!     }
//! }
//! adapter.start_audio(true, None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──join──▶ Joining ──ok──▶ Joined ──leave──▶ Leaving ──▶ Uninitialized
//!                            │
//!                            └──err──▶ Uninitialized
//! ```
//!
//! Adapters receive their [`EventSink`](crate::events::EventSink) as a
//! constructor argument, so there is no window in which an adapter exists but
//! cannot deliver events.

use async_trait::async_trait;

use crate::config::JoinConfig;
use crate::devices::DeviceList;
use crate::error::SessionResult;
use crate::types::{
    AdapterState, BackgroundPreset, DeviceKind, LocalIdentity, ParticipantId, ProviderKind,
    RemoteVideoStats, SurfaceId, VideoStats,
};

/// Uniform lifecycle, media, device and statistics contract
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider this adapter wraps
    fn kind(&self) -> ProviderKind;

    /// Current lifecycle state
    fn state(&self) -> AdapterState;

    /// Establish the session; emits `JoinSuccess` exactly once on success
    async fn join(&self, config: &JoinConfig) -> SessionResult<LocalIdentity>;

    /// Disconnect and release local media; idempotent
    async fn leave(&self) -> SessionResult<()>;

    /// Leave (if needed) and stop all background work; idempotent
    async fn destroy(&self) -> SessionResult<()>;

    /// Toggle local camera capture/publish
    async fn start_video(&self, enable: bool, device_id: Option<&str>) -> SessionResult<()>;

    /// Toggle local microphone capture/publish
    async fn start_audio(&self, enable: bool, device_id: Option<&str>) -> SessionResult<()>;

    fn is_video_enabled(&self) -> bool;

    fn is_audio_enabled(&self) -> bool;

    /// Enumerate, filter and select devices
    async fn device_list(&self) -> SessionResult<DeviceList>;

    /// Switch the active device; on failure the previous device stays active
    async fn set_device(&self, kind: DeviceKind, device_id: &str) -> SessionResult<()>;

    /// Best-effort human-readable label of the active device
    fn current_device_label(&self, kind: DeviceKind) -> Option<String>;

    fn local_video_stats(&self) -> Option<VideoStats>;

    fn remote_video_stats(&self) -> Option<RemoteVideoStats>;

    /// Pull fresh statistics from the transport into the cached snapshots
    async fn refresh_stats(&self) -> SessionResult<()>;

    /// Start rendering a remote participant's video into a UI surface
    async fn render_remote_video(&self, participant: &ParticipantId, surface: &SurfaceId) -> SessionResult<()>;

    /// Stop rendering a remote participant's video
    async fn stop_remote_video(&self, participant: &ParticipantId, surface: &SurfaceId) -> SessionResult<()>;

    /// Reconnect reason code after which this provider cannot resume in place
    fn failover_reason(&self) -> Option<&'static str> {
        None
    }

    /// Audio bring-up step required before unmute, if the provider has one
    fn pre_join_audio(&self) -> Option<&dyn PreJoinAudio> {
        None
    }

    /// Virtual background support, if the provider has it
    fn virtual_background(&self) -> Option<&dyn VirtualBackground> {
        None
    }

    /// Enable or disable built-in noise suppression; ignored where unsupported
    async fn set_noise_suppression(&self, _enabled: bool) -> SessionResult<()> {
        Ok(())
    }
}

/// Provider audio pipeline that must be started before local audio can unmute
#[async_trait]
pub trait PreJoinAudio: Send + Sync {
    async fn bring_up_audio(&self) -> SessionResult<()>;

    fn is_audio_ready(&self) -> bool;
}

/// Virtual background detection, apply and clear
#[async_trait]
pub trait VirtualBackground: Send + Sync {
    async fn is_supported(&self) -> bool;

    async fn apply(&self, preset: &BackgroundPreset) -> SessionResult<()>;

    async fn clear(&self) -> SessionResult<()>;
}
