//! Conference session abstraction layer
//!
//! One lifecycle, one event contract and one device model over three
//! interchangeable conferencing providers (Zoom-like, Agora-like and
//! TRTC-like). Host applications build a [`ConferenceSession`], install
//! callbacks, and join with a [`JoinConfig`]; the session resolves the
//! provider to an adapter and hides the vendor differences behind the
//! [`ProviderAdapter`] capability trait.
//!
//! # Layers
//!
//! - [`capability`]: the contract every provider adapter implements, with
//!   optional capabilities (pre-join audio, virtual background) discovered
//!   at runtime
//! - [`adapters`]: the three provider adapters over injectable transports
//! - [`devices`]: device enumeration, per-provider quirk rules and
//!   reconciliation of the current selection
//! - [`facade`]: [`ConferenceSession`], the roster, callbacks, statistics
//!   polling and remote video attachment
//! - [`failover`]: recovery from provider-level failures by tearing down and
//!   re-entering through an encoded rejoin URL
//!
//! # Quick start
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use confbench_conference_core::*;
//! # async fn example(agora: Arc<dyn AgoraTransport>) -> SessionResult<()> {
//! let session = SessionBuilder::new()
//!     .registry(ProviderRegistry::new().with_agora(move || Arc::clone(&agora)))
//!     .build()?;
//! session.use_basic_callbacks().await;
//!
//! let config = JoinConfig::new(ProviderKind::Agora, "design-review", "bob")
//!     .with_app_id("my-app-id")
//!     .with_video_enabled(true);
//! session.join(config).await?;
//!
//! for participant in session.roster() {
//!     println!("{} video={}", participant.id, participant.video_active);
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod callbacks;
pub mod capability;
pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod facade;
pub mod failover;
pub mod logging;
pub mod prefs;
pub mod render;
pub mod roster;
pub mod stats;
pub mod store;
pub mod token;
pub mod types;

// Public API exports
pub use adapters::{
    AgoraAdapter, AgoraTransport, TransportError, TransportResult, TrtcAdapter, TrtcTransport, ZoomAdapter,
    ZoomTransport,
};
pub use callbacks::{BasicCallbacks, CallbackTier, ExtendedCallbacks, NetworkQuality, UiNotifier};
pub use capability::{PreJoinAudio, ProviderAdapter, VirtualBackground};
pub use config::{
    AutoJoinPreferences, Credentials, FeatureToggles, JoinConfig, LayoutFlags, MediaOptions, SessionSettings,
};
pub use devices::{DeviceDescriptor, DeviceList, DeviceRules, MediaDevice};
pub use error::{SessionError, SessionResult};
pub use events::{EventSink, SessionEvent, SessionEventHandler};
pub use facade::{AdapterFactory, ConferenceSession, ProviderRegistry, SessionBuilder};
pub use failover::{FailoverController, FailoverHost, FailoverSnapshot, Navigator, NetworkMonitor};
pub use logging::{setup_logging, LoggingConfig};
pub use prefs::{JsonFilePreferences, MemoryPreferences, PreferenceStore, Preferences};
pub use render::{AttachOutcome, VideoAttachments, VideoSurfaceHost};
pub use roster::Roster;
pub use stats::StatsMonitor;
pub use store::{MemoryStore, SessionSnapshot, StateStore, StoreAction};
pub use token::{HttpTokenProvider, StaticTokenProvider, TokenProvider, TokenRequest};
pub use types::{
    AdapterState, BackgroundPreset, ConnectionChange, ConnectionState, DeviceKind, LocalIdentity, MediaKind,
    NetworkQualitySample, ParticipantId, ProviderKind, QualityLevel, RemoteParticipant, RemoteVideoStats, Role,
    SurfaceId, VideoStats,
};

/// Conference-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
