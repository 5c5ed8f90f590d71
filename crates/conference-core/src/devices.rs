//! Device reconciliation
//!
//! Adapters hand raw enumeration results to this module. Unreliable entries
//! are dropped according to a per-provider [`DeviceRules`] table, then one
//! selection policy picks the current device for camera, microphone and
//! speaker independently:
//!
//! 1. the first candidate whose label contains the preferred name
//! 2. else the first candidate whose label contains `"default"`
//! 3. else the first candidate
//! 4. else the empty sentinel
//!
//! Label matching is a case-insensitive substring match.
//!
//! ```rust
//! use confbench_conference_core::devices::{select_device, MediaDevice};
//!
//! let candidates = vec![
//!     MediaDevice::new("a1", "Built-in (default)"),
//!     MediaDevice::new("b2", "USB Mic"),
//! ];
//! assert_eq!(select_device(&candidates, None).unwrap().label, "Built-in (default)");
//! assert_eq!(select_device(&candidates, Some("usb")).unwrap().label, "USB Mic");
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::types::{DeviceKind, ProviderKind};

/// A single enumerated device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDevice {
    pub id: String,
    pub label: String,
}

impl MediaDevice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// A candidate list plus the current selection
///
/// The current selection is always either a member of `candidates` or the
/// empty sentinel (`None`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    current: Option<String>,
    candidates: Vec<MediaDevice>,
}

impl DeviceDescriptor {
    /// Build a descriptor and apply the selection policy
    pub fn reconcile(candidates: Vec<MediaDevice>, preferred: Option<&str>) -> Self {
        let current = select_device(&candidates, preferred).map(|d| d.id.clone());
        Self { current, candidates }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&MediaDevice> {
        let id = self.current.as_deref()?;
        self.candidates.iter().find(|d| d.id == id)
    }

    pub fn current_label(&self) -> Option<&str> {
        self.current().map(|d| d.label.as_str())
    }

    pub fn candidates(&self) -> &[MediaDevice] {
        &self.candidates
    }

    pub fn contains(&self, id: &str) -> bool {
        self.candidates.iter().any(|d| d.id == id)
    }

    /// Move the selection to another candidate
    pub fn select(&mut self, id: &str) -> SessionResult<()> {
        if !self.contains(id) {
            return Err(SessionError::DeviceNotFound {
                device_id: id.to_string(),
            });
        }
        self.current = Some(id.to_string());
        Ok(())
    }

    /// Drop the selection back to the empty sentinel
    pub fn clear_selection(&mut self) {
        self.current = None;
    }
}

/// Normalized camera/microphone/speaker lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    pub camera: DeviceDescriptor,
    pub microphone: DeviceDescriptor,
    pub speaker: DeviceDescriptor,
}

impl DeviceList {
    pub fn get(&self, kind: DeviceKind) -> Option<&DeviceDescriptor> {
        match kind {
            DeviceKind::Camera => Some(&self.camera),
            DeviceKind::Microphone => Some(&self.microphone),
            DeviceKind::Speaker => Some(&self.speaker),
            DeviceKind::File => None,
        }
    }

    pub fn get_mut(&mut self, kind: DeviceKind) -> Option<&mut DeviceDescriptor> {
        match kind {
            DeviceKind::Camera => Some(&mut self.camera),
            DeviceKind::Microphone => Some(&mut self.microphone),
            DeviceKind::Speaker => Some(&mut self.speaker),
            DeviceKind::File => None,
        }
    }
}

/// Raw per-kind enumeration result before filtering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDevices {
    pub cameras: Vec<MediaDevice>,
    pub microphones: Vec<MediaDevice>,
    pub speakers: Vec<MediaDevice>,
}

/// Preferred names per device kind
#[derive(Debug, Clone, Copy, Default)]
pub struct DevicePreferences<'a> {
    pub camera: Option<&'a str>,
    pub microphone: Option<&'a str>,
    pub speaker: Option<&'a str>,
}

/// One filtering rule for unreliable device entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuirkRule {
    /// Drop entries whose id equals this sentinel (compared case-insensitively)
    SentinelId(&'static str),
    /// Drop entries whose id is longer than this many characters
    MaxIdLength(usize),
    /// Drop entries with an empty id
    EmptyId,
}

impl QuirkRule {
    /// Whether this rule rejects the device
    pub fn rejects(&self, device: &MediaDevice) -> bool {
        match self {
            QuirkRule::SentinelId(sentinel) => device.id.eq_ignore_ascii_case(sentinel),
            QuirkRule::MaxIdLength(max) => device.id.chars().count() > *max,
            QuirkRule::EmptyId => device.id.trim().is_empty(),
        }
    }
}

/// Per-provider quirk table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRules {
    pub provider: ProviderKind,
    pub rules: &'static [QuirkRule],
}

const ZOOM_RULES: &[QuirkRule] = &[QuirkRule::EmptyId, QuirkRule::SentinelId("default")];

const AGORA_RULES: &[QuirkRule] = &[
    QuirkRule::EmptyId,
    QuirkRule::SentinelId("default"),
    QuirkRule::SentinelId("communications"),
];

const TRTC_RULES: &[QuirkRule] = &[QuirkRule::EmptyId, QuirkRule::MaxIdLength(64)];

impl DeviceRules {
    pub fn for_provider(provider: ProviderKind) -> Self {
        let rules = match provider {
            ProviderKind::Zoom => ZOOM_RULES,
            ProviderKind::Agora => AGORA_RULES,
            ProviderKind::Trtc => TRTC_RULES,
        };
        Self { provider, rules }
    }

    pub fn accepts(&self, device: &MediaDevice) -> bool {
        !self.rules.iter().any(|rule| rule.rejects(device))
    }

    /// Drop unreliable entries, keeping enumeration order
    pub fn filter(&self, devices: Vec<MediaDevice>) -> Vec<MediaDevice> {
        devices
            .into_iter()
            .filter(|device| {
                let keep = self.accepts(device);
                if !keep {
                    debug!(
                        provider = %self.provider,
                        device_id = %device.id,
                        label = %device.label,
                        "Dropping unreliable device entry"
                    );
                }
                keep
            })
            .collect()
    }

    /// Filter raw enumeration output and apply the selection policy
    pub fn reconcile(&self, raw: RawDevices, preferences: DevicePreferences<'_>) -> DeviceList {
        DeviceList {
            camera: DeviceDescriptor::reconcile(self.filter(raw.cameras), preferences.camera),
            microphone: DeviceDescriptor::reconcile(
                self.filter(raw.microphones),
                preferences.microphone,
            ),
            speaker: DeviceDescriptor::reconcile(self.filter(raw.speakers), preferences.speaker),
        }
    }
}

fn label_contains(device: &MediaDevice, needle: &str) -> bool {
    device.label.to_lowercase().contains(&needle.to_lowercase())
}

/// Apply the selection policy to a filtered candidate list
pub fn select_device<'a>(candidates: &'a [MediaDevice], preferred: Option<&str>) -> Option<&'a MediaDevice> {
    if let Some(name) = preferred.filter(|n| !n.trim().is_empty()) {
        if let Some(hit) = candidates.iter().find(|d| label_contains(d, name)) {
            return Some(hit);
        }
    }

    candidates
        .iter()
        .find(|d| label_contains(d, "default"))
        .or_else(|| candidates.first())
}
