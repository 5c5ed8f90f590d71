//! Remote video attach/detach
//!
//! Attaching and detaching a participant's video is a critical section per
//! participant. A request that arrives while another is in flight for the same
//! participant records its intent and returns [`AttachOutcome::Busy`]
//! immediately; it never waits and never performs work itself. The task that
//! holds the slot re-reads the latest intent when it finishes and converges to
//! it, so a participant ends with exactly one surface when the last intent was
//! "show" and none when it was "hide".

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::capability::ProviderAdapter;
use crate::error::{SessionError, SessionResult};
use crate::types::{ParticipantId, SurfaceId};

/// Host-side owner of rendered video elements
#[async_trait]
pub trait VideoSurfaceHost: Send + Sync {
    /// Create an element for the participant's video
    async fn create_surface(&self, participant: &ParticipantId) -> SessionResult<SurfaceId>;

    /// Remove a previously created element
    async fn remove_surface(&self, participant: &ParticipantId, surface: &SurfaceId);
}

/// Result of an attach or detach request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    Detached,
    /// Already in the requested state
    Unchanged,
    /// Another request owns the slot; its owner converges to this intent
    Busy,
}

#[derive(Debug, Default)]
struct Slot {
    busy: bool,
    surface: Option<SurfaceId>,
    desired: bool,
}

/// Per-participant attach/detach guard
pub struct VideoAttachments {
    host: Arc<dyn VideoSurfaceHost>,
    slots: DashMap<ParticipantId, Slot>,
}

impl VideoAttachments {
    pub fn new(host: Arc<dyn VideoSurfaceHost>) -> Self {
        Self {
            host,
            slots: DashMap::new(),
        }
    }

    /// Surface currently attached for a participant
    pub fn surface(&self, participant: &ParticipantId) -> Option<SurfaceId> {
        self.slots.get(participant).and_then(|s| s.surface.clone())
    }

    pub fn attached_count(&self) -> usize {
        self.slots.iter().filter(|s| s.surface.is_some()).count()
    }

    pub async fn attach(&self, adapter: &dyn ProviderAdapter, participant: &ParticipantId) -> AttachOutcome {
        self.request(adapter, participant, true).await
    }

    pub async fn detach(&self, adapter: &dyn ProviderAdapter, participant: &ParticipantId) -> AttachOutcome {
        self.request(adapter, participant, false).await
    }

    /// Detach every participant; used on leave
    pub async fn detach_all(&self, adapter: &dyn ProviderAdapter) {
        let participants: Vec<ParticipantId> = self.slots.iter().map(|s| s.key().clone()).collect();
        for participant in participants {
            self.detach(adapter, &participant).await;
        }
        self.slots.retain(|_, slot| slot.busy || slot.surface.is_some());
    }

    /// Forget slots without touching the adapter; the adapter is already gone
    pub async fn abandon_all(&self) {
        let surfaces: Vec<(ParticipantId, SurfaceId)> = self
            .slots
            .iter()
            .filter_map(|s| s.surface.clone().map(|surface| (s.key().clone(), surface)))
            .collect();
        self.slots.clear();
        for (participant, surface) in surfaces {
            self.host.remove_surface(&participant, &surface).await;
        }
    }

    async fn request(&self, adapter: &dyn ProviderAdapter, participant: &ParticipantId, want: bool) -> AttachOutcome {
        {
            let mut slot = self.slots.entry(participant.clone()).or_default();
            slot.desired = want;
            if slot.busy {
                let race = SessionError::AttachRace {
                    participant: participant.to_string(),
                };
                debug!(participant = %participant, want, error = %race, "Attach/detach already in flight, recorded intent");
                return AttachOutcome::Busy;
            }
            slot.busy = true;
        }

        let mut outcome = AttachOutcome::Unchanged;
        let mut target = want;
        loop {
            let current = self.surface(participant);
            let step = match (target, current) {
                (true, None) => self.do_attach(adapter, participant).await,
                (false, Some(surface)) => self.do_detach(adapter, participant, surface).await,
                _ => Ok(AttachOutcome::Unchanged),
            };

            match step {
                Ok(AttachOutcome::Unchanged) => {}
                Ok(done) => outcome = done,
                Err(e) => {
                    warn!(participant = %participant, error = %e, "Remote video attach/detach failed");
                    let mut slot = self.slots.entry(participant.clone()).or_default();
                    slot.desired = slot.surface.is_some();
                }
            }

            // Release the slot only once the latest recorded intent is met.
            let mut slot = self.slots.entry(participant.clone()).or_default();
            if slot.desired == slot.surface.is_some() {
                slot.busy = false;
                break;
            }
            target = slot.desired;
        }
        outcome
    }

    async fn do_attach(&self, adapter: &dyn ProviderAdapter, participant: &ParticipantId) -> SessionResult<AttachOutcome> {
        let surface = self.host.create_surface(participant).await?;
        if let Err(e) = adapter.render_remote_video(participant, &surface).await {
            self.host.remove_surface(participant, &surface).await;
            return Err(e);
        }
        debug!(participant = %participant, surface = %surface, "Attached remote video");
        self.slots.entry(participant.clone()).or_default().surface = Some(surface);
        Ok(AttachOutcome::Attached)
    }

    async fn do_detach(
        &self,
        adapter: &dyn ProviderAdapter,
        participant: &ParticipantId,
        surface: SurfaceId,
    ) -> SessionResult<AttachOutcome> {
        if let Err(e) = adapter.stop_remote_video(participant, &surface).await {
            debug!(participant = %participant, error = %e, "Provider failed to stop remote video, removing surface anyway");
        }
        self.host.remove_surface(participant, &surface).await;
        self.slots.entry(participant.clone()).or_default().surface = None;
        debug!(participant = %participant, surface = %surface, "Detached remote video");
        Ok(AttachOutcome::Detached)
    }
}
