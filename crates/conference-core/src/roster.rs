//! Remote participant roster
//!
//! The roster is the single place the local identity is filtered out. Some
//! providers report the local user among the remote users, and some report
//! users before the join call has resolved the local identity; participant
//! events that arrive before `JoinSuccess` are therefore held back and replayed
//! once the local identity is known.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::events::SessionEvent;
use crate::types::{MediaKind, ParticipantId, RemoteParticipant};

#[derive(Debug, Default)]
pub struct Roster {
    local: Option<ParticipantId>,
    participants: HashMap<ParticipantId, RemoteParticipant>,
    pending: Vec<SessionEvent>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(&self) -> Option<&ParticipantId> {
        self.local.as_ref()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&RemoteParticipant> {
        self.participants.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Remote participants sorted by id
    pub fn participants(&self) -> Vec<RemoteParticipant> {
        let mut list: Vec<_> = self.participants.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn is_video_active(&self, id: &ParticipantId) -> bool {
        self.participants.get(id).map_or(false, |p| p.video_active)
    }

    /// Drop all session-scoped state
    pub fn reset(&mut self) {
        self.local = None;
        self.participants.clear();
        self.pending.clear();
    }

    /// Apply an adapter event and return the events to forward to callbacks
    pub fn apply(&mut self, event: SessionEvent) -> Vec<SessionEvent> {
        match event {
            SessionEvent::JoinSuccess(local) => {
                self.participants.remove(&local.id);
                self.local = Some(local.id.clone());
                let mut out = vec![SessionEvent::JoinSuccess(local)];
                let pending = std::mem::take(&mut self.pending);
                if !pending.is_empty() {
                    debug!(count = pending.len(), "Replaying participant events held until join");
                }
                for held in pending {
                    out.extend(self.apply_participant_event(held));
                }
                out
            }
            event if event.participant().is_some() => {
                if self.local.is_none() {
                    trace!(event = event.name(), "Holding participant event until local identity is known");
                    self.pending.push(event);
                    return Vec::new();
                }
                self.apply_participant_event(event)
            }
            other => vec![other],
        }
    }

    fn is_local(&self, id: &ParticipantId) -> bool {
        self.local.as_ref() == Some(id)
    }

    fn apply_participant_event(&mut self, event: SessionEvent) -> Vec<SessionEvent> {
        if event.participant().map_or(false, |id| self.is_local(id)) {
            trace!(event = event.name(), "Dropping event for local participant");
            return Vec::new();
        }

        match event {
            SessionEvent::ParticipantJoined(participant) => {
                let merged = match self.participants.get(&participant.id) {
                    Some(existing) => RemoteParticipant {
                        display_name: participant.display_name.or_else(|| existing.display_name.clone()),
                        audio_active: existing.audio_active || participant.audio_active,
                        video_active: existing.video_active || participant.video_active,
                        id: participant.id,
                    },
                    None => participant,
                };
                self.participants.insert(merged.id.clone(), merged.clone());
                vec![SessionEvent::ParticipantJoined(merged)]
            }
            SessionEvent::ParticipantLeft(id) => match self.participants.remove(&id) {
                Some(_) => vec![SessionEvent::ParticipantLeft(id)],
                None => Vec::new(),
            },
            SessionEvent::MediaPublished { participant, media } => {
                self.set_media(participant, media, true)
            }
            SessionEvent::MediaUnpublished { participant, media } => {
                self.set_media(participant, media, false)
            }
            other => vec![other],
        }
    }

    fn set_media(&mut self, id: ParticipantId, media: MediaKind, active: bool) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        if !self.participants.contains_key(&id) {
            if !active {
                return out;
            }
            let participant = RemoteParticipant::new(id.clone());
            self.participants.insert(id.clone(), participant.clone());
            out.push(SessionEvent::ParticipantJoined(participant));
        }

        let Some(entry) = self.participants.get_mut(&id) else {
            return out;
        };
        let flag = match media {
            MediaKind::Audio => &mut entry.audio_active,
            MediaKind::Video => &mut entry.video_active,
            MediaKind::ScreenShare => {
                out.push(media_event(id, media, active));
                return out;
            }
        };
        if *flag == active {
            return out;
        }
        *flag = active;
        out.push(media_event(id, media, active));
        out
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
    use crate::types::LocalIdentity;

    fn joined(id: &str) -> SessionEvent {
        SessionEvent::ParticipantJoined(RemoteParticipant::new(id))
    }

    fn local(id: &str) -> SessionEvent {
        SessionEvent::JoinSuccess(LocalIdentity {
            id: id.into(),
            display_name: "me".into(),
        })
    }

    #[test]
    fn events_before_join_are_replayed_without_local_user() {
        let mut roster = Roster::new();
        assert!(roster.apply(joined("self")).is_empty());
        assert!(roster.apply(joined("bob")).is_empty());

        let out = roster.apply(local("self"));
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], SessionEvent::JoinSuccess(_)));
        assert_eq!(out[1], joined("bob"));
        assert!(!roster.contains(&"self".into()));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn local_user_never_enters_roster_after_join() {
        let mut roster = Roster::new();
        roster.apply(local("1"));
        assert!(roster.apply(joined("1")).is_empty());
        assert!(roster
            .apply(SessionEvent::MediaPublished {
                participant: "1".into(),
                media: MediaKind::Video
            })
            .is_empty());
        assert!(roster.is_empty());
    }

    #[test]
    fn duplicate_publish_is_suppressed() {
        let mut roster = Roster::new();
        roster.apply(local("me"));
        roster.apply(joined("bob"));
        let publish = SessionEvent::MediaPublished {
            participant: "bob".into(),
            media: MediaKind::Audio,
        };
        assert_eq!(roster.apply(publish.clone()).len(), 1);
        assert!(roster.apply(publish).is_empty());
        assert!(roster.get(&"bob".into()).unwrap().audio_active);
    }

    #[test]
    fn publish_for_unknown_participant_implies_join() {
        let mut roster = Roster::new();
        roster.apply(local("me"));
        let out = roster.apply(SessionEvent::MediaPublished {
            participant: "eve".into(),
            media: MediaKind::Video,
        });
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], joined("eve"));
        assert!(roster.is_video_active(&"eve".into()));
    }

    #[test]
    fn leave_of_unknown_participant_is_dropped() {
        let mut roster = Roster::new();
        roster.apply(local("me"));
        assert!(roster.apply(SessionEvent::ParticipantLeft("ghost".into())).is_empty());
    }

    #[test]
    fn reset_forgets_local_identity() {
        let mut roster = Roster::new();
        roster.apply(local("me"));
        roster.apply(joined("bob"));
        roster.reset();
        assert!(roster.local().is_none());
        assert!(roster.is_empty());
    }
}
