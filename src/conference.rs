//! Conferences and their invited participants

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfmanError;
use crate::profile::{ConferenceProfile, ParticipantProfile};
use crate::protocol::ConferenceId;

fn default_invited() -> bool {
    true
}

/// Someone on a conference's invitation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub phone: String,
    #[serde(default)]
    pub name: String,
    /// Whether "invite everyone" calls this participant
    #[serde(default = "default_invited")]
    pub is_invited: bool,
    #[serde(default)]
    pub profile: ParticipantProfile,
}

impl Participant {
    pub fn new(phone: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            name: name.into(),
            is_invited: true,
            profile: ParticipantProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: ParticipantProfile) -> Self {
        self.profile = profile;
        self
    }
}

/// A conference as declared in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceEntry {
    pub id: u64,
    pub number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub conference_profile: ConferenceProfile,
    #[serde(default)]
    pub public_participant_profile: ParticipantProfile,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

/// A hosted bridge and its invitation list
pub struct Conference {
    pub id: ConferenceId,
    /// Dial-in number, also the ConfBridge name
    pub number: String,
    pub name: String,
    pub is_public: bool,
    pub conference_profile: ConferenceProfile,
    /// User options for callers who are not on the list
    pub public_participant_profile: ParticipantProfile,
    participants: RwLock<Vec<Participant>>,
}

impl Conference {
    /// Create a new conference
    pub fn new(id: ConferenceId, number: impl Into<String>, name: impl Into<String>) -> Self {
        let number = number.into();

        info!(conference = %number, id = %id, "Creating conference");

        Self {
            id,
            number,
            name: name.into(),
            is_public: false,
            conference_profile: ConferenceProfile::default(),
            public_participant_profile: ParticipantProfile::default(),
            participants: RwLock::new(Vec::new()),
        }
    }

    pub fn from_entry(entry: ConferenceEntry) -> Result<Self, ConfmanError> {
        let mut conference = Self::new(ConferenceId(entry.id), entry.number, entry.name);
        conference.is_public = entry.is_public;
        conference.conference_profile = entry.conference_profile;
        conference.public_participant_profile = entry.public_participant_profile;
        for participant in entry.participants {
            conference.add_participant(participant)?;
        }
        Ok(conference)
    }

    /// Add a participant; phones are unique within a conference
    pub fn add_participant(&self, participant: Participant) -> Result<(), ConfmanError> {
        let mut participants = self.participants.write();
        if participants.iter().any(|p| p.phone == participant.phone) {
            return Err(ConfmanError::DuplicateParticipant {
                number: self.number.clone(),
                phone: participant.phone,
            });
        }
        participants.push(participant);
        Ok(())
    }

    pub fn remove_participant(&self, phone: &str) -> bool {
        let mut participants = self.participants.write();
        let before = participants.len();
        participants.retain(|p| p.phone != phone);
        participants.len() != before
    }

    pub fn participant(&self, phone: &str) -> Option<Participant> {
        self.participants
            .read()
            .iter()
            .find(|p| p.phone == phone)
            .cloned()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.participants.read().clone()
    }

    /// Participants flagged for "invite everyone"
    pub fn invited_participants(&self) -> Vec<Participant> {
        self.participants
            .read()
            .iter()
            .filter(|p| p.is_invited)
            .cloned()
            .collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.read().len()
    }

    pub fn invited_participant_count(&self) -> usize {
        self.participants.read().iter().filter(|p| p.is_invited).count()
    }
}

impl std::fmt::Display for Conference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.number)
    }
}

/// Shared handle to a conference
#[derive(Clone)]
pub struct ConferenceHandle {
    inner: Arc<Conference>,
}

impl ConferenceHandle {
    pub fn new(conference: Conference) -> Self {
        Self {
            inner: Arc::new(conference),
        }
    }

    pub fn id(&self) -> ConferenceId {
        self.inner.id
    }
}

impl std::ops::Deref for ConferenceHandle {
    type Target = Conference;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
