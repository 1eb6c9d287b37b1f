//! Conversation models

use serde::Deserialize;

use super::participant::{Participant, RawParticipant};

/// Conversation, with participants normalized at read time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "ConversationRecord")]
pub struct Conversation {
    pub id: String,
    pub is_group: bool,
    pub name: Option<String>,
    pub participants: Vec<Participant>,
}

impl Conversation {
    /// The first participant that is not the current user.
    pub fn other_participant(&self, current_user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id != current_user_id)
    }

    /// Group name, or the other participant's name for direct conversations.
    pub fn display_name(&self, current_user_id: &str) -> String {
        if let Some(ref name) = self.name {
            if !name.trim().is_empty() {
                return name.clone();
            }
        }
        if self.is_group {
            let names: Vec<String> = self
                .participants
                .iter()
                .filter(|p| p.id != current_user_id)
                .map(Participant::display_name)
                .collect();
            if !names.is_empty() {
                return names.join(", ");
            }
        }
        self.other_participant(current_user_id)
            .map(Participant::display_name)
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationRecord {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default)]
    is_group: bool,
    #[serde(default, alias = "groupName")]
    name: Option<String>,
    #[serde(default)]
    participants: Vec<RawParticipant>,
}

impl From<ConversationRecord> for Conversation {
    fn from(rec: ConversationRecord) -> Self {
        let participants = rec
            .participants
            .iter()
            .filter_map(|raw| {
                let normalized = raw.normalize();
                if normalized.is_none() {
                    tracing::warn!("Skipping participant without id in conversation {}", rec.id);
                }
                normalized
            })
            .collect();

        Conversation {
            id: rec.id,
            is_group: rec.is_group,
            name: rec.name,
            participants,
        }
    }
}
