//! Participant models
//!
//! The backend sends participants in two shapes: display fields inlined on the
//! participant record, or nested under a populated `user` / `userId`
//! reference. `RawParticipant::normalize` folds both into `Participant`.

use serde::{Deserialize, Serialize};

/// A user reference: either a bare id or a populated user document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(String),
    Populated(Box<RawParticipant>),
}

impl UserRef {
    /// Identifier of the referenced user, if one can be resolved.
    pub fn id(&self) -> Option<&str> {
        match self {
            UserRef::Id(id) if !id.is_empty() => Some(id),
            UserRef::Id(_) => None,
            UserRef::Populated(raw) => raw.resolved_id(),
        }
    }

    pub fn normalize(&self) -> Option<Participant> {
        match self {
            UserRef::Id(id) if !id.is_empty() => Some(Participant::bare(id)),
            UserRef::Id(_) => None,
            UserRef::Populated(raw) => raw.normalize(),
        }
    }
}

/// Participant record as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParticipant {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub user_id: Option<UserRef>,
}

impl RawParticipant {
    fn nested(&self) -> Option<&UserRef> {
        self.user.as_ref().or(self.user_id.as_ref())
    }

    fn resolved_id(&self) -> Option<&str> {
        match self.nested() {
            Some(nested) => nested.id(),
            None => self.id.as_deref().filter(|id| !id.is_empty()),
        }
    }

    /// Fold either wire shape into the canonical participant.
    ///
    /// Returns `None` when no user id can be resolved.
    pub fn normalize(&self) -> Option<Participant> {
        match self.nested() {
            Some(UserRef::Populated(inner)) => {
                let mut participant = inner.normalize()?;
                // Role may live on the membership record rather than the user.
                if participant.role.is_none() {
                    participant.role = self.role.clone();
                }
                Some(participant)
            }
            Some(reference @ UserRef::Id(_)) => {
                let id = reference.id()?;
                Some(self.with_fields(id))
            }
            None => {
                let id = self.id.as_deref().filter(|id| !id.is_empty())?;
                Some(self.with_fields(id))
            }
        }
    }

    fn with_fields(&self, id: &str) -> Participant {
        Participant {
            id: id.to_string(),
            first_name: self.first_name.clone().unwrap_or_default(),
            last_name: self.last_name.clone().unwrap_or_default(),
            avatar: self.avatar.clone(),
            role: self.role.clone(),
        }
    }
}

/// Canonical participant shape used everywhere past deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub role: Option<String>,
}

impl Participant {
    /// Participant known only by id (unpopulated reference).
    pub fn bare(id: &str) -> Self {
        Self {
            id: id.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            avatar: None,
            role: None,
        }
    }

    /// "First Last", falling back to the id when no name is known.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.id.clone()
        } else {
            full.to_string()
        }
    }
}
