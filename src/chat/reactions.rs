//! Reaction aggregation for display.
//!
//! Recomputed from the message's reaction list on every render; groups have
//! no identity of their own. Raw entries are counted as-is.

use crate::models::Reaction;

/// One distinct emoji on a message and how many entries carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    /// Whether the current user is among the reactors.
    pub mine: bool,
}

impl ReactionGroup {
    /// Emoji alone, or emoji plus count when more than one.
    pub fn label(&self) -> String {
        if self.count > 1 {
            format!("{} {}", self.emoji, self.count)
        } else {
            self.emoji.clone()
        }
    }
}

/// Group reactions by emoji in first-seen order.
pub fn aggregate(reactions: &[Reaction], current_user_id: &str) -> Vec<ReactionGroup> {
    let mut groups: Vec<ReactionGroup> = Vec::new();
    for reaction in reactions {
        if reaction.emoji.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|g| g.emoji == reaction.emoji) {
            Some(group) => group.count += 1,
            None => groups.push(ReactionGroup {
                emoji: reaction.emoji.clone(),
                count: 1,
                mine: reacted_by(reactions, current_user_id, &reaction.emoji),
            }),
        }
    }
    groups
}

/// Whether `user_id` has reacted with `emoji`.
pub fn reacted_by(reactions: &[Reaction], user_id: &str, emoji: &str) -> bool {
    reactions
        .iter()
        .any(|r| r.user_id == user_id && r.emoji == emoji)
}
