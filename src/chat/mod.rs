//! Messaging client core: local state of the open chat view.

pub mod compose;
pub mod presence;
pub mod reactions;
pub mod store;
pub mod typing;
pub mod view;

pub use presence::PresenceTracker;
pub use typing::{TypingEntry, TypingSignal};
pub use view::{ChatView, Effect, ViewOptions};
