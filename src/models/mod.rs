//! Data models for messaging entities
//!
//! Wire records (`*Record`) mirror what the backend sends. They are converted
//! into the canonical types once, at deserialization time.

mod conversation;
mod message;
mod participant;

pub use conversation::*;
pub use message::*;
pub use participant::*;
