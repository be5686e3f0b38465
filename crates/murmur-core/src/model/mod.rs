//! Board data model: posts, reaction kinds, and the toggle state transition.

pub mod post;
pub mod reaction;

pub use post::{MAX_CONTENT_CHARS, Post, PostId, PostWithState};
pub use reaction::{ReactionCounts, ReactionKind, ReactionSet, ToggleAction, TogglePlan};
