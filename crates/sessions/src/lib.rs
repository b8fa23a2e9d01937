//! Session and message storage plus conversation-history pruning.

mod prune;
mod store;

pub use prune::{prune_token_based, prune_turn_based};
pub use store::{
    InboxFilter, Session, SessionMetadata, SessionStatus, SessionStore, StoredMessage,
};
