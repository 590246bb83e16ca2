//! Conversation handling for Parley.
//!
//! Wraps the stateless analysis in `parley-nlu` with per-session memory,
//! follow-up resolution, clarification and the commit discipline that keeps
//! unresolved turns out of the history.

pub mod clarification;
pub mod context;
pub mod error;
pub mod followup;
pub mod resolver;
pub mod session;
pub mod snapshot;

pub use clarification::{PendingClarification, PendingKind};
pub use context::{
    ConversationContext, ConversationFlow, ConversationSummary, FlowPattern, LAST_INTENT_FAMILY,
};
pub use error::DialogError;
pub use followup::{CueKind, FollowUp, FollowUpResolver, Resolution};
pub use resolver::IntentResolver;
pub use session::SessionManager;
pub use snapshot::{ContextSnapshot, SNAPSHOT_VERSION};
