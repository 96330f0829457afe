//! Conversation session: state machine, event loop, prompts, intent.
//!
//! The session layer sits between the audio/hardware inputs and the
//! network pipeline.  [`SessionRunner`] is the single owner of the live
//! [`Session`]; everything else feeds it [`SessionEvent`]s.

pub mod events;
pub mod intent;
pub mod prompts;
pub mod runner;
pub mod state;

pub use events::{ExchangeStage, SessionEvent};
pub use intent::{detect_affirmation, detect_all_set, Affirmation};
pub use runner::SessionRunner;
pub use state::{ConversationState, Session, Speaker, TimeoutKind, Turn, HISTORY_LIMIT};
