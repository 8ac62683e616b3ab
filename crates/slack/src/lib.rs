//! Slack interface for karma.
//!
//! - **Events** (`events`) - message events feed the karma ledger; a
//!   dispatcher routes each event type to its handler
//! - **Slash Commands** (`commands`) - `/karma :top users`, subject lookups, help
//! - **Block Kit** (`blocks`) - reply templates
//! - **Replies** (`reply`) - outbound `ReplySink` port
//!
//! ```text
//! Events API → EventDispatcher → MessageEventHandler → parse → ledger → format
//!                                                                        ↓
//!                                                      ReplySink ← Block Kit reply
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod reply;

pub use blocks::{MessageBuilder, MessageTemplate};
pub use commands::{CommandRouter, KarmaCommand, KarmaQueryService, SlashCommandPayload};
pub use events::{
    karma_dispatcher, EventContext, EventDispatcher, EventsApiPayload, HandlerResult,
    MessageEvent, SlackEnvelope, SlackEvent,
};
pub use reply::{Reply, ReplyError, ReplySink};

#[cfg(any(test, feature = "testing"))]
pub use reply::RecordingReplySink;
