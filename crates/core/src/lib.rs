pub mod config;
pub mod domain;
pub mod errors;
pub mod format;
pub mod leaderboard;
pub mod ledger;
pub mod parser;

pub use domain::karma::{ChangeRecord, KarmaRecord, UpdateOutcome};
pub use domain::subject::{Subject, SubjectKind, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use format::{FormatError, ReplyFormatter};
pub use leaderboard::{Direction, Leaderboard, DEFAULT_LEADERBOARD_SIZE};
pub use ledger::{
    BuzzkillPolicy, KarmaDelta, KarmaLedger, KarmaStore, KarmaTransition, StoreError,
};
pub use parser::{parse_changes, KarmaChanges, Mention, Mentions};
