use karmic_core::domain::subject::Subject;
use karmic_core::leaderboard::Leaderboard;
use karmic_core::ledger::StoreError;

use crate::commands::{query_store, CommandResult};

/// Subjects never seen before report zero rather than an error.
pub fn run(raw_subject: &str) -> CommandResult {
    let subject = Subject::from_key(raw_subject.trim());
    query_store("lookup", |store| async move {
        let karma =
            Leaderboard::new(store).lookup(&subject).await?.map_or(0, |record| record.karma);
        Ok::<_, StoreError>(format!("{subject} has {karma} karma."))
    })
}
