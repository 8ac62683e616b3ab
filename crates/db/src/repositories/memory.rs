use std::collections::HashMap;

use tokio::sync::RwLock;

use karmic_core::domain::karma::{ChangeRecord, KarmaRecord};
use karmic_core::domain::subject::{Subject, SubjectKind};
use karmic_core::leaderboard::{sort_records, Direction};
use karmic_core::ledger::{KarmaDelta, KarmaStore, KarmaTransition, StoreError};

#[derive(Default)]
struct MemoryState {
    totals: HashMap<String, KarmaRecord>,
    changes: Vec<ChangeRecord>,
}

/// Process-local karma store. Totals and the change log share one lock so a
/// delta and its change row land together.
#[derive(Default)]
pub struct InMemoryKarmaRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryKarmaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KarmaStore for InMemoryKarmaRepository {
    async fn apply_delta(&self, delta: &KarmaDelta) -> Result<KarmaTransition, StoreError> {
        let mut state = self.state.write().await;
        let key = delta.subject.key();

        let record = state.totals.entry(key).or_insert_with(|| KarmaRecord {
            subject: delta.subject.clone(),
            kind: delta.kind,
            karma: 0,
            edited_on: delta.edited_on,
        });
        let previous = record.karma;
        record.karma += delta.delta;
        record.edited_on = delta.edited_on;
        let current = record.karma;

        let id = i64::try_from(state.changes.len())
            .map_err(|e| StoreError::Backend(e.to_string()))?
            + 1;
        state.changes.push(ChangeRecord {
            id,
            delta: delta.delta,
            subject: delta.subject.clone(),
            editor: delta.editor.clone(),
            edited_on: delta.edited_on,
        });

        Ok(KarmaTransition { previous, current })
    }

    async fn find(&self, subject: &Subject) -> Result<Option<KarmaRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state.totals.get(&subject.key()).cloned())
    }

    async fn top_or_bottom(
        &self,
        kind: SubjectKind,
        direction: Direction,
        limit: u32,
    ) -> Result<Vec<KarmaRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<KarmaRecord> =
            state.totals.values().filter(|record| record.kind == kind).cloned().collect();
        sort_records(&mut records, direction);
        records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(records)
    }

    async fn all(&self) -> Result<Vec<KarmaRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<KarmaRecord> = state.totals.values().cloned().collect();
        sort_records(&mut records, Direction::Top);
        Ok(records)
    }

    async fn recent_changes(&self, limit: u32) -> Result<Vec<ChangeRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .changes
            .iter()
            .rev()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use karmic_core::domain::subject::{Subject, SubjectKind, UserId};
    use karmic_core::leaderboard::{Direction, Leaderboard};
    use karmic_core::ledger::{BuzzkillPolicy, KarmaDelta, KarmaLedger, KarmaStore};
    use karmic_core::parser::parse_changes;

    use super::InMemoryKarmaRepository;

    fn delta(subject: Subject, amount: i64) -> KarmaDelta {
        KarmaDelta {
            kind: subject.kind(),
            subject,
            delta: amount,
            editor: UserId::new("U1"),
            edited_on: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_store_tracks_totals_and_changes() {
        let repo = InMemoryKarmaRepository::new();

        repo.apply_delta(&delta(Subject::thing("`x`"), 10)).await.expect("seed");
        let transition = repo.apply_delta(&delta(Subject::thing("`x`"), 3)).await.expect("apply");

        assert_eq!((transition.previous, transition.current), (10, 13));
        let changes = repo.recent_changes(10).await.expect("changes");
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].delta, 3);
    }

    #[tokio::test]
    async fn in_memory_store_is_empty_by_default() {
        let repo = InMemoryKarmaRepository::new();
        assert!(repo.all().await.expect("all").is_empty());
        assert!(repo.find(&Subject::user("U1")).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn ledger_and_leaderboard_share_a_store() {
        let store = Arc::new(InMemoryKarmaRepository::new());
        let ledger = KarmaLedger::new(Arc::clone(&store), BuzzkillPolicy::default());
        let leaderboard = Leaderboard::new(Arc::clone(&store));

        ledger.apply(&parse_changes("<@U2>+++ <@U3>-- `tea`++"), &UserId::new("U1")).await;

        let top = leaderboard.top(SubjectKind::User).await.expect("top");
        let keys: Vec<String> = top.iter().map(|r| r.subject.key()).collect();
        assert_eq!(keys, vec!["<@U2>", "<@U3>"]);

        let bottom = leaderboard
            .top_or_bottom(SubjectKind::User, Direction::Bottom, 1)
            .await
            .expect("bottom");
        assert_eq!(bottom[0].karma, -1);

        let things = leaderboard.top(SubjectKind::Thing).await.expect("things");
        assert_eq!(things[0].subject, Subject::thing("`tea`"));
    }
}
