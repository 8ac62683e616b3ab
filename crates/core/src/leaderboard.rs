use crate::domain::karma::{ChangeRecord, KarmaRecord};
use crate::domain::subject::{Subject, SubjectKind};
use crate::ledger::{KarmaStore, StoreError};

pub const DEFAULT_LEADERBOARD_SIZE: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Highest karma first.
    Top,
    /// Lowest karma first.
    Bottom,
}

impl Direction {
    pub fn sql_order(&self) -> &'static str {
        match self {
            Self::Top => "DESC",
            Self::Bottom => "ASC",
        }
    }
}

/// Read-only queries over stored karma. Nothing here mutates the store and
/// an empty store yields empty lists.
pub struct Leaderboard<S> {
    store: S,
}

impl<S> Leaderboard<S>
where
    S: KarmaStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn top_or_bottom(
        &self,
        kind: SubjectKind,
        direction: Direction,
        limit: u32,
    ) -> Result<Vec<KarmaRecord>, StoreError> {
        self.store.top_or_bottom(kind, direction, limit).await
    }

    pub async fn top(&self, kind: SubjectKind) -> Result<Vec<KarmaRecord>, StoreError> {
        self.top_or_bottom(kind, Direction::Top, DEFAULT_LEADERBOARD_SIZE).await
    }

    pub async fn bottom(&self, kind: SubjectKind) -> Result<Vec<KarmaRecord>, StoreError> {
        self.top_or_bottom(kind, Direction::Bottom, DEFAULT_LEADERBOARD_SIZE).await
    }

    pub async fn all(&self) -> Result<Vec<KarmaRecord>, StoreError> {
        self.store.all().await
    }

    pub async fn lookup(&self, subject: &Subject) -> Result<Option<KarmaRecord>, StoreError> {
        self.store.find(subject).await
    }

    pub async fn recent_changes(&self, limit: u32) -> Result<Vec<ChangeRecord>, StoreError> {
        self.store.recent_changes(limit).await
    }
}

/// Sorts records for a leaderboard: by karma in `direction`, ties broken by
/// subject key so output is stable.
pub fn sort_records(records: &mut [KarmaRecord], direction: Direction) {
    records.sort_by(|left, right| {
        let by_karma = match direction {
            Direction::Top => right.karma.cmp(&left.karma),
            Direction::Bottom => left.karma.cmp(&right.karma),
        };
        by_karma.then_with(|| left.subject.key().cmp(&right.subject.key()))
    });
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{sort_records, Direction};
    use crate::domain::karma::KarmaRecord;
    use crate::domain::subject::{Subject, SubjectKind};

    fn record(key: &str, karma: i64) -> KarmaRecord {
        KarmaRecord {
            subject: Subject::thing(key),
            kind: SubjectKind::Thing,
            karma,
            edited_on: Utc::now(),
        }
    }

    #[test]
    fn sorts_descending_for_top_and_ascending_for_bottom() {
        let mut records = vec![record("`a`", 1), record("`b`", 7), record("`c`", -3)];

        sort_records(&mut records, Direction::Top);
        let top: Vec<i64> = records.iter().map(|r| r.karma).collect();
        assert_eq!(top, vec![7, 1, -3]);

        sort_records(&mut records, Direction::Bottom);
        let bottom: Vec<i64> = records.iter().map(|r| r.karma).collect();
        assert_eq!(bottom, vec![-3, 1, 7]);
    }

    #[test]
    fn ties_are_broken_by_subject_key() {
        let mut records = vec![record("`z`", 2), record("`a`", 2)];
        sort_records(&mut records, Direction::Top);
        assert_eq!(records[0].subject.key(), "`a`");
    }
}
