use chrono::{DateTime, Utc};
use sqlx::Row;

use karmic_core::domain::karma::{ChangeRecord, KarmaRecord};
use karmic_core::domain::subject::{Subject, SubjectKind, UserId};
use karmic_core::leaderboard::Direction;
use karmic_core::ledger::{KarmaDelta, KarmaStore, KarmaTransition, StoreError};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlKarmaRepository {
    pool: DbPool,
}

impl SqlKarmaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn apply(&self, delta: &KarmaDelta) -> Result<KarmaTransition, RepositoryError> {
        let key = delta.subject.key();
        let edited_on = delta.edited_on.to_rfc3339();
        let mut tx = self.pool.begin().await?;

        // Single statement read-modify-write: the running total is never read
        // outside the write lock.
        let current: i64 = sqlx::query(
            "INSERT INTO karma (thing, kind, karma, edited_on)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(thing) DO UPDATE SET
                 karma = karma.karma + excluded.karma,
                 edited_on = excluded.edited_on
             RETURNING karma",
        )
        .bind(&key)
        .bind(delta.kind.as_str())
        .bind(delta.delta)
        .bind(&edited_on)
        .fetch_one(&mut *tx)
        .await?
        .try_get("karma")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO karma_change (delta, thing, editor, edited_on)
             VALUES (?, ?, ?, ?)",
        )
        .bind(delta.delta)
        .bind(&key)
        .bind(delta.editor.as_str())
        .bind(&edited_on)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(KarmaTransition { previous: current - delta.delta, current })
    }

    async fn find_record(&self, subject: &Subject) -> Result<Option<KarmaRecord>, RepositoryError> {
        let row = sqlx::query("SELECT thing, kind, karma, edited_on FROM karma WHERE thing = ?")
            .bind(subject.key())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn ranked(
        &self,
        kind: SubjectKind,
        direction: Direction,
        limit: u32,
    ) -> Result<Vec<KarmaRecord>, RepositoryError> {
        let sql = format!(
            "SELECT thing, kind, karma, edited_on
             FROM karma
             WHERE kind = ?
             ORDER BY karma {}, thing ASC
             LIMIT ?",
            direction.sql_order()
        );

        let rows = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn everything(&self) -> Result<Vec<KarmaRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT thing, kind, karma, edited_on FROM karma ORDER BY karma DESC, thing ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn changes(&self, limit: u32) -> Result<Vec<ChangeRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, delta, thing, editor, edited_on
             FROM karma_change
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_change).collect()
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<KarmaRecord, RepositoryError> {
    let thing: String = row.try_get("thing").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind: String = row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let karma: i64 = row.try_get("karma").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let edited_on: String =
        row.try_get("edited_on").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(KarmaRecord {
        subject: Subject::from_key(&thing),
        kind: kind.parse::<SubjectKind>().map_err(|e| RepositoryError::Decode(e.to_string()))?,
        karma,
        edited_on: parse_timestamp(&edited_on)?,
    })
}

fn row_to_change(row: &sqlx::sqlite::SqliteRow) -> Result<ChangeRecord, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let delta: i64 = row.try_get("delta").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let thing: String = row.try_get("thing").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let editor: String =
        row.try_get("editor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let edited_on: String =
        row.try_get("edited_on").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ChangeRecord {
        id,
        delta,
        subject: Subject::from_key(&thing),
        editor: UserId(editor),
        edited_on: parse_timestamp(&edited_on)?,
    })
}

#[async_trait::async_trait]
impl KarmaStore for SqlKarmaRepository {
    async fn apply_delta(&self, delta: &KarmaDelta) -> Result<KarmaTransition, StoreError> {
        Ok(self.apply(delta).await?)
    }

    async fn find(&self, subject: &Subject) -> Result<Option<KarmaRecord>, StoreError> {
        Ok(self.find_record(subject).await?)
    }

    async fn top_or_bottom(
        &self,
        kind: SubjectKind,
        direction: Direction,
        limit: u32,
    ) -> Result<Vec<KarmaRecord>, StoreError> {
        Ok(self.ranked(kind, direction, limit).await?)
    }

    async fn all(&self) -> Result<Vec<KarmaRecord>, StoreError> {
        Ok(self.everything().await?)
    }

    async fn recent_changes(&self, limit: u32) -> Result<Vec<ChangeRecord>, StoreError> {
        Ok(self.changes(limit).await?)
    }
}
