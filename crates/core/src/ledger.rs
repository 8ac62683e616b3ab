use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::karma::{ChangeRecord, KarmaRecord, UpdateOutcome};
use crate::domain::subject::{Subject, SubjectKind, UserId};
use crate::leaderboard::Direction;
use crate::parser::KarmaChanges;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("karma store failure: {0}")]
    Backend(String),
    #[error("karma store returned malformed data: {0}")]
    Decode(String),
}

/// One delta to persist: the new running total and its change-log row are
/// written together or not at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KarmaDelta {
    pub subject: Subject,
    pub kind: SubjectKind,
    pub delta: i64,
    pub editor: UserId,
    pub edited_on: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KarmaTransition {
    pub previous: i64,
    pub current: i64,
}

/// Persistent system of record for karma totals and the change log.
///
/// `apply_delta` must be atomic per subject: concurrent deltas for the same
/// subject are serialized so no increment is lost.
#[async_trait]
pub trait KarmaStore: Send + Sync {
    async fn apply_delta(&self, delta: &KarmaDelta) -> Result<KarmaTransition, StoreError>;

    async fn find(&self, subject: &Subject) -> Result<Option<KarmaRecord>, StoreError>;

    async fn top_or_bottom(
        &self,
        kind: SubjectKind,
        direction: Direction,
        limit: u32,
    ) -> Result<Vec<KarmaRecord>, StoreError>;

    async fn all(&self) -> Result<Vec<KarmaRecord>, StoreError>;

    async fn recent_changes(&self, limit: u32) -> Result<Vec<ChangeRecord>, StoreError>;
}

#[async_trait]
impl<T> KarmaStore for Arc<T>
where
    T: KarmaStore + ?Sized,
{
    async fn apply_delta(&self, delta: &KarmaDelta) -> Result<KarmaTransition, StoreError> {
        (**self).apply_delta(delta).await
    }

    async fn find(&self, subject: &Subject) -> Result<Option<KarmaRecord>, StoreError> {
        (**self).find(subject).await
    }

    async fn top_or_bottom(
        &self,
        kind: SubjectKind,
        direction: Direction,
        limit: u32,
    ) -> Result<Vec<KarmaRecord>, StoreError> {
        (**self).top_or_bottom(kind, direction, limit).await
    }

    async fn all(&self) -> Result<Vec<KarmaRecord>, StoreError> {
        (**self).all().await
    }

    async fn recent_changes(&self, limit: u32) -> Result<Vec<ChangeRecord>, StoreError> {
        (**self).recent_changes(limit).await
    }
}

/// Anti-abuse clamp on the size of a single change ("Buzzkill Mode").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuzzkillPolicy {
    pub enabled: bool,
    pub limit: i64,
}

impl Default for BuzzkillPolicy {
    fn default() -> Self {
        Self { enabled: true, limit: 5 }
    }
}

impl BuzzkillPolicy {
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Returns the delta to apply and whether the clamp kicked in.
    pub fn clamp(&self, requested: i64) -> (i64, bool) {
        if self.enabled && requested.unsigned_abs() > self.limit.unsigned_abs() {
            (self.limit.abs() * requested.signum(), true)
        } else {
            (requested, false)
        }
    }
}

pub struct KarmaLedger<S> {
    store: S,
    policy: BuzzkillPolicy,
}

impl<S> KarmaLedger<S>
where
    S: KarmaStore,
{
    pub fn new(store: S, policy: BuzzkillPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> BuzzkillPolicy {
        self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Applies every parsed change on behalf of `acting_user`, in mapping
    /// order. A failure for one subject is reported on its outcome and never
    /// stops the rest of the batch.
    pub async fn apply(&self, changes: &KarmaChanges, acting_user: &UserId) -> Vec<UpdateOutcome> {
        let mut outcomes = Vec::with_capacity(changes.len());
        for (subject, requested) in changes.iter() {
            outcomes.push(self.apply_one(subject, requested, acting_user).await);
        }
        outcomes
    }

    async fn apply_one(
        &self,
        subject: &Subject,
        requested: i64,
        acting_user: &UserId,
    ) -> UpdateOutcome {
        if subject.is_user(acting_user) {
            info!(
                event_name = "karma.ledger.sabotage",
                subject = %subject,
                editor = %acting_user,
                requested_delta = requested,
                "blocked self-karma attempt"
            );
            return UpdateOutcome::sabotage(subject.clone(), requested);
        }

        let (applied, buzzkill) = self.policy.clamp(requested);
        let delta = KarmaDelta {
            subject: subject.clone(),
            kind: subject.kind(),
            delta: applied,
            editor: acting_user.clone(),
            edited_on: Utc::now(),
        };

        match self.store.apply_delta(&delta).await {
            Ok(transition) => {
                info!(
                    event_name = "karma.ledger.applied",
                    subject = %subject,
                    editor = %acting_user,
                    delta = applied,
                    previous = transition.previous,
                    current = transition.current,
                    buzzkill,
                    "karma updated"
                );
                UpdateOutcome {
                    subject: subject.clone(),
                    sabotage: false,
                    buzzkill,
                    requested_delta: requested,
                    applied_delta: applied,
                    previous: transition.previous,
                    current: transition.current,
                    success: true,
                }
            }
            Err(error) => {
                warn!(
                    event_name = "karma.ledger.persist_failed",
                    subject = %subject,
                    editor = %acting_user,
                    delta = applied,
                    error = %error,
                    "failed to persist karma change"
                );
                UpdateOutcome {
                    subject: subject.clone(),
                    sabotage: false,
                    buzzkill,
                    requested_delta: requested,
                    applied_delta: applied,
                    previous: 0,
                    current: 0,
                    success: false,
                }
            }
        }
    }
}
