use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::subject::{Subject, SubjectKind, UserId};

/// Running karma total for one subject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaRecord {
    pub subject: Subject,
    pub kind: SubjectKind,
    pub karma: i64,
    pub edited_on: DateTime<Utc>,
}

/// Append-only audit entry for a single applied delta.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: i64,
    pub delta: i64,
    pub subject: Subject,
    pub editor: UserId,
    pub edited_on: DateTime<Utc>,
}

/// Result of applying one subject's change from one message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub subject: Subject,
    pub sabotage: bool,
    pub buzzkill: bool,
    pub requested_delta: i64,
    pub applied_delta: i64,
    pub previous: i64,
    pub current: i64,
    pub success: bool,
}

impl UpdateOutcome {
    pub fn sabotage(subject: Subject, requested_delta: i64) -> Self {
        Self {
            subject,
            sabotage: true,
            buzzkill: false,
            requested_delta,
            applied_delta: 0,
            previous: 0,
            current: 0,
            success: true,
        }
    }
}
