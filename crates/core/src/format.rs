use thiserror::Error;

use crate::domain::karma::UpdateOutcome;
use crate::domain::subject::Subject;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Something went wrong. Failed to update karma for {subject}.")]
    UpdateFailed { subject: Subject },
}

/// Renders ledger outcomes as chat replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplyFormatter {
    buzzkill_limit: i64,
}

impl ReplyFormatter {
    pub fn new(buzzkill_limit: i64) -> Self {
        Self { buzzkill_limit }
    }

    /// Fails for unsuccessful outcomes so callers post a generic error
    /// notice instead of a misleading success message.
    pub fn format(&self, outcome: &UpdateOutcome) -> Result<String, FormatError> {
        if !outcome.success {
            return Err(FormatError::UpdateFailed { subject: outcome.subject.clone() });
        }

        if outcome.sabotage {
            return Ok(if outcome.requested_delta > 0 {
                "Don't be a weasel.".to_owned()
            } else {
                "Aw, don't be so hard on yourself.".to_owned()
            });
        }

        let direction = if outcome.applied_delta > 0 { "increased" } else { "decreased" };
        let mut text = format!(
            "{}'s karma has {direction} from {} to {}",
            outcome.subject, outcome.previous, outcome.current
        );
        if outcome.buzzkill {
            let plural = if self.buzzkill_limit == 1 { "" } else { "s" };
            text.push_str(&format!(
                " (Buzzkill Mode™️ has enforced a maximum change of {} point{plural})",
                self.buzzkill_limit
            ));
        }
        text.push('.');
        Ok(text)
    }
}
