use karmic_core::domain::karma::KarmaRecord;
use karmic_core::domain::subject::SubjectKind;
use karmic_core::leaderboard::{Direction, Leaderboard};
use karmic_core::ledger::StoreError;

use crate::commands::{query_store, CommandResult};

pub fn run(kind: SubjectKind, direction: Direction, limit: u32) -> CommandResult {
    query_store("leaderboard", |store| async move {
        let records = Leaderboard::new(store).top_or_bottom(kind, direction, limit).await?;
        Ok::<_, StoreError>(render(kind, direction, &records))
    })
}

fn render(kind: SubjectKind, direction: Direction, records: &[KarmaRecord]) -> String {
    let label = match kind {
        SubjectKind::User => "users",
        SubjectKind::Thing => "things",
        SubjectKind::Unknown => "subjects",
    };
    let extreme = match direction {
        Direction::Top => "most",
        Direction::Bottom => "least",
    };

    let mut lines = vec![format!("The {label} with the {extreme} karma.")];
    if records.is_empty() {
        lines.push("Empty!".to_string());
    }
    lines.extend(records.iter().map(|record| format!("{:>5}  {}", record.karma, record.subject)));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use karmic_core::domain::karma::KarmaRecord;
    use karmic_core::domain::subject::{Subject, SubjectKind};
    use karmic_core::leaderboard::Direction;

    use super::render;

    fn record(subject: Subject, karma: i64) -> KarmaRecord {
        KarmaRecord { kind: subject.kind(), subject, karma, edited_on: Utc::now() }
    }

    #[test]
    fn renders_right_aligned_rows() {
        let output = render(
            SubjectKind::Thing,
            Direction::Top,
            &[record(Subject::thing("`rust`"), 12), record(Subject::thing(":tada:"), -3)],
        );

        assert_eq!(output, "The things with the most karma.\n   12  `rust`\n   -3  :tada:");
    }

    #[test]
    fn renders_empty_notice() {
        let output = render(SubjectKind::User, Direction::Bottom, &[]);
        assert_eq!(output, "The users with the least karma.\nEmpty!");
    }
}
