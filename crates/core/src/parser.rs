//! Karma mention parsing.
//!
//! Recognizes `<@U123>++`, `` `some thing`-- `` and `:emoji:+++` anywhere in a
//! message. A run of `n` signs is worth `n - 1` points, so `++` is +1 and
//! `---` is -2.

use std::sync::OnceLock;

use regex::{CaptureMatches, Captures, Regex};
use tracing::warn;

use crate::domain::subject::Subject;

const MENTION_PATTERN: &str = r"(?i)(?:(<@[WU][^>]+?>)|(`[^`]+`|:[-'\w]+:))\s*([+-]{2,})";

static MENTION_REGEX: OnceLock<Regex> = OnceLock::new();

fn mention_regex() -> &'static Regex {
    MENTION_REGEX.get_or_init(|| Regex::new(MENTION_PATTERN).expect("mention pattern compiles"))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mention {
    pub subject: Subject,
    pub delta: i64,
    pub start: usize,
    pub end: usize,
}

/// Lazy, non-overlapping scan over one message. Each call to [`Mentions::new`]
/// starts from the beginning of the text; no cursor is shared between scans.
pub struct Mentions<'h> {
    captures: CaptureMatches<'static, 'h>,
}

impl<'h> Mentions<'h> {
    pub fn new(text: &'h str) -> Self {
        Self { captures: mention_regex().captures_iter(text) }
    }
}

impl Iterator for Mentions<'_> {
    type Item = Mention;

    fn next(&mut self) -> Option<Self::Item> {
        for captures in self.captures.by_ref() {
            if let Some(mention) = mention_from_captures(&captures) {
                return Some(mention);
            }
        }
        None
    }
}

fn mention_from_captures(captures: &Captures<'_>) -> Option<Mention> {
    let whole = captures.get(0)?;
    let run = captures.get(3)?;

    let subject = match (captures.get(1), captures.get(2)) {
        (Some(user), _) => Subject::from_user_mention(user.as_str())?,
        (None, Some(thing)) => Subject::thing(thing.as_str()),
        (None, None) => return None,
    };

    Some(Mention { subject, delta: run_delta(run.as_str()), start: whole.start(), end: whole.end() })
}

/// Converts a run of `+` or `-` into a signed delta. The leading character
/// decides the sign; a mixed run still counts every character.
pub fn run_delta(run: &str) -> i64 {
    let length = i64::try_from(run.chars().count()).unwrap_or(i64::MAX);
    let magnitude = length.saturating_sub(1).max(1);
    let mut chars = run.chars();

    let sign = match chars.next() {
        Some('+') => 1,
        Some('-') => -1,
        other => {
            warn!(
                event_name = "karma.parser.unknown_run_character",
                character = ?other,
                run,
                "unexpected karma run character; assuming +1"
            );
            return 1;
        }
    };

    let leading = if sign > 0 { '+' } else { '-' };
    if let Some(stray) = chars.find(|ch| *ch != leading) {
        warn!(
            event_name = "karma.parser.mixed_run",
            character = %stray,
            run,
            "karma run mixes signs; using the leading sign"
        );
    }

    sign * magnitude
}

/// Ordered subject → delta mapping. Iteration follows first appearance in
/// the message and the first delta for a subject wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KarmaChanges {
    entries: Vec<(Subject, i64)>,
}

impl KarmaChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `delta` for `subject` unless the subject was already seen.
    /// Returns whether the entry was kept.
    pub fn insert_first(&mut self, subject: Subject, delta: i64) -> bool {
        if self.contains(&subject) {
            return false;
        }
        self.entries.push((subject, delta));
        true
    }

    pub fn contains(&self, subject: &Subject) -> bool {
        self.entries.iter().any(|(existing, _)| existing == subject)
    }

    pub fn get(&self, subject: &Subject) -> Option<i64> {
        self.entries.iter().find(|(existing, _)| existing == subject).map(|(_, delta)| *delta)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Subject, i64)> + '_ {
        self.entries.iter().map(|(subject, delta)| (subject, *delta))
    }
}

impl FromIterator<(Subject, i64)> for KarmaChanges {
    fn from_iter<T: IntoIterator<Item = (Subject, i64)>>(iter: T) -> Self {
        let mut changes = Self::new();
        for (subject, delta) in iter {
            changes.insert_first(subject, delta);
        }
        changes
    }
}

impl IntoIterator for KarmaChanges {
    type Item = (Subject, i64);
    type IntoIter = std::vec::IntoIter<(Subject, i64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Extracts every karma change from a message. Never fails; text without
/// mentions yields an empty mapping.
pub fn parse_changes(text: &str) -> KarmaChanges {
    Mentions::new(text).map(|mention| (mention.subject, mention.delta)).collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_changes, run_delta, KarmaChanges, Mentions};
    use crate::domain::subject::Subject;

    fn pairs(changes: &KarmaChanges) -> Vec<(String, i64)> {
        changes.iter().map(|(subject, delta)| (subject.key(), delta)).collect()
    }

    #[test]
    fn parses_user_mentions() {
        let changes = parse_changes("<@USOMEUSER>++");
        assert_eq!(pairs(&changes), vec![("<@USOMEUSER>".to_owned(), 1)]);
    }

    #[test]
    fn parses_backtick_phrases() {
        let changes = parse_changes("`some thing`++");
        assert_eq!(pairs(&changes), vec![("`some thing`".to_owned(), 1)]);
    }

    #[test]
    fn parses_emoji_tokens() {
        let changes = parse_changes(":my-emoji:++");
        assert_eq!(pairs(&changes), vec![(":my-emoji:".to_owned(), 1)]);

        let changes = parse_changes(":don't_panic:--");
        assert_eq!(pairs(&changes), vec![(":don't_panic:".to_owned(), -1)]);
    }

    #[test]
    fn run_length_sets_magnitude() {
        assert_eq!(parse_changes("`x`+++").get(&Subject::thing("`x`")), Some(2));
        assert_eq!(parse_changes("`x`---").get(&Subject::thing("`x`")), Some(-2));
        assert_eq!(parse_changes("`x`--").get(&Subject::thing("`x`")), Some(-1));
        assert_eq!(parse_changes("`x`++++++++++++").get(&Subject::thing("`x`")), Some(11));
    }

    #[test]
    fn whitespace_between_subject_and_run_is_allowed() {
        let changes = parse_changes("thanks <@U1>   ++ and `docs` \t--");
        assert_eq!(pairs(&changes), vec![("<@U1>".to_owned(), 1), ("`docs`".to_owned(), -1)]);
    }

    #[test]
    fn single_sign_is_not_a_change() {
        assert!(parse_changes("`x`+ and <@U1>-").is_empty());
        assert!(parse_changes("c++ is a language").is_empty());
    }

    #[test]
    fn empty_and_plain_messages_yield_nothing() {
        assert!(parse_changes("").is_empty());
        assert!(parse_changes("good morning everyone").is_empty());
    }

    #[test]
    fn first_occurrence_wins_after_normalization() {
        let changes = parse_changes("<@U1|name>++ <@U1>--");
        assert_eq!(pairs(&changes), vec![("<@U1>".to_owned(), 1)]);

        let changes = parse_changes("`x`--- `y`++ `x`++");
        assert_eq!(pairs(&changes), vec![("`x`".to_owned(), -2), ("`y`".to_owned(), 1)]);
    }

    #[test]
    fn result_order_follows_first_appearance() {
        let changes = parse_changes(":b:++ `a`++ <@W9>++");
        assert_eq!(
            pairs(&changes),
            vec![(":b:".to_owned(), 1), ("`a`".to_owned(), 1), ("<@W9>".to_owned(), 1)]
        );
    }

    #[test]
    fn thing_phrases_are_case_and_space_sensitive() {
        let changes = parse_changes("`Rust`++ `rust`++ `ru st`++");
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn parsing_is_repeatable() {
        let message = "<@U1>++ `x`--- :tada:+++";
        assert_eq!(parse_changes(message), parse_changes(message));

        let first: Vec<_> = Mentions::new(message).collect();
        let second: Vec<_> = Mentions::new(message).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn mentions_report_spans() {
        let message = "hi `x`++";
        let mention = Mentions::new(message).next().expect("one mention");
        assert_eq!(&message[mention.start..mention.end], "`x`++");
    }

    #[test]
    fn mixed_runs_use_the_leading_sign() {
        assert_eq!(run_delta("+-"), 1);
        assert_eq!(run_delta("-++"), -2);
        assert_eq!(run_delta("?!"), 1);
    }
}
