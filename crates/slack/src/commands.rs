use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use karmic_core::domain::karma::KarmaRecord;
use karmic_core::domain::subject::{Subject, SubjectKind};
use karmic_core::leaderboard::{Direction, Leaderboard, DEFAULT_LEADERBOARD_SIZE};
use karmic_core::ledger::{KarmaStore, StoreError};

use crate::blocks::{self, MessageTemplate};

/// Form body Slack posts for a slash command.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub trigger_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub flags: Vec<String>,
    pub command: KarmaCommand,
    pub channel_id: String,
    pub user_id: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KarmaCommand {
    Help,
    Leaderboard { kind: SubjectKind, direction: Option<Direction> },
    Lookup { subject: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

impl From<StoreError> for CommandRouteError {
    fn from(value: StoreError) -> Self {
        Self::Service(value.to_string())
    }
}

pub fn normalize_karma_command(
    payload: SlashCommandPayload,
) -> Result<CommandEnvelope, CommandParseError> {
    if payload.command != "/karma" {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    let (flags, command) = parse_karma_command(&payload.text);
    Ok(CommandEnvelope {
        flags,
        command,
        channel_id: payload.channel_id,
        user_id: payload.user_id,
        request_id: payload.trigger_id,
    })
}

/// Splits `/karma` text into its leading `:flag` words and the command.
///
/// Flags are only recognized before the first plain word. `users` and
/// `things` open a leaderboard; any other word is looked up as a subject,
/// together with the rest of the text so backticked phrases survive.
pub fn parse_karma_command(text: &str) -> (Vec<String>, KarmaCommand) {
    let mut flags = Vec::new();
    let mut rest = text.trim();

    while let Some(word) = rest.split_whitespace().next() {
        if !word.starts_with(':') {
            break;
        }
        flags.push(word.to_owned());
        rest = rest[word.len()..].trim_start();
    }

    let Some(word) = rest.split_whitespace().next() else {
        return (flags, KarmaCommand::Help);
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "help" => KarmaCommand::Help,
        "users" => KarmaCommand::Leaderboard {
            kind: SubjectKind::User,
            direction: direction_from_flags(&flags),
        },
        "things" => KarmaCommand::Leaderboard {
            kind: SubjectKind::Thing,
            direction: direction_from_flags(&flags),
        },
        _ => KarmaCommand::Lookup { subject: rest.trim_end().to_owned() },
    };

    (flags, command)
}

/// Exactly one of `:top` or `:bottom` selects a direction; both or neither is
/// ambiguous.
fn direction_from_flags(flags: &[String]) -> Option<Direction> {
    let top = flags.iter().any(|flag| flag.eq_ignore_ascii_case(":top"));
    let bottom = flags.iter().any(|flag| flag.eq_ignore_ascii_case(":bottom"));
    match (top, bottom) {
        (true, false) => Some(Direction::Top),
        (false, true) => Some(Direction::Bottom),
        _ => None,
    }
}

fn kind_label(kind: SubjectKind) -> &'static str {
    match kind {
        SubjectKind::User => "users",
        SubjectKind::Thing => "things",
        SubjectKind::Unknown => "subjects",
    }
}

#[async_trait]
pub trait KarmaQueryService: Send + Sync {
    async fn ranked(
        &self,
        kind: SubjectKind,
        direction: Direction,
        limit: u32,
    ) -> Result<Vec<KarmaRecord>, CommandRouteError>;

    async fn karma_of(&self, subject: &Subject) -> Result<i64, CommandRouteError>;
}

#[async_trait]
impl<S> KarmaQueryService for Leaderboard<S>
where
    S: KarmaStore,
{
    async fn ranked(
        &self,
        kind: SubjectKind,
        direction: Direction,
        limit: u32,
    ) -> Result<Vec<KarmaRecord>, CommandRouteError> {
        Ok(self.top_or_bottom(kind, direction, limit).await?)
    }

    async fn karma_of(&self, subject: &Subject) -> Result<i64, CommandRouteError> {
        Ok(self.lookup(subject).await?.map_or(0, |record| record.karma))
    }
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: KarmaQueryService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        info!(
            event_name = "ingress.slack.command_routed",
            correlation_id = %envelope.request_id,
            flags = %envelope.flags.join(" "),
            command = ?envelope.command,
            "routing karma command"
        );

        match &envelope.command {
            KarmaCommand::Help => Ok(blocks::help_message()),
            KarmaCommand::Leaderboard { direction: None, .. } => {
                Ok(blocks::missing_direction_message())
            }
            KarmaCommand::Leaderboard { kind, direction: Some(direction) } => {
                let records =
                    self.service.ranked(*kind, *direction, DEFAULT_LEADERBOARD_SIZE).await?;
                Ok(blocks::leaderboard_message(kind_label(*kind), *direction, &records))
            }
            KarmaCommand::Lookup { subject } => {
                let subject = Subject::from_key(subject);
                let karma = self.service.karma_of(&subject).await?;
                Ok(blocks::lookup_message(&subject.to_string(), karma))
            }
        }
    }
}
