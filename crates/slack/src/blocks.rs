use serde::Serialize;
use serde_json::{json, Value};

use karmic_core::domain::karma::KarmaRecord;
use karmic_core::errors::InterfaceError;
use karmic_core::leaderboard::Direction;

pub const GENERIC_ERROR_TEXT: &str = "An error occurred. Tell an admin to fix it.";

/// Slack rejects section and context text objects longer than this many
/// characters with `invalid_blocks`. The top-level `text` has no such cap.
pub const BLOCK_TEXT_LIMIT: usize = 3000;

fn exceeds_block_limit(text: &str) -> bool {
    text.chars().count() > BLOCK_TEXT_LIMIT
}

/// Cuts `text` to at most `limit` characters, marking the cut with `…`.
fn clip(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let mut clipped: String = text.chars().take(limit.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

/// Who sees a slash-command response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Ephemeral,
    InChannel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
}

impl MessageTemplate {
    /// Body accepted by both `chat.postMessage` and slash-command responses.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "text": self.fallback_text,
            "blocks": self.blocks,
        });
        if let (Some(response_type), Some(object)) = (self.response_type, payload.as_object_mut())
        {
            object.insert("response_type".to_owned(), json!(response_type));
        }
        payload
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
    response_type: Option<ResponseType>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new(), response_type: None }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate {
            fallback_text: self.fallback_text,
            blocks: self.blocks,
            response_type: self.response_type,
        }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// Oversized updates (long backtick phrases) are sent as plain `text` only.
pub fn karma_update_message(text: &str) -> MessageTemplate {
    if exceeds_block_limit(text) {
        return MessageBuilder::new(text).build();
    }

    MessageBuilder::new(text)
        .section("karma.update.v1", |section| {
            section.mrkdwn(text);
        })
        .build()
}

/// Generic failure notice, optionally followed by the underlying detail.
pub fn error_message(detail: Option<&str>) -> MessageTemplate {
    let builder = MessageBuilder::new(GENERIC_ERROR_TEXT).section("karma.error.v1", |section| {
        section.mrkdwn(format!(":poop: *Uh oh!*\n{GENERIC_ERROR_TEXT}"));
    });

    match detail {
        Some(detail) => builder
            .context("karma.error.detail.v1", |context| {
                context.mrkdwn(clip(detail, BLOCK_TEXT_LIMIT));
            })
            .build(),
        None => builder.build(),
    }
}

pub fn interface_error_message(error: &InterfaceError) -> MessageTemplate {
    MessageBuilder::new(error.user_message())
        .section("karma.error.v1", |section| {
            section.mrkdwn(error.user_message());
        })
        .context("karma.error.ref.v1", |context| {
            context.mrkdwn(format!("ref `{}`", error.correlation_id()));
        })
        .response_type(ResponseType::Ephemeral)
        .build()
}

pub const USAGE_TEXT: &str = "\
/karma                  print this help message
/karma :top things      show top 10 things
/karma :bottom things   show bottom 10 things
/karma :top users       show top 10 users
/karma :bottom users    show bottom 10 users
/karma `thing`          lookup thing's current karma
/karma @user            lookup a user's current karma
`thing`++               add 1 karma to thing
`thing`---              remove 2 karma from thing
`subject phrase`++      add 1 karma to a subject phrase
@user++                 add 1 karma to a user";

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Karma bot is back baby!")
        .section("karma.help.header.v1", |section| {
            section.mrkdwn("*Karma bot is back baby!*");
        })
        .section("karma.help.usage.v1", |section| {
            section.mrkdwn(format!("*Usage*\n```\n{USAGE_TEXT}\n```"));
        })
        .response_type(ResponseType::Ephemeral)
        .build()
}

pub fn missing_direction_message() -> MessageTemplate {
    MessageBuilder::new("You must specify :top or :bottom.")
        .section("karma.leaderboard.direction.v1", |section| {
            section.plain("You must specify :top or :bottom.");
        })
        .response_type(ResponseType::Ephemeral)
        .build()
}

/// `label` is the plural subject word, e.g. `users` or `things`.
pub fn leaderboard_message(
    label: &str,
    direction: Direction,
    records: &[KarmaRecord],
) -> MessageTemplate {
    let superlative = match direction {
        Direction::Top => "most",
        Direction::Bottom => "least",
    };
    let title = format!("The {label} with the {superlative} karma.");
    let rows = records
        .iter()
        .map(|record| format!("{:>5}  {}", record.karma, record.subject))
        .collect::<Vec<_>>()
        .join("\n");
    let body = if rows.is_empty() { "Empty!".to_owned() } else { rows };
    let fence = "```\n\n```".chars().count();
    let body = clip(&body, BLOCK_TEXT_LIMIT - fence);

    MessageBuilder::new(title.clone())
        .section("karma.leaderboard.title.v1", |section| {
            section.plain(title);
        })
        .section("karma.leaderboard.rows.v1", |section| {
            section.mrkdwn(format!("```\n{body}\n```"));
        })
        .response_type(ResponseType::InChannel)
        .build()
}

pub fn lookup_message(subject: &str, karma: i64) -> MessageTemplate {
    let text = format!("{subject} has {karma} karma.");
    if exceeds_block_limit(&text) {
        return MessageBuilder::new(text).response_type(ResponseType::Ephemeral).build();
    }

    MessageBuilder::new(text.clone())
        .section("karma.lookup.v1", |section| {
            section.mrkdwn(text);
        })
        .response_type(ResponseType::Ephemeral)
        .build()
}
