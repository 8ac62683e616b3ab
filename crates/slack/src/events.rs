use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use karmic_core::domain::subject::UserId;
use karmic_core::format::ReplyFormatter;
use karmic_core::ledger::{KarmaLedger, KarmaStore};
use karmic_core::parser::parse_changes;

use crate::{
    blocks::{self, MessageTemplate},
    commands::{
        normalize_karma_command, CommandParseError, CommandRouteError, CommandRouter,
        KarmaQueryService, SlashCommandPayload,
    },
    reply::{Reply, ReplySink},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    Message(MessageEvent),
    /// A message event that failed to decode but still names a channel.
    Malformed { channel_id: String, thread_ts: String },
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::Message(_) | Self::Malformed { .. } => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Maps the inner `event` object of an Events API callback.
    pub fn from_event_json(event: &Value) -> Self {
        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("unknown");
        if event_type != "message" {
            return Self::Unsupported { event_type: event_type.to_owned() };
        }

        match serde_json::from_value::<RawMessageEvent>(event.clone()) {
            Ok(raw) => Self::Message(raw.into()),
            Err(error) => {
                warn!(
                    event_name = "ingress.slack.message_malformed",
                    error = %error,
                    "message event could not be decoded"
                );
                let field = |name: &str| event.get(name).and_then(Value::as_str);
                match (field("channel"), field("user"), field("thread_ts").or(field("ts"))) {
                    (Some(channel), Some(_), Some(thread_ts)) => Self::Malformed {
                        channel_id: channel.to_owned(),
                        thread_ts: thread_ts.to_owned(),
                    },
                    _ => Self::Unsupported { event_type: event_type.to_owned() },
                }
            }
        }
    }

    /// The generic error reply for this event, when it has a channel to go to.
    pub fn error_reply(&self) -> Option<Reply> {
        let (channel_id, thread_ts) = match self {
            Self::Message(event) => (&event.channel_id, event.reply_thread_ts()),
            Self::Malformed { channel_id, thread_ts } => (channel_id, thread_ts.as_str()),
            Self::SlashCommand(_) | Self::Unsupported { .. } => return None,
        };
        Some(Reply {
            channel_id: channel_id.clone(),
            thread_ts: Some(thread_ts.to_owned()),
            message: blocks::error_message(None),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    Message,
    Unsupported,
}

/// A channel message. `user_id` is absent for bot posts and most subtypes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub user_id: Option<String>,
    pub text: String,
}

impl MessageEvent {
    /// Replies go to the parent thread, or start one under this message.
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

#[derive(Deserialize)]
struct RawMessageEvent {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    ts: String,
    thread_ts: Option<String>,
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl From<RawMessageEvent> for MessageEvent {
    fn from(raw: RawMessageEvent) -> Self {
        Self {
            channel_id: raw.channel,
            ts: raw.ts,
            thread_ts: raw.thread_ts,
            user_id: raw.user.filter(|user| !user.is_empty()),
            text: raw.text.unwrap_or_default(),
        }
    }
}

/// Top-level Events API request body.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventsApiPayload {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        #[serde(default)]
        event_id: String,
        event: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Route(#[from] CommandRouteError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher wired for karma: message events update karma and `/karma`
/// answers leaderboard and lookup queries.
pub fn karma_dispatcher<S, Q, R>(
    ledger: KarmaLedger<S>,
    formatter: ReplyFormatter,
    sink: R,
    queries: Q,
) -> EventDispatcher
where
    S: KarmaStore + 'static,
    Q: KarmaQueryService + 'static,
    R: ReplySink + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(queries));
    dispatcher.register(MessageEventHandler::new(ledger, formatter, sink));
    dispatcher
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: KarmaQueryService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: KarmaQueryService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let normalized = normalize_karma_command(payload.clone())?;
        let message = self.router.route(&normalized).await?;
        Ok(HandlerResult::Responded(message))
    }
}

/// Runs parse → ledger → format for one message and posts one threaded
/// reply per outcome.
pub struct MessageEventHandler<S, R> {
    ledger: KarmaLedger<S>,
    formatter: ReplyFormatter,
    sink: R,
}

impl<S, R> MessageEventHandler<S, R>
where
    S: KarmaStore,
    R: ReplySink,
{
    pub fn new(ledger: KarmaLedger<S>, formatter: ReplyFormatter, sink: R) -> Self {
        Self { ledger, formatter, sink }
    }

    async fn post(&self, event: &MessageEvent, message: MessageTemplate, ctx: &EventContext) {
        let reply = Reply {
            channel_id: event.channel_id.clone(),
            thread_ts: Some(event.reply_thread_ts().to_owned()),
            message,
        };
        self.deliver(&reply, ctx).await;
    }

    async fn deliver(&self, reply: &Reply, ctx: &EventContext) {
        if let Err(error) = self.sink.post(&reply).await {
            warn!(
                event_name = "egress.slack.reply_failed",
                correlation_id = %ctx.correlation_id,
                channel_id = %reply.channel_id,
                error = %error,
                "failed to post karma reply"
            );
        }
    }
}

#[async_trait]
impl<S, R> EventHandler for MessageEventHandler<S, R>
where
    S: KarmaStore + 'static,
    R: ReplySink + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let event = match &envelope.event {
            SlackEvent::Message(event) => event,
            SlackEvent::Malformed { .. } => {
                if let Some(reply) = envelope.event.error_reply() {
                    self.deliver(&reply, ctx).await;
                }
                return Ok(HandlerResult::Processed);
            }
            _ => return Ok(HandlerResult::Ignored),
        };
        let Some(user_id) = event.user_id.as_deref() else {
            return Ok(HandlerResult::Ignored);
        };

        info!(
            event_name = "ingress.slack.message_received",
            correlation_id = %ctx.correlation_id,
            channel_id = %event.channel_id,
            user_id,
            "received message event"
        );

        let changes = parse_changes(&event.text);
        if changes.is_empty() {
            return Ok(HandlerResult::Ignored);
        }

        let outcomes = self.ledger.apply(&changes, &UserId::new(user_id)).await;
        for outcome in &outcomes {
            let message = match self.formatter.format(outcome) {
                Ok(text) => blocks::karma_update_message(&text),
                Err(error) => blocks::error_message(Some(&error.to_string())),
            };
            self.post(event, message, ctx).await;
        }

        Ok(HandlerResult::Processed)
    }
}
