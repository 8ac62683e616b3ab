use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Form, State},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use karmic_core::errors::ApplicationError;
use karmic_slack::blocks;
use karmic_slack::commands::SlashCommandPayload;
use karmic_slack::events::{
    EventContext, EventDispatcher, EventsApiPayload, HandlerResult, SlackEnvelope, SlackEvent,
};
use karmic_slack::reply::ReplySink;
use serde_json::json;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Counts spawned event tasks so shutdown can wait for them to drain.
#[derive(Clone, Default)]
pub struct InFlight {
    count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

pub struct InFlightGuard {
    tracker: InFlight,
}

impl InFlight {
    pub fn start(&self) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { tracker: self.clone() }
    }

    pub fn active(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct IngressState {
    dispatcher: Arc<EventDispatcher>,
    sink: Arc<dyn ReplySink>,
    in_flight: InFlight,
}

impl IngressState {
    pub fn new(dispatcher: EventDispatcher, sink: Arc<dyn ReplySink>, in_flight: InFlight) -> Self {
        Self { dispatcher: Arc::new(dispatcher), sink, in_flight }
    }
}

pub fn router(state: IngressState) -> Router {
    Router::new()
        .route("/slack/events", post(events))
        .route("/slack/command", post(command))
        .with_state(state)
}

/// Acknowledges immediately; message events are processed on their own task.
/// A task that fails or panics still leaves a generic error in the channel.
async fn events(
    State(state): State<IngressState>,
    Json(payload): Json<EventsApiPayload>,
) -> Response {
    match payload {
        EventsApiPayload::UrlVerification { challenge } => {
            info!(event_name = "ingress.slack.url_verification", "answering url verification");
            Json(json!({ "challenge": challenge })).into_response()
        }
        EventsApiPayload::EventCallback { event_id, event } => {
            let envelope =
                SlackEnvelope { envelope_id: event_id, event: SlackEvent::from_event_json(&event) };
            let ctx = EventContext { correlation_id: Uuid::new_v4().to_string() };
            let failure_reply = envelope.event.error_reply();
            let guard = state.in_flight.start();
            let dispatcher = Arc::clone(&state.dispatcher);
            let sink = Arc::clone(&state.sink);

            tokio::spawn(async move {
                let _guard = guard;
                let correlation_id = ctx.correlation_id.clone();
                let envelope_id = envelope.envelope_id.clone();

                let outcome =
                    tokio::spawn(async move { dispatcher.dispatch(&envelope, &ctx).await }).await;
                let failure = match outcome {
                    Ok(Ok(_)) => return,
                    Ok(Err(error)) => error.to_string(),
                    Err(join_error) => join_error.to_string(),
                };
                error!(
                    event_name = "ingress.slack.event_failed",
                    correlation_id = %correlation_id,
                    envelope_id = %envelope_id,
                    error = %failure,
                    "event handler failed"
                );

                let Some(reply) = failure_reply else {
                    return;
                };
                if let Err(error) = sink.post(&reply).await {
                    warn!(
                        event_name = "egress.slack.reply_failed",
                        correlation_id = %correlation_id,
                        channel_id = %reply.channel_id,
                        error = %error,
                        "failed to post failure notice"
                    );
                }
            });

            Json(json!({ "ok": true })).into_response()
        }
        EventsApiPayload::Other => Json(json!({ "ok": true })).into_response(),
    }
}

async fn command(
    State(state): State<IngressState>,
    Form(payload): Form<SlashCommandPayload>,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let envelope = SlackEnvelope {
        envelope_id: payload.trigger_id.clone(),
        event: SlackEvent::SlashCommand(payload),
    };
    let ctx = EventContext { correlation_id: correlation_id.clone() };

    let message = match state.dispatcher.dispatch(&envelope, &ctx).await {
        Ok(HandlerResult::Responded(message)) => message,
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => blocks::help_message(),
        Err(error) => {
            warn!(
                event_name = "ingress.slack.command_failed",
                correlation_id = %correlation_id,
                error = %error,
                "slash command failed"
            );
            let interface = ApplicationError::Integration(error.to_string())
                .into_interface(correlation_id);
            blocks::interface_error_message(&interface)
        }
    };

    Json(message.to_payload()).into_response()
}
