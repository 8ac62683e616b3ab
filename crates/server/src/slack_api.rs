use async_trait::async_trait;
use karmic_slack::reply::{Reply, ReplyError, ReplySink};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

pub const SLACK_API_BASE_URL: &str = "https://slack.com/api";

/// Posts replies through the Web API `chat.postMessage` method.
pub struct SlackWebApiSink {
    client: Client,
    bot_token: SecretString,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackWebApiSink {
    pub fn new(bot_token: SecretString) -> Self {
        Self::with_base_url(bot_token, SLACK_API_BASE_URL)
    }

    pub fn with_base_url(bot_token: SecretString, base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), bot_token, base_url: base_url.into() }
    }

    fn body(reply: &Reply) -> Value {
        let mut body = reply.message.to_payload();
        if let Some(object) = body.as_object_mut() {
            object.remove("response_type");
            object.insert("channel".to_owned(), Value::String(reply.channel_id.clone()));
            if let Some(thread_ts) = &reply.thread_ts {
                object.insert("thread_ts".to_owned(), Value::String(thread_ts.clone()));
            }
        }
        body
    }
}

#[async_trait]
impl ReplySink for SlackWebApiSink {
    async fn post(&self, reply: &Reply) -> Result<(), ReplyError> {
        let url = format!("{}/chat.postMessage", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(&Self::body(reply))
            .send()
            .await
            .map_err(|error| ReplyError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReplyError::Transport(format!("chat.postMessage returned {status}")));
        }

        let payload: ApiResponse =
            response.json().await.map_err(|error| ReplyError::Transport(error.to_string()))?;
        if !payload.ok {
            return Err(ReplyError::Rejected(
                payload.error.unwrap_or_else(|| "unknown_error".to_owned()),
            ));
        }

        Ok(())
    }
}

/// Stand-in used when no bot token is configured: replies are logged only.
pub struct LoggingReplySink;

#[async_trait]
impl ReplySink for LoggingReplySink {
    async fn post(&self, reply: &Reply) -> Result<(), ReplyError> {
        info!(
            event_name = "egress.slack.reply_logged",
            channel_id = %reply.channel_id,
            thread_ts = reply.thread_ts.as_deref().unwrap_or(""),
            text = %reply.message.fallback_text,
            "no bot token configured; reply not sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use karmic_slack::blocks::karma_update_message;
    use karmic_slack::reply::{Reply, ReplyError, ReplySink};
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::SlackWebApiSink;

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn fake_slack(respond_with: Value) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/chat.postMessage",
                post(
                    |State((captured, respond_with)): State<(Captured, Value)>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_owned);
                        captured.lock().await.push((auth, body));
                        Json(respond_with)
                    },
                ),
            )
            .with_state((Arc::clone(&captured), respond_with));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (format!("http://{address}"), captured)
    }

    fn reply() -> Reply {
        Reply {
            channel_id: "C1".to_owned(),
            thread_ts: Some("100.1".to_owned()),
            message: karma_update_message("`x`'s karma has increased from 0 to 1."),
        }
    }

    #[tokio::test]
    async fn posts_threaded_message_with_bot_token() {
        let (base_url, captured) = fake_slack(json!({"ok": true})).await;
        let sink = SlackWebApiSink::with_base_url("xoxb-test".to_owned().into(), base_url);

        sink.post(&reply()).await.expect("post");

        let captured = captured.lock().await;
        let (auth, body) = &captured[0];
        assert_eq!(auth.as_deref(), Some("Bearer xoxb-test"));
        assert_eq!(body["channel"], "C1");
        assert_eq!(body["thread_ts"], "100.1");
        assert_eq!(body["text"], "`x`'s karma has increased from 0 to 1.");
        assert!(body.get("response_type").is_none());
    }

    #[tokio::test]
    async fn api_errors_surface_as_rejections() {
        let (base_url, _captured) =
            fake_slack(json!({"ok": false, "error": "channel_not_found"})).await;
        let sink = SlackWebApiSink::with_base_url("xoxb-test".to_owned().into(), base_url);

        let error = sink.post(&reply()).await.expect_err("should be rejected");
        assert_eq!(error, ReplyError::Rejected("channel_not_found".to_owned()));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transport_error() {
        let sink = SlackWebApiSink::with_base_url(
            "xoxb-test".to_owned().into(),
            "http://127.0.0.1:9",
        );

        let error = sink.post(&reply()).await.expect_err("should fail");
        assert!(matches!(error, ReplyError::Transport(_)));
    }
}
