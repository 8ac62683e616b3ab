//! Read-only status page: `GET /` renders the full leaderboard and the
//! latest karma changes.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Html, routing::get, Router};
use chrono::{DateTime, Utc};
use karmic_core::domain::karma::{ChangeRecord, KarmaRecord};
use karmic_core::leaderboard::Leaderboard;
use karmic_core::ledger::KarmaStore;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::error;

pub const RECENT_CHANGES_LIMIT: u32 = 100;

const LEADERBOARD_TEMPLATE: &str = "leaderboard.html";

#[derive(Clone)]
pub struct WebState {
    leaderboard: Arc<Leaderboard<Arc<dyn KarmaStore>>>,
    templates: Arc<Tera>,
}

#[derive(Debug, Serialize)]
struct RecordRow {
    karma: i64,
    name: String,
    updated: String,
}

#[derive(Debug, Serialize)]
struct ChangeRow {
    delta: i64,
    name: String,
    editor: String,
    edited_on: String,
}

impl From<&KarmaRecord> for RecordRow {
    fn from(record: &KarmaRecord) -> Self {
        Self {
            karma: record.karma,
            name: record.subject.to_string(),
            updated: display_time(record.edited_on),
        }
    }
}

impl From<&ChangeRecord> for ChangeRow {
    fn from(change: &ChangeRecord) -> Self {
        Self {
            delta: change.delta,
            name: change.subject.to_string(),
            editor: change.editor.mention(),
            edited_on: display_time(change.edited_on),
        }
    }
}

fn display_time(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn init_templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(
        LEADERBOARD_TEMPLATE,
        include_str!("../../../templates/leaderboard.html"),
    )?;
    Ok(tera)
}

pub fn router(store: Arc<dyn KarmaStore>, templates: Tera) -> Router {
    let state =
        WebState { leaderboard: Arc::new(Leaderboard::new(store)), templates: Arc::new(templates) };
    Router::new().route("/", get(leaderboard_page)).with_state(state)
}

async fn leaderboard_page(
    State(state): State<WebState>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let records = state.leaderboard.all().await.map_err(|error| {
        error!(event_name = "web.leaderboard.load_failed", error = %error, "leaderboard query failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Database Error</h1>".to_owned()))
    })?;
    let changes =
        state.leaderboard.recent_changes(RECENT_CHANGES_LIMIT).await.map_err(|error| {
            error!(event_name = "web.changes.load_failed", error = %error, "change log query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Database Error</h1>".to_owned()))
        })?;

    let mut context = Context::new();
    context.insert("records", &records.iter().map(RecordRow::from).collect::<Vec<_>>());
    context.insert("changes", &changes.iter().map(ChangeRow::from).collect::<Vec<_>>());
    context.insert("changes_limit", &RECENT_CHANGES_LIMIT);

    let html = state.templates.render(LEADERBOARD_TEMPLATE, &context).map_err(|error| {
        error!(event_name = "web.leaderboard.render_failed", error = ?error, "template render failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Template Error</h1>".to_owned()))
    })?;

    Ok(Html(html))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use karmic_core::domain::subject::UserId;
    use karmic_core::ledger::{BuzzkillPolicy, KarmaLedger, KarmaStore};
    use karmic_core::parser::parse_changes;
    use karmic_db::InMemoryKarmaRepository;
    use tower::ServiceExt;

    use super::{init_templates, router};

    async fn render(store: Arc<dyn KarmaStore>) -> (StatusCode, String) {
        let app = router(store, init_templates().expect("templates"));
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
    }

    #[tokio::test]
    async fn empty_store_renders_empty_leaderboard() {
        let (status, body) = render(Arc::new(InMemoryKarmaRepository::new())).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Karmic is up and running."));
        assert!(body.contains("Empty!"));
        assert!(!body.contains("<details>"));
    }

    #[tokio::test]
    async fn records_and_changes_render_escaped() {
        let store: Arc<dyn KarmaStore> = Arc::new(InMemoryKarmaRepository::new());
        let ledger = KarmaLedger::new(Arc::clone(&store), BuzzkillPolicy::default());
        ledger.apply(&parse_changes("<@U2>+++ `a<b`++"), &UserId::new("U1")).await;

        let (status, body) = render(store).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("Empty!"));
        assert!(body.contains("&lt;@U2&gt;"));
        assert!(body.contains("`a&lt;b`"));
        assert!(body.contains("Latest 100 Changes"));
        assert!(body.contains("&lt;@U1&gt;"));
    }
}
