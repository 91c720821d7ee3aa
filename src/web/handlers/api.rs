use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::db::query::{run_query, QueryResult};
use crate::llm::sanitize_sql;
use crate::viz;
use crate::web::state::AppState;

/// Structured error response: every failure surfaces as `{"error": ...}`
/// with the matching status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Inbound email payload as posted by the mail provider's webhook. The
/// question can arrive under several body fields depending on the provider.
#[derive(Debug, Deserialize)]
pub struct InboundEmail {
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
    #[serde(rename = "TextBody")]
    pub text_body: Option<String>,
    #[serde(rename = "stripped-text")]
    pub stripped_text: Option<String>,
    #[serde(rename = "Body")]
    pub body: Option<String>,
}

impl InboundEmail {
    /// First non-empty of the recognized body fields.
    pub fn question(&self) -> Option<&str> {
        [&self.text_body, &self.stripped_text, &self.body]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .map(str::trim)
            .find(|text| !text.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: String,
    pub sql: String,
    pub rows: usize,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub database: String,
    pub llm_backend: String,
    pub email_enabled: bool,
}

/// The whole reporting pipeline, run sequentially per request: extract the
/// question, generate SQL, execute it, render a chart of the result, and
/// optionally email the image back to the sender.
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InboundEmail>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let question = payload
        .question()
        .ok_or_else(|| ApiError::bad_request("No query found in email."))?
        .to_string();

    info!("Received question from {:?}: {}", payload.from, question);

    // Natural language -> SQL
    let raw_sql = state
        .llm_manager
        .generate_sql(&question, state.schema())
        .await
        .map_err(|e| ApiError::internal(format!("SQL generation failed: {}", e)))?;
    let sql = sanitize_sql(&raw_sql);
    info!("Generated SQL: {}", sql);

    // Execute against the local database
    let pool = state.db_pool.clone();
    let sql_to_execute = sql.clone();
    let result = tokio::task::spawn_blocking(
        move || -> Result<QueryResult, Box<dyn std::error::Error + Send + Sync>> {
            let conn = pool.get()?;
            Ok(run_query(&conn, &sql_to_execute)?)
        },
    )
    .await
    .map_err(|e| ApiError::internal(format!("Database task failed: {}", e)))?
    .map_err(|e| ApiError::internal(format!("SQL execution failed: {}", e)))?;

    // Ask the model to pick a chart, showing it at most the first 10 rows
    let sample: Vec<Vec<Value>> = result.rows.iter().take(10).cloned().collect();
    let spec_text = state
        .llm_manager
        .design_chart(&question, &result.columns, &sample)
        .await
        .map_err(|e| ApiError::internal(format!("Chart design failed: {}", e)))?;

    // Render the chart; parse/draw failures fall back to a table inside viz
    let img_path = state.output_dir.join(format!(
        "img-{}.png",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));
    let columns = result.columns.clone();
    let rows = result.rows.clone();
    let render_path = img_path.clone();
    let chart_kind = tokio::task::spawn_blocking(move || {
        viz::save_visualization(&spec_text, &columns, &rows, &render_path)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Render task failed: {}", e)))?
    .map_err(|e| ApiError::internal(format!("Visualization failed: {}", e)))?;

    let row_count = result.rows.len();
    let body = format!(
        "Your query: {}\n\nSQL: {}\n\nResult: {} rows. See attached {} visualization.",
        question,
        sql,
        row_count,
        chart_kind.label()
    );
    info!("{}", body);

    // Reply email, when enabled
    if let Some(notifier) = &state.notifier {
        if let Some(sender) = payload.from.as_deref() {
            let subject = format!("Re: {}", payload.subject.as_deref().unwrap_or(""));
            notifier
                .send_report(sender, &subject, &body, &img_path)
                .await
                .map_err(|e| ApiError::internal(format!("Email delivery failed: {}", e)))?;
        }
    }

    Ok(Json(WebhookResponse {
        status: "ok".to_string(),
        sql,
        rows: row_count,
    }))
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let uptime = chrono::Utc::now() - state.startup_time;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds(),
        database: state.config.database.path.clone(),
        llm_backend: state.config.llm.backend.clone(),
        email_enabled: state.notifier.is_some(),
    })
}
