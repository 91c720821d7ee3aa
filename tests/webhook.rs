use askmail::config::AppConfig;
use askmail::db::db_pool::SqliteConnectionManager;
use askmail::llm::{ChartDesigner, LlmError, LlmManager, SqlGenerator};
use askmail::web::routes::app_routes;
use askmail::web::state::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use r2d2::Pool;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Returns a fixed SQL statement and counts invocations.
struct CannedSqlGenerator {
    sql: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SqlGenerator for CannedSqlGenerator {
    async fn generate_sql(&self, _question: &str, _schema: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.sql.clone())
    }
}

/// Records what the chart prompt would have seen: how many SQL generations
/// had happened by then, the result columns, and the sample size.
struct CannedChartDesigner {
    reply: String,
    sql_calls: Arc<AtomicUsize>,
    observed: Arc<Mutex<Vec<(usize, Vec<String>, usize)>>>,
}

#[async_trait]
impl ChartDesigner for CannedChartDesigner {
    async fn design_chart(
        &self,
        _question: &str,
        columns: &[String],
        sample_rows: &[Vec<Value>],
    ) -> Result<String, LlmError> {
        self.observed.lock().unwrap().push((
            self.sql_calls.load(Ordering::SeqCst),
            columns.to_vec(),
            sample_rows.len(),
        ));
        Ok(self.reply.clone())
    }
}

struct TestHarness {
    app: Router,
    sql_calls: Arc<AtomicUsize>,
    observed: Arc<Mutex<Vec<(usize, Vec<String>, usize)>>>,
}

fn seed_orders(db_path: &Path, count: usize) {
    let conn = rusqlite::Connection::open(db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE Orders (
            OrderID INTEGER PRIMARY KEY,
            CustomerID TEXT,
            Freight REAL
        );",
    )
    .unwrap();
    for i in 0..count {
        conn.execute(
            "INSERT INTO Orders (CustomerID, Freight) VALUES (?1, ?2)",
            rusqlite::params![format!("CUST{}", i), i as f64],
        )
        .unwrap();
    }
}

fn build_harness(dir: &Path, canned_sql: &str, chart_reply: &str, order_count: usize) -> TestHarness {
    let db_path = dir.join("northwind.db");
    seed_orders(&db_path, order_count);

    let sql_calls = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let generator = Arc::new(CannedSqlGenerator {
        sql: canned_sql.to_string(),
        calls: sql_calls.clone(),
    });
    let designer = Arc::new(CannedChartDesigner {
        reply: chart_reply.to_string(),
        sql_calls: sql_calls.clone(),
        observed: observed.clone(),
    });

    let mut config = AppConfig::default();
    config.database.path = db_path.to_string_lossy().to_string();
    config.output_dir = dir.to_string_lossy().to_string();

    let pool = Pool::builder()
        .max_size(2)
        .build(SqliteConnectionManager::new(config.database.path.clone()))
        .unwrap();
    let llm = LlmManager::with_providers(generator, designer);
    let state = Arc::new(AppState::new(config, pool, llm, None));

    TestHarness {
        app: app_routes().with_state(state),
        sql_calls,
        observed,
    }
}

async fn post_webhook(app: Router, payload: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap();
    (status, body)
}

#[tokio::test]
async fn missing_query_field_returns_400() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(
        dir.path(),
        "SELECT COUNT(*) FROM Orders",
        r#"{"chart": "table"}"#,
        3,
    );

    let (status, body) = post_webhook(
        harness.app,
        json!({"From": "user@example.com", "Subject": "report please"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No query found in email.");
    // Nothing downstream ran
    assert_eq!(harness.sql_calls.load(Ordering::SeqCst), 0);
    assert!(harness.observed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn count_query_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(
        dir.path(),
        "SELECT COUNT(*) FROM Orders",
        r#"{"chart": "table"}"#,
        7,
    );

    let (status, body) = post_webhook(
        harness.app,
        json!({
            "From": "user@example.com",
            "Subject": "orders",
            "TextBody": "How many orders are there?"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sql"], "SELECT COUNT(*) FROM Orders");
    // COUNT(*) yields one row holding the count, not seven rows
    assert_eq!(body["rows"], 1);
    assert_eq!(harness.sql_calls.load(Ordering::SeqCst), 1);

    // SQL generation ran before chart design, and the designer saw the
    // executed result's columns
    let observed = harness.observed.lock().unwrap();
    assert_eq!(observed.len(), 1);
    let (generations_before_design, columns, sample_size) = &observed[0];
    assert_eq!(*generations_before_design, 1);
    assert_eq!(columns, &vec!["COUNT(*)".to_string()]);
    assert_eq!(*sample_size, 1);

    // A chart image landed in the output directory
    let images: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")))
        .collect();
    assert_eq!(images.len(), 1);
}

#[tokio::test]
async fn chart_prompt_sample_is_capped_at_ten_rows() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(
        dir.path(),
        "SELECT OrderID, Freight FROM Orders",
        r#"{"chart": "table"}"#,
        25,
    );

    let (status, body) = post_webhook(
        harness.app,
        json!({"From": "user@example.com", "TextBody": "List all orders"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // The response reports the full result, the prompt only a sample
    assert_eq!(body["rows"], 25);
    let observed = harness.observed.lock().unwrap();
    assert_eq!(observed[0].2, 10);
}

#[tokio::test]
async fn alternate_body_fields_are_recognized() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(
        dir.path(),
        "SELECT COUNT(*) FROM Orders",
        r#"{"chart": "table"}"#,
        2,
    );

    let (status, body) = post_webhook(
        harness.app,
        json!({"From": "user@example.com", "stripped-text": "How many orders?"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 1);
}

#[tokio::test]
async fn invalid_generated_sql_returns_structured_500() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(
        dir.path(),
        "SELECT nothing FROM nowhere",
        r#"{"chart": "table"}"#,
        3,
    );

    let (status, body) = post_webhook(
        harness.app,
        json!({"From": "user@example.com", "TextBody": "gibberish"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("SQL execution failed"));
    // Visualization never ran
    assert!(harness.observed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unusable_chart_reply_still_succeeds_via_table_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(
        dir.path(),
        "SELECT OrderID, Freight FROM Orders",
        "import plotly.express as px",
        4,
    );

    let (status, body) = post_webhook(
        harness.app,
        json!({"From": "user@example.com", "TextBody": "Plot the orders"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 4);
    let images: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")))
        .collect();
    assert_eq!(images.len(), 1);
}

#[tokio::test]
async fn status_endpoint_reports_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(
        dir.path(),
        "SELECT 1",
        r#"{"chart": "table"}"#,
        1,
    );

    let response = harness
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["llm_backend"], "gemini");
    assert_eq!(body["email_enabled"], false);
}
