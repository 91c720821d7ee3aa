use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use tracing::info;

/// Column names plus the full row set of an executed statement, with values
/// mapped into JSON types so they can be fed to the chart prompt and the
/// renderer without dragging driver types around.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Executes the statement verbatim and fetches every row. The SQL arrives
/// from the LLM, so there is nothing to parameterize.
pub fn run_query(conn: &Connection, sql: &str) -> Result<QueryResult, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();

    let mut rows = Vec::new();
    let mut result_rows = stmt.query([])?;
    while let Some(row) = result_rows.next()? {
        let mut record = Vec::with_capacity(column_count);
        for i in 0..column_count {
            record.push(value_to_json(row.get_ref(i)?));
        }
        rows.push(record);
    }

    info!(
        "Query returned {} rows across {} columns",
        rows.len(),
        column_count
    );

    Ok(QueryResult { columns, rows })
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(BASE64.encode(b)),
    }
}
