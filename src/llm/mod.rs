pub mod models;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
        }
    }
}

impl Error for LlmError {}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, LlmError>;
}

/// Picks a chart for a query result. Returns the raw model reply; the viz
/// module parses it into a [`models::ChartSpec`] and falls back to a table
/// rendering when it cannot.
#[async_trait]
pub trait ChartDesigner: Send + Sync {
    async fn design_chart(
        &self,
        question: &str,
        columns: &[String],
        sample_rows: &[Vec<Value>],
    ) -> Result<String, LlmError>;
}

pub struct LlmManager {
    generator: Arc<dyn SqlGenerator>,
    designer: Arc<dyn ChartDesigner>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        match config.backend.as_str() {
            "gemini" => {
                let provider = Arc::new(providers::gemini::GeminiProvider::new(config)?);
                Ok(Self {
                    generator: provider.clone(),
                    designer: provider,
                })
            }
            _ => Err(LlmError::ConfigError(format!(
                "Unsupported LLM backend: {}",
                config.backend
            ))),
        }
    }

    /// Wires in explicit providers, used by tests to substitute canned ones.
    pub fn with_providers(
        generator: Arc<dyn SqlGenerator>,
        designer: Arc<dyn ChartDesigner>,
    ) -> Self {
        Self {
            generator,
            designer,
        }
    }

    pub async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, LlmError> {
        self.generator.generate_sql(question, schema).await
    }

    pub async fn design_chart(
        &self,
        question: &str,
        columns: &[String],
        sample_rows: &[Vec<Value>],
    ) -> Result<String, LlmError> {
        self.designer.design_chart(question, columns, sample_rows).await
    }
}

/// Scrubs the model reply down to something executable. The model is told to
/// return bare SQL but tends to wrap it in fences or tag it with a dialect
/// marker, so the known offenders are stripped wholesale. This is a blunt,
/// position-independent edit: a legitimate identifier containing "sql" gets
/// mangled too.
pub fn sanitize_sql(raw: &str) -> String {
    raw.replace("sqlite", "")
        .replace('`', "")
        .replace("sql", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_and_dialect_markers() {
        let raw = "```sqlite\nSELECT * FROM Orders;\n```";
        assert_eq!(sanitize_sql(raw), "SELECT * FROM Orders;");
    }

    #[test]
    fn mangles_identifiers_containing_sql() {
        // Known corruption risk: the strip is not token-aware.
        let raw = "SELECT * FROM sql_products";
        assert_eq!(sanitize_sql(raw), "SELECT * FROM _products");
    }

    #[test]
    fn is_case_sensitive() {
        let raw = "SELECT SQLData FROM Orders";
        assert_eq!(sanitize_sql(raw), "SELECT SQLData FROM Orders");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(sanitize_sql("  SELECT 1  \n"), "SELECT 1");
    }
}
