use crate::config::LlmConfig;
use crate::llm::{ChartDesigner, LlmError, SqlGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google generative-language API provider. Both prompts go through the same
/// single-turn `generateContent` call; only the prompt text differs.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: String,
}

impl GeminiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError("GEMINI_API_KEY not set".to_string())
        })?;

        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
        })
    }

    fn prepare_sql_prompt(&self, question: &str, schema: &str) -> String {
        format!(
            r#"
You are an expert SQL assistant. Given the following database schema:
{}

Convert the following natural language question into a valid SQLite SQL query. Only return the SQL query, nothing else.

Question: {}

SQL:

Note: Ensure the SQL query is valid for SQLite and does not include any comments or explanations or is marked in markdown format.
"#,
            schema, question
        )
    }

    fn prepare_chart_prompt(
        &self,
        question: &str,
        columns: &[String],
        sample_rows: &[Vec<Value>],
    ) -> String {
        let columns_json = serde_json::to_string(columns).unwrap_or_else(|_| "[]".to_string());
        let rows_json = serde_json::to_string(sample_rows).unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"
You are a data visualization expert. Given the following SQL query result for the question: "{}",
with columns: {}
and sample rows: {}
Choose the most appropriate way to visualize the result and reply with a single JSON object, nothing else, in this exact shape:
{{"chart": "<bar|line|pie|table>", "x": "<column holding labels>", "y": "<column holding numeric values>", "title": "<short chart title>"}}
Use "table" when no chart fits. The "x" and "y" fields must name columns from the list above; omit them for "table".
"#,
            question, columns_json, rows_json
        )
    }

    /// Single-turn call to `generateContent`; the reply text sits at
    /// candidates[0].content.parts[0].text.
    async fn generate(&self, prompt: String) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_url, self.model, self.api_key
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!("Gemini API responded with status {}: {}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Gemini API responded with status code: {}",
                status
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| LlmError::ResponseError("No candidates in response".to_string()))?;

        debug!("Gemini reply: {}", text);
        Ok(text)
    }
}

#[async_trait]
impl SqlGenerator for GeminiProvider {
    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, LlmError> {
        info!("Requesting SQL for question: {}", question);
        let prompt = self.prepare_sql_prompt(question, schema);
        self.generate(prompt).await
    }
}

#[async_trait]
impl ChartDesigner for GeminiProvider {
    async fn design_chart(
        &self,
        question: &str,
        columns: &[String],
        sample_rows: &[Vec<Value>],
    ) -> Result<String, LlmError> {
        info!("Requesting chart spec for question: {}", question);
        let prompt = self.prepare_chart_prompt(question, columns, sample_rows);
        self.generate(prompt).await
    }
}
