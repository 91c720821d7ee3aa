use crate::config::EmailConfig;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug)]
pub enum NotifyError {
    ConfigError(String),
    IoError(String),
    ApiError(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::ConfigError(msg) => write!(f, "email configuration error: {}", msg),
            NotifyError::IoError(msg) => write!(f, "email attachment error: {}", msg),
            NotifyError::ApiError(msg) => write!(f, "email API error: {}", msg),
        }
    }
}

impl Error for NotifyError {}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EmailRequest {
    from: String,
    to: String,
    subject: String,
    text_body: String,
    attachments: Vec<Attachment>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Attachment {
    name: String,
    content: String,
    content_type: String,
}

/// Sends the rendered report back to the original sender through the
/// Postmark transactional email API, with the chart attached as an inline
/// PNG.
pub struct EmailNotifier {
    client: reqwest::Client,
    api_url: String,
    token: String,
    from: String,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let token = config.token.clone().ok_or_else(|| {
            NotifyError::ConfigError("POSTMARK_TOKEN not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotifyError::ApiError(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            token,
            from: config.from.clone(),
        })
    }

    pub async fn send_report(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachment_path: &Path,
    ) -> Result<(), NotifyError> {
        let image = tokio::fs::read(attachment_path)
            .await
            .map_err(|e| NotifyError::IoError(e.to_string()))?;

        let request = EmailRequest {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            text_body: body.to_string(),
            attachments: vec![Attachment {
                name: "result.png".to_string(),
                content: BASE64.encode(&image),
                content_type: "image/png".to_string(),
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Accept", "application/json")
            .header("X-Postmark-Server-Token", &self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!("Postmark error response: {} {}", status, error_body);
            return Err(NotifyError::ApiError(format!(
                "Postmark responded with status code: {}",
                status
            )));
        }

        info!("Report emailed to {}", to);
        Ok(())
    }
}
