//! HTTP client for the external classification service.
//!
//! The service accepts a multipart file upload and answers with a JSON-ish
//! body whose schema is untrusted (see the normalizer). The client never
//! fails hard: transport errors, timeouts and non-2xx statuses are all
//! folded into a non-ok [`ClassifierResponse`] so that one bad recording
//! cannot abort a batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;

/// Envelope around one classification attempt.
#[derive(Debug, Clone)]
pub struct ClassifierResponse {
    /// HTTP status code; absent when the request never completed.
    pub status_code: Option<u16>,
    /// True only for a completed 2xx response.
    pub ok: bool,
    /// Response body, or the transport error message when the request
    /// failed. Parsed fail-soft downstream.
    pub body: String,
    pub requested_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// Seam for the classification service, so jobs can be tested with stubs.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, filename: &str, audio: Vec<u8>) -> ClassifierResponse;
}

/// Reqwest-backed classifier client with a caller-set timeout.
#[derive(Clone)]
pub struct HttpClassifier {
    client: Client,
    classify_url: String,
}

impl HttpClassifier {
    /// # Arguments
    /// * `classify_url` - Full URL of the classify endpoint
    /// * `timeout_secs` - Per-request timeout in seconds
    pub fn new(classify_url: String, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            classify_url,
        })
    }

    fn failure(requested_at: DateTime<Utc>, message: String) -> ClassifierResponse {
        ClassifierResponse {
            status_code: None,
            ok: false,
            body: message,
            requested_at,
            received_at: Utc::now(),
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, filename: &str, audio: Vec<u8>) -> ClassifierResponse {
        let requested_at = Utc::now();

        // Common convention: the file field is named "file".
        let part = match Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
        {
            Ok(part) => part,
            Err(e) => return Self::failure(requested_at, e.to_string()),
        };
        let form = Form::new().part("file", part);

        match self.client.post(&self.classify_url).multipart(form).send().await {
            Ok(response) => {
                let status = response.status();
                let body = match response.text().await {
                    Ok(text) => text,
                    Err(e) => {
                        return ClassifierResponse {
                            status_code: Some(status.as_u16()),
                            ok: false,
                            body: e.to_string(),
                            requested_at,
                            received_at: Utc::now(),
                        }
                    }
                };
                ClassifierResponse {
                    status_code: Some(status.as_u16()),
                    ok: status.is_success(),
                    body,
                    requested_at,
                    received_at: Utc::now(),
                }
            }
            Err(e) => Self::failure(requested_at, e.to_string()),
        }
    }
}
