use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

pub const SERVER_ERROR_FALLBACK: &str = "Server error";

#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Why a question did not get an answer. The display text is what the user sees.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AskError {
    /// The HTTP exchange did not complete.
    #[error("{0}")]
    Transport(String),

    /// The service answered with a failure status.
    #[error("{0}")]
    Application(String),

    /// The request task died before producing an outcome.
    #[error("{0}")]
    Task(String),
}

impl AskError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Application(_) => "application",
            Self::Task(_) => "task",
        }
    }
}

/// The answering service, as seen by the request lifecycle.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn ask(&self, question: &str) -> Result<AnswerResponse, AskError>;
}

pub struct AskClient {
    client: Client,
    base_url: String,
}

impl AskClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_timeout(config.api_url.clone(), config.timeout())
    }

    pub fn with_timeout(base_url: String, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    // The base URL is an opaque prefix; no normalisation.
    fn endpoint(&self) -> String {
        format!("{}/ask", self.base_url)
    }
}

#[async_trait]
impl AnswerService for AskClient {
    async fn ask(&self, question: &str) -> Result<AnswerResponse, AskError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&AskRequest { question })
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        debug!(%status, "Answering service responded");

        if !status.is_success() {
            let body = response.bytes().await.map_err(transport)?;
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| SERVER_ERROR_FALLBACK.to_string());
            return Err(AskError::Application(message));
        }

        response.json::<AnswerResponse>().await.map_err(transport)
    }
}

/// reqwest's top-level message hides the cause ("error sending request"), so
/// the source chain is appended.
fn transport(err: reqwest::Error) -> AskError {
    let mut description = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !description.contains(&cause_text) {
            description.push_str(": ");
            description.push_str(&cause_text);
        }
        source = cause.source();
    }
    AskError::Transport(description)
}
