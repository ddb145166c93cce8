//! Optional external answering capability.
//!
//! The retrieval engine can hand a question to a text-to-SQL answering
//! service. Which capability is present is decided once at startup and
//! modelled as [`AnswerDelegate`], so callers never probe for it at query
//! time.

use crate::config::DelegateConfig;
use crate::error::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Tables the answering service may query
pub const SCHEMA_HINT: &str = "The database contains tables: \
meals(id, name, category, area, instructions, thumbnail, tags) and \
meal_ingredients(meal_id, ingredient, measure, position).";

/// Something that can answer a natural-language question about the meals
#[async_trait::async_trait]
pub trait AnswerService: Send + Sync {
    /// Answer `question`; `context` is the retrieved meal context block
    async fn ask(&self, question: &str, context: &str) -> Result<String>;
}

/// Answering capability chosen at startup
#[derive(Clone, Default)]
pub enum AnswerDelegate {
    Available(Arc<dyn AnswerService>),
    #[default]
    Unavailable,
}

impl AnswerDelegate {
    /// `Available` only when an answering service URL is configured
    pub fn from_config(config: &DelegateConfig) -> Result<Self> {
        match &config.url {
            Some(url) => Ok(AnswerDelegate::Available(Arc::new(HttpAnswerService::new(
                url,
                config.api_key.clone(),
                &config.model,
            )?))),
            None => Ok(AnswerDelegate::Unavailable),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, AnswerDelegate::Available(_))
    }
}

impl std::fmt::Debug for AnswerDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerDelegate::Available(_) => f.write_str("Available"),
            AnswerDelegate::Unavailable => f.write_str("Unavailable"),
        }
    }
}

#[derive(Serialize)]
struct AskRequest<'a> {
    question: String,
    context: &'a str,
    schema_hint: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct AskResponse {
    answer: String,
}

/// Answering service reached over HTTP.
///
/// POSTs `{question, context, schema_hint, model}` as JSON and accepts either
/// `{"answer": "..."}` or a plain-text body in return.
pub struct HttpAnswerService {
    client: Client,
    url: url::Url,
    api_key: Option<String>,
    model: String,
}

impl HttpAnswerService {
    pub fn new(url: &str, api_key: Option<String>, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            url: url::Url::parse(url)?,
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl AnswerService for HttpAnswerService {
    async fn ask(&self, question: &str, context: &str) -> Result<String> {
        let request = AskRequest {
            question: format!(
                "Using meals and meal_ingredients tables, answer: {question}. \
                 If relevant, include meal names."
            ),
            context,
            schema_hint: SCHEMA_HINT,
            model: &self.model,
        };

        debug!("Calling answer service at {}", self.url.path());

        let mut builder = self.client.post(self.url.clone()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Delegate(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Delegate(format!("failed reading response: {e}")))?;

        if !status.is_success() {
            return Err(Error::Delegate(format!("answer service returned {status}")));
        }

        let answer = match serde_json::from_str::<AskResponse>(&body) {
            Ok(parsed) => parsed.answer,
            Err(_) => body,
        };

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::Delegate("empty answer".to_string()));
        }
        Ok(answer.to_string())
    }
}
