//! Ultrahuman partner API client
//!
//! One GET per refresh cycle against the daily metrics endpoint. Responses are
//! returned as raw JSON for the extractor; HTTP failures are classified into
//! [`FetchError`] variants so the coordinator can decide how loudly to report
//! them.

use crate::config::{ClientConfig, VALIDATION_TIMEOUT_SECS};
use crate::error::FetchError;
use crate::extractor::DATE_FORMAT;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// What to ask the API for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateQuery {
    /// A calendar day (`date=YYYY-MM-DD`)
    Date(NaiveDate),
    /// A time window in unix seconds (`start_epoch` / `end_epoch`)
    EpochRange { start: i64, end: i64 },
}

impl DateQuery {
    /// Today in the local timezone
    pub fn today() -> Self {
        DateQuery::Date(Local::now().date_naive())
    }

    /// Day whose metrics should be extracted from the response. For an epoch
    /// window this is the UTC day the window starts in.
    pub fn target_date(&self) -> Option<NaiveDate> {
        match self {
            DateQuery::Date(date) => Some(*date),
            DateQuery::EpochRange { start, .. } => {
                DateTime::from_timestamp(*start, 0).map(|dt| dt.date_naive())
            }
        }
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        match self {
            DateQuery::Date(date) => vec![("date", date.format(DATE_FORMAT).to_string())],
            DateQuery::EpochRange { start, end } => vec![
                ("start_epoch", start.to_string()),
                ("end_epoch", end.to_string()),
            ],
        }
    }
}

/// Source of raw daily payloads.
///
/// `Ok(None)` means the API has no data for the query.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self, query: &DateQuery) -> Result<Option<Value>, FetchError>;
}

/// Interpretation of a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Data,
    NoData,
}

/// Map an HTTP status onto the fetch error taxonomy
pub fn classify_status(status: StatusCode) -> Result<StatusOutcome, FetchError> {
    match status {
        s if s.is_success() => Ok(StatusOutcome::Data),
        StatusCode::NOT_FOUND => Ok(StatusOutcome::NoData),
        StatusCode::UNAUTHORIZED => Err(FetchError::Auth),
        StatusCode::FORBIDDEN => Err(FetchError::Permission),
        s if s.is_server_error() => Err(FetchError::Server(s.as_u16())),
        s => Err(FetchError::UnexpectedStatus(s.as_u16())),
    }
}

/// HTTP client for the daily metrics endpoint
pub struct UltrahumanClient {
    config: ClientConfig,
    http_client: Client,
}

impl UltrahumanClient {
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn get(
        &self,
        query: &DateQuery,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, FetchError> {
        let mut request = self
            .http_client
            .get(&self.config.endpoint)
            .header("Authorization", &self.config.api_token)
            .query(&query.query_params());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();

        match classify_status(status)? {
            StatusOutcome::NoData => {
                warn!(?query, "No data available for query");
                Ok(None)
            }
            StatusOutcome::Data => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| FetchError::Malformed(e.to_string()))?;

                match &body {
                    Value::Object(map) => {
                        let keys: Vec<&String> = map.keys().collect();
                        debug!(?keys, "Received data from Ultrahuman API");
                    }
                    other => debug!(kind = json_kind(other), "Received non-object payload"),
                }
                Ok(Some(body))
            }
        }
    }

    /// Check the token with a short request for today's data
    pub async fn validate_token(&self) -> Result<(), FetchError> {
        let timeout = Duration::from_secs(VALIDATION_TIMEOUT_SECS);
        match self.get(&DateQuery::today(), Some(timeout)).await? {
            Some(_) => Ok(()),
            None => Err(FetchError::UnexpectedStatus(StatusCode::NOT_FOUND.as_u16())),
        }
    }
}

#[async_trait]
impl MetricsSource for UltrahumanClient {
    async fn fetch(&self, query: &DateQuery) -> Result<Option<Value>, FetchError> {
        self.get(query, None).await
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
