use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::Config;
use crate::error::{AnalysisError, AnalysisErrorKind};
use crate::normalize::RawResult;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls that fit in `timeout`, at least one.
fn polls_within(timeout: Duration, interval: Duration) -> u32 {
    let interval = interval.as_millis().max(1);
    let polls = timeout.as_millis().div_ceil(interval);
    u32::try_from(polls).unwrap_or(u32::MAX).max(1)
}

/// Anything that can turn document bytes into a raw analysis result.
pub trait Analyzer {
    fn analyze(&self, document: &[u8]) -> Result<RawResult, AnalysisError>;
}

/// Where a polled analysis job stands.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Running,
    Succeeded(RawResult),
    Failed(AnalysisError),
}

/// Blocking client for the Document Intelligence REST API.
pub struct AzureClient {
    config: Config,
    http: Client,
    poll_interval: Duration,
    max_polls: u32,
}

impl AzureClient {
    /// `config.timeout` bounds each request and the whole wait for the result.
    pub fn new(config: Config) -> Result<Self, AnalysisError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalysisError::new(AnalysisErrorKind::NetworkFailure, e.to_string()))?;
        let max_polls = polls_within(config.timeout, DEFAULT_POLL_INTERVAL);
        Ok(AzureClient {
            config,
            http,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls,
        })
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Start the job and return its `Operation-Location`.
    fn submit(&self, document: &[u8]) -> Result<String, AnalysisError> {
        let url = self.config.analyze_url();
        tracing::info!(model = %self.config.model, bytes = document.len(), "submitting document for analysis");

        let response = self
            .http
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &self.config.key)
            .header("Content-Type", "application/octet-stream")
            .body(document.to_vec())
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_rejection(status.as_u16(), &body));
        }

        response
            .headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                AnalysisError::new(
                    AnalysisErrorKind::NetworkFailure,
                    "No Operation-Location in response",
                )
            })
    }

    fn poll(&self, operation_url: &str) -> Result<RawResult, AnalysisError> {
        for attempt in 1..=self.max_polls {
            std::thread::sleep(self.poll_interval);
            let response = self
                .http
                .get(operation_url)
                .header("Ocp-Apim-Subscription-Key", &self.config.key)
                .send()
                .map_err(transport_error)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(classify_rejection(status.as_u16(), &body));
            }

            let body: Value = response.json().map_err(|e| {
                AnalysisError::new(
                    AnalysisErrorKind::NetworkFailure,
                    format!("Invalid JSON: {e}"),
                )
            })?;
            match parse_poll(&body) {
                PollState::Running => tracing::debug!(attempt, "analysis still running"),
                PollState::Succeeded(raw) => return Ok(raw),
                PollState::Failed(err) => return Err(err),
            }
        }
        Err(AnalysisError::new(
            AnalysisErrorKind::Timeout,
            AnalysisErrorKind::Timeout.hint(),
        ))
    }
}

impl Analyzer for AzureClient {
    fn analyze(&self, document: &[u8]) -> Result<RawResult, AnalysisError> {
        let started = Instant::now();
        let operation_url = self.submit(document)?;
        let raw = self.poll(&operation_url)?;
        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "analysis succeeded");
        Ok(raw)
    }
}

/// Submit `document_bytes` once and wait for the result.
pub fn analyze(document_bytes: &[u8], config: &Config) -> Result<RawResult, AnalysisError> {
    AzureClient::new(config.clone())?.analyze(document_bytes)
}

fn transport_error(e: reqwest::Error) -> AnalysisError {
    let kind = if e.is_timeout() {
        AnalysisErrorKind::Timeout
    } else {
        AnalysisErrorKind::NetworkFailure
    };
    tracing::warn!(error = %e, %kind, "request to analysis service failed");
    AnalysisError::new(kind, format!("{}: {e}", kind.hint()))
}

/// `(code, message)` from the service error body, innermost code first.
fn service_error(error: Option<&Value>) -> (Vec<String>, Option<String>) {
    let mut codes = Vec::new();
    let mut message = None;
    let mut current = error;
    while let Some(e) = current {
        if let Some(code) = e.get("code").and_then(|c| c.as_str()) {
            codes.insert(0, code.to_string());
        }
        if message.is_none() {
            message = e
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string);
        }
        current = e.get("innererror");
    }
    (codes, message)
}

/// Map a service error code to a kind, if it names one.
pub fn kind_from_code(code: &str) -> Option<AnalysisErrorKind> {
    let c = code.to_ascii_lowercase();
    if c.contains("quota") || c.contains("toomanyrequests") || c.contains("ratelimit") {
        Some(AnalysisErrorKind::QuotaExceeded)
    } else if c.contains("unauthorized")
        || c.contains("permission")
        || c.contains("authentication")
        || c.contains("subscriptionkey")
        || c.contains("forbidden")
    {
        Some(AnalysisErrorKind::Unauthorized)
    } else if c.contains("content")
        || c.contains("format")
        || c.contains("mediatype")
        || c.contains("image")
        || c.contains("pdf")
        || c.contains("password")
    {
        Some(AnalysisErrorKind::UnsupportedFormat)
    } else if c.contains("timeout") {
        Some(AnalysisErrorKind::Timeout)
    } else {
        None
    }
}

/// Turn a non-success HTTP response into an error of the right kind.
pub fn classify_rejection(status: u16, body: &str) -> AnalysisError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let (codes, message) = service_error(parsed.as_ref().and_then(|v| v.get("error")));
    let from_code = codes.iter().find_map(|c| kind_from_code(c));

    let kind = match status {
        401 => AnalysisErrorKind::Unauthorized,
        403 => match from_code {
            Some(AnalysisErrorKind::QuotaExceeded) => AnalysisErrorKind::QuotaExceeded,
            _ => AnalysisErrorKind::Unauthorized,
        },
        429 => AnalysisErrorKind::QuotaExceeded,
        408 | 504 => AnalysisErrorKind::Timeout,
        413 | 415 => AnalysisErrorKind::UnsupportedFormat,
        _ => from_code.unwrap_or(AnalysisErrorKind::NetworkFailure),
    };

    let detail = message
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| kind.hint().to_string());
    AnalysisError::new(kind, format!("HTTP {status}: {detail}"))
}

/// Read one poll response body.
pub fn parse_poll(body: &Value) -> PollState {
    let status = body.get("status").and_then(|s| s.as_str()).unwrap_or("");
    match status {
        "succeeded" => match body.get("analyzeResult") {
            Some(result) if result.is_object() => PollState::Succeeded(RawResult::new(result.clone())),
            _ => PollState::Failed(AnalysisError::new(
                AnalysisErrorKind::NetworkFailure,
                "No analyzeResult in response",
            )),
        },
        "failed" | "canceled" => {
            let (codes, message) = service_error(body.get("error"));
            // An accepted job that fails almost always means the document itself was rejected.
            let kind = codes
                .iter()
                .find_map(|c| kind_from_code(c))
                .unwrap_or(AnalysisErrorKind::UnsupportedFormat);
            PollState::Failed(AnalysisError::new(
                kind,
                message.unwrap_or_else(|| format!("Analysis {status}")),
            ))
        }
        _ => PollState::Running,
    }
}
