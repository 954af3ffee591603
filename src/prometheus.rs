use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::SourceError;
use crate::types::MetricSample;

/// A time-series backend that evaluates one query expression and returns the
/// matching samples. An expression that matches nothing yields an empty vec,
/// which is a normal result and never an error.
pub trait MetricsSource {
    fn run_query(
        &self,
        expression: &str,
    ) -> impl std::future::Future<Output = Result<Vec<MetricSample>, SourceError>> + Send;
}

/// Prometheus instant-query client. The inner reqwest client is shared across
/// queries and cycles; all access is read-only.
#[derive(Debug, Clone)]
pub struct PrometheusSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PrometheusSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

impl MetricsSource for PrometheusSource {
    async fn run_query(&self, expression: &str) -> Result<Vec<MetricSample>, SourceError> {
        let url = format!("{}/api/v1/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("query", expression)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(e, self.timeout))?;

        if status.is_client_error() || status.is_server_error() {
            // Prometheus returns a JSON error body on 4xx; surface its message
            // when present, otherwise the raw status line.
            let message = serde_json::from_str::<QueryResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("backend returned {}", status));
            return Err(SourceError::Query {
                expression: expression.to_string(),
                message,
            });
        }

        parse_vector_response(&body, expression)
    }
}

fn classify_transport_error(e: reqwest::Error, timeout: Duration) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout(timeout)
    } else {
        SourceError::Unavailable(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<VectorResult>,
}

#[derive(Debug, Deserialize)]
struct VectorResult {
    metric: HashMap<String, String>,
    // [unix_seconds, "value"]
    value: (f64, String),
}

/// Parse a Prometheus instant-vector response body into samples. Pure, so it
/// is testable and benchable without a backend.
pub fn parse_vector_response(
    body: &str,
    expression: &str,
) -> Result<Vec<MetricSample>, SourceError> {
    let reject = |message: String| SourceError::Query {
        expression: expression.to_string(),
        message,
    };

    let response: QueryResponse =
        serde_json::from_str(body).map_err(|e| reject(format!("unparseable response: {}", e)))?;

    if response.status != "success" {
        let message = response
            .error
            .unwrap_or_else(|| format!("backend status {:?}", response.status));
        return Err(reject(message));
    }

    let data = match response.data {
        Some(d) => d,
        None => return Ok(Vec::new()),
    };
    if data.result_type != "vector" {
        return Err(reject(format!(
            "expected vector result, got {:?}",
            data.result_type
        )));
    }

    let mut samples = Vec::with_capacity(data.result.len());
    for entry in data.result {
        let (epoch, raw_value) = entry.value;
        let value: f64 = raw_value
            .parse()
            .map_err(|_| reject(format!("non-numeric sample value {:?}", raw_value)))?;
        let timestamp = epoch_to_datetime(epoch);
        samples.push(MetricSample {
            entity_key: entity_key(&entry.metric),
            value,
            timestamp,
        });
    }
    Ok(samples)
}

// Pod-level queries aggregate `by (pod)`; node-level samples carry the
// exporter's `instance` label. Prefer the pod identity when both exist.
fn entity_key(labels: &HashMap<String, String>) -> String {
    labels
        .get("pod")
        .or_else(|| labels.get("instance"))
        .cloned()
        .unwrap_or_default()
}

fn epoch_to_datetime(epoch: f64) -> DateTime<Utc> {
    let seconds = epoch.trunc() as i64;
    let nanos = ((epoch - epoch.trunc()) * 1e9) as u32;
    DateTime::from_timestamp(seconds, nanos).unwrap_or_else(Utc::now)
}
