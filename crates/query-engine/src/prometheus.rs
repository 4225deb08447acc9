//! Prometheus / Thanos Range-Query Client
//!
//! Issues `GET /api/v1/query_range` and turns the matrix response into
//! [`RawSample`]s. Thanos-specific parameters (`dedup`, `partial_response`,
//! `max_source_resolution`, `engine`) are always sent; plain Prometheus
//! ignores them.

use crate::backend::{MetricsBackend, Resolution};
use crate::error::BackendError;
use alert_model::{RawSample, TimeRange, ALERTNAME_LABEL};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

const QUERY_RANGE_PATH: &str = "api/v1/query_range";

/// Marker Thanos/Prometheus put into the error text when a series would
/// exceed 11,000 points
const RESOLUTION_EXCEEDED_MARKER: &str = "exceeded maximum resolution";

/// Range-query parameters per resolution tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Query step for full-resolution ranges (seconds)
    pub recent_step_secs: u64,
    /// Query step for downsampled ranges (seconds)
    pub downsampled_step_secs: u64,
    /// `max_source_resolution` for downsampled ranges
    pub downsampled_source_resolution: String,
    /// Deduplicate replicas (Thanos)
    pub dedup: bool,
    /// Accept partial responses (Thanos)
    pub partial_response: bool,
    /// PromQL engine (Thanos), omitted when `None`
    pub engine: Option<String>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            recent_step_secs: 60,
            downsampled_step_secs: 3600,
            downsampled_source_resolution: "1h".to_string(),
            dedup: true,
            partial_response: false,
            engine: Some("thanos".to_string()),
        }
    }
}

impl QueryParams {
    /// Step used for a resolution tier (seconds)
    pub fn step_secs(&self, resolution: Resolution) -> u64 {
        match resolution {
            Resolution::Raw => self.recent_step_secs,
            Resolution::Downsampled => self.downsampled_step_secs,
        }
    }

    fn source_resolution(&self, resolution: Resolution) -> &str {
        match resolution {
            Resolution::Raw => "0s",
            Resolution::Downsampled => &self.downsampled_source_resolution,
        }
    }

    /// Query-string pairs for one request
    pub fn to_pairs(
        &self,
        selector: &str,
        range: &TimeRange,
        resolution: Resolution,
    ) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("query", selector.to_string()),
            ("start", range.start().to_string()),
            ("end", range.end().to_string()),
            ("step", self.step_secs(resolution).to_string()),
            ("dedup", self.dedup.to_string()),
            ("partial_response", self.partial_response.to_string()),
            ("max_source_resolution", self.source_resolution(resolution).to_string()),
        ];
        if let Some(engine) = &self.engine {
            pairs.push(("engine", engine.clone()));
        }
        pairs
    }
}

/// Envelope of every Prometheus HTTP API response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<MatrixData>,
    #[serde(rename = "errorType", default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatrixData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<MatrixSeries>,
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// HTTP client for a Prometheus-compatible query API
pub struct PrometheusClient {
    endpoint: String,
    client: Client,
    params: QueryParams,
    timeout: Duration,
}

impl PrometheusClient {
    /// Create a client for `base_url` (e.g. `https://thanos.example.com`)
    pub fn new(base_url: &str, timeout: Duration, params: QueryParams) -> Result<Self, BackendError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("alertmagnet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = query_range_endpoint(base_url);
        info!("Creating range-query client for {}", endpoint);

        Ok(Self {
            endpoint,
            client,
            params,
            timeout,
        })
    }

    /// Full URL requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Parameters applied to every request
    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    fn map_transport_error(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else {
            BackendError::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn query(
        &self,
        selector: &str,
        range: &TimeRange,
        resolution: Resolution,
    ) -> Result<Vec<RawSample>, BackendError> {
        debug!("Querying {} over {} ({:?})", selector, range, resolution);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&self.params.to_pairs(selector, range, resolution))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if status != StatusCode::OK {
            return Err(classify_failure(status.as_u16(), &body));
        }
        decode_matrix(&body)
    }
}

/// Append the range-query path unless the base URL already names it
fn query_range_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("query_range") {
        base.to_string()
    } else if base.ends_with("api/v1") {
        format!("{}/query_range", base)
    } else {
        format!("{}/{}", base, QUERY_RANGE_PATH)
    }
}

fn is_resolution_exceeded(error_type: Option<&str>, message: &str) -> bool {
    error_type == Some("bad_data") && message.contains(RESOLUTION_EXCEEDED_MARKER)
}

/// Map a non-200 response to a backend error
pub(crate) fn classify_failure(status: u16, body: &[u8]) -> BackendError {
    let parsed = serde_json::from_slice::<ApiResponse>(body).ok();
    let error_type = parsed.as_ref().and_then(|r| r.error_type.clone());
    let message = parsed
        .and_then(|r| r.error)
        .unwrap_or_else(|| String::from_utf8_lossy(body).chars().take(512).collect());

    if is_resolution_exceeded(error_type.as_deref(), &message) {
        return BackendError::ResolutionExceeded(message);
    }
    match status {
        500..=599 => BackendError::Server { status, message },
        _ => BackendError::Client { status, message },
    }
}

/// Decode a successful range-query body
pub(crate) fn decode_matrix(body: &[u8]) -> Result<Vec<RawSample>, BackendError> {
    let response: ApiResponse =
        serde_json::from_slice(body).map_err(|e| BackendError::Decode(e.to_string()))?;

    if response.status != "success" {
        let message = response.error.unwrap_or_else(|| "unknown error".to_string());
        return Err(match response.error_type.as_deref() {
            error_type if is_resolution_exceeded(error_type, &message) => {
                BackendError::ResolutionExceeded(message)
            }
            Some("bad_data") => BackendError::Client { status: 400, message },
            _ => BackendError::Server { status: 200, message },
        });
    }

    let data = response
        .data
        .ok_or_else(|| BackendError::Decode("missing data".to_string()))?;
    if data.result_type != "matrix" {
        return Err(BackendError::Decode(format!(
            "expected matrix result, got {}",
            data.result_type
        )));
    }

    let mut samples = Vec::new();
    for series in data.result {
        let alert_id = series
            .metric
            .get(ALERTNAME_LABEL)
            .or_else(|| series.metric.get("__name__"))
            .cloned()
            .unwrap_or_default();

        for (timestamp, value) in &series.values {
            let value = value
                .parse::<f64>()
                .map_err(|e| BackendError::Decode(format!("sample value {:?}: {}", value, e)))?;
            samples.push(RawSample::new(
                alert_id.clone(),
                series.metric.clone(),
                timestamp.round() as i64,
                value,
            ));
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATRIX: &str = r#"{
        "status": "success",
        "data": {
            "resultType": "matrix",
            "result": [
                {
                    "metric": {"__name__": "ALERTS", "alertname": "NodeDown", "alertstate": "firing", "cluster": "eu-1"},
                    "values": [[1700000000, "1"], [1700000060.2, "1"]]
                },
                {
                    "metric": {"__name__": "ALERTS", "alertname": "DiskFull", "alertstate": "pending"},
                    "values": [[1700000000, "1"]]
                }
            ]
        }
    }"#;

    #[test]
    fn test_decode_matrix() {
        let samples = decode_matrix(MATRIX.as_bytes()).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].alert_id, "NodeDown");
        assert_eq!(samples[1].timestamp, 1_700_000_060);
        assert_eq!(samples[0].labels.get("cluster").unwrap(), "eu-1");
        assert!(!samples[2].is_firing());
    }

    #[test]
    fn test_decode_rejects_non_matrix() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        assert!(matches!(decode_matrix(body.as_bytes()), Err(BackendError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_bad_value() {
        let body = r#"{"status":"success","data":{"resultType":"matrix","result":[
            {"metric":{"alertname":"A"},"values":[[1,"one"]]}]}}"#;
        assert!(matches!(decode_matrix(body.as_bytes()), Err(BackendError::Decode(_))));
    }

    #[test]
    fn test_classify_resolution_exceeded() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"exceeded maximum resolution of 11,000 points per timeseries. Try decreasing the query resolution (?step=XX)"}"#;
        assert!(matches!(
            classify_failure(400, body.as_bytes()),
            BackendError::ResolutionExceeded(_)
        ));
    }

    #[test]
    fn test_classify_status_codes() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error at char 3"}"#;
        assert_eq!(
            classify_failure(400, body.as_bytes()),
            BackendError::Client {
                status: 400,
                message: "parse error at char 3".to_string()
            }
        );

        let failure = classify_failure(503, b"upstream unavailable");
        assert_eq!(
            failure,
            BackendError::Server {
                status: 503,
                message: "upstream unavailable".to_string()
            }
        );
        assert!(failure.is_retryable());
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            query_range_endpoint("https://thanos.example.com/"),
            "https://thanos.example.com/api/v1/query_range"
        );
        assert_eq!(
            query_range_endpoint("https://thanos.example.com/api/v1"),
            "https://thanos.example.com/api/v1/query_range"
        );
        assert_eq!(
            query_range_endpoint("http://localhost:9090/api/v1/query_range"),
            "http://localhost:9090/api/v1/query_range"
        );
    }

    #[test]
    fn test_query_pairs_per_tier() {
        let params = QueryParams::default();
        let range = TimeRange::new(100, 200).unwrap();

        let raw = params.to_pairs("ALERTS", &range, Resolution::Raw);
        assert!(raw.contains(&("step", "60".to_string())));
        assert!(raw.contains(&("max_source_resolution", "0s".to_string())));
        assert!(raw.contains(&("engine", "thanos".to_string())));

        let down = params.to_pairs("ALERTS", &range, Resolution::Downsampled);
        assert!(down.contains(&("step", "3600".to_string())));
        assert!(down.contains(&("max_source_resolution", "1h".to_string())));
        assert!(down.contains(&("start", "100".to_string())));
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = PrometheusClient::new(
            "http://localhost:9090",
            Duration::from_secs(5),
            QueryParams::default(),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9090/api/v1/query_range");
    }
}
