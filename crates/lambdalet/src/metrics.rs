//! Metrics reporting for the forwarding path.
//!
//! One sample per attempt plus lifecycle counters, pushed fire-and-forget to
//! an external sink. Emission never affects the invocation result: the
//! reporter spawns the sink call and only logs failures.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

/// Worker lifecycle counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created,
    Reused,
    Terminated,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "ProcessCreated",
            Self::Reused => "ProcessReused",
            Self::Terminated => "ProcessTerminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    Seconds,
    Milliseconds,
    Bytes,
    Count,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

fn path_dimension(path: &str) -> Dimension {
    Dimension {
        name: "Path".to_string(),
        value: path.to_string(),
    }
}

/// One counter update, shaped like a PutMetricData datum.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDatum {
    pub metric_name: String,
    pub unit: Unit,
    pub value: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<Dimension>,
}

/// Timing/size fields measured around one forwarding attempt.
///
/// `None` fields were never reached on this attempt and are not emitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricSample {
    pub uptime: Duration,
    pub start_remaining_time_in_millis: Option<u64>,
    pub response_length: Option<u64>,
    pub open_socket: Option<Duration>,
    pub request_complete: Option<Duration>,
    pub response_complete: Option<Duration>,
}

impl MetricSample {
    fn into_data(self, path: &str) -> Vec<MetricDatum> {
        let dimensions = vec![path_dimension(path)];
        let datum = |name: &str, unit: Unit, value: f64| MetricDatum {
            metric_name: name.to_string(),
            unit,
            value,
            dimensions: dimensions.clone(),
        };

        let mut data = vec![datum("Uptime", Unit::Seconds, self.uptime.as_secs_f64())];
        if let Some(remaining) = self.start_remaining_time_in_millis {
            data.push(datum(
                "StartRemainingTimeInMillis",
                Unit::Milliseconds,
                remaining as f64,
            ));
        }
        if let Some(length) = self.response_length {
            data.push(datum("LambdaResponseLength", Unit::Bytes, length as f64));
        }
        for (name, duration) in [
            ("OpenSocketDuration", self.open_socket),
            ("RequestCompleteDuration", self.request_complete),
            ("ResponseCompleteDuration", self.response_complete),
        ] {
            if let Some(duration) = duration {
                data.push(datum(name, Unit::Milliseconds, duration.as_secs_f64() * 1000.0));
            }
        }
        data
    }
}

/// Destination for metric batches.
#[async_trait::async_trait]
pub trait MetricsSink: Send + Sync {
    async fn emit(&self, namespace: &str, data: Vec<MetricDatum>) -> anyhow::Result<()>;
}

/// Fire-and-forget reporter, namespaced per deployed service.
#[derive(Clone)]
pub struct Reporter {
    namespace: Arc<str>,
    sink: Arc<dyn MetricsSink>,
}

impl Reporter {
    pub fn new(namespace: impl Into<String>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            namespace: namespace.into().into(),
            sink,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn counter(&self, path: &str, event: LifecycleEvent) {
        self.dispatch(vec![MetricDatum {
            metric_name: event.as_str().to_string(),
            unit: Unit::Count,
            value: 1.0,
            dimensions: vec![path_dimension(path)],
        }]);
    }

    pub fn sample(&self, path: &str, sample: MetricSample) {
        self.dispatch(sample.into_data(path));
    }

    fn dispatch(&self, data: Vec<MetricDatum>) {
        let sink = Arc::clone(&self.sink);
        let namespace = Arc::clone(&self.namespace);
        tokio::spawn(async move {
            if let Err(e) = sink.emit(&namespace, data).await {
                tracing::warn!(error = %e, "metrics emission failed");
            }
        });
    }
}

/// Sink that logs each batch through `tracing`. Useful where no collector
/// endpoint is available.
pub struct TracingSink;

#[async_trait::async_trait]
impl MetricsSink for TracingSink {
    async fn emit(&self, namespace: &str, data: Vec<MetricDatum>) -> anyhow::Result<()> {
        for datum in &data {
            tracing::debug!(
                namespace,
                metric = %datum.metric_name,
                value = datum.value,
                unit = ?datum.unit,
                "metric"
            );
        }
        Ok(())
    }
}

/// Sink that pushes each batch to an HTTP collector as JSON.
pub struct HttpSink {
    url: String,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        let user_agent = format!("lambdalet/{}", env!("CARGO_PKG_VERSION"));
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&user_agent) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl MetricsSink for HttpSink {
    async fn emit(&self, namespace: &str, data: Vec<MetricDatum>) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "Namespace": namespace,
            "MetricData": data,
        });
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) struct RecordingSink {
    pub emitted: std::sync::Mutex<Vec<(String, Vec<MetricDatum>)>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            emitted: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, data)| data.iter().map(|d| d.metric_name.clone()))
            .collect()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl MetricsSink for RecordingSink {
    async fn emit(&self, namespace: &str, data: Vec<MetricDatum>) -> anyhow::Result<()> {
        self.emitted
            .lock()
            .unwrap()
            .push((namespace.to_string(), data));
        Ok(())
    }
}
