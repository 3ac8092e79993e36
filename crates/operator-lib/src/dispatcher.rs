//! Fan-out of monitoring requests to the probe fleet
//!
//! Targets are resolved fresh on every dispatch. Delivery is not
//! transactional: probes that accepted the request keep it even when every
//! other probe failed.

use crate::discovery::{WorkerDiscovery, PROBE_SELECTOR};
use crate::error::{OperatorError, Result};
use crate::models::{KptMonitorSpec, ResourceKey, WorkerTarget};
use crate::observability::OperatorMetrics;
use crate::status::DispatchOutcome;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for probe dispatch
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Label selector of dispatch targets (default: `app=kpt-probe`)
    pub probe_selector: String,
    /// Port the probes listen on (default: 8081)
    pub probe_port: u16,
    /// Request path on the probe (default: `/api/monitor`)
    pub probe_path: String,
    /// Per-call delivery timeout (default: 10 seconds)
    pub delivery_timeout: Duration,
    /// Maximum deliveries in flight for one request (default: 1, sequential)
    pub max_concurrent_deliveries: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            probe_selector: PROBE_SELECTOR.to_string(),
            probe_port: 8081,
            probe_path: "/api/monitor".to_string(),
            delivery_timeout: Duration::from_secs(10),
            max_concurrent_deliveries: 1,
        }
    }
}

/// Result of delivering a request to one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Probe answered 200
    Delivered,
    /// Probe answered with any other status code
    Rejected(u16),
    /// Transport error, timeout, or no address to deliver to
    Failed(String),
}

impl DeliveryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryResult::Delivered)
    }
}

/// Point-to-point delivery of a serialized request to one probe
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn deliver(&self, target: &WorkerTarget, payload: &[u8]) -> DeliveryResult;
}

/// HTTP delivery addressed directly to the probe pod IP
pub struct HttpProbeClient {
    client: reqwest::Client,
    port: u16,
    path: String,
}

impl HttpProbeClient {
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.delivery_timeout)
            .build()
            .map_err(OperatorError::HttpClient)?;

        Ok(Self {
            client,
            port: config.probe_port,
            path: config.probe_path.clone(),
        })
    }

    fn url(&self, address: &str) -> String {
        if address.contains(':') {
            format!("http://[{}]:{}{}", address, self.port, self.path)
        } else {
            format!("http://{}:{}{}", address, self.port, self.path)
        }
    }
}

#[async_trait]
impl ProbeTransport for HttpProbeClient {
    async fn deliver(&self, target: &WorkerTarget, payload: &[u8]) -> DeliveryResult {
        let Some(address) = target.address.as_deref() else {
            return DeliveryResult::Failed("pod has no IP address".to_string());
        };

        let response = self
            .client
            .post(self.url(address))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await;

        // Response bodies are dropped unread
        match response {
            Ok(resp) if resp.status() == StatusCode::OK => DeliveryResult::Delivered,
            Ok(resp) => DeliveryResult::Rejected(resp.status().as_u16()),
            Err(e) if e.is_timeout() => DeliveryResult::Failed("request timed out".to_string()),
            Err(e) => DeliveryResult::Failed(e.to_string()),
        }
    }
}

/// Resolves probe targets, delivers the request and aggregates the outcome
pub struct Dispatcher {
    discovery: Arc<dyn WorkerDiscovery>,
    transport: Arc<dyn ProbeTransport>,
    probe_selector: String,
    max_concurrent_deliveries: usize,
    metrics: OperatorMetrics,
}

impl Dispatcher {
    pub fn new(
        discovery: Arc<dyn WorkerDiscovery>,
        transport: Arc<dyn ProbeTransport>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            discovery,
            transport,
            probe_selector: config.probe_selector.clone(),
            max_concurrent_deliveries: config.max_concurrent_deliveries.max(1),
            metrics: OperatorMetrics::new(),
        }
    }

    /// Dispatch one monitoring request.
    ///
    /// An empty fleet is an outcome, not an error. Discovery failures are
    /// returned so the caller can abandon the tick.
    pub async fn dispatch(&self, key: &ResourceKey, spec: &KptMonitorSpec) -> Result<DispatchOutcome> {
        let targets = self.discovery.discover(&self.probe_selector).await?;
        self.metrics.set_probes_discovered(targets.len() as i64);

        if targets.is_empty() {
            warn!(resource = %key, selector = %self.probe_selector, "No probes found");
            return Ok(DispatchOutcome::no_targets());
        }

        let payload = serde_json::to_vec(spec)?;
        debug!(
            resource = %key,
            targets = targets.len(),
            payload = %String::from_utf8_lossy(&payload),
            "Delivering monitoring request"
        );

        let payload: Arc<[u8]> = payload.into();
        let total = targets.len();

        // Each delivery owns its inputs so the dispatch future stays Send
        let results: Vec<DeliveryResult> = stream::iter(targets)
            .map(|target| {
                let transport = Arc::clone(&self.transport);
                let metrics = self.metrics.clone();
                let payload = Arc::clone(&payload);
                let key = key.clone();
                async move { deliver_one(transport, metrics, key, target, payload).await }
            })
            .buffer_unordered(self.max_concurrent_deliveries)
            .collect()
            .await;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let outcome = DispatchOutcome::new(succeeded, total);

        info!(
            resource = %key,
            succeeded = outcome.succeeded,
            total = outcome.total,
            "Dispatch complete"
        );

        Ok(outcome)
    }
}

/// Deliver to one probe and record the result
async fn deliver_one(
    transport: Arc<dyn ProbeTransport>,
    metrics: OperatorMetrics,
    key: ResourceKey,
    target: WorkerTarget,
    payload: Arc<[u8]>,
) -> DeliveryResult {
    let start = Instant::now();
    let result = transport.deliver(&target, &payload).await;
    metrics.observe_delivery_latency(start.elapsed().as_secs_f64());

    match &result {
        DeliveryResult::Delivered => {
            metrics.inc_deliveries_succeeded();
            debug!(resource = %key, probe = %target.name, "Delivered to probe");
        }
        DeliveryResult::Rejected(code) => {
            metrics.inc_deliveries_failed();
            warn!(
                resource = %key,
                probe = %target.name,
                address = ?target.address,
                status_code = code,
                "Probe rejected monitoring request"
            );
        }
        DeliveryResult::Failed(reason) => {
            metrics.inc_deliveries_failed();
            warn!(
                resource = %key,
                probe = %target.name,
                address = ?target.address,
                error = %reason,
                "Delivery to probe failed"
            );
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticDiscovery {
        targets: Vec<WorkerTarget>,
    }

    #[async_trait]
    impl WorkerDiscovery for StaticDiscovery {
        async fn discover(&self, _selector: &str) -> Result<Vec<WorkerTarget>> {
            Ok(self.targets.clone())
        }
    }

    /// Transport answering per probe name, recording every payload it sees
    struct ScriptedTransport {
        results: HashMap<String, DeliveryResult>,
        seen: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl ScriptedTransport {
        fn new(results: &[(&str, DeliveryResult)]) -> Self {
            Self {
                results: results
                    .iter()
                    .map(|(name, r)| (name.to_string(), r.clone()))
                    .collect(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProbeTransport for ScriptedTransport {
        async fn deliver(&self, target: &WorkerTarget, payload: &[u8]) -> DeliveryResult {
            self.seen
                .lock()
                .unwrap()
                .push((target.name.clone(), payload.to_vec()));
            self.results
                .get(&target.name)
                .cloned()
                .unwrap_or(DeliveryResult::Failed("unscripted".to_string()))
        }
    }

    fn target(name: &str, address: Option<&str>) -> WorkerTarget {
        WorkerTarget {
            name: name.to_string(),
            namespace: "kpt-system".to_string(),
            address: address.map(str::to_string),
            phase: Some("Running".to_string()),
        }
    }

    fn spec() -> KptMonitorSpec {
        KptMonitorSpec {
            namespace: "ns".to_string(),
            target_pods: "app=x".to_string(),
            tap_duration: "30s".to_string(),
        }
    }

    fn dispatcher(
        targets: Vec<WorkerTarget>,
        transport: Arc<ScriptedTransport>,
        concurrency: usize,
    ) -> Dispatcher {
        let config = DispatchConfig {
            max_concurrent_deliveries: concurrency,
            ..Default::default()
        };
        Dispatcher::new(Arc::new(StaticDiscovery { targets }), transport, &config)
    }

    #[tokio::test]
    async fn test_dispatch_on_spawned_task() {
        let transport = Arc::new(ScriptedTransport::new(&[
            ("probe-a", DeliveryResult::Delivered),
            ("probe-b", DeliveryResult::Delivered),
        ]));
        let d = Arc::new(dispatcher(
            vec![target("probe-a", Some("10.0.0.1")), target("probe-b", Some("10.0.0.2"))],
            transport,
            2,
        ));

        let handle = tokio::spawn(async move {
            d.dispatch(&ResourceKey::new("ns", "foo"), &spec()).await
        });
        let outcome = handle.await.unwrap().unwrap();

        assert_eq!(outcome, DispatchOutcome::new(2, 2));
    }

    #[tokio::test]
    async fn test_partial_success_counts_as_monitoring_outcome() {
        let transport = Arc::new(ScriptedTransport::new(&[
            ("probe-a", DeliveryResult::Delivered),
            ("probe-b", DeliveryResult::Failed("request timed out".to_string())),
        ]));
        let d = dispatcher(
            vec![target("probe-a", Some("10.0.0.1")), target("probe-b", Some("10.0.0.2"))],
            transport.clone(),
            1,
        );

        let outcome = d.dispatch(&ResourceKey::new("ns", "foo"), &spec()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::new(1, 2));
        assert_eq!(transport.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_fleet_is_an_outcome() {
        let transport = Arc::new(ScriptedTransport::new(&[]));
        let d = dispatcher(vec![], transport.clone(), 1);

        let outcome = d.dispatch(&ResourceKey::new("ns", "foo"), &spec()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::no_targets());
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejections_count_as_failures() {
        let transport = Arc::new(ScriptedTransport::new(&[
            ("probe-a", DeliveryResult::Rejected(500)),
            ("probe-b", DeliveryResult::Rejected(201)),
        ]));
        let d = dispatcher(
            vec![target("probe-a", Some("10.0.0.1")), target("probe-b", Some("10.0.0.2"))],
            transport,
            1,
        );

        let outcome = d.dispatch(&ResourceKey::new("ns", "foo"), &spec()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::new(0, 2));
    }

    #[tokio::test]
    async fn test_concurrent_fanout_aggregates_the_same() {
        let transport = Arc::new(ScriptedTransport::new(&[
            ("probe-a", DeliveryResult::Delivered),
            ("probe-b", DeliveryResult::Rejected(503)),
            ("probe-c", DeliveryResult::Delivered),
        ]));
        let d = dispatcher(
            vec![
                target("probe-a", Some("10.0.0.1")),
                target("probe-b", Some("10.0.0.2")),
                target("probe-c", Some("10.0.0.3")),
            ],
            transport,
            4,
        );

        let outcome = d.dispatch(&ResourceKey::new("ns", "foo"), &spec()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::new(2, 3));
    }

    #[tokio::test]
    async fn test_payload_is_compact_spec_json() {
        let transport = Arc::new(ScriptedTransport::new(&[("probe-a", DeliveryResult::Delivered)]));
        let d = dispatcher(vec![target("probe-a", Some("10.0.0.1"))], transport.clone(), 1);

        d.dispatch(&ResourceKey::new("ns", "foo"), &spec()).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(
            String::from_utf8(seen[0].1.clone()).unwrap(),
            r#"{"namespace":"ns","targetPods":"app=x","tapDuration":"30s"}"#
        );
    }

    fn http_client(port: u16, timeout: Duration) -> HttpProbeClient {
        HttpProbeClient::new(&DispatchConfig {
            probe_port: port,
            delivery_timeout: timeout,
            ..Default::default()
        })
        .unwrap()
    }

    fn mock_port(server: &MockServer) -> u16 {
        server.address().port()
    }

    #[tokio::test]
    async fn test_http_delivery_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/monitor"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "namespace": "ns",
                "targetPods": "app=x",
                "tapDuration": "30s"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
            .expect(1)
            .mount(&server)
            .await;

        let client = http_client(mock_port(&server), Duration::from_secs(5));
        let payload = serde_json::to_vec(&spec()).unwrap();

        let result = client
            .deliver(&target("probe-a", Some("127.0.0.1")), &payload)
            .await;

        assert_eq!(result, DeliveryResult::Delivered);
    }

    #[tokio::test]
    async fn test_http_non_200_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/monitor"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let client = http_client(mock_port(&server), Duration::from_secs(5));

        let result = client.deliver(&target("probe-a", Some("127.0.0.1")), b"{}").await;

        assert_eq!(result, DeliveryResult::Rejected(202));
    }

    #[tokio::test]
    async fn test_http_timeout_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/monitor"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = http_client(mock_port(&server), Duration::from_millis(100));

        let result = client.deliver(&target("probe-a", Some("127.0.0.1")), b"{}").await;

        assert!(matches!(result, DeliveryResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_http_missing_address_is_failure() {
        let client = http_client(8081, Duration::from_secs(1));

        let result = client.deliver(&target("probe-a", None), b"{}").await;

        assert!(matches!(result, DeliveryResult::Failed(_)));
    }

    #[test]
    fn test_url_brackets_ipv6() {
        let client = http_client(8081, Duration::from_secs(1));
        assert_eq!(client.url("10.0.0.1"), "http://10.0.0.1:8081/api/monitor");
        assert_eq!(client.url("fd00::1"), "http://[fd00::1]:8081/api/monitor");
    }
}
