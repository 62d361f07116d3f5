//! HttpCheckpointSink -- [`CheckpointSink`] implementation for the hosted
//! GenSX API.
//!
//! Each snapshot is POSTed as JSON to the execution's checkpoint endpoint.
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building the `Authorization` header.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use gensx_core::checkpoint::CheckpointSink;
use gensx_types::checkpoint::CheckpointSnapshot;
use gensx_types::config::ApiConfig;
use gensx_types::error::SinkError;
use gensx_types::node::ExecutionStatus;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

/// Checkpoint sink that stores snapshots through the hosted API.
pub struct HttpCheckpointSink {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    console_url: String,
    org: String,
    project: String,
    environment: String,
    /// Running executions whose console link has been logged.
    announced: Mutex<HashSet<Uuid>>,
}

impl HttpCheckpointSink {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a sink for `org`/`project` with the default endpoints.
    pub fn new(
        api_key: SecretString,
        org: impl Into<String>,
        project: impl Into<String>,
    ) -> Result<Self, SinkError> {
        let defaults = ApiConfig::default();
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SinkError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: defaults.base_url,
            console_url: defaults.console_url,
            org: org.into(),
            project: project.into(),
            environment: defaults.environment,
            announced: Mutex::new(HashSet::new()),
        })
    }

    /// Build from the `[api]` config section.
    ///
    /// Fails with [`SinkError::NotConfigured`] when the API key, org or
    /// project is missing.
    pub fn from_config(api: &ApiConfig) -> Result<Self, SinkError> {
        let api_key = api
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| SinkError::NotConfigured("api key (GENSX_API_KEY)".to_string()))?;
        let org = api
            .org
            .clone()
            .ok_or_else(|| SinkError::NotConfigured("org (GENSX_ORG)".to_string()))?;
        let project = api
            .project
            .clone()
            .ok_or_else(|| SinkError::NotConfigured("project (GENSX_PROJECT)".to_string()))?;

        Ok(Self::new(SecretString::from(api_key), org, project)?
            .with_base_url(api.base_url.clone())
            .with_console_url(api.console_url.clone())
            .with_environment(api.environment.clone()))
    }

    /// Override the API base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_console_url(mut self, console_url: impl Into<String>) -> Self {
        self.console_url = console_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Endpoint a snapshot of `execution_id` is POSTed to.
    pub fn checkpoint_url(&self, execution_id: &Uuid) -> String {
        format!(
            "{}/org/{}/projects/{}/environments/{}/executions/{}/checkpoint",
            self.base_url, self.org, self.project, self.environment, execution_id
        )
    }

    /// Web console page of an execution.
    pub fn console_link(&self, execution_id: &Uuid) -> String {
        format!(
            "{}/{}/{}/executions/{}?environment={}",
            self.console_url, self.org, self.project, execution_id, self.environment
        )
    }

    /// True for the first accepted snapshot of an execution.
    ///
    /// The id is forgotten once a snapshot with a settled root is accepted,
    /// so the set only holds executions still in flight.
    fn first_accepted(&self, snapshot: &CheckpointSnapshot) -> bool {
        let mut announced = self.announced.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshot.status() == ExecutionStatus::Running {
            announced.insert(snapshot.execution_id)
        } else {
            !announced.remove(&snapshot.execution_id)
        }
    }
}

impl CheckpointSink for HttpCheckpointSink {
    async fn send(&self, snapshot: &CheckpointSnapshot) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.checkpoint_url(&snapshot.execution_id))
            .bearer_auth(self.api_key.expose_secret())
            .json(snapshot)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Http {
                status: status.as_u16(),
                body,
            });
        }

        if self.first_accepted(snapshot) {
            tracing::info!(
                execution_id = %snapshot.execution_id,
                workflow = %snapshot.workflow_name,
                url = %self.console_link(&snapshot.execution_id),
                "checkpoint stored, view the execution in the console"
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for HttpCheckpointSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCheckpointSink")
            .field("base_url", &self.base_url)
            .field("org", &self.org)
            .field("project", &self.project)
            .field("environment", &self.environment)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Json;
    use axum::Router;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use chrono::Utc;
    use gensx_types::node::{ExecutionNode, create_node_id};
    use serde_json::{Value, json};

    use super::*;

    #[derive(Clone, Default)]
    struct Received {
        requests: Arc<Mutex<Vec<(Vec<String>, Option<String>, Value)>>>,
    }

    async fn record(
        State(received): State<Received>,
        Path((org, project, env, id)): Path<(String, String, String, String)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        received
            .requests
            .lock()
            .unwrap()
            .push((vec![org, project, env, id], auth, body));
        StatusCode::OK
    }

    async fn reject() -> (StatusCode, &'static str) {
        (StatusCode::UNAUTHORIZED, "invalid api key")
    }

    /// Serve on an ephemeral port and return the base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn snapshot(sequence: u64) -> CheckpointSnapshot {
        let root_id = create_node_id("Digest", None, 0);
        CheckpointSnapshot {
            execution_id: Uuid::now_v7(),
            workflow_name: "Digest".to_string(),
            sequence,
            created_at: Utc::now(),
            tree: ExecutionNode::new(&root_id, "Digest", None, json!({"topic": "rust"}), 10),
        }
    }

    const ROUTE: &str = "/org/{org}/projects/{project}/environments/{env}/executions/{id}/checkpoint";

    #[tokio::test]
    async fn test_posts_snapshot_with_bearer_key() {
        let received = Received::default();
        let app = Router::new()
            .route(ROUTE, post(record))
            .with_state(received.clone());
        let base_url = serve(app).await;

        let sink = HttpCheckpointSink::new(SecretString::from("sk-test-123"), "acme", "agents")
            .unwrap()
            .with_base_url(format!("{base_url}/"))
            .with_environment("staging");
        let snap = snapshot(3);
        sink.send(&snap).await.unwrap();

        let requests = received.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (path, auth, body) = &requests[0];
        assert_eq!(
            path,
            &vec![
                "acme".to_string(),
                "agents".to_string(),
                "staging".to_string(),
                snap.execution_id.to_string(),
            ]
        );
        assert_eq!(auth.as_deref(), Some("Bearer sk-test-123"));
        assert_eq!(body["sequence"], 3);
        assert_eq!(body["workflowName"], "Digest");
        assert_eq!(body["tree"]["componentName"], "Digest");
        assert_eq!(body["tree"]["props"]["topic"], "rust");
    }

    #[tokio::test]
    async fn test_non_success_status_is_http_error() {
        let app = Router::new().route(ROUTE, post(reject));
        let base_url = serve(app).await;

        let sink = HttpCheckpointSink::new(SecretString::from("wrong"), "acme", "agents")
            .unwrap()
            .with_base_url(base_url);
        let err = sink.send(&snapshot(1)).await.unwrap_err();

        match err {
            SinkError::Http { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = HttpCheckpointSink::new(SecretString::from("key"), "acme", "agents")
            .unwrap()
            .with_base_url(format!("http://{addr}"));
        let err = sink.send(&snapshot(1)).await.unwrap_err();
        assert!(matches!(err, SinkError::Transport(_)));
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let mut api = ApiConfig::default();
        assert!(matches!(
            HttpCheckpointSink::from_config(&api),
            Err(SinkError::NotConfigured(_))
        ));

        api.api_key = Some("key".to_string());
        api.org = Some("acme".to_string());
        assert!(matches!(
            HttpCheckpointSink::from_config(&api),
            Err(SinkError::NotConfigured(msg)) if msg.contains("project")
        ));

        api.project = Some("agents".to_string());
        let sink = HttpCheckpointSink::from_config(&api).unwrap();
        let id = Uuid::nil();
        assert_eq!(
            sink.checkpoint_url(&id),
            format!(
                "https://api.gensx.com/org/acme/projects/agents/environments/default/executions/{id}/checkpoint"
            )
        );
        assert_eq!(
            sink.console_link(&id),
            format!("https://app.gensx.com/acme/agents/executions/{id}?environment=default")
        );
    }

    #[test]
    fn test_debug_hides_api_key() {
        let sink = HttpCheckpointSink::new(SecretString::from("sk-very-secret"), "acme", "agents")
            .unwrap();
        let debug = format!("{sink:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_console_link_logged_once_per_execution() {
        let sink = HttpCheckpointSink::new(SecretString::from("key"), "acme", "agents").unwrap();
        let running = snapshot(1);
        assert!(sink.first_accepted(&running));
        assert!(!sink.first_accepted(&running));
        assert!(sink.first_accepted(&snapshot(1)));
        assert_eq!(sink.announced.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_settled_executions_are_forgotten() {
        let sink = HttpCheckpointSink::new(SecretString::from("key"), "acme", "agents").unwrap();
        let running = snapshot(1);
        let mut settled = running.clone();
        settled.sequence = 2;
        settled.tree.output = Some(json!("done"));
        settled.tree.end_time = Some(20);

        assert!(sink.first_accepted(&running));
        assert!(!sink.first_accepted(&settled));
        assert!(sink.announced.lock().unwrap().is_empty());

        let mut quick = snapshot(1);
        quick.tree.output = Some(json!("done"));
        quick.tree.end_time = Some(11);
        assert!(sink.first_accepted(&quick));
        assert!(sink.announced.lock().unwrap().is_empty());
    }
}
