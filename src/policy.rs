//! Policy check bridge
//!
//! Submits a trip summary to a persistent policy agent hosted by an external
//! agent service, polls the run until it settles, and reads back the reply.
//! Every failure is folded into a descriptive string; a policy check never
//! ends the session.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PolicyConfig;
use crate::error::{Result, WayfarerError};

pub const NOT_CONFIGURED: &str = "Travel policy agent not configured.";
pub const EMPTY_RESPONSE: &str = "Policy agent completed with an empty response.";
pub const CANCELLED: &str = "Policy check cancelled.";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const API_VERSION: &str = "v1";

/// Status of a policy agent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Still waiting on the service
    pub fn is_pending(self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRun {
    pub id: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextValue {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl PolicyMessage {
    pub fn text(role: &str, value: &str) -> Self {
        Self {
            role: role.to_string(),
            content: vec![MessageContent {
                kind: "text".to_string(),
                text: Some(TextValue {
                    value: value.to_string(),
                }),
            }],
        }
    }
}

/// Operations the policy service exposes
#[async_trait]
pub trait PolicyService: Send + Sync {
    async fn create_thread(&self) -> Result<String>;
    async fn post_message(&self, thread_id: &str, text: &str) -> Result<()>;
    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<PolicyRun>;
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<PolicyRun>;
    /// Messages on the thread, oldest first
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<PolicyMessage>>;
}

/// Text of the most recent assistant or tool message.
///
/// Only that message is considered; older replies never stand in for it.
pub fn extract_reply(messages: &[PolicyMessage]) -> Option<String> {
    let latest = messages
        .iter()
        .rev()
        .find(|m| m.role == "assistant" || m.role == "tool")?;
    latest
        .content
        .iter()
        .filter_map(|c| c.text.as_ref())
        .map(|t| t.value.clone())
        .find(|v| !v.is_empty())
}

// ──────────────────────────────────────────────────────────────────────────────
// HTTP client
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<PolicyMessage>,
}

/// REST client for a hosted agent service
pub struct AgentServiceClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl AgentServiceClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, self.url(path))
            .query(&[("api-version", API_VERSION)]);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WayfarerError::PolicyCheck(format!(
                "status={} body={}",
                status.as_u16(),
                body
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PolicyService for AgentServiceClient {
    async fn create_thread(&self) -> Result<String> {
        let request = self
            .request(reqwest::Method::POST, "threads")
            .json(&serde_json::json!({}));
        let thread: IdOnly = self.send(request).await?;
        Ok(thread.id)
    }

    async fn post_message(&self, thread_id: &str, text: &str) -> Result<()> {
        let request = self
            .request(reqwest::Method::POST, &format!("threads/{}/messages", thread_id))
            .json(&serde_json::json!({ "role": "user", "content": text }));
        let _: IdOnly = self.send(request).await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<PolicyRun> {
        let request = self
            .request(reqwest::Method::POST, &format!("threads/{}/runs", thread_id))
            .json(&serde_json::json!({ "assistant_id": agent_id }));
        self.send(request).await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<PolicyRun> {
        let request = self.request(
            reqwest::Method::GET,
            &format!("threads/{}/runs/{}", thread_id, run_id),
        );
        self.send(request).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<PolicyMessage>> {
        let request = self
            .request(reqwest::Method::GET, &format!("threads/{}/messages", thread_id))
            .query(&[("order", "asc")]);
        let list: MessageList = self.send(request).await?;
        Ok(list.data)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Bridge
// ──────────────────────────────────────────────────────────────────────────────

/// Call-and-poll wrapper around a [`PolicyService`]
#[derive(Clone)]
pub struct PolicyBridge {
    service: Option<Arc<dyn PolicyService>>,
    agent_id: String,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl PolicyBridge {
    pub fn new(service: Arc<dyn PolicyService>, agent_id: impl Into<String>) -> Self {
        Self {
            service: Some(service),
            agent_id: agent_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    /// Bridge with no service behind it
    pub fn disabled() -> Self {
        Self {
            service: None,
            agent_id: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    pub fn from_config(config: Option<&PolicyConfig>) -> Self {
        match config {
            Some(policy) => Self::new(
                Arc::new(AgentServiceClient::new(
                    policy.endpoint.clone(),
                    policy.token.clone(),
                )),
                policy.agent_id.clone(),
            ),
            None => Self::disabled(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Give up waiting on a run after `timeout`. Off by default.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_some()
    }

    /// Check `summary` against the travel policy
    #[instrument(skip(self, summary, cancel))]
    pub async fn check(&self, summary: &str, cancel: &CancellationToken) -> String {
        let Some(service) = self.service.as_ref() else {
            return NOT_CONFIGURED.to_string();
        };

        match self.run_check(service.as_ref(), summary, cancel).await {
            Ok(reply) => reply,
            Err(WayfarerError::Interrupted) => CANCELLED.to_string(),
            Err(e) => {
                warn!(error = %e, "Policy check failed");
                format!("Policy agent request failed: {}", e)
            }
        }
    }

    async fn run_check(
        &self,
        service: &dyn PolicyService,
        summary: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let thread_id = service.create_thread().await?;
        let content = format!(
            "Check if this itinerary complies with our corporate travel policy.\n\n\
             Conversation Summary:\n{}",
            summary
        );
        service.post_message(&thread_id, &content).await?;

        let mut run = service.create_run(&thread_id, &self.agent_id).await?;
        info!(thread = %thread_id, run = %run.id, "Policy run created");

        let started = Instant::now();
        while run.status.is_pending() {
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    return Err(WayfarerError::PolicyCheck(format!(
                        "run {} still {} after {:?}",
                        run.id, run.status, limit
                    )));
                }
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WayfarerError::Interrupted),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            run = service.get_run(&thread_id, &run.id).await?;
            debug!(run = %run.id, status = %run.status, "Polled policy run");
        }

        if run.status != RunStatus::Completed {
            return Ok(format!("Policy agent run failed: {}", run.status));
        }

        let messages = service.list_messages(&thread_id).await?;
        Ok(extract_reply(&messages).unwrap_or_else(|| EMPTY_RESPONSE.to_string()))
    }
}
