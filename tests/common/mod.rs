//! Shared fixtures for session tests

#![allow(dead_code)]

mod scripted;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use wayfarer::policy::{PolicyMessage, PolicyRun, RunStatus};
use wayfarer::{
    AgentRegistry, AgentRole, Console, Orchestrator, PolicyBridge, PolicyService, Result,
    ToolBindings,
};

pub use scripted::{ScriptedEngine, ScriptedReply};

pub type TestOrchestrator = Orchestrator<BufReader<&'static [u8]>, Vec<u8>>;

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()
}

/// A bridge script on disk so the flight and hotel agents can be created
pub fn bridge_script() -> (tempfile::NamedTempFile, ToolBindings) {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "# travel tool bridge").unwrap();
    let bindings = ToolBindings::stdio(script.path(), "python3");
    (script, bindings)
}

pub struct Harness {
    pub engine: Arc<ScriptedEngine>,
    _script: tempfile::NamedTempFile,
}

impl Harness {
    pub fn new() -> Self {
        let (script, _) = bridge_script();
        Self {
            engine: Arc::new(ScriptedEngine::new()),
            _script: script,
        }
    }

    pub async fn registry(&self) -> AgentRegistry {
        self.registry_with(&AgentRole::ALL).await
    }

    pub async fn registry_with(&self, roles: &[AgentRole]) -> AgentRegistry {
        let bindings = ToolBindings::stdio(self._script.path(), "python3");
        AgentRegistry::initialize(roles, self.engine.clone(), &bindings, today())
            .await
            .unwrap()
    }

    /// Orchestrator over every role reading `input`
    pub async fn orchestrator(
        &self,
        input: &'static str,
        policy: PolicyBridge,
    ) -> TestOrchestrator {
        let console = Console::new(BufReader::new(input.as_bytes()), Vec::new());
        Orchestrator::new(self.registry().await, policy, console)
    }
}

pub fn output_of(bytes: &[u8]) -> String {
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// In-memory policy service
pub struct StubPolicyService {
    reply: String,
    final_status: RunStatus,
    pending_polls: Mutex<usize>,
    cancel_on_poll: Option<CancellationToken>,
    pub posted: Mutex<Vec<String>>,
    pub runs: Mutex<usize>,
}

impl StubPolicyService {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            final_status: RunStatus::Completed,
            pending_polls: Mutex::new(1),
            cancel_on_poll: None,
            posted: Mutex::new(Vec::new()),
            runs: Mutex::new(0),
        }
    }

    /// Never finishes; cancels `token` the first time it is polled
    pub fn stalled(token: CancellationToken) -> Self {
        Self {
            pending_polls: Mutex::new(usize::MAX),
            cancel_on_poll: Some(token),
            ..Self::replying("")
        }
    }

    pub fn bridge(self: &Arc<Self>) -> PolicyBridge {
        PolicyBridge::new(self.clone(), "asst_policy").with_poll_interval(Duration::from_millis(1))
    }
}

#[async_trait]
impl PolicyService for StubPolicyService {
    async fn create_thread(&self) -> Result<String> {
        Ok("thread_policy".to_string())
    }

    async fn post_message(&self, _thread_id: &str, text: &str) -> Result<()> {
        self.posted.lock().push(text.to_string());
        Ok(())
    }

    async fn create_run(&self, _thread_id: &str, _agent_id: &str) -> Result<PolicyRun> {
        *self.runs.lock() += 1;
        Ok(PolicyRun {
            id: "run_1".to_string(),
            status: RunStatus::Queued,
        })
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<PolicyRun> {
        if let Some(token) = &self.cancel_on_poll {
            token.cancel();
        }
        let mut remaining = self.pending_polls.lock();
        let status = if *remaining > 0 {
            *remaining = remaining.saturating_sub(1);
            RunStatus::InProgress
        } else {
            self.final_status
        };
        Ok(PolicyRun {
            id: run_id.to_string(),
            status,
        })
    }

    async fn list_messages(&self, _thread_id: &str) -> Result<Vec<PolicyMessage>> {
        Ok(vec![
            PolicyMessage::text("user", "check this"),
            PolicyMessage::text("assistant", &self.reply),
        ])
    }
}
