//! Environment-sourced configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WayfarerError};

pub const DEFAULT_API_VERSION: &str = "2025-04-01-preview";
pub const DEFAULT_TOOL_BRIDGE_PATH: &str = "travel_mcp_server/server.py";
pub const DEFAULT_TOOL_BRIDGE_COMMAND: &str = "python3";

/// Completion engine endpoint and credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

/// Policy service endpoint. Present only when fully configured.
#[derive(Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub endpoint: String,
    pub agent_id: String,
    pub token: Option<String>,
}

impl std::fmt::Debug for PolicyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyConfig")
            .field("endpoint", &self.endpoint)
            .field("agent_id", &self.agent_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Tool bridge launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolBridgeConfig {
    pub script: PathBuf,
    pub command: String,
}

impl Default for ToolBridgeConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::from(DEFAULT_TOOL_BRIDGE_PATH),
            command: DEFAULT_TOOL_BRIDGE_COMMAND.to_string(),
        }
    }
}

/// Full session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub completion: CompletionConfig,
    pub policy: Option<PolicyConfig>,
    pub tool_bridge: ToolBridgeConfig,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let required = [
            "AZURE_OPENAI_ENDPOINT",
            "AZURE_OPENAI_API_KEY",
            "AZURE_OPENAI_DEPLOYMENT_NAME",
        ];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(WayfarerError::Configuration(format!(
                "set {}",
                missing.join(", ")
            )));
        }

        let completion = CompletionConfig {
            endpoint: get("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
            api_key: get("AZURE_OPENAI_API_KEY").unwrap_or_default(),
            deployment: get("AZURE_OPENAI_DEPLOYMENT_NAME").unwrap_or_default(),
            api_version: get("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        };

        let policy = match (
            get("AZURE_AI_FOUNDRY_PROJECT_ENDPOINT"),
            get("AZURE_AI_AGENT_ID"),
        ) {
            (Some(endpoint), Some(agent_id)) => Some(PolicyConfig {
                endpoint,
                agent_id,
                token: get("AZURE_AI_FOUNDRY_TOKEN"),
            }),
            _ => None,
        };

        let mut tool_bridge = ToolBridgeConfig::default();
        if let Some(path) = get("TRAVEL_MCP_SERVER_PATH") {
            tool_bridge.script = PathBuf::from(path);
        }
        if let Some(command) = get("TRAVEL_MCP_COMMAND") {
            tool_bridge.command = command;
        }

        Ok(Self {
            completion,
            policy,
            tool_bridge,
        })
    }

    pub fn policy_configured(&self) -> bool {
        self.policy.is_some()
    }
}
