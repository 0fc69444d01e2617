//! Tool capabilities attached to specialist agents
//!
//! The orchestrator never calls a tool. It resolves the bridge once at
//! startup and hands the capability to the completion engine with the agent;
//! the engine launches it through [`crate::bridge::ToolBridge`] and runs the
//! model's tool calls against it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ToolBridgeConfig;
use crate::error::{Result, WayfarerError};
use crate::role::AgentRole;

/// A protocol-mediated capability an agent may invoke
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolCapability {
    /// A tool server spoken to over stdio
    StdioBridge {
        name: String,
        command: String,
        args: Vec<String>,
    },
}

impl ToolCapability {
    pub fn name(&self) -> &str {
        match self {
            ToolCapability::StdioBridge { name, .. } => name,
        }
    }
}

/// Resolves which tool capabilities each role gets
#[derive(Debug, Clone)]
pub struct ToolBindings {
    config: ToolBridgeConfig,
}

impl ToolBindings {
    pub fn new(config: ToolBridgeConfig) -> Self {
        Self { config }
    }

    /// Bindings for a bridge script at `script`, launched with `command`
    pub fn stdio(script: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Self::new(ToolBridgeConfig {
            script: script.into(),
            command: command.into(),
        })
    }

    pub fn script(&self) -> &Path {
        &self.config.script
    }

    /// Fail if the bridge script cannot be located
    pub fn ensure_available(&self) -> Result<PathBuf> {
        let script = &self.config.script;
        if !script.is_file() {
            return Err(WayfarerError::ResourceNotFound(script.clone()));
        }
        Ok(script.canonicalize()?)
    }

    /// Capabilities for `role`; empty for roles without tools
    pub fn for_role(&self, role: AgentRole) -> Result<Vec<ToolCapability>> {
        if !role.requires_tool_bridge() {
            return Ok(Vec::new());
        }
        let script = self.ensure_available()?;
        debug!(role = %role, script = %script.display(), "Attaching travel tool bridge");
        Ok(vec![ToolCapability::StdioBridge {
            name: "TravelMCP".to_string(),
            command: self.config.command.clone(),
            args: vec![script.to_string_lossy().into_owned()],
        }])
    }
}
