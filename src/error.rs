//! Wayfarer error types

use std::path::PathBuf;

use thiserror::Error;

use crate::role::AgentRole;

/// Errors that can occur while setting up or running a session
#[derive(Debug, Error)]
pub enum WayfarerError {
    /// Required endpoint or credential missing
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A tool bridge script or other required resource is missing
    #[error("Resource not found: {}", .0.display())]
    ResourceNotFound(PathBuf),

    /// The active agent's completion call failed mid-turn
    #[error("{role} agent failed: {message}")]
    Dispatch { role: AgentRole, message: String },

    /// The tool server behind a specialist failed to start or answer
    #[error("Tool bridge {name}: {message}")]
    ToolBridge { name: String, message: String },

    /// The policy service failed; always recovered into text by the bridge
    #[error("Policy check failed: {0}")]
    PolicyCheck(String),

    /// Console I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON from a remote service
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session was cancelled by an interrupt
    #[error("Session interrupted")]
    Interrupted,
}

impl WayfarerError {
    pub fn dispatch(role: AgentRole, message: impl Into<String>) -> Self {
        Self::Dispatch {
            role,
            message: message.into(),
        }
    }

    /// Startup errors abort the process before the loop starts
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::ResourceNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, WayfarerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_message() {
        let err = WayfarerError::dispatch(AgentRole::Hotel, "quota exceeded");
        assert_eq!(err.to_string(), "hotel agent failed: quota exceeded");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_startup_errors_are_fatal() {
        assert!(WayfarerError::Configuration("missing".into()).is_fatal());
        assert!(WayfarerError::ResourceNotFound(PathBuf::from("server.py")).is_fatal());
        assert!(!WayfarerError::Interrupted.is_fatal());
    }
}
