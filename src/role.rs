//! Agent roles - the fixed cast of the conversation

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the fixed identities that can hold the conversation.
///
/// The set is closed: roles are known at startup and never created or
/// destroyed while a session runs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Leads the conversation and delegates to specialists
    #[default]
    Coordinator,
    Flight,
    Hotel,
    Activity,
    Transfer,
    Reference,
}

impl AgentRole {
    /// Every role, coordinator first.
    pub const ALL: [AgentRole; 6] = [
        AgentRole::Coordinator,
        AgentRole::Flight,
        AgentRole::Hotel,
        AgentRole::Activity,
        AgentRole::Transfer,
        AgentRole::Reference,
    ];

    /// Lowercase key used in handoff markers and logs
    pub fn key(self) -> &'static str {
        match self {
            AgentRole::Coordinator => "coordinator",
            AgentRole::Flight => "flight",
            AgentRole::Hotel => "hotel",
            AgentRole::Activity => "activity",
            AgentRole::Transfer => "transfer",
            AgentRole::Reference => "reference",
        }
    }

    /// Human-readable label shown in the console and used as transcript speaker
    pub fn display_label(self) -> &'static str {
        match self {
            AgentRole::Coordinator => "Coordinator",
            AgentRole::Flight => "Flight Agent",
            AgentRole::Hotel => "Hotel Agent",
            AgentRole::Activity => "Activity Agent",
            AgentRole::Transfer => "Transfer Agent",
            AgentRole::Reference => "Reference Agent",
        }
    }

    /// Name the completion engine knows the agent by
    pub fn agent_name(self) -> &'static str {
        match self {
            AgentRole::Coordinator => "CoordinatorAgent",
            AgentRole::Flight => "FlightAgent",
            AgentRole::Hotel => "HotelAgent",
            AgentRole::Activity => "ActivityAgent",
            AgentRole::Transfer => "TransferAgent",
            AgentRole::Reference => "ReferenceAgent",
        }
    }

    /// Resolve a case-folded role name. Only exact keys match.
    pub fn from_key(name: &str) -> Option<Self> {
        match name {
            "coordinator" => Some(AgentRole::Coordinator),
            "flight" => Some(AgentRole::Flight),
            "hotel" => Some(AgentRole::Hotel),
            "activity" => Some(AgentRole::Activity),
            "transfer" => Some(AgentRole::Transfer),
            "reference" => Some(AgentRole::Reference),
            _ => None,
        }
    }

    pub fn is_coordinator(self) -> bool {
        matches!(self, AgentRole::Coordinator)
    }

    /// Whether this role is wired to the travel tool bridge
    pub fn requires_tool_bridge(self) -> bool {
        match self {
            AgentRole::Flight | AgentRole::Hotel => true,
            AgentRole::Coordinator
            | AgentRole::Activity
            | AgentRole::Transfer
            | AgentRole::Reference => false,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for role in AgentRole::ALL {
            assert_eq!(AgentRole::from_key(role.key()), Some(role));
        }
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!(AgentRole::from_key("unknown"), None);
        assert_eq!(AgentRole::from_key("Flight"), None);
        assert_eq!(AgentRole::from_key(""), None);
    }

    #[test]
    fn test_tool_bridge_roles() {
        let with_tools: Vec<_> = AgentRole::ALL
            .into_iter()
            .filter(|r| r.requires_tool_bridge())
            .collect();
        assert_eq!(with_tools, vec![AgentRole::Flight, AgentRole::Hotel]);
    }

    #[test]
    fn test_default_is_coordinator() {
        assert!(AgentRole::default().is_coordinator());
        assert_eq!(AgentRole::Flight.display_label(), "Flight Agent");
    }
}
