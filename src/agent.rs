//! Agent registry - one conversational agent and thread per role

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::engine::{CompletionEngine, FragmentStream, ThreadId};
use crate::error::{Result, WayfarerError};
use crate::role::AgentRole;
use crate::tools::{ToolBindings, ToolCapability};

/// Everything the completion engine needs to host one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub role: AgentRole,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolCapability>,
}

impl AgentProfile {
    /// Profile for `role` with the standard travel instructions
    pub fn for_role(role: AgentRole, today: NaiveDate, tools: Vec<ToolCapability>) -> Self {
        Self {
            role,
            name: role.agent_name().to_string(),
            instructions: instructions_for(role, today),
            tools,
        }
    }
}

/// Role-specific instructions
pub fn instructions_for(role: AgentRole, today: NaiveDate) -> String {
    match role {
        AgentRole::Coordinator => "You are the Travel Coordinator Agent and act as the primary \
            interface with customers. Understand requirements, plan trips, and decide when a \
            specialist should respond. When you need help, emit a plain line that contains \
            `HANDOFF:<Agent>` (Flight, Hotel, Activity, Transfer, Reference) with no additional \
            markdown or prose. When you reclaim the conversation, output `HANDOFF:Coordinator`. \
            Always greet warmly, keep the discussion organized, assume flexible budgets unless \
            specified, and remind the user that bookings are not finalized."
            .to_string(),
        AgentRole::Flight => "You are a flight specialist. Search for routes, compare cabin \
            classes, highlight prices, and use the `[FLIGHT] search_flight_offers` tool for live \
            data. Clarify travel dates, airports, passenger counts, and cabin class. Explain \
            trade-offs (duration, stops, airlines) and finish every response with \
            `HANDOFF:Coordinator`."
            .to_string(),
        AgentRole::Hotel => "You handle accommodations. Collect city or neighborhood \
            preferences, budgets, star ratings, and amenities. Use the \
            `[HOTEL] search_hotel_offers` tool to fetch availability and pricing. Summarize the \
            top matches with amenities and check-in/out reminders, then emit \
            `HANDOFF:Coordinator`."
            .to_string(),
        AgentRole::Activity => "Recommend experiences, attractions, dining, and cultural \
            highlights. Consider timing, safety, and traveler profile. No tools are available, \
            so rely on reasoning and prior context. Close with `HANDOFF:Coordinator`."
            .to_string(),
        AgentRole::Transfer => "Plan airport transfers, local ground transportation, and \
            chauffeur options. Explain vehicle classes (standard, business, first, vans) and \
            service levels (private, shared, hourly). Offer clear pickup instructions and pricing \
            assumptions. End with `HANDOFF:Coordinator`."
            .to_string(),
        AgentRole::Reference => format!(
            "Provide travel reference data: airport codes, airline facts, destination stats, \
             time zones, and safety considerations. Today is {}. Always emit dates in \
             YYYY-MM-DD with a four-digit year. Keep answers concise and data-driven, and \
             conclude with `HANDOFF:Coordinator`.",
            today.format("%Y-%m-%d")
        ),
    }
}

/// Lifecycle of an agent's thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Ready,
    Released,
}

/// A single conversational agent bound to its own thread
pub struct Agent {
    /// Role this agent plays
    pub role: AgentRole,
    /// Console and transcript label
    pub label: String,
    /// Profile the thread was opened with
    pub profile: AgentProfile,
    /// Engine-side conversation thread, opened once
    thread: ThreadId,
    status: RwLock<AgentStatus>,
    engine: Arc<dyn CompletionEngine>,
}

impl Agent {
    /// Open a thread for `profile` on `engine`
    pub async fn open(profile: AgentProfile, engine: Arc<dyn CompletionEngine>) -> Result<Self> {
        let thread = engine.open_thread(&profile).await?;

        info!(
            role = %profile.role,
            thread = %thread,
            tools = profile.tools.len(),
            "Created agent"
        );

        Ok(Self {
            role: profile.role,
            label: profile.role.display_label().to_string(),
            profile,
            thread,
            status: RwLock::new(AgentStatus::Ready),
            engine,
        })
    }

    pub fn status(&self) -> AgentStatus {
        *self.status.read()
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Send a prompt on this agent's thread and stream the reply
    pub async fn run_stream(&self, prompt: String) -> Result<FragmentStream> {
        if self.status() == AgentStatus::Released {
            return Err(WayfarerError::dispatch(self.role, "agent already released"));
        }
        debug!(role = %self.role, thread = %self.thread, "Dispatching prompt");
        self.engine.stream_turn(self.thread, prompt).await
    }

    /// Close the thread. Returns false if it was already closed.
    pub async fn release(&self) -> Result<bool> {
        {
            let mut guard = self.status.write();
            if *guard == AgentStatus::Released {
                return Ok(false);
            }
            *guard = AgentStatus::Released;
        }
        self.engine.close_thread(self.thread).await?;
        debug!(role = %self.role, thread = %self.thread, "Released agent");
        Ok(true)
    }
}

/// Handle to an agent for external interaction
#[derive(Clone)]
pub struct AgentHandle {
    inner: Arc<Agent>,
}

impl AgentHandle {
    pub fn new(agent: Agent) -> Self {
        Self {
            inner: Arc::new(agent),
        }
    }

    pub fn role(&self) -> AgentRole {
        self.inner.role
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }
}

impl std::ops::Deref for AgentHandle {
    type Target = Agent;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// All agents of a session, keyed by role
pub struct AgentRegistry {
    agents: BTreeMap<AgentRole, AgentHandle>,
}

impl AgentRegistry {
    /// Create one agent per role.
    ///
    /// On failure every agent opened so far is released before the error is
    /// returned.
    #[instrument(skip(engine, bindings))]
    pub async fn initialize(
        roles: &[AgentRole],
        engine: Arc<dyn CompletionEngine>,
        bindings: &ToolBindings,
        today: NaiveDate,
    ) -> Result<Self> {
        if !roles.contains(&AgentRole::Coordinator) {
            return Err(WayfarerError::Configuration(
                "the coordinator role is required".into(),
            ));
        }

        let mut registry = Self {
            agents: BTreeMap::new(),
        };

        for &role in roles {
            let opened = async {
                let tools = bindings.for_role(role)?;
                let profile = AgentProfile::for_role(role, today, tools);
                Agent::open(profile, Arc::clone(&engine)).await
            }
            .await;

            match opened {
                Ok(agent) => {
                    registry.agents.insert(role, AgentHandle::new(agent));
                }
                Err(e) => {
                    warn!(
                        role = %role,
                        error = %e,
                        "Agent initialization failed; releasing partial registry"
                    );
                    registry.release().await;
                    return Err(e);
                }
            }
        }

        info!(agents = registry.agents.len(), "All agents initialised");
        Ok(registry)
    }

    /// Get the agent for a role
    pub fn get(&self, role: AgentRole) -> Option<&AgentHandle> {
        self.agents.get(&role)
    }

    pub fn contains(&self, role: AgentRole) -> bool {
        self.agents.contains_key(&role)
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        self.agents.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Release every agent. Safe to call more than once; each thread is
    /// closed exactly once and a failing close does not stop the others.
    pub async fn release(&self) -> usize {
        let mut released = 0;
        for agent in self.agents.values() {
            match agent.release().await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => warn!(role = %agent.role(), error = %e, "Failed to release agent"),
            }
        }
        if released > 0 {
            info!(released, "Released agents");
        }
        released
    }
}
