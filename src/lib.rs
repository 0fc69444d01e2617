//! # Wayfarer
//!
//! Multi-agent travel planner with conversational handoffs.
//!
//! A coordinator agent talks to the traveler and hands the conversation to
//! specialists (flights, hotels, activities, transfers, reference facts) by
//! emitting a `HANDOFF:<role>` marker. Specialists hand control back the same
//! way. Specialist replies are condensed into trip notes that feed the
//! `summary` command and the optional corporate travel policy check.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           ORCHESTRATOR                            │
//! │  ┌────────────┐  ┌──────────────┐  ┌────────────┐  ┌──────────┐  │
//! │  │  Console   │  │ SessionState │  │ Transcript │  │TripNotes │  │
//! │  └────────────┘  └──────┬───────┘  └────────────┘  └──────────┘  │
//! └─────────────────────────┼────────────────────────────┬───────────┘
//!                           │ HANDOFF:<role>             │ policy
//!        ┌─────────┬────────┼────────┬─────────┐         ▼
//!        ▼         ▼        ▼        ▼         ▼   ┌──────────────┐
//!   ┌────────┐┌────────┐┌────────┐┌────────┐┌────────┐│PolicyBridge │
//!   │ Coord. ││ Flight ││ Hotel  ││Activity││Transfer│└──────────────┘
//!   └────────┘└───┬────┘└───┬────┘└────────┘└────────┘  + Reference
//!                 └────┬────┘
//!                      ▼
//!               travel tool bridge
//! ```
//!
//! ## Key Concepts
//!
//! - **Agent**: A role-bound conversation thread on a [`CompletionEngine`]
//! - **Registry**: One agent per role, created together and released together
//! - **Session**: Active role, pending handoff, transcript and trip notes
//! - **Handoff**: A `HANDOFF:<role>` line in an agent reply

pub mod agent;
pub mod bridge;
pub mod channel;
pub mod command;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod handoff;
pub mod notes;
pub mod orchestrator;
pub mod policy;
pub mod prompt;
pub mod role;
pub mod session;
pub mod tools;
pub mod transcript;

pub use agent::{Agent, AgentHandle, AgentProfile, AgentRegistry};
pub use channel::{EventSink, ExitReason, SessionEvent};
pub use command::SessionCommand;
pub use config::Config;
pub use console::{Console, LineReader};
pub use bridge::{ToolBridge, ToolSpec};
pub use engine::{AzureOpenAiEngine, CompletionEngine, FragmentStream, ThreadId};
pub use error::{Result, WayfarerError};
pub use handoff::{parse_handoff, parse_handoff_with};
pub use notes::{TripNote, TripNotes};
pub use orchestrator::{Orchestrator, SessionReport};
pub use policy::{AgentServiceClient, PolicyBridge, PolicyService};
pub use prompt::build_prompt;
pub use role::AgentRole;
pub use session::{SessionState, Transition};
pub use tools::{ToolBindings, ToolCapability};
pub use transcript::Transcript;
