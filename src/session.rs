//! Session state for a handoff conversation

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handoff::parse_handoff_with;
use crate::notes::TripNotes;
use crate::role::AgentRole;
use crate::transcript::Transcript;

/// Prompt used when an auto-dispatch has nothing else to carry over
pub const CONTINUE_PROMPT: &str = "Continue assisting based on the latest user request.";

/// Transcript turns used for the policy summary when no notes exist
pub const POLICY_CONTEXT_TURNS: usize = 8;

/// Default cap on back-to-back specialist handoffs
pub const DEFAULT_MAX_AUTO_HANDOFFS: usize = 8;

/// Speaker label for user turns
pub const USER_SPEAKER: &str = "User";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handoff waiting to be served before the user is prompted again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHandoff {
    pub role: AgentRole,
    pub prompt: Option<String>,
}

/// How control moves after an agent's reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// A specialist answers next without waiting for the user
    Handoff { from: AgentRole, to: AgentRole },
    /// Control is back with the coordinator; `explicit` is false when the
    /// specialist ended without a usable marker
    Returned { from: AgentRole, explicit: bool },
    /// The handoff chain hit its cap; control returned to the coordinator
    ChainLimit { from: AgentRole, to: AgentRole },
    /// The coordinator keeps the conversation
    Stay,
}

/// Mutable state of one session, owned by the orchestration loop
#[derive(Debug)]
pub struct SessionState {
    /// Session ID
    pub id: SessionId,
    active: AgentRole,
    pending: Option<PendingHandoff>,
    last_user_message: Option<String>,
    transcript: Transcript,
    notes: TripNotes,
    policy_configured: bool,
    auto_chain: usize,
    max_auto_handoffs: usize,
    available: BTreeSet<AgentRole>,
}

impl SessionState {
    pub fn new(policy_configured: bool) -> Self {
        let id = SessionId::new();
        info!(session_id = %id, "Creating new session");

        Self {
            id,
            active: AgentRole::Coordinator,
            pending: None,
            last_user_message: None,
            transcript: Transcript::new(),
            notes: TripNotes::new(),
            policy_configured,
            auto_chain: 0,
            max_auto_handoffs: DEFAULT_MAX_AUTO_HANDOFFS,
            available: AgentRole::ALL.into_iter().collect(),
        }
    }

    /// Restrict handoff targets to roles that have an agent
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = AgentRole>) -> Self {
        self.available = roles.into_iter().collect();
        self.available.insert(AgentRole::Coordinator);
        self
    }

    /// Cap back-to-back specialist handoffs (minimum 1)
    pub fn with_max_auto_handoffs(mut self, max: usize) -> Self {
        self.max_auto_handoffs = max.max(1);
        self
    }

    pub fn active(&self) -> AgentRole {
        self.active
    }

    pub fn pending(&self) -> Option<&PendingHandoff> {
        self.pending.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.last_user_message.as_deref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn notes(&self) -> &TripNotes {
        &self.notes
    }

    pub fn policy_configured(&self) -> bool {
        self.policy_configured
    }

    /// Record a line the user typed for the active agent
    pub fn record_user_message(&mut self, text: &str) {
        self.last_user_message = Some(text.to_string());
        self.transcript.append(USER_SPEAKER, text);
        self.auto_chain = 0;
    }

    /// Take the queued handoff, making its role active.
    ///
    /// The prompt falls back to the last user message, then to
    /// [`CONTINUE_PROMPT`].
    pub fn take_pending(&mut self) -> Option<(AgentRole, String)> {
        let pending = self.pending.take()?;
        self.active = pending.role;
        let prompt = pending
            .prompt
            .filter(|p| !p.trim().is_empty())
            .or_else(|| self.last_user_message.clone())
            .unwrap_or_else(|| CONTINUE_PROMPT.to_string());
        Some((pending.role, prompt))
    }

    /// Fold a complete reply from `role` into the session and decide who
    /// speaks next.
    pub fn record_response(&mut self, role: AgentRole, text: &str) -> Transition {
        self.transcript.append(role.display_label(), text);
        if let Some(note) = self.notes.capture(role, text) {
            debug!(session_id = %self.id, note = %note, "Captured trip note");
        }

        let available = &self.available;
        let target = parse_handoff_with(text, |target| available.contains(&target));

        match target {
            Some(AgentRole::Coordinator) => {
                self.return_to_coordinator();
                if role.is_coordinator() {
                    Transition::Stay
                } else {
                    Transition::Returned {
                        from: role,
                        explicit: true,
                    }
                }
            }
            Some(target) if target != role => {
                if self.auto_chain >= self.max_auto_handoffs {
                    warn!(
                        session_id = %self.id,
                        from = %role,
                        to = %target,
                        limit = self.max_auto_handoffs,
                        "Handoff chain limit reached; returning to coordinator"
                    );
                    self.return_to_coordinator();
                    return Transition::ChainLimit { from: role, to: target };
                }
                let prompt = if text.trim().is_empty() {
                    self.last_user_message.clone()
                } else {
                    Some(text.to_string())
                };
                self.active = target;
                self.pending = Some(PendingHandoff {
                    role: target,
                    prompt,
                });
                self.auto_chain += 1;
                info!(session_id = %self.id, from = %role, to = %target, "Handoff queued");
                Transition::Handoff { from: role, to: target }
            }
            // No marker, or a specialist naming itself
            _ => {
                if role.is_coordinator() {
                    Transition::Stay
                } else {
                    debug!(
                        session_id = %self.id,
                        from = %role,
                        "No handoff marker; reverting to coordinator"
                    );
                    self.return_to_coordinator();
                    Transition::Returned {
                        from: role,
                        explicit: false,
                    }
                }
            }
        }
    }

    fn return_to_coordinator(&mut self) {
        self.active = AgentRole::Coordinator;
        self.pending = None;
        self.auto_chain = 0;
    }

    /// Text handed to the policy check: trip notes, else recent transcript
    pub fn policy_summary(&self) -> Option<String> {
        self.notes.summary().or_else(|| {
            let context = self.transcript.render(POLICY_CONTEXT_TURNS);
            (!context.is_empty()).then_some(context)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionState {
        SessionState::new(false)
    }

    #[test]
    fn test_session_creation() {
        let state = session();
        assert_eq!(state.active(), AgentRole::Coordinator);
        assert!(!state.has_pending());
        assert!(state.transcript().is_empty());
        assert!(!state.policy_configured());
    }

    #[test]
    fn test_coordinator_hands_off() {
        let mut state = session();
        state.record_user_message("I want to fly SEA to LHR on 2025-12-01");

        let transition = state.record_response(AgentRole::Coordinator, "Sure!\nHANDOFF:Flight");
        assert_eq!(
            transition,
            Transition::Handoff {
                from: AgentRole::Coordinator,
                to: AgentRole::Flight
            }
        );
        assert_eq!(state.active(), AgentRole::Flight);

        let (role, prompt) = state.take_pending().unwrap();
        assert_eq!(role, AgentRole::Flight);
        assert_eq!(prompt, "Sure!\nHANDOFF:Flight");
        assert!(!state.has_pending());
        assert!(state.notes().is_empty());
    }

    #[test]
    fn test_specialist_returns_explicitly() {
        let mut state = session();
        state.record_response(AgentRole::Coordinator, "HANDOFF:Flight");
        state.take_pending();

        let transition =
            state.record_response(AgentRole::Flight, "SEA → LHR | 820 USD\nHANDOFF:Coordinator");
        assert_eq!(
            transition,
            Transition::Returned {
                from: AgentRole::Flight,
                explicit: true
            }
        );
        assert_eq!(state.active(), AgentRole::Coordinator);
        assert_eq!(state.notes().len(), 1);
        assert!(state.notes().iter().next().unwrap().to_string().starts_with("Flight Agent:"));
    }

    #[test]
    fn test_specialist_without_marker_reverts() {
        let mut state = session();
        state.record_response(AgentRole::Coordinator, "HANDOFF:Hotel");
        state.take_pending();

        let transition = state.record_response(AgentRole::Hotel, "Contoso Hotel | 210 USD");
        assert_eq!(
            transition,
            Transition::Returned {
                from: AgentRole::Hotel,
                explicit: false
            }
        );
        assert_eq!(state.active(), AgentRole::Coordinator);
    }

    #[test]
    fn test_unknown_target_treated_as_no_marker() {
        let mut state = session();
        state.record_response(AgentRole::Coordinator, "HANDOFF:Activity");
        state.take_pending();

        let transition =
            state.record_response(AgentRole::Activity, "Try the museum.\nHANDOFF:Cruise");
        assert!(matches!(transition, Transition::Returned { explicit: false, .. }));
        assert_eq!(state.active(), AgentRole::Coordinator);
    }

    #[test]
    fn test_self_handoff_reverts() {
        let mut state = session();
        state.record_response(AgentRole::Coordinator, "HANDOFF:Transfer");
        state.take_pending();

        let transition = state.record_response(AgentRole::Transfer, "Taxi.\nHANDOFF:Transfer");
        assert!(matches!(transition, Transition::Returned { explicit: false, .. }));
        assert!(!state.has_pending());
    }

    #[test]
    fn test_coordinator_stays_without_marker() {
        let mut state = session();
        assert_eq!(
            state.record_response(AgentRole::Coordinator, "Where would you like to go?"),
            Transition::Stay
        );
        assert_eq!(
            state.record_response(AgentRole::Coordinator, "HANDOFF:Coordinator"),
            Transition::Stay
        );
        assert_eq!(state.active(), AgentRole::Coordinator);
    }

    #[test]
    fn test_pending_prompt_fallbacks() {
        let mut state = session();
        state.pending = Some(PendingHandoff {
            role: AgentRole::Reference,
            prompt: None,
        });
        assert_eq!(state.take_pending().unwrap().1, CONTINUE_PROMPT);

        state.record_user_message("What time zone is LHR?");
        state.pending = Some(PendingHandoff {
            role: AgentRole::Reference,
            prompt: Some("   ".into()),
        });
        assert_eq!(state.take_pending().unwrap().1, "What time zone is LHR?");
    }

    #[test]
    fn test_handoff_chain_limit() {
        let mut state = session().with_max_auto_handoffs(2);
        state.record_user_message("plan everything");

        assert!(matches!(
            state.record_response(AgentRole::Coordinator, "HANDOFF:Flight"),
            Transition::Handoff { .. }
        ));
        state.take_pending();
        assert!(matches!(
            state.record_response(AgentRole::Flight, "HANDOFF:Hotel"),
            Transition::Handoff { .. }
        ));
        state.take_pending();
        assert_eq!(
            state.record_response(AgentRole::Hotel, "HANDOFF:Flight"),
            Transition::ChainLimit {
                from: AgentRole::Hotel,
                to: AgentRole::Flight
            }
        );
        assert_eq!(state.active(), AgentRole::Coordinator);
        assert!(!state.has_pending());

        // A fresh user message resets the chain
        state.record_user_message("again");
        assert!(matches!(
            state.record_response(AgentRole::Coordinator, "HANDOFF:Flight"),
            Transition::Handoff { .. }
        ));
    }

    #[test]
    fn test_handoff_to_unregistered_role_ignored() {
        let mut state = session().with_roles([AgentRole::Flight]);
        let transition = state.record_response(AgentRole::Coordinator, "HANDOFF:Hotel");
        assert_eq!(transition, Transition::Stay);
        assert!(!state.has_pending());

        let transition = state.record_response(AgentRole::Coordinator, "HANDOFF:Flight");
        assert!(matches!(transition, Transition::Handoff { .. }));
    }

    #[test]
    fn test_unregistered_marker_does_not_hide_later_one() {
        let mut state = session().with_roles([AgentRole::Hotel]);
        let transition =
            state.record_response(AgentRole::Coordinator, "HANDOFF:Flight\nHANDOFF:Hotel");
        assert_eq!(
            transition,
            Transition::Handoff {
                from: AgentRole::Coordinator,
                to: AgentRole::Hotel
            }
        );
        assert_eq!(state.active(), AgentRole::Hotel);
    }

    #[test]
    fn test_policy_summary_prefers_notes() {
        let mut state = session();
        assert_eq!(state.policy_summary(), None);

        state.record_user_message("Trip to London");
        assert_eq!(state.policy_summary().unwrap(), "User: Trip to London");

        state.record_response(AgentRole::Flight, "820 USD economy");
        assert_eq!(state.policy_summary().unwrap(), "Flight Agent: 820 USD economy");
    }
}
