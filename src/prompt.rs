//! Prompt composition for the active agent

use crate::role::AgentRole;
use crate::transcript::{Transcript, DEFAULT_CONTEXT_TURNS};

/// Reminder appended for every specialist
pub const HANDOFF_REMINDER: &str = "If you are done, place `HANDOFF:Coordinator` on its own line \
     so the coordinator resumes the conversation.";

/// Compose the prompt sent to `role`.
///
/// Sections, separated by a blank line: recent transcript (when there is
/// any), the latest message, and for specialists the hand-back reminder.
pub fn build_prompt(role: AgentRole, transcript: &Transcript, latest_input: &str) -> String {
    let mut sections = Vec::with_capacity(3);

    let context = transcript.render(DEFAULT_CONTEXT_TURNS);
    if !context.is_empty() {
        sections.push(format!("Conversation so far:\n{}", context));
    }

    sections.push(format!("Latest user request:\n{}", latest_input));

    match role {
        AgentRole::Coordinator => {}
        AgentRole::Flight
        | AgentRole::Hotel
        | AgentRole::Activity
        | AgentRole::Transfer
        | AgentRole::Reference => sections.push(HANDOFF_REMINDER.to_string()),
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_prompt_without_history() {
        let prompt = build_prompt(AgentRole::Coordinator, &Transcript::new(), "Plan a trip");
        assert_eq!(prompt, "Latest user request:\nPlan a trip");
    }

    #[test]
    fn test_specialist_prompt_sections() {
        let mut transcript = Transcript::new();
        transcript.append("User", "I want to fly SEA to LHR");
        transcript.append("Coordinator", "HANDOFF:Flight");

        let prompt = build_prompt(AgentRole::Flight, &transcript, "I want to fly SEA to LHR");
        let sections: Vec<&str> = prompt.split("\n\n").collect();

        assert_eq!(sections.len(), 3);
        assert!(sections[0].starts_with("Conversation so far:\nUser: I want to fly"));
        assert_eq!(sections[1], "Latest user request:\nI want to fly SEA to LHR");
        assert_eq!(sections[2], HANDOFF_REMINDER);
    }

    #[test]
    fn test_input_kept_verbatim() {
        let input = "  multi\nline  input with `ticks` ";
        for role in AgentRole::ALL {
            let prompt = build_prompt(role, &Transcript::new(), input);
            assert!(prompt.contains(input));
            assert_eq!(prompt.contains(HANDOFF_REMINDER), !role.is_coordinator());
        }
    }

    #[test]
    fn test_context_limited_to_recent_turns() {
        let mut transcript = Transcript::new();
        for i in 0..20 {
            transcript.append("User", &format!("message {}", i));
        }
        let prompt = build_prompt(AgentRole::Coordinator, &transcript, "next");
        assert!(!prompt.contains("message 13"));
        assert!(prompt.contains("message 14"));
        assert!(prompt.contains("message 19"));
    }
}
