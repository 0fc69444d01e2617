//! Handoff marker parsing
//!
//! Agents pass control by writing a line containing `HANDOFF:<Role>`. The
//! first line whose target resolves to an accepted role wins; other targets
//! are logged and skipped.

use tracing::warn;

use crate::role::AgentRole;

/// Control prefix, matched case-insensitively
pub const HANDOFF_PREFIX: &str = "HANDOFF:";

/// Characters stripped around a marker target
const DECORATION: &[char] = &[
    '*', '`', '_', '-', '~', '#', '>', '<', '"', '\'', '.', ',', '!', '?', ';', ':', '(', ')',
    '[', ']', '{', '}',
];

/// Find the role named by the first valid handoff marker in `text`
pub fn parse_handoff(text: &str) -> Option<AgentRole> {
    parse_handoff_with(text, |_| true)
}

/// Like [`parse_handoff`], but only roles passing `accept` count as valid.
/// A marker naming a rejected role does not stop the scan.
pub fn parse_handoff_with<F>(text: &str, mut accept: F) -> Option<AgentRole>
where
    F: FnMut(AgentRole) -> bool,
{
    text.lines().find_map(|line| {
        let role = parse_line(line)?;
        if accept(role) {
            Some(role)
        } else {
            warn!(target = %role, "Ignoring handoff to a role with no agent");
            None
        }
    })
}

fn parse_line(line: &str) -> Option<AgentRole> {
    let target = marker_target(line)?;
    let role = AgentRole::from_key(&target);
    if role.is_none() {
        warn!(target = %target, line = %line.trim(), "Ignoring handoff to unknown role");
    }
    role
}

/// Case-folded, undecorated text after the prefix, if the line has one
fn marker_target(line: &str) -> Option<String> {
    // ASCII upper-casing keeps byte offsets valid in the original line
    let index = line.to_ascii_uppercase().find(HANDOFF_PREFIX)?;
    let rest = &line[index + HANDOFF_PREFIX.len()..];
    let target = rest
        .trim_matches(|c: char| c.is_whitespace() || DECORATION.contains(&c))
        .to_lowercase();
    Some(target)
}
