//! Reserved console commands

/// What a line of console input means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// `exit` or `quit`
    Exit,
    /// Print collected trip notes
    Summary,
    /// Run the policy check
    Policy,
    /// Anything else: a message for the active agent
    Message(String),
    /// Blank input
    Empty,
}

impl SessionCommand {
    /// Classify a raw input line. Commands are case-insensitive.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return SessionCommand::Empty;
        }
        match trimmed.to_lowercase().as_str() {
            "exit" | "quit" => SessionCommand::Exit,
            "summary" => SessionCommand::Summary,
            "policy" => SessionCommand::Policy,
            _ => SessionCommand::Message(trimmed.to_string()),
        }
    }
}
