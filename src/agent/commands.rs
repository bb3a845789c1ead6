//! Slash-command definitions and parsing for the agent loop.
//!
//! Commands are slash-prefixed messages (e.g. /status, /cancel) handled
//! before the engine is invoked. To add one: extend [`COMMANDS`] and add a
//! handler arm in `AgentLoop::handle_command`.

/// Definition of a slash command.
pub struct CommandDef {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
}

/// Registry of all known commands.
pub const COMMANDS: &[CommandDef] = &[
    CommandDef {
        name: "/help",
        usage: "/help",
        description: "Show available commands",
    },
    CommandDef {
        name: "/new",
        usage: "/new",
        description: "Start a new conversation",
    },
    CommandDef {
        name: "/status",
        usage: "/status",
        description: "Show delegated background tasks",
    },
    CommandDef {
        name: "/cancel",
        usage: "/cancel <task-id>",
        description: "Cancel a running background task",
    },
    CommandDef {
        name: "/adjust",
        usage: "/adjust <task-id> <feedback>",
        description: "Answer a pending adjustment request",
    },
];

/// Split message text into a lowercased command and its argument remainder.
/// Returns None if the text is not a command.
pub fn parse_command(text: &str) -> Option<(String, &str)> {
    let stripped = text.trim_start();
    if !stripped.starts_with('/') {
        return None;
    }
    match stripped.split_once(char::is_whitespace) {
        Some((cmd, rest)) => Some((cmd.to_lowercase(), rest.trim())),
        None => Some((stripped.to_lowercase(), "")),
    }
}

/// Generate help text from registered commands.
pub fn help_text() -> String {
    let mut lines = vec!["Available commands:".to_string()];
    for def in COMMANDS {
        lines.push(format!("{} — {}", def.usage, def.description));
    }
    lines.join("\n")
}
