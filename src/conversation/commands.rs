use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::conversation::starters::STARTERS;

/// Commands that can be invoked by starting a line with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// List the canned starter questions
    Starters,
    /// Send a starter question by number or id
    Ask,
    /// Print the conversation so far
    History,
    /// Exit the chat
    Bye,
    /// Show help
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Starters => "list suggested questions",
            SlashCommand::Ask => "send a suggested question, e.g. /ask 2 or /ask skills",
            SlashCommand::History => "show the conversation so far",
            SlashCommand::Bye => "exit the chat",
            SlashCommand::Help => "show available commands",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let tail: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(head)
        .ok()
        .or_else(|| match head.to_lowercase().as_str() {
            "q" | "quit" | "exit" => Some(SlashCommand::Bye),
            "s" | "suggest" => Some(SlashCommand::Starters),
            "h" | "?" => Some(SlashCommand::Help),
            "log" => Some(SlashCommand::History),
            _ => None,
        })?;

    let argument = if tail.is_empty() {
        None
    } else {
        Some(tail.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for command in SlashCommand::iter() {
        help.push_str(&format!("/{} - {}\n", command.command(), command.description()));
    }
    help.push_str("\nAliases: /q for /bye, /s for /starters, /h for /help");
    help
}

/// Numbered list of starter questions
pub fn get_starters_text() -> String {
    STARTERS
        .iter()
        .enumerate()
        .map(|(i, starter)| format!("{}. {} - {}", i + 1, starter.label, starter.message))
        .collect::<Vec<_>>()
        .join("\n")
}
