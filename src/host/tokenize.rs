//! Host command string parsing

use crate::error::{GatewayError, GatewayResult};

/// Sequences rejected in a raw host command before tokenization
const SHELL_METACHARACTERS: &[&str] = &["&&", "||", "$(", "|", ">", "<", ";", "`", "\n", "\r"];

/// The first shell metacharacter in `command`, if any
pub fn find_shell_metacharacter(command: &str) -> Option<&'static str> {
    SHELL_METACHARACTERS
        .iter()
        .copied()
        .find(|meta| command.contains(meta))
}

/// A host command split into its base command and argument tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub base: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    /// Argument tokens joined by single spaces, as matched against rules
    pub fn argument_string(&self) -> String {
        self.args.join(" ")
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.base.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

/// Quote-aware split on unquoted whitespace.
///
/// Single and double quotes and backslash escapes are honoured; an
/// unterminated quote is a parse error.
pub fn tokenize(command: &str) -> GatewayResult<ParsedCommand> {
    let mut tokens = shell_words::split(command)
        .map_err(|e| GatewayError::ParseError(format!("{}: {}", command, e)))?
        .into_iter();

    let base = tokens
        .next()
        .filter(|base| !base.is_empty())
        .ok_or_else(|| GatewayError::InvalidInput("empty command".to_string()))?;

    Ok(ParsedCommand {
        base,
        args: tokens.collect(),
    })
}
