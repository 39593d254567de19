//! CLI utilities for the Fishbowl client.
//!
//! The utilities present in this module can be used to build an interactive
//! shell against a Fishbowl server.
use std::io::{BufRead, Write};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("no command provided")]
    Empty,
}

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Exit command `.exit`
    Exit,
    /// SQL run through `ExecuteQueryRq`, `.query <sql>`
    Query(String),
    /// Light part list, `.parts`
    Parts,
    /// Customer names, `.customers`
    Customers,
    /// Bare request name sent as a simple request, e.g. `UOMRq`
    Request(String),
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "" => Err(CommandError::Empty),
            ".exit" => Ok(Command::Exit),
            ".parts" => Ok(Command::Parts),
            ".customers" => Ok(Command::Customers),
            ".query" => Err(CommandError::InvalidCommandArguments {
                command: ".query".to_string(),
                reason: "requires a SQL statement. Example: .query SELECT * FROM PART"
                    .to_string(),
            }),
            s if s.starts_with(".query ") || s.starts_with(".query\t") => {
                let sql = s[".query".len()..].trim();
                if sql.is_empty() {
                    return Err(CommandError::InvalidCommandArguments {
                        command: ".query".to_string(),
                        reason: "requires a SQL statement. Example: .query SELECT * FROM PART"
                            .to_string(),
                    });
                }
                Ok(Command::Query(sql.to_string()))
            }
            s if !s.starts_with('.') && !s.contains(char::is_whitespace) => {
                Ok(Command::Request(s.to_string()))
            }
            s => Err(CommandError::UnrecognizedCommand(s.to_string())),
        }
    }
}

/// Prompt user for a valid command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    // A closed terminal reads as end of input.
    if write!(&mut writer, "> ").and_then(|_| writer.flush()).is_err() {
        return Ok(Command::Exit);
    }

    match reader.read_line(&mut s) {
        Ok(0) | Err(_) => Ok(Command::Exit),
        Ok(_) => s.as_str().try_into(),
    }
}
