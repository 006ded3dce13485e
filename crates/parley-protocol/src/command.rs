//! Client commands.
//!
//! A command line is a keyword, optionally followed by a single space and
//! an argument. Keywords are matched ASCII-case-insensitively. `REGISTER`,
//! `CONNECT` and `MSG` require an argument; `PING`, `WHO` and `DISCONNECT`
//! take none.

use thiserror::Error;

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Claim a name (argument trimmed).
    Register { name: String },

    /// Liveness check.
    Ping,

    /// Request pairing with another registered name (argument trimmed).
    Connect { target: String },

    /// Relay text to the paired peer (argument kept verbatim).
    Msg { text: String },

    /// Leave the conversation and log off.
    Disconnect,

    /// List registered names.
    Who,
}

/// Errors from parsing a command line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The keyword is not recognised, or its argument shape is wrong.
    #[error("unknown command: {keyword}")]
    Unknown { keyword: String },
}

impl Command {
    /// Parses one trimmed, non-empty line.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Unknown` for unrecognised keywords, for
    /// argument-taking keywords without an argument, and for argument-less
    /// keywords followed by extra text.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let (keyword, argument) = match line.split_once(' ') {
            Some((keyword, rest)) => (keyword, Some(rest)),
            None => (line, None),
        };

        let is = |expected: &str| keyword.eq_ignore_ascii_case(expected);

        let command = match argument {
            Some(rest) if is("REGISTER") => Command::Register {
                name: rest.trim().to_string(),
            },
            Some(rest) if is("CONNECT") => Command::Connect {
                target: rest.trim().to_string(),
            },
            Some(rest) if is("MSG") => Command::Msg {
                text: rest.to_string(),
            },
            None if is("PING") => Command::Ping,
            None if is("DISCONNECT") => Command::Disconnect,
            None if is("WHO") => Command::Who,
            _ => {
                return Err(CommandError::Unknown {
                    keyword: keyword.to_string(),
                })
            }
        };

        Ok(command)
    }

    /// The canonical upper-case keyword, for logging.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Register { .. } => "REGISTER",
            Self::Ping => "PING",
            Self::Connect { .. } => "CONNECT",
            Self::Msg { .. } => "MSG",
            Self::Disconnect => "DISCONNECT",
            Self::Who => "WHO",
        }
    }
}
