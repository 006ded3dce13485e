//! Server replies and their exact wire literals.

use std::fmt;

/// Error codes carried by `ERROR <CODE>` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidName,
    AlreadyRegistered,
    NameTaken,
    NotRegistered,
    UserNotFound,
    UserBusy,
    NotConnected,
    UnknownCommand,
}

impl ErrorCode {
    /// The code as it appears on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidName => "INVALID_NAME",
            Self::AlreadyRegistered => "ALREADY_REGISTERED",
            Self::NameTaken => "NAME_TAKEN",
            Self::NotRegistered => "NOT_REGISTERED",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::UserBusy => "USER_BUSY",
            Self::NotConnected => "NOT_CONNECTED",
            Self::UnknownCommand => "UNKNOWN_COMMAND",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Sent once, immediately after accept.
    Welcome,

    /// Registration succeeded.
    RegisterOk { name: String },

    /// Answer to `PING`.
    Pong,

    /// Pairing succeeded (to the initiator).
    ConnectOk { target: String },

    /// Pairing announcement (to the target).
    IncomingConnection { name: String },

    /// A relayed message (to the peer).
    From { sender: String, text: String },

    /// Relay acknowledgement (to the sender).
    MsgSent,

    /// The caller left.
    DisconnectOk,

    /// The paired peer left.
    PeerDisconnected,

    /// Registered names.
    Users { names: Vec<String> },

    /// A protocol error; the connection stays open.
    Error(ErrorCode),
}

impl Reply {
    /// Builds a `FROM` relay line.
    pub fn from_peer(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self::From {
            sender: sender.into(),
            text: text.into(),
        }
    }
}

impl From<ErrorCode> for Reply {
    fn from(code: ErrorCode) -> Self {
        Self::Error(code)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome => f.write_str("WELCOME"),
            Self::RegisterOk { name } => write!(f, "REGISTER_OK {name}"),
            Self::Pong => f.write_str("PONG"),
            Self::ConnectOk { target } => write!(f, "CONNECT_OK {target}"),
            Self::IncomingConnection { name } => write!(f, "INCOMING_CONNECTION {name}"),
            Self::From { sender, text } => write!(f, "FROM {sender}: {text}"),
            Self::MsgSent => f.write_str("MSG_SENT"),
            Self::DisconnectOk => f.write_str("DISCONNECT_OK"),
            Self::PeerDisconnected => f.write_str("PEER_DISCONNECTED"),
            Self::Users { names } => write!(f, "USERS {}", names.join(",")),
            Self::Error(code) => write!(f, "ERROR {code}"),
        }
    }
}
