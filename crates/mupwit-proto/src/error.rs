//! Protocol error type.
//!
//! Errors fall into two groups: connection errors leave the stream in an
//! unknown position and the connection must be dropped, while `Ack` is the
//! server rejecting a single command and the connection stays usable.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Socket read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server did not answer within the configured timeout
    #[error("timed out waiting for the server")]
    Timeout,

    /// The server closed the connection
    #[error("connection closed by the server")]
    Closed,

    /// The first line was not an `OK MPD <version>` greeting
    #[error("unexpected greeting: {0:?}")]
    Greeting(String),

    /// `ACK [code@index] {command} message`
    #[error("server rejected `{command}` (code {code}): {message}")]
    Ack {
        code: u32,
        command_index: u32,
        command: String,
        message: String,
    },

    /// A line or field that does not follow the protocol grammar
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// True when the connection can no longer be used after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProtocolError::Ack { .. })
    }

    /// Parse an `ACK [50@0] {readpicture} No such file` line.
    pub fn from_ack_line(line: &str) -> Self {
        parse_ack(line).unwrap_or_else(|| ProtocolError::Malformed(line.to_string()))
    }
}

fn parse_ack(line: &str) -> Option<ProtocolError> {
    let rest = line.strip_prefix("ACK [")?;
    let (codes, rest) = rest.split_once(']')?;
    let (code, index) = codes.split_once('@')?;
    let rest = rest.trim_start().strip_prefix('{')?;
    let (command, message) = rest.split_once('}')?;
    Some(ProtocolError::Ack {
        code: code.parse().ok()?,
        command_index: index.parse().ok()?,
        command: command.to_string(),
        message: message.trim().to_string(),
    })
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
