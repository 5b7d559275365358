//! Typed errors for input contract violations.
//!
//! Collaborator failures (network, model, embedding, index) travel as
//! [`anyhow::Error`]. The variants here are rejected before any
//! collaborator is touched, so callers can match on them.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    /// A conversational turn was started without a session identifier.
    #[error("a session identifier is required to run a conversational turn")]
    MissingSessionId,

    /// The command was empty or whitespace only.
    #[error("{0}")]
    EmptyCommand(&'static str),

    /// The command exceeded the dispatcher's size limit.
    #[error("Command too long ({len} characters, max {max})")]
    CommandTooLong { len: usize, max: usize },
}
