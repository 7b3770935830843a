use std::io;
use thiserror::Error as ThisError;

/// Errors that stop a server from being built or from serving.
///
/// Failures of a single connection never surface here; they only end that connection's session.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
    #[error("command '{0}' is registered more than once")]
    DuplicateRegistration(String),
    #[error("'{0}' is reserved for the connection hooks")]
    ReservedName(String),
    #[error("invalid command name '{0}'")]
    InvalidCommandName(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
