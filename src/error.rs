//! Error kinds shared by the simulation loop, the remote transport and the audio layer.

use thiserror::Error;

/// Bad user input. Reported synchronously; nothing is mutated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no active bodies to simulate")]
    NoActiveBodies,

    #[error("body {body}: {field} is not a number ({value:?})")]
    InvalidField {
        body: String,
        field: &'static str,
        value: String,
    },

    #[error("body {body}: {field} must be greater than zero")]
    NonPositive { body: String, field: &'static str },

    #[error("duplicate body id {0:?}")]
    DuplicateId(String),

    #[error("speed multiplier must be a positive number, got {0}")]
    InvalidSpeed(f64),
}

/// Network or decode failure while talking to the backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server answered with status {0}")]
    Status(u16),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("snapshot has {got} bodies, expected {expected}")]
    Shape { expected: usize, got: usize },

    #[error("no response within {0} ms")]
    Timeout(u64),

    #[error("fetch worker is gone")]
    Disconnected,
}

/// The audio output device could not be opened.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("output stream configuration failed: {0}")]
    StreamConfig(String),

    #[error("could not build output stream: {0}")]
    BuildStream(String),

    #[error("could not start output stream: {0}")]
    PlayStream(String),

    #[error("could not spawn {0} thread")]
    Spawn(&'static str),
}

/// A `--bodies` file that could not be used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BodiesFileError {
    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("cannot parse {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Why a simulation failed to enter the running state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StartError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("initial fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// A command the simulation thread could not carry out.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("simulation thread is gone")]
    Disconnected,
}
