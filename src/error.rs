//! Confman error types

use thiserror::Error;

/// Errors raised by a switch adapter
#[derive(Debug, Error)]
pub enum SwitchError {
    /// The switch refused to place the call
    #[error("Originate rejected: {0}")]
    Rejected(String),

    /// The target cannot be turned into a channel
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// A control command exited unsuccessfully
    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// IO error talking to the switch
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a contact directory
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No contact with this phone number
    #[error("Unknown contact: {0}")]
    UnknownContact(String),

    /// The backing store failed
    #[error("Directory backend error: {0}")]
    Backend(String),
}

/// Errors that can occur in confman
#[derive(Debug, Error)]
pub enum ConfmanError {
    /// No conference with this dial-in number
    #[error("Conference not found: {0}")]
    ConferenceNotFound(String),

    /// Caller is not permitted to perform the operation
    #[error("Not allowed: {0}")]
    NotAllowed(String),

    /// Conference is private and the caller is not a participant
    #[error("Conference {0} is not public")]
    NotPublic(String),

    /// Participant phone already present in the conference
    #[error("Duplicate participant {phone} in conference {number}")]
    DuplicateParticipant { number: String, phone: String },

    /// Switch error
    #[error("Switch error: {0}")]
    Switch(#[from] SwitchError),

    /// Directory error
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
