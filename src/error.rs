//! Error taxonomy shared by the run controller and the save reconciler.

use std::time::Duration;
use thiserror::Error;

use crate::model::OfferingId;

/// Failure reported by the optimization collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("optimizer unreachable: {0}")]
    Transport(String),

    #[error("optimizer rejected the run ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("optimizer response could not be decoded: {0}")]
    Decode(String),

    #[error("optimizer did not answer within {}", human(.0))]
    Timeout(Duration),
}

fn human(d: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*d)
}

/// Failure reported by the storage collaborator while persisting assignments.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersistError {
    #[error("storage unreachable: {0}")]
    Transport(String),

    #[error("storage rejected the assignments ({status}): {message}")]
    Status { status: u16, message: String },
}

/// The backend could not provide default optimizer parameters.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("default optimizer configuration unavailable: {0}")]
pub struct ConfigUnavailable(pub String);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("an allocation run is already in progress")]
    RunAlreadyActive,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("allocation run was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SaveError {
    #[error("no allocation proposal loaded")]
    NoProposal,

    #[error("offering {0} is not part of the current proposal")]
    UnknownOffering(OfferingId),

    #[error("a save is already in flight for offerings {offering_ids:?}")]
    InProgress { offering_ids: Vec<OfferingId> },

    #[error("offering {0} has already been saved")]
    AlreadySaved(OfferingId),

    #[error(transparent)]
    Persist(#[from] PersistError),
}
