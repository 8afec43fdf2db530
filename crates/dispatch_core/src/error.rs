use std::io;

use thiserror::Error;

use crate::ids::{ControllerId, DriverId, RequestId};
use crate::schedule::ScheduleError;

/// Errors raised by the registry and the controller message handlers.
///
/// Most of these indicate a broken protocol between drivers and controllers
/// rather than a recoverable condition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("{0} is already subscribed")]
    AlreadySubscribed(DriverId),

    #[error("{0} is not subscribed")]
    NotSubscribed(DriverId),

    #[error("{driver} still has {remaining} scheduled item(s)")]
    ScheduleNotEmpty { driver: DriverId, remaining: usize },

    #[error("{0} is not available for a new schedule")]
    DriverNotAvailable(DriverId),

    #[error("cannot assign an empty schedule to {0}")]
    EmptySchedule(DriverId),

    #[error("{0} is already queued")]
    DuplicateRequest(RequestId),

    #[error("{0} is not queued")]
    UnknownRequest(RequestId),

    #[error("malformed schedule for {driver}: {source}")]
    MalformedSchedule {
        driver: DriverId,
        #[source]
        source: ScheduleError,
    },

    #[error("registry inconsistency: {0}")]
    RegistryInconsistent(String),

    #[error("unknown controller {0}")]
    UnknownController(ControllerId),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
