//! # Domain Errors

use msh_01_message_store::StoreError;
use msh_02_leg_configuration::LegConfigurationError;
use msh_03_split_and_join::SplitAndJoinError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Configuration(#[from] LegConfigurationError),

    #[error(transparent)]
    SplitAndJoin(#[from] SplitAndJoinError),

    #[error("Invalid submission: {reason}")]
    InvalidSubmission { reason: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Scheduler is shutting down")]
    ShuttingDown,
}

impl SchedulerError {
    pub(crate) fn io(context: &str, e: std::io::Error) -> Self {
        Self::Io {
            message: format!("{}: {}", context, e),
        }
    }
}
