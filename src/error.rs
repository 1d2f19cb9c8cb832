use thiserror::Error;

use crate::models::{ScoringType, Status};

#[derive(Debug, Error)]
pub enum Error {
    #[error("parent not found: {0}")]
    ParentNotFound(String),

    #[error("status {value:?} is not valid for {scoring_type}")]
    InvalidStatus {
        value: String,
        scoring_type: ScoringType,
    },

    #[error("sub-item {sub_item} holds status {status}, which {scoring_type} does not accept")]
    IncompatibleScoreState {
        sub_item: String,
        status: Status,
        scoring_type: ScoringType,
    },

    #[error("evidence {0} is already attached")]
    DuplicateEvidence(String),

    #[error("unknown status: {0:?}")]
    UnknownStatus(String),

    #[error("unknown scoring type: {0:?}")]
    UnknownScoringType(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
