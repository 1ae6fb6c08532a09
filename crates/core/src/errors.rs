use thiserror::Error;

use crate::domain::approval::ApprovalStatus;

/// Stable machine-readable code for every caller-visible failure class.
///
/// The source of truth for HTTP mapping lives at the interface layer; the
/// code travels with the error so handlers never invent their own strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid approval transition from {from:?} to {to:?}")]
    InvalidApprovalTransition { from: ApprovalStatus, to: ApprovalStatus },
    #[error("invalid opportunity number `{0}`")]
    InvalidOpportunityNumber(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidApprovalTransition { .. } => ErrorCode::Conflict,
            Self::InvalidOpportunityNumber(_) | Self::InvariantViolation(_) => {
                ErrorCode::Validation
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::approval::ApprovalStatus;
    use crate::errors::{DomainError, ErrorCode};

    #[test]
    fn transition_errors_map_to_conflict() {
        let error = DomainError::InvalidApprovalTransition {
            from: ApprovalStatus::Approved,
            to: ApprovalStatus::Rejected,
        };
        assert_eq!(error.code(), ErrorCode::Conflict);
        assert_eq!(error.code().as_str(), "conflict");
    }

    #[test]
    fn malformed_number_maps_to_validation() {
        let error = DomainError::InvalidOpportunityNumber("GKT-bogus".to_owned());
        assert_eq!(error.code(), ErrorCode::Validation);
    }
}
