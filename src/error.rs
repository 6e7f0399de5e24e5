use thiserror::Error;

/// Terminal failure of a controller operation.
///
/// Every variant carries the underlying reason untouched so authenticator
/// cancellations and on-chain revert reasons stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("credential creation failed: {0}")]
    CredentialCreationFailed(String),
    #[error("credential not found: {0}")]
    CredentialNotFound(String),
    #[error("malformed assertion: {0}")]
    MalformedAssertion(String),
    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),
    #[error("execution aborted: {0}")]
    ExecutionAborted(String),
    #[error("chain call failed: {0}")]
    ChainCallFailed(String),
    #[error("account is not authorized: {0}")]
    NotAuthorized(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ControllerError {
    /// Reason string without the variant prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::CredentialCreationFailed(reason)
            | Self::CredentialNotFound(reason)
            | Self::MalformedAssertion(reason)
            | Self::AuthorizationFailed(reason)
            | Self::ExecutionAborted(reason)
            | Self::ChainCallFailed(reason)
            | Self::NotAuthorized(reason)
            | Self::InvalidArgument(reason)
            | Self::Config(reason) => reason,
        }
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_reason_verbatim() {
        let error = ControllerError::ChainCallFailed(
            "execution reverted: Unauthorized()".to_string(),
        );
        assert_eq!(
            error.to_string(),
            "chain call failed: execution reverted: Unauthorized()"
        );
        assert_eq!(error.reason(), "execution reverted: Unauthorized()");
    }
}
