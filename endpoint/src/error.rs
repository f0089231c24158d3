use thiserror::Error;

/// Coarse classification of an endpoint failure.
///
/// Callers branch on this instead of inspecting error text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The vote is already on the endpoint; the write counts as a success.
    AlreadyExists,
    /// Connectivity trouble; the endpoint may recover on its own.
    Transient,
    /// The endpoint refused the call or is misconfigured.
    Fatal,
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("vote already exists: {0}")]
    AlreadyExists(String),

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid contract address: {0}")]
    InvalidAddress(String),

    #[error("no contract deployed at {0}")]
    NoContract(String),

    #[error("call rejected: {0}")]
    Rejected(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl EndpointError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::Unreachable(_) | Self::Timeout(_) => ErrorKind::Transient,
            Self::InvalidAddress(_)
            | Self::NoContract(_)
            | Self::Rejected(_)
            | Self::InvalidResponse(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            EndpointError::AlreadyExists("B1".into()).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(EndpointError::Timeout("probe".into()).kind(), ErrorKind::Transient);
        assert_eq!(EndpointError::Unreachable("refused".into()).kind(), ErrorKind::Transient);
        assert_eq!(EndpointError::NoContract("0x00".into()).kind(), ErrorKind::Fatal);
        assert!(!EndpointError::Rejected("out of gas".into()).is_already_exists());
    }
}
