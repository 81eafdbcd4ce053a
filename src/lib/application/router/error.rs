use crate::application::capability::CapabilityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("operation '{name}' is not advertised by any connected owner")]
    OperationNotFound { name: String },
    #[error("owner '{id}' is not registered")]
    UnknownOwner { id: String },
    #[error(transparent)]
    Owner(#[from] CapabilityError),
    #[error("{} owner(s) failed to disconnect cleanly", failures.len())]
    Teardown { failures: Vec<CapabilityError> },
}
