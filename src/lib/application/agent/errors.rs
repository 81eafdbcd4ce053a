use crate::application::capability::CapabilityError;
use crate::application::router::RouterError;
use crate::domain::SchemaViolation;
use crate::infrastructure::model::ModelError;
use thiserror::Error;

/// Reasons a run stops early. Only these end a run without a final answer.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("run cancelled by the consumer")]
    Cancelled,
}

impl AgentError {
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Model(err) => err.user_message(),
            AgentError::Cancelled => "The request was cancelled.".to_string(),
        }
    }
}

/// A failed invocation. Reported back to the model, never raised.
#[derive(Debug, Error)]
pub enum InvocationFailure {
    #[error("invalid arguments for '{name}': {violation}")]
    InvalidArguments {
        name: String,
        #[source]
        violation: SchemaViolation,
    },
    #[error(transparent)]
    Routing(#[from] RouterError),
}

impl InvocationFailure {
    /// Text the model sees. Remote failure detail is passed on unchanged.
    pub fn observation(&self) -> String {
        match self {
            InvocationFailure::Routing(RouterError::Owner(CapabilityError::Invocation {
                detail,
                ..
            })) => detail.clone(),
            other => other.to_string(),
        }
    }
}
