//! Errors surfaced to workflow callers.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned from running a workflow or invoking a component.
///
/// Work functions return `anyhow::Result`, so an inner `ExecutionError`
/// propagates outward with `?` and every node on the failing path records
/// the message.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("component '{component}' failed")]
    Component {
        component: String,
        node_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to serialize {what} of component '{component}': {message}")]
    Serialization {
        component: String,
        what: &'static str,
        message: String,
    },

    #[error("workflow execution {0} has already been started")]
    AlreadyStarted(Uuid),
}

impl ExecutionError {
    /// Name of the component the error is attributed to, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            ExecutionError::Component { component, .. }
            | ExecutionError::Serialization { component, .. } => Some(component),
            ExecutionError::AlreadyStarted(_) => None,
        }
    }
}
