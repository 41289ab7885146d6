use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::cloud::credentials::Credentials;
use crate::constants::{NOT_FOUND_MARKERS, SERVICE_DISABLED_MARKERS};
use crate::models::{ActionKind, Params};

/// Classified failure of a single API call.
///
/// Classification happens once, where the transport error is turned into a
/// `ClientError`; the driver only ever matches on the variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The targeted entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Worth retrying: transport failures, throttling, server errors
    #[error("{0}")]
    Transient(String),

    /// Permanent rejection: bad request, permission denied, service disabled
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Classify free-form error text from a client library
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if NOT_FOUND_MARKERS.iter().any(|m| message.contains(m)) {
            ClientError::NotFound(message)
        } else if SERVICE_DISABLED_MARKERS.iter().any(|m| message.contains(m)) {
            ClientError::Other(message)
        } else {
            ClientError::Transient(message)
        }
    }

    /// Classify an HTTP status plus its response text
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => ClientError::NotFound(message),
            _ if NOT_FOUND_MARKERS.iter().any(|m| message.contains(m)) => {
                ClientError::NotFound(message)
            }
            _ if SERVICE_DISABLED_MARKERS.iter().any(|m| message.contains(m)) => ClientError::Other(message),
            408 | 429 | 500..=599 => ClientError::Transient(message),
            _ => ClientError::Other(message),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ClientError::NotFound(m) | ClientError::Transient(m) | ClientError::Other(m) => m,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }
}

/// One network call against a paged Google API.
///
/// `base` holds the nested resource path in front of `function`
/// (`["users", "settings"]` + `sendAs`). Implementations perform exactly one
/// request per call and must not retry.
#[cfg_attr(test, automock)]
pub trait ApiClient: Send {
    fn list(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError>;

    fn get(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError>;

    fn create(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError>;

    /// Call `function` itself rather than a standard method beneath it
    fn invoke(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError>;

    /// Release any held connection state
    fn close(&self) {}
}

/// Dispatch a call on the action tag
pub fn call(
    client: &dyn ApiClient,
    action: ActionKind,
    base: &[String],
    function: &str,
    params: &Params,
) -> Result<Value, ClientError> {
    match action {
        ActionKind::List => client.list(base, function, params),
        ActionKind::Get => client.get(base, function, params),
        ActionKind::Create => client.create(base, function, params),
        ActionKind::Invoke => client.invoke(base, function, params),
    }
}

/// Builds a client bound to a credential.
///
/// Google APIs bind the caller identity when the client is built, so
/// delegated calls need a fresh client per subject.
pub trait ClientFactory: Send {
    fn build(&self, credentials: Arc<dyn Credentials>) -> Result<Box<dyn ApiClient>>;
}
