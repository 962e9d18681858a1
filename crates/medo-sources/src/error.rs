use thiserror::Error;

/// Unified error type for registry, session state and routing operations
#[derive(Error, Debug)]
pub enum SourceError {
    /// Provider name is not present in the registry
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Settings or routing requested without a name and none is active
    #[error("No active source selected for this session")]
    NoActiveSource,

    /// The delegated store call failed
    #[error("Execution failed on provider '{provider}': {source}")]
    ExecutionFailed {
        provider: String,
        #[source]
        source: Box<SourceError>,
    },

    /// The delegated store call was cancelled by the caller
    #[error("Execution on provider '{provider}' was cancelled")]
    Cancelled { provider: String },

    /// Session state bag could not be read or written
    #[error("Session state unavailable: {0}")]
    StateUnavailable(String),

    /// A reserved session key holds a value of the wrong shape
    #[error("Invalid session state under '{key}': {reason}")]
    InvalidState { key: String, reason: String },

    /// Connection failed (authentication, network, etc.)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Invalid query syntax or parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SourceError {
    pub fn unknown_provider(name: impl Into<String>) -> Self {
        SourceError::UnknownProvider(name.into())
    }

    pub fn invalid_state(key: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::InvalidState {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        SourceError::InvalidConfiguration(msg.into())
    }

    /// Wrap a provider failure with the name of the provider that produced it
    pub fn execution_failed(provider: impl Into<String>, source: SourceError) -> Self {
        SourceError::ExecutionFailed {
            provider: provider.into(),
            source: Box::new(source),
        }
    }

    /// Name of the provider attached to an execution error, if any
    pub fn provider(&self) -> Option<&str> {
        match self {
            SourceError::ExecutionFailed { provider, .. } | SourceError::Cancelled { provider } => {
                Some(provider.as_str())
            }
            SourceError::UnknownProvider(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(error: serde_json::Error) -> Self {
        SourceError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
