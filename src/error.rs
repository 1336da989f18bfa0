use thiserror::Error;

/// Monitoring engine errors
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Event normalization/handling errors
    #[error("Event error: {0}")]
    Event(String),

    /// Session-table errors
    #[error("Session error: {0}")]
    Session(String),

    /// Queue-state errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Durable-store errors
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// Billing collaborator errors
    #[error("Billing error: {0}")]
    Billing(String),

    /// Presence collaborator errors
    #[error("Presence error: {0}")]
    Presence(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// Create a new Event error
    pub fn event<S: Into<String>>(msg: S) -> Self {
        Self::Event(msg.into())
    }

    /// Create a new Session error
    pub fn session<S: Into<String>>(msg: S) -> Self {
        Self::Session(msg.into())
    }

    /// Create a new Queue error
    pub fn queue<S: Into<String>>(msg: S) -> Self {
        Self::Queue(msg.into())
    }

    /// Create a new Billing error
    pub fn billing<S: Into<String>>(msg: S) -> Self {
        Self::Billing(msg.into())
    }

    /// Create a new Presence error
    pub fn presence<S: Into<String>>(msg: S) -> Self {
        Self::Presence(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type for monitoring engine operations
pub type Result<T> = std::result::Result<T, MonitorError>;
