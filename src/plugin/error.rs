use thiserror::Error;

/// Errors from the plugin subsystem.
///
/// None of these terminate a catalog session: discovery and dispatch wrap
/// every boundary crossing at its call site and degrade instead of failing.
#[derive(Debug, Error)]
pub enum PluginError {
    /// I/O or network failure while scanning one entry. Isolated, non-fatal.
    #[error("discovery failed for {path}: {message}")]
    Discovery { path: String, message: String },

    /// Missing, malformed, or ambiguous plugin metadata.
    #[error("metadata error in {path}: {message}")]
    Metadata { path: String, message: String },

    /// The remote API quota is exhausted; the remote phase was skipped.
    #[error("remote API rate limit exceeded")]
    RateLimitExceeded,

    /// A dispatched script failed at runtime. The plugin stays cataloged.
    #[error("script execution failed: {0}")]
    Execution(String),

    /// A required interpreter is absent; no invocation was attempted.
    #[error("interpreter not available: {0}")]
    CapabilityMissing(String),

    /// A plugin source field needed to build a URL is unset.
    #[error("plugin source is missing its {0}")]
    SourceIncomplete(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PluginResult<T> = Result<T, PluginError>;
