use thiserror::Error;

/// Main error type for the evetune system
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Trial error: {0}")]
    Trial(#[from] TrialError),

    #[error("All {attempted} trials failed; no finite metric was observed")]
    AllTrialsFailed { attempted: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while preparing the environment, before any trial runs
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Required tool not found on PATH: {tool}")]
    MissingTool { tool: String },

    #[error("Bootstrap command `{command}` failed with exit code {code:?}")]
    CommandFailed { command: String, code: Option<i32> },

    #[error("Dataset incomplete: found {found} shards, need {required}")]
    InsufficientShards { found: usize, required: usize },
}

/// Errors from launching the external training job
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to spawn `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("Failed to capture output of `{program}`: {message}")]
    Capture { program: String, message: String },

    #[error("Empty invocation: no program given")]
    EmptyInvocation,
}

/// Trial lifecycle errors
#[derive(Error, Debug)]
pub enum TrialError {
    #[error("Invalid transition for trial {trial_id}: {from} -> {to}")]
    InvalidTransition {
        trial_id: String,
        from: String,
        to: String,
    },

    #[error("Log artifact error for trial {trial_id}: {message}")]
    LogArtifact { trial_id: String, message: String },
}

/// Result type alias for evetune operations
pub type TuneResult<T> = Result<T, TuneError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TuneError::Config(format!($($arg)*))
    };
}
