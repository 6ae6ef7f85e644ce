use thiserror::Error;

/// Errors raised while translating a declarative definition into a
/// pipeline. These fail fast at registration time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unrecognized operation '{0}'")]
    UnknownOperation(String),
    #[error("'{op}' needs {expected}")]
    BadArgument {
        op: &'static str,
        expected: &'static str,
    },
    #[error("illegal 'limit': options are any positive number, 'all' or 'some'")]
    BadLimit,
    #[error("'get' cannot fetch '{0}': options are 'count', 'childPosition', 'DPR', 'innerHTML', and 'UAString'")]
    UnknownValueSource(String),
}

/// Fatal failure of a pipeline run. Recoverable conditions are recorded
/// as diagnostics on the run report instead.
#[derive(Debug, Error, Clone)]
pub enum AssessorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{reason}")]
    Fatal { reason: String },
}

impl AssessorError {
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }
}
