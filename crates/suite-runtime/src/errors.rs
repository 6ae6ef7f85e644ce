use thiserror::Error;

use bullseye_assessor::ConfigError;

/// Registration and activation failures. Suite definitions are validated
/// up front: a single malformed test rejects the whole batch before any
/// of it is stored.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("suite definitions are not valid JSON: {0}")]
    BadSuiteJson(#[from] serde_json::Error),
    #[error("suite '{suite}', test '{test}': {source}")]
    BadTestDefinition {
        suite: String,
        test: String,
        #[source]
        source: ConfigError,
    },
}
