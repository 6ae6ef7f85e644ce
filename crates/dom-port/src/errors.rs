use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DomError {
    #[error("element {0} is gone")]
    ElementGone(u64),
    #[error("cannot read {0}")]
    Unreadable(String),
    #[error("event channel closed before '{0}' fired")]
    EventChannelClosed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
