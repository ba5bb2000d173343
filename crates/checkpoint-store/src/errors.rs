use thiserror::Error;

use tabwatch_core_types::WatchdogError;

#[derive(Clone, Debug, Error)]
pub enum StoreErrorKind {
    #[error("storage io failed: {0}")]
    Io(String),
    #[error("corrupt record at {key}: {detail}")]
    Corrupt { key: String, detail: String },
    #[error("encode failed: {0}")]
    Encode(String),
}

#[derive(Clone, Debug, Error)]
#[error(transparent)]
pub struct StoreError(pub StoreErrorKind);

impl StoreError {
    pub fn kind(&self) -> &StoreErrorKind {
        &self.0
    }

    /// True when the stored bytes exist but cannot be decoded. The scanner
    /// deletes such records instead of retrying them.
    pub fn is_corrupt(&self) -> bool {
        matches!(self.0, StoreErrorKind::Corrupt { .. })
    }
}

impl From<StoreErrorKind> for StoreError {
    fn from(kind: StoreErrorKind) -> Self {
        Self(kind)
    }
}

impl From<StoreError> for WatchdogError {
    fn from(value: StoreError) -> Self {
        WatchdogError::new(value.to_string())
    }
}
