use pisa_responder::ResponderStoreError;
use pisa_state_machine::ActionStoreError;
use thiserror::Error;

/// Errors raised by the sled-backed stores.
#[derive(Debug, Error)]
pub enum DbError {
    /// The embedded database failed.
    #[error("sled failure: {0}")]
    Backend(#[from] sled::Error),

    /// A persisted value would not decode; the data is corrupt or written
    /// by an incompatible version.
    #[error("codec failure: {0}")]
    Codec(#[from] bincode::Error),
}

impl From<DbError> for ResponderStoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Backend(inner) => ResponderStoreError::Storage(inner.to_string()),
            DbError::Codec(inner) => ResponderStoreError::Corrupt(inner.to_string()),
        }
    }
}

impl From<DbError> for ActionStoreError {
    fn from(err: DbError) -> Self {
        ActionStoreError::Storage(err.to_string())
    }
}
