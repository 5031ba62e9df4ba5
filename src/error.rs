//! Typed error surface for the eBL pack core. See spec §7/§8 for the
//! kind-to-meaning mapping a REST layer would use to pick an HTTP status.

#[derive(thiserror::Error, Debug)]
pub enum EblError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("business unit not found: {0}")]
    BusinessUnitNotFound(String),

    #[error("business unit inactive: {0}")]
    BusinessUnitInactive(String),

    #[error("eBL not found: {0}")]
    EblNotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("no legal next owner for this (role, action) pair")]
    InvalidRoleOrAction,

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("storage conflict, caller may retry")]
    StorageConflict,

    #[error("storage failed: {0}")]
    StorageFailed(String),
}

impl From<sled::Error> for EblError {
    fn from(err: sled::Error) -> Self {
        EblError::StorageFailed(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<EblError>> for EblError {
    fn from(err: sled::transaction::TransactionError<EblError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(sled_err) => {
                EblError::StorageFailed(sled_err.to_string())
            }
        }
    }
}

impl From<minicbor::encode::Error<std::convert::Infallible>> for EblError {
    fn from(err: minicbor::encode::Error<std::convert::Infallible>) -> Self {
        EblError::InvalidRequest(format!("cbor encode failed: {err}"))
    }
}

impl From<minicbor::decode::Error> for EblError {
    fn from(err: minicbor::decode::Error) -> Self {
        EblError::StorageFailed(format!("cbor decode failed: {err}"))
    }
}
