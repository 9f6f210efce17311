use thiserror::Error;
use veil_common::{
    serializer::ReaderError,
    transaction::{StateError, TransactionError},
};

/// Error kinds the node core distinguishes. Codec and validation
/// failures at the network boundary drop the offending message; apply
/// failures inside the mempool evict the transaction; store failures
/// abort the write transaction and leave the tip unchanged.
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] ReaderError),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(TransactionError),
    #[error("Verification failed: {0}")]
    VerificationFailed(TransactionError),
    #[error("Apply failed: {0}")]
    ApplyFailed(TransactionError),
    #[error("Already exists")]
    AlreadyExists,
    #[error("Not found")]
    NotFound,
    #[error("Store error: {0}")]
    StoreError(String),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Operation canceled")]
    Canceled,
}

impl From<sled::Error> for BlockchainError {
    fn from(error: sled::Error) -> Self {
        BlockchainError::StoreError(error.to_string())
    }
}

impl From<StateError> for BlockchainError {
    fn from(error: StateError) -> Self {
        BlockchainError::StoreError(error.to_string())
    }
}

impl From<TransactionError> for BlockchainError {
    fn from(error: TransactionError) -> Self {
        match error {
            TransactionError::Canceled => BlockchainError::Canceled,
            TransactionError::Malformed(e) => BlockchainError::MalformedInput(e),
            e @ (TransactionError::SignatureVerification
            | TransactionError::RegistrationSignature
            | TransactionError::DelegateSignature
            | TransactionError::ProofVerification
            | TransactionError::NotBloomed) => BlockchainError::VerificationFailed(e),
            e @ (TransactionError::InvalidVin
            | TransactionError::InvalidVout
            | TransactionError::ZeroAmount
            | TransactionError::InvalidExtra
            | TransactionError::InvalidData
            | TransactionError::InvalidPayloadCount
            | TransactionError::InvalidRegistration
            | TransactionError::InvalidProofShape
            | TransactionError::FeeUnderflow
            | TransactionError::InvalidPublicKey) => BlockchainError::InvalidTransaction(e),
            e => BlockchainError::ApplyFailed(e),
        }
    }
}
