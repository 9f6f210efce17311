use crate::{crypto::Hash, transaction::TransactionError};

/// Derived data cached after a successful verification. A bloomed
/// entity is immutable; the cache is computed once and read-only
/// afterwards.
#[derive(Clone, Debug)]
pub struct TransactionBloom {
    pub hash: Hash,
    pub size: usize,
    pub serialized: Vec<u8>,
    pub signature_verified: bool,
    pub registrations_verified: bool,
}

impl TransactionBloom {
    pub fn verify_if_bloomed(&self) -> Result<(), TransactionError> {
        if !self.signature_verified || !self.registrations_verified {
            return Err(TransactionError::NotBloomed);
        }
        Ok(())
    }
}
