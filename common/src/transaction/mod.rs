pub mod builder;
pub mod simple;
pub mod state;
pub mod zether;

mod bloom;

pub use bloom::TransactionBloom;
pub use state::{ChainState, StateError};

use crate::{
    account::{AccountError, StakeError},
    config::{MAX_DATA_SIZE, TX_HEIGHT_VALIDITY},
    crypto::{
        hash,
        zether::{ZetherError, ZetherVerifier},
        Hash, Hashable,
    },
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
    token::{TokenError, TokenHash},
    utils::CancelToken,
};
use serde::{Deserialize, Serialize};
use simple::TransactionSimple;
use std::{collections::HashMap, sync::OnceLock};
use thiserror::Error;
use zether::TransactionZether;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid vin")]
    InvalidVin,
    #[error("Invalid vout")]
    InvalidVout,
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Invalid extra payload")]
    InvalidExtra,
    #[error("Invalid data payload")]
    InvalidData,
    #[error("Integer overflow")]
    Overflow,
    #[error("Outputs exceed inputs")]
    FeeUnderflow,
    #[error("Invalid payload count")]
    InvalidPayloadCount,
    #[error("Invalid registration")]
    InvalidRegistration,
    #[error("Proof doesn't match the ring size")]
    InvalidProofShape,
    #[error("Ring member is not registered")]
    RingMemberNotRegistered,
    #[error("Ring member is already registered")]
    AlreadyRegistered,
    #[error("Token not found")]
    TokenNotFound,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Signature verification failed")]
    SignatureVerification,
    #[error("Registration signature failed")]
    RegistrationSignature,
    #[error("Delegate signature failed")]
    DelegateSignature,
    #[error("Zether proof verification failed")]
    ProofVerification,
    #[error("Transaction height is not bound to a recent tip")]
    HeightBinding,
    #[error("Transaction was not bloomed")]
    NotBloomed,
    #[error("Operation canceled")]
    Canceled,
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Stake(#[from] StakeError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Zether(#[from] ZetherError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Malformed(#[from] ReaderError),
}

/// Wire version, doubles as the body discriminant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxVersion {
    Simple,
    Zether,
}

impl TxVersion {
    pub fn as_u64(self) -> u64 {
        match self {
            TxVersion::Simple => 0,
            TxVersion::Zether => 1,
        }
    }
}

/// Version of the optional data payload attached to a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataVersion {
    None,
    Plain,
    Encrypted,
}

impl DataVersion {
    pub fn as_u8(self) -> u8 {
        match self {
            DataVersion::None => 0,
            DataVersion::Plain => 1,
            DataVersion::Encrypted => 2,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, ReaderError> {
        Ok(match value {
            0 => DataVersion::None,
            1 => DataVersion::Plain,
            2 => DataVersion::Encrypted,
            _ => return Err(ReaderError::InvalidValue),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionBody {
    Simple(TransactionSimple),
    Zether(TransactionZether),
}

impl TransactionBody {
    pub fn version(&self) -> TxVersion {
        match self {
            TransactionBody::Simple(_) => TxVersion::Simple,
            TransactionBody::Zether(_) => TxVersion::Zether,
        }
    }
}

/// Canonical in-memory transaction. The bloom is a write-once cache
/// attached after verification; mutating the transaction is not
/// possible once shared, so the cache can never go stale.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    data_version: DataVersion,
    data: Vec<u8>,
    body: TransactionBody,
    #[serde(skip)]
    bloom: OnceLock<TransactionBloom>,
}

impl Transaction {
    pub fn new(data_version: DataVersion, data: Vec<u8>, body: TransactionBody) -> Self {
        Self {
            data_version,
            data,
            body,
            bloom: OnceLock::new(),
        }
    }

    pub fn get_version(&self) -> TxVersion {
        self.body.version()
    }

    pub fn get_data_version(&self) -> DataVersion {
        self.data_version
    }

    pub fn get_data(&self) -> &[u8] {
        &self.data
    }

    pub fn get_body(&self) -> &TransactionBody {
        &self.body
    }

    pub fn get_bloom(&self) -> Option<&TransactionBloom> {
        self.bloom.get()
    }

    // Content hash, from the bloom when available
    pub fn get_hash(&self) -> Hash {
        match self.bloom.get() {
            Some(bloom) => bloom.hash.clone(),
            None => Hashable::hash(self),
        }
    }

    // Serialized size in bytes, from the bloom when available
    pub fn get_size(&self) -> usize {
        match self.bloom.get() {
            Some(bloom) => bloom.size,
            None => self.size(),
        }
    }

    /// Bytes covered by the input signatures and the zether proofs:
    /// the full serialization minus the signatures and proofs
    pub fn serialize_for_signing(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);

        writer.write_uvarint(self.body.version().as_u64());
        writer.write_u8(self.data_version.as_u8());
        if self.data_version != DataVersion::None {
            writer.write_var_bytes(&self.data);
        }

        match &self.body {
            TransactionBody::Simple(tx) => tx.write_with_signature(&mut writer, false),
            TransactionBody::Zether(tx) => tx.write_with_proofs(&mut writer, false),
        }

        buffer
    }

    pub fn hash_for_signature(&self) -> Hash {
        hash(&self.serialize_for_signing())
    }

    /// Pure structural validation. Idempotent, no cryptography.
    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.data_version == DataVersion::None {
            if !self.data.is_empty() {
                return Err(TransactionError::InvalidData);
            }
        } else if self.data.is_empty() || self.data.len() > MAX_DATA_SIZE {
            return Err(TransactionError::InvalidData);
        }

        match &self.body {
            TransactionBody::Simple(tx) => tx.validate(),
            TransactionBody::Zether(tx) => tx.validate(),
        }
    }

    /// Structural validation plus all cryptographic checks, caching
    /// the result in the bloom. Safe to call again on a bloomed
    /// transaction: it short-circuits to the cached verdict.
    pub fn verify(
        &self,
        verifier: &dyn ZetherVerifier,
        cancel: &CancelToken,
    ) -> Result<&TransactionBloom, TransactionError> {
        if let Some(bloom) = self.bloom.get() {
            bloom.verify_if_bloomed()?;
            return Ok(bloom);
        }

        self.validate()?;

        let signing_hash = self.hash_for_signature();
        match &self.body {
            TransactionBody::Simple(tx) => {
                if !tx.verify_signatures(&signing_hash) {
                    return Err(TransactionError::SignatureVerification);
                }
            }
            TransactionBody::Zether(tx) => tx.verify(&signing_hash, verifier, cancel)?,
        }

        let serialized = self.to_bytes();
        let bloom = TransactionBloom {
            hash: hash(&serialized),
            size: serialized.len(),
            serialized,
            signature_verified: true,
            registrations_verified: true,
        };

        Ok(self.bloom.get_or_init(|| bloom))
    }

    /// Declared fees per token
    pub fn compute_fees(&self) -> Result<HashMap<TokenHash, u64>, TransactionError> {
        match &self.body {
            TransactionBody::Simple(tx) => tx.compute_fees(),
            TransactionBody::Zether(tx) => tx.compute_fees(),
        }
    }

    // Fee paid in the native token, the unit the mempool orders by
    pub fn native_fee(&self) -> u64 {
        self.compute_fees()
            .ok()
            .and_then(|fees| fees.get(&crate::config::NATIVE_TOKEN).copied())
            .unwrap_or(0)
    }

    /// Apply this transaction to the state at `height`
    pub fn include<S: ChainState>(
        &self,
        height: u64,
        state: &mut S,
    ) -> Result<(), TransactionError> {
        match &self.body {
            TransactionBody::Simple(tx) => tx.include(height, state),
            TransactionBody::Zether(tx) => {
                // bound to a recent tip: stale transactions fail to apply
                if tx.height > height || height - tx.height >= TX_HEIGHT_VALIDITY {
                    return Err(TransactionError::HeightBinding);
                }
                tx.include(height, state)
            }
        }
    }

    /// Exact inverse of `include` at the same height
    pub fn remove<S: ChainState>(
        &self,
        height: u64,
        state: &mut S,
    ) -> Result<(), TransactionError> {
        match &self.body {
            TransactionBody::Simple(tx) => tx.remove(height, state),
            TransactionBody::Zether(tx) => tx.remove(height, state),
        }
    }
}

// The bloom cache is excluded from equality
impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.data_version == other.data_version
            && self.data == other.data
            && self.body == other.body
    }
}

impl Eq for Transaction {}

impl Serializer for Transaction {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.body.version().as_u64());
        writer.write_u8(self.data_version.as_u8());
        if self.data_version != DataVersion::None {
            writer.write_var_bytes(&self.data);
        }

        match &self.body {
            TransactionBody::Simple(tx) => tx.write(writer),
            TransactionBody::Zether(tx) => tx.write(writer),
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let version = reader.read_uvarint()?;
        let data_version = DataVersion::from_u8(reader.read_u8()?)?;
        let data = if data_version != DataVersion::None {
            reader.read_var_bytes(MAX_DATA_SIZE)?
        } else {
            Vec::new()
        };

        let body = match version {
            0 => TransactionBody::Simple(TransactionSimple::read(reader)?),
            1 => TransactionBody::Zether(TransactionZether::read(reader)?),
            _ => return Err(ReaderError::InvalidValue),
        };

        Ok(Self {
            data_version,
            data,
            body,
            bloom: OnceLock::new(),
        })
    }

    fn size(&self) -> usize {
        let data_size = if self.data_version != DataVersion::None {
            uvarint_size(self.data.len() as u64) + self.data.len()
        } else {
            0
        };

        let body_size = match &self.body {
            TransactionBody::Simple(tx) => tx.size(),
            TransactionBody::Zether(tx) => tx.size(),
        };

        uvarint_size(self.body.version().as_u64()) + 1 + data_size + body_size
    }
}

impl Hashable for Transaction {}

impl AsRef<Transaction> for Transaction {
    fn as_ref(&self) -> &Transaction {
        self
    }
}

#[cfg(test)]
mod tests;
