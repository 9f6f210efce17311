use crate::{
    crypto::{hash, CompressedPublicKey, Hash, Hashable},
    serializer::{Reader, ReaderError, Serializer, Writer},
};
use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Error as FmtError, Formatter};

pub const BLOCK_VERSION: u64 = 0;

/// Proof-of-stake block header. The staking fields are the variables
/// of the forging search; everything else is fixed by the template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u64,
    pub height: u64,
    pub prev_hash: Hash,
    pub prev_kernel_hash: Hash,
    pub timestamp: u64,
    pub merkle_hash: Hash,
    pub staking_nonce: u64,
    pub staking_amount: u64,
    pub forger_public_key: CompressedPublicKey,
}

impl BlockHeader {
    pub fn genesis(timestamp: u64, forger_public_key: CompressedPublicKey) -> Self {
        Self {
            version: BLOCK_VERSION,
            height: 0,
            prev_hash: Hash::zero(),
            prev_kernel_hash: Hash::zero(),
            timestamp,
            merkle_hash: hash(b""),
            staking_nonce: 0,
            staking_amount: 0,
            forger_public_key,
        }
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_forger_public_key(&self) -> &CompressedPublicKey {
        &self.forger_public_key
    }

    /// Kernel hash of this header's staking attempt:
    /// `SHA3(prev_kernel_hash || timestamp || forger_key || staking_nonce)`
    pub fn kernel_hash(&self) -> Hash {
        compute_kernel_hash(
            &self.prev_kernel_hash,
            self.timestamp,
            &self.forger_public_key,
            self.staking_nonce,
        )
    }

    /// Stake-weighted target check: `kernel <= target * stake`
    pub fn verify_kernel(&self, target: &U256) -> bool {
        kernel_meets_target(&self.kernel_hash(), self.staking_amount, target)
    }

    pub fn validate(&self) -> Result<(), ReaderError> {
        if self.version != BLOCK_VERSION {
            return Err(ReaderError::InvalidValue);
        }
        Ok(())
    }
}

pub fn compute_kernel_hash(
    prev_kernel_hash: &Hash,
    timestamp: u64,
    forger_public_key: &CompressedPublicKey,
    staking_nonce: u64,
) -> Hash {
    let mut bytes = Vec::with_capacity(32 + 8 + 32 + 8);
    bytes.extend_from_slice(prev_kernel_hash.as_bytes());
    bytes.extend_from_slice(&timestamp.to_be_bytes());
    bytes.extend_from_slice(forger_public_key.as_bytes());
    bytes.extend_from_slice(&staking_nonce.to_be_bytes());
    hash(&bytes)
}

// The weighted target is up to 320 bits, compare in the wide domain
pub fn kernel_meets_target(kernel_hash: &Hash, staking_amount: u64, target: &U256) -> bool {
    if staking_amount == 0 {
        return false;
    }

    let kernel = U512::from(U256::from_big_endian(kernel_hash.as_bytes()));
    let weighted_target = U512::from(*target) * U512::from(staking_amount);
    kernel <= weighted_target
}

impl Serializer for BlockHeader {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.version);
        writer.write_uvarint(self.height);
        writer.write_hash(&self.prev_hash);
        writer.write_hash(&self.prev_kernel_hash);
        writer.write_u64(&self.timestamp);
        writer.write_hash(&self.merkle_hash);
        writer.write_u64(&self.staking_nonce);
        writer.write_uvarint(self.staking_amount);
        self.forger_public_key.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let header = Self {
            version: reader.read_uvarint()?,
            height: reader.read_uvarint()?,
            prev_hash: reader.read_hash()?,
            prev_kernel_hash: reader.read_hash()?,
            timestamp: reader.read_u64()?,
            merkle_hash: reader.read_hash()?,
            staking_nonce: reader.read_u64()?,
            staking_amount: reader.read_uvarint()?,
            forger_public_key: CompressedPublicKey::read(reader)?,
        };
        header.validate()?;
        Ok(header)
    }
}

impl Hashable for BlockHeader {}

impl Display for BlockHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "BlockHeader[height: {}, prev: {}, timestamp: {}, staking_nonce: {}]",
            self.height, self.prev_hash, self.timestamp, self.staking_nonce
        )
    }
}
