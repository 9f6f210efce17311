use super::key::CompressedPublicKey;
use crate::{
    crypto::Hash,
    serializer::{Reader, ReaderError, Serializer, Writer},
};
use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    traits::Identity,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Ring size bounds: power of two, at most one byte of sender positions
pub const MIN_RING_SIZE: usize = 2;
pub const MAX_RING_SIZE: usize = 256;

// Number of inner-product rounds for a 64-bit range proof
const IP_ROUNDS: usize = 6;

#[derive(Debug, Error)]
pub enum ZetherError {
    #[error("Ring size is not a power of 2")]
    RingSizeNotPowerOfTwo,
    #[error("Ring size out of bounds")]
    RingSizeOutOfBounds,
    #[error("Statement vectors lengths mismatch")]
    LengthMismatch,
    #[error("Point decompression failed")]
    Decompression,
    #[error("Encrypted balance overflowed the group")]
    BalanceUpdate,
}

pub fn is_power_of_two(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

// Compressed group element carried by statements and encrypted balances
#[derive(Clone, Debug, PartialEq, Eq, std::hash::Hash)]
pub struct CompressedCommitment([u8; 32]);

impl CompressedCommitment {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn identity() -> Self {
        Self(CompressedRistretto::identity().to_bytes())
    }

    pub fn from_point(point: &RistrettoPoint) -> Self {
        Self(point.compress().to_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn decompress(&self) -> Result<RistrettoPoint, ZetherError> {
        CompressedRistretto(self.0)
            .decompress()
            .ok_or(ZetherError::Decompression)
    }
}

impl Serializer for CompressedCommitment {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self(reader.read_bytes_32()?))
    }

    fn size(&self) -> usize {
        32
    }
}

impl Serialize for CompressedCommitment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'a> Deserialize<'a> for CompressedCommitment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        let decoded = hex::decode(hex).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid commitment length"))?;
        Ok(Self(bytes))
    }
}

/// Twisted ElGamal balance held by a ring member for one token.
/// Updated homomorphically by every payload the member appears in,
/// sender and decoys alike.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBalance {
    pub left: CompressedCommitment,
    pub right: CompressedCommitment,
}

impl EncryptedBalance {
    pub fn zero() -> Self {
        Self {
            left: CompressedCommitment::identity(),
            right: CompressedCommitment::identity(),
        }
    }

    // balance += (commitment, randomness)
    pub fn add(
        &self,
        commitment: &CompressedCommitment,
        randomness: &CompressedCommitment,
    ) -> Result<Self, ZetherError> {
        let left = self.left.decompress()? + commitment.decompress()?;
        let right = self.right.decompress()? + randomness.decompress()?;
        Ok(Self {
            left: CompressedCommitment::from_point(&left),
            right: CompressedCommitment::from_point(&right),
        })
    }

    // balance -= (commitment, randomness), exact inverse of add
    pub fn sub(
        &self,
        commitment: &CompressedCommitment,
        randomness: &CompressedCommitment,
    ) -> Result<Self, ZetherError> {
        let left = self.left.decompress()? - commitment.decompress()?;
        let right = self.right.decompress()? - randomness.decompress()?;
        Ok(Self {
            left: CompressedCommitment::from_point(&left),
            right: CompressedCommitment::from_point(&right),
        })
    }
}

impl Serializer for EncryptedBalance {
    fn write(&self, writer: &mut Writer) {
        self.left.write(writer);
        self.right.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            left: CompressedCommitment::read(reader)?,
            right: CompressedCommitment::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        64
    }
}

/// Public inputs of a zether payload: the ring, the resulting encrypted
/// balances, the per-member commitments and the shared randomness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub public_keys: Vec<CompressedPublicKey>,
    pub cln: Vec<CompressedCommitment>,
    pub crn: Vec<CompressedCommitment>,
    pub c: Vec<CompressedCommitment>,
    pub d: CompressedCommitment,
    pub fee: u64,
}

impl Statement {
    pub fn ring_size(&self) -> usize {
        self.public_keys.len()
    }

    // log2 of the ring size
    pub fn ring_exponent(&self) -> usize {
        self.ring_size().trailing_zeros() as usize
    }

    pub fn validate(&self) -> Result<(), ZetherError> {
        let n = self.ring_size();
        if !is_power_of_two(n) {
            return Err(ZetherError::RingSizeNotPowerOfTwo);
        }
        if !(MIN_RING_SIZE..=MAX_RING_SIZE).contains(&n) {
            return Err(ZetherError::RingSizeOutOfBounds);
        }
        if self.cln.len() != n || self.crn.len() != n || self.c.len() != n {
            return Err(ZetherError::LengthMismatch);
        }
        Ok(())
    }
}

impl Serializer for Statement {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.public_keys.len() as u64);
        for key in &self.public_keys {
            key.write(writer);
        }
        for commitment in self.cln.iter().chain(&self.crn).chain(&self.c) {
            commitment.write(writer);
        }
        self.d.write(writer);
        writer.write_uvarint(self.fee);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let n = reader.read_uvarint()? as usize;
        if !is_power_of_two(n) || !(MIN_RING_SIZE..=MAX_RING_SIZE).contains(&n) {
            return Err(ReaderError::InvalidValue);
        }

        let mut public_keys = Vec::with_capacity(n);
        for _ in 0..n {
            public_keys.push(CompressedPublicKey::read(reader)?);
        }

        let mut read_commitments =
            |reader: &mut Reader| -> Result<Vec<CompressedCommitment>, ReaderError> {
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(CompressedCommitment::read(reader)?);
                }
                Ok(items)
            };
        let cln = read_commitments(reader)?;
        let crn = read_commitments(reader)?;
        let c = read_commitments(reader)?;
        let d = CompressedCommitment::read(reader)?;
        let fee = reader.read_uvarint()?;

        Ok(Self {
            public_keys,
            cln,
            crn,
            c,
            d,
            fee,
        })
    }
}

/// Sigma protocol responses plus the aggregated range proof. The
/// verification equation itself lives behind [`ZetherVerifier`];
/// this type only knows its wire layout, which depends on the ring
/// exponent `m`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    // 2*m sigma responses
    pub f: Vec<CompressedCommitment>,
    pub z_a: CompressedCommitment,
    pub z_c: CompressedCommitment,
    pub t_1: CompressedCommitment,
    pub t_2: CompressedCommitment,
    pub tau_x: CompressedCommitment,
    pub mu: CompressedCommitment,
    // Inner product argument, fixed rounds for a 64-bit range
    pub ip_l: Vec<CompressedCommitment>,
    pub ip_r: Vec<CompressedCommitment>,
    pub a: CompressedCommitment,
    pub b: CompressedCommitment,
}

impl Proof {
    pub fn write(&self, writer: &mut Writer) {
        for item in &self.f {
            item.write(writer);
        }
        self.z_a.write(writer);
        self.z_c.write(writer);
        self.t_1.write(writer);
        self.t_2.write(writer);
        self.tau_x.write(writer);
        self.mu.write(writer);
        for item in self.ip_l.iter().chain(&self.ip_r) {
            item.write(writer);
        }
        self.a.write(writer);
        self.b.write(writer);
    }

    // The layout depends on the ring exponent, read is not part of
    // the blanket Serializer trait
    pub fn read(reader: &mut Reader, m: usize) -> Result<Self, ReaderError> {
        let mut read_n =
            |reader: &mut Reader, n: usize| -> Result<Vec<CompressedCommitment>, ReaderError> {
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(CompressedCommitment::read(reader)?);
                }
                Ok(items)
            };

        let f = read_n(reader, 2 * m)?;
        let z_a = CompressedCommitment::read(reader)?;
        let z_c = CompressedCommitment::read(reader)?;
        let t_1 = CompressedCommitment::read(reader)?;
        let t_2 = CompressedCommitment::read(reader)?;
        let tau_x = CompressedCommitment::read(reader)?;
        let mu = CompressedCommitment::read(reader)?;
        let ip_l = read_n(reader, IP_ROUNDS)?;
        let ip_r = read_n(reader, IP_ROUNDS)?;
        let a = CompressedCommitment::read(reader)?;
        let b = CompressedCommitment::read(reader)?;

        Ok(Self {
            f,
            z_a,
            z_c,
            t_1,
            t_2,
            tau_x,
            mu,
            ip_l,
            ip_r,
            a,
            b,
        })
    }

    pub fn size(&self) -> usize {
        32 * (self.f.len() + self.ip_l.len() + self.ip_r.len() + 8)
    }

    // Zeroed proof of the right shape for a ring of 2^m members,
    // used by tests and the builder before proving
    pub fn empty(m: usize) -> Self {
        let zero = CompressedCommitment::identity;
        Self {
            f: (0..2 * m).map(|_| zero()).collect(),
            z_a: zero(),
            z_c: zero(),
            t_1: zero(),
            t_2: zero(),
            tau_x: zero(),
            mu: zero(),
            ip_l: (0..IP_ROUNDS).map(|_| zero()).collect(),
            ip_r: (0..IP_ROUNDS).map(|_| zero()).collect(),
            a: zero(),
            b: zero(),
        }
    }
}

/// Context the proof is bound to
pub struct ProofContext<'a> {
    pub hash: &'a Hash,
    pub height: u64,
    pub burn_value: u64,
}

/// Seam for the pairing-based Sigma/Bulletproof verification.
/// Injected at construction so the state machine never depends on
/// the curve backend.
pub trait ZetherVerifier: Send + Sync {
    fn verify(&self, statement: &Statement, proof: &Proof, context: &ProofContext<'_>) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
    use curve25519_dalek::scalar::Scalar;

    #[test]
    fn test_is_power_of_two() {
        assert!(is_power_of_two(2));
        assert!(is_power_of_two(128));
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(3));
        assert!(!is_power_of_two(255));
    }

    #[test]
    fn test_encrypted_balance_add_sub_symmetry() {
        let commitment =
            CompressedCommitment::from_point(&(RISTRETTO_BASEPOINT_POINT * Scalar::from(7u64)));
        let randomness =
            CompressedCommitment::from_point(&(RISTRETTO_BASEPOINT_POINT * Scalar::from(11u64)));

        let balance = EncryptedBalance::zero();
        let updated = balance.add(&commitment, &randomness).unwrap();
        assert_ne!(updated, balance);

        let restored = updated.sub(&commitment, &randomness).unwrap();
        assert_eq!(restored, balance);
    }

    #[test]
    fn test_proof_round_trip_depends_on_exponent() {
        let m = 4;
        let proof = Proof::empty(m);
        let bytes = proof.to_bytes_with_exponent();

        let mut reader = Reader::new(&bytes);
        let read = Proof::read(&mut reader, m).unwrap();
        assert_eq!(read, proof);
        assert_eq!(reader.size(), 0);
        assert_eq!(bytes.len(), proof.size());
    }

    impl Proof {
        fn to_bytes_with_exponent(&self) -> Vec<u8> {
            let mut buffer = Vec::new();
            let mut writer = Writer::new(&mut buffer);
            self.write(&mut writer);
            buffer
        }
    }
}
