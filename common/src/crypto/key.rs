use super::{
    hash::{hash, PublicKeyHash, PUBLIC_KEY_HASH_SIZE},
    signature::{hash_and_point_to_scalar, Signature},
};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT,
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use rand::rngs::OsRng;
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Error as FmtError, Formatter};
use zeroize::Zeroize;

pub const KEY_SIZE: usize = 32;

// Decompressed form, used for curve arithmetic
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PublicKey(RistrettoPoint);

impl PublicKey {
    pub fn new(point: RistrettoPoint) -> Self {
        Self(point)
    }

    pub fn as_point(&self) -> &RistrettoPoint {
        &self.0
    }

    pub fn compress(&self) -> CompressedPublicKey {
        CompressedPublicKey::new(self.0.compress())
    }
}

// Wire form of a public key, 32 bytes
#[derive(Clone, PartialEq, Eq, Debug, std::hash::Hash, PartialOrd, Ord)]
pub struct CompressedPublicKey([u8; KEY_SIZE]);

impl CompressedPublicKey {
    pub fn new(point: CompressedRistretto) -> Self {
        Self(point.to_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReaderError> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| ReaderError::InvalidSize)?;
        Ok(Self(bytes))
    }

    // Compressed identity point, used as a placeholder key
    pub const fn zero() -> Self {
        Self([0u8; KEY_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn decompress(&self) -> Option<PublicKey> {
        CompressedRistretto(self.0).decompress().map(PublicKey)
    }

    // Short hash keying the transparent account map
    pub fn to_public_key_hash(&self) -> PublicKeyHash {
        let digest = hash(&self.0);
        let mut bytes = [0u8; PUBLIC_KEY_HASH_SIZE];
        bytes.copy_from_slice(&digest.as_bytes()[..PUBLIC_KEY_HASH_SIZE]);
        PublicKeyHash::new(bytes)
    }
}

impl Display for CompressedPublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serializer for CompressedPublicKey {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let bytes = reader.read_bytes_32()?;
        Ok(Self(bytes))
    }

    fn size(&self) -> usize {
        KEY_SIZE
    }
}

impl Serialize for CompressedPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'a> Deserialize<'a> for CompressedPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        let decoded = hex::decode(hex).map_err(SerdeError::custom)?;
        CompressedPublicKey::from_bytes(&decoded)
            .map_err(|_| SerdeError::custom("Invalid public key length"))
    }
}

#[derive(Clone, Zeroize)]
pub struct PrivateKey(Scalar);

impl PrivateKey {
    pub fn new(scalar: Scalar) -> Self {
        Self(scalar)
    }

    pub fn generate() -> Self {
        Self(Scalar::random(&mut OsRng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReaderError> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| ReaderError::InvalidSize)?;
        let scalar = Scalar::from_canonical_bytes(bytes)
            .into_option()
            .ok_or(ReaderError::InvalidValue)?;
        Ok(Self(scalar))
    }

    pub fn as_scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_public_key(&self) -> PublicKey {
        PublicKey(RISTRETTO_BASEPOINT_POINT * self.0)
    }

    // Schnorr signature over the message bytes
    pub fn sign(&self, message: &[u8]) -> Signature {
        let k = Scalar::random(&mut OsRng);
        let r = RISTRETTO_BASEPOINT_POINT * k;
        let public = self.to_public_key();
        let e = hash_and_point_to_scalar(&public.compress(), message, &r);
        let s = k + e * self.0;
        Signature::new(s, e)
    }
}

pub struct KeyPair {
    public_key: PublicKey,
    private_key: PrivateKey,
}

impl KeyPair {
    pub fn new() -> Self {
        let private_key = PrivateKey::generate();
        let public_key = private_key.to_public_key();
        Self {
            public_key,
            private_key,
        }
    }

    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.to_public_key();
        Self {
            public_key,
            private_key,
        }
    }

    pub fn get_public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn get_private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.private_key.sign(message)
    }
}

impl Default for KeyPair {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::new();
        let signature = keypair.sign(b"message");
        assert!(signature.verify(b"message", keypair.get_public_key()));
        assert!(!signature.verify(b"other message", keypair.get_public_key()));
    }

    #[test]
    fn test_compressed_round_trip() {
        let keypair = KeyPair::new();
        let compressed = keypair.get_public_key().compress();
        let bytes = compressed.to_bytes();
        assert_eq!(bytes.len(), KEY_SIZE);

        let read = CompressedPublicKey::from_bytes(&bytes).unwrap();
        assert_eq!(read, compressed);
        assert_eq!(read.decompress().unwrap(), *keypair.get_public_key());
    }

    #[test]
    fn test_public_key_hash_is_20_bytes() {
        let keypair = KeyPair::new();
        let pkh = keypair.get_public_key().compress().to_public_key_hash();
        assert_eq!(pkh.as_bytes().len(), 20);
    }

    #[test]
    fn test_private_key_round_trip() {
        let keypair = KeyPair::new();
        let bytes = keypair.get_private_key().to_bytes();
        let restored = PrivateKey::from_bytes(&bytes).unwrap();
        assert_eq!(
            restored.to_public_key().compress(),
            keypair.get_public_key().compress()
        );
    }
}
