use super::key::{CompressedPublicKey, PublicKey};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use curve25519_dalek::{constants::RISTRETTO_BASEPOINT_POINT, RistrettoPoint, Scalar};
use serde::{de::Error, Deserialize, Serialize};
use sha3::{Digest, Sha3_512};

const SCALAR_SIZE: usize = 32;

pub const SIGNATURE_SIZE: usize = SCALAR_SIZE * 2;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Signature {
    s: Scalar,
    e: Scalar,
}

impl Signature {
    pub fn new(s: Scalar, e: Scalar) -> Self {
        Self { s, e }
    }

    // Placeholder used while building, before the real signature is set
    pub fn zero() -> Self {
        Self {
            s: Scalar::ZERO,
            e: Scalar::ZERO,
        }
    }

    // Verify the signature using the public key and the message bytes
    pub fn verify(&self, message: &[u8], key: &PublicKey) -> bool {
        let r = RISTRETTO_BASEPOINT_POINT * self.s + key.as_point() * -self.e;
        let calculated = hash_and_point_to_scalar(&key.compress(), message, &r);
        self.e == calculated
    }
}

// Create a Scalar from public key, message, and selected point
pub fn hash_and_point_to_scalar(
    key: &CompressedPublicKey,
    message: &[u8],
    point: &RistrettoPoint,
) -> Scalar {
    let mut hasher = Sha3_512::new();
    hasher.update(key.as_bytes());
    hasher.update(message);
    hasher.update(point.compress().as_bytes());

    let hash = hasher.finalize();
    Scalar::from_bytes_mod_order_wide(&hash.into())
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

impl Serializer for Signature {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.s.to_bytes());
        writer.write_bytes(&self.e.to_bytes());
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let s_bytes = reader.read_bytes_32()?;
        let e_bytes = reader.read_bytes_32()?;

        let s = Scalar::from_canonical_bytes(s_bytes)
            .into_option()
            .ok_or(ReaderError::InvalidValue)?;
        let e = Scalar::from_canonical_bytes(e_bytes)
            .into_option()
            .ok_or(ReaderError::InvalidValue)?;
        Ok(Signature::new(s, e))
    }

    fn size(&self) -> usize {
        SIGNATURE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_signature_serializer_round_trip() {
        let keypair = KeyPair::new();
        let signature = keypair.sign(b"round trip");
        let bytes = signature.to_bytes();
        assert_eq!(bytes.len(), SIGNATURE_SIZE);

        let read = Signature::from_bytes(&bytes).unwrap();
        assert_eq!(read, signature);
        assert!(read.verify(b"round trip", keypair.get_public_key()));
    }
}
