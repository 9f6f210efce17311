use super::{
    key::{CompressedPublicKey, PrivateKey},
    PublicKeyHash,
};
use crate::serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// An integrated payment id is either absent or exactly 8 bytes
pub const PAYMENT_ID_SIZE: usize = 8;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Invalid payment id size")]
    InvalidPaymentId,
}

/// Public address: the recipient key plus optional requested amount
/// and integrated payment id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    public_key: CompressedPublicKey,
    amount: u64,
    payment_id: Vec<u8>,
}

impl Address {
    pub fn new(
        public_key: CompressedPublicKey,
        amount: u64,
        payment_id: Vec<u8>,
    ) -> Result<Self, AddressError> {
        if !payment_id.is_empty() && payment_id.len() != PAYMENT_ID_SIZE {
            return Err(AddressError::InvalidPaymentId);
        }

        Ok(Self {
            public_key,
            amount,
            payment_id,
        })
    }

    pub fn get_public_key(&self) -> &CompressedPublicKey {
        &self.public_key
    }

    pub fn get_public_key_hash(&self) -> PublicKeyHash {
        self.public_key.to_public_key_hash()
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_payment_id(&self) -> &[u8] {
        &self.payment_id
    }
}

impl PrivateKey {
    // Derive the public address for this key
    pub fn to_address(&self, amount: u64, payment_id: Vec<u8>) -> Result<Address, AddressError> {
        Address::new(self.to_public_key().compress(), amount, payment_id)
    }
}

impl Serializer for Address {
    fn write(&self, writer: &mut Writer) {
        self.public_key.write(writer);
        writer.write_uvarint(self.amount);
        writer.write_var_bytes(&self.payment_id);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let public_key = CompressedPublicKey::read(reader)?;
        let amount = reader.read_uvarint()?;
        let payment_id = reader.read_var_bytes(PAYMENT_ID_SIZE)?;
        if !payment_id.is_empty() && payment_id.len() != PAYMENT_ID_SIZE {
            return Err(ReaderError::InvalidSize);
        }

        Ok(Self {
            public_key,
            amount,
            payment_id,
        })
    }

    fn size(&self) -> usize {
        self.public_key.size()
            + uvarint_size(self.amount)
            + uvarint_size(self.payment_id.len() as u64)
            + self.payment_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_generated_address_round_trip() {
        let keypair = KeyPair::new();
        let address = keypair
            .get_private_key()
            .to_address(0, Vec::new())
            .unwrap();

        assert_eq!(address.get_public_key_hash().as_bytes().len(), 20);
        assert_eq!(address.get_amount(), 0);
        assert!(address.get_payment_id().is_empty());

        let bytes = address.to_bytes();
        assert_eq!(bytes.len(), address.size());
        let read = Address::from_bytes(&bytes).unwrap();
        assert_eq!(read, address);
    }

    #[test]
    fn test_address_with_amount_and_payment_id() {
        let keypair = KeyPair::new();
        let address = keypair
            .get_private_key()
            .to_address(20, vec![1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();

        assert_eq!(address.get_amount(), 20);
        assert_eq!(address.get_payment_id().len(), PAYMENT_ID_SIZE);

        let read = Address::from_bytes(&address.to_bytes()).unwrap();
        assert_eq!(read, address);
    }

    #[test]
    fn test_invalid_payment_id_rejected() {
        let keypair = KeyPair::new();
        assert!(keypair
            .get_private_key()
            .to_address(0, vec![1, 2, 3])
            .is_err());
    }
}
