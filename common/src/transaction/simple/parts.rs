use crate::{
    crypto::{CompressedPublicKey, PublicKeyHash, Signature},
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
    token::TokenHash,
};
use serde::{Deserialize, Serialize};

/// Spend from a transparent account. The key is carried in full so
/// the validator can check the signature; the account map is keyed by
/// its 20-byte hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleInput {
    pub public_key: CompressedPublicKey,
    pub amount: u64,
    pub token: TokenHash,
    pub signature: Signature,
}

impl SimpleInput {
    pub fn get_public_key_hash(&self) -> PublicKeyHash {
        self.public_key.to_public_key_hash()
    }

    pub fn write_with_signature(&self, writer: &mut Writer, incl_signature: bool) {
        self.public_key.write(writer);
        writer.write_uvarint(self.amount);
        self.token.write(writer);
        if incl_signature {
            self.signature.write(writer);
        }
    }
}

impl Serializer for SimpleInput {
    fn write(&self, writer: &mut Writer) {
        self.write_with_signature(writer, true);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            public_key: CompressedPublicKey::read(reader)?,
            amount: reader.read_uvarint()?,
            token: TokenHash::read(reader)?,
            signature: Signature::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.public_key.size()
            + uvarint_size(self.amount)
            + self.token.size()
            + self.signature.size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleOutput {
    pub public_key_hash: PublicKeyHash,
    pub amount: u64,
    pub token: TokenHash,
}

impl Serializer for SimpleOutput {
    fn write(&self, writer: &mut Writer) {
        self.public_key_hash.write(writer);
        writer.write_uvarint(self.amount);
        self.token.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            public_key_hash: PublicKeyHash::read(reader)?,
            amount: reader.read_uvarint()?,
            token: TokenHash::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.public_key_hash.size() + uvarint_size(self.amount) + self.token.size()
    }
}
