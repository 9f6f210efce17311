use crate::{
    crypto::Signature,
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
};
use serde::{Deserialize, Serialize};

/// Self-registration of a ring public key, piggybacked on the
/// transaction that first uses it. The index points into the
/// concatenation of all payload rings; the signature is made by the
/// registered key over the transaction signing hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZetherRegistration {
    pub public_key_index: u64,
    pub signature: Signature,
}

impl Serializer for ZetherRegistration {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.public_key_index);
        self.signature.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            public_key_index: reader.read_uvarint()?,
            signature: Signature::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        uvarint_size(self.public_key_index) + self.signature.size()
    }
}
