use crate::{
    crypto::zether::EncryptedBalance,
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
    token::TokenHash,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// State of a registered ring public key. Existence in the
/// registrations map is what "registered" means; balances start at
/// the zero ciphertext and move homomorphically with every payload
/// the key appears in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RingMember {
    balances: IndexMap<TokenHash, EncryptedBalance>,
}

impl RingMember {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_balance(&self, token: &TokenHash) -> EncryptedBalance {
        self.balances
            .get(token)
            .cloned()
            .unwrap_or_else(EncryptedBalance::zero)
    }

    // The zero ciphertext is never stored, mirroring the rule that
    // transparent balance entries are strictly positive
    pub fn set_balance(&mut self, token: &TokenHash, balance: EncryptedBalance) {
        if balance == EncryptedBalance::zero() {
            self.balances.shift_remove(token);
        } else {
            self.balances.insert(token.clone(), balance);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

impl Serializer for RingMember {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.balances.len() as u64);
        for (token, balance) in &self.balances {
            token.write(writer);
            balance.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let count = reader.read_uvarint()?;
        if count > reader.size() as u64 {
            return Err(ReaderError::InvalidSize);
        }

        let mut balances = IndexMap::with_capacity(count as usize);
        for _ in 0..count {
            let token = TokenHash::read(reader)?;
            let balance = EncryptedBalance::read(reader)?;
            if balances.insert(token, balance).is_some() {
                return Err(ReaderError::InvalidValue);
            }
        }
        Ok(Self { balances })
    }

    fn size(&self) -> usize {
        uvarint_size(self.balances.len() as u64)
            + self
                .balances
                .iter()
                .map(|(token, balance)| token.size() + balance.size())
                .sum::<usize>()
    }
}
