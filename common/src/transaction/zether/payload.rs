use crate::{
    config::PAYLOAD_EXTRA_DATA_LIMIT,
    crypto::zether::{Proof, Statement},
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
    token::TokenHash,
    transaction::{state::ChainState, TransactionError},
};
use serde::{Deserialize, Serialize};

/// One anonymous transfer over a ring. The statement carries the
/// public inputs, the proof attests to them, and the commitment
/// vector moves every ring member's encrypted balance so sender and
/// decoys are indistinguishable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZetherPayload {
    pub token: TokenHash,
    pub burn_value: u64,
    pub extra_type: u8,
    pub extra_data: Vec<u8>,
    pub statement: Statement,
    pub proof: Proof,
}

impl ZetherPayload {
    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.extra_data.len() > PAYLOAD_EXTRA_DATA_LIMIT {
            return Err(TransactionError::InvalidExtra);
        }
        self.statement.validate()?;

        // the proof must be shaped for this ring
        if self.proof.f.len() != 2 * self.statement.ring_exponent() {
            return Err(TransactionError::InvalidProofShape);
        }
        Ok(())
    }

    /// Move every ring member's encrypted balance by the commitment
    /// vector. Members must already exist (registered beforehand or by
    /// a registration in the same transaction).
    pub fn include<S: ChainState>(&self, state: &mut S) -> Result<(), TransactionError> {
        for (i, key) in self.statement.public_keys.iter().enumerate() {
            let mut member = state
                .get_ring_member(key)?
                .ok_or(TransactionError::RingMemberNotRegistered)?;

            let balance = member.get_balance(&self.token);
            let updated = balance.add(&self.statement.c[i], &self.statement.d)?;
            member.set_balance(&self.token, updated);
            state.update_ring_member(key, member)?;
        }
        Ok(())
    }

    /// Exact inverse of `include`
    pub fn remove<S: ChainState>(&self, state: &mut S) -> Result<(), TransactionError> {
        for (i, key) in self.statement.public_keys.iter().enumerate().rev() {
            let mut member = state
                .get_ring_member(key)?
                .ok_or(TransactionError::RingMemberNotRegistered)?;

            let balance = member.get_balance(&self.token);
            let restored = balance.sub(&self.statement.c[i], &self.statement.d)?;
            member.set_balance(&self.token, restored);
            state.update_ring_member(key, member)?;
        }
        Ok(())
    }

    pub fn write_with_proof(&self, writer: &mut Writer, incl_proof: bool) {
        self.token.write(writer);
        writer.write_uvarint(self.burn_value);
        writer.write_u8(self.extra_type);
        writer.write_var_bytes(&self.extra_data);
        self.statement.write(writer);
        if incl_proof {
            self.proof.write(writer);
        }
    }
}

impl Serializer for ZetherPayload {
    fn write(&self, writer: &mut Writer) {
        self.write_with_proof(writer, true);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let token = TokenHash::read(reader)?;
        let burn_value = reader.read_uvarint()?;
        let extra_type = reader.read_u8()?;
        let extra_data = reader.read_var_bytes(PAYLOAD_EXTRA_DATA_LIMIT)?;
        let statement = Statement::read(reader)?;

        // proof layout depends on the ring size read above
        let proof = Proof::read(reader, statement.ring_exponent())?;

        Ok(Self {
            token,
            burn_value,
            extra_type,
            extra_data,
            statement,
            proof,
        })
    }

    fn size(&self) -> usize {
        self.token.size()
            + uvarint_size(self.burn_value)
            + 1
            + uvarint_size(self.extra_data.len() as u64)
            + self.extra_data.len()
            + self.statement.size()
            + self.proof.size()
    }
}
