mod extra;
mod parts;

pub use extra::{DelegateExtra, SimpleExtra, UnstakeExtra, WithdrawExtra};
pub use parts::{SimpleInput, SimpleOutput};

use crate::{
    account::Nonce,
    config::{MAX_VIN_COUNT, MAX_VOUT_COUNT, NATIVE_TOKEN},
    crypto::Hash,
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
    token::TokenHash,
    transaction::{state::ChainState, TransactionError},
    utils::{checked_map_add, checked_map_sub},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transparent transaction: spends from signed inputs to public key
/// hash outputs, with an optional staking script on the first input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSimple {
    pub nonce: Nonce,
    pub vin: Vec<SimpleInput>,
    pub vout: Vec<SimpleOutput>,
    pub extra: SimpleExtra,
}

impl TransactionSimple {
    pub fn get_script(&self) -> u8 {
        self.extra.script()
    }

    pub fn validate(&self) -> Result<(), TransactionError> {
        match &self.extra {
            SimpleExtra::Normal => {
                if self.vin.is_empty() || self.vin.len() > MAX_VIN_COUNT {
                    return Err(TransactionError::InvalidVin);
                }
                if self.vout.is_empty() || self.vout.len() > MAX_VOUT_COUNT {
                    return Err(TransactionError::InvalidVout);
                }
            }
            _ => {
                if self.vin.len() != 1 {
                    return Err(TransactionError::InvalidVin);
                }
                if !self.vout.is_empty() {
                    return Err(TransactionError::InvalidVout);
                }
            }
        }

        for vout in &self.vout {
            if vout.amount == 0 {
                return Err(TransactionError::ZeroAmount);
            }
        }

        self.extra.validate()?;

        // the declared flows must balance per token
        self.compute_fees()?;
        Ok(())
    }

    /// Per-token fee: what the inputs declare minus what the outputs
    /// receive, plus the stake-funded fee extras. Rejects flows that
    /// do not balance.
    pub fn compute_fees(&self) -> Result<HashMap<TokenHash, u64>, TransactionError> {
        let mut fees = HashMap::new();
        for vin in &self.vin {
            checked_map_add(&mut fees, vin.token.clone(), vin.amount)
                .ok_or(TransactionError::Overflow)?;
        }
        for vout in &self.vout {
            checked_map_sub(&mut fees, &vout.token, vout.amount)
                .ok_or(TransactionError::FeeUnderflow)?;
        }

        match &self.extra {
            SimpleExtra::Unstake(extra) => {
                checked_map_add(&mut fees, NATIVE_TOKEN, extra.fee_extra)
                    .ok_or(TransactionError::Overflow)?;
            }
            SimpleExtra::Withdraw(extra) => {
                checked_map_add(&mut fees, NATIVE_TOKEN, extra.fee_extra)
                    .ok_or(TransactionError::Overflow)?;
            }
            _ => {}
        }

        Ok(fees)
    }

    // Every input key must have signed the transaction
    pub fn verify_signatures(&self, hash: &Hash) -> bool {
        if self.vin.is_empty() {
            return false;
        }

        self.vin.iter().all(|vin| {
            vin.public_key
                .decompress()
                .map(|key| vin.signature.verify(hash.as_bytes(), &key))
                .unwrap_or(false)
        })
    }

    /// Apply to the state at `height`. Per input: load, refresh
    /// stake, nonce check and script extra on the first, then debit.
    /// Per output: load, refresh, credit.
    pub fn include<S: ChainState>(
        &self,
        height: u64,
        state: &mut S,
    ) -> Result<(), TransactionError> {
        for (i, vin) in self.vin.iter().enumerate() {
            let key = vin.get_public_key_hash();
            let mut account = state.get_account_or_create(&key)?;
            account.refresh_delegated_stake(height);

            if i == 0 {
                account.check_and_increment_nonce(self.nonce)?;
                self.extra.include_vin0(height, &mut account)?;
            }

            account.sub_balance(&vin.token, vin.amount)?;
            state.update_account(&key, account)?;
        }

        for vout in &self.vout {
            let mut account = state.get_account_or_create(&vout.public_key_hash)?;
            account.refresh_delegated_stake(height);
            account.add_balance(&vout.token, vout.amount)?;
            state.update_account(&vout.public_key_hash, account)?;
        }

        Ok(())
    }

    /// Exact inverse of `include` at the same height
    pub fn remove<S: ChainState>(
        &self,
        height: u64,
        state: &mut S,
    ) -> Result<(), TransactionError> {
        for vout in self.vout.iter().rev() {
            let mut account = state.get_account_or_create(&vout.public_key_hash)?;
            account.sub_balance(&vout.token, vout.amount)?;
            state.update_account(&vout.public_key_hash, account)?;
        }

        for (i, vin) in self.vin.iter().enumerate().rev() {
            let key = vin.get_public_key_hash();
            let mut account = state.get_account_or_create(&key)?;
            account.add_balance(&vin.token, vin.amount)?;

            if i == 0 {
                self.extra.remove_vin0(height, &mut account)?;
                account.decrement_nonce()?;
            }

            state.update_account(&key, account)?;
        }

        Ok(())
    }

    pub fn write_with_signature(&self, writer: &mut Writer, incl_signature: bool) {
        writer.write_uvarint(self.extra.script() as u64);
        writer.write_uvarint(self.nonce);

        writer.write_uvarint(self.vin.len() as u64);
        for vin in &self.vin {
            vin.write_with_signature(writer, incl_signature);
        }

        writer.write_uvarint(self.vout.len() as u64);
        for vout in &self.vout {
            vout.write(writer);
        }

        self.extra.write(writer);
    }
}

impl Serializer for TransactionSimple {
    fn write(&self, writer: &mut Writer) {
        self.write_with_signature(writer, true);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let script = reader.read_uvarint()?;
        if script > 3 {
            return Err(ReaderError::InvalidValue);
        }
        let nonce = reader.read_uvarint()?;

        let vin_count = reader.read_uvarint()? as usize;
        if vin_count > MAX_VIN_COUNT {
            return Err(ReaderError::InvalidSize);
        }
        let mut vin = Vec::with_capacity(vin_count);
        for _ in 0..vin_count {
            vin.push(SimpleInput::read(reader)?);
        }

        let vout_count = reader.read_uvarint()? as usize;
        if vout_count > MAX_VOUT_COUNT {
            return Err(ReaderError::InvalidSize);
        }
        let mut vout = Vec::with_capacity(vout_count);
        for _ in 0..vout_count {
            vout.push(SimpleOutput::read(reader)?);
        }

        let extra = SimpleExtra::read_for_script(script as u8, reader)?;

        Ok(Self {
            nonce,
            vin,
            vout,
            extra,
        })
    }

    fn size(&self) -> usize {
        uvarint_size(self.extra.script() as u64)
            + uvarint_size(self.nonce)
            + uvarint_size(self.vin.len() as u64)
            + self.vin.iter().map(|v| v.size()).sum::<usize>()
            + uvarint_size(self.vout.len() as u64)
            + self.vout.iter().map(|v| v.size()).sum::<usize>()
            + self.extra.size()
    }
}
