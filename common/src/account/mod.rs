mod delegated_stake;
mod ring;

pub use delegated_stake::{DelegatedStake, PendingUnstake, StakeError};
pub use ring::RingMember;

use crate::{
    config::NATIVE_TOKEN,
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
    token::TokenHash,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Nonce = u64;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Balance overflow")]
    Overflow,
    #[error("Insufficient balance: need {need}, have {have}")]
    Insufficient { need: u64, have: u64 },
    #[error("Account nonce doesn't match: expected {expected}, got {got}")]
    NonceMismatch { expected: Nonce, got: Nonce },
    #[error("Account nonce underflow")]
    NonceUnderflow,
    #[error("Account has no delegated stake")]
    NoDelegatedStake,
    #[error(transparent)]
    Stake(#[from] StakeError),
}

/// Transparent account, keyed by 20-byte public key hash. Created on
/// first credit and never destroyed. Every balance entry is strictly
/// positive: crediting creates the entry, debiting to zero removes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Account {
    nonce: Nonce,
    balances: IndexMap<TokenHash, u64>,
    delegated_stake: Option<DelegatedStake>,
}

impl Account {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_nonce(&self) -> Nonce {
        self.nonce
    }

    // Require the transaction nonce to match, then advance
    pub fn check_and_increment_nonce(&mut self, nonce: Nonce) -> Result<(), AccountError> {
        if self.nonce != nonce {
            return Err(AccountError::NonceMismatch {
                expected: self.nonce,
                got: nonce,
            });
        }
        self.nonce += 1;
        Ok(())
    }

    // Inverse of check_and_increment_nonce, used when a block is removed
    pub fn decrement_nonce(&mut self) -> Result<(), AccountError> {
        self.nonce = self
            .nonce
            .checked_sub(1)
            .ok_or(AccountError::NonceUnderflow)?;
        Ok(())
    }

    pub fn get_balance(&self, token: &TokenHash) -> u64 {
        self.balances.get(token).copied().unwrap_or(0)
    }

    pub fn get_balances(&self) -> &IndexMap<TokenHash, u64> {
        &self.balances
    }

    pub fn add_balance(&mut self, token: &TokenHash, amount: u64) -> Result<(), AccountError> {
        if amount == 0 {
            return Ok(());
        }

        let balance = self.balances.entry(token.clone()).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(AccountError::Overflow)?;
        Ok(())
    }

    pub fn sub_balance(&mut self, token: &TokenHash, amount: u64) -> Result<(), AccountError> {
        if amount == 0 {
            return Ok(());
        }

        let balance = self
            .balances
            .get_mut(token)
            .ok_or(AccountError::Insufficient {
                need: amount,
                have: 0,
            })?;
        *balance = balance.checked_sub(amount).ok_or(AccountError::Insufficient {
            need: amount,
            have: *balance,
        })?;

        if *balance == 0 {
            self.balances.shift_remove(token);
        }
        Ok(())
    }

    pub fn get_delegated_stake(&self) -> Option<&DelegatedStake> {
        self.delegated_stake.as_ref()
    }

    pub fn get_delegated_stake_mut(&mut self) -> Result<&mut DelegatedStake, AccountError> {
        self.delegated_stake
            .as_mut()
            .ok_or(AccountError::NoDelegatedStake)
    }

    pub fn set_delegated_stake(&mut self, stake: DelegatedStake) {
        self.delegated_stake = Some(stake);
    }

    pub fn clear_delegated_stake(&mut self) {
        self.delegated_stake = None;
    }

    // Stake weight considered by the forging target check
    pub fn get_staking_amount(&self) -> u64 {
        self.delegated_stake
            .as_ref()
            .map(|s| s.stake_available)
            .unwrap_or(0)
    }

    /// Consolidate matured unstake entries. Must be invoked with the
    /// current block height before any read of the staking fields.
    pub fn refresh_delegated_stake(&mut self, height: u64) {
        if let Some(stake) = self.delegated_stake.as_mut() {
            stake.refresh(height);
        }
    }

    // Claim matured unstake funds into the native balance
    pub fn claim_matured_unstake(&mut self, amount: u64, height: u64) -> Result<(), AccountError> {
        self.get_delegated_stake_mut()?.sub_matured(amount, height)?;
        self.add_balance(&NATIVE_TOKEN, amount)
    }

    // Inverse of claim_matured_unstake at the same height
    pub fn revert_matured_unstake(&mut self, amount: u64, height: u64) -> Result<(), AccountError> {
        self.sub_balance(&NATIVE_TOKEN, amount)?;
        self.get_delegated_stake_mut()?
            .add_unstake_pending(amount, height);
        Ok(())
    }
}

impl Serializer for Account {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.nonce);
        writer.write_uvarint(self.balances.len() as u64);
        for (token, amount) in &self.balances {
            token.write(writer);
            writer.write_uvarint(*amount);
        }
        self.delegated_stake.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let nonce = reader.read_uvarint()?;
        let count = reader.read_uvarint()?;
        if count > reader.size() as u64 {
            return Err(ReaderError::InvalidSize);
        }

        let mut balances = IndexMap::with_capacity(count as usize);
        for _ in 0..count {
            let token = TokenHash::read(reader)?;
            let amount = reader.read_uvarint()?;
            // zero entries are never stored
            if amount == 0 {
                return Err(ReaderError::InvalidValue);
            }
            if balances.insert(token, amount).is_some() {
                return Err(ReaderError::InvalidValue);
            }
        }

        let delegated_stake = Option::read(reader)?;

        Ok(Self {
            nonce,
            balances,
            delegated_stake,
        })
    }

    fn size(&self) -> usize {
        uvarint_size(self.nonce)
            + uvarint_size(self.balances.len() as u64)
            + self
                .balances
                .iter()
                .map(|(token, amount)| token.size() + uvarint_size(*amount))
                .sum::<usize>()
            + self.delegated_stake.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyPair, PublicKeyHash};

    fn token(byte: u8) -> TokenHash {
        PublicKeyHash::new([byte; 20])
    }

    #[test]
    fn test_balance_entry_removed_at_zero() {
        let mut account = Account::new();
        account.add_balance(&token(1), 100).unwrap();
        assert_eq!(account.get_balance(&token(1)), 100);

        account.sub_balance(&token(1), 100).unwrap();
        assert_eq!(account.get_balance(&token(1)), 0);
        assert!(account.get_balances().is_empty());
    }

    #[test]
    fn test_sub_balance_insufficient() {
        let mut account = Account::new();
        account.add_balance(&token(1), 10).unwrap();
        assert!(account.sub_balance(&token(1), 11).is_err());
        assert!(account.sub_balance(&token(2), 1).is_err());
    }

    #[test]
    fn test_balance_overflow_rejected() {
        let mut account = Account::new();
        account.add_balance(&token(1), u64::MAX).unwrap();
        assert!(account.add_balance(&token(1), 1).is_err());
    }

    #[test]
    fn test_nonce_check() {
        let mut account = Account::new();
        assert!(account.check_and_increment_nonce(1).is_err());
        account.check_and_increment_nonce(0).unwrap();
        assert_eq!(account.get_nonce(), 1);

        account.decrement_nonce().unwrap();
        assert_eq!(account.get_nonce(), 0);
    }

    #[test]
    fn test_serializer_round_trip() {
        let mut account = Account::new();
        account.check_and_increment_nonce(0).unwrap();
        account.add_balance(&NATIVE_TOKEN, 12345).unwrap();
        account.add_balance(&token(7), 999).unwrap();

        let mut stake = DelegatedStake::new(KeyPair::new().get_public_key().compress(), 50);
        stake.add_stake_available(500).unwrap();
        stake.add_unstake_pending(100, 64);
        account.set_delegated_stake(stake);

        let bytes = account.to_bytes();
        assert_eq!(bytes.len(), account.size());
        assert_eq!(Account::from_bytes(&bytes).unwrap(), account);
    }
}
