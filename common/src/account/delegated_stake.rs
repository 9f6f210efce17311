use crate::{
    crypto::CompressedPublicKey,
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StakeError {
    #[error("Stake overflow")]
    Overflow,
    #[error("Insufficient stake: need {need}, have {have}")]
    Insufficient { need: u64, have: u64 },
    #[error("Insufficient matured unstake: need {need}, have {have}")]
    InsufficientMatured { need: u64, have: u64 },
    #[error("No pending unstake entry matches")]
    NoMatchingEntry,
}

/// One scheduled exit from stake. Spendable again once
/// `release_height` is reached and a withdraw claims it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUnstake {
    pub release_height: u64,
    pub amount: u64,
}

impl Serializer for PendingUnstake {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.release_height);
        writer.write_uvarint(self.amount);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            release_height: reader.read_uvarint()?,
            amount: reader.read_uvarint()?,
        })
    }

    fn size(&self) -> usize {
        uvarint_size(self.release_height) + uvarint_size(self.amount)
    }
}

/// Staking state of an account. `unstake_pending` is kept ordered by
/// release height; matured entries are consolidated (never silently
/// spent) by `refresh` so that apply and remove observe the same
/// entry layout at a given height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedStake {
    pub delegate_public_key: CompressedPublicKey,
    pub delegate_fee: u64,
    pub stake_available: u64,
    pub unstake_pending: Vec<PendingUnstake>,
}

impl DelegatedStake {
    pub fn new(delegate_public_key: CompressedPublicKey, delegate_fee: u64) -> Self {
        Self {
            delegate_public_key,
            delegate_fee,
            stake_available: 0,
            unstake_pending: Vec::new(),
        }
    }

    pub fn has_funds(&self) -> bool {
        self.stake_available > 0 || !self.unstake_pending.is_empty()
    }

    pub fn add_stake_available(&mut self, amount: u64) -> Result<(), StakeError> {
        self.stake_available = self
            .stake_available
            .checked_add(amount)
            .ok_or(StakeError::Overflow)?;
        Ok(())
    }

    pub fn sub_stake_available(&mut self, amount: u64) -> Result<(), StakeError> {
        self.stake_available =
            self.stake_available
                .checked_sub(amount)
                .ok_or(StakeError::Insufficient {
                    need: amount,
                    have: self.stake_available,
                })?;
        Ok(())
    }

    // Schedule an exit, keeping the entries ordered by release height
    pub fn add_unstake_pending(&mut self, amount: u64, release_height: u64) {
        if let Some(entry) = self
            .unstake_pending
            .iter_mut()
            .find(|e| e.release_height == release_height)
        {
            entry.amount += amount;
            return;
        }

        let position = self
            .unstake_pending
            .partition_point(|e| e.release_height < release_height);
        self.unstake_pending.insert(
            position,
            PendingUnstake {
                release_height,
                amount,
            },
        );
    }

    // Exact inverse of add_unstake_pending
    pub fn sub_unstake_pending(&mut self, amount: u64, release_height: u64) -> Result<(), StakeError> {
        let position = self
            .unstake_pending
            .iter()
            .position(|e| e.release_height == release_height && e.amount >= amount)
            .ok_or(StakeError::NoMatchingEntry)?;

        let entry = &mut self.unstake_pending[position];
        entry.amount -= amount;
        if entry.amount == 0 {
            self.unstake_pending.remove(position);
        }
        Ok(())
    }

    /// Consolidate every matured entry into a single entry keyed at
    /// the current height. Must run before any read so both the apply
    /// and the remove path observe the same layout.
    pub fn refresh(&mut self, height: u64) {
        let matured: u64 = self
            .unstake_pending
            .iter()
            .filter(|e| e.release_height <= height)
            .map(|e| e.amount)
            .sum();
        if matured == 0 {
            return;
        }

        self.unstake_pending.retain(|e| e.release_height > height);
        self.unstake_pending.insert(
            0,
            PendingUnstake {
                release_height: height,
                amount: matured,
            },
        );
    }

    // Funds claimable by a withdraw at this height
    pub fn matured(&self, height: u64) -> u64 {
        self.unstake_pending
            .iter()
            .filter(|e| e.release_height <= height)
            .map(|e| e.amount)
            .sum()
    }

    // Claim matured funds; callers must have refreshed at this height
    pub fn sub_matured(&mut self, amount: u64, height: u64) -> Result<(), StakeError> {
        let have = self.matured(height);
        if have < amount {
            return Err(StakeError::InsufficientMatured { need: amount, have });
        }
        self.sub_unstake_pending(amount, height)
    }
}

impl Serializer for DelegatedStake {
    fn write(&self, writer: &mut Writer) {
        self.delegate_public_key.write(writer);
        writer.write_uvarint(self.delegate_fee);
        writer.write_uvarint(self.stake_available);
        self.unstake_pending.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let delegate_public_key = CompressedPublicKey::read(reader)?;
        let delegate_fee = reader.read_uvarint()?;
        let stake_available = reader.read_uvarint()?;
        let unstake_pending: Vec<PendingUnstake> = Vec::read(reader)?;

        // entries are stored ordered by release height
        if unstake_pending
            .windows(2)
            .any(|w| w[0].release_height > w[1].release_height)
        {
            return Err(ReaderError::InvalidValue);
        }

        Ok(Self {
            delegate_public_key,
            delegate_fee,
            stake_available,
            unstake_pending,
        })
    }

    fn size(&self) -> usize {
        self.delegate_public_key.size()
            + uvarint_size(self.delegate_fee)
            + uvarint_size(self.stake_available)
            + self.unstake_pending.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn stake() -> DelegatedStake {
        DelegatedStake::new(KeyPair::new().get_public_key().compress(), 100)
    }

    #[test]
    fn test_unstake_pending_ordering() {
        let mut s = stake();
        s.add_unstake_pending(10, 50);
        s.add_unstake_pending(20, 30);
        s.add_unstake_pending(5, 40);

        let heights: Vec<u64> = s.unstake_pending.iter().map(|e| e.release_height).collect();
        assert_eq!(heights, vec![30, 40, 50]);
    }

    #[test]
    fn test_refresh_consolidates_matured() {
        let mut s = stake();
        s.add_unstake_pending(10, 10);
        s.add_unstake_pending(20, 20);
        s.add_unstake_pending(30, 100);

        s.refresh(25);
        assert_eq!(s.matured(25), 30);
        assert_eq!(s.unstake_pending.len(), 2);
        assert_eq!(s.unstake_pending[0].release_height, 25);
        assert_eq!(s.unstake_pending[0].amount, 30);

        // idempotent at the same height
        let snapshot = s.clone();
        s.refresh(25);
        assert_eq!(s, snapshot);
    }

    #[test]
    fn test_sub_matured_then_restore() {
        let mut s = stake();
        s.add_unstake_pending(50, 10);
        s.refresh(10);

        let snapshot = s.clone();
        s.sub_matured(20, 10).unwrap();
        assert_eq!(s.matured(10), 30);

        s.add_unstake_pending(20, 10);
        assert_eq!(s, snapshot);
    }

    #[test]
    fn test_serializer_round_trip() {
        let mut s = stake();
        s.add_stake_available(1000).unwrap();
        s.add_unstake_pending(10, 64);
        s.add_unstake_pending(20, 128);

        let bytes = s.to_bytes();
        assert_eq!(bytes.len(), s.size());
        assert_eq!(DelegatedStake::from_bytes(&bytes).unwrap(), s);
    }
}
