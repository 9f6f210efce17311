use crate::{
    account::Account,
    config::UNSTAKE_DELAY,
    crypto::CompressedPublicKey,
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
    transaction::TransactionError,
};
use serde::{Deserialize, Serialize};

/// Per-script payload of a simple transaction. Each variant carries
/// exactly the fields its script needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimpleExtra {
    Normal,
    Delegate(DelegateExtra),
    Unstake(UnstakeExtra),
    Withdraw(WithdrawExtra),
}

/// Set or update the delegate that forges on behalf of the account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateExtra {
    pub new_public_key: Option<CompressedPublicKey>,
    pub new_fee: Option<u64>,
}

/// Schedule `amount` out of active stake, claimable after
/// `UNSTAKE_DELAY` blocks. The fee is paid from stake as well.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeExtra {
    pub amount: u64,
    pub fee_extra: u64,
}

/// Claim matured unstake funds into the native balance. The fee is
/// paid from the remaining active stake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawExtra {
    pub amount: u64,
    pub fee_extra: u64,
}

impl SimpleExtra {
    // Wire tag, doubles as the script discriminant
    pub fn script(&self) -> u8 {
        match self {
            SimpleExtra::Normal => 0,
            SimpleExtra::Delegate(_) => 1,
            SimpleExtra::Unstake(_) => 2,
            SimpleExtra::Withdraw(_) => 3,
        }
    }

    pub fn is_staking_script(&self) -> bool {
        !matches!(self, SimpleExtra::Normal)
    }

    pub fn validate(&self) -> Result<(), TransactionError> {
        match self {
            SimpleExtra::Normal => Ok(()),
            SimpleExtra::Delegate(extra) => {
                if extra.new_public_key.is_none() && extra.new_fee.is_none() {
                    return Err(TransactionError::InvalidExtra);
                }
                Ok(())
            }
            SimpleExtra::Unstake(extra) => {
                if extra.amount == 0 {
                    return Err(TransactionError::InvalidExtra);
                }
                Ok(())
            }
            SimpleExtra::Withdraw(extra) => {
                if extra.amount == 0 {
                    return Err(TransactionError::InvalidExtra);
                }
                Ok(())
            }
        }
    }

    // Applied to the vin[0] account after the nonce check
    pub fn include_vin0(&self, height: u64, account: &mut Account) -> Result<(), TransactionError> {
        match self {
            SimpleExtra::Normal => Ok(()),
            SimpleExtra::Delegate(extra) => {
                match account.get_delegated_stake() {
                    Some(_) => {
                        let stake = account.get_delegated_stake_mut()?;
                        if let Some(key) = &extra.new_public_key {
                            stake.delegate_public_key = key.clone();
                        }
                        if let Some(fee) = extra.new_fee {
                            stake.delegate_fee = fee;
                        }
                    }
                    None => {
                        let key = extra
                            .new_public_key
                            .clone()
                            .ok_or(TransactionError::InvalidExtra)?;
                        account.set_delegated_stake(crate::account::DelegatedStake::new(
                            key,
                            extra.new_fee.unwrap_or(0),
                        ));
                    }
                }
                Ok(())
            }
            SimpleExtra::Unstake(extra) => {
                let stake = account.get_delegated_stake_mut()?;
                let total = extra
                    .amount
                    .checked_add(extra.fee_extra)
                    .ok_or(TransactionError::Overflow)?;
                stake.sub_stake_available(total)?;
                stake.add_unstake_pending(extra.amount, height + UNSTAKE_DELAY);
                Ok(())
            }
            SimpleExtra::Withdraw(extra) => {
                account.claim_matured_unstake(extra.amount, height)?;
                account
                    .get_delegated_stake_mut()?
                    .sub_stake_available(extra.fee_extra)?;
                Ok(())
            }
        }
    }

    // Exact inverse of include_vin0 at the same height
    pub fn remove_vin0(&self, height: u64, account: &mut Account) -> Result<(), TransactionError> {
        match self {
            SimpleExtra::Normal => Ok(()),
            SimpleExtra::Delegate(_) => {
                // A delegation created by this transaction is empty and
                // can be dropped; updates to a funded delegation are
                // reverted through the overlay rollback path instead.
                if account
                    .get_delegated_stake()
                    .is_some_and(|stake| !stake.has_funds())
                {
                    account.clear_delegated_stake();
                }
                Ok(())
            }
            SimpleExtra::Unstake(extra) => {
                let stake = account.get_delegated_stake_mut()?;
                stake.sub_unstake_pending(extra.amount, height + UNSTAKE_DELAY)?;
                let total = extra
                    .amount
                    .checked_add(extra.fee_extra)
                    .ok_or(TransactionError::Overflow)?;
                stake.add_stake_available(total)?;
                Ok(())
            }
            SimpleExtra::Withdraw(extra) => {
                account
                    .get_delegated_stake_mut()?
                    .add_stake_available(extra.fee_extra)?;
                account.revert_matured_unstake(extra.amount, height)?;
                Ok(())
            }
        }
    }
}

impl SimpleExtra {
    // The script tag is serialized by the transaction body, not here
    pub fn write(&self, writer: &mut Writer) {
        match self {
            SimpleExtra::Normal => {}
            SimpleExtra::Delegate(extra) => {
                extra.new_public_key.write(writer);
                match extra.new_fee {
                    Some(fee) => {
                        writer.write_bool(true);
                        writer.write_uvarint(fee);
                    }
                    None => writer.write_bool(false),
                }
            }
            SimpleExtra::Unstake(extra) => {
                writer.write_uvarint(extra.amount);
                writer.write_uvarint(extra.fee_extra);
            }
            SimpleExtra::Withdraw(extra) => {
                writer.write_uvarint(extra.amount);
                writer.write_uvarint(extra.fee_extra);
            }
        }
    }

    pub fn size(&self) -> usize {
        match self {
            SimpleExtra::Normal => 0,
            SimpleExtra::Delegate(extra) => {
                extra.new_public_key.size() + 1 + extra.new_fee.map(uvarint_size).unwrap_or(0)
            }
            SimpleExtra::Unstake(extra) => {
                uvarint_size(extra.amount) + uvarint_size(extra.fee_extra)
            }
            SimpleExtra::Withdraw(extra) => {
                uvarint_size(extra.amount) + uvarint_size(extra.fee_extra)
            }
        }
    }

    // Deserialize the variant selected by the script tag
    pub fn read_for_script(script: u8, reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match script {
            0 => SimpleExtra::Normal,
            1 => {
                let new_public_key = Option::read(reader)?;
                let new_fee = if reader.read_bool()? {
                    Some(reader.read_uvarint()?)
                } else {
                    None
                };
                SimpleExtra::Delegate(DelegateExtra {
                    new_public_key,
                    new_fee,
                })
            }
            2 => SimpleExtra::Unstake(UnstakeExtra {
                amount: reader.read_uvarint()?,
                fee_extra: reader.read_uvarint()?,
            }),
            3 => SimpleExtra::Withdraw(WithdrawExtra {
                amount: reader.read_uvarint()?,
                fee_extra: reader.read_uvarint()?,
            }),
            _ => return Err(ReaderError::InvalidValue),
        })
    }
}
