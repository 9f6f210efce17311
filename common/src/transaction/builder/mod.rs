mod ring;

pub use ring::{create_zether_ring, RingMemberSource};

use crate::{
    account::Nonce,
    crypto::{Address, AddressError, PrivateKey, Signature},
    token::TokenHash,
    transaction::{
        simple::{SimpleExtra, SimpleInput, SimpleOutput, TransactionSimple, UnstakeExtra, WithdrawExtra, DelegateExtra},
        DataVersion, Transaction, TransactionBody, TransactionError,
    },
    utils::CancelToken,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("Input lengths are a mismatch")]
    LengthMismatch,
    #[error("Ring size is not a power of 2")]
    RingSizeNotPowerOfTwo,
    #[error("New accounts needs to be in the interval [0, ring_size - 2]")]
    NewAccountsOutOfRange,
    #[error("No registered account available for the ring")]
    NoRegisteredAccount,
    #[error("Operation canceled")]
    Canceled,
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

// Build, sign and validate a simple transaction
fn finalize_simple(
    keys: &[&PrivateKey],
    mut simple: TransactionSimple,
    data_version: DataVersion,
    data: Vec<u8>,
) -> Result<Transaction, BuilderError> {
    if keys.len() != simple.vin.len() {
        return Err(BuilderError::LengthMismatch);
    }

    // the signing bytes exclude the signatures, a placeholder is fine
    for vin in &mut simple.vin {
        vin.signature = Signature::zero();
    }

    let unsigned = Transaction::new(
        data_version,
        data.clone(),
        TransactionBody::Simple(simple.clone()),
    );
    let signing_hash = unsigned.hash_for_signature();

    for (vin, key) in simple.vin.iter_mut().zip(keys) {
        vin.signature = key.sign(signing_hash.as_bytes());
    }

    let tx = Transaction::new(data_version, data, TransactionBody::Simple(simple));
    tx.validate()?;
    Ok(tx)
}

/// Transfer from any number of signed inputs to address outputs. The
/// per-token difference between inputs and outputs is the fee.
pub fn create_simple_transfer(
    nonce: Nonce,
    token: TokenHash,
    keys: &[&PrivateKey],
    amounts: &[u64],
    destinations: &[(&Address, u64)],
) -> Result<Transaction, BuilderError> {
    if keys.len() != amounts.len() || keys.is_empty() {
        return Err(BuilderError::LengthMismatch);
    }

    let vin = keys
        .iter()
        .zip(amounts)
        .map(|(key, amount)| SimpleInput {
            public_key: key.to_public_key().compress(),
            amount: *amount,
            token: token.clone(),
            signature: Signature::zero(),
        })
        .collect();

    let vout = destinations
        .iter()
        .map(|(address, amount)| SimpleOutput {
            public_key_hash: address.get_public_key_hash(),
            amount: *amount,
            token: token.clone(),
        })
        .collect();

    let simple = TransactionSimple {
        nonce,
        vin,
        vout,
        extra: SimpleExtra::Normal,
    };

    finalize_simple(keys, simple, DataVersion::None, Vec::new())
}

// Single input, no outputs: the shape of every staking script
fn staking_body(nonce: Nonce, key: &PrivateKey, extra: SimpleExtra) -> TransactionSimple {
    TransactionSimple {
        nonce,
        vin: vec![SimpleInput {
            public_key: key.to_public_key().compress(),
            amount: 0,
            token: crate::config::NATIVE_TOKEN,
            signature: Signature::zero(),
        }],
        vout: Vec::new(),
        extra,
    }
}

/// Schedule `amount` out of active stake
pub fn create_unstake(
    nonce: Nonce,
    key: &PrivateKey,
    amount: u64,
    fee_extra: u64,
) -> Result<Transaction, BuilderError> {
    let simple = staking_body(nonce, key, SimpleExtra::Unstake(UnstakeExtra { amount, fee_extra }));
    finalize_simple(&[key], simple, DataVersion::None, Vec::new())
}

/// Claim matured unstake funds into the native balance
pub fn create_withdraw(
    nonce: Nonce,
    key: &PrivateKey,
    amount: u64,
    fee_extra: u64,
) -> Result<Transaction, BuilderError> {
    let simple = staking_body(
        nonce,
        key,
        SimpleExtra::Withdraw(WithdrawExtra { amount, fee_extra }),
    );
    finalize_simple(&[key], simple, DataVersion::None, Vec::new())
}

/// Set or update the account's delegate key and fee
pub fn create_delegate(
    nonce: Nonce,
    key: &PrivateKey,
    new_public_key: Option<crate::crypto::CompressedPublicKey>,
    new_fee: Option<u64>,
) -> Result<Transaction, BuilderError> {
    let simple = staking_body(
        nonce,
        key,
        SimpleExtra::Delegate(DelegateExtra {
            new_public_key,
            new_fee,
        }),
    );
    finalize_simple(&[key], simple, DataVersion::None, Vec::new())
}

// Builders run on user interaction, every loop checks the handle
pub(crate) fn check_canceled(cancel: &CancelToken) -> Result<(), BuilderError> {
    if cancel.is_canceled() {
        return Err(BuilderError::Canceled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_create_unstake_verifies() {
        let keypair = KeyPair::new();
        let tx = create_unstake(0, keypair.get_private_key(), 534, 0).unwrap();

        match tx.get_body() {
            TransactionBody::Simple(simple) => {
                assert_eq!(simple.nonce, 0);
                assert!(matches!(
                    simple.extra,
                    SimpleExtra::Unstake(UnstakeExtra { amount: 534, .. })
                ));
                assert!(simple.verify_signatures(&tx.hash_for_signature()));
            }
            _ => panic!("expected a simple transaction"),
        }
    }

    #[test]
    fn test_create_transfer_balances_fee() {
        let sender = KeyPair::new();
        let recipient = KeyPair::new();
        let address = recipient
            .get_private_key()
            .to_address(0, Vec::new())
            .unwrap();

        let tx = create_simple_transfer(
            3,
            crate::config::NATIVE_TOKEN,
            &[sender.get_private_key()],
            &[150],
            &[(&address, 100)],
        )
        .unwrap();

        assert_eq!(tx.native_fee(), 50);
        assert!(tx.validate().is_ok());
    }
}
