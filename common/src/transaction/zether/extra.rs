use crate::{
    crypto::{CompressedPublicKey, Hash, Signature},
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
    transaction::TransactionError,
};
use serde::{Deserialize, Serialize};

/// Per-script payload of a zether transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZetherExtra {
    Transfer,
    DelegateStake(ZetherDelegateStakeExtra),
    ClaimStake(ZetherClaimStakeExtra),
}

/// Burn coins from the anonymous side into a delegate's active stake.
/// The delegate countersigns to accept the delegation terms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZetherDelegateStakeExtra {
    pub delegate_public_key: CompressedPublicKey,
    pub delegate_fee: u64,
    pub signature: Signature,
}

/// Claim accumulated stake back into the anonymous side.
/// `registration_index` selects the receiving member of the first
/// payload's ring: `validate` range-checks it, `verify` resolves it
/// to a ring key, and the delegate countersignature covers the index
/// together with the ring, so neither can change after signing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZetherClaimStakeExtra {
    pub delegate_public_key: CompressedPublicKey,
    pub registration_index: u64,
    pub signature: Signature,
}

impl ZetherExtra {
    // Wire tag, doubles as the script discriminant
    pub fn script(&self) -> u8 {
        match self {
            ZetherExtra::Transfer => 0,
            ZetherExtra::DelegateStake(_) => 1,
            ZetherExtra::ClaimStake(_) => 2,
        }
    }

    // The delegate key must have countersigned the transaction
    pub fn verify_signature(&self, hash: &Hash) -> Result<(), TransactionError> {
        let (key, signature) = match self {
            ZetherExtra::Transfer => return Ok(()),
            ZetherExtra::DelegateStake(extra) => (&extra.delegate_public_key, &extra.signature),
            ZetherExtra::ClaimStake(extra) => (&extra.delegate_public_key, &extra.signature),
        };

        let key = key
            .decompress()
            .ok_or(TransactionError::InvalidPublicKey)?;
        if !signature.verify(hash.as_bytes(), &key) {
            return Err(TransactionError::DelegateSignature);
        }
        Ok(())
    }

    pub fn write(&self, writer: &mut Writer) {
        match self {
            ZetherExtra::Transfer => {}
            ZetherExtra::DelegateStake(extra) => {
                extra.delegate_public_key.write(writer);
                writer.write_uvarint(extra.delegate_fee);
                extra.signature.write(writer);
            }
            ZetherExtra::ClaimStake(extra) => {
                extra.delegate_public_key.write(writer);
                writer.write_uvarint(extra.registration_index);
                extra.signature.write(writer);
            }
        }
    }

    // Serialized without the countersignature for the signing hash
    pub fn write_for_signing(&self, writer: &mut Writer) {
        match self {
            ZetherExtra::Transfer => {}
            ZetherExtra::DelegateStake(extra) => {
                extra.delegate_public_key.write(writer);
                writer.write_uvarint(extra.delegate_fee);
            }
            ZetherExtra::ClaimStake(extra) => {
                extra.delegate_public_key.write(writer);
                writer.write_uvarint(extra.registration_index);
            }
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ZetherExtra::Transfer => 0,
            ZetherExtra::DelegateStake(extra) => {
                extra.delegate_public_key.size()
                    + uvarint_size(extra.delegate_fee)
                    + extra.signature.size()
            }
            ZetherExtra::ClaimStake(extra) => {
                extra.delegate_public_key.size()
                    + uvarint_size(extra.registration_index)
                    + extra.signature.size()
            }
        }
    }

    // Deserialize the variant selected by the script tag
    pub fn read_for_script(script: u8, reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match script {
            0 => ZetherExtra::Transfer,
            1 => ZetherExtra::DelegateStake(ZetherDelegateStakeExtra {
                delegate_public_key: CompressedPublicKey::read(reader)?,
                delegate_fee: reader.read_uvarint()?,
                signature: Signature::read(reader)?,
            }),
            2 => ZetherExtra::ClaimStake(ZetherClaimStakeExtra {
                delegate_public_key: CompressedPublicKey::read(reader)?,
                registration_index: reader.read_uvarint()?,
                signature: Signature::read(reader)?,
            }),
            _ => return Err(ReaderError::InvalidValue),
        })
    }
}
