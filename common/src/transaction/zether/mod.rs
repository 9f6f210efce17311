mod extra;
mod payload;
mod registration;

pub use extra::{ZetherClaimStakeExtra, ZetherDelegateStakeExtra, ZetherExtra};
pub use payload::ZetherPayload;
pub use registration::ZetherRegistration;

use crate::{
    account::{DelegatedStake, RingMember},
    config::MAX_PAYLOAD_COUNT,
    crypto::{
        zether::{ProofContext, ZetherVerifier},
        CompressedPublicKey, Hash,
    },
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
    token::TokenHash,
    transaction::{state::ChainState, TransactionError},
    utils::{checked_map_add, CancelToken},
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Anonymous transaction. Bound to a specific recent tip height; the
/// ring updates are indistinguishable between sender and decoys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionZether {
    pub height: u64,
    pub registrations: Vec<ZetherRegistration>,
    pub payloads: Vec<ZetherPayload>,
    pub extra: ZetherExtra,
}

impl TransactionZether {
    pub fn get_script(&self) -> u8 {
        self.extra.script()
    }

    // Total ring members across all payloads
    pub fn total_ring_size(&self) -> usize {
        self.payloads
            .iter()
            .map(|p| p.statement.ring_size())
            .sum()
    }

    // Resolve a flat registration index into a payload's ring
    pub fn ring_key_at(&self, index: u64) -> Option<&CompressedPublicKey> {
        let mut i = index as usize;
        for payload in &self.payloads {
            let n = payload.statement.ring_size();
            if i < n {
                return Some(&payload.statement.public_keys[i]);
            }
            i -= n;
        }
        None
    }

    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.payloads.is_empty() || self.payloads.len() > MAX_PAYLOAD_COUNT {
            return Err(TransactionError::InvalidPayloadCount);
        }

        for payload in &self.payloads {
            payload.validate()?;
        }

        let total = self.total_ring_size() as u64;
        let mut seen = HashSet::new();
        for registration in &self.registrations {
            if registration.public_key_index >= total {
                return Err(TransactionError::InvalidRegistration);
            }
            if !seen.insert(registration.public_key_index) {
                return Err(TransactionError::InvalidRegistration);
            }
        }

        match &self.extra {
            ZetherExtra::Transfer => {}
            ZetherExtra::DelegateStake(_) => {
                if self.payloads[0].burn_value == 0 {
                    return Err(TransactionError::ZeroAmount);
                }
            }
            ZetherExtra::ClaimStake(extra) => {
                if self.payloads[0].burn_value == 0 {
                    return Err(TransactionError::ZeroAmount);
                }
                // the claim is bound to one member of the first ring
                if extra.registration_index >= self.payloads[0].statement.ring_size() as u64 {
                    return Err(TransactionError::InvalidRegistration);
                }
            }
        }

        Ok(())
    }

    /// Cryptographic checks: registration signatures, the zether proof
    /// of every payload, and the delegate countersignature.
    pub fn verify(
        &self,
        hash: &Hash,
        verifier: &dyn ZetherVerifier,
        cancel: &CancelToken,
    ) -> Result<(), TransactionError> {
        for registration in &self.registrations {
            if cancel.is_canceled() {
                return Err(TransactionError::Canceled);
            }

            let key = self
                .ring_key_at(registration.public_key_index)
                .ok_or(TransactionError::InvalidRegistration)?;
            let key = key
                .decompress()
                .ok_or(TransactionError::InvalidPublicKey)?;
            if !registration.signature.verify(hash.as_bytes(), &key) {
                return Err(TransactionError::RegistrationSignature);
            }
        }

        for payload in &self.payloads {
            if cancel.is_canceled() {
                return Err(TransactionError::Canceled);
            }

            let context = ProofContext {
                hash,
                height: self.height,
                burn_value: payload.burn_value,
            };
            if !verifier.verify(&payload.statement, &payload.proof, &context) {
                return Err(TransactionError::ProofVerification);
            }
        }

        // a claim must resolve to one member of the first ring; the
        // countersigned bytes cover the index together with the ring,
        // so the delegate signature below fixes both
        if matches!(self.extra, ZetherExtra::ClaimStake(_)) {
            let claimed = self
                .claimed_ring_key()
                .ok_or(TransactionError::InvalidRegistration)?;
            claimed
                .decompress()
                .ok_or(TransactionError::InvalidPublicKey)?;
        }

        self.extra.verify_signature(hash)
    }

    /// Ring member of the first payload a ClaimStake pays out to
    pub fn claimed_ring_key(&self) -> Option<&CompressedPublicKey> {
        match &self.extra {
            ZetherExtra::ClaimStake(extra) => self
                .payloads
                .first()?
                .statement
                .public_keys
                .get(extra.registration_index as usize),
            _ => None,
        }
    }

    // Declared fees per token, paid from the anonymous side
    pub fn compute_fees(&self) -> Result<HashMap<TokenHash, u64>, TransactionError> {
        let mut fees = HashMap::new();
        for payload in &self.payloads {
            checked_map_add(&mut fees, payload.token.clone(), payload.statement.fee)
                .ok_or(TransactionError::Overflow)?;
        }
        Ok(fees)
    }

    pub fn include<S: ChainState>(
        &self,
        height: u64,
        state: &mut S,
    ) -> Result<(), TransactionError> {
        // self-registrations first so payloads can resolve the members
        for registration in &self.registrations {
            let key = self
                .ring_key_at(registration.public_key_index)
                .ok_or(TransactionError::InvalidRegistration)?;
            if state.get_ring_member(key)?.is_some() {
                return Err(TransactionError::AlreadyRegistered);
            }
            state.update_ring_member(key, RingMember::new())?;
        }

        for payload in &self.payloads {
            payload.include(state)?;

            // burned coins and declared fees leave the token supply
            if !matches!(self.extra, ZetherExtra::ClaimStake(_)) {
                let mut token = state
                    .get_token(&payload.token)?
                    .ok_or(TransactionError::TokenNotFound)?;
                let debit = payload
                    .burn_value
                    .checked_add(payload.statement.fee)
                    .ok_or(TransactionError::Overflow)?;
                token.sub_supply(debit)?;
                state.update_token(&payload.token, token)?;
            }
        }

        match &self.extra {
            ZetherExtra::Transfer => {}
            ZetherExtra::DelegateStake(extra) => {
                let key = extra.delegate_public_key.to_public_key_hash();
                let mut account = state.get_account_or_create(&key)?;
                account.refresh_delegated_stake(height);
                if account.get_delegated_stake().is_none() {
                    account.set_delegated_stake(DelegatedStake::new(
                        extra.delegate_public_key.clone(),
                        extra.delegate_fee,
                    ));
                }
                account
                    .get_delegated_stake_mut()?
                    .add_stake_available(self.payloads[0].burn_value)?;
                state.update_account(&key, account)?;
            }
            ZetherExtra::ClaimStake(extra) => {
                let key = extra.delegate_public_key.to_public_key_hash();
                let mut account = state
                    .get_account(&key)?
                    .ok_or(TransactionError::AccountNotFound)?;
                account.refresh_delegated_stake(height);
                account
                    .get_delegated_stake_mut()?
                    .sub_stake_available(self.payloads[0].burn_value)?;
                state.update_account(&key, account)?;
            }
        }

        Ok(())
    }

    /// Exact inverse of `include` at the same height
    pub fn remove<S: ChainState>(
        &self,
        _height: u64,
        state: &mut S,
    ) -> Result<(), TransactionError> {
        match &self.extra {
            ZetherExtra::Transfer => {}
            ZetherExtra::DelegateStake(extra) => {
                let key = extra.delegate_public_key.to_public_key_hash();
                let mut account = state
                    .get_account(&key)?
                    .ok_or(TransactionError::AccountNotFound)?;
                account
                    .get_delegated_stake_mut()?
                    .sub_stake_available(self.payloads[0].burn_value)?;
                // drop a delegation this transaction created
                if account
                    .get_delegated_stake()
                    .is_some_and(|stake| !stake.has_funds())
                {
                    account.clear_delegated_stake();
                }
                state.update_account(&key, account)?;
            }
            ZetherExtra::ClaimStake(extra) => {
                let key = extra.delegate_public_key.to_public_key_hash();
                let mut account = state
                    .get_account(&key)?
                    .ok_or(TransactionError::AccountNotFound)?;
                account
                    .get_delegated_stake_mut()?
                    .add_stake_available(self.payloads[0].burn_value)?;
                state.update_account(&key, account)?;
            }
        }

        for payload in self.payloads.iter().rev() {
            if !matches!(self.extra, ZetherExtra::ClaimStake(_)) {
                let mut token = state
                    .get_token(&payload.token)?
                    .ok_or(TransactionError::TokenNotFound)?;
                let credit = payload
                    .burn_value
                    .checked_add(payload.statement.fee)
                    .ok_or(TransactionError::Overflow)?;
                token.add_supply(credit)?;
                state.update_token(&payload.token, token)?;
            }

            payload.remove(state)?;
        }

        for registration in self.registrations.iter().rev() {
            let key = self
                .ring_key_at(registration.public_key_index)
                .ok_or(TransactionError::InvalidRegistration)?;
            state.delete_ring_member(key)?;
        }

        Ok(())
    }

    pub fn write_with_proofs(&self, writer: &mut Writer, incl_proofs: bool) {
        writer.write_uvarint(self.extra.script() as u64);
        writer.write_uvarint(self.height);

        writer.write_uvarint(self.registrations.len() as u64);
        for registration in &self.registrations {
            if incl_proofs {
                registration.write(writer);
            } else {
                writer.write_uvarint(registration.public_key_index);
            }
        }

        writer.write_uvarint(self.payloads.len() as u64);
        for payload in &self.payloads {
            payload.write_with_proof(writer, incl_proofs);
        }

        if incl_proofs {
            self.extra.write(writer);
        } else {
            self.extra.write_for_signing(writer);
        }
    }
}

impl Serializer for TransactionZether {
    fn write(&self, writer: &mut Writer) {
        self.write_with_proofs(writer, true);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let script = reader.read_uvarint()?;
        if script > 2 {
            return Err(ReaderError::InvalidValue);
        }
        let height = reader.read_uvarint()?;

        let registrations: Vec<ZetherRegistration> = Vec::read(reader)?;

        let payload_count = reader.read_uvarint()? as usize;
        if payload_count == 0 || payload_count > MAX_PAYLOAD_COUNT {
            return Err(ReaderError::InvalidSize);
        }
        let mut payloads = Vec::with_capacity(payload_count);
        for _ in 0..payload_count {
            payloads.push(ZetherPayload::read(reader)?);
        }

        let extra = ZetherExtra::read_for_script(script as u8, reader)?;

        Ok(Self {
            height,
            registrations,
            payloads,
            extra,
        })
    }

    fn size(&self) -> usize {
        uvarint_size(self.extra.script() as u64)
            + uvarint_size(self.height)
            + self.registrations.size()
            + uvarint_size(self.payloads.len() as u64)
            + self.payloads.iter().map(|p| p.size()).sum::<usize>()
            + self.extra.size()
    }
}
