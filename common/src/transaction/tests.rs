use super::{
    builder::{create_simple_transfer, create_unstake, create_withdraw},
    simple::{SimpleExtra, SimpleInput, SimpleOutput, TransactionSimple},
    state::{ChainState, StateError},
    zether::{
        TransactionZether, ZetherClaimStakeExtra, ZetherExtra, ZetherPayload, ZetherRegistration,
    },
    DataVersion, Transaction, TransactionBody, TransactionError,
};
use crate::{
    account::{Account, DelegatedStake, RingMember},
    config::{NATIVE_TOKEN, UNSTAKE_DELAY},
    crypto::{
        zether::{
            CompressedCommitment, EncryptedBalance, Proof, ProofContext, Statement, ZetherVerifier,
        },
        CompressedPublicKey, KeyPair, PublicKeyHash, Signature,
    },
    serializer::Serializer,
    token::{native_token, Token, TokenHash},
    utils::CancelToken,
};
use curve25519_dalek::{constants::RISTRETTO_BASEPOINT_POINT, scalar::Scalar};
use std::collections::HashMap;

// In-memory state for exercising include/remove
#[derive(Default, Clone, PartialEq, Debug)]
pub struct TestState {
    pub accounts: HashMap<PublicKeyHash, Account>,
    pub tokens: HashMap<TokenHash, Token>,
    pub ring_members: HashMap<CompressedPublicKey, RingMember>,
}

impl ChainState for TestState {
    fn get_account(&mut self, key: &PublicKeyHash) -> Result<Option<Account>, StateError> {
        Ok(self.accounts.get(key).cloned())
    }

    fn update_account(&mut self, key: &PublicKeyHash, account: Account) -> Result<(), StateError> {
        self.accounts.insert(key.clone(), account);
        Ok(())
    }

    fn get_token(&mut self, hash: &TokenHash) -> Result<Option<Token>, StateError> {
        Ok(self.tokens.get(hash).cloned())
    }

    fn update_token(&mut self, hash: &TokenHash, token: Token) -> Result<(), StateError> {
        self.tokens.insert(hash.clone(), token);
        Ok(())
    }

    fn get_ring_member(
        &mut self,
        key: &CompressedPublicKey,
    ) -> Result<Option<RingMember>, StateError> {
        Ok(self.ring_members.get(key).cloned())
    }

    fn update_ring_member(
        &mut self,
        key: &CompressedPublicKey,
        member: RingMember,
    ) -> Result<(), StateError> {
        self.ring_members.insert(key.clone(), member);
        Ok(())
    }

    fn delete_ring_member(&mut self, key: &CompressedPublicKey) -> Result<(), StateError> {
        self.ring_members.remove(key);
        Ok(())
    }
}

struct AcceptAll;

impl ZetherVerifier for AcceptAll {
    fn verify(&self, _: &Statement, _: &Proof, _: &ProofContext<'_>) -> bool {
        true
    }
}

struct RejectAll;

impl ZetherVerifier for RejectAll {
    fn verify(&self, _: &Statement, _: &Proof, _: &ProofContext<'_>) -> bool {
        false
    }
}

fn commitment(value: u64) -> CompressedCommitment {
    CompressedCommitment::from_point(&(RISTRETTO_BASEPOINT_POINT * Scalar::from(value)))
}

// Signed zether transfer over a fresh self-registering ring
fn build_zether_transfer(height: u64, ring_exponent: usize) -> (Transaction, Vec<KeyPair>) {
    let n = 1 << ring_exponent;
    let keypairs: Vec<KeyPair> = (0..n).map(|_| KeyPair::new()).collect();
    let public_keys: Vec<CompressedPublicKey> = keypairs
        .iter()
        .map(|k| k.get_public_key().compress())
        .collect();

    let statement = Statement {
        public_keys,
        cln: (0..n).map(|i| commitment(100 + i as u64)).collect(),
        crn: (0..n).map(|i| commitment(200 + i as u64)).collect(),
        c: (0..n).map(|i| commitment(300 + i as u64)).collect(),
        d: commitment(999),
        fee: 10,
    };

    let payload = ZetherPayload {
        token: NATIVE_TOKEN,
        burn_value: 5,
        extra_type: 0,
        extra_data: Vec::new(),
        statement,
        proof: Proof::empty(ring_exponent),
    };

    let zether = TransactionZether {
        height,
        registrations: (0..n as u64)
            .map(|index| ZetherRegistration {
                public_key_index: index,
                signature: Signature::zero(),
            })
            .collect(),
        payloads: vec![payload],
        extra: ZetherExtra::Transfer,
    };

    let tx = Transaction::new(DataVersion::None, Vec::new(), TransactionBody::Zether(zether));
    let signing_hash = tx.hash_for_signature();

    // re-sign the registrations now the signing hash is fixed
    let mut zether = match tx.get_body() {
        TransactionBody::Zether(z) => z.clone(),
        _ => unreachable!(),
    };
    for (registration, keypair) in zether.registrations.iter_mut().zip(&keypairs) {
        registration.signature = keypair.sign(signing_hash.as_bytes());
    }

    let tx = Transaction::new(DataVersion::None, Vec::new(), TransactionBody::Zether(zether));
    (tx, keypairs)
}

// Claim over a pre-registered ring, countersigned by the delegate
fn build_zether_claim_stake(
    height: u64,
    ring_exponent: usize,
    delegate: &KeyPair,
    claim_amount: u64,
    registration_index: u64,
) -> (Transaction, Vec<KeyPair>) {
    let n = 1 << ring_exponent;
    let keypairs: Vec<KeyPair> = (0..n).map(|_| KeyPair::new()).collect();
    let public_keys: Vec<CompressedPublicKey> = keypairs
        .iter()
        .map(|k| k.get_public_key().compress())
        .collect();

    let statement = Statement {
        public_keys,
        cln: (0..n).map(|i| commitment(400 + i as u64)).collect(),
        crn: (0..n).map(|i| commitment(500 + i as u64)).collect(),
        c: (0..n).map(|i| commitment(600 + i as u64)).collect(),
        d: commitment(777),
        fee: 0,
    };

    let payload = ZetherPayload {
        token: NATIVE_TOKEN,
        burn_value: claim_amount,
        extra_type: 0,
        extra_data: Vec::new(),
        statement,
        proof: Proof::empty(ring_exponent),
    };

    let zether = TransactionZether {
        height,
        registrations: Vec::new(),
        payloads: vec![payload],
        extra: ZetherExtra::ClaimStake(ZetherClaimStakeExtra {
            delegate_public_key: delegate.get_public_key().compress(),
            registration_index,
            signature: Signature::zero(),
        }),
    };

    let tx = Transaction::new(DataVersion::None, Vec::new(), TransactionBody::Zether(zether));
    let signing_hash = tx.hash_for_signature();

    // countersign now the signing hash is fixed
    let mut zether = match tx.get_body() {
        TransactionBody::Zether(z) => z.clone(),
        _ => unreachable!(),
    };
    if let ZetherExtra::ClaimStake(extra) = &mut zether.extra {
        extra.signature = delegate.sign(signing_hash.as_bytes());
    }

    let tx = Transaction::new(DataVersion::None, Vec::new(), TransactionBody::Zether(zether));
    (tx, keypairs)
}

fn funded_state(keypair: &KeyPair, balance: u64) -> (TestState, PublicKeyHash) {
    let key = keypair.get_public_key().compress().to_public_key_hash();
    let mut account = Account::new();
    account.add_balance(&NATIVE_TOKEN, balance).unwrap();

    let mut state = TestState::default();
    state.accounts.insert(key.clone(), account);

    let mut token = native_token();
    token.add_supply(1_000_000).unwrap();
    state.tokens.insert(NATIVE_TOKEN, token);
    (state, key)
}

#[test]
fn test_simple_transfer_codec_round_trip() {
    let sender = KeyPair::new();
    let recipient = KeyPair::new();
    let address = recipient
        .get_private_key()
        .to_address(0, Vec::new())
        .unwrap();

    let tx = create_simple_transfer(
        0,
        NATIVE_TOKEN,
        &[sender.get_private_key()],
        &[100],
        &[(&address, 90)],
    )
    .unwrap();

    let bytes = tx.to_bytes();
    assert_eq!(bytes.len(), tx.size());

    let read = Transaction::from_bytes(&bytes).unwrap();
    assert_eq!(read, tx);
    assert_eq!(read.to_bytes(), bytes);
    assert_eq!(read.get_hash(), tx.get_hash());
}

#[test]
fn test_zether_codec_round_trip() {
    let (tx, _) = build_zether_transfer(10, 4);

    let bytes = tx.to_bytes();
    assert_eq!(bytes.len(), tx.size());

    let read = Transaction::from_bytes(&bytes).unwrap();
    assert_eq!(read, tx);
    assert_eq!(read.to_bytes(), bytes);
}

#[test]
fn test_simple_transfer_apply_remove_symmetry() {
    let sender = KeyPair::new();
    let recipient = KeyPair::new();
    let address = recipient
        .get_private_key()
        .to_address(0, Vec::new())
        .unwrap();

    let (mut state, _) = funded_state(&sender, 1000);
    let before = state.clone();

    let tx = create_simple_transfer(
        0,
        NATIVE_TOKEN,
        &[sender.get_private_key()],
        &[100],
        &[(&address, 90)],
    )
    .unwrap();

    tx.include(5, &mut state).unwrap();
    assert_ne!(state, before);

    tx.remove(5, &mut state).unwrap();
    // the recipient account stays, created empty on first credit
    let recipient_key = address.get_public_key_hash();
    assert_eq!(state.accounts[&recipient_key], Account::new());
    state.accounts.remove(&recipient_key);
    assert_eq!(state, before);
}

#[test]
fn test_unstake_apply_remove_symmetry() {
    let staker = KeyPair::new();
    let (mut state, key) = funded_state(&staker, 0);

    let mut stake = DelegatedStake::new(staker.get_public_key().compress(), 0);
    stake.add_stake_available(1000).unwrap();
    state
        .accounts
        .get_mut(&key)
        .unwrap()
        .set_delegated_stake(stake);
    let before = state.clone();

    let tx = create_unstake(0, staker.get_private_key(), 534, 6).unwrap();
    tx.include(50, &mut state).unwrap();

    let stake = state.accounts[&key].get_delegated_stake().unwrap();
    assert_eq!(stake.stake_available, 1000 - 534 - 6);
    assert_eq!(stake.unstake_pending[0].release_height, 50 + UNSTAKE_DELAY);

    tx.remove(50, &mut state).unwrap();
    assert_eq!(state, before);
}

#[test]
fn test_withdraw_apply_remove_symmetry() {
    let staker = KeyPair::new();
    let (mut state, key) = funded_state(&staker, 0);

    let mut stake = DelegatedStake::new(staker.get_public_key().compress(), 0);
    stake.add_stake_available(10).unwrap();
    stake.add_unstake_pending(400, 30);
    state
        .accounts
        .get_mut(&key)
        .unwrap()
        .set_delegated_stake(stake);

    // refresh at the application height first so apply and remove see
    // the same consolidated entry layout
    state
        .accounts
        .get_mut(&key)
        .unwrap()
        .refresh_delegated_stake(60);
    let before = state.clone();

    let tx = create_withdraw(0, staker.get_private_key(), 400, 10).unwrap();
    tx.include(60, &mut state).unwrap();

    let account = &state.accounts[&key];
    assert_eq!(account.get_balance(&NATIVE_TOKEN), 400);
    assert_eq!(account.get_delegated_stake().unwrap().stake_available, 0);

    tx.remove(60, &mut state).unwrap();
    assert_eq!(state, before);
}

#[test]
fn test_zether_apply_remove_symmetry() {
    let (tx, _) = build_zether_transfer(10, 4);

    let mut state = TestState::default();
    let mut token = native_token();
    token.add_supply(1_000_000).unwrap();
    state.tokens.insert(NATIVE_TOKEN, token);
    let before = state.clone();

    tx.include(10, &mut state).unwrap();
    assert_eq!(state.ring_members.len(), 16);
    assert_eq!(state.tokens[&NATIVE_TOKEN].supply, 1_000_000 - 5 - 10);

    tx.remove(10, &mut state).unwrap();
    assert_eq!(state, before);
}

#[test]
fn test_zether_verify_and_bloom() {
    let (tx, _) = build_zether_transfer(10, 4);
    let cancel = CancelToken::new();

    assert!(tx.get_bloom().is_none());
    let bloom = tx.verify(&AcceptAll, &cancel).unwrap();
    assert_eq!(bloom.hash, tx.get_hash());
    assert_eq!(bloom.size, tx.size());

    // idempotent: the second call short-circuits to the cache
    tx.verify(&RejectAll, &cancel).unwrap();
}

#[test]
fn test_zether_proof_rejection() {
    let (tx, _) = build_zether_transfer(10, 4);
    let cancel = CancelToken::new();
    assert!(tx.verify(&RejectAll, &cancel).is_err());
}

#[test]
fn test_zether_height_binding() {
    let (tx, _) = build_zether_transfer(100, 4);
    let mut state = TestState::default();

    // not yet valid below the bound height
    assert!(tx.include(99, &mut state).is_err());
}

#[test]
fn test_claim_stake_verify_binds_registration_index() {
    let delegate = KeyPair::new();
    let (tx, _) = build_zether_claim_stake(10, 2, &delegate, 400, 3);
    let cancel = CancelToken::new();
    tx.verify(&AcceptAll, &cancel).unwrap();

    // swapping the index after signing breaks the countersignature
    let mut zether = match tx.get_body() {
        TransactionBody::Zether(z) => z.clone(),
        _ => unreachable!(),
    };
    if let ZetherExtra::ClaimStake(extra) = &mut zether.extra {
        extra.registration_index = 2;
    }
    let tampered =
        Transaction::new(DataVersion::None, Vec::new(), TransactionBody::Zether(zether));
    assert!(matches!(
        tampered.verify(&AcceptAll, &cancel),
        Err(TransactionError::DelegateSignature)
    ));
}

#[test]
fn test_claim_stake_out_of_range_index_rejected() {
    let delegate = KeyPair::new();
    // ring of 4, index 4 falls outside it
    let (tx, _) = build_zether_claim_stake(10, 2, &delegate, 400, 4);
    assert!(matches!(
        tx.validate(),
        Err(TransactionError::InvalidRegistration)
    ));
}

#[test]
fn test_claim_stake_apply_remove_symmetry() {
    let delegate = KeyPair::new();
    let (tx, keypairs) = build_zether_claim_stake(10, 2, &delegate, 400, 1);

    let mut state = TestState::default();
    for keypair in &keypairs {
        state
            .ring_members
            .insert(keypair.get_public_key().compress(), RingMember::new());
    }

    let delegate_key = delegate.get_public_key().compress().to_public_key_hash();
    let mut account = Account::new();
    let mut stake = DelegatedStake::new(delegate.get_public_key().compress(), 0);
    stake.add_stake_available(1000).unwrap();
    account.set_delegated_stake(stake);
    state.accounts.insert(delegate_key.clone(), account);
    let before = state.clone();

    tx.include(10, &mut state).unwrap();
    assert_eq!(
        state.accounts[&delegate_key]
            .get_delegated_stake()
            .unwrap()
            .stake_available,
        600
    );

    // the claimed member is part of the ring the payload moved
    let claimed = match tx.get_body() {
        TransactionBody::Zether(z) => z.claimed_ring_key().unwrap().clone(),
        _ => unreachable!(),
    };
    assert_ne!(
        state.ring_members[&claimed].get_balance(&NATIVE_TOKEN),
        EncryptedBalance::zero()
    );

    tx.remove(10, &mut state).unwrap();
    assert_eq!(state, before);
}

#[test]
fn test_nonce_monotonicity() {
    let sender = KeyPair::new();
    let recipient = KeyPair::new();
    let address = recipient
        .get_private_key()
        .to_address(0, Vec::new())
        .unwrap();

    let (mut state, key) = funded_state(&sender, 1000);

    let tx0 = create_simple_transfer(
        0,
        NATIVE_TOKEN,
        &[sender.get_private_key()],
        &[100],
        &[(&address, 90)],
    )
    .unwrap();
    let tx1 = create_simple_transfer(
        1,
        NATIVE_TOKEN,
        &[sender.get_private_key()],
        &[100],
        &[(&address, 90)],
    )
    .unwrap();

    // out of order application fails, in order succeeds
    assert!(tx1.include(5, &mut state).is_err());
    tx0.include(5, &mut state).unwrap();
    tx1.include(5, &mut state).unwrap();
    assert_eq!(state.accounts[&key].get_nonce(), 2);

    // replay of an already spent nonce fails
    assert!(tx0.include(5, &mut state).is_err());
}

#[test]
fn test_conservation_of_transparent_tokens() {
    let sender = KeyPair::new();
    let recipient = KeyPair::new();
    let address = recipient
        .get_private_key()
        .to_address(0, Vec::new())
        .unwrap();

    let (mut state, _) = funded_state(&sender, 1000);
    let total_before: u64 = state
        .accounts
        .values()
        .map(|a| a.get_balance(&NATIVE_TOKEN))
        .sum();

    let tx = create_simple_transfer(
        0,
        NATIVE_TOKEN,
        &[sender.get_private_key()],
        &[300],
        &[(&address, 280)],
    )
    .unwrap();
    tx.include(5, &mut state).unwrap();

    let total_after: u64 = state
        .accounts
        .values()
        .map(|a| a.get_balance(&NATIVE_TOKEN))
        .sum();

    // the difference is exactly the declared fee
    assert_eq!(total_before - total_after, tx.native_fee());
    assert_eq!(tx.native_fee(), 20);
}

#[test]
fn test_validate_rejects_bad_shapes() {
    let keypair = KeyPair::new();

    // Normal with no vout
    let simple = TransactionSimple {
        nonce: 0,
        vin: vec![SimpleInput {
            public_key: keypair.get_public_key().compress(),
            amount: 10,
            token: NATIVE_TOKEN,
            signature: Signature::zero(),
        }],
        vout: Vec::new(),
        extra: SimpleExtra::Normal,
    };
    let tx = Transaction::new(DataVersion::None, Vec::new(), TransactionBody::Simple(simple));
    assert!(tx.validate().is_err());

    // outputs exceeding inputs
    let simple = TransactionSimple {
        nonce: 0,
        vin: vec![SimpleInput {
            public_key: keypair.get_public_key().compress(),
            amount: 10,
            token: NATIVE_TOKEN,
            signature: Signature::zero(),
        }],
        vout: vec![SimpleOutput {
            public_key_hash: PublicKeyHash::new([9u8; 20]),
            amount: 11,
            token: NATIVE_TOKEN,
        }],
        extra: SimpleExtra::Normal,
    };
    let tx = Transaction::new(DataVersion::None, Vec::new(), TransactionBody::Simple(simple));
    assert!(tx.validate().is_err());
}

#[test]
fn test_insufficient_funds_rejected_on_apply() {
    let sender = KeyPair::new();
    let recipient = KeyPair::new();
    let address = recipient
        .get_private_key()
        .to_address(0, Vec::new())
        .unwrap();

    let (mut state, _) = funded_state(&sender, 50);
    let tx = create_simple_transfer(
        0,
        NATIVE_TOKEN,
        &[sender.get_private_key()],
        &[100],
        &[(&address, 90)],
    )
    .unwrap();

    assert!(tx.include(5, &mut state).is_err());
}

#[test]
fn test_zether_ring_balances_move_indistinguishably() {
    let (tx, _) = build_zether_transfer(10, 4);
    let mut state = TestState::default();
    let mut token = native_token();
    token.add_supply(1_000_000).unwrap();
    state.tokens.insert(NATIVE_TOKEN, token);

    tx.include(10, &mut state).unwrap();

    // every ring member's ciphertext moved away from zero
    for member in state.ring_members.values() {
        assert_ne!(member.get_balance(&NATIVE_TOKEN), EncryptedBalance::zero());
    }
}
