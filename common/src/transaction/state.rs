use crate::{
    account::{Account, RingMember},
    crypto::{CompressedPublicKey, PublicKeyHash},
    token::{Token, TokenHash},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Store error: {0}")]
    Store(String),
    #[error("Token not found")]
    TokenNotFound,
}

/// State the inclusion machine runs against. Implemented by the
/// daemon's overlay maps; the trait keeps the transaction crate free
/// of any storage backend.
pub trait ChainState {
    fn get_account(&mut self, key: &PublicKeyHash) -> Result<Option<Account>, StateError>;

    fn update_account(&mut self, key: &PublicKeyHash, account: Account) -> Result<(), StateError>;

    fn get_token(&mut self, hash: &TokenHash) -> Result<Option<Token>, StateError>;

    fn update_token(&mut self, hash: &TokenHash, token: Token) -> Result<(), StateError>;

    fn get_ring_member(
        &mut self,
        key: &CompressedPublicKey,
    ) -> Result<Option<RingMember>, StateError>;

    fn update_ring_member(
        &mut self,
        key: &CompressedPublicKey,
        member: RingMember,
    ) -> Result<(), StateError>;

    fn delete_ring_member(&mut self, key: &CompressedPublicKey) -> Result<(), StateError>;

    // Load or default-construct, account creation is first credit
    fn get_account_or_create(&mut self, key: &PublicKeyHash) -> Result<Account, StateError> {
        Ok(self.get_account(key)?.unwrap_or_default())
    }
}
