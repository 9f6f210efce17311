mod accounts;
mod overlay;
mod registrations;
mod tokens;

pub use accounts::Accounts;
pub use overlay::OverlayMap;
pub use registrations::Registrations;
pub use tokens::{normalize_token_key, TokenInfo, Tokens};

use crate::core::{
    error::BlockchainError,
    storage::{StoreRead, StoreWrite},
};
use veil_common::{
    account::{Account, RingMember},
    crypto::{CompressedPublicKey, PublicKeyHash},
    token::{Token, TokenHash},
    transaction::{ChainState, StateError},
};

/// The three typed overlays the inclusion machine runs against,
/// scoped to one read snapshot. Layers are pushed and folded across
/// all maps together so a candidate transaction is atomic.
pub struct ApplyState<'a> {
    pub accounts: Accounts<'a>,
    pub tokens: Tokens<'a>,
    pub registrations: Registrations<'a>,
}

impl<'a> ApplyState<'a> {
    pub fn new(reader: &'a dyn StoreRead) -> Self {
        Self {
            accounts: Accounts::new(reader),
            tokens: Tokens::new(reader),
            registrations: Registrations::new(reader),
        }
    }

    pub fn push_layer(&mut self) {
        self.accounts.push_layer();
        self.tokens.push_layer();
        self.registrations.push_layer();
    }

    pub fn commit(&mut self) {
        self.accounts.commit();
        self.tokens.commit();
        self.registrations.commit();
    }

    pub fn rollback(&mut self) {
        self.accounts.rollback();
        self.tokens.rollback();
        self.registrations.rollback();
    }

    /// Serialize the committed overlays into the write transaction
    pub fn write_to_store(
        self,
        tx: &mut dyn StoreWrite,
        seed_wallet_info: bool,
    ) -> Result<(), BlockchainError> {
        for (key, value) in self.accounts.into_store_writes() {
            match value {
                Some(value) => tx.put(key, value),
                None => tx.delete(key),
            }
        }
        self.tokens.write_to_store(tx, seed_wallet_info)?;
        for (key, value) in self.registrations.into_store_writes() {
            match value {
                Some(value) => tx.put(key, value),
                None => tx.delete(key),
            }
        }
        Ok(())
    }
}

fn state_error(error: BlockchainError) -> StateError {
    StateError::Store(error.to_string())
}

impl ChainState for ApplyState<'_> {
    fn get_account(&mut self, key: &PublicKeyHash) -> Result<Option<Account>, StateError> {
        self.accounts.get(key).map_err(state_error)
    }

    fn update_account(&mut self, key: &PublicKeyHash, account: Account) -> Result<(), StateError> {
        self.accounts.update(key, account);
        Ok(())
    }

    fn get_token(&mut self, hash: &TokenHash) -> Result<Option<Token>, StateError> {
        self.tokens.get(hash).map_err(state_error)
    }

    fn update_token(&mut self, hash: &TokenHash, token: Token) -> Result<(), StateError> {
        self.tokens.update(hash, token);
        Ok(())
    }

    fn get_ring_member(
        &mut self,
        key: &CompressedPublicKey,
    ) -> Result<Option<RingMember>, StateError> {
        self.registrations.get(key).map_err(state_error)
    }

    fn update_ring_member(
        &mut self,
        key: &CompressedPublicKey,
        member: RingMember,
    ) -> Result<(), StateError> {
        self.registrations.update(key, member);
        Ok(())
    }

    fn delete_ring_member(&mut self, key: &CompressedPublicKey) -> Result<(), StateError> {
        self.registrations.delete(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::{MemoryStore, Store};
    use veil_common::config::NATIVE_TOKEN;

    #[test]
    fn test_layered_apply_state() {
        let store = MemoryStore::new();
        let reader = store.begin_read().unwrap();
        let mut state = ApplyState::new(&*reader);

        let key = PublicKeyHash::new([1u8; 20]);
        let mut account = Account::new();
        account.add_balance(&NATIVE_TOKEN, 100).unwrap();

        state.push_layer();
        state.update_account(&key, account).unwrap();
        assert!(state.get_account(&key).unwrap().is_some());

        state.rollback();
        assert!(state.get_account(&key).unwrap().is_none());
    }

    #[test]
    fn test_write_to_store_round_trip() {
        let store = MemoryStore::new();
        let key = PublicKeyHash::new([2u8; 20]);

        {
            let reader = store.begin_read().unwrap();
            let mut state = ApplyState::new(&*reader);
            let mut account = Account::new();
            account.add_balance(&NATIVE_TOKEN, 55).unwrap();
            state.update_account(&key, account).unwrap();

            let mut tx = store.begin_write().unwrap();
            state.write_to_store(&mut *tx, false).unwrap();
            tx.commit().unwrap();
        }

        let reader = store.begin_read().unwrap();
        let mut state = ApplyState::new(&*reader);
        let account = state.get_account(&key).unwrap().unwrap();
        assert_eq!(account.get_balance(&NATIVE_TOKEN), 55);
    }
}
