use crate::core::error::BlockchainError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, RwLock,
    },
};
use veil_common::crypto::{CompressedPublicKey, PrivateKey, Signature};

/// Gates whether client-supplied delegated-staking keys are accepted;
/// otherwise the server generates one.
#[derive(Clone, Default)]
pub struct DelegatorConfig {
    pub accept_custom_keys: bool,
}

#[derive(Serialize, Deserialize)]
pub struct DelegatesAskRequest {
    pub public_key: CompressedPublicKey,
    pub challenge_signature: Signature,
    #[serde(default, with = "hex")]
    pub delegated_staking_private_key: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
pub struct DelegatesAskReply {
    pub exists: bool,
    pub delegated_staking_public_key: Option<CompressedPublicKey>,
}

/// A delegation accepted but not yet observed on chain
pub struct PendingDelegateStakeChange {
    pub delegated_staking_private_key: PrivateKey,
    pub delegated_staking_public_key: CompressedPublicKey,
    pub public_key: CompressedPublicKey,
    pub chain_height: u64,
}

/// Delegator-node endpoint: stakers ask this node to forge on their
/// behalf. The caller proves key ownership by signing a server-issued
/// challenge.
pub struct DelegatorNode {
    config: DelegatorConfig,
    challenge: [u8; 32],
    registered: RwLock<HashSet<CompressedPublicKey>>,
    pending: Mutex<HashMap<CompressedPublicKey, PendingDelegateStakeChange>>,
    chain_height: AtomicU64,
}

impl DelegatorNode {
    pub fn new(config: DelegatorConfig) -> Self {
        let mut challenge = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut challenge);

        Self {
            config,
            challenge,
            registered: RwLock::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
            chain_height: AtomicU64::new(0),
        }
    }

    /// The challenge clients must sign
    pub fn get_challenge(&self) -> &[u8; 32] {
        &self.challenge
    }

    /// Track the chain so pending entries carry the height they were
    /// accepted at.
    pub fn update_chain_height(&self, height: u64) {
        self.chain_height.store(height, Ordering::Release);
    }

    // A key the node already forges for
    pub fn mark_registered(&self, key: CompressedPublicKey) {
        if let Ok(mut registered) = self.registered.write() {
            registered.insert(key);
        }
    }

    pub fn ask(&self, request: &DelegatesAskRequest) -> Result<DelegatesAskReply, BlockchainError> {
        let key = request
            .public_key
            .decompress()
            .ok_or_else(|| BlockchainError::VerificationFailed(
                veil_common::transaction::TransactionError::InvalidPublicKey,
            ))?;

        if !request.challenge_signature.verify(&self.challenge, &key) {
            return Err(BlockchainError::VerificationFailed(
                veil_common::transaction::TransactionError::SignatureVerification,
            ));
        }

        if self
            .registered
            .read()
            .map(|registered| registered.contains(&request.public_key))
            .unwrap_or(false)
        {
            return Ok(DelegatesAskReply {
                exists: true,
                delegated_staking_public_key: None,
            });
        }

        let delegated_staking_private_key = if !self.config.accept_custom_keys
            || request.delegated_staking_private_key.is_empty()
        {
            PrivateKey::generate()
        } else {
            PrivateKey::from_bytes(&request.delegated_staking_private_key)
                .map_err(BlockchainError::MalformedInput)?
        };

        let delegated_staking_public_key = delegated_staking_private_key.to_public_key().compress();

        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(
                request.public_key.clone(),
                PendingDelegateStakeChange {
                    delegated_staking_private_key,
                    delegated_staking_public_key: delegated_staking_public_key.clone(),
                    public_key: request.public_key.clone(),
                    chain_height: self.chain_height.load(Ordering::Acquire),
                },
            );
        }

        Ok(DelegatesAskReply {
            exists: false,
            delegated_staking_public_key: Some(delegated_staking_public_key),
        })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_common::crypto::KeyPair;

    fn request(node: &DelegatorNode, keypair: &KeyPair, custom: Vec<u8>) -> DelegatesAskRequest {
        DelegatesAskRequest {
            public_key: keypair.get_public_key().compress(),
            challenge_signature: keypair.sign(node.get_challenge()),
            delegated_staking_private_key: custom,
        }
    }

    #[test]
    fn test_ask_generates_key_and_registers_pending() {
        let node = DelegatorNode::new(DelegatorConfig::default());
        let keypair = KeyPair::new();

        let reply = node.ask(&request(&node, &keypair, Vec::new())).unwrap();
        assert!(!reply.exists);
        assert!(reply.delegated_staking_public_key.is_some());
        assert_eq!(node.pending_count(), 1);
    }

    #[test]
    fn test_bad_challenge_signature_rejected() {
        let node = DelegatorNode::new(DelegatorConfig::default());
        let keypair = KeyPair::new();
        let wrong = KeyPair::new();

        let request = DelegatesAskRequest {
            public_key: keypair.get_public_key().compress(),
            challenge_signature: wrong.sign(node.get_challenge()),
            delegated_staking_private_key: Vec::new(),
        };
        assert!(node.ask(&request).is_err());
    }

    #[test]
    fn test_custom_keys_gated_by_config() {
        let keypair = KeyPair::new();
        let custom = PrivateKey::generate();
        let custom_public = custom.to_public_key().compress();

        // refused: the server generates its own key instead
        let node = DelegatorNode::new(DelegatorConfig {
            accept_custom_keys: false,
        });
        let reply = node
            .ask(&request(&node, &keypair, custom.to_bytes().to_vec()))
            .unwrap();
        assert_ne!(reply.delegated_staking_public_key, Some(custom_public.clone()));

        // accepted when configured
        let node = DelegatorNode::new(DelegatorConfig {
            accept_custom_keys: true,
        });
        let reply = node
            .ask(&request(&node, &keypair, custom.to_bytes().to_vec()))
            .unwrap();
        assert_eq!(reply.delegated_staking_public_key, Some(custom_public));
    }

    #[test]
    fn test_existing_delegation_reports_exists() {
        let node = DelegatorNode::new(DelegatorConfig::default());
        let keypair = KeyPair::new();
        node.mark_registered(keypair.get_public_key().compress());

        let reply = node.ask(&request(&node, &keypair, Vec::new())).unwrap();
        assert!(reply.exists);
        assert!(reply.delegated_staking_public_key.is_none());
    }
}
