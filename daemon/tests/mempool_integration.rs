use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use veil_common::{
    config::NATIVE_TOKEN,
    crypto::{Hash, KeyPair},
    transaction::{builder::create_simple_transfer, Transaction},
};
use veil_daemon::core::{
    blockchain::{Blockchain, ChainConfig},
    mempool::{Mempool, MempoolWork},
    storage::{MemoryStore, Store},
    verifier::StructuralVerifier,
};

struct Node {
    blockchain: Arc<Blockchain>,
    mempool: Arc<Mempool>,
    sender: KeyPair,
    extra_senders: Vec<KeyPair>,
    staker: KeyPair,
}

async fn setup_node(balance: u64) -> Node {
    let storage: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let verifier = Arc::new(StructuralVerifier);
    let mempool = Mempool::start(storage.clone(), verifier.clone());

    let sender = KeyPair::new();
    let extra_senders: Vec<KeyPair> = (0..2).map(|_| KeyPair::new()).collect();
    let staker = KeyPair::new();

    let mut premine = vec![(
        sender.get_public_key().compress().to_public_key_hash(),
        balance,
    )];
    for extra in &extra_senders {
        premine.push((
            extra.get_public_key().compress().to_public_key_hash(),
            balance,
        ));
    }

    let config = ChainConfig {
        difficulty: 1,
        premine,
        premine_stake: vec![(staker.get_public_key().compress(), 1_000_000)],
        forger_keys: vec![staker.get_public_key().compress()],
        ..ChainConfig::default()
    };

    let (blockchain, block_rx) =
        Blockchain::new(storage, mempool.clone(), verifier, config).unwrap();
    blockchain.arm_mempool().await;
    tokio::spawn(blockchain.clone().run(block_rx));

    // give the processor a beat to pick up the initial work
    tokio::time::sleep(Duration::from_millis(50)).await;

    Node {
        blockchain,
        mempool,
        sender,
        extra_senders,
        staker,
    }
}

fn transfer(node: &Node, nonce: u64, amount: u64, fee: u64) -> Transaction {
    let recipient = KeyPair::new();
    let address = recipient
        .get_private_key()
        .to_address(0, Vec::new())
        .unwrap();
    create_simple_transfer(
        nonce,
        NATIVE_TOKEN,
        &[node.sender.get_private_key()],
        &[amount + fee],
        &[(&address, amount)],
    )
    .unwrap()
}

#[tokio::test]
async fn test_admission_contract() {
    let node = setup_node(10_000).await;

    let tx = transfer(&node, 0, 100, 10);
    let hash = tx.get_hash();

    assert!(node.mempool.add(tx.clone()).await.unwrap());
    assert!(node.mempool.contains(&hash));

    // duplicate admission is idempotent, not an error
    assert!(!node.mempool.add(tx).await.unwrap());
    assert_eq!(node.mempool.len(), 1);

    // insufficient funds never enter the pool
    let broke = transfer(&node, 1, 1_000_000, 0);
    assert!(!node.mempool.add(broke).await.unwrap());
    assert_eq!(node.mempool.len(), 1);
}

#[tokio::test]
async fn test_competing_nonce_admits_first_spender_only() {
    let node = setup_node(10_000).await;

    let high_fee = transfer(&node, 0, 100, 50);
    let low_fee = transfer(&node, 0, 100, 10);

    assert!(node.mempool.add(high_fee.clone()).await.unwrap());
    // same vin-0 nonce already consumed in the speculative overlay
    assert!(!node.mempool.add(low_fee).await.unwrap());

    let head = node.blockchain.get_head();
    let work = node.mempool.get_next_transactions_to_include(&head.hash);
    assert_eq!(work.len(), 1);
    assert_eq!(work[0].get_hash(), high_fee.get_hash());
}

#[tokio::test]
async fn test_work_list_ordered_by_fee_per_byte() {
    let node = setup_node(10_000).await;
    let recipient = KeyPair::new();
    let address = recipient
        .get_private_key()
        .to_address(0, Vec::new())
        .unwrap();

    // three independent senders so ordering is purely fee driven
    let senders = [
        (&node.sender, 5u64),
        (&node.extra_senders[0], 50),
        (&node.extra_senders[1], 20),
    ];
    let mut hash_by_fee = std::collections::HashMap::new();
    for (sender, fee) in senders {
        let tx = create_simple_transfer(
            0,
            NATIVE_TOKEN,
            &[sender.get_private_key()],
            &[100 + fee],
            &[(&address, 100)],
        )
        .unwrap();
        hash_by_fee.insert(fee, tx.get_hash());
        assert!(node.mempool.add(tx).await.unwrap());
    }

    // a fresh cycle against the same tip re-sorts the holdings
    let head = node.blockchain.get_head();
    node.mempool.suspend().await;
    node.mempool
        .continue_with(MempoolWork {
            chain_height: head.height,
            chain_hash: head.hash.clone(),
        })
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let work = node.mempool.get_next_transactions_to_include(&head.hash);
    assert_eq!(work.len(), 3);
    assert_eq!(work[0].get_hash(), hash_by_fee[&50]);
    assert_eq!(work[1].get_hash(), hash_by_fee[&20]);
    assert_eq!(work[2].get_hash(), hash_by_fee[&5]);
}

#[tokio::test]
async fn test_new_tip_evicts_consumed_nonce_exactly_once() {
    let node = setup_node(10_000).await;
    let mut removed = node.mempool.subscribe_removed_from_list();

    // held by this node
    let held = transfer(&node, 0, 100, 10);
    let held_hash = held.get_hash();
    assert!(node.mempool.add(held).await.unwrap());

    // a competing higher-fee spend of the same nonce arrives in a
    // block forged elsewhere
    let competing = transfer(&node, 0, 100, 50);
    let head = node.blockchain.get_head();
    let mut work = node.blockchain.create_forging_work().unwrap();
    work.template.header.staking_amount = 1_000_000;
    work.template.header.forger_public_key = node.staker.get_public_key().compress();
    work.template.txs = vec![Arc::new(competing.clone())];
    work.template.header.merkle_hash = work.template.compute_merkle_hash();

    let new_head = node
        .blockchain
        .add_complete_block(work.template)
        .await
        .unwrap();
    assert_eq!(new_head.height, head.height + 1);

    // the held tx no longer applies: announced exactly once
    let evicted = timeout(Duration::from_secs(5), removed.recv())
        .await
        .expect("eviction was not announced")
        .unwrap();
    assert_eq!(evicted.hash, held_hash);
    assert!(!node.mempool.contains(&held_hash));

    // and absent from the next forging work result
    let work = node
        .mempool
        .get_next_transactions_to_include(&new_head.hash);
    assert!(work.iter().all(|tx| tx.get_hash() != held_hash));

    // exactly once: no second announcement pending
    assert!(
        timeout(Duration::from_millis(200), removed.recv())
            .await
            .is_err(),
        "eviction announced twice"
    );
}

#[tokio::test]
async fn test_still_applying_txs_survive_new_tip() {
    let node = setup_node(10_000).await;

    let keeper = transfer(&node, 0, 100, 10);
    let keeper_hash = keeper.get_hash();
    assert!(node.mempool.add(keeper).await.unwrap());

    // an empty block moves the tip without consuming the nonce
    let mut work = node.blockchain.create_forging_work().unwrap();
    work.template.header.staking_amount = 1_000_000;
    work.template.header.forger_public_key = node.staker.get_public_key().compress();
    work.template.header.merkle_hash = work.template.compute_merkle_hash();

    let new_head = node
        .blockchain
        .add_complete_block(work.template)
        .await
        .unwrap();

    // within one processing cycle the tx is back in the work result
    let mut included = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let work = node
            .mempool
            .get_next_transactions_to_include(&new_head.hash);
        if work.iter().any(|tx| tx.get_hash() == keeper_hash) {
            included = true;
            break;
        }
    }
    assert!(included, "a still-applying tx was dropped on the new tip");
    assert!(node.mempool.contains(&keeper_hash));
}

#[tokio::test]
async fn test_work_result_bound_to_tip_hash() {
    let node = setup_node(10_000).await;
    let tx = transfer(&node, 0, 100, 10);
    assert!(node.mempool.add(tx).await.unwrap());

    // asking with a foreign tip hash yields nothing
    let foreign = Hash::new([9u8; 32]);
    assert!(node
        .mempool
        .get_next_transactions_to_include(&foreign)
        .is_empty());
}
