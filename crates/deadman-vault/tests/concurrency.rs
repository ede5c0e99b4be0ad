//! Concurrent access to a shared ledger.
//!
//! Operations from many threads must behave as if run one at a time.

use std::sync::Arc;
use std::thread;

use deadman_vault::{Address, Ledger, LedgerConfig, ManualClock, VaultEvent};

const START: u64 = 1_735_000_000;
const MONTH: u64 = 2_592_000;

fn test_address(seed: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0x01;
    bytes[19] = seed;
    Address::from_bytes(bytes)
}

fn setup() -> (Arc<Ledger>, ManualClock) {
    let clock = ManualClock::new(START);
    let ledger = Ledger::new(
        Arc::new(clock.clone()),
        LedgerConfig::default(),
        test_address(200),
    )
    .unwrap();
    (Arc::new(ledger), clock)
}

#[test]
fn test_concurrent_deposits_are_not_lost() {
    let (ledger, _clock) = setup();
    let vault = ledger
        .create_vault(test_address(1), test_address(2), MONTH)
        .unwrap();

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for _ in 0..100 {
                    ledger.deposit(test_address(10 + i), vault, 5).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ledger.vault_state(&vault).unwrap().balance, 8 * 100 * 5);
    assert_eq!(ledger.last_event_seq().unwrap(), 1 + 800);
}

#[test]
fn test_only_one_concurrent_claim_wins() {
    let (ledger, clock) = setup();
    let heir = test_address(2);
    let vault = ledger.create_vault(test_address(1), heir, MONTH).unwrap();
    ledger.deposit(test_address(1), vault, 1_000).unwrap();
    clock.advance(MONTH);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || ledger.claim(heir, vault).is_ok())
        })
        .collect();
    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(wins, 1);
    assert_eq!(ledger.total_supply().unwrap(), 1);
    assert_eq!(ledger.vault_state(&vault).unwrap().owner, heir);
}

#[test]
fn test_concurrent_creation_keeps_index_consistent() {
    let (ledger, _clock) = setup();

    let handles: Vec<_> = (0..4u8)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                (0..25)
                    .map(|_| {
                        ledger
                            .create_vault(test_address(i + 1), test_address(100), MONTH)
                            .unwrap()
                    })
                    .collect::<Vec<Address>>()
            })
        })
        .collect();
    let per_creator: Vec<Vec<Address>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(ledger.vault_count().unwrap(), 100);
    for (i, ids) in per_creator.iter().enumerate() {
        let creator = test_address(i as u8 + 1);
        assert_eq!(&ledger.vaults_for_creator(&creator).unwrap(), ids);
    }
}

#[test]
fn test_concurrent_claims_mint_unique_tokens() {
    let (ledger, clock) = setup();
    let heir = test_address(2);
    let vaults: Vec<Address> = (0..16)
        .map(|_| ledger.create_vault(test_address(1), heir, MONTH).unwrap())
        .collect();
    clock.advance(MONTH);

    let handles: Vec<_> = vaults
        .iter()
        .map(|vault| {
            let ledger = Arc::clone(&ledger);
            let vault = *vault;
            thread::spawn(move || ledger.claim(heir, vault).unwrap().token_id)
        })
        .collect();
    let mut tokens: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    tokens.sort_unstable();

    assert_eq!(tokens, (1..=16).collect::<Vec<u64>>());
    assert_eq!(ledger.tokens_of(&heir).unwrap().len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscriber_sees_events_from_other_tasks() {
    let (ledger, _clock) = setup();
    let mut rx = ledger.subscribe().unwrap();

    let writer = Arc::clone(&ledger);
    let created = tokio::task::spawn_blocking(move || {
        writer
            .create_vault(test_address(1), test_address(2), MONTH)
            .unwrap()
    })
    .await
    .unwrap();

    let record = rx.recv().await.unwrap();
    assert_eq!(record.seq, 1);
    assert!(matches!(
        record.event,
        VaultEvent::VaultCreated { vault, .. } if vault == created
    ));
}
