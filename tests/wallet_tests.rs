//! Wallet Tests - key derivation, encryption at rest, format migration
//!
//! These tests verify:
//! 1. The same phrase always yields the same addresses and keys
//! 2. An encrypted wallet decrypts only under its password
//! 3. Migration from legacy WIF keys is one-way and idempotent
//! 4. Address book edits survive a round trip through storage

use pepevault::cipher::{Cipher, KdfParams};
use pepevault::keys::{self, ChainParams};
use pepevault::wallet::Wallet;
use pepevault::{FileStore, KeyValueStore};
use serde_json::json;
use tempfile::TempDir;

// "abandon" x11 + "about" - well-known test vector
const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn cipher() -> Cipher {
    Cipher::new(KdfParams::light())
}

#[test]
fn derivation_is_deterministic_across_wallets() {
    let params = ChainParams::pepecoin();
    let mut a = Wallet::create(Some(TEST_MNEMONIC), &params).expect("create a");
    let mut b = Wallet::create(Some(TEST_MNEMONIC), &params).expect("create b");
    a.generate_address(None, &params).expect("gen a");
    b.generate_address(None, &params).expect("gen b");

    assert_eq!(a.addresses, b.addresses);
    assert_eq!(a.children, b.children);
    assert_ne!(a.addresses[0], a.addresses[1]);
    assert!(a.addresses.iter().all(|addr| addr.starts_with('P')));

    let root = keys::generate_root(TEST_MNEMONIC).expect("root");
    let child = keys::generate_child(&root, 1, &params).expect("child");
    assert_eq!(child.address(&params), a.addresses[1]);
    assert_eq!(a.key_at(1, &params).expect("key").address(&params), a.addresses[1]);
}

#[test]
fn encrypted_wallet_needs_its_password() {
    let cipher = cipher();
    let wallet = Wallet::create(Some(TEST_MNEMONIC), &ChainParams::pepecoin()).expect("create");
    let blob = cipher.encrypt(&wallet, "correct horse").expect("encrypt");

    assert!(!blob.as_str().contains("abandon"));
    let opened: Wallet = cipher.decrypt(&blob, "correct horse").expect("decrypt");
    assert_eq!(opened.addresses, wallet.addresses);
    assert_eq!(opened.phrase, TEST_MNEMONIC);
    assert!(cipher.decrypt::<Wallet>(&blob, "correct horse ").is_none());
    assert!(cipher.decrypt::<Wallet>(&blob, "").is_none());
}

#[test]
fn legacy_keys_migrate_once() {
    let legacy = ChainParams::bitcoin_legacy();
    let current = ChainParams::pepecoin();

    let mut wallet = Wallet::create(Some(TEST_MNEMONIC), &legacy).expect("legacy wallet");
    wallet.generate_address(Some("spending"), &legacy).expect("gen");
    wallet.generate_address(None, &legacy).expect("gen");
    wallet.delete_address(1).expect("delete");
    assert_eq!(wallet.indices, vec![0, 2]);
    assert!(wallet.needs_migration(&current));

    assert!(wallet.migrate(&current).expect("migrate"));
    let once = wallet.clone();
    assert!(!wallet.migrate(&current).expect("second migrate"));
    assert_eq!(wallet.root, once.root);
    assert_eq!(wallet.children, once.children);
    assert_eq!(wallet.addresses, once.addresses);

    // Derivation indices survive: position 1 is still child index 2.
    let root = keys::generate_root(TEST_MNEMONIC).expect("root");
    let expected = keys::generate_child(&root, 2, &current).expect("child 2");
    assert_eq!(wallet.addresses[1], expected.address(&current));
    assert_eq!(wallet.nicknames[&wallet.addresses[0]], "Address 1");
    assert_eq!(wallet.nicknames[&wallet.addresses[1]], "Address 3");
    assert!(keys::from_wif(&wallet.children[1], &current).is_ok());
}

#[test]
fn wallet_record_survives_file_store_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("local.json");
    let cipher = cipher();
    let params = ChainParams::pepecoin();

    let mut wallet = Wallet::create(Some(TEST_MNEMONIC), &params).expect("create");
    wallet.generate_address(Some("cold"), &params).expect("gen");
    let blob = cipher.encrypt(&wallet, "pw").expect("encrypt");

    {
        let store = FileStore::open(&path).expect("open");
        store.set("@MyPepe_WALLET", json!(blob)).expect("set");
    }

    let store = FileStore::open(&path).expect("reopen");
    let stored = store.get("@MyPepe_WALLET").expect("get").expect("present");
    let blob = serde_json::from_value(stored).expect("blob");
    let reopened: Wallet = cipher.decrypt(&blob, "pw").expect("decrypt");
    assert_eq!(reopened.nicknames[&reopened.addresses[1]], "cold");
    assert!(!std::fs::read_to_string(&path).expect("read").contains("abandon"));
}
