//! End-to-end archiver tests on the embedded backend.

use secp256k1::Secp256k1;
use tempfile::TempDir;
use vigil_archive::ArchiveConfig;
use vigil_archive::TxHistoryArchiver;
use vigil_archive::TxState;
use vigil_transaction::test_utils;
use vigil_transaction::tx_id;
use vigil_transaction::FullTx;

async fn embedded_archiver(dir: &TempDir) -> TxHistoryArchiver {
    let config = ArchiveConfig {
        backend: "leveldb".into(),
        parameter: dir.path().join("tha").to_string_lossy().into_owned(),
        ..ArchiveConfig::default()
    };
    let archiver = TxHistoryArchiver::new(0, &config).await;
    assert!(archiver.is_enabled());
    archiver
}

fn sample_tx(seed: u8) -> FullTx {
    let secp = Secp256k1::new();
    test_utils::mint_tx(&secp, &test_utils::secret(seed), seed, &[25, 15])
}

#[tokio::test]
async fn test_body_roundtrip() {
    let dir = TempDir::new().unwrap();
    let archiver = embedded_archiver(&dir).await;

    let tx = sample_tx(1);
    assert!(archiver.add_transaction(&tx).await);

    let (state, stored, timestamp) = archiver.get(&tx_id(&tx)).await.unwrap();
    assert_eq!(state, TxState::Initial);
    assert_eq!(stored, tx);
    assert!(timestamp > 0);
}

#[tokio::test]
async fn test_missing_tx_is_none() {
    let dir = TempDir::new().unwrap();
    let archiver = embedded_archiver(&dir).await;

    assert!(archiver.get(&[0u8; 32]).await.is_none());
}

#[tokio::test]
async fn test_status_priority() {
    let dir = TempDir::new().unwrap();
    let archiver = embedded_archiver(&dir).await;

    let tx = sample_tx(2);
    let txid = tx_id(&tx);
    archiver.add_transaction(&tx).await;

    // Written out of order; the highest-priority state must win
    for state in [
        TxState::Execution,
        TxState::Completed,
        TxState::Validated,
        TxState::Unknown,
    ] {
        assert!(archiver.set_status(&txid, state).await);
    }

    let (state, _, _) = archiver.get(&txid).await.unwrap();
    assert_eq!(state, TxState::Completed);
}

#[tokio::test]
async fn test_terminal_status_is_stable() {
    let dir = TempDir::new().unwrap();
    let archiver = embedded_archiver(&dir).await;

    let tx = sample_tx(3);
    let txid = tx_id(&tx);
    archiver.add_transaction(&tx).await;

    archiver.set_status(&txid, TxState::Completed).await;
    let (state, _, _) = archiver.get(&txid).await.unwrap();
    assert_eq!(state, TxState::Completed);

    // Lower-priority transitions written afterwards are not observable
    archiver.set_status(&txid, TxState::Execution).await;
    archiver.set_status(&txid, TxState::Validated).await;
    let (state, _, _) = archiver.get(&txid).await.unwrap();
    assert_eq!(state, TxState::Completed);
}

#[tokio::test]
async fn test_set_status_is_idempotent_per_state() {
    let dir = TempDir::new().unwrap();
    let archiver = embedded_archiver(&dir).await;

    let tx = sample_tx(4);
    let txid = tx_id(&tx);
    archiver.add_transaction(&tx).await;

    assert!(archiver.set_status(&txid, TxState::Validated).await);
    assert!(archiver.set_status(&txid, TxState::Validated).await);

    // One body row plus exactly one status row
    assert_eq!(archiver.delete(&txid).await, 2);
}

#[tokio::test]
async fn test_delete_counts_every_row() {
    let dir = TempDir::new().unwrap();
    let archiver = embedded_archiver(&dir).await;

    let tx = sample_tx(5);
    let txid = tx_id(&tx);
    archiver.add_transaction(&tx).await;
    archiver.set_status(&txid, TxState::Validated).await;
    archiver.set_status(&txid, TxState::Execution).await;
    archiver.set_status(&txid, TxState::Completed).await;

    // An unrelated transaction must survive the delete
    let other = sample_tx(6);
    archiver.add_transaction(&other).await;

    assert_eq!(archiver.delete(&txid).await, 4);
    assert!(archiver.get(&txid).await.is_none());
    assert!(archiver.get(&tx_id(&other)).await.is_some());

    // A second delete has nothing left to remove
    assert_eq!(archiver.delete(&txid).await, 0);
}

#[tokio::test]
async fn test_disabled_backend_type() {
    let config = ArchiveConfig::default();
    let archiver = TxHistoryArchiver::new(0, &config).await;
    assert!(!archiver.is_enabled());

    let tx = sample_tx(7);
    assert!(!archiver.add_transaction(&tx).await);
    assert!(!archiver.set_status(&tx_id(&tx), TxState::Completed).await);
    assert!(archiver.get(&tx_id(&tx)).await.is_none());
    assert_eq!(archiver.delete(&tx_id(&tx)).await, 0);
}

#[tokio::test]
async fn test_invalid_sentinel_id_disables_archive() {
    let dir = TempDir::new().unwrap();
    let config = ArchiveConfig {
        backend: "leveldb".into(),
        parameter: dir.path().join("tha").to_string_lossy().into_owned(),
        ..ArchiveConfig::default()
    };

    let archiver = TxHistoryArchiver::new(vigil_archive::INVALID_SENTINEL_ID, &config).await;
    assert!(!archiver.is_enabled());
    assert!(!archiver.add_transaction(&sample_tx(8)).await);
}

#[tokio::test]
async fn test_unknown_backend_type_disables_archive() {
    let config = ArchiveConfig {
        backend: "postgres".into(),
        ..ArchiveConfig::default()
    };
    let archiver = TxHistoryArchiver::new(0, &config).await;
    assert!(!archiver.is_enabled());
}
