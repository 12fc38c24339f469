use std::path::Path;
use std::sync::Arc;

use mvstore::data::DataManager;
use mvstore::transaction::TransactionManager;
use mvstore::version::{IsolationLevel, VersionManager};
use tempfile::tempdir;

const MEM: u64 = 1 << 20;

fn build_vm(base: &Path, create: bool) -> VersionManager {
    let tm = Arc::new(if create {
        TransactionManager::create(base).unwrap()
    } else {
        TransactionManager::open(base).unwrap()
    });
    let dm = Arc::new(if create {
        DataManager::create(base, MEM).unwrap()
    } else {
        DataManager::open(base, MEM, &tm).unwrap()
    });
    VersionManager::new(tm, dm)
}

#[test]
fn test_committed_data_survives_crash() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("store");

    let uid = {
        let vm = build_vm(&base, true);
        let xid = vm.begin(IsolationLevel::ReadCommitted).unwrap();
        let uid = vm.insert(xid, b"must survive").unwrap();
        vm.commit(xid).unwrap();
        // No clean close: the data file may miss the page write, but the
        // WAL has the insert.
        uid
    };

    let vm = build_vm(&base, false);
    let reader = vm.begin(IsolationLevel::ReadCommitted).unwrap();
    assert_eq!(vm.read(reader, uid).unwrap().unwrap(), b"must survive");
}

#[test]
fn test_active_transaction_is_rolled_back_on_recovery() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("store");

    let (committed_uid, doomed_uid, doomed_xid) = {
        let vm = build_vm(&base, true);
        let good = vm.begin(IsolationLevel::ReadCommitted).unwrap();
        let committed_uid = vm.insert(good, b"kept").unwrap();
        vm.commit(good).unwrap();

        let doomed = vm.begin(IsolationLevel::ReadCommitted).unwrap();
        let doomed_uid = vm.insert(doomed, b"discarded").unwrap();
        // Crash with `doomed` still active.
        (committed_uid, doomed_uid, doomed)
    };

    let tm = Arc::new(TransactionManager::open(&base).unwrap());
    let dm = Arc::new(DataManager::open(&base, MEM, &tm).unwrap());
    assert!(tm.is_aborted(doomed_xid).unwrap());

    let vm = VersionManager::new(tm, Arc::clone(&dm));
    let reader = vm.begin(IsolationLevel::ReadCommitted).unwrap();
    assert_eq!(vm.read(reader, committed_uid).unwrap().unwrap(), b"kept");
    assert!(vm.read(reader, doomed_uid).unwrap().is_none());
}

#[test]
fn test_crashed_delete_is_undone() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("store");

    let uid = {
        let vm = build_vm(&base, true);
        let writer = vm.begin(IsolationLevel::ReadCommitted).unwrap();
        let uid = vm.insert(writer, b"resilient").unwrap();
        vm.commit(writer).unwrap();

        let deleter = vm.begin(IsolationLevel::ReadCommitted).unwrap();
        assert!(vm.delete(deleter, uid).unwrap());
        // Crash before the delete commits.
        uid
    };

    let vm = build_vm(&base, false);
    let reader = vm.begin(IsolationLevel::ReadCommitted).unwrap();
    assert_eq!(vm.read(reader, uid).unwrap().unwrap(), b"resilient");
}

#[test]
fn test_clean_shutdown_skips_recovery() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("store");

    let uid = {
        let tm = Arc::new(TransactionManager::create(&base).unwrap());
        let dm = Arc::new(DataManager::create(&base, MEM).unwrap());
        let vm = VersionManager::new(Arc::clone(&tm), Arc::clone(&dm));

        let xid = vm.begin(IsolationLevel::ReadCommitted).unwrap();
        let uid = vm.insert(xid, b"orderly").unwrap();
        vm.commit(xid).unwrap();
        drop(vm);
        dm.close().unwrap();
        uid
    };

    // Reopen twice: the first open wrote a clean close stamp again on its
    // own close, so both opens must see the data.
    for _ in 0..2 {
        let tm = Arc::new(TransactionManager::open(&base).unwrap());
        let dm = Arc::new(DataManager::open(&base, MEM, &tm).unwrap());
        let vm = VersionManager::new(Arc::clone(&tm), Arc::clone(&dm));
        let reader = vm.begin(IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(vm.read(reader, uid).unwrap().unwrap(), b"orderly");
        drop(vm);
        dm.close().unwrap();
    }
}

#[test]
fn test_recovery_is_idempotent() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("store");

    let uid = {
        let vm = build_vm(&base, true);
        let xid = vm.begin(IsolationLevel::ReadCommitted).unwrap();
        let uid = vm.insert(xid, b"twice recovered").unwrap();
        vm.commit(xid).unwrap();
        uid
    };

    // Recover, crash again without a clean close, recover again.
    for _ in 0..2 {
        let vm = build_vm(&base, false);
        let reader = vm.begin(IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(vm.read(reader, uid).unwrap().unwrap(), b"twice recovered");
    }
}
