//! Pessimistic locking through the in-memory lock table.

use std::time::Duration;
use uow_core::{
    Config, CoreError, EntityKey, LockingMode, MapperError, ObjectState, TransactionState,
};
use uow_mapper::MapperConfig;
use uow_testkit::domain::{self, PRODUCT};
use uow_testkit::{contend_on_product, ContentionConfig, MapperCall, Operation, TestContext};

#[test]
fn second_locker_is_refused_and_registers_nothing() {
    let ctx = TestContext::new();
    let key = ctx.seed_product(5, "bolt", 10);

    let mut first = ctx.begin_pessimistic();
    let mut second = ctx.begin_pessimistic();
    assert_eq!(first.mode(), LockingMode::Pessimistic);

    first.load_as_dirty(PRODUCT, key).unwrap();
    assert_eq!(ctx.store.lock_holder(PRODUCT, key), Some(first.token()));

    let err = second.load_as_dirty(PRODUCT, key).unwrap_err();
    assert!(err.is_lock_conflict());
    assert_eq!(second.tracked_count(), 0);
    assert!(matches!(
        second.load_as_deleted(PRODUCT, key),
        Err(CoreError::LockConflict { .. })
    ));

    first.abort().unwrap();
    assert_eq!(ctx.store.lock_holder(PRODUCT, key), None);
    second.load_as_deleted(PRODUCT, key).unwrap();
    assert_eq!(ctx.store.lock_holder(PRODUCT, key), Some(second.token()));
}

#[test]
fn direct_update_registration_is_illegal() {
    let ctx = TestContext::new();
    let mut txn = ctx.begin_pessimistic();
    let product = domain::stored_product(5, "bolt", 10);

    assert!(matches!(
        txn.register_dirty(&product),
        Err(CoreError::IllegalOperation { .. })
    ));
    assert!(matches!(
        txn.register_deleted(&product),
        Err(CoreError::IllegalOperation { .. })
    ));
    txn.register_clean(&product).unwrap();
}

#[test]
fn lock_is_taken_before_the_fetch() {
    let ctx = TestContext::new();
    let key = ctx.seed_product(5, "bolt", 10);
    let mut txn = ctx.begin_pessimistic();
    txn.load_as_dirty(PRODUCT, key).unwrap();

    let calls = ctx.recorder.calls();
    assert_eq!(
        calls,
        vec![
            MapperCall::AcquireLock {
                entity_type: PRODUCT,
                key,
                owner: txn.token(),
            },
            MapperCall::Fetch {
                entity_type: PRODUCT,
                key,
            },
        ]
    );
}

#[test]
fn failed_fetch_releases_the_lock() {
    let ctx = TestContext::new();
    let mut txn = ctx.begin_pessimistic();
    let missing = EntityKey::new(99);

    assert!(matches!(
        txn.load_as_dirty(PRODUCT, missing),
        Err(CoreError::Mapper(MapperError::NotFound { .. }))
    ));
    assert_eq!(ctx.store.lock_holder(PRODUCT, missing), None);
    assert_eq!(ctx.recorder.count(Operation::ReleaseLock), 1);
    assert_eq!(txn.tracked_count(), 0);
}

#[test]
fn reloading_a_tracked_identity_reuses_the_object() {
    let ctx = TestContext::new();
    let key = ctx.seed_product(5, "bolt", 10);
    let mut txn = ctx.begin_pessimistic();

    let loaded = txn.load_as_dirty(PRODUCT, key).unwrap();
    domain::set_price(&loaded, 11);
    let again = txn.load_as_deleted(PRODUCT, key).unwrap();

    assert!(std::sync::Arc::ptr_eq(&loaded, &again));
    assert_eq!(txn.state_of(&loaded).unwrap(), Some(ObjectState::Deleted));
    assert_eq!(ctx.recorder.count(Operation::Fetch), 1);

    // Duplicate registration keeps the lock it already held.
    assert!(matches!(
        txn.load_as_deleted(PRODUCT, key),
        Err(CoreError::DuplicateRegistration { .. })
    ));
    assert_eq!(ctx.store.lock_holder(PRODUCT, key), Some(txn.token()));
}

#[test]
fn committed_delete_releases_its_lock() {
    let ctx = TestContext::new();
    let key = ctx.seed_product(7, "bolt", 10);
    let mut txn = ctx.begin_pessimistic();

    txn.load_as_deleted(PRODUCT, key).unwrap();
    txn.commit().unwrap();

    assert!(ctx.row(PRODUCT, key).is_none());
    assert_eq!(ctx.store.lock_holder(PRODUCT, key), None);
    assert_eq!(txn.tracked_count(), 0);
}

#[test]
fn completion_releases_update_locks() {
    let ctx = TestContext::new();
    let key = ctx.seed_product(5, "bolt", 10);
    let mut txn = ctx.begin_pessimistic();

    let product = txn.load_as_dirty(PRODUCT, key).unwrap();
    domain::set_price(&product, 20);
    txn.commit().unwrap();
    assert_eq!(ctx.store.lock_holder(PRODUCT, key), Some(txn.token()));

    txn.complete().unwrap();
    assert_eq!(txn.state(), TransactionState::Finalized);
    assert_eq!(ctx.store.active_locks(), 0);
    assert_eq!(ctx.stored_integer(PRODUCT, key, "price"), Some(20));
}

#[test]
fn downgrading_to_clean_releases_the_lock() {
    let ctx = TestContext::new();
    let key = ctx.seed_product(5, "bolt", 10);
    let mut txn = ctx.begin_pessimistic();

    let product = txn.load_as_dirty(PRODUCT, key).unwrap();
    txn.register_clean(&product).unwrap();
    assert_eq!(txn.state_of(&product).unwrap(), Some(ObjectState::Clean));
    assert_eq!(ctx.store.lock_holder(PRODUCT, key), None);

    // Loading again takes the lock back.
    txn.load_as_deleted(PRODUCT, key).unwrap();
    assert_eq!(ctx.store.lock_holder(PRODUCT, key), Some(txn.token()));
    txn.register_clean(&product).unwrap();
    txn.abort().unwrap();

    let mut other = ctx.begin_pessimistic();
    other.load_as_dirty(PRODUCT, key).unwrap();
    assert_eq!(ctx.store.lock_holder(PRODUCT, key), Some(other.token()));
}

#[test]
fn unregister_releases_the_lock() {
    let ctx = TestContext::new();
    let key = ctx.seed_product(5, "bolt", 10);
    let mut txn = ctx.begin_pessimistic();

    let product = txn.load_as_dirty(PRODUCT, key).unwrap();
    txn.unregister(&product).unwrap();
    assert_eq!(ctx.store.lock_holder(PRODUCT, key), None);
}

#[test]
fn new_objects_are_stamped_for_one_transaction() {
    let ctx = TestContext::new();
    let order = domain::order("A-1");

    let mut first = ctx.begin_pessimistic();
    let mut second = ctx.begin_pessimistic();
    first.register_new(&order).unwrap();
    assert_eq!(order.read().version().owner(), Some(first.token()));

    assert!(matches!(
        second.register_new(&order),
        Err(CoreError::VersionLocked { .. })
    ));

    first.commit().unwrap();
    first.complete().unwrap();
    assert!(!order.read().version().is_locked());
}

#[test]
fn expired_lease_can_be_taken_over() {
    let ctx = TestContext::with_config(
        Config::default(),
        MapperConfig::new().lock_lease(Duration::ZERO),
    );
    let key = ctx.seed_product(5, "bolt", 10);

    let mut first = ctx.begin_pessimistic();
    let mut second = ctx.begin_pessimistic();
    first.load_as_dirty(PRODUCT, key).unwrap();
    second.load_as_dirty(PRODUCT, key).unwrap();
    assert_eq!(second.tracked_count(), 1);
}

#[test]
fn concurrent_updates_are_serialized() {
    let ctx = TestContext::new();
    let key = ctx.seed_product(1, "bolt", 0);

    let result = contend_on_product(&ctx, key, &ContentionConfig { threads: 8, rounds: 20 });

    assert_eq!(result.failed, 0);
    assert_eq!(result.total(), 160);
    let price = ctx.stored_integer(PRODUCT, key, "price").unwrap();
    assert_eq!(price, result.committed as i64);
    assert_eq!(ctx.manager.registry().active_count(), 0);
}
