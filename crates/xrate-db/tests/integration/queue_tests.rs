use std::time::Duration;

use xrate_core::lifecycle::{JobLifecycleManager, Resolution};
use xrate_core::queue::QueueTransport;
use xrate_core::{AppError, JobRecord, LifecyclePolicy};

use crate::integration::common::setup_test_db;

const TTR: Duration = Duration::from_secs(60);
const SHORT: Duration = Duration::from_millis(20);

#[tokio::test]
async fn put_then_reserve_returns_payload() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates");

    let handle = queue.put(b"hello", 1, Duration::ZERO, TTR).await.unwrap();
    let reservation = queue.reserve(SHORT).await.unwrap().expect("Should reserve");

    assert_eq!(reservation.handle, handle);
    assert_eq!(reservation.payload, b"hello");
}

#[tokio::test]
async fn reserve_times_out_on_empty_tube() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates").with_poll_interval(Duration::from_millis(5));

    let started = std::time::Instant::now();
    let reservation = queue.reserve(Duration::from_millis(30)).await.unwrap();

    assert!(reservation.is_none());
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn reserved_entry_is_not_handed_out_twice() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates");

    queue.put(b"only", 1, Duration::ZERO, TTR).await.unwrap();
    let first = queue.reserve(SHORT).await.unwrap();
    let second = queue.reserve(SHORT).await.unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
}

#[tokio::test]
async fn delayed_entry_becomes_visible_later() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates").with_poll_interval(Duration::from_millis(10));

    queue
        .put(b"later", 1, Duration::from_millis(300), TTR)
        .await
        .unwrap();

    assert!(queue.reserve(SHORT).await.unwrap().is_none());
    let reservation = queue.reserve(Duration::from_secs(2)).await.unwrap();
    assert_eq!(reservation.map(|r| r.payload), Some(b"later".to_vec()));
}

#[tokio::test]
async fn lower_priority_value_is_reserved_first() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates");

    queue.put(b"low", 5, Duration::ZERO, TTR).await.unwrap();
    queue.put(b"urgent", 0, Duration::ZERO, TTR).await.unwrap();

    let reservation = queue.reserve(SHORT).await.unwrap().unwrap();
    assert_eq!(reservation.payload, b"urgent");
}

#[tokio::test]
async fn expired_reservation_is_reservable_again() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates").with_poll_interval(Duration::from_millis(10));

    let handle = queue
        .put(b"slow", 1, Duration::ZERO, Duration::from_millis(100))
        .await
        .unwrap();
    queue.reserve(SHORT).await.unwrap().unwrap();

    let again = queue.reserve(Duration::from_secs(2)).await.unwrap().unwrap();
    assert_eq!(again.handle, handle);
}

#[tokio::test]
async fn tubes_are_isolated() {
    let (db, _container) = setup_test_db().await;
    let rates = db.queue("rates");
    let other = db.queue("other");

    rates.put(b"mine", 1, Duration::ZERO, TTR).await.unwrap();

    assert!(other.reserve(SHORT).await.unwrap().is_none());
    assert!(rates.reserve(SHORT).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_removes_entry_and_rejects_unknown_handle() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates");

    let handle = queue.put(b"gone", 1, Duration::ZERO, TTR).await.unwrap();
    queue.reserve(SHORT).await.unwrap().unwrap();
    queue.delete(handle).await.unwrap();

    assert!(queue.reserve(SHORT).await.unwrap().is_none());
    let err = queue.delete(handle).await.unwrap_err();
    assert!(matches!(err, AppError::Transport(ref msg) if msg.contains("NOT_FOUND")));
}

#[tokio::test]
async fn bury_list_and_kick() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates");

    queue.put(b"a", 1, Duration::ZERO, TTR).await.unwrap();
    queue.put(b"b", 1, Duration::ZERO, TTR).await.unwrap();
    let first = queue.reserve(SHORT).await.unwrap().unwrap();
    let second = queue.reserve(SHORT).await.unwrap().unwrap();
    queue.bury(first.handle, 1).await.unwrap();
    queue.bury(second.handle, 1).await.unwrap();

    let buried = queue.list_buried(10).await.unwrap();
    assert_eq!(buried.len(), 2);
    assert_eq!(buried[0].handle, first.handle);
    assert!(queue.reserve(SHORT).await.unwrap().is_none());

    assert_eq!(queue.kick(1).await.unwrap(), 1);
    assert_eq!(queue.list_buried(10).await.unwrap().len(), 1);
    let kicked = queue.reserve(SHORT).await.unwrap().unwrap();
    assert_eq!(kicked.handle, first.handle);
}

#[tokio::test]
async fn bury_requires_a_reservation() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates");

    let handle = queue.put(b"ready", 1, Duration::ZERO, TTR).await.unwrap();
    assert!(queue.bury(handle, 1).await.is_err());
}

#[tokio::test]
async fn lifecycle_requeues_and_buries_through_postgres() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates");
    let policy = LifecyclePolicy::default().with_delays(Duration::ZERO, Duration::ZERO);
    let manager = JobLifecycleManager::new(queue.clone(), policy);

    manager.enqueue(&JobRecord::new("USD", "EUR")).await.unwrap();

    for attempt in 1..=3 {
        let mut reserved = manager.reserve(SHORT).await.unwrap().expect("Should reserve");
        assert_eq!(reserved.job.fail_count, attempt - 1);
        manager.record_failure(&mut reserved);
        let resolution = manager.settle(reserved).await.unwrap();
        if attempt < 3 {
            assert!(matches!(resolution, Resolution::Requeued { .. }));
        } else {
            assert!(matches!(resolution, Resolution::Buried));
        }
    }

    let buried = queue.list_buried(10).await.unwrap();
    assert_eq!(buried.len(), 1);
    let job = JobRecord::decode(&buried[0].payload).unwrap();
    assert_eq!(job.fail_count, 3);
}

#[tokio::test]
async fn expired_reservation_cannot_be_deleted_or_buried() {
    let (db, _container) = setup_test_db().await;
    let queue = db.queue("rates");

    let handle = queue
        .put(b"late", 1, Duration::ZERO, Duration::from_millis(100))
        .await
        .unwrap();
    queue.reserve(SHORT).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let err = queue.delete(handle).await.unwrap_err();
    assert!(matches!(err, AppError::Transport(ref msg) if msg.contains("NOT_FOUND")));
    assert!(queue.bury(handle, 1).await.is_err());

    // The entry is still there for the next holder.
    let again = queue.reserve(SHORT).await.unwrap().unwrap();
    assert_eq!(again.handle, handle);
    queue.delete(handle).await.unwrap();
}
