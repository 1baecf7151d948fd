//! Pool behaviour tests against an in-memory connection manager.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sqlsrv_pool::{ConnectionManager, Pool, PoolConfig, PoolError};

#[derive(Debug)]
struct TestConn {
    id: usize,
    open: bool,
}

#[derive(Default)]
struct TestManager {
    connects: AtomicUsize,
    fail_next_validation: AtomicBool,
    refuse_recycle: AtomicBool,
    fail_connect: AtomicBool,
}

#[derive(Debug, thiserror::Error)]
#[error("test backend failure")]
struct TestError;

#[derive(Clone)]
struct SharedManager(Arc<TestManager>);

impl std::ops::Deref for SharedManager {
    type Target = TestManager;

    fn deref(&self) -> &TestManager {
        &self.0
    }
}

impl ConnectionManager for SharedManager {
    type Connection = TestConn;
    type Error = TestError;

    async fn connect(&self) -> Result<TestConn, TestError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TestError);
        }
        let id = self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(TestConn { id, open: true })
    }

    async fn validate(&self, conn: &mut TestConn, _query: &str) -> Result<(), TestError> {
        if self.fail_next_validation.swap(false, Ordering::SeqCst) {
            conn.open = false;
            return Err(TestError);
        }
        Ok(())
    }

    fn recycle(&self, conn: &mut TestConn) -> bool {
        conn.open && !self.refuse_recycle.load(Ordering::SeqCst)
    }
}

fn quick_config() -> PoolConfig {
    PoolConfig::new()
        .max_concurrent(2)
        .min_idle(0)
        .acquisition_timeout(Duration::from_millis(200))
}

#[tokio::test]
async fn connections_are_reused_after_release() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let pool = Pool::new(manager.clone(), quick_config()).unwrap();

    let first = pool.acquire().await.unwrap();
    let first_id = first.id;
    drop(first);

    let second = pool.acquire().await.unwrap();
    assert_eq!(second.id, first_id);
    assert_eq!(manager.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn capacity_is_bounded() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let pool = Pool::new(manager.clone(), quick_config()).unwrap();

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let status = pool.status();
    assert_eq!(status.in_use, 2);
    assert!(status.in_use + status.idle <= status.max_concurrent);

    // Third caller times out while both leases are held.
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, PoolError::AcquireTimeout(_)));
    drop(a);
    drop(b);
}

#[tokio::test]
async fn waiters_are_served_fifo() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let config = PoolConfig::new()
        .max_concurrent(1)
        .min_idle(0)
        .acquisition_timeout(Duration::from_secs(5));
    let pool = Pool::new(manager.clone(), config).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let held = pool.acquire().await.unwrap();

    let mut tasks = Vec::new();
    for name in ["first", "second"] {
        let pool = pool.clone();
        let order = Arc::clone(&order);
        tasks.push(tokio::spawn(async move {
            let lease = pool.acquire().await.unwrap();
            order.lock().push(name);
            drop(lease);
        }));
        // Let the waiter park before registering the next one.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    drop(held);
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(&*order.lock(), &["first", "second"]);
}

#[tokio::test]
async fn failed_validation_replaces_the_connection() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let pool = Pool::new(manager.clone(), quick_config()).unwrap();

    let lease = pool.acquire().await.unwrap();
    drop(lease);

    manager.fail_next_validation.store(true, Ordering::SeqCst);
    let lease = pool.acquire().await.unwrap();
    // The invalid idle connection was discarded and a fresh one dialled.
    assert_eq!(manager.connects.load(Ordering::SeqCst), 2);
    assert_eq!(lease.id, 1);
}

#[tokio::test]
async fn refused_recycle_discards() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let pool = Pool::new(manager.clone(), quick_config()).unwrap();

    manager.refuse_recycle.store(true, Ordering::SeqCst);
    let lease = pool.acquire().await.unwrap();
    drop(lease);
    assert_eq!(pool.status().idle, 0);
    assert_eq!(pool.status().in_use, 0);
}

#[tokio::test]
async fn connect_failure_releases_the_slot() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let pool = Pool::new(manager.clone(), quick_config()).unwrap();

    manager.fail_connect.store(true, Ordering::SeqCst);
    assert!(matches!(
        pool.acquire().await.unwrap_err(),
        PoolError::Backend(TestError)
    ));
    // The reserved slot must not leak.
    assert_eq!(pool.status().in_use, 0);

    manager.fail_connect.store(false, Ordering::SeqCst);
    pool.acquire().await.unwrap();
}

#[tokio::test]
async fn maintenance_keeps_min_idle_warm() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let config = PoolConfig::new()
        .max_concurrent(4)
        .min_idle(2)
        .acquisition_timeout(Duration::from_millis(200));
    let pool = Pool::new(manager.clone(), config).unwrap();

    pool.run_maintenance().await;
    let status = pool.status();
    assert_eq!(status.idle, 2);
    assert_eq!(status.in_use, 0);
}

#[tokio::test]
async fn idle_eviction_respects_min_idle() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let config = PoolConfig::new()
        .max_concurrent(4)
        .min_idle(1)
        .idle_timeout(Some(Duration::from_millis(0)))
        .acquisition_timeout(Duration::from_millis(200));
    let pool = Pool::new(manager.clone(), config).unwrap();

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let c = pool.acquire().await.unwrap();
    drop(a);
    drop(b);
    drop(c);
    assert_eq!(pool.status().idle, 3);

    // Zero idle-timeout: everything beyond the warm floor is eligible.
    pool.run_maintenance().await;
    assert_eq!(pool.status().idle, 1);
}

#[tokio::test]
async fn close_refuses_new_acquires() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let pool = Pool::new(manager.clone(), quick_config()).unwrap();

    pool.close(Duration::from_millis(50)).await;
    assert!(pool.is_closed());
    assert!(matches!(
        pool.acquire().await.unwrap_err(),
        PoolError::Closed
    ));
}

#[tokio::test]
async fn close_waits_for_outstanding_lease() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let pool = Pool::new(manager.clone(), quick_config()).unwrap();

    let lease = pool.acquire().await.unwrap();
    let closer = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.close(Duration::from_secs(1)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(lease);
    closer.await.unwrap();
    assert_eq!(pool.status().in_use, 0);
    assert_eq!(pool.status().idle, 0);
}

#[tokio::test]
async fn detach_removes_from_pool_accounting() {
    let manager = SharedManager(Arc::new(TestManager::default()));
    let pool = Pool::new(manager.clone(), quick_config()).unwrap();

    let lease = pool.acquire().await.unwrap();
    let conn = lease.detach();
    assert!(conn.open);
    assert_eq!(pool.status().in_use, 0);
    assert_eq!(pool.status().idle, 0);
}
