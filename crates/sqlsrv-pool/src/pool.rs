//! The pool proper.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::manager::ConnectionManager;

/// A bounded connection pool.
///
/// Cloning is cheap and shares the pool. Must be created inside a Tokio
/// runtime (a maintenance task is spawned for idle eviction and min-idle
/// replenishment).
pub struct Pool<M: ConnectionManager> {
    inner: Arc<Inner<M>>,
}

impl<M: ConnectionManager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    state: Mutex<State<M::Connection>>,
    shutdown: AtomicBool,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

struct State<C> {
    idle: VecDeque<Idle<C>>,
    in_use: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
    generation: u64,
}

struct Idle<C> {
    conn: C,
    since: Instant,
    generation: u64,
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Idle connections ready to lend.
    pub idle: usize,
    /// Connections currently lent out (or being created).
    pub in_use: usize,
    /// Configured cap.
    pub max_concurrent: usize,
    /// Callers parked waiting for a connection.
    pub waiters: usize,
}

enum Plan<C> {
    Reuse(C, u64),
    Connect(u64),
    Wait(oneshot::Receiver<()>),
}

impl<M: ConnectionManager> Pool<M> {
    /// Create a pool over `manager`.
    pub fn new(manager: M, config: PoolConfig) -> Result<Self, PoolError<M::Error>> {
        config.validate()?;
        let inner = Arc::new(Inner {
            manager,
            config,
            state: Mutex::new(State {
                idle: VecDeque::new(),
                in_use: 0,
                waiters: VecDeque::new(),
                generation: 0,
            }),
            shutdown: AtomicBool::new(false),
            maintenance: Mutex::new(None),
        });
        let handle = spawn_maintenance(&inner);
        *inner.maintenance.lock() = Some(handle);
        Ok(Self { inner })
    }

    /// Borrow a connection, waiting FIFO behind earlier callers when the
    /// pool is at capacity.
    pub async fn acquire(&self) -> Result<Lease<M>, PoolError<M::Error>> {
        let timeout = self.inner.config.acquisition_timeout;
        let deadline = Instant::now() + timeout;

        loop {
            if self.inner.shutdown.load(Ordering::Acquire) {
                return Err(PoolError::Closed);
            }

            let plan = {
                let mut state = self.inner.state.lock();
                if let Some(slot) = state.idle.pop_back() {
                    state.in_use += 1;
                    Plan::Reuse(slot.conn, slot.generation)
                } else if state.in_use + state.idle.len() < self.inner.config.max_concurrent {
                    state.in_use += 1;
                    state.generation += 1;
                    Plan::Connect(state.generation)
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Plan::Wait(rx)
                }
            };

            match plan {
                Plan::Reuse(mut conn, generation) => {
                    if let Some(query) = self.inner.config.validation_query.clone() {
                        if let Err(error) = self.inner.manager.validate(&mut conn, &query).await {
                            tracing::debug!(%error, "idle connection failed validation, replacing");
                            drop(conn);
                            self.inner.release_permit();
                            continue;
                        }
                    }
                    return Ok(Lease::new(Arc::clone(&self.inner), conn, generation));
                }
                Plan::Connect(generation) => match self.inner.manager.connect().await {
                    Ok(conn) => {
                        tracing::debug!(generation, "pool opened a new connection");
                        return Ok(Lease::new(Arc::clone(&self.inner), conn, generation));
                    }
                    Err(error) => {
                        self.inner.release_permit();
                        return Err(PoolError::Backend(error));
                    }
                },
                Plan::Wait(rx) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PoolError::AcquireTimeout(timeout));
                    }
                    match tokio::time::timeout(deadline - now, rx).await {
                        Ok(_) => continue,
                        Err(_elapsed) => return Err(PoolError::AcquireTimeout(timeout)),
                    }
                }
            }
        }
    }

    /// Snapshot of the pool counters.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            in_use: state.in_use,
            max_concurrent: self.inner.config.max_concurrent,
            waiters: state.waiters.len(),
        }
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// One maintenance pass: evict idle connections beyond `min_idle` that
    /// outlived `idle_timeout`, then replenish the warm floor.
    pub async fn run_maintenance(&self) {
        maintenance_pass(&self.inner).await;
    }

    /// Shut down: refuse new acquires, wait up to `grace` for leases to
    /// come home, then drop whatever remains.
    pub async fn close(&self, grace: Duration) {
        self.inner.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.inner.maintenance.lock().take() {
            handle.abort();
        }
        {
            let mut state = self.inner.state.lock();
            // Wake every parked caller so it can observe the flag.
            while let Some(tx) = state.waiters.pop_front() {
                let _ = tx.send(());
            }
            state.idle.clear();
        }

        let deadline = Instant::now() + grace;
        loop {
            {
                let mut state = self.inner.state.lock();
                state.idle.clear();
                if state.in_use == 0 {
                    break;
                }
            }
            if Instant::now() >= deadline {
                tracing::warn!("pool grace period expired with leases outstanding");
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tracing::debug!("pool closed");
    }
}

impl<M: ConnectionManager> Inner<M> {
    /// Give back a reserved-but-unused capacity slot.
    fn release_permit(&self) {
        let mut state = self.state.lock();
        state.in_use -= 1;
        Self::wake_locked(&mut state);
    }

    fn checkin(&self, conn: M::Connection, generation: u64) {
        let mut state = self.state.lock();
        state.in_use -= 1;
        state.idle.push_back(Idle {
            conn,
            since: Instant::now(),
            generation,
        });
        Self::wake_locked(&mut state);
    }

    fn wake_locked(state: &mut State<M::Connection>) {
        while let Some(tx) = state.waiters.pop_front() {
            if tx.send(()).is_ok() {
                break;
            }
            // Receiver gone (acquire timed out or was cancelled); try the
            // next in line.
        }
    }
}

fn spawn_maintenance<M: ConnectionManager>(inner: &Arc<Inner<M>>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        loop {
            let interval = match weak.upgrade() {
                Some(inner) => inner.config.maintenance_interval,
                None => return,
            };
            tokio::time::sleep(interval).await;
            let Some(inner) = weak.upgrade() else { return };
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            maintenance_pass(&inner).await;
        }
    })
}

async fn maintenance_pass<M: ConnectionManager>(inner: &Arc<Inner<M>>) {
    // Eviction: drop long-idle connections beyond the warm floor.
    if let Some(idle_timeout) = inner.config.idle_timeout {
        let evicted = {
            let mut state = inner.state.lock();
            let mut evicted = Vec::new();
            while state.idle.len() > inner.config.min_idle
                && state
                    .idle
                    .front()
                    .is_some_and(|slot| slot.since.elapsed() >= idle_timeout)
            {
                if let Some(slot) = state.idle.pop_front() {
                    evicted.push(slot);
                }
            }
            evicted
        };
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "evicted idle connections");
        }
        drop(evicted);
    }

    // Replenishment: keep `min_idle` warm while capacity allows.
    loop {
        let generation = {
            let mut state = inner.state.lock();
            let total = state.in_use + state.idle.len();
            if state.idle.len() >= inner.config.min_idle
                || total >= inner.config.max_concurrent
                || inner.shutdown.load(Ordering::Acquire)
            {
                break;
            }
            state.in_use += 1; // reserve the slot while connecting
            state.generation += 1;
            state.generation
        };
        match inner.manager.connect().await {
            Ok(conn) => inner.checkin(conn, generation),
            Err(error) => {
                tracing::warn!(%error, "min-idle replenishment failed");
                inner.release_permit();
                break;
            }
        }
    }
}

/// A borrowed connection; returns to the pool on drop.
pub struct Lease<M: ConnectionManager> {
    inner: Arc<Inner<M>>,
    conn: Option<M::Connection>,
    generation: u64,
}

impl<M: ConnectionManager> Lease<M> {
    fn new(inner: Arc<Inner<M>>, conn: M::Connection, generation: u64) -> Self {
        Self {
            inner,
            conn: Some(conn),
            generation,
        }
    }

    /// Slot generation, for diagnosing stale-lease bugs.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Remove the connection from pool management entirely.
    #[must_use]
    pub fn detach(mut self) -> M::Connection {
        let conn = self.conn.take();
        self.inner.release_permit();
        #[allow(clippy::expect_used)]
        conn.expect("lease connection taken twice")
    }

    /// Drop the connection instead of returning it (fatal protocol state).
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn);
            self.inner.release_permit();
        }
    }
}

impl<M: ConnectionManager> std::fmt::Debug for Lease<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease").field("generation", &self.generation).finish()
    }
}

impl<M: ConnectionManager> std::ops::Deref for Lease<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        #[allow(clippy::expect_used)]
        self.conn.as_ref().expect("lease used after detach")
    }
}

impl<M: ConnectionManager> std::ops::DerefMut for Lease<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        #[allow(clippy::expect_used)]
        self.conn.as_mut().expect("lease used after detach")
    }
}

impl<M: ConnectionManager> Drop for Lease<M> {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if self.inner.shutdown.load(Ordering::Acquire) {
            drop(conn);
            self.inner.release_permit();
            return;
        }
        if self.inner.manager.recycle(&mut conn) {
            self.inner.checkin(conn, self.generation);
        } else {
            tracing::debug!("discarding connection the manager refused to recycle");
            drop(conn);
            self.inner.release_permit();
        }
    }
}
