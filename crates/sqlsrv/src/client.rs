//! Pooled session API.

use std::sync::Arc;

use futures_core::Stream;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use sqlsrv_pool::{ConnectionManager, Lease, Pool, PoolStatus};
use tds_values::FromValue;

use crate::config::{Config, ExecutionOptions};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::events::{Event, ExecutionResult, ResultSet};
use crate::handshake;
use crate::row::Row;
use crate::stream;

/// Pool hook-up for [`Connection`].
pub(crate) struct Manager {
    config: Arc<Config>,
}

impl ConnectionManager for Manager {
    type Connection = Connection;
    type Error = Error;

    async fn connect(&self) -> Result<Connection> {
        handshake::connect(&self.config).await
    }

    async fn validate(&self, conn: &mut Connection, query: &str) -> Result<()> {
        conn.execute(query).await.map(|_| ())
    }

    fn recycle(&self, conn: &mut Connection) -> bool {
        conn.recycle()
    }
}

/// A pooled SQL Server client.
///
/// Cheap to clone; all clones share one pool. Each call borrows a
/// connection for its duration, retrying transient failures per the
/// configured policy. `with_connection` pins one connection across several
/// statements (transactions).
#[derive(Clone)]
pub struct Client {
    pool: Pool<Manager>,
    config: Arc<Config>,
    default_database: Arc<RwLock<Option<String>>>,
}

impl Client {
    /// Build a client. Connections are dialled lazily; the pool's
    /// maintenance task pre-warms `min_idle` of them in the background.
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let pool = Pool::new(
            Manager {
                config: Arc::clone(&config),
            },
            config.pool.clone(),
        )?;
        Ok(Self {
            pool,
            config,
            default_database: Arc::new(RwLock::new(None)),
        })
    }

    /// The configuration this client was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current pool counters.
    #[must_use]
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    async fn lease(&self) -> Result<Lease<Manager>> {
        let mut lease = self.pool.acquire().await?;
        let want = self.default_database.read().clone();
        if let Some(database) = want {
            // Idempotent; a clean connection already there sends nothing.
            lease.change_database(&database).await?;
        }
        Ok(lease)
    }

    /// Run `sql`, returning the rows of the last result set.
    pub async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.config
            .retry
            .run(|| async {
                let mut lease = self.lease().await?;
                lease.query_rows(sql).await
            })
            .await
    }

    /// Run `sql`, returning every result set.
    pub async fn query_all(&self, sql: &str) -> Result<Vec<ResultSet>> {
        self.config
            .retry
            .run(|| async {
                let mut lease = self.lease().await?;
                lease.query(sql).await
            })
            .await
    }

    /// Run `sql` for its side effects.
    pub async fn execute(&self, sql: &str) -> Result<ExecutionResult> {
        self.config
            .retry
            .run(|| async {
                let mut lease = self.lease().await?;
                lease.execute(sql).await
            })
            .await
    }

    /// Read a single value: first column of the first row of the first
    /// result set.
    pub async fn query_scalar<T: FromValue>(&self, sql: &str) -> Result<Option<T>> {
        self.config
            .retry
            .run(|| async {
                let mut lease = self.lease().await?;
                lease.query_scalar(sql).await
            })
            .await
    }

    /// Stream the events of `sql`. The stream owns its pooled connection
    /// and is cold until first polled; dropping it mid-results is healed
    /// on the connection's next checkout. Not retried: rows may already
    /// have been observed.
    pub async fn stream_query(
        &self,
        sql: impl Into<String>,
        options: ExecutionOptions,
    ) -> Result<impl Stream<Item = Result<Event>> + Send + 'static> {
        let lease = self.lease().await?;
        Ok(stream::events(lease, sql.into(), options))
    }

    /// Pin one connection for the duration of `body`, enabling
    /// transactional sequences. Not retried.
    ///
    /// ```rust,ignore
    /// client
    ///     .with_connection(|conn| Box::pin(async move {
    ///         conn.execute("BEGIN TRANSACTION").await?;
    ///         conn.execute("UPDATE accounts SET ...").await?;
    ///         conn.execute("COMMIT").await?;
    ///         Ok(())
    ///     }))
    ///     .await?;
    /// ```
    pub async fn with_connection<T, F>(&self, body: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<T>>,
    {
        let mut lease = self.lease().await?;
        body(&mut lease).await
    }

    /// Switch the session's default database. Verified against the server
    /// immediately; subsequent leases are moved there on checkout (a
    /// no-op for connections already in place).
    pub async fn change_database(&self, name: &str) -> Result<()> {
        let mut lease = self.pool.acquire().await?;
        lease.change_database(name).await?;
        *self.default_database.write() = Some(name.to_owned());
        Ok(())
    }

    /// Shut the pool down: refuse new work, give leases a grace period to
    /// come home, then drop the rest.
    pub async fn close(&self) {
        self.pool.close(std::time::Duration::from_secs(30)).await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.config.host)
            .field("pool", &self.pool.status())
            .finish_non_exhaustive()
    }
}
