//! The connection-manager contract the pool is generic over.

use std::future::Future;

/// Operations the pool needs from the connection implementation.
///
/// The async methods are declared as `impl Future + Send` rather than
/// `async fn` so the pool's background maintenance task can be spawned in
/// generic code; implementations still just write `async fn`.
pub trait ConnectionManager: Send + Sync + 'static {
    /// The pooled resource.
    type Connection: Send + 'static;
    /// Errors from connecting and validating.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish a fresh, authenticated connection with session defaults
    /// applied.
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Run `query` to prove the connection is alive before lending it out.
    fn validate(
        &self,
        conn: &mut Self::Connection,
        query: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Prepare a returned connection for reuse.
    ///
    /// Returns `false` when the connection must be discarded (fatal
    /// protocol state, socket gone). A `true` return may arm a
    /// server-side state reset for the next request.
    fn recycle(&self, conn: &mut Self::Connection) -> bool;
}
