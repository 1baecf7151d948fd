//! Lazy result streams.
//!
//! Streams are cold: the SQL is not sent until the first poll. Dropping a
//! stream mid-results leaves the connection mid-stream; its next use (or
//! the pool's next checkout) sends an ATTENTION and drains to the
//! acknowledgement, so one abandoned stream costs one round trip.

use std::ops::DerefMut;

use futures_core::Stream;
use futures_util::stream;

use crate::config::ExecutionOptions;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::events::Event;

enum Step<C> {
    Start(C, String),
    Running(C),
    Finished,
}

/// Build a cold event stream over any exclusive handle to a connection
/// (`&mut Connection`, a pool lease).
pub(crate) fn events<C>(
    conn: C,
    sql: String,
    options: ExecutionOptions,
) -> impl Stream<Item = Result<Event>> + Send
where
    C: DerefMut<Target = Connection> + Send,
{
    // Execution options are advisory (§execution_options): carried for
    // cursor-mode layers, inert here.
    let _ = options;
    stream::unfold(Step::Start(conn, sql), drive)
}

async fn drive<C>(step: Step<C>) -> Option<(Result<Event>, Step<C>)>
where
    C: DerefMut<Target = Connection> + Send,
{
    match step {
        Step::Start(mut conn, sql) => match conn.send_batch(&sql).await {
            Ok(()) => next(conn).await,
            Err(e) => Some((Err(e), Step::Finished)),
        },
        Step::Running(conn) => next(conn).await,
        Step::Finished => None,
    }
}

async fn next<C>(mut conn: C) -> Option<(Result<Event>, Step<C>)>
where
    C: DerefMut<Target = Connection> + Send,
{
    match conn.next_event().await {
        Ok(Some(event)) => Some((Ok(event), Step::Running(conn))),
        Ok(None) => match conn.fail_on_errors() {
            Ok(()) => None,
            Err(e) => Some((Err(e), Step::Finished)),
        },
        Err(e) => Some((Err(e), Step::Finished)),
    }
}

impl Connection {
    /// Stream the events of `sql` lazily; nothing is sent until the first
    /// poll. Use [`Connection::cancel_and_drain`] (or just issue the next
    /// request) after abandoning the stream mid-way.
    pub fn stream_batch(
        &mut self,
        sql: impl Into<String>,
        options: ExecutionOptions,
    ) -> impl Stream<Item = Result<Event, Error>> + Send + '_ {
        events(self, sql.into(), options)
    }
}
