//! Client error taxonomy.

use std::sync::Arc;

use tds_wire::ServerMessage;
use thiserror::Error;

/// Which timeout fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutScope {
    /// TCP connect.
    Connect,
    /// PRELOGIN/TLS/LOGIN7 phase.
    Login,
    /// A request's result stream.
    Request,
    /// Waiting for a pooled connection.
    Acquire,
    /// Draining after an ATTENTION.
    CancelDrain,
}

/// Severity at or above which a server message fails the request.
pub const ERROR_SEVERITY: u8 = 11;

/// Everything that can go wrong against SQL Server.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// LOGIN7 was rejected before LOGINACK.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Socket closed, peer reset, or used after close.
    #[error("connection closed")]
    ConnectionClosed,

    /// A timeout expired.
    #[error("{0:?} timeout expired")]
    Timeout(TimeoutScope),

    /// Unparseable or impossible wire data; the connection is poisoned.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server reported an error of severity ≥ 11.
    #[error("server error {number} (severity {class}): {text}", number = .0.number, class = .0.class, text = .0.text)]
    Server(ServerMessage),

    /// TLS negotiation or configuration failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Transport-level I/O failure.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The server redirected the session elsewhere (Azure gateways).
    /// Internal control flow; surfaced only when redirects are exhausted
    /// or disabled.
    #[error("session routed to {host}:{port}")]
    RoutedTo {
        /// Redirect target host.
        host: String,
        /// Redirect target port.
        port: u16,
    },

    /// The redirect budget ran out.
    #[error("too many routing redirects (budget {budget})")]
    TooManyRedirects {
        /// Configured redirect budget.
        budget: u8,
    },

    /// A capability this client does not implement was requested.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    /// The request was cancelled and the attention acknowledged.
    #[error("request cancelled")]
    Cancelled,

    /// A second request was issued while one is in flight.
    #[error("connection is busy with another request")]
    Busy,

    /// Value conversion failure.
    #[error(transparent)]
    Value(#[from] tds_values::ValueError),

    /// The pool is shut down.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tds_wire::WireError> for Error {
    fn from(e: tds_wire::WireError) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<tds_framing::FramingError> for Error {
    fn from(e: tds_framing::FramingError) -> Self {
        match e {
            tds_framing::FramingError::ConnectionClosed => Self::ConnectionClosed,
            tds_framing::FramingError::Wire(wire) => wire.into(),
            tds_framing::FramingError::Io(io) => Self::Io(Arc::new(io)),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<tds_tls::TlsError> for Error {
    fn from(e: tds_tls::TlsError) -> Self {
        Self::Tls(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<sqlsrv_pool::PoolError<Error>> for Error {
    fn from(e: sqlsrv_pool::PoolError<Error>) -> Self {
        match e {
            sqlsrv_pool::PoolError::Backend(inner) => inner,
            sqlsrv_pool::PoolError::AcquireTimeout(_) => Self::Timeout(TimeoutScope::Acquire),
            sqlsrv_pool::PoolError::Closed => Self::PoolClosed,
            sqlsrv_pool::PoolError::Configuration(msg) => Self::Config(msg.to_owned()),
            _ => Self::Protocol("unexpected pool error".to_owned()),
        }
    }
}

/// Server error numbers worth retrying: deadlocks, timeouts and the Azure
/// throttling/failover family.
const TRANSIENT_SERVER_ERRORS: &[i32] = &[
    -2, 1205, 4060, 10928, 10929, 40197, 40501, 40613, 49918, 49919, 49920, 18456,
];

/// Server error numbers that will never succeed on retry.
const TERMINAL_SERVER_ERRORS: &[i32] = &[102, 207, 208, 547, 2601, 2627];

impl Error {
    /// Whether a retry with a fresh connection could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionClosed
            | Self::Timeout(_)
            | Self::Io(_)
            | Self::RoutedTo { .. } => true,
            Self::Server(message) => TRANSIENT_SERVER_ERRORS.contains(&message.number),
            _ => false,
        }
    }

    /// Whether retrying is pointless regardless of policy.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Config(_) | Self::UnsupportedFeature(_) => true,
            Self::Server(message) => TERMINAL_SERVER_ERRORS.contains(&message.number),
            _ => false,
        }
    }

    /// The server message, when this is a server error.
    #[must_use]
    pub fn server_message(&self) -> Option<&ServerMessage> {
        match self {
            Self::Server(message) => Some(message),
            _ => None,
        }
    }
}

/// Result alias for client operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn server_error(number: i32) -> Error {
        Error::Server(ServerMessage {
            number,
            state: 1,
            class: 16,
            text: "boom".into(),
            server: String::new(),
            procedure: String::new(),
            line: 1,
        })
    }

    #[test]
    fn deadlock_is_transient() {
        assert!(server_error(1205).is_transient());
        assert!(!server_error(1205).is_terminal());
    }

    #[test]
    fn syntax_error_is_terminal() {
        assert!(server_error(102).is_terminal());
        assert!(!server_error(102).is_transient());
    }

    #[test]
    fn timeouts_and_resets_are_transient() {
        assert!(Error::ConnectionClosed.is_transient());
        assert!(Error::Timeout(TimeoutScope::Request).is_transient());
        assert!(!Error::Cancelled.is_transient());
        assert!(!Error::Busy.is_transient());
    }

    #[test]
    fn pool_errors_map_to_kinds() {
        let e: Error =
            sqlsrv_pool::PoolError::<Error>::AcquireTimeout(std::time::Duration::from_secs(1))
                .into();
        assert!(matches!(e, Error::Timeout(TimeoutScope::Acquire)));
    }
}
