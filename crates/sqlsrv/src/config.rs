//! Client configuration surface.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::retry::RetryPolicy;
pub use sqlsrv_pool::PoolConfig;
pub use tds_tls::{ClientIdentity, MinTlsVersion, TlsMode, TlsOptions, TrustRoots};

/// How the session authenticates.
#[derive(Clone)]
pub enum Authentication {
    /// SQL Server authentication: login name and password.
    SqlPassword {
        /// Login name.
        username: String,
        /// Password.
        password: String,
        /// Rotate to this password at login (LOGIN7 change-password
        /// field).
        new_password: Option<String>,
    },
    /// Integrated (Kerberos/SSPI) authentication.
    Integrated,
    /// Federated Azure AD authentication through a token callback.
    Federated {
        /// Supplies a fresh access token per connection.
        provider: Arc<dyn TokenProvider>,
    },
    /// Certificate-based authentication.
    Certificate {
        /// PEM bundle with certificate and key.
        pem_path: std::path::PathBuf,
    },
    /// Asymmetric-key authentication.
    AsymmetricKey {
        /// Key identifier understood by the server.
        key_id: String,
    },
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SqlPassword {
                username,
                new_password,
                ..
            } => f
                .debug_struct("SqlPassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("rotates_password", &new_password.is_some())
                .finish(),
            Self::Integrated => f.write_str("Integrated"),
            Self::Federated { .. } => f.write_str("Federated"),
            Self::Certificate { pem_path } => {
                f.debug_struct("Certificate").field("pem_path", pem_path).finish()
            }
            Self::AsymmetricKey { key_id } => {
                f.debug_struct("AsymmetricKey").field("key_id", key_id).finish()
            }
        }
    }
}

/// Source of federated access tokens.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Produce an access token for a new connection.
    async fn access_token(&self) -> Result<String, Error>;
}

/// Session-default SET options, sent on first use of a connection and
/// after a connection reset.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// `SET QUOTED_IDENTIFIER`.
    pub quoted_identifier: bool,
    /// `SET ANSI_NULLS`.
    pub ansi_nulls: bool,
    /// `SET ANSI_NULL_DFLT_ON`.
    pub ansi_null_default: bool,
    /// `SET ANSI_PADDING`.
    pub ansi_padding: bool,
    /// `SET ANSI_WARNINGS`.
    pub ansi_warnings: bool,
    /// `SET CONCAT_NULL_YIELDS_NULL`.
    pub concat_null_yields_null: bool,
    /// `SET ARITHABORT`.
    pub arithabort: bool,
    /// `SET NOCOUNT`.
    pub nocount: bool,
    /// `SET FMTONLY OFF` (metadata-only mode left off).
    pub fmt_only_off: bool,
    /// `SET TRANSACTION ISOLATION LEVEL`.
    pub isolation: Option<IsolationLevel>,
    /// Extra statements appended verbatim to the defaults batch.
    pub additional_statements: Vec<String>,
}

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// READ UNCOMMITTED.
    ReadUncommitted,
    /// READ COMMITTED.
    ReadCommitted,
    /// REPEATABLE READ.
    RepeatableRead,
    /// SNAPSHOT.
    Snapshot,
    /// SERIALIZABLE.
    Serializable,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Snapshot => "SNAPSHOT",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            quoted_identifier: true,
            ansi_nulls: true,
            ansi_null_default: true,
            ansi_padding: true,
            ansi_warnings: true,
            concat_null_yields_null: true,
            arithabort: true,
            nocount: false,
            fmt_only_off: true,
            isolation: None,
            additional_statements: Vec::new(),
        }
    }
}

impl SessionOptions {
    /// Render the defaults batch; `None` when nothing needs setting.
    #[must_use]
    pub fn to_batch(&self) -> Option<String> {
        fn on_off(v: bool) -> &'static str {
            if v { "ON" } else { "OFF" }
        }
        let mut statements = vec![
            format!("SET QUOTED_IDENTIFIER {}", on_off(self.quoted_identifier)),
            format!("SET ANSI_NULLS {}", on_off(self.ansi_nulls)),
            format!("SET ANSI_NULL_DFLT_ON {}", on_off(self.ansi_null_default)),
            format!("SET ANSI_PADDING {}", on_off(self.ansi_padding)),
            format!("SET ANSI_WARNINGS {}", on_off(self.ansi_warnings)),
            format!(
                "SET CONCAT_NULL_YIELDS_NULL {}",
                on_off(self.concat_null_yields_null)
            ),
            format!("SET ARITHABORT {}", on_off(self.arithabort)),
            format!("SET NOCOUNT {}", on_off(self.nocount)),
        ];
        if self.fmt_only_off {
            statements.push("SET FMTONLY OFF".to_owned());
        }
        if let Some(level) = self.isolation {
            statements.push(format!(
                "SET TRANSACTION ISOLATION LEVEL {}",
                level.as_sql()
            ));
        }
        statements.extend(self.additional_statements.iter().cloned());
        if statements.is_empty() {
            None
        } else {
            Some(statements.join(";\n"))
        }
    }
}

/// Independent timeout knobs.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct Timeouts {
    /// TCP connect (per address tried).
    pub connect: Duration,
    /// The whole PRELOGIN/TLS/LOGIN7 phase.
    pub login: Duration,
    /// One request's result stream.
    pub request: Duration,
    /// Draining tokens after an ATTENTION; the connection is closed when
    /// exceeded.
    pub cancel_drain: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            login: Duration::from_secs(15),
            request: Duration::from_secs(30),
            cancel_drain: Duration::from_secs(5),
        }
    }
}

/// Options for the out-of-core metadata helpers; the core only carries
/// them.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct MetadataOptions {
    /// Cache column descriptions between statements.
    pub cache_columns: bool,
    /// Fetch routine definitions when enumerating.
    pub include_routine_definitions: bool,
    /// Include system schemas when enumerating.
    pub include_system_schemas: bool,
}

/// Per-request advisory execution options.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct ExecutionOptions {
    /// Requested execution mode.
    pub mode: ExecutionMode,
    /// Rowset fetch size for cursor mode.
    pub rowset_fetch_size: Option<u32>,
    /// Minimum interval between progress callbacks.
    pub progress_throttle: Option<Duration>,
}

/// Advisory execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Let the client choose.
    #[default]
    Auto,
    /// Plain batch execution.
    Simple,
    /// Server cursor execution.
    Cursor,
}

/// Complete client configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Server host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Named instance; resolution via SQL Browser happens upstream.
    pub instance: Option<String>,
    /// Try every address a DNS name resolves to before failing.
    pub transparent_network_ip_resolution: bool,
    /// Initial database.
    pub database: Option<String>,
    /// Authentication method.
    pub auth: Authentication,
    /// Application name reported at login.
    pub application_name: String,
    /// Ask for a read-only replica.
    pub read_only_intent: bool,
    /// TLS options.
    pub tls: TlsOptions,
    /// Session-default SET statements.
    pub session: SessionOptions,
    /// Timeout knobs.
    pub timeouts: Timeouts,
    /// Pool sizing.
    pub pool: PoolConfig,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Metadata helper options (forwarded, not consumed).
    pub metadata: MetadataOptions,
    /// Routing redirect budget.
    pub max_redirects: u8,
    /// Packet size requested at login.
    pub packet_size: u32,
}

impl Config {
    /// Configuration for `host` with SQL authentication and defaults
    /// everywhere else.
    #[must_use]
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 1433,
            instance: None,
            transparent_network_ip_resolution: false,
            database: None,
            auth: Authentication::SqlPassword {
                username: username.into(),
                password: password.into(),
                new_password: None,
            },
            application_name: String::from("sqlsrv"),
            read_only_intent: false,
            tls: TlsOptions::required(),
            session: SessionOptions::default(),
            timeouts: Timeouts::default(),
            pool: PoolConfig::default(),
            retry: RetryPolicy::default(),
            metadata: MetadataOptions::default(),
            max_redirects: 4,
            packet_size: 4096,
        }
    }

    /// Set the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the initial database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Rotate the SQL login's password at the next login.
    ///
    /// Only meaningful with [`Authentication::SqlPassword`]; ignored for
    /// the other authentication methods.
    #[must_use]
    pub fn change_password(mut self, new_password: impl Into<String>) -> Self {
        if let Authentication::SqlPassword {
            new_password: slot, ..
        } = &mut self.auth
        {
            *slot = Some(new_password.into());
        }
        self
    }

    /// Replace the TLS options.
    #[must_use]
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Replace the session defaults.
    #[must_use]
    pub fn session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    /// Replace the pool configuration.
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_batch_is_enumerable() {
        let batch = SessionOptions::default().to_batch().unwrap();
        assert!(batch.contains("SET QUOTED_IDENTIFIER ON"));
        assert!(batch.contains("SET ANSI_NULLS ON"));
        assert!(batch.contains("SET NOCOUNT OFF"));
        assert!(batch.contains("SET FMTONLY OFF"));
        assert!(!batch.contains("ISOLATION"));
    }

    #[test]
    fn defaults_batch_is_overridable() {
        let options = SessionOptions {
            nocount: true,
            isolation: Some(IsolationLevel::Snapshot),
            additional_statements: vec!["SET LOCK_TIMEOUT 5000".to_owned()],
            ..SessionOptions::default()
        };
        let batch = options.to_batch().unwrap();
        assert!(batch.contains("SET NOCOUNT ON"));
        assert!(batch.contains("SET TRANSACTION ISOLATION LEVEL SNAPSHOT"));
        assert!(batch.ends_with("SET LOCK_TIMEOUT 5000"));
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let config = Config::new("db.example", "sa", "hunter2").change_password("hunter3");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("hunter3"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("rotates_password: true"));
    }

    #[test]
    fn change_password_reaches_sql_auth_only() {
        let config = Config::new("db.example", "sa", "old").change_password("new");
        match config.auth {
            Authentication::SqlPassword { new_password, .. } => {
                assert_eq!(new_password.as_deref(), Some("new"));
            }
            other => panic!("unexpected auth {other:?}"),
        }

        let mut config = Config::new("db.example", "sa", "old");
        config.auth = Authentication::Integrated;
        let config = config.change_password("new");
        assert!(matches!(config.auth, Authentication::Integrated));
    }
}
