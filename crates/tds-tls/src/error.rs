//! TLS-layer errors.

use thiserror::Error;

/// Failures while configuring or performing TLS.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TlsError {
    /// Host name is not a valid TLS server name.
    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// rustls rejected the configuration or handshake.
    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),

    /// A trust-root or client-identity file could not be loaded.
    #[error("cannot load {what} from {path}: {source}")]
    Material {
        /// What was being loaded.
        what: &'static str,
        /// Offending path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The identity file contained no usable key or certificate.
    #[error("no usable {0} found in PEM input")]
    EmptyPem(&'static str),

    /// Transport I/O failure during the handshake.
    #[error("I/O error during TLS handshake: {0}")]
    Io(#[from] std::io::Error),
}
