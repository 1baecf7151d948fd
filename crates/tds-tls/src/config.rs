//! TLS configuration surface.

use std::path::PathBuf;

/// Whether and how strongly to encrypt the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Never negotiate TLS. Login credentials travel obfuscated only;
    /// acceptable for lab setups, nothing else.
    Disabled,
    /// Use TLS when the server offers it, continue in clear otherwise.
    Opportunistic,
    /// Fail the connection unless the whole session is encrypted.
    #[default]
    Required,
}

/// Minimum acceptable protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinTlsVersion {
    /// Accept TLS 1.2 and newer.
    #[default]
    Tls12,
    /// Accept TLS 1.3 only.
    Tls13,
}

/// Where server certificates are validated against.
#[derive(Debug, Clone, Default)]
pub enum TrustRoots {
    /// The bundled webpki root set.
    #[default]
    WebPki,
    /// A PEM bundle on disk (corporate CA, self-signed server).
    PemBundle(PathBuf),
}

/// Client certificate identity for mutual TLS.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// PEM file holding the certificate chain.
    pub cert_pem: PathBuf,
    /// PEM file holding the private key.
    pub key_pem: PathBuf,
}

/// Complete TLS options.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Negotiation stance.
    pub mode: TlsMode,
    /// Minimum protocol version.
    pub min_version: MinTlsVersion,
    /// Trust anchors for server validation.
    pub trust_roots: TrustRoots,
    /// Skip certificate and host name validation entirely.
    ///
    /// Common against servers running with an auto-generated certificate;
    /// it removes all authentication of the peer, so the name is blunt on
    /// purpose.
    pub trust_server_certificate: bool,
    /// Optional client certificate.
    pub client_identity: Option<ClientIdentity>,
}

impl TlsOptions {
    /// Options that refuse unencrypted sessions, validating against webpki.
    #[must_use]
    pub fn required() -> Self {
        Self::default()
    }

    /// Options that disable TLS entirely.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            mode: TlsMode::Disabled,
            ..Self::default()
        }
    }
}
