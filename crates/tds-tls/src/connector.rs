//! rustls connector built from [`TlsOptions`].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;

use crate::config::{ClientIdentity, MinTlsVersion, TlsOptions, TrustRoots};
use crate::error::TlsError;
use crate::tunnel::PreloginTunnel;

/// Async TLS connector for TDS endpoints.
#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Build a connector from the configuration surface.
    pub fn new(options: &TlsOptions) -> Result<Self, TlsError> {
        let versions: &[&rustls::SupportedProtocolVersion] = match options.min_version {
            MinTlsVersion::Tls12 => &[&rustls::version::TLS13, &rustls::version::TLS12],
            MinTlsVersion::Tls13 => &[&rustls::version::TLS13],
        };
        let builder = ClientConfig::builder_with_protocol_versions(versions);

        let builder = if options.trust_server_certificate {
            tracing::warn!(
                "server certificate validation disabled; the peer is unauthenticated"
            );
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        } else {
            let mut roots = RootCertStore::empty();
            match &options.trust_roots {
                TrustRoots::WebPki => {
                    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                }
                TrustRoots::PemBundle(path) => {
                    for cert in load_certs(path)? {
                        roots.add(cert).map_err(TlsError::Rustls)?;
                    }
                }
            }
            builder.with_root_certificates(roots)
        };

        let config = match &options.client_identity {
            Some(identity) => {
                let (certs, key) = load_identity(identity)?;
                builder.with_client_auth_cert(certs, key)?
            }
            None => builder.with_no_client_auth(),
        };

        Ok(Self {
            inner: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }

    /// Handshake over an already-encrypt-capable stream.
    pub async fn connect<S>(&self, host: &str, stream: S) -> Result<TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let name = server_name(host)?;
        Ok(self.inner.connect(name, stream).await?)
    }

    /// Handshake with the records tunnelled through PRELOGIN packets, as
    /// TDS 7.x requires, then switch the tunnel to pass-through.
    pub async fn connect_tunnelled<S>(
        &self,
        host: &str,
        stream: S,
    ) -> Result<TlsStream<PreloginTunnel<S>>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let name = server_name(host)?;
        let tunnel = PreloginTunnel::new(stream);
        let mut tls = self.inner.connect(name, tunnel).await?;
        tls.get_mut().0.finish_handshake();
        tracing::debug!("TLS handshake completed inside PRELOGIN framing");
        Ok(tls)
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector").finish_non_exhaustive()
    }
}

fn server_name(host: &str) -> Result<ServerName<'static>, TlsError> {
    ServerName::try_from(host.to_owned()).map_err(|_| TlsError::InvalidServerName(host.to_owned()))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Material {
        what: "trust roots",
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::Material {
            what: "trust roots",
            path: path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::EmptyPem("certificate"));
    }
    Ok(certs)
}

fn load_identity(
    identity: &ClientIdentity,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsError> {
    let certs = load_certs(&identity.cert_pem)?;
    let file = File::open(&identity.key_pem).map_err(|source| TlsError::Material {
        what: "client key",
        path: identity.key_pem.display().to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Material {
            what: "client key",
            path: identity.key_pem.display().to_string(),
            source,
        })?
        .ok_or(TlsError::EmptyPem("private key"))?;
    Ok((certs, key))
}

/// Verifier that accepts any certificate (`trust_server_certificate`).
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::TlsOptions;

    #[test]
    fn builds_with_webpki_roots() {
        TlsConnector::new(&TlsOptions::required()).unwrap();
    }

    #[test]
    fn builds_without_validation() {
        let options = TlsOptions {
            trust_server_certificate: true,
            ..TlsOptions::required()
        };
        TlsConnector::new(&options).unwrap();
    }

    #[test]
    fn rejects_bad_server_name() {
        assert!(matches!(
            server_name("not a hostname"),
            Err(TlsError::InvalidServerName(_))
        ));
    }
}
