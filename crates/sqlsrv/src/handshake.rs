//! Connect and login: PRELOGIN, optional TLS upgrade, LOGIN7, and the
//! routing-redirect loop.
//!
//! The PRELOGIN exchange runs over the raw TCP stream; when encryption is
//! negotiated the TLS handshake rides inside PRELOGIN-typed packets and the
//! session continues over TLS. LOGIN7 then goes through the packet
//! transport, and the login response stream is absorbed into the fresh
//! connection's state.

use bytes::{BufMut, Bytes, BytesMut};
use tds_framing::{OutboundMessage, Transport};
use tds_tls::{TlsConnector, TlsMode};
use tds_wire::login7::{FeatureExt, Login7, TypeFlags, feature};
use tds_wire::packet::{HEADER_LEN, PacketHeader, PacketStatus, PacketType};
use tds_wire::prelogin::{Encrypt, PreLogin};
use tds_wire::{EnvChange, TdsVersion};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{Authentication, Config};
use crate::connection::{BoxedIo, Connection};
use crate::error::{Error, Result, TimeoutScope};
use crate::events::Event;

/// Dial and log in, following routing redirects within the budget.
pub(crate) async fn connect(config: &Config) -> Result<Connection> {
    let mut target = (config.host.clone(), config.port);
    let mut redirects = 0u8;
    loop {
        tracing::info!(host = %target.0, port = target.1, "connecting to SQL Server");
        let tcp = dial(config, &target.0, target.1).await?;
        let attempt = timeout(config.timeouts.login, establish(config, &target.0, tcp))
            .await
            .map_err(|_| Error::Timeout(TimeoutScope::Login))?;
        match attempt {
            Err(Error::RoutedTo { host, port }) => {
                redirects += 1;
                if redirects > config.max_redirects {
                    return Err(Error::TooManyRedirects {
                        budget: config.max_redirects,
                    });
                }
                tracing::info!(%host, port, redirects, "following routing redirect");
                target = (host, port);
            }
            other => return other,
        }
    }
}

/// Resolve and dial, honoring transparent-network-IP-resolution.
async fn dial(config: &Config, host: &str, port: u16) -> Result<TcpStream> {
    let addrs: Vec<_> = tokio::net::lookup_host((host, port)).await?.collect();
    if addrs.is_empty() {
        return Err(Error::Config(format!("{host} resolved to no addresses")));
    }
    let candidates = if config.transparent_network_ip_resolution {
        addrs
    } else {
        addrs[..1].to_vec()
    };

    let mut last_error = None;
    for addr in candidates {
        match timeout(config.timeouts.connect, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => {
                tracing::debug!(%addr, error = %e, "address failed, trying next");
                last_error = Some(Error::from(e));
            }
            Err(_) => {
                last_error = Some(Error::Timeout(TimeoutScope::Connect));
            }
        }
    }
    Err(last_error.unwrap_or(Error::Timeout(TimeoutScope::Connect)))
}

/// Full handshake over an already-open stream.
///
/// Public so tests and embedders can run the protocol over any transport
/// (in-memory pipes, proxies); `Connection::connect` composes `dial` with
/// this.
pub async fn establish<S>(config: &Config, host: &str, mut io: S) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // PRELOGIN runs over the raw stream; everything later is framed.
    let client_encrypt = client_encrypt(&config.tls.mode);
    let mut request = PreLogin::client(TdsVersion::V7_4, client_encrypt);
    request.instance = config.instance.clone();
    request.fed_auth_required = matches!(config.auth, Authentication::Federated { .. });
    write_raw_packet(&mut io, PacketType::PreLogin, &request.encode()).await?;
    let response = PreLogin::decode(&read_raw_packet(&mut io).await?)?;

    let product = response.product_version();
    tracing::debug!(
        server_version = format!("{}.{}.{}", product.0, product.1, product.2),
        encryption = ?response.encryption,
        "PRELOGIN response"
    );

    let io: BoxedIo = if negotiate_encryption(config.tls.mode, client_encrypt, response.encryption)? {
        let connector = TlsConnector::new(&config.tls)?;
        let tls = connector.connect_tunnelled(host, io).await?;
        Box::new(tls)
    } else {
        tracing::debug!("continuing without TLS");
        Box::new(io)
    };

    let mut transport = Transport::new(io);
    let login = build_login7(config, host).await?;
    transport
        .send(OutboundMessage::new(PacketType::Login7, login.encode()))
        .await
        .map_err(Error::from)?;

    let mut conn = Connection::from_transport(
        transport,
        config.session.clone(),
        config.timeouts,
        config.database.clone(),
    );
    conn.set_server_version(product);
    absorb_login_response(&mut conn).await?;

    if let Some((host, port)) = conn.take_routing() {
        // The original endpoint must see nothing further; reconnect fresh.
        conn.close().await;
        return Err(Error::RoutedTo { host, port });
    }
    Ok(conn)
}

/// Read the LOGINACK/ENVCHANGE/FEATUREEXTACK stream that answers LOGIN7.
async fn absorb_login_response(conn: &mut Connection) -> Result<()> {
    conn.expect_response();
    let mut authenticated = false;
    loop {
        match conn.next_event().await {
            Ok(Some(event)) => match event {
                Event::LoginAck(ack) => {
                    tracing::debug!(program = %ack.program, tds = ?TdsVersion::from_raw(ack.tds_version), "login acknowledged");
                    authenticated = true;
                }
                Event::Message(message) if message.is_error() && !authenticated => {
                    return Err(Error::AuthenticationFailed(message.text));
                }
                Event::Message(message) => {
                    tracing::debug!(number = message.number, text = %message.text, "login message");
                }
                Event::EnvChange(EnvChange::Routing { .. }) => {
                    // Recorded on the connection; handled by the caller.
                }
                _ => {}
            },
            Ok(None) => break,
            // Servers slam the socket shut after a rejected login; prefer
            // the authentication error over the transport one.
            Err(Error::ConnectionClosed) if !authenticated => {
                return Err(Error::AuthenticationFailed(
                    "server closed the connection during login".into(),
                ));
            }
            Err(e) => return Err(e),
        }
    }
    if !authenticated {
        return Err(Error::Protocol("login response carried no LOGINACK".into()));
    }
    conn.fail_on_errors()
}

fn client_encrypt(mode: &TlsMode) -> Encrypt {
    match mode {
        TlsMode::Disabled => Encrypt::NotSupported,
        TlsMode::Opportunistic => Encrypt::Off,
        TlsMode::Required => Encrypt::On,
    }
}

/// Resolve the encryption matrix; `Ok(true)` means the session upgrades
/// to TLS (kept on for its whole lifetime, even when only the login
/// strictly required it).
fn negotiate_encryption(mode: TlsMode, client: Encrypt, server: Encrypt) -> Result<bool> {
    match (client, server) {
        (Encrypt::NotSupported, Encrypt::NotSupported | Encrypt::Off) => Ok(false),
        (Encrypt::NotSupported, _) => Err(Error::Tls(
            "server requires encryption but TLS is disabled".into(),
        )),
        (_, Encrypt::NotSupported) => {
            if mode == TlsMode::Required {
                Err(Error::Tls(
                    "server does not support the required encryption".into(),
                ))
            } else {
                tracing::warn!("server cannot encrypt; continuing in clear text");
                Ok(false)
            }
        }
        _ => Ok(true),
    }
}

async fn build_login7(config: &Config, server_host: &str) -> Result<Login7> {
    let mut login = Login7 {
        packet_size: config.packet_size,
        hostname: std::env::var("HOSTNAME").unwrap_or_default(),
        app_name: config.application_name.clone(),
        server_name: server_host.to_owned(),
        database: config.database.clone().unwrap_or_default(),
        ..Login7::default()
    };
    if config.read_only_intent {
        login.type_flags |= TypeFlags::READ_ONLY_INTENT;
    }

    match &config.auth {
        Authentication::SqlPassword {
            username,
            password,
            new_password,
        } => {
            login.username = username.clone();
            login.password = password.clone();
            if let Some(new_password) = new_password {
                login.change_password = new_password.clone();
            }
        }
        Authentication::Federated { provider } => {
            let token = provider.access_token().await?;
            login.features.push(FeatureExt {
                id: feature::FED_AUTH,
                data: fed_auth_feature_data(&token),
            });
        }
        Authentication::Integrated => {
            // Establishing a GSS/SSPI context belongs to an auth layer this
            // client does not ship; the LOGIN7 plumbing for it is in place.
            return Err(Error::UnsupportedFeature("integrated authentication"));
        }
        Authentication::Certificate { .. } => {
            return Err(Error::UnsupportedFeature("certificate authentication"));
        }
        Authentication::AsymmetricKey { .. } => {
            return Err(Error::UnsupportedFeature("asymmetric-key authentication"));
        }
    }
    Ok(login)
}

/// FEDAUTH feature payload: security-token workflow, then the token.
fn fed_auth_feature_data(token: &str) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0x02); // library: security token, no echo
    let units: Vec<u16> = token.encode_utf16().collect();
    buf.put_u32_le((units.len() * 2) as u32);
    for unit in units {
        buf.put_u16_le(unit);
    }
    buf.freeze()
}

/// Write one unframed packet during the pre-transport phase.
async fn write_raw_packet<S>(io: &mut S, ty: PacketType, payload: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let header = PacketHeader::outbound(ty, PacketStatus::END_OF_MESSAGE, payload.len(), 1);
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    header.encode(&mut buf);
    buf.put_slice(payload);
    io.write_all(&buf).await?;
    io.flush().await?;
    Ok(())
}

/// Read one packet's payload during the pre-transport phase. The PRELOGIN
/// answer arrives typed either PRELOGIN or TABULAR_RESULT depending on
/// server generation; both are accepted.
async fn read_raw_packet<S>(io: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    io.read_exact(&mut header).await?;
    if header[0] != PacketType::PreLogin as u8 && header[0] != PacketType::TabularResult as u8 {
        return Err(Error::Protocol(format!(
            "unexpected packet type 0x{:02X} in PRELOGIN response",
            header[0]
        )));
    }
    let length = u16::from_be_bytes([header[2], header[3]]) as usize;
    if length < HEADER_LEN {
        return Err(Error::Protocol("impossible PRELOGIN packet length".into()));
    }
    let mut payload = vec![0u8; length - HEADER_LEN];
    io.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encryption_matrix() {
        use Encrypt::*;
        // Both sides unable: plaintext session.
        assert!(!negotiate_encryption(TlsMode::Disabled, NotSupported, NotSupported).unwrap());
        assert!(!negotiate_encryption(TlsMode::Disabled, NotSupported, Off).unwrap());
        // Server demands what the client cannot do.
        assert!(negotiate_encryption(TlsMode::Disabled, NotSupported, Required).is_err());
        // Client demands what the server cannot do.
        assert!(negotiate_encryption(TlsMode::Required, On, NotSupported).is_err());
        // Opportunistic client accepts a non-TLS server.
        assert!(!negotiate_encryption(TlsMode::Opportunistic, Off, NotSupported).unwrap());
        // Everything else encrypts.
        assert!(negotiate_encryption(TlsMode::Required, On, Required).unwrap());
        assert!(negotiate_encryption(TlsMode::Opportunistic, Off, Off).unwrap());
    }
}
