//! The PRELOGIN handshake tunnel.
//!
//! Until the TLS handshake completes, TDS 7.x requires every TLS record to
//! travel inside a PRELOGIN-typed TDS packet. This adapter sits between the
//! TCP stream and the TLS engine: during the handshake it frames written
//! records and strips the framing from read ones; afterwards it is a
//! transparent pass-through.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const HEADER_LEN: usize = 8;
const PRELOGIN: u8 = 0x12;
const END_OF_MESSAGE: u8 = 0x01;

/// Stream adapter framing TLS records as PRELOGIN packets.
pub struct PreloginTunnel<S> {
    io: S,
    handshaking: bool,

    // Inbound: header being collected, then payload countdown.
    header: [u8; HEADER_LEN],
    header_filled: usize,
    payload_left: usize,

    // Outbound: records staged behind a header placeholder until flush.
    staged: Vec<u8>,
    flush_pos: Option<usize>,
}

impl<S> PreloginTunnel<S> {
    /// Wrap `io`, starting in handshake (framing) mode.
    pub fn new(io: S) -> Self {
        Self {
            io,
            handshaking: true,
            header: [0u8; HEADER_LEN],
            header_filled: 0,
            payload_left: 0,
            staged: vec![0u8; HEADER_LEN],
            flush_pos: None,
        }
    }

    /// Switch to pass-through once the TLS handshake has completed.
    pub fn finish_handshake(&mut self) {
        tracing::trace!("PRELOGIN tunnel switching to pass-through");
        self.handshaking = false;
    }

    /// Borrow the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.io
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PreloginTunnel<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.handshaking {
            return Pin::new(&mut this.io).poll_read(cx, out);
        }

        // Between packets: collect the 8-byte header first.
        while this.payload_left == 0 {
            while this.header_filled < HEADER_LEN {
                let mut header_buf = ReadBuf::new(&mut this.header[this.header_filled..]);
                ready!(Pin::new(&mut this.io).poll_read(cx, &mut header_buf))?;
                let n = header_buf.filled().len();
                if n == 0 {
                    return Poll::Ready(Ok(())); // EOF
                }
                this.header_filled += n;
            }
            if this.header[0] != PRELOGIN {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "expected PRELOGIN packet during TLS handshake, got type 0x{:02X}",
                        this.header[0]
                    ),
                )));
            }
            let total = u16::from_be_bytes([this.header[2], this.header[3]]) as usize;
            this.payload_left = total.saturating_sub(HEADER_LEN);
            this.header_filled = 0;
        }

        // Inside a packet: hand at most the remaining payload to TLS.
        let want = this.payload_left.min(out.remaining());
        let mut scratch = vec![0u8; want];
        let mut scratch_buf = ReadBuf::new(&mut scratch);
        ready!(Pin::new(&mut this.io).poll_read(cx, &mut scratch_buf))?;
        let n = scratch_buf.filled().len();
        out.put_slice(&scratch[..n]);
        this.payload_left -= n;
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PreloginTunnel<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if !this.handshaking {
            return Pin::new(&mut this.io).poll_write(cx, data);
        }
        // Stage the record; it goes out framed on the next flush.
        this.staged.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.handshaking && this.staged.len() > HEADER_LEN {
            if this.flush_pos.is_none() {
                let total = this.staged.len();
                this.staged[0] = PRELOGIN;
                this.staged[1] = END_OF_MESSAGE;
                this.staged[2..4].copy_from_slice(&(total as u16).to_be_bytes());
                this.staged[4] = 0; // spid
                this.staged[5] = 0;
                this.staged[6] = 1; // packet id
                this.staged[7] = 0; // window
                this.flush_pos = Some(0);
                tracing::trace!(total, "framing TLS records into PRELOGIN packet");
            }
            while let Some(pos) = this.flush_pos {
                if pos >= this.staged.len() {
                    break;
                }
                let n = ready!(Pin::new(&mut this.io).poll_write(cx, &this.staged[pos..]))?;
                this.flush_pos = Some(pos + n);
            }
            this.staged.truncate(0);
            this.staged.resize(HEADER_LEN, 0);
            this.flush_pos = None;
        }
        Pin::new(&mut this.io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn writes_are_framed_during_handshake() {
        let (near, far) = tokio::io::duplex(1 << 16);
        let mut tunnel = PreloginTunnel::new(near);

        tunnel.write_all(b"CLIENTHELLO").await.unwrap();
        tunnel.flush().await.unwrap();

        let mut far = far;
        let mut packet = vec![0u8; HEADER_LEN + 11];
        far.read_exact(&mut packet).await.unwrap();
        assert_eq!(packet[0], PRELOGIN);
        assert_eq!(packet[1], END_OF_MESSAGE);
        assert_eq!(
            u16::from_be_bytes([packet[2], packet[3]]) as usize,
            packet.len()
        );
        assert_eq!(&packet[HEADER_LEN..], b"CLIENTHELLO");
    }

    #[tokio::test]
    async fn reads_strip_packet_framing() {
        let (near, far) = tokio::io::duplex(1 << 16);
        let mut tunnel = PreloginTunnel::new(near);

        let mut framed = Vec::new();
        let payload = b"SERVERHELLO";
        framed.push(PRELOGIN);
        framed.push(END_OF_MESSAGE);
        framed.extend_from_slice(&((HEADER_LEN + payload.len()) as u16).to_be_bytes());
        framed.extend_from_slice(&[0, 0, 1, 0]);
        framed.extend_from_slice(payload);

        let mut far = far;
        far.write_all(&framed).await.unwrap();

        let mut got = vec![0u8; payload.len()];
        tunnel.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, payload);
    }

    #[tokio::test]
    async fn reads_span_multiple_packets() {
        let (near, far) = tokio::io::duplex(1 << 16);
        let mut tunnel = PreloginTunnel::new(near);

        let mut framed = Vec::new();
        for payload in [b"AB".as_slice(), b"CDE".as_slice()] {
            framed.push(PRELOGIN);
            framed.push(END_OF_MESSAGE);
            framed.extend_from_slice(&((HEADER_LEN + payload.len()) as u16).to_be_bytes());
            framed.extend_from_slice(&[0, 0, 1, 0]);
            framed.extend_from_slice(payload);
        }
        let mut far = far;
        far.write_all(&framed).await.unwrap();

        let mut got = vec![0u8; 5];
        tunnel.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"ABCDE");
    }

    #[tokio::test]
    async fn non_prelogin_packet_is_rejected() {
        let (near, far) = tokio::io::duplex(1 << 16);
        let mut tunnel = PreloginTunnel::new(near);

        let framed = vec![0x04, 0x01, 0x00, 0x09, 0, 0, 1, 0, 0xAA];
        let mut far = far;
        far.write_all(&framed).await.unwrap();

        let mut got = [0u8; 1];
        let err = tunnel.read_exact(&mut got).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn passthrough_after_handshake() {
        let (near, far) = tokio::io::duplex(1 << 16);
        let mut tunnel = PreloginTunnel::new(near);
        tunnel.finish_handshake();

        tunnel.write_all(b"raw").await.unwrap();
        tunnel.flush().await.unwrap();

        let mut far = far;
        let mut got = [0u8; 3];
        far.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"raw");
    }
}
