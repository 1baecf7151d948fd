//! Split transport with out-of-band cancellation.
//!
//! The stream is split so an ATTENTION packet can be written while a read
//! of the current result set is parked. The write half sits behind an async
//! mutex shared with [`AttentionHandle`] clones.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tds_wire::packet::PacketType;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::{OutboundMessage, Packet, PacketCodec};
use crate::error::FramingError;

/// Packet-level transport over any async byte stream.
pub struct Transport<S> {
    reader: FramedRead<ReadHalf<S>, PacketCodec>,
    writer: Arc<Mutex<FramedWrite<WriteHalf<S>, PacketCodec>>>,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Split `stream` into framed halves.
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FramedRead::new(read_half, PacketCodec::new()),
            writer: Arc::new(Mutex::new(FramedWrite::new(write_half, PacketCodec::new()))),
        }
    }

    /// A handle that can cancel the in-flight request from another task.
    #[must_use]
    pub fn attention_handle(&self) -> AttentionHandle<S> {
        AttentionHandle {
            writer: Arc::clone(&self.writer),
        }
    }

    /// Apply a packet size granted by the server to both directions.
    pub async fn set_packet_size(&mut self, size: usize) {
        self.reader.decoder_mut().set_packet_size(size);
        self.writer.lock().await.encoder_mut().set_packet_size(size);
    }

    /// Send one message, flushing it to the socket.
    pub async fn send(&mut self, message: OutboundMessage) -> Result<(), FramingError>
    where
        S: Unpin,
    {
        let mut writer = self.writer.lock().await;
        writer.send(message).await
    }

    /// Receive the next packet; `None` on orderly EOF.
    pub async fn recv(&mut self) -> Result<Option<Packet>, FramingError>
    where
        S: Unpin,
    {
        self.reader.next().await.transpose()
    }
}

impl<S> std::fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Clonable handle for sending ATTENTION out of band.
pub struct AttentionHandle<S> {
    writer: Arc<Mutex<FramedWrite<WriteHalf<S>, PacketCodec>>>,
}

impl<S> AttentionHandle<S>
where
    S: AsyncWrite + Unpin,
{
    /// Send the cancel signal. The engine must then drain until a DONE with
    /// the attention-ack bit.
    pub async fn send_attention(&self) -> Result<(), FramingError> {
        tracing::debug!("sending ATTENTION");
        let mut writer = self.writer.lock().await;
        writer
            .send(OutboundMessage::new(PacketType::Attention, Bytes::new()))
            .await
    }
}

impl<S> Clone for AttentionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<S> std::fmt::Debug for AttentionHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttentionHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_over_duplex() {
        let (client, server) = tokio::io::duplex(1 << 16);
        let mut a = Transport::new(client);
        let mut b = Transport::new(server);

        a.send(OutboundMessage::new(
            PacketType::SqlBatch,
            Bytes::from_static(b"hello"),
        ))
        .await
        .unwrap();

        let packet = b.recv().await.unwrap().unwrap();
        assert_eq!(packet.header.ty, PacketType::SqlBatch);
        assert_eq!(&packet.payload[..], b"hello");
    }

    #[tokio::test]
    async fn attention_interleaves_with_reads() {
        let (client, server) = tokio::io::duplex(1 << 16);
        let mut a = Transport::new(client);
        let mut b = Transport::new(server);

        let handle = a.attention_handle();
        // Reader side is idle; the handle can still write.
        handle.send_attention().await.unwrap();

        let packet = b.recv().await.unwrap().unwrap();
        assert_eq!(packet.header.ty, PacketType::Attention);
        assert!(packet.payload.is_empty());
    }

    #[tokio::test]
    async fn eof_is_none() {
        let (client, server) = tokio::io::duplex(64);
        let mut b = Transport::new(server);
        drop(client);
        assert!(b.recv().await.unwrap().is_none());
    }
}
