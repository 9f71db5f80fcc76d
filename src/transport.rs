//! Collaborator interfaces consumed by the session engine.
//!
//! The engine never touches sockets or wire bytes directly: datagram I/O
//! goes through [`DatagramTransport`] / [`DatagramChannel`], and the
//! byte-level packet layout is owned by a [`PacketCodec`]. Both are supplied
//! by the host at session construction.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::packet::rtcp::CompoundControlPacket;
use crate::packet::DataPacket;
use crate::Result;

/// Stream of inbound datagrams for one bound channel, in arrival order
pub type IncomingDatagrams = mpsc::Receiver<(SocketAddr, Bytes)>;

/// Socket-level hints passed through to the transport at bind time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Requested send buffer size in bytes
    pub send_buffer_size: usize,

    /// Requested receive buffer size in bytes
    pub receive_buffer_size: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            send_buffer_size: 1500,
            receive_buffer_size: 1500,
        }
    }
}

/// Factory for datagram channels (UDP in production, in-memory in tests)
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Bind a channel on `local_addr`.
    ///
    /// Returns the send half and the inbound datagram stream. The stream
    /// must preserve arrival order and must end once the channel is closed.
    /// Implementations may honor or ignore the socket `options`.
    async fn bind(
        &self,
        local_addr: SocketAddr,
        options: ChannelOptions,
    ) -> Result<(Arc<dyn DatagramChannel>, IncomingDatagrams)>;
}

/// Send half of a bound datagram channel
#[async_trait]
pub trait DatagramChannel: Send + Sync {
    /// The address the channel is bound to
    fn local_addr(&self) -> SocketAddr;

    /// Send one datagram to `remote`
    async fn send(&self, payload: Bytes, remote: SocketAddr) -> Result<()>;

    /// Close the channel. Ends the inbound datagram stream returned by
    /// [`DatagramTransport::bind`].
    async fn close(&self);
}

/// Byte-level packet codec.
///
/// Decode failures on ingress are logged and the datagram dropped; the
/// session never terminates on malformed input.
pub trait PacketCodec: Send + Sync {
    /// Decode an RTP data packet
    fn decode_data(&self, buf: &[u8]) -> Result<DataPacket>;

    /// Encode an RTP data packet
    fn encode_data(&self, packet: &DataPacket) -> Result<Bytes>;

    /// Decode a compound RTCP packet
    fn decode_control(&self, buf: &[u8]) -> Result<CompoundControlPacket>;

    /// Encode a compound RTCP packet
    fn encode_control(&self, packet: &CompoundControlPacket) -> Result<Bytes>;
}
