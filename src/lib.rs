//! # RTP session engine
//!
//! `rtp-session` implements the RTP/RTCP session layer of RFC 3550 for a
//! single media stream: egress framing (sequence numbers, SSRC identity),
//! ingress demultiplexing into a live participant database, SSRC collision
//! and loop resolution, and periodic compound RTCP reporting (SR/RR + SDES).
//!
//! ## Core components
//!
//! - **[`RtpSession`](session::RtpSession)**: the session state machine and
//!   public API (init, send, listener registration, terminate)
//! - **[`ParticipantDatabase`](participant::ParticipantDatabase)**: per-SSRC
//!   participant records with lifecycle and idle eviction
//! - **[`RtcpScheduler`](session::RtcpScheduler)**: periodic compound-RTCP
//!   emission
//! - **Packet model**: [`DataPacket`](packet::DataPacket) and the RTCP kinds
//!   under [`packet::rtcp`]
//!
//! Socket I/O and the byte-level wire format are deliberately external: the
//! session consumes a [`DatagramTransport`](transport::DatagramTransport) and
//! a [`PacketCodec`](transport::PacketCodec) and never touches raw sockets.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use rtp_session::session::{RtpSession, RtpSessionConfig};
//! use rtp_session::participant::RtpParticipant;
//!
//! #[tokio::main]
//! async fn main() -> rtp_session::Result<()> {
//!     let local = RtpParticipant::receiver(
//!         rand::random(),
//!         "10.0.0.1:7000".parse().unwrap(),
//!         "10.0.0.1:7001".parse().unwrap(),
//!     );
//!     let session = RtpSession::new(RtpSessionConfig::default(), local, transport, codec)?;
//!     session.init().await?;
//!     session.send_data(payload, 1000, true).await;
//!     session.terminate().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod packet;
pub mod participant;
pub mod session;
pub mod transport;

// Re-export core types
pub use error::{Error, Result};

pub use packet::rtcp::{
    AppData, Bye, CompoundControlPacket, ControlPacket, ControlPacketType, ReceiverReport,
    ReceptionReport, SdesChunk, SdesItem, SdesItemKind, SenderReport, SourceDescription,
};
pub use packet::DataPacket;
pub use participant::{ParticipantDatabase, ParticipantInfo, RtpParticipant};
pub use session::{
    RtpSession, RtpSessionConfig, RtpSessionControlListener, RtpSessionDataListener,
    RtpSessionEventListener, TerminationReason,
};
pub use transport::{ChannelOptions, DatagramChannel, DatagramTransport, PacketCodec};

/// Synchronization source identifier (32 bits)
pub type RtpSsrc = u32;

/// RTP sequence number (16 bits)
pub type RtpSequenceNumber = u16;

/// RTP media timestamp (32 bits)
pub type RtpTimestamp = u32;
