//! RTCP control packet models (RFC 3550 Section 6).

mod app;
mod bye;
mod receiver_report;
mod report_block;
mod sdes;
mod sender_report;

pub use app::AppData;
pub use bye::Bye;
pub use receiver_report::ReceiverReport;
pub use report_block::ReceptionReport;
pub use sdes::{SdesChunk, SdesItem, SdesItemKind, SourceDescription};
pub use sender_report::SenderReport;

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP packet types as defined in RFC 3550
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlPacketType {
    /// Sender Report (SR)
    SenderReport = 200,

    /// Receiver Report (RR)
    ReceiverReport = 201,

    /// Source Description (SDES)
    SourceDescription = 202,

    /// Goodbye (BYE)
    Bye = 203,

    /// Application-Defined (APP)
    AppData = 204,
}

impl TryFrom<u8> for ControlPacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            200 => Ok(ControlPacketType::SenderReport),
            201 => Ok(ControlPacketType::ReceiverReport),
            202 => Ok(ControlPacketType::SourceDescription),
            203 => Ok(ControlPacketType::Bye),
            204 => Ok(ControlPacketType::AppData),
            _ => Err(Error::Codec(format!("Unknown RTCP packet type: {}", value))),
        }
    }
}

/// A single RTCP packet of any kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPacket {
    /// Sender Report (SR)
    SenderReport(SenderReport),

    /// Receiver Report (RR)
    ReceiverReport(ReceiverReport),

    /// Source Description (SDES)
    SourceDescription(SourceDescription),

    /// Goodbye (BYE)
    Bye(Bye),

    /// Application-Defined (APP)
    AppData(AppData),
}

impl ControlPacket {
    /// The RTCP type tag of this packet
    pub fn packet_type(&self) -> ControlPacketType {
        match self {
            ControlPacket::SenderReport(_) => ControlPacketType::SenderReport,
            ControlPacket::ReceiverReport(_) => ControlPacketType::ReceiverReport,
            ControlPacket::SourceDescription(_) => ControlPacketType::SourceDescription,
            ControlPacket::Bye(_) => ControlPacketType::Bye,
            ControlPacket::AppData(_) => ControlPacketType::AppData,
        }
    }
}

/// An ordered sequence of RTCP packets sent in one datagram.
///
/// RFC 3550 requires every RTCP transmission to be compound and to start
/// with a report packet; the session builds its compounds accordingly, but
/// the container itself only enforces non-emptiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundControlPacket {
    packets: Vec<ControlPacket>,
}

impl CompoundControlPacket {
    /// Create a compound packet from the given parts, in order
    pub fn new(packets: Vec<ControlPacket>) -> Result<Self> {
        if packets.is_empty() {
            return Err(Error::InvalidParameter(
                "Compound RTCP packet must contain at least one packet".to_string(),
            ));
        }

        Ok(Self { packets })
    }

    /// Create a compound packet of exactly two parts, in order
    pub fn of(first: ControlPacket, second: ControlPacket) -> Self {
        Self {
            packets: vec![first, second],
        }
    }

    /// The constituent packets, in wire order
    pub fn packets(&self) -> &[ControlPacket] {
        &self.packets
    }

    /// Number of constituent packets
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether the compound is empty (never true for a constructed value)
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl From<ControlPacket> for CompoundControlPacket {
    fn from(packet: ControlPacket) -> Self {
        Self {
            packets: vec![packet],
        }
    }
}

/// SSRC a control packet claims to originate from, where the kind carries one
pub fn sender_ssrc(packet: &ControlPacket) -> Option<RtpSsrc> {
    match packet {
        ControlPacket::SenderReport(sr) => Some(sr.sender_ssrc),
        ControlPacket::ReceiverReport(rr) => Some(rr.sender_ssrc),
        ControlPacket::AppData(app) => Some(app.sender_ssrc),
        ControlPacket::SourceDescription(_) | ControlPacket::Bye(_) => None,
    }
}
