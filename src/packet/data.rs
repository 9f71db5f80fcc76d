use bytes::Bytes;

use super::RTP_VERSION;
use crate::{RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// RTP data packet
/// Defined in RFC 3550 Section 5.1
///
/// The session stamps `payload_type`, `ssrc` and `sequence_number` on every
/// egress packet; values supplied by the caller for those fields are
/// overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Protocol version (always 2)
    pub version: u8,

    /// Padding flag
    pub padding: bool,

    /// Extension flag
    pub extension: bool,

    /// Marker bit
    pub marker: bool,

    /// Payload type (7 bits)
    pub payload_type: u8,

    /// Sequence number
    pub sequence_number: RtpSequenceNumber,

    /// Media timestamp
    pub timestamp: RtpTimestamp,

    /// Synchronization source identifier
    pub ssrc: RtpSsrc,

    /// Contributing source list (0..15 entries)
    pub csrc: Vec<RtpSsrc>,

    /// Payload data
    pub payload: Bytes,
}

impl DataPacket {
    /// Create an empty packet with all header fields zeroed
    pub fn new() -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            marker: false,
            payload_type: 0,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
            csrc: Vec::new(),
            payload: Bytes::new(),
        }
    }

    /// Create a packet carrying `payload`, leaving the session-owned fields
    /// (payload type, SSRC, sequence number) for the session to stamp
    pub fn with_payload(payload: Bytes, timestamp: RtpTimestamp, marker: bool) -> Self {
        Self {
            marker,
            timestamp,
            payload,
            ..Self::new()
        }
    }

    /// Payload length in bytes
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

impl Default for DataPacket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_payload_leaves_session_fields_unset() {
        let packet = DataPacket::with_payload(Bytes::from_static(b"\xAA\xBB"), 1000, true);

        assert_eq!(packet.version, RTP_VERSION);
        assert_eq!(packet.timestamp, 1000);
        assert!(packet.marker);
        assert_eq!(packet.payload.as_ref(), b"\xAA\xBB");

        // Stamped later by the session
        assert_eq!(packet.payload_type, 0);
        assert_eq!(packet.ssrc, 0);
        assert_eq!(packet.sequence_number, 0);
    }
}
