use super::report_block::ReceptionReport;
use crate::{RtpSsrc, RtpTimestamp};

/// RTCP Sender Report (SR) packet
/// Defined in RFC 3550 Section 6.4.1
///
/// The NTP and RTP timestamps are emitted as zeros until sender clocks are
/// wired in; packet and octet counts come from the session counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReport {
    /// SSRC of the sender
    pub sender_ssrc: RtpSsrc,

    /// NTP timestamp at the moment of the report (64 bits)
    pub ntp_timestamp: u64,

    /// RTP timestamp corresponding to the NTP timestamp
    pub rtp_timestamp: RtpTimestamp,

    /// Total number of RTP data packets sent
    pub sender_packet_count: u32,

    /// Total number of payload octets sent
    pub sender_octet_count: u32,

    /// Report blocks
    pub reception_reports: Vec<ReceptionReport>,
}

impl SenderReport {
    /// Create a sender report with zeroed timestamps and counters
    pub fn new(sender_ssrc: RtpSsrc) -> Self {
        Self {
            sender_ssrc,
            ntp_timestamp: 0,
            rtp_timestamp: 0,
            sender_packet_count: 0,
            sender_octet_count: 0,
            reception_reports: Vec::new(),
        }
    }

    /// Append a report block
    pub fn add_reception_report(&mut self, block: ReceptionReport) {
        self.reception_reports.push(block);
    }
}
