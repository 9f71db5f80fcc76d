use crate::RtpSsrc;

/// Reception report block carried in SR/RR packets
/// Defined in RFC 3550 Section 6.4.1
///
/// The link statistics (fraction lost, cumulative lost, extended highest
/// sequence number, jitter, LSR/DLSR) are currently emitted as zeros; the
/// framing is conformant but the diagnostic fields await a reception-quality
/// tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceptionReport {
    /// SSRC of the source this report describes
    pub ssrc: RtpSsrc,

    /// Fraction of packets lost since the previous report
    pub fraction_lost: u8,

    /// Cumulative number of packets lost
    pub cumulative_lost: u32,

    /// Extended highest sequence number received
    pub extended_highest_sequence: u32,

    /// Interarrival jitter estimate
    pub jitter: u32,

    /// Middle 32 bits of the last SR NTP timestamp from this source
    pub last_sr: u32,

    /// Delay since the last SR, in units of 1/65536 seconds
    pub delay_since_last_sr: u32,
}

impl ReceptionReport {
    /// Create an empty report block for `ssrc`
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            ..Self::default()
        }
    }
}
