use super::report_block::ReceptionReport;
use crate::RtpSsrc;

/// RTCP Receiver Report (RR) packet
/// Defined in RFC 3550 Section 6.4.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    /// SSRC of the reporting receiver
    pub sender_ssrc: RtpSsrc,

    /// Report blocks
    pub reception_reports: Vec<ReceptionReport>,
}

impl ReceiverReport {
    /// Create a receiver report with no report blocks
    pub fn new(sender_ssrc: RtpSsrc) -> Self {
        Self {
            sender_ssrc,
            reception_reports: Vec::new(),
        }
    }

    /// Append a report block
    pub fn add_reception_report(&mut self, block: ReceptionReport) {
        self.reception_reports.push(block);
    }
}
