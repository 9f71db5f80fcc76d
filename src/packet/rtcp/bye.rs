use crate::RtpSsrc;

/// RTCP Goodbye (BYE) packet
/// Defined in RFC 3550 Section 6.6
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bye {
    /// SSRCs leaving the session
    pub ssrc_list: Vec<RtpSsrc>,

    /// Optional reason for leaving
    pub reason_for_leaving: Option<String>,
}

impl Bye {
    /// Create a BYE for a single SSRC
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc_list: vec![ssrc],
            reason_for_leaving: None,
        }
    }

    /// Create a BYE for a single SSRC with a reason
    pub fn with_reason(ssrc: RtpSsrc, reason: impl Into<String>) -> Self {
        Self {
            ssrc_list: vec![ssrc],
            reason_for_leaving: Some(reason.into()),
        }
    }

    /// Append an SSRC to the list
    pub fn add_ssrc(&mut self, ssrc: RtpSsrc) {
        self.ssrc_list.push(ssrc);
    }
}
