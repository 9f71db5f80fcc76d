use bytes::Bytes;

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP Application-Defined (APP) packet
/// Defined in RFC 3550 Section 6.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppData {
    /// SSRC of the sender
    pub sender_ssrc: RtpSsrc,

    /// Name (4 ASCII characters)
    pub name: [u8; 4],

    /// Application-dependent data
    pub data: Bytes,
}

impl AppData {
    /// Create a new APP packet with empty data
    pub fn new(sender_ssrc: RtpSsrc, name: [u8; 4]) -> Self {
        Self {
            sender_ssrc,
            name,
            data: Bytes::new(),
        }
    }

    /// Create a new APP packet with a string name (must be exactly 4 characters)
    pub fn new_with_name(sender_ssrc: RtpSsrc, name_str: &str) -> Result<Self> {
        if name_str.len() != 4 {
            return Err(Error::InvalidParameter(format!(
                "APP name must be exactly 4 characters, got {}",
                name_str.len()
            )));
        }

        let mut name = [0; 4];
        name.copy_from_slice(name_str.as_bytes());

        Ok(Self::new(sender_ssrc, name))
    }

    /// Get the name as a string (lossy for non-ASCII bytes)
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).to_string()
    }

    /// Set the application data
    pub fn set_data(&mut self, data: Bytes) {
        self.data = data;
    }
}
