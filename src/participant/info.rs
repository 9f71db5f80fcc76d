use crate::packet::rtcp::{SdesChunk, SdesItemKind};
use crate::RtpSsrc;

/// Source description metadata for a participant, populated from SDES.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    /// Synchronization source identifier
    pub ssrc: RtpSsrc,

    /// Canonical end-point identifier (CNAME)
    pub cname: Option<String>,

    /// User name
    pub name: Option<String>,

    /// Electronic mail address
    pub email: Option<String>,

    /// Phone number
    pub phone: Option<String>,

    /// Geographic location
    pub location: Option<String>,

    /// Application or tool name
    pub tool: Option<String>,

    /// Notice / status
    pub note: Option<String>,
}

impl ParticipantInfo {
    /// Create an empty description for `ssrc`
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            cname: None,
            name: None,
            email: None,
            phone: None,
            location: None,
            tool: None,
            note: None,
        }
    }

    /// Apply the items of an SDES chunk.
    ///
    /// Returns true iff any field value changed. A non-empty CNAME is never
    /// cleared by a later chunk carrying an empty CNAME item.
    pub fn update_from_sdes_chunk(&mut self, chunk: &SdesChunk) -> bool {
        let mut changed = false;

        for item in &chunk.items {
            let field = match item.kind {
                SdesItemKind::Cname => {
                    if item.value.is_empty() && self.cname.as_deref().is_some_and(|c| !c.is_empty())
                    {
                        continue;
                    }
                    &mut self.cname
                }
                SdesItemKind::Name => &mut self.name,
                SdesItemKind::Email => &mut self.email,
                SdesItemKind::Phone => &mut self.phone,
                SdesItemKind::Location => &mut self.location,
                SdesItemKind::Tool => &mut self.tool,
                SdesItemKind::Note => &mut self.note,
                SdesItemKind::Priv => continue,
            };

            if field.as_deref() != Some(item.value.as_str()) {
                *field = Some(item.value.clone());
                changed = true;
            }
        }

        changed
    }
}
