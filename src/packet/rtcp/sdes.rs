use crate::RtpSsrc;

/// SDES item kinds as defined in RFC 3550 Section 6.5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SdesItemKind {
    /// Canonical end-point identifier
    Cname = 1,

    /// User name
    Name = 2,

    /// Electronic mail address
    Email = 3,

    /// Phone number
    Phone = 4,

    /// Geographic location
    Location = 5,

    /// Application or tool name
    Tool = 6,

    /// Notice / status
    Note = 7,

    /// Private extension
    Priv = 8,
}

/// A single SDES item (kind + UTF-8 value)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesItem {
    /// Item kind
    pub kind: SdesItemKind,

    /// Item value
    pub value: String,
}

impl SdesItem {
    /// Create an item of the given kind
    pub fn new(kind: SdesItemKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Create a CNAME item
    pub fn cname(value: impl Into<String>) -> Self {
        Self::new(SdesItemKind::Cname, value)
    }

    /// Create a TOOL item
    pub fn tool(value: impl Into<String>) -> Self {
        Self::new(SdesItemKind::Tool, value)
    }
}

/// SDES chunk: one SSRC and its description items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesChunk {
    /// SSRC the items describe
    pub ssrc: RtpSsrc,

    /// Description items
    pub items: Vec<SdesItem>,
}

impl SdesChunk {
    /// Create an empty chunk for `ssrc`
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            items: Vec::new(),
        }
    }

    /// Append an item
    pub fn add_item(&mut self, item: SdesItem) {
        self.items.push(item);
    }

    /// Value of the first item of the given kind, if present
    pub fn item_value(&self, kind: SdesItemKind) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.kind == kind)
            .map(|item| item.value.as_str())
    }
}

/// RTCP Source Description (SDES) packet
/// Defined in RFC 3550 Section 6.5
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDescription {
    /// Chunks, one per described source
    pub chunks: Vec<SdesChunk>,
}

impl SourceDescription {
    /// Create an SDES packet with no chunks
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an SDES packet holding a single chunk
    pub fn with_chunk(chunk: SdesChunk) -> Self {
        Self {
            chunks: vec![chunk],
        }
    }

    /// Append a chunk
    pub fn add_chunk(&mut self, chunk: SdesChunk) {
        self.chunks.push(chunk);
    }
}
