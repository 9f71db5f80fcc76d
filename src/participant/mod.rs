//! Participant records and the per-session participant database.

mod database;
mod info;

pub use database::{ParticipantDatabase, ParticipantEventListener};
pub use info::ParticipantInfo;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::packet::rtcp::SdesChunk;
use crate::packet::DataPacket;
use crate::RtpSsrc;

/// Runtime state for one participant (local or remote).
///
/// Shared behind `Arc` between the database, the session dispatch paths and
/// the host application; every field uses interior mutability so updates
/// never require exclusive ownership.
pub struct RtpParticipant {
    info: RwLock<ParticipantInfo>,
    data_address: RwLock<Option<SocketAddr>>,
    control_address: RwLock<Option<SocketAddr>>,
    last_data_origin: RwLock<Option<SocketAddr>>,
    last_control_origin: RwLock<Option<SocketAddr>>,
    last_sequence_number: AtomicI32,
    received_packet_count: AtomicU64,
    bye_received: AtomicBool,
    received_sdes: AtomicBool,
    last_activity: Mutex<Instant>,
}

impl RtpParticipant {
    fn with_info(info: ParticipantInfo) -> Self {
        Self {
            info: RwLock::new(info),
            data_address: RwLock::new(None),
            control_address: RwLock::new(None),
            last_data_origin: RwLock::new(None),
            last_control_origin: RwLock::new(None),
            last_sequence_number: AtomicI32::new(-1),
            received_packet_count: AtomicU64::new(0),
            bye_received: AtomicBool::new(false),
            received_sdes: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Create a participant with both destinations known (an egress target)
    pub fn receiver(ssrc: RtpSsrc, data_address: SocketAddr, control_address: SocketAddr) -> Self {
        let participant = Self::with_info(ParticipantInfo::new(ssrc));
        *participant.data_address.write().unwrap() = Some(data_address);
        *participant.control_address.write().unwrap() = Some(control_address);
        participant
    }

    /// Create a participant discovered through a data packet from `origin`
    pub fn from_data_packet(origin: SocketAddr, packet: &DataPacket) -> Self {
        let participant = Self::with_info(ParticipantInfo::new(packet.ssrc));
        *participant.data_address.write().unwrap() = Some(origin);
        *participant.last_data_origin.write().unwrap() = Some(origin);
        participant
    }

    /// Create a participant discovered through an SDES chunk from `origin`.
    ///
    /// The chunk's items are not applied here; the session applies them so
    /// the first description update is observable as a change.
    pub fn from_sdes_chunk(origin: SocketAddr, chunk: &SdesChunk) -> Self {
        let participant = Self::with_info(ParticipantInfo::new(chunk.ssrc));
        *participant.control_address.write().unwrap() = Some(origin);
        *participant.last_control_origin.write().unwrap() = Some(origin);
        participant
    }

    /// Current SSRC
    pub fn ssrc(&self) -> RtpSsrc {
        self.info.read().unwrap().ssrc
    }

    /// Rebind the SSRC (local collision resolution)
    pub(crate) fn set_ssrc(&self, ssrc: RtpSsrc) {
        self.info.write().unwrap().ssrc = ssrc;
    }

    /// Snapshot of the description metadata
    pub fn info(&self) -> ParticipantInfo {
        self.info.read().unwrap().clone()
    }

    /// Apply an SDES chunk to the description; true iff anything changed
    pub fn update_info_from_sdes_chunk(&self, chunk: &SdesChunk) -> bool {
        self.info.write().unwrap().update_from_sdes_chunk(chunk)
    }

    /// Set the CNAME unless one is already present
    pub(crate) fn set_cname_if_absent(&self, cname: impl FnOnce() -> String) {
        let mut info = self.info.write().unwrap();
        if info.cname.is_none() {
            info.cname = Some(cname());
        }
    }

    /// Set the TOOL unless one is already present
    pub(crate) fn set_tool_if_absent(&self, tool: &str) {
        let mut info = self.info.write().unwrap();
        if info.tool.is_none() {
            info.tool = Some(tool.to_string());
        }
    }

    /// Destination for RTP data, when known
    pub fn data_address(&self) -> Option<SocketAddr> {
        *self.data_address.read().unwrap()
    }

    /// Destination for RTCP control, when known
    pub fn control_address(&self) -> Option<SocketAddr> {
        *self.control_address.read().unwrap()
    }

    pub(crate) fn set_data_address(&self, address: SocketAddr) {
        *self.data_address.write().unwrap() = Some(address);
    }

    pub(crate) fn set_control_address(&self, address: SocketAddr) {
        *self.control_address.write().unwrap() = Some(address);
    }

    /// Origin of the most recent data packet from this participant
    pub fn last_data_origin(&self) -> Option<SocketAddr> {
        *self.last_data_origin.read().unwrap()
    }

    /// Origin of the most recent control packet from this participant
    pub fn last_control_origin(&self) -> Option<SocketAddr> {
        *self.last_control_origin.read().unwrap()
    }

    pub(crate) fn set_last_data_origin(&self, origin: SocketAddr) {
        *self.last_data_origin.write().unwrap() = Some(origin);
    }

    pub(crate) fn set_last_control_origin(&self, origin: SocketAddr) {
        *self.last_control_origin.write().unwrap() = Some(origin);
    }

    /// A participant is a receiver iff both destinations are known
    pub fn is_receiver(&self) -> bool {
        self.data_address().is_some() && self.control_address().is_some()
    }

    /// Highest sequence number recorded for this participant (−1 before the
    /// first packet). Ordering policy lives in the session; this records
    /// unconditionally.
    pub fn last_sequence_number(&self) -> i32 {
        self.last_sequence_number.load(Ordering::Acquire)
    }

    pub(crate) fn set_last_sequence_number(&self, sequence: i32) {
        self.last_sequence_number.store(sequence, Ordering::Release);
    }

    /// Number of data packets received from this participant
    pub fn received_packet_count(&self) -> u64 {
        self.received_packet_count.load(Ordering::Relaxed)
    }

    pub(crate) fn increment_received_packets(&self) {
        self.received_packet_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether a BYE naming this participant has been seen (latching)
    pub fn bye_received(&self) -> bool {
        self.bye_received.load(Ordering::Acquire)
    }

    pub(crate) fn mark_bye_received(&self) {
        self.bye_received.store(true, Ordering::Release);
    }

    /// Whether any SDES chunk for this participant has been processed
    pub fn received_sdes(&self) -> bool {
        self.received_sdes.load(Ordering::Acquire)
    }

    pub(crate) fn mark_received_sdes(&self) {
        self.received_sdes.store(true, Ordering::Release);
    }

    /// Record activity now (any packet from this participant)
    pub(crate) fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    /// Time since the last recorded activity
    pub fn idle_time(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }
}

impl fmt::Display for RtpParticipant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info.read().unwrap();
        match &info.cname {
            Some(cname) => write!(f, "participant {:08x} ({})", info.ssrc, cname),
            None => write!(f, "participant {:08x}", info.ssrc),
        }
    }
}
