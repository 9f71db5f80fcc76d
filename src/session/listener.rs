//! Listener traits and the thread-safe registration lists.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::packet::rtcp::{AppData, CompoundControlPacket};
use crate::packet::DataPacket;
use crate::participant::{ParticipantInfo, RtpParticipant};
use crate::RtpSsrc;

use super::TerminationReason;

/// Receives RTP data packets accepted by the session.
///
/// Called from the data dispatch task; packets from one origin arrive in
/// order.
pub trait RtpSessionDataListener: Send + Sync {
    /// A data packet passed the payload-type and ordering checks
    fn data_packet_received(
        &self,
        session_id: &str,
        participant: &ParticipantInfo,
        packet: &DataPacket,
    );
}

/// Receives control-plane traffic the engine does not consume itself.
pub trait RtpSessionControlListener: Send + Sync {
    /// A raw compound packet, delivered only when automated RTCP handling
    /// is disabled
    fn control_packet_received(&self, session_id: &str, packet: &CompoundControlPacket);

    /// An APP packet, delivered regardless of the automation setting
    fn app_data_received(&self, session_id: &str, packet: &AppData) {
        let _ = (session_id, packet);
    }
}

/// Receives session lifecycle and participant events.
///
/// All methods default to no-ops so implementors subscribe only to what
/// they care about.
pub trait RtpSessionEventListener: Send + Sync {
    /// A participant was discovered through a data packet
    fn participant_joined_from_data(&self, session_id: &str, participant: &Arc<RtpParticipant>) {
        let _ = (session_id, participant);
    }

    /// A participant was discovered through an SDES chunk
    fn participant_joined_from_control(&self, session_id: &str, participant: &Arc<RtpParticipant>) {
        let _ = (session_id, participant);
    }

    /// An SDES chunk changed a participant's description
    fn participant_data_updated(&self, session_id: &str, participant: &Arc<RtpParticipant>) {
        let _ = (session_id, participant);
    }

    /// A BYE named this participant
    fn participant_left(&self, session_id: &str, participant: &Arc<RtpParticipant>) {
        let _ = (session_id, participant);
    }

    /// The idle sweep evicted this participant
    fn participant_deleted(&self, session_id: &str, participant: &Arc<RtpParticipant>) {
        let _ = (session_id, participant);
    }

    /// An SSRC collision was resolved by rotating the local SSRC
    fn resolved_ssrc_conflict(&self, session_id: &str, old_ssrc: RtpSsrc, new_ssrc: RtpSsrc) {
        let _ = (session_id, old_ssrc, new_ssrc);
    }

    /// The session reached the terminated state; fired exactly once
    fn session_terminated(&self, session_id: &str, reason: &TerminationReason) {
        let _ = (session_id, reason);
    }
}

/// Registration list with snapshot iteration.
///
/// Additions and removals during a notification round do not affect the
/// round in flight. A panicking listener is logged and stays registered.
pub(crate) struct ListenerRegistry<L: ?Sized> {
    listeners: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Arc<L>) {
        self.listeners.write().unwrap().push(listener);
    }

    pub fn remove(&self, listener: &Arc<L>) {
        self.listeners
            .write()
            .unwrap()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn clear(&self) {
        self.listeners.write().unwrap().clear();
    }

    pub fn notify(&self, op: impl Fn(&L)) {
        let snapshot: Vec<Arc<L>> = self.listeners.read().unwrap().clone();
        for listener in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| op(&listener))).is_err() {
                warn!("Listener panicked during notification; keeping it registered");
            }
        }
    }
}
