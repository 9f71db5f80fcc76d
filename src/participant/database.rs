use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::RtpParticipant;
use crate::packet::rtcp::SdesChunk;
use crate::packet::DataPacket;
use crate::RtpSsrc;

/// Sink for participant lifecycle events, injected by the session.
///
/// Keeps the database free of a back-pointer to its owner.
pub trait ParticipantEventListener: Send + Sync {
    /// A participant record was created from an unknown-SSRC data packet
    fn participant_created_from_data_packet(&self, participant: &Arc<RtpParticipant>);

    /// A participant record was created from an SDES chunk
    fn participant_created_from_sdes_chunk(&self, participant: &Arc<RtpParticipant>);

    /// A participant record was evicted by the idle sweep
    fn participant_deleted(&self, participant: &Arc<RtpParticipant>);
}

/// Keyed store of remote participants.
///
/// Members are every source the session knows about; the receivers list is
/// the subset added explicitly by the host as egress targets. The local
/// participant is never stored here.
pub struct ParticipantDatabase {
    session_id: String,
    members: RwLock<HashMap<RtpSsrc, Arc<RtpParticipant>>>,
    receivers: RwLock<Vec<Arc<RtpParticipant>>>,
    listener: Arc<dyn ParticipantEventListener>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ParticipantDatabase {
    /// Create an empty database for the session with the given id
    pub fn new(session_id: impl Into<String>, listener: Arc<dyn ParticipantEventListener>) -> Self {
        Self {
            session_id: session_id.into(),
            members: RwLock::new(HashMap::new()),
            receivers: RwLock::new(Vec::new()),
            listener,
            sweeper: Mutex::new(None),
        }
    }

    /// Admit `participant` as an explicit egress target.
    ///
    /// Returns true when the participant became a receiver as a result of
    /// this call. An existing entry with the same SSRC is promoted when its
    /// known addresses are compatible; conflicting addresses fail.
    pub fn add_receiver(&self, participant: Arc<RtpParticipant>) -> bool {
        let ssrc = participant.ssrc();

        let target = {
            let mut members = self.members.write().unwrap();
            match members.get(&ssrc) {
                Some(existing) => {
                    let compatible = addresses_compatible(
                        existing.data_address(),
                        participant.data_address(),
                    ) && addresses_compatible(
                        existing.control_address(),
                        participant.control_address(),
                    );
                    if !compatible {
                        return false;
                    }

                    if existing.data_address().is_none() {
                        if let Some(address) = participant.data_address() {
                            existing.set_data_address(address);
                        }
                    }
                    if existing.control_address().is_none() {
                        if let Some(address) = participant.control_address() {
                            existing.set_control_address(address);
                        }
                    }
                    existing.clone()
                }
                None => {
                    members.insert(ssrc, participant.clone());
                    participant
                }
            }
        };

        let mut receivers = self.receivers.write().unwrap();
        if receivers.iter().any(|r| r.ssrc() == ssrc) {
            return false;
        }
        receivers.push(target);
        true
    }

    /// Drop the participant with `ssrc` from the egress target set.
    ///
    /// The participant stays a known member until the idle sweep reaps it.
    pub fn remove_receiver(&self, ssrc: RtpSsrc) -> bool {
        let mut receivers = self.receivers.write().unwrap();
        let before = receivers.len();
        receivers.retain(|r| r.ssrc() != ssrc);
        receivers.len() != before
    }

    /// Look up a participant by SSRC
    pub fn participant(&self, ssrc: RtpSsrc) -> Option<Arc<RtpParticipant>> {
        self.members.read().unwrap().get(&ssrc).cloned()
    }

    /// Find or create the participant a data packet belongs to.
    ///
    /// An unknown SSRC creates a record with `origin` as its data address
    /// and fires `participant_created_from_data_packet`.
    pub fn get_or_create_from_data_packet(
        &self,
        origin: SocketAddr,
        packet: &DataPacket,
    ) -> Arc<RtpParticipant> {
        let (participant, created) = {
            let mut members = self.members.write().unwrap();
            match members.get(&packet.ssrc) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let participant = Arc::new(RtpParticipant::from_data_packet(origin, packet));
                    members.insert(packet.ssrc, participant.clone());
                    (participant, true)
                }
            }
        };

        if created {
            trace!(
                "Discovered {} from data packet in session with id {}",
                participant,
                self.session_id
            );
            self.listener.participant_created_from_data_packet(&participant);
        }

        participant
    }

    /// Find or create the participant an SDES chunk describes.
    ///
    /// An entry discovered earlier from data is augmented with `origin` as
    /// its control address instead of creating a second identity.
    pub fn get_or_create_from_sdes_chunk(
        &self,
        origin: SocketAddr,
        chunk: &SdesChunk,
    ) -> Arc<RtpParticipant> {
        let (participant, created) = {
            let mut members = self.members.write().unwrap();
            match members.get(&chunk.ssrc) {
                Some(existing) => {
                    if existing.control_address().is_none() {
                        existing.set_control_address(origin);
                    }
                    (existing.clone(), false)
                }
                None => {
                    let participant = Arc::new(RtpParticipant::from_sdes_chunk(origin, chunk));
                    members.insert(chunk.ssrc, participant.clone());
                    (participant, true)
                }
            }
        };

        if created {
            trace!(
                "Discovered {} from SDES chunk in session with id {}",
                participant,
                self.session_id
            );
            self.listener.participant_created_from_sdes_chunk(&participant);
        }

        participant
    }

    /// Invoke `op` on a snapshot of the current explicit receivers.
    ///
    /// Additions and removals made while iterating do not affect the
    /// snapshot.
    pub fn for_each_receiver(&self, mut op: impl FnMut(&Arc<RtpParticipant>)) {
        for receiver in self.receivers_snapshot() {
            op(&receiver);
        }
    }

    /// Snapshot of the current explicit receivers
    pub fn receivers_snapshot(&self) -> Vec<Arc<RtpParticipant>> {
        self.receivers.read().unwrap().clone()
    }

    /// Copy of the member map
    pub fn members(&self) -> HashMap<RtpSsrc, Arc<RtpParticipant>> {
        self.members.read().unwrap().clone()
    }

    /// Every SSRC currently known to the database
    pub fn member_ssrcs(&self) -> HashSet<RtpSsrc> {
        self.members.read().unwrap().keys().copied().collect()
    }

    /// Number of known members
    pub fn member_count(&self) -> usize {
        self.members.read().unwrap().len()
    }

    /// Evict members idle longer than `timeout`.
    ///
    /// Discovered members go after the idle window alone; explicit receivers
    /// only once they are idle and flagged with a received BYE, so that
    /// host-added egress targets do not silently vanish.
    pub fn sweep(&self, timeout: Duration) {
        let expired: Vec<Arc<RtpParticipant>> = {
            let members = self.members.read().unwrap();
            let receivers = self.receivers.read().unwrap();
            members
                .values()
                .filter(|p| p.idle_time() > timeout)
                .filter(|p| {
                    p.bye_received() || !receivers.iter().any(|r| r.ssrc() == p.ssrc())
                })
                .cloned()
                .collect()
        };

        if expired.is_empty() {
            return;
        }

        {
            let mut members = self.members.write().unwrap();
            let mut receivers = self.receivers.write().unwrap();
            for participant in &expired {
                let ssrc = participant.ssrc();
                members.remove(&ssrc);
                receivers.retain(|r| r.ssrc() != ssrc);
            }
        }

        for participant in &expired {
            debug!(
                "Evicted idle {} from session with id {}",
                participant, self.session_id
            );
            self.listener.participant_deleted(participant);
        }
    }

    /// Start the periodic eviction task
    pub fn start_sweeper(self: &Arc<Self>, timeout: Duration) {
        let period = (timeout / 2).max(Duration::from_millis(100));
        let weak: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                match weak.upgrade() {
                    Some(database) => database.sweep(timeout),
                    None => break,
                }
            }
        });

        if let Some(previous) = self.sweeper.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the periodic eviction task
    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for ParticipantDatabase {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

fn addresses_compatible(existing: Option<SocketAddr>, candidate: Option<SocketAddr>) -> bool {
    match (existing, candidate) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}
