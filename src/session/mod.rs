//! The RTP session state machine.
//!
//! An [`RtpSession`] moves through `Created → Running → Terminated`. While
//! running it frames egress data packets, demultiplexes ingress into the
//! participant database, resolves SSRC collisions and loops, and (with
//! automated RTCP handling) owns the control plane: join/leave compounds
//! and the periodic SR/RR + SDES reports.

mod listener;
mod scheduling;
pub mod ssrc;

pub use listener::{RtpSessionControlListener, RtpSessionDataListener, RtpSessionEventListener};
pub use scheduling::RtcpScheduler;

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, trace, warn};

use crate::error::Error;
use crate::packet::rtcp::{
    Bye, CompoundControlPacket, ControlPacket, ReceiverReport, ReceptionReport, SdesChunk,
    SdesItem, SdesItemKind, SenderReport, SourceDescription,
};
use crate::packet::DataPacket;
use crate::participant::{ParticipantDatabase, ParticipantEventListener, RtpParticipant};
use crate::transport::{ChannelOptions, DatagramChannel, DatagramTransport, PacketCodec};
use crate::{Result, RtpSsrc, RtpTimestamp};

use listener::ListenerRegistry;
use ssrc::SsrcVerdict;

/// Tool string advertised in outgoing SDES when the local participant has
/// none set
const TOOL_VERSION: &str = concat!("rtp-session/", env!("CARGO_PKG_VERSION"));

/// Why a session reached the terminated state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The host called `terminate`
    TerminateCalled,

    /// The session received its own packets from its own address
    SelfLoop,

    /// Too many SSRC collisions in a row
    CollisionLoop {
        /// Collisions observed when the loop was declared
        collisions: u32,
    },
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::TerminateCalled => write!(f, "terminate() called"),
            TerminationReason::SelfLoop => {
                write!(f, "loop detected: session is directly receiving its own packets")
            }
            TerminationReason::CollisionLoop { collisions } => {
                write!(f, "loop detected after {} SSRC collisions", collisions)
            }
        }
    }
}

/// Session configuration.
///
/// Immutable once the session is running; the `set_*` mutators on
/// [`RtpSession`] reject with [`Error::InvalidState`] after `init`.
#[derive(Debug, Clone)]
pub struct RtpSessionConfig {
    /// Session identifier, used in logs and the default CNAME
    pub id: String,

    /// The single payload type this session carries (0..=127)
    pub payload_type: u8,

    /// Drop ingress data packets whose sequence number does not advance
    pub discard_out_of_order: bool,

    /// Session bandwidth budget in kbps, reserved for the adaptive RTCP
    /// interval computation
    pub bandwidth_limit: u32,

    /// Requested socket send buffer size, passed to the transport
    pub send_buffer_size: usize,

    /// Requested socket receive buffer size, passed to the transport
    pub receive_buffer_size: usize,

    /// SSRC collisions tolerated before declaring a loop
    pub max_collisions_before_considering_loop: u32,

    /// Whether the engine owns the control plane (SR/RR/SDES/BYE)
    pub automated_rtcp_handling: bool,

    /// Re-apply every SDES chunk instead of only the first per participant
    pub try_to_update_on_every_sdes: bool,

    /// Interval between periodic compound RTCP emissions
    pub periodic_rtcp_send_interval: Duration,

    /// Idle window after which the database sweep evicts a participant
    pub participant_timeout: Duration,
}

impl RtpSessionConfig {
    /// Configuration with default tuning for the given id and payload type
    pub fn new(id: impl Into<String>, payload_type: u8) -> Self {
        Self {
            id: id.into(),
            payload_type,
            ..Self::default()
        }
    }
}

impl Default for RtpSessionConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            payload_type: 0,
            discard_out_of_order: true,
            bandwidth_limit: 256,
            send_buffer_size: 1500,
            receive_buffer_size: 1500,
            max_collisions_before_considering_loop: 3,
            automated_rtcp_handling: true,
            try_to_update_on_every_sdes: true,
            periodic_rtcp_send_interval: Duration::from_secs(5),
            participant_timeout: Duration::from_secs(60),
        }
    }
}

struct ChannelPair {
    data: Arc<dyn DatagramChannel>,
    control: Arc<dyn DatagramChannel>,
}

/// An RTP session for one media stream over a data and a control channel.
///
/// Every method takes `&self` and the state is internally reference
/// counted, so wrap the session in an `Arc` to share it across tasks.
pub struct RtpSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: String,
    config: StdRwLock<RtpSessionConfig>,
    local: Arc<RtpParticipant>,
    transport: Arc<dyn DatagramTransport>,
    codec: Arc<dyn PacketCodec>,
    database: Arc<ParticipantDatabase>,

    running: AtomicBool,
    sequence: AtomicU16,
    sent_or_received: AtomicBool,
    collisions: AtomicU32,
    sent_bytes: AtomicU64,
    sent_packets: AtomicU64,

    channels: RwLock<Option<ChannelPair>>,
    lifecycle: Mutex<()>,
    scheduler: StdMutex<Option<Arc<RtcpScheduler>>>,

    data_listeners: ListenerRegistry<dyn RtpSessionDataListener>,
    control_listeners: ListenerRegistry<dyn RtpSessionControlListener>,
    event_listeners: ListenerRegistry<dyn RtpSessionEventListener>,
}

/// Forwards database lifecycle events to the session's event listeners
/// without giving the database a back-pointer.
struct DatabaseEvents {
    session: Weak<SessionInner>,
}

impl ParticipantEventListener for DatabaseEvents {
    fn participant_created_from_data_packet(&self, participant: &Arc<RtpParticipant>) {
        if let Some(session) = self.session.upgrade() {
            session
                .event_listeners
                .notify(|l| l.participant_joined_from_data(&session.id, participant));
        }
    }

    fn participant_created_from_sdes_chunk(&self, participant: &Arc<RtpParticipant>) {
        if let Some(session) = self.session.upgrade() {
            session
                .event_listeners
                .notify(|l| l.participant_joined_from_control(&session.id, participant));
        }
    }

    fn participant_deleted(&self, participant: &Arc<RtpParticipant>) {
        if let Some(session) = self.session.upgrade() {
            session
                .event_listeners
                .notify(|l| l.participant_deleted(&session.id, participant));
        }
    }
}

impl RtpSession {
    /// Create a session in the `Created` state.
    ///
    /// `local` must have both its data and control addresses set (they are
    /// the bind addresses), and the configured payload type must fit in
    /// seven bits.
    pub fn new(
        config: RtpSessionConfig,
        local: RtpParticipant,
        transport: Arc<dyn DatagramTransport>,
        codec: Arc<dyn PacketCodec>,
    ) -> Result<Self> {
        if config.payload_type > 127 {
            return Err(Error::InvalidParameter(format!(
                "payload type must be in range [0;127], got {}",
                config.payload_type
            )));
        }
        if !local.is_receiver() {
            return Err(Error::InvalidParameter(
                "local participant must have its data & control addresses set".to_string(),
            ));
        }

        let id = config.id.clone();
        let local = Arc::new(local);

        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| {
            let events = Arc::new(DatabaseEvents {
                session: weak.clone(),
            });
            SessionInner {
                id: id.clone(),
                config: StdRwLock::new(config),
                local,
                transport,
                codec,
                database: Arc::new(ParticipantDatabase::new(id, events)),
                running: AtomicBool::new(false),
                sequence: AtomicU16::new(0),
                sent_or_received: AtomicBool::new(false),
                collisions: AtomicU32::new(0),
                sent_bytes: AtomicU64::new(0),
                sent_packets: AtomicU64::new(0),
                channels: RwLock::new(None),
                lifecycle: Mutex::new(()),
                scheduler: StdMutex::new(None),
                data_listeners: ListenerRegistry::new(),
                control_listeners: ListenerRegistry::new(),
                event_listeners: ListenerRegistry::new(),
            }
        });

        Ok(Self { inner })
    }

    /// Session identifier
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Configured payload type
    pub fn payload_type(&self) -> u8 {
        self.inner.config.read().unwrap().payload_type
    }

    /// Whether the session is in the `Running` state
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// The local participant
    pub fn local_participant(&self) -> Arc<RtpParticipant> {
        self.inner.local.clone()
    }

    /// Total payload octets sent
    pub fn sent_bytes(&self) -> u64 {
        self.inner.sent_bytes.load(Ordering::Relaxed)
    }

    /// Total data packets sent
    pub fn sent_packets(&self) -> u64 {
        self.inner.sent_packets.load(Ordering::Relaxed)
    }

    /// SSRC collisions resolved so far
    pub fn collisions(&self) -> u32 {
        self.inner.collisions.load(Ordering::Relaxed)
    }

    /// Bind the transports and move to `Running`.
    ///
    /// On success the join compound (empty receiver report + SDES) goes out
    /// and, with automated RTCP handling, the periodic report schedule
    /// starts. On a bind failure whichever channel bound is closed again
    /// and the session stays in `Created`.
    pub async fn init(&self) -> Result<()> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        if inner.running.load(Ordering::Acquire) {
            return Err(Error::InvalidState("session is already running".to_string()));
        }

        let (data_addr, control_addr) = match (inner.local.data_address(), inner.local.control_address()) {
            (Some(data), Some(control)) => (data, control),
            _ => {
                return Err(Error::InvalidParameter(
                    "local participant must have its data & control addresses set".to_string(),
                ))
            }
        };

        let (options, automated, interval, timeout) = {
            let config = inner.config.read().unwrap();
            (
                ChannelOptions {
                    send_buffer_size: config.send_buffer_size,
                    receive_buffer_size: config.receive_buffer_size,
                },
                config.automated_rtcp_handling,
                config.periodic_rtcp_send_interval,
                config.participant_timeout,
            )
        };

        let (data_channel, data_rx) = inner.transport.bind(data_addr, options).await.map_err(|e| {
            Error::Bind(format!(
                "failed to bind data channel for session with id {}: {}",
                inner.id, e
            ))
        })?;

        let (control_channel, control_rx) = match inner.transport.bind(control_addr, options).await
        {
            Ok(bound) => bound,
            Err(e) => {
                data_channel.close().await;
                return Err(Error::Bind(format!(
                    "failed to bind control channel for session with id {}: {}",
                    inner.id, e
                )));
            }
        };

        debug!(
            "Data & control channels bound for session with id {}",
            inner.id
        );

        *inner.channels.write().await = Some(ChannelPair {
            data: data_channel,
            control: control_channel.clone(),
        });

        // Dispatch loops; they end when the channels close and the inbound
        // streams drain.
        let data_inner = inner.clone();
        tokio::spawn(async move {
            let mut rx = data_rx;
            while let Some((origin, bytes)) = rx.recv().await {
                match data_inner.codec.decode_data(&bytes) {
                    Ok(packet) => data_inner.handle_data_packet(origin, packet).await,
                    Err(e) => warn!("Dropping undecodable data datagram from {}: {}", origin, e),
                }
            }
        });

        let control_inner = inner.clone();
        tokio::spawn(async move {
            let mut rx = control_rx;
            while let Some((origin, bytes)) = rx.recv().await {
                match control_inner.codec.decode_control(&bytes) {
                    Ok(compound) => control_inner.handle_control_packet(origin, compound).await,
                    Err(e) => {
                        warn!("Dropping undecodable control datagram from {}: {}", origin, e)
                    }
                }
            }
        });

        inner.join_session(&control_channel, inner.local.ssrc()).await;
        inner.running.store(true, Ordering::Release);

        if automated {
            let scheduler = Arc::new(RtcpScheduler::new(interval));
            let tick_inner = inner.clone();
            scheduler.start(move || {
                let inner = tick_inner.clone();
                async move { inner.emit_compound_rtcp().await }
            });
            *inner.scheduler.lock().unwrap() = Some(scheduler);
        }

        inner.database.start_sweeper(timeout);
        Ok(())
    }

    /// Terminate the session (host initiated). Idempotent.
    pub async fn terminate(&self) {
        self.inner
            .terminate_with(TerminationReason::TerminateCalled)
            .await;
    }

    /// Frame `payload` into a data packet and broadcast it to the explicit
    /// receivers. Returns true iff dispatch was initiated.
    pub async fn send_data(&self, payload: Bytes, timestamp: RtpTimestamp, marker: bool) -> bool {
        if !self.is_running() {
            return false;
        }

        self.send_data_packet(DataPacket::with_payload(payload, timestamp, marker))
            .await
    }

    /// Stamp and broadcast a caller-built data packet.
    ///
    /// The payload type, SSRC and sequence number are overwritten with the
    /// session's values. Returns true iff dispatch was initiated.
    pub async fn send_data_packet(&self, mut packet: DataPacket) -> bool {
        let inner = &self.inner;
        if !inner.running.load(Ordering::Acquire) {
            return false;
        }

        packet.payload_type = inner.config.read().unwrap().payload_type;
        packet.ssrc = inner.local.ssrc();
        packet.sequence_number = inner.sequence.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        inner.sent_or_received.store(true, Ordering::Release);

        if !inner.internal_send_data(&packet).await {
            return false;
        }

        inner.sent_packets.fetch_add(1, Ordering::Relaxed);
        inner
            .sent_bytes
            .fetch_add(packet.payload_len() as u64, Ordering::Relaxed);
        true
    }

    /// Send a single control packet to the explicit receivers.
    ///
    /// With automated RTCP handling only APP packets pass (the engine owns
    /// SR/RR/SDES/BYE); with it disabled any packet passes.
    pub async fn send_control_packet(&self, packet: ControlPacket) -> bool {
        let inner = &self.inner;
        if !inner.running.load(Ordering::Acquire) {
            return false;
        }

        let automated = inner.config.read().unwrap().automated_rtcp_handling;
        if matches!(packet, ControlPacket::AppData(_)) || !automated {
            let Some(control) = inner.control_channel().await else {
                return false;
            };
            inner
                .broadcast_control(&control, &CompoundControlPacket::from(packet))
                .await;
            return true;
        }

        false
    }

    /// Send a compound control packet to the explicit receivers.
    ///
    /// Only permitted when automated RTCP handling is disabled.
    pub async fn send_compound_control_packet(&self, packet: CompoundControlPacket) -> bool {
        let inner = &self.inner;
        if !inner.running.load(Ordering::Acquire)
            || inner.config.read().unwrap().automated_rtcp_handling
        {
            return false;
        }

        let Some(control) = inner.control_channel().await else {
            return false;
        };
        inner.broadcast_control(&control, &packet).await;
        true
    }

    /// Admit a remote participant as an explicit egress target
    pub fn add_receiver(&self, participant: RtpParticipant) -> bool {
        if participant.ssrc() == self.inner.local.ssrc() {
            return false;
        }
        self.inner.database.add_receiver(Arc::new(participant))
    }

    /// Drop the receiver with `ssrc` from the egress target set
    pub fn remove_receiver(&self, ssrc: RtpSsrc) -> bool {
        self.inner.database.remove_receiver(ssrc)
    }

    /// Look up a remote participant by SSRC
    pub fn remote_participant(&self, ssrc: RtpSsrc) -> Option<Arc<RtpParticipant>> {
        self.inner.database.participant(ssrc)
    }

    /// Copy of the remote participant map; never contains the local SSRC
    pub fn remote_participants(&self) -> HashMap<RtpSsrc, Arc<RtpParticipant>> {
        self.inner.database.members()
    }

    /// Register a data listener
    pub fn add_data_listener(&self, listener: Arc<dyn RtpSessionDataListener>) {
        self.inner.data_listeners.add(listener);
    }

    /// Unregister a data listener (by identity)
    pub fn remove_data_listener(&self, listener: &Arc<dyn RtpSessionDataListener>) {
        self.inner.data_listeners.remove(listener);
    }

    /// Register a control listener
    pub fn add_control_listener(&self, listener: Arc<dyn RtpSessionControlListener>) {
        self.inner.control_listeners.add(listener);
    }

    /// Unregister a control listener (by identity)
    pub fn remove_control_listener(&self, listener: &Arc<dyn RtpSessionControlListener>) {
        self.inner.control_listeners.remove(listener);
    }

    /// Register an event listener
    pub fn add_event_listener(&self, listener: Arc<dyn RtpSessionEventListener>) {
        self.inner.event_listeners.add(listener);
    }

    /// Unregister an event listener (by identity)
    pub fn remove_event_listener(&self, listener: &Arc<dyn RtpSessionEventListener>) {
        self.inner.event_listeners.remove(listener);
    }

    /// Toggle the out-of-order discard policy. Fails once running.
    pub fn set_discard_out_of_order(&self, value: bool) -> Result<()> {
        self.inner.set_config(|config| config.discard_out_of_order = value)
    }

    /// Set the bandwidth budget in kbps. Fails once running.
    pub fn set_bandwidth_limit(&self, value: u32) -> Result<()> {
        self.inner.set_config(|config| config.bandwidth_limit = value)
    }

    /// Set the requested socket send buffer size. Fails once running.
    pub fn set_send_buffer_size(&self, value: usize) -> Result<()> {
        self.inner.set_config(|config| config.send_buffer_size = value)
    }

    /// Set the requested socket receive buffer size. Fails once running.
    pub fn set_receive_buffer_size(&self, value: usize) -> Result<()> {
        self.inner.set_config(|config| config.receive_buffer_size = value)
    }

    /// Set the collision budget. Fails once running.
    pub fn set_max_collisions_before_considering_loop(&self, value: u32) -> Result<()> {
        self.inner
            .set_config(|config| config.max_collisions_before_considering_loop = value)
    }

    /// Toggle engine ownership of the control plane. Fails once running.
    pub fn set_automated_rtcp_handling(&self, value: bool) -> Result<()> {
        self.inner
            .set_config(|config| config.automated_rtcp_handling = value)
    }

    /// Toggle re-applying every SDES chunk. Fails once running.
    pub fn set_try_to_update_on_every_sdes(&self, value: bool) -> Result<()> {
        self.inner
            .set_config(|config| config.try_to_update_on_every_sdes = value)
    }

    /// Set the periodic RTCP interval. Fails once running.
    pub fn set_periodic_rtcp_send_interval(&self, value: Duration) -> Result<()> {
        self.inner
            .set_config(|config| config.periodic_rtcp_send_interval = value)
    }

    /// Set the participant idle window. Fails once running.
    pub fn set_participant_timeout(&self, value: Duration) -> Result<()> {
        self.inner
            .set_config(|config| config.participant_timeout = value)
    }
}

impl SessionInner {
    fn set_config(&self, op: impl FnOnce(&mut RtpSessionConfig)) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Err(Error::InvalidState(
                "cannot modify configuration after initialisation".to_string(),
            ));
        }
        op(&mut self.config.write().unwrap());
        Ok(())
    }

    async fn control_channel(&self) -> Option<Arc<dyn DatagramChannel>> {
        self.channels
            .read()
            .await
            .as_ref()
            .map(|pair| pair.control.clone())
    }

    /// Ingress path for decoded data packets.
    async fn handle_data_packet(self: &Arc<Self>, origin: SocketAddr, packet: DataPacket) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        let (payload_type, discard_out_of_order, max_collisions) = {
            let config = self.config.read().unwrap();
            (
                config.payload_type,
                config.discard_out_of_order,
                config.max_collisions_before_considering_loop,
            )
        };

        // Silently discard packets of the wrong payload type.
        if packet.payload_type != payload_type {
            return;
        }

        let local_ssrc = self.local.ssrc();
        if packet.ssrc == local_ssrc {
            let verdict = ssrc::classify(
                packet.ssrc,
                local_ssrc,
                self.local.data_address(),
                origin,
                self.collisions.load(Ordering::Relaxed),
                max_collisions,
                &self.database.member_ssrcs(),
            );

            match verdict {
                SsrcVerdict::SelfLoop => {
                    self.terminate_with(TerminationReason::SelfLoop).await;
                    return;
                }
                SsrcVerdict::LoopByCollisions => {
                    let collisions = self.collisions.load(Ordering::Relaxed) + 1;
                    self.terminate_with(TerminationReason::CollisionLoop { collisions })
                        .await;
                    return;
                }
                SsrcVerdict::Collision { new_ssrc } => {
                    self.collisions.fetch_add(1, Ordering::Relaxed);
                    self.local.set_ssrc(new_ssrc);

                    // A collision after traffic was exchanged is resolved by
                    // leaving under the old SSRC and re-joining under the new
                    // one (RFC 3550 Section 8.2); before any traffic the
                    // switch is silent (Section 8.1).
                    if self.sent_or_received.swap(true, Ordering::AcqRel) {
                        if let Some(control) = self.control_channel().await {
                            self.leave_session(
                                &control,
                                local_ssrc,
                                "SSRC collision detected; rejoining with new SSRC.",
                            )
                            .await;
                            self.join_session(&control, new_ssrc).await;
                        }
                    }

                    warn!(
                        "SSRC collision with remote end detected on session with id {}; updating SSRC from {:08x} to {:08x}",
                        self.id, local_ssrc, new_ssrc
                    );
                    self.event_listeners
                        .notify(|l| l.resolved_ssrc_conflict(&self.id, local_ssrc, new_ssrc));
                }
                SsrcVerdict::Normal => {}
            }
        }

        self.sent_or_received.store(true, Ordering::Release);

        let participant = self.database.get_or_create_from_data_packet(origin, &packet);

        if discard_out_of_order
            && participant.last_sequence_number() >= i32::from(packet.sequence_number)
        {
            trace!(
                "Discarded out of order packet from {} in session with id {} (last SN was {}, packet SN was {})",
                participant,
                self.id,
                participant.last_sequence_number(),
                packet.sequence_number
            );
            return;
        }

        participant.set_last_sequence_number(i32::from(packet.sequence_number));
        participant.set_last_data_origin(origin);
        participant.increment_received_packets();
        participant.touch();

        let info = participant.info();
        self.data_listeners
            .notify(|l| l.data_packet_received(&self.id, &info, &packet));
    }

    /// Ingress path for decoded compound control packets.
    async fn handle_control_packet(
        self: &Arc<Self>,
        origin: SocketAddr,
        compound: CompoundControlPacket,
    ) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        let (automated, try_update) = {
            let config = self.config.read().unwrap();
            (
                config.automated_rtcp_handling,
                config.try_to_update_on_every_sdes,
            )
        };

        if !automated {
            self.control_listeners
                .notify(|l| l.control_packet_received(&self.id, &compound));
            return;
        }

        let local_ssrc = self.local.ssrc();
        for packet in compound.packets() {
            match packet {
                ControlPacket::SenderReport(sr) => {
                    self.handle_report(sr.sender_ssrc, &sr.reception_reports, local_ssrc)
                }
                ControlPacket::ReceiverReport(rr) => {
                    self.handle_report(rr.sender_ssrc, &rr.reception_reports, local_ssrc)
                }
                ControlPacket::SourceDescription(sdes) => {
                    self.handle_sdes(origin, sdes, try_update)
                }
                ControlPacket::Bye(bye) => self.handle_bye(bye),
                ControlPacket::AppData(app) => self
                    .control_listeners
                    .notify(|l| l.app_data_received(&self.id, app)),
            }
        }
    }

    fn handle_report(&self, sender_ssrc: RtpSsrc, reports: &[ReceptionReport], local_ssrc: RtpSsrc) {
        if reports.is_empty() {
            return;
        }

        // The sender must have announced itself through data or SDES first.
        let Some(sender) = self.database.participant(sender_ssrc) else {
            return;
        };
        sender.touch();

        for block in reports {
            if block.ssrc == local_ssrc {
                // Only the block describing this end matters; reserved for
                // reception-quality tracking.
                trace!(
                    "Reception report from {} for the local source in session with id {}",
                    sender,
                    self.id
                );
            }
        }
    }

    fn handle_sdes(&self, origin: SocketAddr, sdes: &SourceDescription, try_update: bool) {
        for chunk in &sdes.chunks {
            let participant = self.database.get_or_create_from_sdes_chunk(origin, chunk);
            participant.set_last_control_origin(origin);
            participant.touch();

            if !participant.received_sdes() || try_update {
                participant.mark_received_sdes();
                if participant.update_info_from_sdes_chunk(chunk) {
                    self.event_listeners
                        .notify(|l| l.participant_data_updated(&self.id, &participant));
                }
            }
        }
    }

    fn handle_bye(&self, bye: &Bye) {
        for ssrc in &bye.ssrc_list {
            if let Some(participant) = self.database.participant(*ssrc) {
                participant.mark_bye_received();
                participant.touch();
                self.event_listeners
                    .notify(|l| l.participant_left(&self.id, &participant));
            }
        }
        trace!(
            "Received BYE for SSRCs {:?} in session with id {} (reason: {:?})",
            bye.ssrc_list,
            self.id,
            bye.reason_for_leaving
        );
    }

    /// One periodic RTCP round: a report + SDES compound per receiver.
    /// Returns whether the schedule should continue.
    async fn emit_compound_rtcp(self: &Arc<Self>) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }

        let Some(control) = self.control_channel().await else {
            return false;
        };

        let local_ssrc = self.local.ssrc();
        let sdes = self.build_sdes(local_ssrc);

        for receiver in self.database.receivers_snapshot() {
            if !receiver.is_receiver() || receiver.bye_received() {
                continue;
            }
            let report = self.build_report(local_ssrc, &receiver);
            let compound = CompoundControlPacket::of(
                report,
                ControlPacket::SourceDescription(sdes.clone()),
            );
            self.send_control_to(&control, &compound, &receiver).await;
        }

        self.running.load(Ordering::Acquire)
    }

    /// Announce `ssrc` with an empty receiver report + SDES compound
    async fn join_session(&self, control: &Arc<dyn DatagramChannel>, ssrc: RtpSsrc) {
        if !self.config.read().unwrap().automated_rtcp_handling {
            return;
        }

        let report = ControlPacket::ReceiverReport(ReceiverReport::new(ssrc));
        let compound = CompoundControlPacket::of(
            report,
            ControlPacket::SourceDescription(self.build_sdes(ssrc)),
        );
        self.broadcast_control(control, &compound).await;
    }

    /// Say goodbye for `ssrc` with an SDES + BYE compound
    async fn leave_session(
        &self,
        control: &Arc<dyn DatagramChannel>,
        ssrc: RtpSsrc,
        motive: &str,
    ) {
        if !self.config.read().unwrap().automated_rtcp_handling {
            return;
        }

        let compound = CompoundControlPacket::of(
            ControlPacket::SourceDescription(self.build_sdes(ssrc)),
            ControlPacket::Bye(Bye::with_reason(ssrc, motive)),
        );
        self.broadcast_control(control, &compound).await;
    }

    /// Broadcast one encoded data packet to every live receiver
    async fn internal_send_data(&self, packet: &DataPacket) -> bool {
        let Some(data) = self
            .channels
            .read()
            .await
            .as_ref()
            .map(|pair| pair.data.clone())
        else {
            return false;
        };

        let bytes = match self.codec.encode_data(packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    "Failed to encode RTP packet in session with id {}: {}",
                    self.id, e
                );
                return false;
            }
        };

        for receiver in self.database.receivers_snapshot() {
            if receiver.bye_received() {
                continue;
            }
            let Some(address) = receiver.data_address() else {
                continue;
            };
            if let Err(e) = data.send(bytes.clone(), address).await {
                error!(
                    "Failed to send RTP packet to {} in session with id {}: {}",
                    receiver, self.id, e
                );
            }
        }

        true
    }

    /// Broadcast one control compound to every live receiver
    async fn broadcast_control(
        &self,
        control: &Arc<dyn DatagramChannel>,
        compound: &CompoundControlPacket,
    ) {
        let bytes = match self.codec.encode_control(compound) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    "Failed to encode RTCP compound packet in session with id {}: {}",
                    self.id, e
                );
                return;
            }
        };

        for receiver in self.database.receivers_snapshot() {
            if !receiver.is_receiver() || receiver.bye_received() {
                continue;
            }
            let Some(address) = receiver.control_address() else {
                continue;
            };
            if let Err(e) = control.send(bytes.clone(), address).await {
                error!(
                    "Failed to send RTCP packet to {} in session with id {}: {}",
                    receiver, self.id, e
                );
            }
        }
    }

    /// Send one control compound to a single receiver
    async fn send_control_to(
        &self,
        control: &Arc<dyn DatagramChannel>,
        compound: &CompoundControlPacket,
        receiver: &Arc<RtpParticipant>,
    ) {
        let Some(address) = receiver.control_address() else {
            return;
        };

        match self.codec.encode_control(compound) {
            Ok(bytes) => {
                if let Err(e) = control.send(bytes, address).await {
                    error!(
                        "Failed to send RTCP packet to {} in session with id {}: {}",
                        receiver, self.id, e
                    );
                }
            }
            Err(e) => error!(
                "Failed to encode RTCP compound packet in session with id {}: {}",
                self.id, e
            ),
        }
    }

    /// Report packet for one receiver: SR once data was sent, RR otherwise
    fn build_report(&self, local_ssrc: RtpSsrc, context: &Arc<RtpParticipant>) -> ControlPacket {
        let sent_packets = self.sent_packets.load(Ordering::Relaxed);

        let mut report = if sent_packets == 0 {
            ControlPacket::ReceiverReport(ReceiverReport::new(local_ssrc))
        } else {
            let mut sr = SenderReport::new(local_ssrc);
            sr.sender_packet_count = sent_packets as u32;
            sr.sender_octet_count = self.sent_bytes.load(Ordering::Relaxed) as u32;
            ControlPacket::SenderReport(sr)
        };

        // Only attach a reception report when that source actually sent us
        // data; the link statistics themselves are still placeholders.
        if context.received_packet_count() > 0 {
            let block = ReceptionReport::new(context.ssrc());
            match &mut report {
                ControlPacket::SenderReport(sr) => sr.add_reception_report(block),
                ControlPacket::ReceiverReport(rr) => rr.add_reception_report(block),
                _ => {}
            }
        }

        report
    }

    /// SDES packet describing the local participant under `ssrc`
    fn build_sdes(&self, ssrc: RtpSsrc) -> SourceDescription {
        let local_address = self.local.data_address();
        self.local.set_cname_if_absent(|| match local_address {
            Some(address) => format!("rtp-session/{}@{}", self.id, address),
            None => format!("rtp-session/{}", self.id),
        });
        self.local.set_tool_if_absent(TOOL_VERSION);

        let info = self.local.info();
        let mut chunk = SdesChunk::new(ssrc);

        if let Some(cname) = &info.cname {
            chunk.add_item(SdesItem::cname(cname.clone()));
        }
        if let Some(name) = &info.name {
            chunk.add_item(SdesItem::new(SdesItemKind::Name, name.clone()));
        }
        if let Some(email) = &info.email {
            chunk.add_item(SdesItem::new(SdesItemKind::Email, email.clone()));
        }
        if let Some(phone) = &info.phone {
            chunk.add_item(SdesItem::new(SdesItemKind::Phone, phone.clone()));
        }
        if let Some(location) = &info.location {
            chunk.add_item(SdesItem::new(SdesItemKind::Location, location.clone()));
        }
        if let Some(tool) = &info.tool {
            chunk.add_item(SdesItem::tool(tool.clone()));
        }
        if let Some(note) = &info.note {
            chunk.add_item(SdesItem::new(SdesItemKind::Note, note.clone()));
        }

        SourceDescription::with_chunk(chunk)
    }

    /// Tear the session down. The first caller wins; later calls no-op.
    async fn terminate_with(self: &Arc<Self>, reason: TerminationReason) {
        let _lifecycle = self.lifecycle.lock().await;

        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(pair) = self.channels.write().await.take() {
            pair.data.close().await;
            self.leave_session(&pair.control, self.local.ssrc(), "Session terminated.")
                .await;
            pair.control.close().await;
        }

        let scheduler = self.scheduler.lock().unwrap().take();
        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
        self.database.stop_sweeper();

        debug!("Session with id {} terminated: {}", self.id, reason);
        self.event_listeners
            .notify(|l| l.session_terminated(&self.id, &reason));

        self.data_listeners.clear();
        self.control_listeners.clear();
        self.event_listeners.clear();
    }
}
