//! Shared fixtures: an in-memory transport, a table-backed codec and a
//! recording listener.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use rtp_session::packet::rtcp::{AppData, CompoundControlPacket};
use rtp_session::packet::DataPacket;
use rtp_session::participant::{ParticipantInfo, RtpParticipant};
use rtp_session::session::{
    RtpSession, RtpSessionConfig, RtpSessionControlListener, RtpSessionDataListener,
    RtpSessionEventListener, TerminationReason,
};
use rtp_session::transport::{
    ChannelOptions, DatagramChannel, DatagramTransport, IncomingDatagrams, PacketCodec,
};
use rtp_session::{Error, Result, RtpSsrc};

/// Local SSRC used by every test session
pub const LOCAL_SSRC: RtpSsrc = 0x0000_CAFE;

pub fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().unwrap()
}

/// One datagram captured on the egress side
#[derive(Debug, Clone)]
pub struct SentDatagram {
    pub from: SocketAddr,
    pub to: SocketAddr,
    pub bytes: Bytes,
}

#[derive(Default)]
struct MockTransportInner {
    endpoints: Mutex<HashMap<SocketAddr, mpsc::Sender<(SocketAddr, Bytes)>>>,
    sent: Mutex<Vec<SentDatagram>>,
    fail_binds: Mutex<HashSet<SocketAddr>>,
}

/// In-memory datagram transport: captures egress, exposes an injection
/// handle for ingress, and ends a channel's inbound stream on close.
#[derive(Default)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

impl MockTransport {
    /// Make the next bind on `local` fail
    pub fn fail_bind_on(&self, local: SocketAddr) {
        self.inner.fail_binds.lock().unwrap().insert(local);
    }

    /// Whether a channel is currently bound on `local`
    pub fn has_endpoint(&self, local: SocketAddr) -> bool {
        self.inner.endpoints.lock().unwrap().contains_key(&local)
    }

    /// Deliver one datagram to the channel bound on `to`
    pub async fn inject(&self, to: SocketAddr, from: SocketAddr, bytes: Bytes) {
        let sender = self
            .inner
            .endpoints
            .lock()
            .unwrap()
            .get(&to)
            .cloned()
            .unwrap_or_else(|| panic!("no endpoint bound on {}", to));
        sender.send((from, bytes)).await.unwrap();
    }

    /// Every datagram sent so far
    pub fn sent(&self) -> Vec<SentDatagram> {
        self.inner.sent.lock().unwrap().clone()
    }

    /// Every datagram sent to `to`, in order
    pub fn sent_to(&self, to: SocketAddr) -> Vec<SentDatagram> {
        self.sent().into_iter().filter(|d| d.to == to).collect()
    }

    /// Forget captured egress
    pub fn clear_sent(&self) {
        self.inner.sent.lock().unwrap().clear();
    }
}

struct MockChannel {
    local: SocketAddr,
    inner: Arc<MockTransportInner>,
}

#[async_trait]
impl DatagramTransport for MockTransport {
    async fn bind(
        &self,
        local_addr: SocketAddr,
        _options: ChannelOptions,
    ) -> Result<(Arc<dyn DatagramChannel>, IncomingDatagrams)> {
        if self.inner.fail_binds.lock().unwrap().remove(&local_addr) {
            return Err(Error::Transport(format!("bind refused on {}", local_addr)));
        }

        let (tx, rx) = mpsc::channel(64);
        self.inner.endpoints.lock().unwrap().insert(local_addr, tx);

        let channel = Arc::new(MockChannel {
            local: local_addr,
            inner: self.inner.clone(),
        });
        Ok((channel, rx))
    }
}

#[async_trait]
impl DatagramChannel for MockChannel {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    async fn send(&self, payload: Bytes, remote: SocketAddr) -> Result<()> {
        self.inner.sent.lock().unwrap().push(SentDatagram {
            from: self.local,
            to: remote,
            bytes: payload,
        });
        Ok(())
    }

    async fn close(&self) {
        // Dropping the sender ends the inbound stream, per the contract.
        self.inner.endpoints.lock().unwrap().remove(&self.local);
    }
}

enum Wire {
    Data(DataPacket),
    Control(CompoundControlPacket),
}

/// Bijective in-memory codec: "encoding" hands out an opaque token and
/// decoding looks the packet back up, so tests observe exact packet values
/// without a wire format.
#[derive(Default)]
pub struct TableCodec {
    table: Mutex<HashMap<u64, Wire>>,
    next: AtomicU64,
}

impl TableCodec {
    fn store(&self, wire: Wire) -> Bytes {
        let token = self.next.fetch_add(1, Ordering::SeqCst);
        self.table.lock().unwrap().insert(token, wire);
        Bytes::copy_from_slice(&token.to_be_bytes())
    }

    fn token(buf: &[u8]) -> Result<u64> {
        let bytes: [u8; 8] = buf
            .try_into()
            .map_err(|_| Error::Codec("bad token length".to_string()))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

impl PacketCodec for TableCodec {
    fn decode_data(&self, buf: &[u8]) -> Result<DataPacket> {
        match self.table.lock().unwrap().get(&Self::token(buf)?) {
            Some(Wire::Data(packet)) => Ok(packet.clone()),
            _ => Err(Error::Codec("not a data packet".to_string())),
        }
    }

    fn encode_data(&self, packet: &DataPacket) -> Result<Bytes> {
        Ok(self.store(Wire::Data(packet.clone())))
    }

    fn decode_control(&self, buf: &[u8]) -> Result<CompoundControlPacket> {
        match self.table.lock().unwrap().get(&Self::token(buf)?) {
            Some(Wire::Control(packet)) => Ok(packet.clone()),
            _ => Err(Error::Codec("not a control packet".to_string())),
        }
    }

    fn encode_control(&self, packet: &CompoundControlPacket) -> Result<Bytes> {
        Ok(self.store(Wire::Control(packet.clone())))
    }
}

/// Everything a listener observed, in order
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Data {
        ssrc: RtpSsrc,
        sequence: u16,
        payload: Vec<u8>,
    },
    Control,
    AppData {
        name: String,
    },
    JoinedFromData(RtpSsrc),
    JoinedFromControl(RtpSsrc),
    DataUpdated(RtpSsrc),
    Left(RtpSsrc),
    Deleted(RtpSsrc),
    ConflictResolved {
        old: RtpSsrc,
        new: RtpSsrc,
    },
    Terminated(TerminationReason),
}

/// Listener for all three surfaces, recording into one ordered log
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl Recorder {
    fn record(&self, event: RecordedEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&RecordedEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl RtpSessionDataListener for Recorder {
    fn data_packet_received(
        &self,
        _session_id: &str,
        participant: &ParticipantInfo,
        packet: &DataPacket,
    ) {
        self.record(RecordedEvent::Data {
            ssrc: participant.ssrc,
            sequence: packet.sequence_number,
            payload: packet.payload.to_vec(),
        });
    }
}

impl RtpSessionControlListener for Recorder {
    fn control_packet_received(&self, _session_id: &str, _packet: &CompoundControlPacket) {
        self.record(RecordedEvent::Control);
    }

    fn app_data_received(&self, _session_id: &str, packet: &AppData) {
        self.record(RecordedEvent::AppData {
            name: packet.name_str(),
        });
    }
}

impl RtpSessionEventListener for Recorder {
    fn participant_joined_from_data(&self, _session_id: &str, participant: &Arc<RtpParticipant>) {
        self.record(RecordedEvent::JoinedFromData(participant.ssrc()));
    }

    fn participant_joined_from_control(
        &self,
        _session_id: &str,
        participant: &Arc<RtpParticipant>,
    ) {
        self.record(RecordedEvent::JoinedFromControl(participant.ssrc()));
    }

    fn participant_data_updated(&self, _session_id: &str, participant: &Arc<RtpParticipant>) {
        self.record(RecordedEvent::DataUpdated(participant.ssrc()));
    }

    fn participant_left(&self, _session_id: &str, participant: &Arc<RtpParticipant>) {
        self.record(RecordedEvent::Left(participant.ssrc()));
    }

    fn participant_deleted(&self, _session_id: &str, participant: &Arc<RtpParticipant>) {
        self.record(RecordedEvent::Deleted(participant.ssrc()));
    }

    fn resolved_ssrc_conflict(&self, _session_id: &str, old_ssrc: RtpSsrc, new_ssrc: RtpSsrc) {
        self.record(RecordedEvent::ConflictResolved {
            old: old_ssrc,
            new: new_ssrc,
        });
    }

    fn session_terminated(&self, _session_id: &str, reason: &TerminationReason) {
        self.record(RecordedEvent::Terminated(reason.clone()));
    }
}

/// A session wired to the mock transport, table codec and recorder
pub struct Harness {
    pub session: RtpSession,
    pub transport: Arc<MockTransport>,
    pub codec: Arc<TableCodec>,
    pub recorder: Arc<Recorder>,
    pub local_data: SocketAddr,
    pub local_control: SocketAddr,
}

impl Harness {
    pub async fn inject_data(&self, origin: SocketAddr, packet: &DataPacket) {
        let bytes = self.codec.encode_data(packet).unwrap();
        self.transport.inject(self.local_data, origin, bytes).await;
    }

    pub async fn inject_control(&self, origin: SocketAddr, compound: &CompoundControlPacket) {
        let bytes = self.codec.encode_control(compound).unwrap();
        self.transport
            .inject(self.local_control, origin, bytes)
            .await;
    }

    pub fn decode_control(&self, datagram: &SentDatagram) -> CompoundControlPacket {
        self.codec.decode_control(&datagram.bytes).unwrap()
    }

    pub fn decode_data(&self, datagram: &SentDatagram) -> DataPacket {
        self.codec.decode_data(&datagram.bytes).unwrap()
    }
}

/// Build a session from `config` with the fixtures attached (not yet
/// initialized)
pub fn setup(config: RtpSessionConfig) -> Harness {
    let local_data = addr(7000);
    let local_control = addr(7001);

    let transport = Arc::new(MockTransport::default());
    let codec = Arc::new(TableCodec::default());
    let recorder = Arc::new(Recorder::default());

    let local = RtpParticipant::receiver(LOCAL_SSRC, local_data, local_control);
    let session = RtpSession::new(config, local, transport.clone(), codec.clone()).unwrap();

    session.add_data_listener(recorder.clone());
    session.add_control_listener(recorder.clone());
    session.add_event_listener(recorder.clone());

    Harness {
        session,
        transport,
        codec,
        recorder,
        local_data,
        local_control,
    }
}

/// A remote receiver with data/control ports
pub fn receiver(ssrc: RtpSsrc, data_port: u16, control_port: u16) -> RtpParticipant {
    RtpParticipant::receiver(ssrc, addr(data_port), addr(control_port))
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within timeout");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
