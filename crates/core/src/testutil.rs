//! In-memory fakes for driving the controller in tests.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::controller::{Event, SessionController};
use crate::listener::{DisconnectReason, DisplayClientListener, DisplayInfo};
use crate::playback::{
    PipelineError, PlaybackFactory, PlaybackNotifier, PlaybackOp, PlaybackRequest,
    PlaybackSession,
};
use crate::protocol::{RtspMessage, RtspRequest, RtspResponse};
use crate::session::PlaybackSessionId;
use crate::source::SourceConfig;
use crate::transport::{ConnectionId, NetworkSession};

pub const SINK_ADDR: &str = "192.168.49.2:50000";
pub const SOURCE_ADDR: &str = "192.168.49.1:7236";
pub const SERVER_RTP_PORT: u16 = 15550;

#[derive(Default)]
pub struct TransportLog {
    pub sent: Vec<(ConnectionId, String)>,
    pub closed: Vec<ConnectionId>,
    /// Connections whose peer vanished without a close event.
    pub dead: HashSet<ConnectionId>,
    pub fail_sends: bool,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    pub log: Arc<Mutex<TransportLog>>,
}

impl FakeTransport {
    /// Drain the messages sent so far.
    pub fn take_sent(&self) -> Vec<(ConnectionId, String)> {
        std::mem::take(&mut self.log.lock().sent)
    }

    pub fn closed(&self) -> Vec<ConnectionId> {
        self.log.lock().closed.clone()
    }
}

impl NetworkSession for FakeTransport {
    fn send(&mut self, conn: ConnectionId, data: &[u8]) -> io::Result<()> {
        let mut log = self.log.lock();
        if log.fail_sends || log.dead.contains(&conn) || log.closed.contains(&conn) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        log.sent.push((conn, String::from_utf8_lossy(data).into_owned()));
        Ok(())
    }

    fn close(&mut self, conn: ConnectionId) {
        self.log.lock().closed.push(conn);
    }

    fn is_alive(&self, conn: ConnectionId) -> bool {
        let log = self.log.lock();
        !log.dead.contains(&conn) && !log.closed.contains(&conn)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCall {
    Create(PlaybackSessionId),
    Start(PlaybackSessionId),
    Pause(PlaybackSessionId),
    Teardown(PlaybackSessionId),
}

#[derive(Clone, Default)]
pub struct FakePlayback {
    pub calls: Arc<Mutex<Vec<PlaybackCall>>>,
    pub fail_on: Arc<Mutex<Option<PlaybackOp>>>,
    pub notifiers: Arc<Mutex<Vec<PlaybackNotifier>>>,
    pub requests: Arc<Mutex<Vec<PlaybackRequest>>>,
}

impl FakePlayback {
    pub fn fail_on(&self, op: PlaybackOp) {
        *self.fail_on.lock() = Some(op);
    }

    pub fn calls(&self) -> Vec<PlaybackCall> {
        self.calls.lock().clone()
    }

    /// Sessions created and not yet torn down.
    pub fn live_sessions(&self) -> usize {
        let calls = self.calls.lock();
        let created = calls.iter().filter(|c| matches!(c, PlaybackCall::Create(_))).count();
        let released = calls.iter().filter(|c| matches!(c, PlaybackCall::Teardown(_))).count();
        created - released
    }

    fn check(fail_on: &Mutex<Option<PlaybackOp>>, op: PlaybackOp) -> Result<(), PipelineError> {
        if *fail_on.lock() == Some(op) {
            return Err(PipelineError::new(op, "injected failure"));
        }
        Ok(())
    }
}

impl PlaybackFactory for FakePlayback {
    fn create(
        &self,
        request: &PlaybackRequest,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn PlaybackSession>, PipelineError> {
        Self::check(&self.fail_on, PlaybackOp::Create)?;
        self.calls.lock().push(PlaybackCall::Create(request.id));
        self.requests.lock().push(request.clone());
        self.notifiers.lock().push(notifier);
        Ok(Box::new(FakeSession {
            id: request.id,
            calls: self.calls.clone(),
            fail_on: self.fail_on.clone(),
        }))
    }
}

struct FakeSession {
    id: PlaybackSessionId,
    calls: Arc<Mutex<Vec<PlaybackCall>>>,
    fail_on: Arc<Mutex<Option<PlaybackOp>>>,
}

impl PlaybackSession for FakeSession {
    fn local_rtp_port(&self) -> u16 {
        SERVER_RTP_PORT
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        FakePlayback::check(&self.fail_on, PlaybackOp::Start)?;
        self.calls.lock().push(PlaybackCall::Start(self.id));
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PipelineError> {
        FakePlayback::check(&self.fail_on, PlaybackOp::Pause)?;
        self.calls.lock().push(PlaybackCall::Pause(self.id));
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), PipelineError> {
        self.calls.lock().push(PlaybackCall::Teardown(self.id));
        FakePlayback::check(&self.fail_on, PlaybackOp::Teardown)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Connected(PlaybackSessionId),
    Disconnected(DisconnectReason),
}

#[derive(Clone, Default)]
pub struct RecordingListener {
    pub notifications: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingListener {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn disconnects(&self) -> Vec<DisconnectReason> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Disconnected(reason) => Some(reason),
                Notification::Connected(_) => None,
            })
            .collect()
    }
}

impl DisplayClientListener for RecordingListener {
    fn on_display_connected(&self, info: &DisplayInfo) {
        self.notifications.lock().push(Notification::Connected(info.session_id));
    }

    fn on_display_disconnected(&self, reason: &DisconnectReason) {
        self.notifications.lock().push(Notification::Disconnected(reason.clone()));
    }
}

/// A controller wired to fakes, with a manual clock.
pub struct Harness {
    pub controller: SessionController,
    pub transport: FakeTransport,
    pub playback: FakePlayback,
    pub listener: RecordingListener,
    pub events: mpsc::UnboundedReceiver<Event>,
    pub now: Instant,
    next_conn: u32,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SourceConfig::default())
    }

    pub fn with_config(config: SourceConfig) -> Self {
        let transport = FakeTransport::default();
        let playback = FakePlayback::default();
        let listener = RecordingListener::default();
        let (events_tx, events) = mpsc::unbounded_channel();
        let controller = SessionController::new(
            Arc::new(config),
            Box::new(transport.clone()),
            Arc::new(playback.clone()),
            Arc::new(listener.clone()),
            events_tx,
        );
        Self {
            controller,
            transport,
            playback,
            listener,
            events,
            now: Instant::now(),
            next_conn: 1,
        }
    }

    /// Accept a new connection from the sink.
    pub fn connect(&mut self) -> ConnectionId {
        let conn = ConnectionId(self.next_conn);
        self.next_conn += 1;
        let remote_addr: SocketAddr = SINK_ADDR.parse().unwrap();
        let local_addr: SocketAddr = SOURCE_ADDR.parse().unwrap();
        self.controller.handle_event(
            Event::ConnectionAccepted {
                conn,
                remote_addr,
                local_addr,
            },
            self.now,
        );
        conn
    }

    pub fn deliver(&mut self, conn: ConnectionId, raw: &str) {
        self.controller.handle_event(
            Event::DataReceived {
                conn,
                data: raw.as_bytes().to_vec(),
            },
            self.now,
        );
    }

    pub fn close(&mut self, conn: ConnectionId, error: Option<io::Error>) {
        self.controller
            .handle_event(Event::ConnectionClosed { conn, error }, self.now);
    }

    /// Move the clock forward and fire the keep-alive timer if it is due.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        if self
            .controller
            .keepalive_deadline()
            .is_some_and(|deadline| deadline <= self.now)
        {
            self.controller.on_keepalive_timer(self.now);
        }
    }

    /// Forward events queued by playback notifiers.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.controller.handle_event(event, self.now);
        }
    }

    /// Drain sent messages, parsed.
    pub fn sent(&self) -> Vec<RtspMessage> {
        self.transport
            .take_sent()
            .into_iter()
            .map(|(_, raw)| RtspMessage::parse(raw.as_bytes()).unwrap())
            .collect()
    }

    /// The one request sent since the last drain.
    pub fn sent_request(&self) -> RtspRequest {
        let mut sent = self.sent();
        assert_eq!(sent.len(), 1, "expected exactly one message, got {sent:?}");
        match sent.remove(0) {
            RtspMessage::Request(request) => request,
            RtspMessage::Response(response) => panic!("expected a request, got {response:?}"),
        }
    }

    /// The one response sent since the last drain.
    pub fn sent_response(&self) -> RtspResponse {
        let mut sent = self.sent();
        assert_eq!(sent.len(), 1, "expected exactly one message, got {sent:?}");
        match sent.remove(0) {
            RtspMessage::Response(response) => response,
            RtspMessage::Request(request) => panic!("expected a response, got {request:?}"),
        }
    }

    /// Send `request` from the sink and return the source's response.
    pub fn request(&mut self, conn: ConnectionId, request: &str) -> RtspResponse {
        self.deliver(conn, request);
        self.sent_response()
    }

    /// Answer the source's pending request with 200 OK and optional body.
    pub fn answer(&mut self, conn: ConnectionId, request: &RtspRequest, body: Option<&str>) {
        let cseq = request.cseq().unwrap();
        let mut response = format!("RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\n");
        if let Some(body) = body {
            response.push_str(&format!(
                "Content-Type: text/parameters\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            ));
        } else {
            response.push_str("\r\n");
        }
        self.deliver(conn, &response);
    }

    /// Connect and run M1 through M5 with a well-behaved sink.
    pub fn negotiated(&mut self) -> ConnectionId {
        let conn = self.connect();

        let m1 = self.sent_request();
        let cseq = m1.cseq().unwrap();
        self.deliver(
            conn,
            &format!(
                "RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\n\
                 Public: org.wfa.wfd1.0, GET_PARAMETER, SET_PARAMETER\r\n\r\n"
            ),
        );

        let m3 = self.sent_request();
        self.answer(
            conn,
            &m3,
            Some(
                "wfd_video_formats: 00 00 01 01 00000001 00000000 00000000 00 0000 0000 00 none none\r\n\
                 wfd_audio_codecs: AAC 00000001 00\r\n\
                 wfd_client_rtp_ports: RTP/AVP/UDP;unicast 19000 0 mode=play\r\n",
            ),
        );

        let m4 = self.sent_request();
        self.answer(conn, &m4, None);

        let m5 = self.sent_request();
        self.answer(conn, &m5, None);
        assert!(self.sent().is_empty());
        conn
    }

    /// SETUP from the sink; returns the session header id.
    pub fn setup(&mut self, conn: ConnectionId, cseq: u32) -> PlaybackSessionId {
        let response = self.request(
            conn,
            &format!(
                "SETUP rtsp://192.168.49.1/wfd1.0/streamid=0 RTSP/1.0\r\nCSeq: {cseq}\r\n\
                 Transport: RTP/AVP/UDP;unicast;client_port=19000\r\n\r\n"
            ),
        );
        assert_eq!(response.status_code, 200, "SETUP failed: {response:?}");
        let session = response.get_header("Session").unwrap();
        PlaybackSessionId::parse(session.split(';').next().unwrap()).unwrap()
    }

    /// PLAY (or PAUSE, TEARDOWN) naming `session`.
    pub fn session_request(
        &mut self,
        conn: ConnectionId,
        method: &str,
        cseq: u32,
        session: PlaybackSessionId,
    ) -> RtspResponse {
        self.request(
            conn,
            &format!(
                "{method} rtsp://192.168.49.1/wfd1.0/streamid=0 RTSP/1.0\r\n\
                 CSeq: {cseq}\r\nSession: {session}\r\n\r\n"
            ),
        )
    }
}
