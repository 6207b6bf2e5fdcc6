//! Owns one WebSocket connection: handshake, authentication, parameter
//! negotiation, the blocking receive loop, and keepalive/timeout
//! discipline.
//!
//! Transport is plain `tungstenite` over a raw `TcpStream` rather than
//! `tokio-tungstenite`: the concurrency model (§5) is N blocking OS
//! threads, one per session, not an async runtime; TLS negotiation is out
//! of scope (§1 Non-goals), so there is no `MaybeTlsStream` to juggle.

use kiwi_core::config::SessionConfig;
use kiwi_core::error::{KiwiError, Result as KiwiResult};
use kiwi_core::protocol::{ControlAction, ControlChannel, Frame, FrameCodec};
use kiwi_core::SessionState;
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tungstenite::client::IntoClientRequest;
use tungstenite::{Message, WebSocket};

pub struct SessionEngine {
    cfg: SessionConfig,
    state: SessionState,
    socket: Option<WebSocket<TcpStream>>,
    start: Instant,
}

impl SessionEngine {
    pub fn new(cfg: SessionConfig) -> Self {
        Self {
            cfg,
            state: SessionState::new(),
            socket: None,
            start: Instant::now(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Opens the TCP connection and performs the WebSocket opening
    /// handshake against `/<timestamp_seed>/<stream_kind>`.
    pub fn connect(&mut self) -> KiwiResult<()> {
        let timeout = Duration::from_secs(self.cfg.socket_timeout_seconds);
        let addr = format!("{}:{}", self.cfg.server_host, self.cfg.server_port);
        let stream = TcpStream::connect(&addr).map_err(|e| KiwiError::Connect(e.to_string()))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(KiwiError::Io)?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(KiwiError::Io)?;
        let _ = stream.set_nodelay(true);

        let url = format!(
            "ws://{}:{}/{}/{}",
            self.cfg.server_host,
            self.cfg.server_port,
            self.cfg.timestamp_seed,
            self.cfg.stream_kind.path_segment()
        );
        let request = url
            .into_client_request()
            .map_err(|e| KiwiError::Connect(e.to_string()))?;
        let (socket, _response) =
            tungstenite::client(request, stream).map_err(|e| KiwiError::Connect(e.to_string()))?;

        self.socket = Some(socket);
        self.state = SessionState::new();
        self.start = Instant::now();
        Ok(())
    }

    /// Sends the initial `SET auth` message.
    pub fn open(&mut self) -> KiwiResult<()> {
        self.send_text(&ControlChannel::auth(&self.cfg.password))
    }

    fn send_text(&mut self, text: &str) -> KiwiResult<()> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| KiwiError::Protocol("send on a closed session".into()))?;
        socket
            .send(Message::Text(text.to_string()))
            .map_err(to_kiwi_error)
    }

    fn send_actions(&mut self, actions: Vec<ControlAction>) -> KiwiResult<()> {
        for action in actions {
            match action {
                ControlAction::Send(text) => self.send_text(&text)?,
                ControlAction::Keepalive => self.send_text(&ControlChannel::keepalive())?,
                ControlAction::GnssPosition { lat, lon } => {
                    tracing::debug!(lat, lon, "gnss position update");
                }
            }
        }
        Ok(())
    }

    fn check_time_limit(&self) -> KiwiResult<()> {
        if let Some(tlimit) = self.cfg.tlimit_seconds {
            if self.start.elapsed().as_secs_f64() > tlimit {
                return Err(KiwiError::TimeLimit);
            }
        }
        Ok(())
    }

    /// Receives and dispatches one message. `MSG` frames are consumed
    /// entirely by the control channel and return `None`; `SND`/`W/F`
    /// frames are handed back to the caller (for the sample pipeline) and
    /// a keepalive is enqueued immediately, per §4.6.
    pub fn run_once(&mut self) -> KiwiResult<Option<Frame>> {
        self.check_time_limit()?;
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| KiwiError::Protocol("read on a closed session".into()))?;

        let message = socket.read().map_err(to_kiwi_error)?;
        let data = match message {
            Message::Binary(bytes) => bytes,
            Message::Text(text) => text.into_bytes(),
            Message::Close(_) => return Err(KiwiError::ServerTerminated),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Ok(None),
        };

        let frame = FrameCodec::decode(&data)?;
        match &frame {
            Frame::Msg(params) => {
                let actions = ControlChannel::dispatch(params, &mut self.state, &self.cfg)?;
                self.send_actions(actions)?;
                Ok(None)
            }
            Frame::Snd { seq, .. } => {
                self.state.last_snd_seq = Some(*seq);
                self.send_text(&ControlChannel::keepalive())?;
                Ok(Some(frame))
            }
            Frame::Wf { seq, .. } => {
                self.state.last_wf_seq = Some(*seq);
                self.send_text(&ControlChannel::keepalive())?;
                Ok(Some(frame))
            }
        }
    }

    /// Writer-role counterpart to [`SessionEngine::run_once`]: transmits one
    /// externally supplied line (e.g. read from stdin by the caller) as-is,
    /// or prefixed `ADM tunW <line>` when the session's stream kind is
    /// `Admin`. Grounded on `kiwi_nc.py`'s admin/control passthrough mode,
    /// where the writer role forwards raw operator input instead of
    /// consuming server frames.
    pub fn run_once_writer(&mut self, line: &str) -> KiwiResult<()> {
        match self.cfg.stream_kind {
            kiwi_core::config::StreamKind::Admin => {
                self.send_text(&format!("ADM tunW {line}"))
            }
            _ => self.send_text(line),
        }
    }

    /// Issues a `GOING_AWAY` close frame and drops the socket. Safe to
    /// call repeatedly, including after a prior failure.
    pub fn close(&mut self) {
        if let Some(socket) = self.socket.as_mut() {
            let _ = socket.close(Some(tungstenite::protocol::CloseFrame {
                code: tungstenite::protocol::frame::coding::CloseCode::Away,
                reason: std::borrow::Cow::Borrowed(""),
            }));
        }
        self.socket = None;
    }
}

fn to_kiwi_error(err: tungstenite::Error) -> KiwiError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            KiwiError::ServerTerminated
        }
        tungstenite::Error::Io(io) => KiwiError::Io(io),
        other => KiwiError::Protocol(other.to_string()),
    }
}
