//! Standalone diagnostic CLI: opens one session against a live KiwiSDR-style
//! server and prints a frame-by-frame summary. Grounded on
//! `microkiwi_waterfall.py` (a minimal waterfall-only consumer) for the
//! default `wf` mode, and on `ws_probe` for the overall shape of a small
//! blocking probe binary.

use anyhow::Context;
use clap::Parser;
use kiwi_core::config::{FanoutConfig, FanoutField, Modulation, StreamKind};
use kiwi_core::protocol::{ControlChannel, Frame, FrameCodec};
use kiwi_core::AdpcmDecoder;
use std::io::IsTerminal;
use std::net::TcpStream;
use std::time::Duration;
use tungstenite::client::IntoClientRequest;
use tungstenite::Message;

#[derive(Debug, Parser)]
#[command(
    name = "kiwi-probe",
    version,
    about = "Connect to a KiwiSDR-style WebSocket and print a short frame summary."
)]
struct Args {
    /// Receiver hostname or address.
    host: String,

    /// Receiver port.
    #[arg(long, default_value_t = 8073)]
    port: u16,

    /// Login password.
    #[arg(long, default_value = "")]
    password: String,

    /// Which stream to probe.
    #[arg(long, value_enum, default_value = "wf")]
    mode: ProbeMode,

    /// Number of data frames to print before exiting.
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Per-read socket timeout (milliseconds).
    #[arg(long, default_value_t = 4000)]
    timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ProbeMode {
    Snd,
    Wf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .with_writer(std::io::stdout)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .map_err(|e| anyhow::anyhow!("init tracing: {e}"))?;

    let args = Args::parse();
    let stream_kind = match args.mode {
        ProbeMode::Snd => StreamKind::Snd,
        ProbeMode::Wf => StreamKind::Wf,
    };

    let fanout = FanoutConfig {
        server_host: vec![args.host.clone()],
        server_port: FanoutField::Scalar(args.port),
        password: FanoutField::Scalar(args.password.clone()),
        frequency_khz: FanoutField::Scalar(14200.0),
        agc_gain: FanoutField::Scalar(None),
        filename: FanoutField::Scalar(None),
        station: FanoutField::Scalar(None),
        user: FanoutField::Scalar("kiwi-probe".to_string()),
        modulation: Modulation::Usb,
        lp_cut: 300.0,
        hp_cut: 2700.0,
        compression: false,
        squelch_threshold_db: None,
        squelch_tail_seconds: 1.0,
        tlimit_seconds: None,
        dir: None,
        dt_sec: 0,
        is_kiwi_wav: false,
        tdoa: false,
        socket_timeout_seconds: args.timeout_ms.div_ceil(1000).max(1),
        launch_delay_seconds: 0,
        stream_kind,
    };
    let cfg = fanout
        .expand(kiwi_core::config::now_unix_secs(), std::process::id())
        .remove(0);

    let addr = format!("{}:{}", cfg.server_host, cfg.server_port);
    tracing::info!(addr, mode = ?args.mode, "connecting");
    let timeout = Duration::from_millis(args.timeout_ms);
    let tcp = TcpStream::connect(&addr).with_context(|| format!("connect to {addr}"))?;
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;

    let url = format!(
        "ws://{}/{}/{}",
        addr,
        cfg.timestamp_seed,
        cfg.stream_kind.path_segment()
    );
    let request = url.into_client_request().context("build request")?;
    let (mut socket, _response) = tungstenite::client(request, tcp).context("websocket handshake")?;

    socket.send(Message::Text(ControlChannel::auth(&cfg.password)))?;
    let mut wf_frame_count = 0usize;
    let mut printed = 0usize;

    while printed < args.count {
        let message = socket.read().context("read message")?;
        let data = match message {
            Message::Binary(bytes) => bytes,
            Message::Text(text) => text.into_bytes(),
            Message::Close(frame) => {
                tracing::info!(frame = ?frame, "server closed the connection");
                break;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        match FrameCodec::decode(&data) {
            Ok(Frame::Msg(params)) => {
                for param in &params {
                    tracing::debug!(key = %param.key, value = ?param.value, "MSG");
                    if param.key == "sample_rate" || param.key == "wf_setup" {
                        for line in ControlChannel::rx_params(&cfg) {
                            socket.send(Message::Text(line))?;
                        }
                    }
                    if param.key == "audio_rate" {
                        if let Some(rate) = param.value.as_deref().and_then(|v| v.parse().ok()) {
                            socket.send(Message::Text(format!("SET AR OK in={rate} out=44100")))?;
                        }
                    }
                }
            }
            Ok(Frame::Snd { seq, smeter, body, .. }) => {
                let rssi = Frame::snd_rssi_dbm(smeter);
                println!("SND seq={seq} rssi={rssi:.1}dBm bytes={}", body.len());
                socket.send(Message::Text(ControlChannel::keepalive()))?;
                printed += 1;
            }
            Ok(Frame::Wf { seq, x_bin, body, .. }) => {
                wf_frame_count += 1;
                let decoded: Vec<u8> = AdpcmDecoder::decode_waterfall_body(&body)
                    .into_iter()
                    .map(|s| s as u8)
                    .collect();
                let avg_dbm: f32 = if decoded.is_empty() {
                    f32::NAN
                } else {
                    decoded.iter().map(|&s| s as f32 - 255.0 - 13.0).sum::<f32>()
                        / decoded.len() as f32
                };
                println!(
                    "W/F seq={seq} x_bin={x_bin} bins={} avg={avg_dbm:.1}dB",
                    decoded.len()
                );
                socket.send(Message::Text(ControlChannel::keepalive()))?;
                printed += 1;
            }
            Err(err) => {
                tracing::warn!(error = %err, "unrecognized frame, ignoring");
            }
        }
    }

    tracing::info!(frames = printed, resets = wf_frame_count, "done");
    let _ = socket.close(None);
    Ok(())
}
