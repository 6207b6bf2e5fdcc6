//! Per-session configuration, mutable session state, and the fan-out
//! expansion that turns scalar-or-list CLI options into one record per
//! session.

use std::time::{SystemTime, UNIX_EPOCH};

/// Demodulation mode requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    Am,
    Lsb,
    Usb,
    Cw,
    Nbfm,
    Iq,
}

impl Modulation {
    pub fn as_str(self) -> &'static str {
        match self {
            Modulation::Am => "am",
            Modulation::Lsb => "lsb",
            Modulation::Usb => "usb",
            Modulation::Cw => "cw",
            Modulation::Nbfm => "nbfm",
            Modulation::Iq => "iq",
        }
    }

    pub fn is_iq(self) -> bool {
        matches!(self, Modulation::Iq)
    }
}

impl std::str::FromStr for Modulation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "am" => Ok(Modulation::Am),
            "lsb" => Ok(Modulation::Lsb),
            "usb" => Ok(Modulation::Usb),
            "cw" => Ok(Modulation::Cw),
            "nbfm" => Ok(Modulation::Nbfm),
            "iq" => Ok(Modulation::Iq),
            other => Err(format!("unknown modulation {other:?}")),
        }
    }
}

/// The three session personalities sharing one frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Snd,
    Wf,
    Admin,
}

impl StreamKind {
    /// Path component used in the WebSocket opening handshake, e.g.
    /// `/<timestamp_seed>/SND`.
    pub fn path_segment(self) -> &'static str {
        match self {
            StreamKind::Snd => "SND",
            StreamKind::Wf => "W/F",
            StreamKind::Admin => "admin",
        }
    }
}

/// Immutable per-session record. Produced by [`FanoutConfig::expand`] from
/// a single CLI invocation's scalar-or-list option records.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server_host: String,
    pub server_port: u16,
    pub password: String,
    pub user: String,
    pub freq_khz: f64,
    pub modulation: Modulation,
    pub lp_cut: f64,
    pub hp_cut: f64,
    pub agc_gain: Option<f64>,
    pub compression: bool,
    pub squelch_threshold_db: Option<f32>,
    pub squelch_tail_seconds: f32,
    pub tlimit_seconds: Option<f64>,
    pub dir: Option<String>,
    pub filename: Option<String>,
    pub station: Option<String>,
    pub dt_sec: u32,
    pub is_kiwi_wav: bool,
    pub tdoa: bool,
    pub connection_index: usize,
    pub multiple_connections: bool,
    pub socket_timeout_seconds: u64,
    pub launch_delay_seconds: u64,
    pub stream_kind: StreamKind,
    pub timestamp_seed: u32,
}

impl SessionConfig {
    /// Resolves the low-pass cutoff the wire protocol actually sends: for
    /// `am`, the engine forces `lp_cut := -hp_cut` regardless of the
    /// configured value.
    pub fn effective_lp_cut(&self) -> f64 {
        if self.modulation == Modulation::Am {
            -self.hp_cut
        } else {
            self.lp_cut
        }
    }

    /// `index` argument is currently part of the seed recipe (wall-clock
    /// seconds + pid + connection index), but the ring always wraps at
    /// 2^32 regardless of platform pid width.
    pub fn derive_timestamp_seed(now_unix_secs: u64, pid: u32, index: usize) -> u32 {
        let mixed = now_unix_secs
            .wrapping_add(pid as u64)
            .wrapping_add(index as u64);
        (mixed % (1u64 << 32)) as u32
    }
}

/// Mutable, per-session state learned over the lifetime of one connection.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub sample_rate_hz: Option<f64>,
    pub server_version_major: Option<u32>,
    pub server_version_minor: Option<u32>,
    pub gnss_position: Option<(f64, f64)>,
    pub last_snd_seq: Option<u32>,
    pub last_wf_seq: Option<u32>,
    pub running: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            running: true,
            ..Default::default()
        }
    }
}

/// A field that may be supplied once (applies to every expanded session)
/// or as a list (one entry per session, by position).
#[derive(Debug, Clone)]
pub enum FanoutField<T> {
    Scalar(T),
    List(Vec<T>),
}

impl<T: Clone> FanoutField<T> {
    /// Entry `i`, or the last entry if `i` overflows a list — matching
    /// `kiwirecorder.py`'s `_sel_entry`.
    fn entry(&self, i: usize) -> T {
        match self {
            FanoutField::Scalar(v) => v.clone(),
            FanoutField::List(items) => {
                let idx = i.min(items.len().saturating_sub(1));
                items[idx].clone()
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            FanoutField::Scalar(_) => 1,
            FanoutField::List(items) => items.len(),
        }
    }
}

/// Raw option record as parsed from the CLI, before expansion into N
/// concrete [`SessionConfig`] values, one per `server_host` entry.
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    pub server_host: Vec<String>,
    pub server_port: FanoutField<u16>,
    pub password: FanoutField<String>,
    pub frequency_khz: FanoutField<f64>,
    pub agc_gain: FanoutField<Option<f64>>,
    pub filename: FanoutField<Option<String>>,
    pub station: FanoutField<Option<String>>,
    pub user: FanoutField<String>,
    pub modulation: Modulation,
    pub lp_cut: f64,
    pub hp_cut: f64,
    pub compression: bool,
    pub squelch_threshold_db: Option<f32>,
    pub squelch_tail_seconds: f32,
    pub tlimit_seconds: Option<f64>,
    pub dir: Option<String>,
    pub dt_sec: u32,
    pub is_kiwi_wav: bool,
    pub tdoa: bool,
    pub socket_timeout_seconds: u64,
    pub launch_delay_seconds: u64,
    pub stream_kind: StreamKind,
}

impl FanoutConfig {
    /// Expands into one [`SessionConfig`] per `server_host` entry. Timestamp
    /// seeds are derived from `now_unix_secs`/`pid` plus the connection
    /// index so that concurrent sessions in one process never collide.
    pub fn expand(&self, now_unix_secs: u64, pid: u32) -> Vec<SessionConfig> {
        let n = self.server_host.len();
        let multiple_connections = n > 1;
        (0..n)
            .map(|i| SessionConfig {
                server_host: self.server_host[i].clone(),
                server_port: self.server_port.entry(i),
                password: self.password.entry(i),
                user: self.user.entry(i),
                freq_khz: self.frequency_khz.entry(i),
                modulation: self.modulation,
                lp_cut: self.lp_cut,
                hp_cut: self.hp_cut,
                agc_gain: self.agc_gain.entry(i),
                compression: self.compression,
                squelch_threshold_db: self.squelch_threshold_db,
                squelch_tail_seconds: self.squelch_tail_seconds,
                tlimit_seconds: self.tlimit_seconds,
                dir: self.dir.clone(),
                filename: self.filename.entry(i),
                station: self.station.entry(i),
                dt_sec: self.dt_sec,
                is_kiwi_wav: self.is_kiwi_wav,
                tdoa: self.tdoa,
                connection_index: i,
                multiple_connections,
                socket_timeout_seconds: self.socket_timeout_seconds,
                launch_delay_seconds: self.launch_delay_seconds,
                stream_kind: self.stream_kind,
                timestamp_seed: SessionConfig::derive_timestamp_seed(now_unix_secs, pid, i),
            })
            .collect()
    }
}

/// Wall-clock seconds since the Unix epoch, used as one input to the
/// timestamp-seed recipe. Not itself part of the pure `expand` logic so
/// that expansion remains deterministic and testable.
pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
