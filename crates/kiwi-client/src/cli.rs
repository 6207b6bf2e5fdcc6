//! Command-line surface (§6): recognized options and their expansion into
//! a [`FanoutConfig`], via the comma-separated-list convention the
//! original recorder exposes for every per-connection field.

use clap::Parser;
use kiwi_core::config::{FanoutConfig, FanoutField, Modulation, StreamKind};

#[derive(Parser, Debug)]
#[command(name = "kiwirecorder", about = "Record audio/IQ/waterfall from one or more KiwiSDR receivers")]
pub struct RecorderArgs {
    /// Comma-separated receiver host(s).
    #[arg(short = 's', long = "server-host", default_value = "localhost")]
    pub server_host: String,

    /// Comma-separated receiver port(s).
    #[arg(short = 'p', long = "server-port", default_value = "8073")]
    pub server_port: String,

    /// Comma-separated login password(s).
    #[arg(long = "password", default_value = "")]
    pub password: String,

    /// Client identifier reported to the server.
    #[arg(long = "user", default_value = "kiwirecorder.rs")]
    pub user: String,

    /// Comma-separated frequency/frequencies in kHz.
    #[arg(short = 'f', long = "freq", default_value = "1000")]
    pub frequency: String,

    /// Demodulation mode: am|lsb|usb|cw|nbfm|iq.
    #[arg(short = 'm', long = "modulation", default_value = "am")]
    pub modulation: String,

    /// Low-pass cutoff in Hz.
    #[arg(long = "lp-cutoff", default_value_t = 100.0)]
    pub lp_cutoff: f64,

    /// High-pass cutoff in Hz.
    #[arg(long = "hp-cutoff", default_value_t = 2700.0)]
    pub hp_cutoff: f64,

    /// Comma-separated manual AGC gain(s); omit an entry for AGC auto.
    #[arg(long = "agc-gain")]
    pub agc_gain: Option<String>,

    /// Disable ADPCM audio compression (enabled by default).
    #[arg(long = "no-compression", default_value_t = false)]
    pub no_compression: bool,

    /// Squelch threshold in dB above the tracked noise floor.
    #[arg(long = "squelch-threshold")]
    pub squelch_threshold: Option<f32>,

    /// Squelch tail length in seconds.
    #[arg(long = "squelch-tail", default_value_t = 1.0)]
    pub squelch_tail: f32,

    /// Stop recording after this many seconds.
    #[arg(long = "tlimit")]
    pub tlimit: Option<f64>,

    /// Output directory.
    #[arg(long = "dir")]
    pub dir: Option<String>,

    /// Comma-separated output filename base(s), without extension.
    #[arg(long = "filename")]
    pub filename: Option<String>,

    /// Comma-separated station identifier(s), used to disambiguate filenames.
    #[arg(long = "station")]
    pub station: Option<String>,

    /// File rotation interval in seconds; 0 disables rotation.
    #[arg(long = "dt-sec", default_value_t = 0)]
    pub dt_sec: u32,

    /// Write the kiwi-wav variant with an interleaved GPS timestamp chunk.
    #[arg(long = "kiwi-wav", default_value_t = false)]
    pub kiwi_wav: bool,

    /// Enable TDoA mode: print a final `status=<idx>,<code>` line per session.
    #[arg(long = "tdoa", default_value_t = false)]
    pub tdoa: bool,

    /// Per-socket read/write timeout in seconds.
    #[arg(long = "socket-timeout", default_value_t = 10)]
    pub socket_timeout: u64,

    /// Seconds to wait between launching sequential workers.
    #[arg(long = "launch-delay", default_value_t = 0)]
    pub launch_delay: u64,

    /// Record the waterfall stream instead of audio/IQ.
    #[arg(long = "waterfall", default_value_t = false)]
    pub waterfall: bool,

    /// Discard output instead of writing to disk (for smoke-testing).
    #[arg(long = "test-mode", default_value_t = false)]
    pub test_mode: bool,

    /// Log level passed to the tracing env filter (error|warn|info|debug|trace).
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

/// Splits a comma-separated option value the way the original CLI does
/// (`get_comma_separated_args`): empty input yields an empty list, not a
/// list containing one empty string.
pub fn parse_csv_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

fn csv_field<T: Clone>(raw: &Option<String>, parse: impl Fn(&str) -> T, default: T) -> FanoutField<T> {
    match raw {
        None => FanoutField::Scalar(default),
        Some(raw) => {
            let items: Vec<T> = parse_csv_list(raw).iter().map(|s| parse(s)).collect();
            if items.len() == 1 {
                FanoutField::Scalar(items.into_iter().next().unwrap())
            } else {
                FanoutField::List(items)
            }
        }
    }
}

impl RecorderArgs {
    pub fn into_fanout_config(self) -> anyhow::Result<FanoutConfig> {
        let server_host = parse_csv_list(&self.server_host);
        anyhow::ensure!(!server_host.is_empty(), "at least one --server-host is required");

        let server_port = csv_field(
            &Some(self.server_port.clone()),
            |s| s.parse::<u16>().unwrap_or(8073),
            8073,
        );
        let password = csv_field(&Some(self.password.clone()), |s| s.to_string(), String::new());
        let frequency_khz = csv_field(
            &Some(self.frequency.clone()),
            |s| s.parse::<f64>().unwrap_or(1000.0),
            1000.0,
        );
        let agc_gain = csv_field(
            &self.agc_gain,
            |s| s.parse::<f64>().ok(),
            None,
        );
        let filename = csv_field(&self.filename, |s| Some(s.to_string()), None);
        let station = csv_field(&self.station, |s| Some(s.to_string()), None);
        let user = csv_field(&Some(self.user.clone()), |s| s.to_string(), self.user.clone());

        let modulation: Modulation = self
            .modulation
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let stream_kind = if self.waterfall { StreamKind::Wf } else { StreamKind::Snd };

        Ok(FanoutConfig {
            server_host,
            server_port,
            password,
            frequency_khz,
            agc_gain,
            filename,
            station,
            user,
            modulation,
            lp_cut: self.lp_cutoff,
            hp_cut: self.hp_cutoff,
            compression: !self.no_compression,
            squelch_threshold_db: self.squelch_threshold,
            squelch_tail_seconds: self.squelch_tail,
            tlimit_seconds: self.tlimit,
            dir: self.dir,
            dt_sec: self.dt_sec,
            is_kiwi_wav: self.kiwi_wav,
            tdoa: self.tdoa,
            socket_timeout_seconds: self.socket_timeout,
            launch_delay_seconds: self.launch_delay,
            stream_kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_list_splits_on_commas_and_trims_whitespace() {
        assert_eq!(parse_csv_list("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_csv_list(""), Vec::<String>::new());
    }

    #[test]
    fn option_fan_out_scenario_from_spec_via_cli_parsing() {
        let args = RecorderArgs {
            server_host: "a,b,c".into(),
            server_port: "8073".into(),
            password: "p1".into(),
            user: "kiwirecorder.rs".into(),
            frequency: "1000,2000".into(),
            modulation: "am".into(),
            lp_cutoff: 100.0,
            hp_cutoff: 2700.0,
            agc_gain: None,
            no_compression: false,
            squelch_threshold: None,
            squelch_tail: 1.0,
            tlimit: None,
            dir: None,
            filename: None,
            station: None,
            dt_sec: 0,
            kiwi_wav: false,
            tdoa: false,
            socket_timeout: 10,
            launch_delay: 0,
            waterfall: false,
            test_mode: false,
            log_level: "info".into(),
        };
        let fanout = args.into_fanout_config().unwrap();
        let sessions = fanout.expand(0, 0);
        assert_eq!(sessions.len(), 3);
        assert!(sessions.iter().all(|s| s.password == "p1"));
        assert_eq!(sessions[0].freq_khz, 1000.0);
        assert_eq!(sessions[2].freq_khz, 2000.0);
    }
}
