//! `SET key=value` text control protocol: outbound message builders and
//! inbound parameter dispatch.

use crate::config::{Modulation, SessionConfig, SessionState, StreamKind};
use crate::error::KiwiError;
use crate::protocol::frame::MsgParam;

/// Side effects the [`ControlChannel`] wants the session engine to carry
/// out in response to one inbound `MSG` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlAction {
    Send(String),
    /// A data frame should follow shortly; send a keepalive to hold the
    /// session open regardless.
    Keepalive,
    GnssPosition { lat: f64, lon: f64 },
}

pub struct ControlChannel;

impl ControlChannel {
    pub fn auth(password: &str) -> String {
        format!("SET auth t=kiwi p={password}")
    }

    pub fn keepalive() -> String {
        "SET keepalive".to_string()
    }

    /// `SET ident_user=<name>`, used directly by the SND rx-params block
    /// and exposed standalone for callers that need to rename mid-session.
    pub fn set_name(name: &str) -> String {
        format!("SET ident_user={name}")
    }

    /// `SET geo=<value>`: reports a client-side locator string. Not used
    /// by the recorder's own flow, but kept as a public method per the
    /// original stream base class for callers that need it (e.g. a future
    /// `kiwi_nc`-style passthrough mode).
    pub fn set_geo(geo: &str) -> String {
        format!("SET geo={geo}")
    }

    pub fn set_inactivity_timeout(seconds: u32) -> String {
        format!("SET OVERRIDE inactivity_timeout={seconds}")
    }

    fn rx_params_snd(cfg: &SessionConfig) -> Vec<String> {
        let mut out = vec![Self::set_name(&cfg.user)];
        out.push(format!(
            "SET mod={} low_cut={} high_cut={} freq={}",
            cfg.modulation.as_str(),
            cfg.effective_lp_cut(),
            cfg.hp_cut,
            cfg.freq_khz
        ));
        out.push(match cfg.agc_gain {
            Some(gain) => format!("SET agc=0 hang=0 thresh=-100 slope=6 decay=1000 manGain={gain}"),
            None => "SET agc=1 hang=0 thresh=-100 slope=6 decay=1000 manGain=50".to_string(),
        });
        if !cfg.compression {
            out.push("SET compression=0".to_string());
        }
        out.push(Self::set_inactivity_timeout(0));
        out
    }

    fn rx_params_wf() -> Vec<String> {
        vec![
            "SET zoom=0 start=0".to_string(),
            "SET maxdb=-10 mindb=-110".to_string(),
            "SET wf_comp=0".to_string(),
            "SET wf_speed=1".to_string(),
            Self::set_inactivity_timeout(0),
        ]
    }

    /// The `_setup_rx_params` block appropriate to the session's stream kind.
    pub fn rx_params(cfg: &SessionConfig) -> Vec<String> {
        match cfg.stream_kind {
            StreamKind::Snd => Self::rx_params_snd(cfg),
            StreamKind::Wf => Self::rx_params_wf(),
            StreamKind::Admin => Vec::new(),
        }
    }

    fn squelch_off() -> String {
        "SET squelch=0 max=0".to_string()
    }

    fn autonotch_off() -> String {
        "SET lms_autonotch=0".to_string()
    }

    fn gen_off() -> Vec<String> {
        vec!["SET genattn=0".to_string(), "SET gen=0 mix=-1".to_string()]
    }

    fn ar_ok(rate: u32) -> String {
        format!("SET AR OK in={rate} out=44100")
    }

    /// Dispatches one decoded `MSG` frame's parameters, returning the
    /// ordered outbound actions the session engine should perform, or an
    /// error variant from the taxonomy in spec §7 for the terminal cases.
    pub fn dispatch(
        params: &[MsgParam],
        state: &mut SessionState,
        cfg: &SessionConfig,
    ) -> Result<Vec<ControlAction>, KiwiError> {
        let mut actions = Vec::new();

        for param in params {
            match param.key.as_str() {
                "too_busy" => {
                    return Err(KiwiError::TooBusy);
                }
                "badp" => {
                    if param.value.as_deref() == Some("1") {
                        return Err(KiwiError::BadPassword);
                    }
                }
                "down" => {
                    return Err(KiwiError::ServerDown);
                }
                "sample_rate" => {
                    let rate: f64 = param
                        .value
                        .as_deref()
                        .ok_or_else(|| KiwiError::Protocol("sample_rate missing value".into()))?
                        .parse()
                        .map_err(|_| KiwiError::Protocol("sample_rate not numeric".into()))?;
                    state.sample_rate_hz = Some(rate);
                    actions.push(ControlAction::Send(Self::squelch_off()));
                    actions.push(ControlAction::Send(Self::autonotch_off()));
                    for msg in Self::gen_off() {
                        actions.push(ControlAction::Send(msg));
                    }
                    for msg in Self::rx_params(cfg) {
                        actions.push(ControlAction::Send(msg));
                    }
                    actions.push(ControlAction::Keepalive);
                }
                "wf_setup" => {
                    for msg in Self::rx_params(cfg) {
                        actions.push(ControlAction::Send(msg));
                    }
                    actions.push(ControlAction::Keepalive);
                }
                "audio_rate" => {
                    let rate: u32 = param
                        .value
                        .as_deref()
                        .ok_or_else(|| KiwiError::Protocol("audio_rate missing value".into()))?
                        .parse()
                        .map_err(|_| KiwiError::Protocol("audio_rate not numeric".into()))?;
                    actions.push(ControlAction::Send(Self::ar_ok(rate)));
                }
                "version_maj" => {
                    state.server_version_major =
                        param.value.as_deref().and_then(|v| v.parse().ok());
                    log_version_once(state);
                }
                "version_min" => {
                    state.server_version_minor =
                        param.value.as_deref().and_then(|v| v.parse().ok());
                    log_version_once(state);
                }
                "load_cfg" => {
                    if let Some(raw) = &param.value {
                        if let Some((lat, lon)) = parse_load_cfg_gnss(raw) {
                            state.gnss_position = Some((lat, lon));
                            actions.push(ControlAction::GnssPosition { lat, lon });
                        }
                    }
                }
                other => {
                    tracing::debug!(key = other, value = ?param.value, "unhandled control parameter");
                }
            }
        }

        Ok(actions)
    }
}

fn log_version_once(state: &SessionState) {
    if let (Some(maj), Some(min)) = (state.server_version_major, state.server_version_minor) {
        tracing::info!(major = maj, minor = min, "server version");
    }
}

/// Decodes the percent-encoded JSON carried in `load_cfg=...` and extracts
/// the `rx_gps` field, a string shaped like `"(lat,lon,...)"`.
fn parse_load_cfg_gnss(raw: &str) -> Option<(f64, f64)> {
    let decoded = percent_decode(raw);
    let value: serde_json::Value = serde_json::from_str(&decoded).ok()?;
    let rx_gps = value.get("rx_gps")?.as_str()?;
    let inner = rx_gps.trim_start_matches('(').trim_end_matches(')');
    let mut parts = inner.split(',');
    let lat: f64 = parts.next()?.trim().parse().ok()?;
    let lon: f64 = parts.next()?.trim().parse().ok()?;
    Some((lat, lon))
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FanoutConfig;

    fn cfg() -> SessionConfig {
        let fc = FanoutConfig {
            server_host: vec!["a".into()],
            server_port: crate::config::FanoutField::Scalar(8073),
            password: crate::config::FanoutField::Scalar("p".into()),
            frequency_khz: crate::config::FanoutField::Scalar(1000.0),
            agc_gain: crate::config::FanoutField::Scalar(None),
            filename: crate::config::FanoutField::Scalar(None),
            station: crate::config::FanoutField::Scalar(None),
            user: crate::config::FanoutField::Scalar("kiwi-core".into()),
            modulation: Modulation::Am,
            lp_cut: 100.0,
            hp_cut: 2700.0,
            compression: true,
            squelch_threshold_db: None,
            squelch_tail_seconds: 1.0,
            tlimit_seconds: None,
            dir: None,
            dt_sec: 0,
            is_kiwi_wav: false,
            tdoa: false,
            socket_timeout_seconds: 10,
            launch_delay_seconds: 0,
            stream_kind: StreamKind::Snd,
        };
        fc.expand(0, 0).remove(0)
    }

    #[test]
    fn auth_message_has_expected_shape() {
        assert_eq!(ControlChannel::auth("secret"), "SET auth t=kiwi p=secret");
    }

    #[test]
    fn too_busy_fails_with_typed_error() {
        let params = vec![MsgParam {
            key: "too_busy".into(),
            value: Some("4".into()),
        }];
        let mut state = SessionState::new();
        let err = ControlChannel::dispatch(&params, &mut state, &cfg()).unwrap_err();
        assert!(matches!(err, KiwiError::TooBusy));
    }

    #[test]
    fn badp_1_fails_bad_password_but_badp_0_does_not() {
        let mut state = SessionState::new();
        let err = ControlChannel::dispatch(
            &[MsgParam {
                key: "badp".into(),
                value: Some("1".into()),
            }],
            &mut state,
            &cfg(),
        )
        .unwrap_err();
        assert!(matches!(err, KiwiError::BadPassword));

        let ok = ControlChannel::dispatch(
            &[MsgParam {
                key: "badp".into(),
                value: Some("0".into()),
            }],
            &mut state,
            &cfg(),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn sample_rate_stores_value_and_emits_full_setup_sequence() {
        let mut state = SessionState::new();
        let params = vec![MsgParam {
            key: "sample_rate".into(),
            value: Some("12000".into()),
        }];
        let actions = ControlChannel::dispatch(&params, &mut state, &cfg()).unwrap();
        assert_eq!(state.sample_rate_hz, Some(12000.0));
        assert!(actions.contains(&ControlAction::Send(
            "SET squelch=0 max=0".to_string()
        )));
        assert!(actions.contains(&ControlAction::Send("SET lms_autonotch=0".to_string())));
        assert!(actions.contains(&ControlAction::Keepalive));
        // rx params for SND mode must be present too.
        assert!(actions
            .iter()
            .any(|a| matches!(a, ControlAction::Send(s) if s.starts_with("SET ident_user="))));
    }

    #[test]
    fn audio_rate_replies_with_ar_ok() {
        let mut state = SessionState::new();
        let params = vec![MsgParam {
            key: "audio_rate".into(),
            value: Some("44100".into()),
        }];
        let actions = ControlChannel::dispatch(&params, &mut state, &cfg()).unwrap();
        assert_eq!(
            actions,
            vec![ControlAction::Send("SET AR OK in=44100 out=44100".to_string())]
        );
    }

    #[test]
    fn load_cfg_extracts_gnss_position_from_percent_encoded_json() {
        let mut state = SessionState::new();
        let json = r#"{"rx_gps":"(51.5,-0.12)"}"#;
        let encoded: String = json
            .bytes()
            .map(|b| format!("%{b:02X}"))
            .collect::<Vec<_>>()
            .join("");
        let params = vec![MsgParam {
            key: "load_cfg".into(),
            value: Some(encoded),
        }];
        let actions = ControlChannel::dispatch(&params, &mut state, &cfg()).unwrap();
        assert_eq!(state.gnss_position, Some((51.5, -0.12)));
        assert!(actions
            .iter()
            .any(|a| matches!(a, ControlAction::GnssPosition { lat, lon } if (*lat - 51.5).abs() < 1e-9 && (*lon + 0.12).abs() < 1e-9)));
    }

    #[test]
    fn standalone_helpers_match_the_rx_params_block_shape() {
        assert_eq!(ControlChannel::set_name("kiwi-core"), "SET ident_user=kiwi-core");
        assert_eq!(ControlChannel::set_geo("IO91wm"), "SET geo=IO91wm");
        assert_eq!(
            ControlChannel::set_inactivity_timeout(0),
            "SET OVERRIDE inactivity_timeout=0"
        );
    }

    #[test]
    fn am_modulation_sends_negated_hp_cut_as_lp_cut() {
        let actions = ControlChannel::rx_params(&cfg());
        assert!(actions.iter().any(|s| s.contains("low_cut=-2700")));
    }
}
