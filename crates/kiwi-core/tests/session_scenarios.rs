//! Cross-module scenarios from the design's testable-properties list,
//! exercising more than one `kiwi-core` module together.

use kiwi_core::config::{FanoutConfig, FanoutField, Modulation, SessionState, StreamKind};
use kiwi_core::protocol::{ControlChannel, Frame, FrameCodec};
use kiwi_core::squelch::Squelch;
use kiwi_core::wav;
use kiwi_core::AdpcmDecoder;

fn single_session_fanout() -> kiwi_core::SessionConfig {
    let fc = FanoutConfig {
        server_host: vec!["kiwi.example".into()],
        server_port: FanoutField::Scalar(8073),
        password: FanoutField::Scalar("secret".into()),
        frequency_khz: FanoutField::Scalar(7100.0),
        agc_gain: FanoutField::Scalar(None),
        filename: FanoutField::Scalar(None),
        station: FanoutField::Scalar(None),
        user: FanoutField::Scalar("kiwi-core".into()),
        modulation: Modulation::Usb,
        lp_cut: 300.0,
        hp_cut: 2700.0,
        compression: true,
        squelch_threshold_db: Some(10.0),
        squelch_tail_seconds: 1.0,
        tlimit_seconds: None,
        dir: None,
        dt_sec: 0,
        is_kiwi_wav: true,
        tdoa: false,
        socket_timeout_seconds: 10,
        launch_delay_seconds: 0,
        stream_kind: StreamKind::Snd,
    };
    fc.expand(1_700_000_000, 777).remove(0)
}

#[test]
fn a_decoded_snd_frame_drives_squelch_and_adpcm_together() {
    let cfg = single_session_fanout();
    let mut decoder = AdpcmDecoder::new();
    let mut squelch = Squelch::new(cfg.squelch_threshold_db.unwrap(), cfg.squelch_tail_seconds);

    // Fill the noise floor ring with a quiet signal first.
    for seq in 0..65u32 {
        let mut data = vec![b'S', b'N', b'D'];
        data.extend_from_slice(&[0x00]);
        data.extend_from_slice(&seq.to_le_bytes());
        data.extend_from_slice(&((127u16 - 120) * 10).to_be_bytes()); // ~-120 dBm-ish
        data.extend_from_slice(&[0x00, 0x00]);
        let frame = FrameCodec::decode(&data).unwrap();
        if let Frame::Snd { seq, smeter, .. } = frame {
            let rssi = Frame::snd_rssi_dbm(smeter);
            let report = squelch.process(seq, rssi);
            assert!(!report.open, "ring not filled yet should stay closed");
        }
    }

    // A strong signal should now be able to open the gate.
    let loud_smeter: u16 = 2370; // rssi = 0.1*2370 - 127 = 110.0
    let rssi = Frame::snd_rssi_dbm(loud_smeter);
    let report = squelch.process(65, rssi);
    assert!(report.open);

    // The ADPCM decoder is independent of squelch state; a silent nibble
    // stream always decodes to zeros regardless of gate state.
    let samples = decoder.decode(&[0x00, 0x00]);
    assert_eq!(samples, vec![0, 0, 0, 0]);
}

#[test]
fn control_dispatch_and_wire_auth_agree_on_password() {
    let cfg = single_session_fanout();
    let auth_message = ControlChannel::auth(&cfg.password);
    assert_eq!(auth_message, "SET auth t=kiwi p=secret");

    let mut state = SessionState::new();
    let params = vec![kiwi_core::MsgParam {
        key: "sample_rate".into(),
        value: Some("12001.25".into()),
    }];
    let actions = ControlChannel::dispatch(&params, &mut state, &cfg).unwrap();
    assert_eq!(state.sample_rate_hz, Some(12001.25));
    assert!(!actions.is_empty());
}

#[test]
fn kiwi_wav_header_and_append_blocks_stay_self_consistent_across_two_appends() {
    let header = wav::riff_fmt_prefix(2, 12000);
    let mut file = header.to_vec();

    let block1 = wav::kiwi_wav_append_block(0, 100, 0, &[1, 2, 3, 4]);
    file.extend_from_slice(&block1);
    let riff1 = wav::rewrite_kiwi_riff_size(file.len() as u64);
    file[4..8].copy_from_slice(&riff1);
    assert_eq!(u32::from_le_bytes(riff1), (file.len() - 8) as u32);

    let block2 = wav::kiwi_wav_append_block(0, 100, 500_000, &[5, 6, 7, 8, 9, 10]);
    file.extend_from_slice(&block2);
    let riff2 = wav::rewrite_kiwi_riff_size(file.len() as u64);
    file[4..8].copy_from_slice(&riff2);
    assert_eq!(u32::from_le_bytes(riff2), (file.len() - 8) as u32);

    assert_eq!(&file[0..4], b"RIFF");
    assert_eq!(&file[wav::KIWI_HEADER_LEN..wav::KIWI_HEADER_LEN + 4], b"kiwi");
}
