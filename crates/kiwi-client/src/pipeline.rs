//! Adapts decoded wire frames into audio, IQ, or waterfall records,
//! applying the squelch gate ahead of delivery to a sink.

use kiwi_core::config::SessionConfig;
use kiwi_core::protocol::{Frame, GpsHeader};
use kiwi_core::{AdpcmDecoder, Squelch};

#[derive(Debug, Clone, PartialEq)]
pub enum AudioSamples {
    Mono(Vec<i16>),
    Iq(Vec<(i16, i16)>),
    /// Raw mode: bytes delivered exactly as received; the recorder
    /// reshapes IQ pairs itself when writing.
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub seq: u32,
    pub rssi_dbm: f32,
    pub samples: AudioSamples,
    pub gps: Option<GpsHeader>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallFrame {
    pub seq: u32,
    pub samples: Vec<u8>,
}

pub enum PipelineOutput {
    Audio(AudioFrame),
    Waterfall(WaterfallFrame),
    /// Squelch reported the gate closed; any buffered timing state has
    /// already been reset.
    Dropped,
}

pub struct SamplePipeline {
    adpcm: AdpcmDecoder,
    squelch: Option<Squelch>,
    raw: bool,
    compression: bool,
    iq_mode: bool,
}

impl SamplePipeline {
    pub fn new(cfg: &SessionConfig, raw: bool) -> Self {
        let squelch = cfg
            .squelch_threshold_db
            .map(|threshold| Squelch::new(threshold, cfg.squelch_tail_seconds));
        Self {
            adpcm: AdpcmDecoder::new(),
            squelch,
            raw,
            compression: cfg.compression,
            iq_mode: cfg.modulation.is_iq(),
        }
    }

    /// Transforms one decoded `Snd` frame into an [`AudioFrame`], or
    /// `Dropped` if the squelch gate is currently closed.
    pub fn audio_or_iq(&mut self, flags: u8, seq: u32, smeter: u16, body: &[u8]) -> PipelineOutput {
        let _ = flags; // reserved for future use (e.g. a stop/start bit)
        let rssi_dbm = Frame::snd_rssi_dbm(smeter);

        if let Some(squelch) = &mut self.squelch {
            if !squelch.process(seq, rssi_dbm).open {
                return PipelineOutput::Dropped;
            }
        }

        let (gps, body) = if self.iq_mode {
            match GpsHeader::parse(body) {
                Some((gps, rest)) => (Some(gps), rest),
                None => (None, body),
            }
        } else {
            (None, body)
        };

        let decoded: Option<Vec<i16>> = if self.compression {
            Some(self.adpcm.decode(body))
        } else if !self.raw {
            Some(decode_be_i16(body))
        } else {
            None
        };

        let samples = match decoded {
            Some(flat) if self.iq_mode => AudioSamples::Iq(pair_iq(&flat)),
            Some(flat) => AudioSamples::Mono(flat),
            None => AudioSamples::Raw(body.to_vec()),
        };

        PipelineOutput::Audio(AudioFrame {
            seq,
            rssi_dbm,
            samples,
            gps,
        })
    }

    /// Transforms one decoded `W/F` frame into a [`WaterfallFrame`];
    /// decompresses (tail stripped) when the waterfall stream is
    /// compressed, otherwise passes the biased dB bytes through as-is.
    pub fn waterfall(&mut self, seq: u32, body: &[u8]) -> PipelineOutput {
        let samples = if self.compression {
            AdpcmDecoder::decode_waterfall_body(body)
                .into_iter()
                .map(|s| s as u8)
                .collect()
        } else {
            body.to_vec()
        };
        PipelineOutput::Waterfall(WaterfallFrame { seq, samples })
    }
}

fn decode_be_i16(body: &[u8]) -> Vec<i16> {
    body.chunks_exact(2)
        .map(|c| i16::from_be_bytes([c[0], c[1]]))
        .collect()
}

fn pair_iq(flat: &[i16]) -> Vec<(i16, i16)> {
    flat.chunks_exact(2).map(|c| (c[0], c[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiwi_core::config::{FanoutConfig, FanoutField, Modulation, StreamKind};

    fn cfg(modulation: Modulation, compression: bool, squelch: Option<f32>) -> SessionConfig {
        let fc = FanoutConfig {
            server_host: vec!["a".into()],
            server_port: FanoutField::Scalar(8073),
            password: FanoutField::Scalar("p".into()),
            frequency_khz: FanoutField::Scalar(1000.0),
            agc_gain: FanoutField::Scalar(None),
            filename: FanoutField::Scalar(None),
            station: FanoutField::Scalar(None),
            user: FanoutField::Scalar("u".into()),
            modulation,
            lp_cut: 100.0,
            hp_cut: 2700.0,
            compression,
            squelch_threshold_db: squelch,
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
    fn uncompressed_mono_audio_decodes_big_endian_pairs() {
        let mut pipeline = SamplePipeline::new(&cfg(Modulation::Usb, false, None), false);
        let body = vec![0x00, 0x01, 0xFF, 0xFF];
        match pipeline.audio_or_iq(0, 1, 1270, &body) {
            PipelineOutput::Audio(frame) => {
                assert_eq!(frame.samples, AudioSamples::Mono(vec![1, -1]));
            }
            _ => panic!("expected audio frame"),
        }
    }

    #[test]
    fn raw_uncompressed_audio_passes_bytes_through() {
        let mut pipeline = SamplePipeline::new(&cfg(Modulation::Usb, false, None), true);
        let body = vec![0xDE, 0xAD, 0xBE, 0xEF];
        match pipeline.audio_or_iq(0, 1, 1270, &body) {
            PipelineOutput::Audio(frame) => {
                assert_eq!(frame.samples, AudioSamples::Raw(body));
            }
            _ => panic!("expected audio frame"),
        }
    }

    #[test]
    fn compressed_audio_always_decodes_regardless_of_raw_flag() {
        let mut raw_pipeline = SamplePipeline::new(&cfg(Modulation::Usb, true, None), true);
        let mut non_raw_pipeline = SamplePipeline::new(&cfg(Modulation::Usb, true, None), false);
        let body = vec![0x12, 0x34];
        let a = match raw_pipeline.audio_or_iq(0, 1, 1270, &body) {
            PipelineOutput::Audio(f) => f.samples,
            _ => panic!(),
        };
        let b = match non_raw_pipeline.audio_or_iq(0, 1, 1270, &body) {
            PipelineOutput::Audio(f) => f.samples,
            _ => panic!(),
        };
        assert_eq!(a, b);
        assert!(matches!(a, AudioSamples::Mono(_)));
    }

    #[test]
    fn iq_mode_strips_gps_header_and_pairs_samples() {
        let mut pipeline = SamplePipeline::new(&cfg(Modulation::Iq, false, None), false);
        let mut body = vec![0u8, 0]; // last_solution, pad
        body.extend_from_slice(&100u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&[0x00, 0x01, 0x00, 0x02]); // I=1, Q=2
        match pipeline.audio_or_iq(0, 1, 1270, &body) {
            PipelineOutput::Audio(frame) => {
                assert_eq!(frame.gps.unwrap().gpssec, 100);
                assert_eq!(frame.samples, AudioSamples::Iq(vec![(1, 2)]));
            }
            _ => panic!("expected audio frame"),
        }
    }

    #[test]
    fn closed_squelch_drops_the_frame() {
        let mut pipeline = SamplePipeline::new(&cfg(Modulation::Usb, false, Some(10.0)), false);
        let body = vec![0x00, 0x01];
        // Ring not yet filled => squelch reports closed.
        let output = pipeline.audio_or_iq(0, 1, 1270, &body);
        assert!(matches!(output, PipelineOutput::Dropped));
    }

    #[test]
    fn waterfall_compressed_strips_tail_and_casts_to_u8() {
        let mut pipeline = SamplePipeline::new(&cfg(Modulation::Usb, true, None), false);
        let body = vec![0x12u8; 20];
        match pipeline.waterfall(7, &body) {
            PipelineOutput::Waterfall(frame) => {
                assert_eq!(frame.seq, 7);
                assert_eq!(frame.samples.len(), 20 * 2 - 10);
            }
            _ => panic!("expected waterfall frame"),
        }
    }

    #[test]
    fn waterfall_uncompressed_passes_bytes_through() {
        let mut pipeline = SamplePipeline::new(&cfg(Modulation::Usb, false, None), false);
        let body = vec![1u8, 2, 3];
        match pipeline.waterfall(7, &body) {
            PipelineOutput::Waterfall(frame) => assert_eq!(frame.samples, body),
            _ => panic!("expected waterfall frame"),
        }
    }
}
