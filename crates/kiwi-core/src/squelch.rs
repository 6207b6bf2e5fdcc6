//! Squelch gate over the audio/IQ sample stream, driven by a noise-floor
//! estimate tracked in a [`NoiseFloorRing`].

use crate::noise_floor::NoiseFloorRing;

/// 512-sample blocks at a 12 kHz frame rate, independent of the actual
/// demodulated sample rate: the server always reports sequence numbers at
/// this cadence (~42.7 ms per frame).
const FRAME_RATE_HZ: f32 = 12_000.0;
const FRAME_SIZE_SAMPLES: f32 = 512.0;
const HYSTERESIS_DB: f32 = 6.0;

/// Snapshot of gate state after processing one `(seq, rssi_dbm)` sample,
/// suitable for driving an always-visible status line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquelchReport {
    pub open: bool,
    pub median_nf: f32,
    pub open_threshold: f32,
    /// True only on the frame where the gate transitions from open to closed.
    pub just_closed: bool,
}

#[derive(Debug, Clone)]
pub struct Squelch {
    threshold_db: f32,
    tail_frames: u32,
    ring: NoiseFloorRing,
    armed_seq: Option<u32>,
}

impl Squelch {
    pub fn new(threshold_db: f32, tail_seconds: f32) -> Self {
        let tail_frames = (tail_seconds * FRAME_RATE_HZ / FRAME_SIZE_SAMPLES).round() as u32;
        Self {
            threshold_db,
            tail_frames,
            ring: NoiseFloorRing::new(),
            armed_seq: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.armed_seq.is_some()
    }

    pub fn process(&mut self, seq: u32, rssi_dbm: f32) -> SquelchReport {
        if !self.ring.is_filled() || self.armed_seq.is_none() {
            self.ring.insert(rssi_dbm);
        }

        if !self.ring.is_filled() {
            return SquelchReport {
                open: false,
                median_nf: self.ring.median(),
                open_threshold: f32::NAN,
                just_closed: false,
            };
        }

        let median_nf = self.ring.median();
        let mut open_threshold = median_nf + self.threshold_db;
        let was_open = self.armed_seq.is_some();
        if was_open {
            open_threshold -= HYSTERESIS_DB;
        }

        if rssi_dbm >= open_threshold {
            self.armed_seq = Some(seq);
        }

        let mut just_closed = false;
        if let Some(armed_seq) = self.armed_seq {
            if seq > armed_seq + self.tail_frames {
                self.armed_seq = None;
                just_closed = true;
            }
        }

        SquelchReport {
            open: self.armed_seq.is_some(),
            median_nf,
            open_threshold,
            just_closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_until_ring_is_filled() {
        let mut sq = Squelch::new(10.0, 1.0);
        for i in 0..64 {
            let report = sq.process(i, -120.0);
            assert!(!report.open);
        }
    }

    #[test]
    fn opens_when_rssi_crosses_median_plus_threshold() {
        let mut sq = Squelch::new(10.0, 1.0);
        for seq in 0..65 {
            sq.process(seq, -120.0);
        }
        // median is now -120, threshold 10 -> open_threshold = -110.
        let report = sq.process(65, -108.0);
        assert!(report.open, "-108 >= -110 should open the gate");
    }

    #[test]
    fn hysteresis_lowers_effective_threshold_by_6db_once_open() {
        let mut sq = Squelch::new(10.0, 1.0);
        for seq in 0..65 {
            sq.process(seq, -120.0);
        }
        sq.process(65, -108.0); // opens at -110 threshold
        // Effective open threshold is now -116; -116 itself should keep it open.
        let report = sq.process(66, -116.0);
        assert!(report.open, "hysteresis should keep gate open at -116");
    }

    #[test]
    fn closes_on_first_seq_past_armed_seq_plus_tail_frames() {
        // tail_seconds=1 -> round(1*12000/512) = 23 frames.
        let mut sq = Squelch::new(10.0, 1.0);
        for seq in 0..65 {
            sq.process(seq, -120.0);
        }
        sq.process(65u32, -100.0); // armed at seq=65
        assert_eq!(sq.tail_frames, 23);

        for seq in 66..=88 {
            // armed_seq(65) + tail_frames(23) = 88: still open through seq=88.
            let report = sq.process(seq, -130.0);
            assert!(report.open, "should remain open through seq {seq}");
        }
        let report = sq.process(89, -130.0);
        assert!(!report.open, "must close at first seq > armed_seq + tail");
        assert!(report.just_closed);
    }

    #[test]
    fn tail_frames_rounds_seconds_into_512_sample_blocks_at_12khz() {
        let sq = Squelch::new(5.0, 2.0);
        assert_eq!(sq.tail_frames, 47); // round(2*12000/512) = round(46.875) = 47
    }
}
