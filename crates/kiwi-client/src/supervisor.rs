//! Multiplexes N independent sessions across OS threads, performs
//! reconnect-with-backoff, and enforces cooperative cancellation via the
//! shared run flag and each worker's wake event.

use crate::pipeline::{AudioSamples, PipelineOutput, SamplePipeline};
use crate::recorder::RecorderSink;
use crate::session::SessionEngine;
use crate::shutdown::{RunFlag, WakeEvent};
use chrono::Utc;
use kiwi_core::config::now_unix_secs;
use kiwi_core::error::KiwiError;
use kiwi_core::protocol::Frame;
use kiwi_core::SessionConfig;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// TDoA exit status, per §6: `0` OK, `1` connect failure, `2` too busy,
/// `3` GNSS unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Ok,
    ConnectFailure,
    TooBusy,
    GnssUnavailable,
}

impl WorkerStatus {
    pub fn code(self) -> u8 {
        match self {
            WorkerStatus::Ok => 0,
            WorkerStatus::ConnectFailure => 1,
            WorkerStatus::TooBusy => 2,
            WorkerStatus::GnssUnavailable => 3,
        }
    }
}

pub struct WorkerReport {
    pub index: usize,
    pub status: WorkerStatus,
    /// Set for an error outside the TDoA taxonomy (e.g. `BadPassword`,
    /// `ServerDown`, a sink failure); distinct from `status`, which only
    /// ever carries the four canonical TDoA codes.
    pub fatal: bool,
}

/// Spawns one worker thread per `SessionConfig`, staggered by each
/// config's `launch_delay_seconds`, and joins all of them. Returns one
/// report per worker, in launch order.
pub fn run(sessions: Vec<SessionConfig>, run_flag: RunFlag, test_mode: bool) -> Vec<WorkerReport> {
    let mut handles = Vec::with_capacity(sessions.len());

    for (index, cfg) in sessions.into_iter().enumerate() {
        let launch_delay = cfg.launch_delay_seconds;
        let run_flag = run_flag.clone();
        let wake = Arc::new(WakeEvent::new());
        run_flag.register(&wake);

        if index > 0 && launch_delay > 0 {
            wake_sleep_main_thread(launch_delay, &run_flag);
        }

        let handle = thread::Builder::new()
            .name(format!("kiwi-worker-{index}"))
            .spawn(move || {
                let (status, fatal) = run_worker(index, cfg, run_flag, wake, test_mode);
                WorkerReport {
                    index,
                    status,
                    fatal,
                }
            })
            .expect("spawn worker thread");
        handles.push(handle);
    }

    handles
        .into_iter()
        .map(|h| h.join().expect("worker thread panicked"))
        .collect()
}

fn wake_sleep_main_thread(seconds: u64, run_flag: &RunFlag) {
    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    let total = Duration::from_secs(seconds);
    while waited < total && run_flag.is_running() {
        thread::sleep(step.min(total - waited));
        waited += step;
    }
}

fn samples_to_pcm_le(samples: &AudioSamples) -> Vec<u8> {
    match samples {
        AudioSamples::Mono(values) => values.iter().flat_map(|s| s.to_le_bytes()).collect(),
        AudioSamples::Iq(pairs) => pairs
            .iter()
            .flat_map(|(i, q)| [i.to_le_bytes(), q.to_le_bytes()].concat())
            .collect(),
        AudioSamples::Raw(bytes) => bytes.clone(),
    }
}

/// One worker's reconnect/backoff state machine, grounded directly on the
/// original recorder's per-worker control flow: connect failure waits 15s
/// before retrying, a clean server-side close waits 5s, `too_busy` waits
/// 15s, and any other fatal error stops this worker and clears the shared
/// run flag for its peers.
fn run_worker(
    index: usize,
    cfg: SessionConfig,
    run_flag: RunFlag,
    wake: Arc<WakeEvent>,
    test_mode: bool,
) -> (WorkerStatus, bool) {
    let tdoa = cfg.tdoa;
    let mut cfg = cfg;

    loop {
        if !run_flag.is_running() {
            return (WorkerStatus::Ok, false);
        }

        cfg.timestamp_seed =
            SessionConfig::derive_timestamp_seed(now_unix_secs(), std::process::id(), index);
        let mut engine = SessionEngine::new(cfg.clone());

        if let Err(err) = engine.connect() {
            tracing::warn!(index, error = %err, "connect failed, backing off");
            let interrupted = wake.wait_timeout(Duration::from_secs(15));
            if interrupted && !run_flag.is_running() {
                return (WorkerStatus::Ok, false);
            }
            if tdoa {
                return (WorkerStatus::ConnectFailure, false);
            }
            continue;
        }

        if let Err(err) = engine.open() {
            tracing::warn!(index, error = %err, "open failed");
            engine.close();
            continue;
        }

        let result = run_session(index, &cfg, &mut engine, &run_flag, test_mode);

        match result {
            Ok(status) => {
                engine.close();
                return (status, false);
            }
            Err(KiwiError::ServerTerminated) => {
                engine.close();
                let interrupted = wake.wait_timeout(Duration::from_secs(5));
                if interrupted && !run_flag.is_running() {
                    return (WorkerStatus::Ok, false);
                }
            }
            Err(KiwiError::TooBusy) => {
                engine.close();
                let interrupted = wake.wait_timeout(Duration::from_secs(15));
                if interrupted && !run_flag.is_running() {
                    return (WorkerStatus::Ok, false);
                }
                if tdoa {
                    return (WorkerStatus::TooBusy, false);
                }
            }
            Err(KiwiError::TimeLimit) => {
                engine.close();
                return (WorkerStatus::Ok, false);
            }
            Err(other) => {
                tracing::error!(index, error = %other, "fatal worker error, stopping peers");
                engine.close();
                run_flag.clear();
                return (WorkerStatus::Ok, true);
            }
        }
    }
}

/// Drives one connection's receive loop until an error or shutdown, and
/// wires decoded frames into the sample pipeline and recording sink.
fn run_session(
    index: usize,
    cfg: &SessionConfig,
    engine: &mut SessionEngine,
    run_flag: &RunFlag,
    test_mode: bool,
) -> Result<WorkerStatus, KiwiError> {
    let mut pipeline = SamplePipeline::new(cfg, false);
    let mut recorder: Option<RecorderSink> = None;
    let mut last_gnss: Option<(f64, f64)> = None;
    let mut gnss_status = WorkerStatus::Ok;

    loop {
        if !run_flag.is_running() {
            return Ok(gnss_status);
        }

        match engine.run_once() {
            Ok(Some(Frame::Snd {
                flags,
                seq,
                smeter,
                body,
            })) => {
                if let PipelineOutput::Audio(frame) =
                    pipeline.audio_or_iq(flags, seq, smeter, &body)
                {
                    if let Some(gps) = frame.gps {
                        if RecorderSink::note_gps_solution_quality(&gps) {
                            gnss_status = WorkerStatus::GnssUnavailable;
                        }
                    }

                    let sample_rate = engine
                        .state()
                        .sample_rate_hz
                        .unwrap_or(12000.0)
                        .round()
                        .max(1.0) as u32;
                    let channels = if cfg.modulation.is_iq() { 2 } else { 1 };
                    let rec = recorder.get_or_insert_with(|| {
                        RecorderSink::new(cfg.clone(), channels, sample_rate, test_mode)
                    });

                    let pcm = samples_to_pcm_le(&frame.samples);
                    rec.ensure_open(Utc::now())?;
                    rec.write_samples(&pcm, frame.gps)?;
                }
            }
            Ok(Some(Frame::Wf { seq, body, .. })) => {
                // Waterfall consumers (plotting, stdout) are out of core
                // scope; kiwi-probe decodes and prints these frames.
                let _ = pipeline.waterfall(seq, &body);
            }
            Ok(Some(Frame::Msg(_))) | Ok(None) => {}
            Err(err) => {
                if let Some(rec) = recorder.as_mut() {
                    rec.close();
                }
                return Err(err);
            }
        }

        if let Some((lat, lon)) = engine.state().gnss_position {
            if last_gnss != Some((lat, lon)) {
                last_gnss = Some((lat, lon));
                if let Some(rec) = recorder.as_ref() {
                    if let Err(err) = rec.on_gnss_position(lat, lon) {
                        tracing::warn!(index, error = %err, "failed to write gnss position");
                    }
                }
            }
        }

        if gnss_status == WorkerStatus::GnssUnavailable {
            tracing::debug!(index, "gnss solution unavailable for most recent frame");
        }
    }
}
