//! WAV-file writer with rotation policy, optional GPS chunk, and a
//! header back-patch on every append.

use chrono::{DateTime, Utc};
use kiwi_core::config::SessionConfig;
use kiwi_core::error::{KiwiError, Result as KiwiResult};
use kiwi_core::protocol::GpsHeader;
use kiwi_core::{util, wav};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

const NULL_DEVICE: &str = if cfg!(windows) { "NUL" } else { "/dev/null" };

pub struct RecorderSink {
    cfg: SessionConfig,
    test_mode: bool,
    file: Option<File>,
    start_time: Option<DateTime<Utc>>,
    channels: u16,
    sample_rate: u32,
}

impl RecorderSink {
    pub fn new(cfg: SessionConfig, channels: u16, sample_rate: u32, test_mode: bool) -> Self {
        Self {
            cfg,
            test_mode,
            file: None,
            start_time: None,
            channels,
            sample_rate,
        }
    }

    fn build_path(&self, now: DateTime<Utc>) -> PathBuf {
        let freq_hz = (self.cfg.freq_khz * 1000.0).round() as u64;
        let name = util::build_filename(
            self.cfg.filename.as_deref(),
            freq_hz,
            self.cfg.station.as_deref(),
            self.cfg.modulation.as_str(),
            self.cfg.connection_index,
            self.cfg.multiple_connections,
            now,
        );
        match &self.cfg.dir {
            Some(dir) => PathBuf::from(dir).join(name),
            None => PathBuf::from(name),
        }
    }

    /// Opens a new file if none is open yet, or if the rotation interval
    /// has elapsed since the current file was opened.
    pub fn ensure_open(&mut self, now: DateTime<Utc>) -> KiwiResult<()> {
        let needs_rotation = match self.start_time {
            None => true,
            Some(start) => util::should_rotate(start, now, self.cfg.dt_sec),
        };
        if !needs_rotation {
            return Ok(());
        }
        self.close();

        let path = self.build_path(now);
        let mut file = if self.test_mode {
            OpenOptions::new()
                .write(true)
                .open(NULL_DEVICE)
                .map_err(|e| KiwiError::Sink(e.to_string()))?
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .map_err(|e| KiwiError::Sink(e.to_string()))?
        };

        let header: Vec<u8> = if self.cfg.is_kiwi_wav {
            wav::riff_fmt_prefix(self.channels, self.sample_rate).to_vec()
        } else {
            wav::plain_header(self.channels, self.sample_rate).to_vec()
        };
        file.write_all(&header)
            .map_err(|e| KiwiError::Sink(e.to_string()))?;

        self.file = Some(file);
        self.start_time = Some(now);
        tracing::info!(path = %path.display(), "opened recording");
        Ok(())
    }

    /// Appends one block of PCM payload, preceded by a `kiwi` GPS chunk
    /// when `is_kiwi_wav` is set, then rewrites the header to reflect the
    /// new file size.
    pub fn write_samples(&mut self, pcm: &[u8], gps: Option<GpsHeader>) -> KiwiResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| KiwiError::Sink("write before ensure_open".into()))?;

        if self.cfg.is_kiwi_wav {
            let gps = gps.unwrap_or(GpsHeader {
                last_solution: 255,
                gpssec: 0,
                gpsnsec: 0,
            });
            let block =
                wav::kiwi_wav_append_block(gps.last_solution, gps.gpssec, gps.gpsnsec, pcm);
            file.write_all(&block)
                .map_err(|e| KiwiError::Sink(e.to_string()))?;
        } else {
            file.write_all(pcm)
                .map_err(|e| KiwiError::Sink(e.to_string()))?;
        }

        let total_len = file
            .stream_position()
            .map_err(|e| KiwiError::Sink(e.to_string()))?;

        if self.cfg.is_kiwi_wav {
            let riff_size = wav::rewrite_kiwi_riff_size(total_len);
            file.seek(SeekFrom::Start(4))
                .map_err(|e| KiwiError::Sink(e.to_string()))?;
            file.write_all(&riff_size)
                .map_err(|e| KiwiError::Sink(e.to_string()))?;
        } else {
            let (riff_size, data_size) = wav::rewrite_plain_header(total_len);
            file.seek(SeekFrom::Start(4))
                .map_err(|e| KiwiError::Sink(e.to_string()))?;
            file.write_all(&riff_size)
                .map_err(|e| KiwiError::Sink(e.to_string()))?;
            file.seek(SeekFrom::Start(40))
                .map_err(|e| KiwiError::Sink(e.to_string()))?;
            file.write_all(&data_size)
                .map_err(|e| KiwiError::Sink(e.to_string()))?;
        }
        file.seek(SeekFrom::End(0))
            .map_err(|e| KiwiError::Sink(e.to_string()))?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.file = None;
    }

    /// Writes the GNSS-position text file described in §4.8.
    pub fn on_gnss_position(&self, lat: f64, lon: f64) -> KiwiResult<()> {
        let station = self.cfg.station.as_deref().unwrap_or("kiwi");
        let line = util::gnss_text_line(
            station,
            lat,
            lon,
            &self.cfg.server_host,
            self.cfg.server_port,
        );
        let dir = self.cfg.dir.clone().unwrap_or_default();
        let path = PathBuf::from(dir).join(format!("{station}.txt"));
        std::fs::write(&path, format!("{line}\n")).map_err(|e| KiwiError::Sink(e.to_string()))
    }

    /// Per the §4.8 supplement: a `last_solution` of 254 or 255 means no
    /// recent GPS fix, and the caller should report TDoA status 3.
    pub fn note_gps_solution_quality(gps: &GpsHeader) -> bool {
        gps.is_unavailable()
    }
}
