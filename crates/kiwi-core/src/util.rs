//! Small pure helpers used by the recording sink: filename policy,
//! rotation-bucket arithmetic, and the GNSS-position text line schema.

use chrono::{DateTime, Timelike, Utc};

/// Seconds since UTC midnight for `dt`.
pub fn sec_of_day(dt: DateTime<Utc>) -> u32 {
    dt.time().num_seconds_from_midnight()
}

/// The rotation bucket a given instant falls into, given a `dt_sec`
/// rotation interval. Undefined (caller must guard) when `dt_sec == 0`.
fn rotation_bucket(dt: DateTime<Utc>, dt_sec: u32) -> u64 {
    sec_of_day(dt) as u64 / dt_sec as u64
}

/// Whether a file opened at `start` should be rotated by the time `now`
/// arrives, given `dt_sec` (0 disables rotation).
pub fn should_rotate(start: DateTime<Utc>, now: DateTime<Utc>, dt_sec: u32) -> bool {
    if dt_sec == 0 {
        return false;
    }
    rotation_bucket(start, dt_sec) != rotation_bucket(now, dt_sec)
}

/// Builds the base filename (no directory prefix) per the recorder's
/// naming policy.
///
/// - If `configured_filename` is set: `<filename><_station>.wav`.
/// - Else: `<UTC timestamp>_<freq_hz>_<station>_<modulation>.wav`, where
///   the station segment is empty, `_<station>`, or `_<idx>` when there
///   are multiple connections without an explicit station id.
pub fn build_filename(
    configured_filename: Option<&str>,
    freq_hz: u64,
    station: Option<&str>,
    modulation: &str,
    connection_index: usize,
    multiple_connections: bool,
    now: DateTime<Utc>,
) -> String {
    if let Some(base) = configured_filename {
        return match station {
            Some(s) => format!("{base}_{s}.wav"),
            None => format!("{base}.wav"),
        };
    }

    let timestamp = now.format("%Y%m%dT%H%M%SZ");
    let station_segment = match station {
        Some(s) => format!("_{s}"),
        None if multiple_connections => format!("_{connection_index}"),
        None => String::new(),
    };
    format!("{timestamp}_{freq_hz}{station_segment}_{modulation}.wav")
}

/// One line of the GNSS-position text file: a well-known Octave
/// struct-literal schema consumed by downstream tooling. Hyphens in the
/// station name are replaced with underscores (not valid in an Octave
/// identifier).
pub fn gnss_text_line(station: &str, lat: f64, lon: f64, host: &str, port: u16) -> String {
    let station_safe = station.replace('-', "_");
    format!(
        "d.{station_safe} = struct('coord', [{lat},{lon}], 'host', '{host}', 'port', {port});"
    )
}
