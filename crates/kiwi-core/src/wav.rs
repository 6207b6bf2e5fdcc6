//! Pure byte-layout functions for the two WAV variants this recorder
//! writes. No file I/O here; [`kiwi-client`]'s recorder sink owns the
//! actual file handle and calls these to build the bytes it writes.

/// Standard RIFF/WAVE/fmt/data header length in bytes.
pub const PLAIN_HEADER_LEN: usize = 44;
/// RIFF/WAVE/fmt header length with no trailing `data` chunk, used as the
/// initial static write for kiwi-wav files.
pub const KIWI_HEADER_LEN: usize = 36;
/// `kiwi` chunk: id(4) + size(4) + last_solution(1) + pad(1) + gpssec(4) + gpsnsec(4).
pub const KIWI_CHUNK_LEN: usize = 18;

const BITS_PER_SAMPLE: u16 = 16;
const AUDIO_FORMAT_PCM: u16 = 1;

/// The 36-byte `RIFF`/`WAVE`/`fmt ` prefix shared by both variants, with
/// the RIFF size field left at 0 (patched on first rewrite).
pub fn riff_fmt_prefix(channels: u16, sample_rate: u32) -> [u8; KIWI_HEADER_LEN] {
    let byte_rate = sample_rate * channels as u32 * (BITS_PER_SAMPLE as u32 / 8);
    let block_align = channels * (BITS_PER_SAMPLE / 8);

    let mut out = [0u8; KIWI_HEADER_LEN];
    out[0..4].copy_from_slice(b"RIFF");
    out[4..8].copy_from_slice(&0u32.to_le_bytes());
    out[8..12].copy_from_slice(b"WAVE");
    out[12..16].copy_from_slice(b"fmt ");
    out[16..20].copy_from_slice(&16u32.to_le_bytes());
    out[20..22].copy_from_slice(&AUDIO_FORMAT_PCM.to_le_bytes());
    out[22..24].copy_from_slice(&channels.to_le_bytes());
    out[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    out[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    out[32..34].copy_from_slice(&block_align.to_le_bytes());
    out[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    out
}

/// `"data"` chunk id + little-endian payload length.
pub fn data_chunk_header(payload_len: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(b"data");
    out[4..8].copy_from_slice(&payload_len.to_le_bytes());
    out
}

/// Full 44-byte plain header with a zero-length `data` chunk, written once
/// when a plain (non-kiwi-wav) file is opened.
pub fn plain_header(channels: u16, sample_rate: u32) -> [u8; PLAIN_HEADER_LEN] {
    let mut out = [0u8; PLAIN_HEADER_LEN];
    out[0..KIWI_HEADER_LEN].copy_from_slice(&riff_fmt_prefix(channels, sample_rate));
    out[KIWI_HEADER_LEN..PLAIN_HEADER_LEN].copy_from_slice(&data_chunk_header(0));
    out
}

/// Patches bytes `[4..8)` (RIFF size) and `[40..44)` (data chunk size) for
/// a plain WAV file whose total size is now `total_file_size`.
/// `RIFF size = file_size - 8`; `data size = file_size - 44`.
pub fn rewrite_plain_header(total_file_size: u64) -> ([u8; 4], [u8; 4]) {
    let riff_size = (total_file_size.saturating_sub(8)) as u32;
    let data_size = (total_file_size.saturating_sub(PLAIN_HEADER_LEN as u64)) as u32;
    (riff_size.to_le_bytes(), data_size.to_le_bytes())
}

/// Patches bytes `[4..8)` (RIFF size) for a kiwi-wav file, whose `data`
/// payload is split across repeated `kiwi`+`data` chunk pairs instead of
/// one fixed-offset chunk.
pub fn rewrite_kiwi_riff_size(total_file_size: u64) -> [u8; 4] {
    ((total_file_size.saturating_sub(8)) as u32).to_le_bytes()
}

/// `"kiwi"` chunk id + size(10) + `last_solution:u8, pad:u8,
/// gpssec:u32 LE, gpsnsec:u32 LE`.
pub fn kiwi_chunk(last_solution: u8, gpssec: u32, gpsnsec: u32) -> [u8; KIWI_CHUNK_LEN] {
    let mut out = [0u8; KIWI_CHUNK_LEN];
    out[0..4].copy_from_slice(b"kiwi");
    out[4..8].copy_from_slice(&10u32.to_le_bytes());
    out[8] = last_solution;
    out[9] = 0;
    out[10..14].copy_from_slice(&gpssec.to_le_bytes());
    out[14..18].copy_from_slice(&gpsnsec.to_le_bytes());
    out
}

/// Builds one `[kiwi chunk][data chunk header][pcm payload]` append block
/// for a kiwi-wav file.
pub fn kiwi_wav_append_block(
    last_solution: u8,
    gpssec: u32,
    gpsnsec: u32,
    pcm: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(KIWI_CHUNK_LEN + 8 + pcm.len());
    out.extend_from_slice(&kiwi_chunk(last_solution, gpssec, gpsnsec));
    out.extend_from_slice(&data_chunk_header(pcm.len() as u32));
    out.extend_from_slice(pcm);
    out
}
