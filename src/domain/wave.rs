//! RIFF/WAVE container parsing.
//!
//! The pipeline trusts the container header, not the filename: channel
//! count, sample count and duration recorded for every asset come from
//! here. Parsing is pure and never reads past the buffer it is handed.

use std::fmt;

/// Compression tag from the format chunk. PCM is the only format the
/// pipeline expects, but the tag is surfaced as parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Pcm,
    MicrosoftAdpcm,
    IeeeFloat,
    ALaw,
    MuLaw,
    ImaAdpcm,
    ItuG721Adpcm,
    Gsm610,
    ItuG723Adpcm,
    Mpeg,
    Aac,
    DolbyAc3,
    Unknown(u16),
}

impl AudioFormat {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => AudioFormat::Pcm,
            2 => AudioFormat::MicrosoftAdpcm,
            3 => AudioFormat::IeeeFloat,
            6 => AudioFormat::ALaw,
            7 => AudioFormat::MuLaw,
            17 => AudioFormat::ImaAdpcm,
            20 => AudioFormat::ItuG721Adpcm,
            49 => AudioFormat::Gsm610,
            64 => AudioFormat::ItuG723Adpcm,
            80 => AudioFormat::Mpeg,
            255 => AudioFormat::Aac,
            8192 => AudioFormat::DolbyAc3,
            other => AudioFormat::Unknown(other),
        }
    }
}

/// Canonical audio parameters extracted from one container.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveData {
    pub audio_format: AudioFormat,
    pub num_channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_chunk_size: u32,
    /// Samples per channel: data chunk size / block align
    pub num_samples: u64,
    /// Seconds: num_samples / sample_rate
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaveError {
    /// The buffer does not start with the RIFF/WAVE magic markers
    BadMagic,
    /// A declared chunk extends past the end of the buffer
    Truncated { offset: usize },
    /// No format chunk before the data chunk, or none at all
    MissingFormatChunk,
    /// No data chunk, or a data chunk of size zero
    MissingDataChunk,
    /// Format chunk with a zero block align or sample rate
    BadFormatChunk,
}

impl fmt::Display for WaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveError::BadMagic => write!(f, "not a RIFF/WAVE container"),
            WaveError::Truncated { offset } => {
                write!(f, "chunk at offset {} extends past end of buffer", offset)
            }
            WaveError::MissingFormatChunk => write!(f, "no format chunk before data chunk"),
            WaveError::MissingDataChunk => write!(f, "no data chunk found"),
            WaveError::BadFormatChunk => write!(f, "format chunk has zero block align or sample rate"),
        }
    }
}

impl std::error::Error for WaveError {}

#[derive(Clone, Copy)]
struct FormatChunk {
    audio_format: u16,
    num_channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

fn read_u16(buffer: &[u8], offset: usize) -> Result<u16, WaveError> {
    let bytes = buffer
        .get(offset..offset + 2)
        .ok_or(WaveError::Truncated { offset })?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(buffer: &[u8], offset: usize) -> Result<u32, WaveError> {
    let bytes = buffer
        .get(offset..offset + 4)
        .ok_or(WaveError::Truncated { offset })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parse a RIFF/WAVE buffer.
///
/// Walks the `(id, size, payload)` chunk sequence starting at offset 12,
/// skipping unrecognized chunk types by their declared size. The format
/// chunk must appear before the data chunk; scanning stops at the data
/// chunk and anything after it is ignored.
pub fn parse_wave(buffer: &[u8]) -> Result<WaveData, WaveError> {
    if buffer.len() < 12 || &buffer[0..4] != b"RIFF" || &buffer[8..12] != b"WAVE" {
        return Err(WaveError::BadMagic);
    }

    let mut offset = 12usize;
    let mut format: Option<FormatChunk> = None;
    let mut data_size: Option<u32> = None;

    while offset + 8 <= buffer.len() {
        let chunk_id = &buffer[offset..offset + 4];
        let chunk_size = read_u32(buffer, offset + 4)?;

        if chunk_id == b"fmt " {
            format = Some(FormatChunk {
                audio_format: read_u16(buffer, offset + 8)?,
                num_channels: read_u16(buffer, offset + 10)?,
                sample_rate: read_u32(buffer, offset + 12)?,
                byte_rate: read_u32(buffer, offset + 16)?,
                block_align: read_u16(buffer, offset + 20)?,
                bits_per_sample: read_u16(buffer, offset + 22)?,
            });
        } else if chunk_id == b"data" {
            if format.is_none() {
                return Err(WaveError::MissingFormatChunk);
            }
            data_size = Some(chunk_size);
            break;
        }

        offset = offset
            .checked_add(8 + chunk_size as usize)
            .ok_or(WaveError::Truncated { offset })?;
    }

    let format = format.ok_or(WaveError::MissingFormatChunk)?;
    let data_size = match data_size {
        Some(size) if size > 0 => size,
        _ => return Err(WaveError::MissingDataChunk),
    };
    if format.block_align == 0 || format.sample_rate == 0 {
        return Err(WaveError::BadFormatChunk);
    }

    let num_samples = u64::from(data_size / u32::from(format.block_align));
    let duration = num_samples as f64 / f64::from(format.sample_rate);

    Ok(WaveData {
        audio_format: AudioFormat::from_code(format.audio_format),
        num_channels: format.num_channels,
        sample_rate: format.sample_rate,
        byte_rate: format.byte_rate,
        block_align: format.block_align,
        bits_per_sample: format.bits_per_sample,
        data_chunk_size: data_size,
        num_samples,
        duration,
    })
}
