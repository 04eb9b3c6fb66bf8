use crate::audio::buffer::SampleBuffer;
use crate::audio::error::EncodeError;

pub const WAV_HEADER_LEN: usize = 44;

const PCM_FORMAT: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: usize = 2;

/// Float sample to signed 16-bit PCM.
///
/// Clamped to [-1, 1]; negatives scale by 32768 and non-negatives by 32767 so
/// that +1.0 cannot overflow while -1.0 still reaches i16::MIN.
pub fn f32_to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Exact inverse of [`f32_to_pcm16`]'s scaling.
pub fn pcm16_to_f32(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / 32768.0
    } else {
        sample as f32 / 32767.0
    }
}

/// Encode a buffer as a canonical 44-byte-header WAV file with interleaved
/// little-endian 16-bit PCM.
pub fn encode_wav(buffer: &SampleBuffer) -> Result<Vec<u8>, EncodeError> {
    let channels = buffer.channel_count();
    let channels_u16 = u16::try_from(channels).map_err(|_| EncodeError::TooManyChannels(channels))?;

    let frames = buffer.frame_count();
    let data_len = frames as u64 * channels as u64 * BYTES_PER_SAMPLE as u64;
    // RIFF size field carries 36 + data bytes
    if data_len + 36 > u32::MAX as u64 {
        return Err(EncodeError::DataTooLarge(data_len));
    }
    let data_len = data_len as u32;

    let sample_rate = buffer.sample_rate_hz();
    let block_align = channels_u16 * BYTES_PER_SAMPLE as u16;
    let byte_rate = sample_rate
        .checked_mul(block_align as u32)
        .ok_or(EncodeError::DataTooLarge(data_len as u64))?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&PCM_FORMAT.to_le_bytes());
    out.extend_from_slice(&channels_u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    let planes = buffer.channels();
    for frame in 0..frames {
        for plane in planes {
            out.extend_from_slice(&f32_to_pcm16(plane[frame]).to_le_bytes());
        }
    }

    log::debug!(
        "Encoded WAV: {} frames x {} ch @ {}Hz ({} bytes)",
        frames,
        channels,
        sample_rate,
        out.len()
    );

    Ok(out)
}
